//! Tag handles
//!
//! A [`Tag`] is a handle onto the store a [`FileContainer`](crate::FileContainer)
//! holds for one format. Handles for the same format share the store, so a
//! write through one is visible through all of them. Writes mark the owning
//! container dirty.

use indexmap::IndexMap;
use mtag_core::{Result, TagError, TagFormatAdapter, TagStore, TagValue};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Store attached to a container, shared with every handle bound to it
#[derive(Debug)]
pub(crate) struct StoreCell {
    store: Mutex<TagStore>,
    attached: AtomicBool,
    adapter: Arc<dyn TagFormatAdapter>,
    /// Frames or items the decoder left out of the store
    skipped: Mutex<Vec<String>>,
}

impl StoreCell {
    pub(crate) fn new(
        adapter: Arc<dyn TagFormatAdapter>,
        store: TagStore,
        skipped: Vec<String>,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            attached: AtomicBool::new(true),
            adapter,
            skipped: Mutex::new(skipped),
        }
    }

    pub(crate) fn skipped(&self) -> Vec<String> {
        self.skipped.lock().clone()
    }

    /// Forget skipped entries once a save has written the store without them
    pub(crate) fn clear_skipped(&self) {
        self.skipped.lock().clear();
    }

    /// Cut the cell off from its container (strip, close)
    pub(crate) fn detach(&self) {
        let _store = self.store.lock();
        self.attached.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub(crate) fn snapshot(&self) -> TagStore {
        self.store.lock().clone()
    }

    pub(crate) fn with_store<T>(&self, f: impl FnOnce(&TagStore) -> T) -> T {
        f(&self.store.lock())
    }
}

/// Handle onto one format's tag in an open file
pub struct Tag {
    format: String,
    cell: Arc<StoreCell>,
    dirty: Arc<AtomicBool>,
}

impl Tag {
    pub(crate) fn new(format: impl Into<String>, cell: Arc<StoreCell>, dirty: Arc<AtomicBool>) -> Self {
        Self {
            format: format.into(),
            cell,
            dirty,
        }
    }

    /// Format id this handle is bound to
    pub fn format(&self) -> &str {
        &self.format
    }

    /// False once the format was stripped or the container closed
    pub fn is_attached(&self) -> bool {
        self.cell.is_attached()
    }

    pub fn get(&self, key: &str) -> Option<TagValue> {
        self.cell.store.lock().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.cell.store.lock().contains_key(key)
    }

    /// Set a field, keeping its position if it already exists
    ///
    /// New fields go where the format keeps them (the end, for most formats).
    /// Whether the value fits the format is only checked on save.
    pub fn set(&self, key: impl Into<String>, value: impl Into<TagValue>) -> Result<()> {
        let mut store = self.cell.store.lock();
        self.ensure_attached()?;
        store.set(key, value)?;
        self.cell.adapter.arrange(&mut store);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Remove a field; removing an absent key changes nothing
    pub fn remove(&self, key: &str) -> Result<Option<TagValue>> {
        let mut store = self.cell.store.lock();
        self.ensure_attached()?;
        let removed = store.remove(key);
        if removed.is_some() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(removed)
    }

    /// Remove every field
    pub fn clear(&self) -> Result<()> {
        let mut store = self.cell.store.lock();
        self.ensure_attached()?;
        if !store.is_empty() {
            store.clear();
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Snapshot of the fields in insertion order
    ///
    /// Each call takes a fresh snapshot; later writes do not affect an
    /// iterator already handed out.
    pub fn fields(&self) -> std::vec::IntoIter<(String, TagValue)> {
        self.cell.store.lock().fields()
    }

    /// Flattened `key -> string` view (binary values as base64)
    pub fn get_all(&self) -> IndexMap<String, String> {
        self.cell.store.lock().get_all()
    }

    /// Copy of the whole store
    pub fn to_store(&self) -> TagStore {
        self.cell.snapshot()
    }

    pub fn len(&self) -> usize {
        self.cell.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell.store.lock().is_empty()
    }

    /// True when both handles share one underlying store
    pub fn shares_store_with(&self, other: &Tag) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    fn ensure_attached(&self) -> Result<()> {
        if self.cell.is_attached() {
            Ok(())
        } else {
            Err(TagError::Detached(self.format.clone()))
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("format", &self.format)
            .field("attached", &self.is_attached())
            .field("fields", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtag_formats::{Id3v1Adapter, Id3v2Adapter};

    fn handle(dirty: &Arc<AtomicBool>) -> (Arc<StoreCell>, Tag) {
        let adapter = Arc::new(Id3v2Adapter::new());
        let cell = Arc::new(StoreCell::new(adapter, TagStore::new(), Vec::new()));
        let tag = Tag::new("ID3", cell.clone(), dirty.clone());
        (cell, tag)
    }

    #[test]
    fn set_follows_the_format_field_order() {
        let dirty = Arc::new(AtomicBool::new(false));
        let adapter = Arc::new(Id3v1Adapter::new());
        let cell = Arc::new(StoreCell::new(adapter, TagStore::new(), Vec::new()));
        let tag = Tag::new("ID3v1", cell, dirty.clone());

        tag.set("genre", 3_i64).unwrap();
        tag.set("artist", "B").unwrap();
        tag.set("title", "A").unwrap();

        let keys: Vec<_> = tag.fields().map(|(k, _)| k).collect();
        assert_eq!(keys, ["title", "artist", "genre"]);

        let (_cell, id3) = handle(&dirty);
        id3.set("genre", "Rock").unwrap();
        id3.set("artist", "B").unwrap();
        let keys: Vec<_> = id3.fields().map(|(k, _)| k).collect();
        assert_eq!(keys, ["genre", "artist"]);
    }

    #[test]
    fn writes_mark_dirty_and_are_shared() {
        let dirty = Arc::new(AtomicBool::new(false));
        let (cell, first) = handle(&dirty);
        let second = Tag::new("ID3", cell, dirty.clone());

        first.set("title", "X").unwrap();
        assert!(dirty.load(Ordering::SeqCst));
        assert_eq!(second.get("title"), Some(TagValue::from("X")));
        assert!(first.shares_store_with(&second));
    }

    #[test]
    fn removing_absent_key_stays_clean() {
        let dirty = Arc::new(AtomicBool::new(false));
        let (_cell, tag) = handle(&dirty);
        assert_eq!(tag.remove("missing").unwrap(), None);
        tag.clear().unwrap();
        assert!(!dirty.load(Ordering::SeqCst));
    }

    #[test]
    fn detached_handles_reject_writes_but_keep_reads() {
        let dirty = Arc::new(AtomicBool::new(false));
        let (cell, tag) = handle(&dirty);
        tag.set("title", "Before").unwrap();
        cell.detach();

        assert!(matches!(tag.set("title", "After"), Err(TagError::Detached(f)) if f == "ID3"));
        assert!(matches!(tag.remove("title"), Err(TagError::Detached(_))));
        assert_eq!(tag.get("title"), Some(TagValue::from("Before")));
    }

    #[test]
    fn empty_key_is_rejected() {
        let dirty = Arc::new(AtomicBool::new(false));
        let (_cell, tag) = handle(&dirty);
        assert!(matches!(tag.set("", "x"), Err(TagError::EmptyKey)));
        assert!(!dirty.load(Ordering::SeqCst));
    }
}
