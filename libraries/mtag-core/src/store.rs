//! Ordered field storage for a single tag block

use crate::error::{Result, TagError};
use crate::value::TagValue;
use indexmap::IndexMap;

/// How a decoder resolves a key that appears more than once in a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Later occurrences replace earlier ones (keeping the first position)
    #[default]
    LastWins,
    /// The first occurrence is kept, later ones are dropped
    FirstWins,
}

/// Fields whose canonical decimal text is stored as [`TagValue::Integer`]
///
/// Every format that maps one of these fields decodes it the same way, so a
/// value set as `"3"` reads back as `Integer(3)` before and after a save.
pub const INTEGER_FIELDS: &[&str] = &["tracknumber", "discnumber", "year", "bpm", "length"];

/// Insertion-ordered key/value fields of one tag block
///
/// Keys are unique. Values are not checked against any format here; each
/// adapter validates what it can represent when it encodes.
#[derive(Debug, Clone, Default)]
pub struct TagStore {
    fields: IndexMap<String, TagValue>,
}

/// Two stores are equal when they hold the same fields in the same order
impl PartialEq for TagStore {
    fn eq(&self, other: &Self) -> bool {
        self.fields.iter().eq(other.fields.iter())
    }
}

impl Eq for TagStore {}

fn normalize(key: &str, value: TagValue) -> TagValue {
    match value {
        TagValue::Text(text) if INTEGER_FIELDS.contains(&key) => {
            match TagValue::canonical_integer(&text) {
                Some(n) => TagValue::Integer(n),
                None => TagValue::Text(text),
            }
        }
        value => value,
    }
}

impl TagStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.fields.get(key)
    }

    /// Set a field, replacing any existing value in place
    ///
    /// Canonical decimal text on one of [`INTEGER_FIELDS`] is stored as an
    /// integer.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(TagError::EmptyKey);
        }
        let value = normalize(&key, value.into());
        self.fields.insert(key, value);
        Ok(())
    }

    /// Remove a field, returning its value if it was present
    pub fn remove(&mut self, key: &str) -> Option<TagValue> {
        self.fields.shift_remove(key)
    }

    /// Insert a decoded field according to `policy`
    ///
    /// Returns `true` if a duplicate key was encountered.
    pub fn merge(&mut self, key: String, value: TagValue, policy: MergePolicy) -> bool {
        match self.fields.get_mut(&key) {
            Some(existing) => {
                if policy == MergePolicy::LastWins {
                    *existing = value;
                }
                true
            }
            None => {
                self.fields.insert(key, value);
                false
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Stable sort of the fields by a per-key rank
    pub fn sort_by_rank(&mut self, mut rank: impl FnMut(&str) -> usize) {
        self.fields.sort_by(|a, _, b, _| rank(a.as_str()).cmp(&rank(b.as_str())));
    }

    /// Borrowing iterator in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Owned snapshot of every field in insertion order
    ///
    /// Each call yields a fresh sequence, unaffected by later mutation.
    pub fn fields(&self) -> std::vec::IntoIter<(String, TagValue)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Flattened string view of the store
    pub fn get_all(&self) -> IndexMap<String, String> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_display_string()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a TagStore {
    type Item = (&'a String, &'a TagValue);
    type IntoIter = indexmap::map::Iter<'a, String, TagValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
