//! Open files and their tag blocks
//!
//! State machine:
//!
//! ```text
//! open ──> Clean ──(set/remove/strip/create)──> Dirty ──(save)──> Clean
//!            └────────────── close / drop ──────────────┘
//! ```
//!
//! Closing never saves. Two containers must not be opened for writing on the
//! same path at the same time; nothing here locks the file.

use crate::config::EngineConfig;
use crate::layout::{self, Region};
use crate::registry::global_registry;
use crate::tag::{StoreCell, Tag};
use indexmap::IndexMap;
use mtag_core::{Confidence, Decoded, Registry, Result, TagError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether a container has changes that `save` would write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Clean,
    Dirty,
}

/// An open audio file and the tag stores attached to it
#[derive(Debug)]
pub struct FileContainer {
    path: PathBuf,
    registry: Arc<Registry>,
    default_format: String,
    /// File length when last read or written
    len: usize,
    regions: Vec<Region>,
    stores: IndexMap<String, Arc<StoreCell>>,
    dirty: Arc<AtomicBool>,
    default_tag: Option<Arc<Tag>>,
}

impl FileContainer {
    /// Open a file using the process-wide registry and default settings
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, global_registry()?, &EngineConfig::default())
    }

    /// Open a file with an explicit registry and configuration
    ///
    /// A file without any recognised tag opens fine; it simply has no store
    /// attached until one is created.
    pub fn open_with(
        path: impl AsRef<Path>,
        registry: Arc<Registry>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = fs::read(&path).map_err(|e| TagError::from_io(e, &path))?;
        let regions = layout::detect_regions(&registry, &data);

        debug!(
            "Opened {} ({} bytes, {} tag block(s))",
            path.display(),
            data.len(),
            regions.len()
        );

        Ok(Self {
            path,
            registry,
            default_format: config.default_format.clone(),
            len: data.len(),
            regions,
            stores: IndexMap::new(),
            dirty: Arc::new(AtomicBool::new(false)),
            default_tag: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ContainerState {
        if self.is_dirty() {
            ContainerState::Dirty
        } else {
            ContainerState::Clean
        }
    }

    /// Formats with a tag block in the file that has not been stripped
    pub fn formats(&self) -> Vec<&str> {
        self.regions
            .iter()
            .filter(|r| !r.stripped)
            .map(|r| r.format.as_str())
            .collect()
    }

    /// Formats with a store attached (read or created)
    pub fn attached_formats(&self) -> Vec<&str> {
        self.stores.keys().map(String::as_str).collect()
    }

    /// The format `tag(None, ..)` binds to
    ///
    /// First registered format that has a store attached or a block in the
    /// file.
    pub fn primary_format(&self) -> Option<&str> {
        self.registry
            .formats()
            .iter()
            .map(|f| f.id.as_str())
            .find(|id| self.stores.contains_key(*id) || self.live_region(id).is_some())
    }

    /// Get the tag for a format
    ///
    /// - `format = None`: the primary format, or the configured default
    ///   format when the file has no tag and `create` is set. Repeated calls
    ///   return the same handle.
    /// - `format = Some(id)`: a new handle on every call, all sharing one
    ///   store per format.
    ///
    /// A missing tag is `Ok(None)` unless `create` is set. An unknown format id
    /// is `Ok(None)` without `create` and [`TagError::UnknownFormat`] with it.
    /// A block that fails to decode is an error without `create`; with
    /// `create` it is replaced by an empty store.
    pub fn tag(&mut self, format: Option<&str>, create: bool) -> Result<Option<Arc<Tag>>> {
        match format {
            None => self.default_tag(create),
            Some(format) => Ok(self
                .bind(format, create)?
                .map(|cell| Arc::new(Tag::new(format, cell, self.dirty.clone())))),
        }
    }

    fn default_tag(&mut self, create: bool) -> Result<Option<Arc<Tag>>> {
        if let Some(tag) = &self.default_tag {
            return Ok(Some(tag.clone()));
        }

        let format = match self.primary_format() {
            Some(format) => format.to_string(),
            None if create => self.default_format.clone(),
            None => return Ok(None),
        };
        let Some(cell) = self.bind(&format, create)? else {
            return Ok(None);
        };

        let tag = Arc::new(Tag::new(format, cell, self.dirty.clone()));
        self.default_tag = Some(tag.clone());
        Ok(Some(tag))
    }

    /// Attach (or find) the store for a format
    fn bind(&mut self, format: &str, create: bool) -> Result<Option<Arc<StoreCell>>> {
        if let Some(cell) = self.stores.get(format) {
            return Ok(Some(cell.clone()));
        }

        let Some(adapter) = self.registry.get(format).cloned() else {
            return if create {
                Err(TagError::UnknownFormat(format.to_string()))
            } else {
                Ok(None)
            };
        };

        let decoded = match self.live_region(format) {
            Some(region) => {
                if region.confidence == Confidence::Likely {
                    debug!(
                        "{} block in {} has an inconsistent header",
                        format,
                        self.path.display()
                    );
                }
                match adapter.decode_report(&region.bytes) {
                    Ok(decoded) => decoded,
                    Err(err) if create => {
                        warn!(
                            "Replacing unreadable {} tag in {}: {}",
                            format,
                            self.path.display(),
                            err
                        );
                        self.dirty.store(true, Ordering::SeqCst);
                        Decoded::default()
                    }
                    Err(err) => return Err(err),
                }
            }
            None if create => {
                debug!("Creating empty {} tag for {}", format, self.path.display());
                self.dirty.store(true, Ordering::SeqCst);
                Decoded::default()
            }
            None => return Ok(None),
        };

        let cell = Arc::new(StoreCell::new(adapter, decoded.store, decoded.skipped));
        self.stores.insert(format.to_string(), cell.clone());
        Ok(Some(cell))
    }

    /// Remove a format's tag; nothing happens if there is none
    ///
    /// Handles bound to the stripped store keep their last contents but
    /// reject further writes.
    pub fn strip(&mut self, format: &str) {
        let cell = self.stores.shift_remove(format);
        if let Some(cell) = &cell {
            cell.detach();
        }

        let mut had_region = false;
        for region in self
            .regions
            .iter_mut()
            .filter(|r| r.format == format && !r.stripped)
        {
            region.stripped = true;
            had_region = true;
        }

        if self
            .default_tag
            .as_ref()
            .is_some_and(|tag| tag.format() == format)
        {
            self.default_tag = None;
        }

        if cell.is_some() || had_region {
            debug!("Stripped {} tag from {}", format, self.path.display());
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    /// Write all attached stores to disk
    ///
    /// Every attached store is encoded (dirty or not); blocks that were never
    /// read are copied unchanged, stripped blocks are dropped and all other
    /// bytes are kept as they are. The file is replaced atomically, so on any
    /// error it is left untouched and the container stays dirty.
    pub fn save(&mut self) -> Result<()> {
        let current = fs::read(&self.path).map_err(|e| TagError::from_io(e, &self.path))?;
        if current.len() != self.len {
            return Err(TagError::Io(io::Error::other(format!(
                "{} changed on disk since it was read ({} bytes, now {})",
                self.path.display(),
                self.len,
                current.len()
            ))));
        }

        let mut blocks = Vec::new();
        for format in self.registry.formats() {
            let adapter = &format.adapter;
            if let Some(cell) = self.stores.get(&format.id) {
                let bytes = cell.with_store(|store| adapter.encode(store))?;
                let skipped = cell.skipped();
                if !skipped.is_empty() {
                    warn!(
                        "Rewriting {} tag in {} without {} unreadable or repeated entries: {:?}",
                        format.id,
                        self.path.display(),
                        skipped.len(),
                        skipped
                    );
                }
                blocks.push((adapter.placement(), bytes));
            } else if let Some(region) = self.live_region(&format.id) {
                blocks.push((adapter.placement(), region.bytes.clone()));
            }
        }

        let removed: Vec<_> = self.regions.iter().map(|r| r.range.clone()).collect();
        let output = layout::assemble(&current, &removed, blocks);
        layout::write_atomic(&self.path, &output)?;

        for cell in self.stores.values() {
            cell.clear_skipped();
        }
        self.regions = layout::detect_regions(&self.registry, &output);
        self.len = output.len();
        self.dirty.store(false, Ordering::SeqCst);

        info!(
            "Saved {} ({} bytes, tags: {:?})",
            self.path.display(),
            output.len(),
            self.formats()
        );
        Ok(())
    }

    /// Entries of a read block that its store does not hold
    ///
    /// Compressed or encrypted frames, frames without an owner and repeated
    /// keys dropped by the format's merge policy are listed here until a save
    /// writes the store without them.
    pub fn dropped_entries(&self, format: &str) -> Vec<String> {
        self.stores
            .get(format)
            .map(|cell| cell.skipped())
            .unwrap_or_default()
    }

    /// Close without saving
    pub fn close(self) {
        if self.is_dirty() {
            warn!("Closing {} with unsaved tag changes", self.path.display());
        } else {
            debug!("Closed {}", self.path.display());
        }
    }

    fn live_region(&self, format: &str) -> Option<&Region> {
        self.regions
            .iter()
            .find(|r| r.format == format && !r.stripped)
    }
}

impl Drop for FileContainer {
    fn drop(&mut self) {
        for cell in self.stores.values() {
            cell.detach();
        }
    }
}
