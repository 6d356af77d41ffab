//! Format Registry
//!
//! Maps format ids ("ID3", "APE", ...) to adapters. A registry is filled once
//! at startup and then only read, so it can be shared across threads behind an
//! `Arc` without locking.

use crate::adapter::{Detection, TagFormatAdapter};
use crate::error::{Result, TagError};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// A registered adapter together with its format id
#[derive(Debug, Clone)]
pub struct RegisteredFormat {
    pub id: String,
    pub adapter: Arc<dyn TagFormatAdapter>,
}

/// Registry of available tag formats, in registration order
#[derive(Debug, Default, Clone)]
pub struct Registry {
    formats: Vec<RegisteredFormat>,
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    /// Register an adapter under `format_id`
    ///
    /// Registration order is detection order.
    pub fn register(
        &mut self,
        format_id: impl Into<String>,
        adapter: Arc<dyn TagFormatAdapter>,
    ) -> Result<()> {
        let id = format_id.into();
        if self.is_registered(&id) {
            return Err(TagError::DuplicateFormat(id));
        }
        debug!("Registered tag format {} ({})", id, adapter.name());
        self.formats.push(RegisteredFormat { id, adapter });
        Ok(())
    }

    /// Get an adapter by format id
    pub fn get(&self, format_id: &str) -> Option<&Arc<dyn TagFormatAdapter>> {
        self.formats
            .iter()
            .find(|f| f.id == format_id)
            .map(|f| &f.adapter)
    }

    pub fn is_registered(&self, format_id: &str) -> bool {
        self.formats.iter().any(|f| f.id == format_id)
    }

    /// All registered formats in registration order
    pub fn formats(&self) -> &[RegisteredFormat] {
        &self.formats
    }

    /// Registered format ids in registration order
    pub fn format_ids(&self) -> Vec<&str> {
        self.formats.iter().map(|f| f.id.as_str()).collect()
    }

    /// Position of a format in registration order
    pub fn position(&self, format_id: &str) -> Option<usize> {
        self.formats.iter().position(|f| f.id == format_id)
    }

    /// First registered format whose `detect` matches the data
    pub fn resolve(&self, data: &[u8]) -> Option<&RegisteredFormat> {
        self.formats.iter().find(|f| f.adapter.detect(data).is_match())
    }

    /// Run every adapter's `detect`, in registration order
    pub fn detect_all<'a>(
        &'a self,
        data: &'a [u8],
    ) -> impl Iterator<Item = (&'a RegisteredFormat, Detection)> + 'a {
        self.formats.iter().map(move |f| (f, f.adapter.detect(data)))
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Confidence, FieldMapping, Placement};
    use crate::store::TagStore;

    /// Adapter that matches when the file starts with its magic
    #[derive(Debug)]
    struct MagicAdapter(&'static [u8]);

    impl TagFormatAdapter for MagicAdapter {
        fn name(&self) -> &'static str {
            "magic"
        }

        fn detect(&self, file: &[u8]) -> Detection {
            if file.starts_with(self.0) {
                Detection::Match {
                    region: 0..self.0.len(),
                    confidence: Confidence::Certain,
                }
            } else {
                Detection::NoMatch
            }
        }

        fn decode(&self, _region: &[u8]) -> Result<TagStore> {
            Ok(TagStore::new())
        }

        fn encode(&self, _store: &TagStore) -> Result<Vec<u8>> {
            Ok(self.0.to_vec())
        }

        fn placement(&self) -> Placement {
            Placement::Leading { order: 0 }
        }

        fn default_field_map(&self) -> &'static [FieldMapping] {
            &[]
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = Registry::new();
        registry
            .register("AB", Arc::new(MagicAdapter(b"AB")))
            .unwrap();
        let err = registry
            .register("AB", Arc::new(MagicAdapter(b"XY")))
            .unwrap_err();
        assert!(matches!(err, TagError::DuplicateFormat(id) if id == "AB"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resolve_uses_registration_order() {
        let mut registry = Registry::new();
        registry.register("A", Arc::new(MagicAdapter(b"A"))).unwrap();
        registry
            .register("AB", Arc::new(MagicAdapter(b"AB")))
            .unwrap();

        // Both match "ABC"; the first registered wins
        assert_eq!(registry.resolve(b"ABC").unwrap().id, "A");
        assert!(registry.resolve(b"ZZZ").is_none());
        assert_eq!(registry.format_ids(), ["A", "AB"]);
        assert_eq!(registry.position("AB"), Some(1));
    }

    #[test]
    fn get_unknown_format_is_none() {
        let registry = Registry::new();
        assert!(registry.get("ID3").is_none());
        assert!(registry.is_empty());
    }
}
