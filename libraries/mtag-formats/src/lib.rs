//! mtag Formats
//!
//! Concrete tag format adapters for mtag:
//!
//! - [`Id3v2Adapter`] (`"ID3"`): frame-based tags at the start of the file
//! - [`ApeAdapter`] (`"APE"`): flat typed key/value items at the end
//! - [`Id3v1Adapter`] (`"ID3v1"`): the fixed 128-byte trailer
//!
//! # Example
//!
//! ```rust
//! use mtag_core::{TagFormatAdapter, TagStore};
//! use mtag_formats::Id3v2Adapter;
//!
//! # fn example() -> mtag_core::Result<()> {
//! let mut store = TagStore::new();
//! store.set("title", "Song")?;
//! store.set("tracknumber", 3_i64)?;
//!
//! let adapter = Id3v2Adapter::new();
//! let bytes = adapter.encode(&store)?;
//! assert_eq!(adapter.decode(&bytes)?, store);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod ape;
mod id3v1;
mod id3v2;
mod text;

pub use ape::ApeAdapter;
pub use id3v1::Id3v1Adapter;
pub use id3v2::{Id3v2Adapter, Id3v2Version, MAX_PADDING as ID3V2_MAX_PADDING};

use mtag_core::{Registry, Result};
use std::sync::Arc;

/// Format id of ID3v2 tags
pub const ID3V2_FORMAT: &str = id3v2::FORMAT;
/// Format id of APEv2 tags
pub const APE_FORMAT: &str = ape::FORMAT;
/// Format id of ID3v1 trailers
pub const ID3V1_FORMAT: &str = id3v1::FORMAT;

/// Field maps, for callers that want to show which neutral names exist
pub mod field_maps {
    pub use crate::ape::FIELD_MAP as APE;
    pub use crate::id3v1::FIELD_MAP as ID3V1;
    pub use crate::id3v2::{FIELD_MAP_V23 as ID3V23, FIELD_MAP_V24 as ID3V24};
}

/// The built-in adapters with their write settings
#[derive(Debug, Clone, Default)]
pub struct BuiltinFormats {
    pub id3v2: Id3v2Adapter,
    pub ape: ApeAdapter,
    pub id3v1: Id3v1Adapter,
}

impl BuiltinFormats {
    /// Register all built-in formats
    ///
    /// Detection runs ID3v2, then APE, then ID3v1.
    pub fn register_into(self, registry: &mut Registry) -> Result<()> {
        registry.register(ID3V2_FORMAT, Arc::new(self.id3v2))?;
        registry.register(APE_FORMAT, Arc::new(self.ape))?;
        registry.register(ID3V1_FORMAT, Arc::new(self.id3v1))?;
        Ok(())
    }
}

/// Register the built-in formats with default settings
pub fn register_builtin(registry: &mut Registry) -> Result<()> {
    BuiltinFormats::default().register_into(registry)
}

/// A fresh registry holding the built-in formats with default settings
pub fn builtin_registry() -> Result<Registry> {
    let mut registry = Registry::new();
    register_builtin(&mut registry)?;
    Ok(registry)
}
