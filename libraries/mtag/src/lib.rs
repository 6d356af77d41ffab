//! mtag
//!
//! Read, edit and write audio tag metadata.
//!
//! This crate provides:
//! - [`FileContainer`]: an open file, the tag blocks found in it and the
//!   stores attached to them
//! - [`Tag`]: a handle for reading and writing one format's fields
//! - [`EngineConfig`]: write settings loaded from a file and `MTAG__*`
//!   environment variables
//! - A process-wide [`Registry`] of formats (ID3v2, APEv2, ID3v1 built in)
//!
//! # Example
//!
//! ```rust,no_run
//! # fn example() -> mtag::Result<()> {
//! let mut file = mtag::open("/music/song.mp3")?;
//!
//! if let Some(tag) = file.tag(None, true)? {
//!     println!("title: {:?}", tag.get("title"));
//!     tag.set("title", "New Title")?;
//!     tag.set("tracknumber", 3_i64)?;
//! }
//!
//! file.strip("ID3v1");
//! file.save()?;
//! # Ok(())
//! # }
//! ```
//!
//! Values are only checked against a format when the file is saved: a field
//! the format cannot hold fails `save` with [`TagError::UnsupportedField`]
//! naming the key, and the file is left as it was.

mod config;
mod container;
mod layout;
mod registry;
mod tag;

pub use config::{ApeSettings, EngineConfig, Id3v2Settings};
pub use container::{ContainerState, FileContainer};
pub use registry::{global_registry, install_global_registry};
pub use tag::Tag;

// Re-export the core types callers need alongside the container
pub use mtag_core::{
    Confidence, Decoded, Detection, FieldKind, FieldMapping, MergePolicy, Placement,
    RegisteredFormat, Registry, Result, TagError, TagFormatAdapter, TagStore, TagValue,
    INTEGER_FIELDS,
};
pub use mtag_formats::{
    builtin_registry, register_builtin, ApeAdapter, BuiltinFormats, Id3v1Adapter, Id3v2Adapter,
    Id3v2Version, APE_FORMAT, ID3V1_FORMAT, ID3V2_FORMAT,
};

use std::path::Path;

/// Open a file with the process-wide registry and default settings
pub fn open(path: impl AsRef<Path>) -> Result<FileContainer> {
    FileContainer::open(path)
}
