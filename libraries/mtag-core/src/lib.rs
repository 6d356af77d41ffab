//! mtag Core
//!
//! Format-independent building blocks of the mtag tag engine:
//!
//! - [`TagValue`] and [`TagStore`]: ordered fields of one tag block
//! - [`TagFormatAdapter`]: the codec trait every on-disk format implements
//! - [`Registry`]: format id to adapter table, consulted when a file is opened
//! - [`TagError`]: the error taxonomy shared by all mtag crates
//!
//! Nothing in this crate touches the filesystem.

mod adapter;
mod error;
mod registry;
mod store;
mod value;

pub use adapter::{
    Confidence, Decoded, Detection, FieldKind, FieldMapping, Placement, TagFormatAdapter,
};
pub use error::{Result, TagError};
pub use registry::{RegisteredFormat, Registry};
pub use store::{MergePolicy, TagStore, INTEGER_FIELDS};
pub use value::TagValue;
