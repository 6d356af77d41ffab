/// Error types shared by every mtag crate
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using `TagError`
pub type Result<T> = std::result::Result<T, TagError>;

/// Tag engine error type
#[derive(Error, Debug)]
pub enum TagError {
    /// Path does not exist
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Path exists but cannot be read or replaced
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// A recognized tag block is internally inconsistent
    #[error("Malformed {format} tag: {reason}")]
    Format { format: String, reason: String },

    /// A field cannot be represented by the target format
    #[error("{format} cannot represent field '{key}': {reason}")]
    UnsupportedField {
        format: String,
        key: String,
        reason: String,
    },

    /// Format id registered twice
    #[error("Format already registered: {0}")]
    DuplicateFormat(String),

    /// Format id not present in the registry
    #[error("Unknown tag format: {0}")]
    UnknownFormat(String),

    /// Field keys must be non-empty
    #[error("Field key must not be empty")]
    EmptyKey,

    /// The store behind a handle was stripped or its file was closed
    #[error("{0} tag is no longer attached to its file")]
    Detached(String),

    /// Configuration loading or validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TagError {
    /// Create a format error
    pub fn format(format: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format {
            format: format.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported field error naming the offending key
    pub fn unsupported(
        format: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedField {
            format: format.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Classify a filesystem error for `path`
    ///
    /// Missing paths and permission failures get their own variants so callers
    /// can tell them apart from generic read/write failures.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified_by_kind() {
        let path = Path::new("/music/song.mp3");

        let missing = TagError::from_io(io::Error::from(io::ErrorKind::NotFound), path);
        assert!(matches!(missing, TagError::NotFound(p) if p == path));

        let denied = TagError::from_io(io::Error::from(io::ErrorKind::PermissionDenied), path);
        assert!(matches!(denied, TagError::PermissionDenied(_)));

        let other = TagError::from_io(io::Error::from(io::ErrorKind::UnexpectedEof), path);
        assert!(matches!(other, TagError::Io(_)));
    }

    #[test]
    fn unsupported_field_message_names_the_key() {
        let err = TagError::unsupported("ID3v1", "title", "longer than 30 bytes");
        let msg = err.to_string();
        assert!(msg.contains("'title'"));
        assert!(msg.contains("ID3v1"));
    }
}
