//! The operation error taxonomy.
//!
//! One identifier per failure class; the transport maps identifiers to HTTP
//! status codes via [`FsError::http_status`]. Host I/O errors funnel through
//! `From<io::Error>`; anything without a mapping becomes `EIO` with the
//! original message as details.

use std::io;
use thiserror::Error;

/// Operation error. The display string is the `details` field on the wire.
#[derive(Debug, Error)]
pub enum FsError {
    /// Malformed input, illegal name, out-of-range mode or size.
    #[error("invalid: {0}")]
    Invalid(String),

    /// Permission denied or ownership change refused.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// No such file, inode, or path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Target required to be a directory but wasn't.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Target must not be a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Create collided with an existing entry.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// rmdir on a non-empty directory.
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// Backing store and metadata disagree, or an unclassified host failure.
    #[error("I/O failure: {0}")]
    Io(String),
}

impl FsError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn not_a_directory(msg: impl Into<String>) -> Self {
        Self::NotADirectory(msg.into())
    }

    pub fn is_a_directory(msg: impl Into<String>) -> Self {
        Self::IsADirectory(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn not_empty(msg: impl Into<String>) -> Self {
        Self::NotEmpty(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// A divergence between the backing store and the metadata store.
    pub fn mismatch(path: &str, detail: &str) -> Self {
        Self::Io(format!("metadata mismatch at {path}: {detail}"))
    }

    /// The wire identifier of this error class.
    pub fn identifier(&self) -> &'static str {
        match self {
            FsError::Invalid(_) => "EINVAL",
            FsError::AccessDenied(_) => "EACCES",
            FsError::NotFound(_) => "ENOENT",
            FsError::NotADirectory(_) => "ENOTDIR",
            FsError::IsADirectory(_) => "EISDIR",
            FsError::AlreadyExists(_) => "EEXIST",
            FsError::NotEmpty(_) => "ENOTEMPTY",
            FsError::Io(_) => "EIO",
        }
    }

    /// HTTP status the transport responds with for this class.
    pub fn http_status(&self) -> u16 {
        match self {
            FsError::Invalid(_) | FsError::NotADirectory(_) | FsError::IsADirectory(_) => 400,
            FsError::AccessDenied(_) => 403,
            FsError::NotFound(_) => 404,
            FsError::AlreadyExists(_) | FsError::NotEmpty(_) => 409,
            FsError::Io(_) => 500,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(e.to_string()),
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists(e.to_string()),
            io::ErrorKind::PermissionDenied => FsError::AccessDenied(e.to_string()),
            io::ErrorKind::NotADirectory => FsError::NotADirectory(e.to_string()),
            io::ErrorKind::IsADirectory => FsError::IsADirectory(e.to_string()),
            io::ErrorKind::DirectoryNotEmpty => FsError::NotEmpty(e.to_string()),
            io::ErrorKind::InvalidInput => FsError::Invalid(e.to_string()),
            _ => FsError::Io(e.to_string()),
        }
    }
}

impl From<rusqlite::Error> for FsError {
    fn from(e: rusqlite::Error) -> Self {
        FsError::Io(format!("metadata store: {e}"))
    }
}

/// Operation result type.
pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_and_status() {
        assert_eq!(FsError::invalid("x").identifier(), "EINVAL");
        assert_eq!(FsError::invalid("x").http_status(), 400);
        assert_eq!(FsError::access_denied("x").http_status(), 403);
        assert_eq!(FsError::not_found("x").http_status(), 404);
        assert_eq!(FsError::already_exists("x").http_status(), 409);
        assert_eq!(FsError::not_empty("x").http_status(), 409);
        assert_eq!(FsError::mismatch("/a", "no row").http_status(), 500);
    }

    #[test]
    fn test_io_error_mapping() {
        let e: FsError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(e.identifier(), "ENOENT");

        let e: FsError = io::Error::new(io::ErrorKind::AlreadyExists, "there").into();
        assert_eq!(e.identifier(), "EEXIST");

        let e: FsError = io::Error::new(io::ErrorKind::DirectoryNotEmpty, "full").into();
        assert_eq!(e.identifier(), "ENOTEMPTY");

        let e: FsError = io::Error::other("weird").into();
        assert_eq!(e.identifier(), "EIO");
    }
}
