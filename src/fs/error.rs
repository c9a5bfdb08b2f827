//! Error types for the locker filesystem
//!
//! Three families live here:
//!
//! - [`FsError`]: the outcome a filesystem callback reports to its caller,
//!   convertible to a POSIX errno.
//! - [`TableError`]: a malformed synthetic-file table, fatal at startup.
//! - [`LookupError`]: what a naming-service client reports. These never
//!   reach the caller directly; the resolver turns them into absence plus
//!   a diagnostic.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for filesystem callbacks
pub type FsResult<T> = Result<T, FsError>;

/// Caller-visible outcome of a filesystem callback
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    /// Unknown name, dotfile, nested path, or failed resolution
    #[error("not found: {0}")]
    NotFound(String),

    /// Attempt to create or remove a link where links are not allowed
    #[error("operation not permitted: {0}")]
    PermissionDenied(String),

    /// Attempt to open a synthetic file for writing
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Link-target query on something that is not a symlink
    #[error("not a symbolic link: {0}")]
    NotASymlink(String),

    /// Malformed request (non-UTF-8 name, negative offset, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl FsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn access_denied(path: impl Into<String>) -> Self {
        Self::AccessDenied(path.into())
    }

    /// POSIX error number reported through the transport
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::PermissionDenied(_) => libc::EPERM,
            FsError::AccessDenied(_) => libc::EACCES,
            FsError::NotASymlink(_) => libc::EINVAL,
            FsError::InvalidArgument(_) => libc::EINVAL,
        }
    }
}

/// Synthetic-file registration failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// Empty, `.`/`..`, or containing a path separator
    #[error("invalid synthetic file name: {0:?}")]
    InvalidName(String),

    /// Content source is neither fixed bytes nor a known generator
    #[error("invalid content type {kind:?} for synthetic file {name:?}")]
    InvalidContentType { name: String, kind: String },

    /// The name is already registered
    #[error("synthetic file {0:?} registered twice")]
    DuplicateName(String),
}

/// Naming-service lookup failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The naming service has no record for the name
    #[error("unknown locker {0}")]
    NotFound(String),

    /// The naming service could not be reached
    #[error("naming service unavailable: {0}")]
    Unavailable(String),

    /// Anything else
    #[error("lookup failed: {0}")]
    Other(String),
}

/// Configuration loading failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("naming service configuration: {0}")]
    Naming(String),
}
