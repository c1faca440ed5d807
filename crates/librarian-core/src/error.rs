use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors produced by archives, libraries, and the registry.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// A library with this name is already known.
    #[error("library already exists: {name}")]
    DuplicateName { name: String },
    /// The referenced library is not known to the registry.
    #[error("library not found: {name}")]
    NotFound { name: String },
    /// The name cannot be used as a library file name.
    #[error("invalid library name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
    /// The caller declined to supply a working password.
    #[error("password refused for library: {name}")]
    PasswordRefused { name: String },
    /// An entry could not be unsealed with the current password.
    #[error("archive {path} is encrypted and the supplied password does not open it")]
    Locked { path: PathBuf },
    /// The archive exists but is unreadable for reasons unrelated to the password.
    #[error("corrupt archive {path}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },
    /// Key derivation or cipher setup failed.
    #[error("crypto failure: {reason}")]
    Crypto { reason: String },
    /// Filesystem failure.
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The library was already closed.
    #[error("library is closed: {name}")]
    Closed { name: String },
}

pub type Result<T, E = LibraryError> = std::result::Result<T, E>;

impl LibraryError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CorruptArchive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures caused by a missing or wrong password.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}
