//! Core contracts for Librarian: the error taxonomy, password handling, the
//! password prompt capability, and the document model shared by every crate.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod documents;
pub mod error;
pub mod password;
pub mod prompt;

pub use error::{LibraryError, Result};
pub use password::Password;
pub use prompt::PasswordPrompt;

/// Name of the library seeded on first run and used as the refusal fallback.
pub const DEFAULT_LIBRARY: &str = "Default";
