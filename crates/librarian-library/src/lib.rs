//! Libraries and their lifecycle: opening and persisting a single library,
//! discovering the libraries in a storage directory, and keeping exactly one
//! of them active.

pub mod library;
pub mod manager;
pub mod registry;

pub use library::{Library, LibraryOptions};
pub use manager::{LibraryManager, PasswordFallback};
pub use registry::LibraryRegistry;
