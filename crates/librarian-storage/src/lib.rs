//! Archive storage for libraries: file layout, password sealing, and the zip
//! container with crash-safe rewrites.
//! Sealed entries use AES-256-GCM with keys derived from the library password.

pub mod archive;
pub mod layout;
pub mod seal;

pub use archive::ArchiveStore;
pub use layout::StorageLayout;
pub use seal::KdfParams;
