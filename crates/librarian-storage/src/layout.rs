use std::path::{Path, PathBuf};

use librarian_core::{LibraryError, Result};

/// Extension of library archives.
pub const ARCHIVE_EXTENSION: &str = "zip";
/// Side file holding the name of the last active library.
pub const LAST_ACTIVE_FILE: &str = "last.txt";

const STAGING_MARKER: &str = ".tmp";

/// Where libraries live on disk: `<root>/<name>.zip`, the staging file
/// `<root>/<name>.tmp.zip`, and `<root>/last.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{ARCHIVE_EXTENSION}"))
    }

    pub fn staging_path(&self, name: &str) -> PathBuf {
        staging_path_for(&self.archive_path(name))
    }

    pub fn last_active_path(&self) -> PathBuf {
        self.root.join(LAST_ACTIVE_FILE)
    }

    /// Library name for a directory entry, if it is a library archive.
    /// Staging leftovers are not libraries.
    pub fn library_name(path: &Path) -> Option<String> {
        if path.extension()? != ARCHIVE_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        if stem.ends_with(STAGING_MARKER) {
            return None;
        }
        Some(stem.to_string())
    }

    pub fn is_staging(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION)
            && path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem.ends_with(STAGING_MARKER))
    }
}

/// Staging path used while rewriting `archive`: `name.zip` becomes `name.tmp.zip`.
pub fn staging_path_for(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match archive.extension() {
        Some(ext) => format!("{stem}{STAGING_MARKER}.{}", ext.to_string_lossy()),
        None => format!("{stem}{STAGING_MARKER}"),
    };
    archive.with_file_name(file_name)
}

/// Rejects names that cannot map one-to-one onto an archive file.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        Some("name is empty")
    } else if name.contains(['/', '\\', '\0']) {
        Some("name contains a path separator")
    } else if name.starts_with('.') {
        Some("name starts with a dot")
    } else if name.ends_with(STAGING_MARKER) {
        Some("name collides with staging files")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(LibraryError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_naming_scheme() {
        let layout = StorageLayout::new("/data/libraries");
        assert_eq!(
            layout.archive_path("Movies"),
            PathBuf::from("/data/libraries/Movies.zip")
        );
        assert_eq!(
            layout.staging_path("Movies"),
            PathBuf::from("/data/libraries/Movies.tmp.zip")
        );
        assert_eq!(
            layout.last_active_path(),
            PathBuf::from("/data/libraries/last.txt")
        );
    }

    #[test]
    fn discovery_skips_staging_and_foreign_files() {
        assert_eq!(
            StorageLayout::library_name(Path::new("a/Movies.zip")).as_deref(),
            Some("Movies")
        );
        assert_eq!(StorageLayout::library_name(Path::new("a/Movies.tmp.zip")), None);
        assert_eq!(StorageLayout::library_name(Path::new("a/last.txt")), None);
        assert!(StorageLayout::is_staging(Path::new("a/Movies.tmp.zip")));
        assert!(!StorageLayout::is_staging(Path::new("a/Movies.zip")));
    }

    #[test]
    fn names_with_dots_keep_their_stem() {
        let layout = StorageLayout::new("root");
        let path = layout.archive_path("v1.2 backup");
        assert_eq!(
            StorageLayout::library_name(&path).as_deref(),
            Some("v1.2 backup")
        );
        assert_eq!(
            layout.staging_path("v1.2 backup"),
            PathBuf::from("root/v1.2 backup.tmp.zip")
        );
    }

    #[test]
    fn rejects_unusable_names() {
        for name in ["", "  ", "a/b", "a\\b", ".hidden", "movies.tmp"] {
            let err = validate_name(name).expect_err("name should be rejected");
            assert!(matches!(err, LibraryError::InvalidName { .. }), "{name:?}");
        }
        validate_name("Movies 2024").expect("plain names are fine");
    }
}
