use std::{
    fs,
    io::{self, Write},
};

use librarian_core::{LibraryError, Password, Result, DEFAULT_LIBRARY};
use librarian_storage::{layout::validate_name, StorageLayout};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::library::{Library, LibraryOptions};

/// The libraries present in one storage directory, plus the pointer to the
/// last active one.
#[derive(Debug)]
pub struct LibraryRegistry {
    layout: StorageLayout,
    options: LibraryOptions,
    names: Vec<String>,
}

impl LibraryRegistry {
    /// Scans the storage directory for library archives. A missing directory
    /// is created, and an empty one is seeded with an unencrypted `Default`
    /// library so the registry is never empty.
    #[instrument(skip_all, fields(root = %layout.root().display()))]
    pub fn discover(layout: StorageLayout, options: LibraryOptions) -> Result<Self> {
        let root = layout.root().to_path_buf();
        let mut names = Vec::new();

        if root.is_dir() {
            for entry in fs::read_dir(&root).map_err(|e| LibraryError::io(&root, e))? {
                let path = entry.map_err(|e| LibraryError::io(&root, e))?.path();
                if !path.is_file() {
                    continue;
                }
                if StorageLayout::is_staging(&path) {
                    debug!(path = %path.display(), "ignoring leftover staging archive");
                    continue;
                }
                match StorageLayout::library_name(&path) {
                    Some(name) if validate_name(&name).is_ok() => names.push(name),
                    Some(name) => debug!(name = %name, "ignoring archive with unusable name"),
                    None => {}
                }
            }
            names.sort();
        } else {
            fs::create_dir_all(&root).map_err(|e| LibraryError::io(&root, e))?;
            debug!("created storage directory");
        }

        let mut registry = Self {
            layout,
            options,
            names,
        };
        if registry.names.is_empty() {
            registry.create(DEFAULT_LIBRARY, None)?;
            debug!("seeded default library");
        }

        info!("{} libraries detected", registry.names.len());
        Ok(registry)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|known| known == name)
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn options(&self) -> &LibraryOptions {
        &self.options
    }

    /// Creates a library archive with default documents and registers it.
    #[instrument(skip(self, password))]
    pub fn create(&mut self, name: &str, password: Option<Password>) -> Result<String> {
        validate_name(name)?;
        if self.contains(name) {
            return Err(LibraryError::DuplicateName {
                name: name.to_string(),
            });
        }

        let mut library = Library::create(&self.layout, name, password, &self.options)?;
        library.close()?;
        self.names.push(name.to_string());
        info!("library created");
        Ok(name.to_string())
    }

    /// Remembers `name` as the library to resume on the next start.
    pub fn record_last_active(&self, name: &str) -> Result<()> {
        let root = self.layout.root();
        let path = self.layout.last_active_path();

        let mut tmp = NamedTempFile::new_in(root).map_err(|e| LibraryError::io(root, e))?;
        tmp.write_all(name.as_bytes())
            .map_err(|e| LibraryError::io(tmp.path(), e))?;
        tmp.flush().map_err(|e| LibraryError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| LibraryError::io(&path, e.error))?;
        debug!(library = name, "recorded last active library");
        Ok(())
    }

    pub fn read_last_active(&self) -> Result<Option<String>> {
        let path = self.layout.last_active_path();
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let name = contents.trim_end_matches(['\r', '\n']);
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(LibraryError::io(path, err)),
        }
    }
}
