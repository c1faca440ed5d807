use std::path::Path;

use librarian_core::{
    documents::{self, Document, CONFIG_DOCUMENT, DEFAULT_HEADERS, HEADERS_KEY, META_DOCUMENT},
    LibraryError, Password, PasswordPrompt, Result,
};
use librarian_storage::{layout::validate_name, ArchiveStore, KdfParams, StorageLayout};
use tracing::{debug, info, instrument, warn};

/// Settings applied to every library a registry opens or creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryOptions {
    /// Header flags used when a config has none.
    pub default_headers: Vec<bool>,
    pub kdf: KdfParams,
}

impl Default for LibraryOptions {
    fn default() -> Self {
        Self {
            default_headers: DEFAULT_HEADERS.to_vec(),
            kdf: KdfParams::default(),
        }
    }
}

/// One open library: its archive plus the config and metadata documents held
/// in memory until the next [`save`](Library::save).
///
/// Call [`close`](Library::close) when done. Dropping an open library closes
/// it too, but any failure is only logged.
#[derive(Debug)]
pub struct Library {
    name: String,
    config: Document,
    meta: Document,
    default_headers: Vec<bool>,
    store: ArchiveStore,
    closed: bool,
}

impl Library {
    /// Opens `name`, creating it with default documents if it has no archive
    /// yet. An encrypted archive is retried through `prompt` until a password
    /// works or the prompt refuses.
    #[instrument(skip_all, fields(library = name))]
    pub fn open(
        layout: &StorageLayout,
        name: &str,
        password: Option<Password>,
        prompt: &mut dyn PasswordPrompt,
        options: &LibraryOptions,
    ) -> Result<Self> {
        validate_name(name)?;
        let path = layout.archive_path(name);
        if !path.is_file() {
            return Self::create_at(&path, name, password, options);
        }

        let store = unlock_with_prompt(&path, name, password, prompt, options.kdf)?;
        Self::load(name, store, options)
    }

    /// Creates a new library. Fails with `DuplicateName` if its archive exists.
    #[instrument(skip_all, fields(library = name))]
    pub fn create(
        layout: &StorageLayout,
        name: &str,
        password: Option<Password>,
        options: &LibraryOptions,
    ) -> Result<Self> {
        validate_name(name)?;
        let path = layout.archive_path(name);
        if path.exists() {
            return Err(LibraryError::DuplicateName {
                name: name.to_string(),
            });
        }
        Self::create_at(&path, name, password, options)
    }

    fn create_at(
        path: &Path,
        name: &str,
        password: Option<Password>,
        options: &LibraryOptions,
    ) -> Result<Self> {
        let config = documents::default_config(&options.default_headers);
        let meta = Document::new();
        let store = ArchiveStore::create(
            path,
            password,
            options.kdf,
            &[
                (CONFIG_DOCUMENT, documents::encode(&config).as_slice()),
                (META_DOCUMENT, documents::encode(&meta).as_slice()),
            ],
        )?;
        debug!(encrypted = store.is_encrypted(), "library archive created");

        Ok(Self {
            name: name.to_string(),
            config,
            meta,
            default_headers: options.default_headers.clone(),
            store,
            closed: false,
        })
    }

    fn load(name: &str, mut store: ArchiveStore, options: &LibraryOptions) -> Result<Self> {
        let config = read_document(&mut store, CONFIG_DOCUMENT)?
            .unwrap_or_else(|| documents::default_config(&options.default_headers));
        let meta = read_document(&mut store, META_DOCUMENT)?.unwrap_or_default();
        debug!(meta_keys = meta.len(), "library loaded");

        Ok(Self {
            name: name.to_string(),
            config,
            meta,
            default_headers: options.default_headers.clone(),
            store,
            closed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn config(&self) -> &Document {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Document {
        &mut self.config
    }

    pub fn meta(&self) -> &Document {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Document {
        &mut self.meta
    }

    pub fn set_meta(&mut self, meta: Document) {
        self.meta = meta;
    }

    /// Column visibility flags, or the defaults if the config has none.
    pub fn headers(&self) -> Vec<bool> {
        documents::headers_from(&self.config, &self.default_headers)
    }

    pub fn set_headers(&mut self, headers: &[bool]) {
        self.config
            .insert(HEADERS_KEY.to_string(), documents::headers_value(headers));
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_encrypted(&self) -> bool {
        self.store.is_encrypted()
    }

    /// Sets, changes, or removes the password. Applies from the next save.
    pub fn set_password(&mut self, password: Option<Password>) {
        self.store.set_password(password);
    }

    /// Writes both documents to the archive and keeps the library open.
    pub fn save(&mut self) -> Result<()> {
        if self.closed {
            return Err(LibraryError::Closed {
                name: self.name.clone(),
            });
        }
        self.persist(true)
    }

    /// Saves one last time and releases the archive. Later calls do nothing,
    /// even if this one failed.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = self.persist(false);
        self.store.close();
        match &result {
            Ok(()) => debug!(library = %self.name, "library closed"),
            Err(err) => warn!(library = %self.name, "final save failed: {err}"),
        }
        result
    }

    fn persist(&mut self, keep_open: bool) -> Result<()> {
        let config = documents::encode(&self.config);
        let meta = documents::encode(&self.meta);
        self.store.write_documents_atomic(&[
            (CONFIG_DOCUMENT, config.as_slice()),
            (META_DOCUMENT, meta.as_slice()),
        ])?;
        if keep_open {
            self.store.reopen()?;
        }
        debug!(library = %self.name, "library saved");
        Ok(())
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        if !self.closed {
            debug!(library = %self.name, "library dropped while open, closing");
            // close() already logs a failed final save.
            let _ = self.close();
        }
    }
}

fn unlock_with_prompt(
    path: &Path,
    name: &str,
    mut password: Option<Password>,
    prompt: &mut dyn PasswordPrompt,
    kdf: KdfParams,
) -> Result<ArchiveStore> {
    let mut attempt = 0usize;
    loop {
        if let Some(store) = ArchiveStore::unlock(path, password.clone(), kdf)? {
            debug!(attempt, "password check passed");
            return Ok(store);
        }

        let message = if attempt == 0 && password.is_none() {
            debug!("password required, prompting");
            format!("Library \"{name}\" is encrypted. Enter its password:")
        } else {
            "The password was incorrect. Try again:".to_string()
        };
        match prompt.request(&message) {
            Some(input) => password = Password::from_input(input),
            None => {
                info!("password prompt refused");
                return Err(LibraryError::PasswordRefused {
                    name: name.to_string(),
                });
            }
        }
        attempt += 1;
    }
}

fn read_document(store: &mut ArchiveStore, entry: &str) -> Result<Option<Document>> {
    match store.read_document(entry)? {
        Some(bytes) => documents::decode(&bytes)
            .map(Some)
            .map_err(|reason| LibraryError::corrupt(store.path(), format!("{entry}: {reason}"))),
        None => Ok(None),
    }
}
