use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use librarian_core::{LibraryError, Password, Result};
use tracing::{debug, instrument, warn};
use zip::{result::ZipError, write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::{
    layout::staging_path_for,
    seal::{self, KdfParams, SealError, Sealer},
};

/// A zip archive of named documents, optionally sealed with a password.
///
/// Rewrites never touch the canonical path until the complete new archive is
/// on disk: documents are staged at `temp_path` and renamed over `path`.
#[derive(Debug)]
pub struct ArchiveStore {
    path: PathBuf,
    temp_path: PathBuf,
    kdf: KdfParams,
    sealer: Option<Sealer>,
    handle: Option<ZipArchive<File>>,
}

impl ArchiveStore {
    /// Opens the archive at `path`, creating an empty one if it is missing.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(
        path: impl AsRef<Path>,
        password: Option<Password>,
        kdf: KdfParams,
    ) -> Result<Self> {
        if !path.as_ref().is_file() {
            debug!("archive missing, creating an empty one");
            return Self::create(path, password, kdf, &[]);
        }
        let mut store = Self::detached(path.as_ref(), password, kdf);
        store.reopen()?;
        Ok(store)
    }

    /// Writes a new archive holding `documents` (replacing any file at `path`)
    /// and opens it.
    pub fn create(
        path: impl AsRef<Path>,
        password: Option<Password>,
        kdf: KdfParams,
        documents: &[(&str, &[u8])],
    ) -> Result<Self> {
        let mut store = Self::detached(path.as_ref(), password, kdf);
        store.write_documents_atomic(documents)?;
        store.reopen()?;
        Ok(store)
    }

    /// Opens an existing archive and proves the password by decrypting every
    /// entry it holds. `None` means the password is missing or wrong; nothing
    /// on disk changes either way.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn unlock(
        path: impl AsRef<Path>,
        password: Option<Password>,
        kdf: KdfParams,
    ) -> Result<Option<Self>> {
        let mut store = Self::detached(path.as_ref(), password, kdf);
        store.reopen()?;
        for name in store.entry_names()? {
            match store.read_document(&name) {
                Ok(_) => {}
                Err(err) if err.is_locked() => {
                    debug!(entry = %name, "password rejected");
                    return Ok(None);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(Some(store))
    }

    /// Whether `password` opens the archive at `path`.
    pub fn verify_password(
        path: impl AsRef<Path>,
        password: Option<&Password>,
        kdf: KdfParams,
    ) -> Result<bool> {
        Ok(Self::unlock(path, password.cloned(), kdf)?.is_some())
    }

    fn detached(path: &Path, password: Option<Password>, kdf: KdfParams) -> Self {
        Self {
            path: path.to_path_buf(),
            temp_path: staging_path_for(path),
            kdf,
            sealer: password.map(|password| Sealer::new(password, kdf)),
            handle: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_encrypted(&self) -> bool {
        self.sealer.is_some()
    }

    /// Changes the password used by the next rewrite. `None` stores entries in
    /// the clear from then on.
    pub fn set_password(&mut self, password: Option<Password>) {
        self.sealer = password.map(|password| Sealer::new(password, self.kdf));
    }

    /// Drops the read handle, if any.
    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            debug!(path = %self.path.display(), "archive handle closed");
        }
    }

    pub fn reopen(&mut self) -> Result<()> {
        self.close();
        self.handle = Some(open_archive(&self.path)?);
        Ok(())
    }

    /// Names of the entries in the archive, in stored order.
    pub fn entry_names(&mut self) -> Result<Vec<String>> {
        let archive = match self.handle.take() {
            Some(archive) => archive,
            None => open_archive(&self.path)?,
        };
        let archive = self.handle.insert(archive);
        Ok(archive.file_names().map(str::to_string).collect())
    }

    /// Raw plaintext of the named entry, or `None` if the archive lacks it.
    /// Reopens the handle if the store was closed.
    pub fn read_document(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path.clone();
        let archive = match self.handle.take() {
            Some(archive) => archive,
            None => open_archive(&path)?,
        };
        let archive = self.handle.insert(archive);

        let mut stored = Vec::new();
        match archive.by_name(name) {
            Ok(mut entry) => {
                entry
                    .read_to_end(&mut stored)
                    .map_err(|e| LibraryError::corrupt(&path, format!("{name}: {e}")))?;
            }
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => return Err(zip_failure(&path, err)),
        }

        seal::unseal(self.sealer.as_mut(), &stored)
            .map(Some)
            .map_err(|err| seal_failure(&path, name, err))
    }

    /// Replaces the archive with one holding exactly `documents`.
    ///
    /// The read handle is closed first and stays closed; call [`reopen`] to
    /// keep reading. On failure the previous archive is left untouched.
    ///
    /// [`reopen`]: ArchiveStore::reopen
    #[instrument(skip_all, fields(path = %self.path.display(), entries = documents.len()))]
    pub fn write_documents_atomic(&mut self, documents: &[(&str, &[u8])]) -> Result<()> {
        self.close();
        if let Err(err) = self.stage(documents) {
            discard_staging(&self.temp_path);
            return Err(err);
        }
        self.commit()
    }

    fn stage(&mut self, documents: &[(&str, &[u8])]) -> Result<()> {
        if let Some(parent) = self.temp_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| LibraryError::io(parent, e))?;
            }
        }

        let temp_path = self.temp_path.clone();
        let file = File::create(&temp_path).map_err(|e| LibraryError::io(&temp_path, e))?;
        let mut writer = ZipWriter::new(file);
        for (name, bytes) in documents {
            let (payload, method) = match self.sealer.as_mut() {
                // Ciphertext does not compress.
                Some(sealer) => (
                    sealer
                        .seal(bytes)
                        .map_err(|err| seal_failure(&temp_path, name, err))?,
                    CompressionMethod::Stored,
                ),
                None => (bytes.to_vec(), CompressionMethod::Deflated),
            };
            let options = SimpleFileOptions::default().compression_method(method);
            writer
                .start_file(*name, options)
                .map_err(|e| LibraryError::io(&temp_path, io::Error::from(e)))?;
            writer
                .write_all(&payload)
                .map_err(|e| LibraryError::io(&temp_path, e))?;
        }

        let file = writer
            .finish()
            .map_err(|e| LibraryError::io(&temp_path, io::Error::from(e)))?;
        file.sync_all()
            .map_err(|e| LibraryError::io(&temp_path, e))?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        fs::rename(&self.temp_path, &self.path).map_err(|e| LibraryError::io(&self.path, e))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            sync_dir(parent).map_err(|e| LibraryError::io(parent, e))?;
        }
        debug!(path = %self.path.display(), "archive replaced");
        Ok(())
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).map_err(|e| LibraryError::io(path, e))?;
    ZipArchive::new(file).map_err(|err| zip_failure(path, err))
}

fn zip_failure(path: &Path, err: ZipError) -> LibraryError {
    match err {
        ZipError::Io(source) => LibraryError::io(path, source),
        other => LibraryError::corrupt(path, other),
    }
}

fn seal_failure(path: &Path, entry: &str, err: SealError) -> LibraryError {
    match err {
        err if err.is_password_failure() => LibraryError::Locked {
            path: path.to_path_buf(),
        },
        SealError::Malformed(reason) => LibraryError::corrupt(path, format!("{entry}: {reason}")),
        other => LibraryError::Crypto {
            reason: other.to_string(),
        },
    }
}

/// Flushes a directory entry so a completed rename survives power loss.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

fn discard_staging(temp_path: &Path) {
    match fs::remove_file(temp_path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %temp_path.display(), "could not remove staging archive: {err}"),
    }
}
