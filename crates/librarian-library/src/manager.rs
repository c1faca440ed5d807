use librarian_core::{LibraryError, Password, PasswordPrompt, Result, DEFAULT_LIBRARY};
use librarian_storage::StorageLayout;
use tracing::{info, instrument, warn};

use crate::{
    library::{Library, LibraryOptions},
    registry::LibraryRegistry,
};

/// Record of a request that ended on the default library because the
/// password prompt was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordFallback {
    /// Library that was asked for.
    pub requested: String,
}

/// Keeps at most one library open and remembers it across restarts.
///
/// Switching libraries always closes (and so saves) the previous one before
/// the next is opened.
pub struct LibraryManager<P: PasswordPrompt> {
    registry: LibraryRegistry,
    prompt: P,
    current: Option<Library>,
    fallback: Option<PasswordFallback>,
}

impl<P: PasswordPrompt> LibraryManager<P> {
    pub fn new(registry: LibraryRegistry, prompt: P) -> Self {
        Self {
            registry,
            prompt,
            current: None,
            fallback: None,
        }
    }

    /// Discovers the libraries under `layout` and manages them.
    pub fn open(layout: StorageLayout, options: LibraryOptions, prompt: P) -> Result<Self> {
        Ok(Self::new(LibraryRegistry::discover(layout, options)?, prompt))
    }

    /// Returns the library called `name`, opening it if it is not the active
    /// one already.
    ///
    /// If the password prompt is refused, the default library is returned
    /// instead and the refusal is kept for [`take_fallback`]. A refusal on the
    /// default library itself is returned as an error.
    ///
    /// [`take_fallback`]: LibraryManager::take_fallback
    #[instrument(skip(self, password))]
    pub fn get_library(&mut self, name: &str, password: Option<Password>) -> Result<&mut Library> {
        match self.activate(name, password) {
            Ok(()) => {}
            Err(LibraryError::PasswordRefused { name: refused }) if refused != DEFAULT_LIBRARY => {
                warn!(
                    "password refused while opening library \"{refused}\", switching to the default library"
                );
                self.fallback = Some(PasswordFallback { requested: refused });
                self.activate(DEFAULT_LIBRARY, None)?;
            }
            Err(err) => return Err(err),
        }

        self.current.as_mut().ok_or_else(|| LibraryError::NotFound {
            name: name.to_string(),
        })
    }

    /// Resumes the library that was active when the last session ended, or
    /// the default library on a first run.
    pub fn get_last_library(&mut self) -> Result<&mut Library> {
        match self.registry.read_last_active()? {
            Some(name) if self.registry.contains(&name) => self.get_library(&name, None),
            Some(name) => {
                warn!("last active library \"{name}\" no longer exists, using the default library");
                self.get_default_library()
            }
            None => self.get_default_library(),
        }
    }

    pub fn get_default_library(&mut self) -> Result<&mut Library> {
        self.get_library(DEFAULT_LIBRARY, None)
    }

    /// Creates `name` and makes it the active library.
    pub fn new_library(&mut self, name: &str, password: Option<Password>) -> Result<&mut Library> {
        self.registry.create(name, password.clone())?;
        self.get_library(name, password)
    }

    /// Closes the active library, if any. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        match self.current.take() {
            Some(mut library) => library.close(),
            None => Ok(()),
        }
    }

    pub fn current(&self) -> Option<&Library> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut Library> {
        self.current.as_mut()
    }

    pub fn names(&self) -> &[String] {
        self.registry.names()
    }

    pub fn registry(&self) -> &LibraryRegistry {
        &self.registry
    }

    pub fn prompt(&self) -> &P {
        &self.prompt
    }

    /// The last password-refusal fallback, cleared on read.
    pub fn take_fallback(&mut self) -> Option<PasswordFallback> {
        self.fallback.take()
    }

    fn activate(&mut self, name: &str, password: Option<Password>) -> Result<()> {
        if name == DEFAULT_LIBRARY && !self.registry.contains(name) {
            warn!("default library missing, creating it");
            self.registry.create(DEFAULT_LIBRARY, None)?;
        }
        if !self.registry.contains(name) {
            return Err(LibraryError::NotFound {
                name: name.to_string(),
            });
        }
        if self
            .current
            .as_ref()
            .is_some_and(|library| library.name() == name)
        {
            return Ok(());
        }

        if let Some(mut previous) = self.current.take() {
            previous.close()?;
        }

        let mut library = Library::open(
            self.registry.layout(),
            name,
            password,
            &mut self.prompt,
            self.registry.options(),
        )?;
        if let Err(err) = self.registry.record_last_active(name) {
            // An active library is always the recorded one.
            if let Err(close_err) = library.close() {
                warn!(
                    library = name,
                    "recording last active library failed ({err}), and closing it failed too: {close_err}"
                );
            }
            return Err(err);
        }

        info!(library = name, "library active");
        self.current = Some(library);
        Ok(())
    }
}

impl<P: PasswordPrompt> Drop for LibraryManager<P> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("closing active library on shutdown failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use librarian_core::{documents::DEFAULT_HEADERS, prompt::ScriptedPrompt};
    use librarian_storage::KdfParams;
    use serde_json::{json, Value};

    use super::*;

    fn options() -> LibraryOptions {
        LibraryOptions {
            kdf: KdfParams::minimal(),
            ..LibraryOptions::default()
        }
    }

    fn open_manager(dir: &tempfile::TempDir, prompt: ScriptedPrompt) -> LibraryManager<ScriptedPrompt> {
        LibraryManager::open(StorageLayout::new(dir.path()), options(), prompt).expect("manager")
    }

    #[test]
    fn movies_scenario_round_trips_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());

        let movies = manager.new_library("Movies", None).expect("new library");
        assert_eq!(movies.name(), "Movies");
        assert_eq!(
            Value::Object(movies.config().clone()),
            json!({"headers": DEFAULT_HEADERS})
        );
        assert!(movies.meta().is_empty());

        movies.set_meta(json!({"count": 3}).as_object().cloned().expect("object"));
        movies.save().expect("save");
        manager.close().expect("close");
        assert!(manager.current().is_none());

        let reopened = manager.get_library("Movies", None).expect("reopen");
        assert_eq!(Value::Object(reopened.meta().clone()), json!({"count": 3}));
    }

    #[test]
    fn secret_scenario_falls_back_to_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
            manager
                .new_library("Secret", Some("hunter2".into()))
                .expect("new library");
        }

        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
        let library = manager
            .get_library("Secret", Some("wrong".into()))
            .expect("refusal falls back instead of failing");
        assert_eq!(library.name(), DEFAULT_LIBRARY);
        assert_eq!(manager.prompt().messages().len(), 1);
        assert_eq!(
            manager.take_fallback(),
            Some(PasswordFallback {
                requested: "Secret".into()
            })
        );
        assert_eq!(manager.take_fallback(), None);
        assert_eq!(
            manager.registry().read_last_active().expect("read").as_deref(),
            Some(DEFAULT_LIBRARY)
        );
    }

    #[test]
    fn wrong_password_recovers_through_prompt() {
        let dir = tempfile::tempdir().expect("tempdir");
        open_manager(&dir, ScriptedPrompt::refusing())
            .new_library("Secret", Some("hunter2".into()))
            .expect("new library");

        let mut manager = open_manager(&dir, ScriptedPrompt::new(["still wrong", "hunter2"]));
        let library = manager
            .get_library("Secret", Some("wrong".into()))
            .expect("third candidate unlocks");
        assert_eq!(library.name(), "Secret");
        assert_eq!(manager.prompt().messages().len(), 2);
        assert_eq!(manager.take_fallback(), None);
    }

    #[test]
    fn created_library_opens_with_defaults_and_password() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
            manager
                .registry
                .create("Vault", Some("pw".into()))
                .expect("create");
        }

        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
        let vault = manager
            .get_library("Vault", Some("pw".into()))
            .expect("open with password");
        assert_eq!(vault.headers(), DEFAULT_HEADERS.to_vec());
        assert!(vault.meta().is_empty());
        assert!(vault.is_encrypted());
    }

    #[test]
    fn same_name_returns_the_open_library() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
        manager
            .get_default_library()
            .expect("default")
            .meta_mut()
            .insert("unsaved".into(), json!(true));

        let again = manager.get_library(DEFAULT_LIBRARY, None).expect("again");
        assert_eq!(again.meta()["unsaved"], json!(true));
    }

    #[test]
    fn switching_closes_and_saves_previous_library() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
        manager.new_library("A", None).expect("a");
        manager.new_library("B", None).expect("b");

        manager
            .get_library("A", None)
            .expect("a")
            .meta_mut()
            .insert("touched".into(), json!("yes"));
        let b = manager.get_library("B", None).expect("b");
        assert_eq!(b.name(), "B");

        let current = manager.current().expect("one open library");
        assert_eq!(current.name(), "B");
        assert!(!current.is_closed());
        assert_eq!(
            manager.registry().read_last_active().expect("read").as_deref(),
            Some("B")
        );

        let a = manager.get_library("A", None).expect("a again");
        assert_eq!(a.meta()["touched"], json!("yes"));
    }

    #[test]
    fn unknown_library_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
        manager.get_default_library().expect("default");

        let err = manager.get_library("Nope", None).expect_err("unknown");
        assert!(matches!(err, LibraryError::NotFound { .. }));
        assert_eq!(
            manager.current().map(Library::name),
            Some(DEFAULT_LIBRARY),
            "a failed lookup leaves the active library alone"
        );
    }

    #[test]
    fn last_library_resumes_after_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
            manager.new_library("Series", None).expect("series");
        }

        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
        assert_eq!(
            manager.get_last_library().expect("last").name(),
            "Series"
        );
    }

    #[test]
    fn first_run_resumes_default_library() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
        assert_eq!(manager.names(), ["Default"]);
        assert_eq!(
            manager.get_last_library().expect("last").name(),
            DEFAULT_LIBRARY
        );
    }

    #[test]
    fn stale_last_active_pointer_uses_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
        manager
            .registry()
            .record_last_active("Deleted")
            .expect("record");

        assert_eq!(
            manager.get_last_library().expect("last").name(),
            DEFAULT_LIBRARY
        );
    }

    #[test]
    fn refusal_on_default_library_propagates() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
            manager
                .get_default_library()
                .expect("default")
                .set_password(Some("locked".into()));
        }

        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
        let err = manager
            .get_default_library()
            .expect_err("no fallback from the fallback");
        assert!(matches!(err, LibraryError::PasswordRefused { .. }));
        assert!(manager.current().is_none());
        assert_eq!(manager.take_fallback(), None);
    }

    #[test]
    fn refusal_with_encrypted_default_propagates_after_one_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
            manager
                .new_library("Secret", Some("s".into()))
                .expect("secret");
            manager
                .get_default_library()
                .expect("default")
                .set_password(Some("d".into()));
        }

        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
        let err = manager
            .get_library("Secret", None)
            .expect_err("both libraries refused");
        assert!(matches!(
            err,
            LibraryError::PasswordRefused { ref name } if name == DEFAULT_LIBRARY
        ));
        assert_eq!(manager.prompt().messages().len(), 2);
    }

    #[test]
    fn missing_default_is_created_on_demand() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = StorageLayout::new(dir.path());
        librarian_storage::ArchiveStore::create(
            layout.archive_path("Movies"),
            None,
            KdfParams::minimal(),
            &[],
        )
        .expect("archive");

        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
        assert_eq!(manager.names(), ["Movies"]);
        assert_eq!(
            manager.get_default_library().expect("default").name(),
            DEFAULT_LIBRARY
        );
        assert_eq!(manager.names(), ["Movies", "Default"]);
    }

    #[test]
    fn unrecorded_library_is_not_left_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
        manager.new_library("Movies", None).expect("movies");
        manager.close().expect("close");

        let last_active = manager.registry().layout().last_active_path();
        std::fs::remove_file(&last_active).expect("remove side file");
        std::fs::create_dir(&last_active).expect("block side file");

        let err = manager
            .get_library("Movies", None)
            .expect_err("side file cannot be written");
        assert!(matches!(err, LibraryError::Io { .. }));
        assert!(manager.current().is_none());
    }

    #[test]
    fn close_is_safe_to_repeat() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut manager = open_manager(&dir, ScriptedPrompt::refusing());
        manager.get_default_library().expect("default");
        manager.close().expect("close");
        manager.close().expect("close again");
        assert!(manager.current().is_none());
    }
}
