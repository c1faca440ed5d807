use std::path::PathBuf;

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use librarian_core::PasswordPrompt;
use librarian_library::LibraryManager;
use librarian_storage::StorageLayout;
use tracing::debug;

/// Resolve the default data directory for Librarian.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("librarian"))
}

/// Storage layout honoring the config override.
pub fn layout_from_config(config: &Config) -> Result<StorageLayout> {
    if let Some(root) = &config.data_dir {
        debug!(?root, "using library directory (config override)");
        return Ok(StorageLayout::new(root.clone()));
    }

    let root = default_data_dir()?;
    debug!(?root, "using library directory");
    Ok(StorageLayout::new(root))
}

/// Discover the libraries on disk and wrap them in a manager.
pub fn manager_from_config<P: PasswordPrompt>(
    config: &Config,
    prompt: P,
) -> Result<LibraryManager<P>> {
    let layout = layout_from_config(config)?;
    let options = config.library_options()?;
    Ok(LibraryManager::open(layout, options, prompt)?)
}

/// Config pointing at a temp dir with the cheapest KDF, for tests.
#[cfg(test)]
pub fn test_config(root: impl Into<PathBuf>) -> Config {
    Config {
        data_dir: Some(root.into()),
        kdf: Some(librarian_storage::KdfParams::minimal()),
        ..Config::default()
    }
}

#[cfg(test)]
mod tests {
    use librarian_core::prompt::ScriptedPrompt;

    use super::*;

    #[test]
    fn config_override_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout_from_config(&test_config(dir.path())).expect("layout");
        assert_eq!(layout.root(), dir.path());
    }

    #[test]
    fn manager_bootstraps_default_library() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = manager_from_config(
            &test_config(dir.path().join("libraries")),
            ScriptedPrompt::refusing(),
        )
        .expect("manager");
        assert_eq!(manager.names(), ["Default"]);
        assert!(dir.path().join("libraries").join("Default.zip").is_file());
    }

    #[test]
    fn bad_header_config_fails_before_touching_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            default_headers: Some(vec![]),
            ..test_config(dir.path().join("libraries"))
        };
        assert!(manager_from_config(&config, ScriptedPrompt::refusing()).is_err());
        assert!(!dir.path().join("libraries").exists());
    }
}
