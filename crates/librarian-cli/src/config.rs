use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::{eyre::bail, Result};
use dirs::config_dir;
use librarian_core::documents::HEADER_COLUMNS;
use librarian_library::LibraryOptions;
use librarian_storage::KdfParams;
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/librarian/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the directory holding the library archives.
    pub data_dir: Option<PathBuf>,
    /// Column flags for new libraries and for configs without headers.
    pub default_headers: Option<Vec<bool>>,
    /// Argon2id cost used when sealing and unsealing archives.
    pub kdf: Option<KdfParams>,
}

impl Config {
    /// Options handed to every library opened or created with this config.
    pub fn library_options(&self) -> Result<LibraryOptions> {
        let mut options = LibraryOptions::default();
        if let Some(headers) = &self.default_headers {
            if headers.len() != HEADER_COLUMNS.len() {
                bail!(
                    "default_headers needs {} flags ({}), found {}",
                    HEADER_COLUMNS.len(),
                    HEADER_COLUMNS.join(", "),
                    headers.len()
                );
            }
            options.default_headers = headers.clone();
        }
        if let Some(kdf) = self.kdf {
            options.kdf = kdf;
        }
        Ok(options)
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("librarian").join("config.toml"))
}

/// Write the given config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

/// Never clobbers an existing file; returns its path either way.
pub fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
