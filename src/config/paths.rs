//! Cross-platform application paths using the `dirs` crate.
//!
//! Config dir (settings + credentials):
//!   Windows: %APPDATA%\speech-assess\
//!   macOS:   ~/Library/Application Support/speech-assess/
//!   Linux:   ~/.config/speech-assess/

use std::path::{Path, PathBuf};

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml` and `.env`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Optional `.env` holding `SPEECH_KEY` / `SPEECH_REGION`.
    pub env_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "speech-assess";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);
        Self::in_dir(&config_dir)
    }

    /// Lay the files out under an explicit directory.
    pub fn in_dir(config_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            settings_file: config_dir.join("settings.toml"),
            env_file: config_dir.join(".env"),
        }
    }

    /// Load `.env` from the current directory, then from the config
    /// directory.  Variables already set are never overridden, so the
    /// working-directory file wins over the global one.
    pub fn load_env_files(&self) {
        match dotenvy::dotenv() {
            Ok(path) => log::debug!("config: loaded {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => log::warn!("config: ignoring malformed .env: {e}"),
        }
        if self.env_file.exists() {
            match dotenvy::from_path(&self.env_file) {
                Ok(()) => log::debug!("config: loaded {}", self.env_file.display()),
                Err(e) => log::warn!(
                    "config: ignoring malformed {}: {e}",
                    self.env_file.display()
                ),
            }
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
