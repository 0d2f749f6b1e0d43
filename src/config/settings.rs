//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  Every section is
//! `#[serde(default)]`, so a `settings.toml` only needs the keys it changes.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

/// Environment variable holding the speech-service subscription key.
pub const ENV_SPEECH_KEY: &str = "SPEECH_KEY";
/// Environment variable holding the speech-service region (e.g. `eastus`).
pub const ENV_SPEECH_REGION: &str = "SPEECH_REGION";

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for audio capture and voice-activity detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz (8 000 or 16 000).
    pub sample_rate: u32,
    /// Samples per frame handed to the VAD (512 at 16 kHz, 256 at 8 kHz).
    pub chunk_size: usize,
    /// VAD confidence (0.0 – 1.0) at or above which a frame is speech.
    pub silence_threshold: f32,
    /// Seconds of continuous silence that end the recording.
    pub silence_duration_secs: f64,
    /// Maximum recording length in seconds; recording stops automatically.
    pub max_duration_secs: f64,
    /// Audio input device name; `None` means the system default.
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            chunk_size: 512,
            silence_threshold: 0.3,
            silence_duration_secs: 3.0,
            max_duration_secs: 60.0,
            device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationConfig
// ---------------------------------------------------------------------------

/// Duration limits a recording must meet before it is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 0.5,
            max_duration_secs: 600.0,
        }
    }
}

// ---------------------------------------------------------------------------
// AssessmentConfig
// ---------------------------------------------------------------------------

/// Settings for the pronunciation-assessment service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    /// Service region, e.g. `"eastus"`.  Falls back to `SPEECH_REGION`.
    pub region: Option<String>,
    /// Subscription key.  Falls back to `SPEECH_KEY`.
    pub subscription_key: Option<String>,
    /// Recognition language (BCP-47).
    pub language: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// File holding the text the speaker was asked to read.
    pub reference_text_file: PathBuf,
    /// Where the JSON result is written.
    pub result_file: PathBuf,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            region: None,
            subscription_key: None,
            language: "en-US".into(),
            timeout_secs: 30,
            reference_text_file: PathBuf::from("reference_text.txt"),
            result_file: PathBuf::from("pronunciation_result.json"),
        }
    }
}

impl AssessmentConfig {
    /// Fill `region` / `subscription_key` from `lookup` where the file left
    /// them unset.  Values already present in the file win.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if self.subscription_key.is_none() {
            self.subscription_key = non_empty(ENV_SPEECH_KEY);
        }
        if self.region.is_none() {
            self.region = non_empty(ENV_SPEECH_REGION);
        }
    }

    /// [`apply_env_with`](Self::apply_env_with) against the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// `true` when both the key and the region are known.
    pub fn has_credentials(&self) -> bool {
        self.subscription_key.is_some() && self.region.is_some()
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use speech_assess::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Audio capture / VAD settings.
    pub audio: AudioConfig,
    /// Pre-submission checks.
    pub validation: ValidationConfig,
    /// Assessment service settings.
    pub assessment: AssessmentConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("config: {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        log::debug!("config: loaded {}", path.display());
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
