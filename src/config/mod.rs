//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for capture,
//! validation and assessment, `AppPaths` for cross-platform config paths,
//! TOML persistence via `AppConfig::load` / `AppConfig::save`, and the
//! construction-time checks in [`validation`].

pub mod paths;
pub mod settings;
pub mod validation;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AssessmentConfig, AudioConfig, ValidationConfig, ENV_SPEECH_KEY, ENV_SPEECH_REGION,
};
pub use validation::ConfigError;
