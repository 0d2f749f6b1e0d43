//! Pre-submission audio validation.
//!
//! [`AudioValidator`] checks a WAV recording against the constraints of the
//! pronunciation-assessment service before it is uploaded:
//!
//! | Check | Requirement |
//! |-------|-------------|
//! | Format | 16-bit integer PCM |
//! | Sample rate | 8 kHz or 16 kHz |
//! | Channels | mono |
//! | Duration | within `[min_duration_secs, max_duration_secs]` |
//!
//! # Example
//!
//! ```rust
//! use speech_assess::audio::{AudioFrame, AudioValidator, RecordingSink, ValidationError};
//!
//! let validator = AudioValidator::default();
//! let sink = RecordingSink::new(16_000);
//!
//! // 8000 samples @ 16 kHz = 0.5 s (just at the minimum)
//! let ok = sink.encode_frames(&[AudioFrame::new(vec![0; 8_000], 16_000)]).unwrap();
//! assert!(validator.validate_artifact(&ok).is_ok());
//!
//! let short = sink.encode_frames(&[AudioFrame::new(vec![0; 100], 16_000)]).unwrap();
//! assert!(matches!(validator.validate_artifact(&short), Err(ValidationError::TooShort { .. })));
//! ```

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec};
use thiserror::Error;

use super::frame::SUPPORTED_SAMPLE_RATES;
use super::wav::AudioArtifact;
use crate::config::ValidationConfig;

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Reason a recording was rejected before submission.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("audio file does not exist: {0}")]
    Missing(String),

    #[error("error reading audio file: {0}")]
    Unreadable(String),

    #[error("audio format must be 16-bit PCM (got {bits}-bit {format})")]
    NotPcm16 { bits: u16, format: &'static str },

    #[error("sample rate must be 16 kHz or 8 kHz (got {0} Hz)")]
    SampleRate(u32),

    #[error("audio must be mono (got {0} channels)")]
    NotMono(u16),

    #[error("recording too short: {got_secs:.2}s (minimum {min_secs:.2}s)")]
    TooShort { min_secs: f64, got_secs: f64 },

    #[error("recording too long: {got_secs:.2}s (maximum {max_secs:.2}s)")]
    TooLong { max_secs: f64, got_secs: f64 },
}

// ---------------------------------------------------------------------------
// AudioValidator
// ---------------------------------------------------------------------------

/// Validates WAV recordings against the assessment service's input rules.
#[derive(Debug, Clone)]
pub struct AudioValidator {
    /// Minimum accepted duration in seconds (default: `0.5`).
    pub min_duration_secs: f64,
    /// Maximum accepted duration in seconds (default: `600.0`).
    pub max_duration_secs: f64,
}

impl Default for AudioValidator {
    fn default() -> Self {
        Self {
            min_duration_secs: 0.5,
            max_duration_secs: 600.0,
        }
    }
}

impl From<&ValidationConfig> for AudioValidator {
    fn from(cfg: &ValidationConfig) -> Self {
        Self {
            min_duration_secs: cfg.min_duration_secs,
            max_duration_secs: cfg.max_duration_secs,
        }
    }
}

impl AudioValidator {
    /// Validate an in-memory artifact.
    pub fn validate_artifact(&self, artifact: &AudioArtifact) -> Result<(), ValidationError> {
        let reader = WavReader::new(artifact.bytes())
            .map_err(|e| ValidationError::Unreadable(e.to_string()))?;
        self.check(reader.spec(), reader.duration())
    }

    /// Validate a WAV file on disk.
    pub fn validate_file(&self, path: impl AsRef<Path>) -> Result<(), ValidationError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ValidationError::Missing(path.display().to_string()));
        }
        let reader =
            WavReader::open(path).map_err(|e| ValidationError::Unreadable(e.to_string()))?;
        self.check(reader.spec(), reader.duration())
    }

    /// Run the checks in order: format → rate → channels → duration.
    fn check(&self, spec: WavSpec, frames: u32) -> Result<(), ValidationError> {
        let duration_secs = if spec.sample_rate == 0 {
            0.0
        } else {
            f64::from(frames) / f64::from(spec.sample_rate)
        };

        log::info!(
            "audio properties: sample rate = {} Hz, channels = {}, format = {}-bit {}, duration = {:.2}s",
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample,
            format_label(spec.sample_format),
            duration_secs
        );

        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(ValidationError::NotPcm16 {
                bits: spec.bits_per_sample,
                format: format_label(spec.sample_format),
            });
        }

        if !SUPPORTED_SAMPLE_RATES.contains(&spec.sample_rate) {
            return Err(ValidationError::SampleRate(spec.sample_rate));
        }

        if spec.channels != 1 {
            return Err(ValidationError::NotMono(spec.channels));
        }

        if duration_secs < self.min_duration_secs {
            return Err(ValidationError::TooShort {
                min_secs: self.min_duration_secs,
                got_secs: duration_secs,
            });
        }

        if duration_secs > self.max_duration_secs {
            return Err(ValidationError::TooLong {
                max_secs: self.max_duration_secs,
                got_secs: duration_secs,
            });
        }

        log::info!("audio file is valid");
        Ok(())
    }
}

fn format_label(format: SampleFormat) -> &'static str {
    match format {
        SampleFormat::Int => "int",
        SampleFormat::Float => "float",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
