//! Construction-time validation of capture parameters.
//!
//! Every check here runs before any device is opened so an invalid
//! combination of frame size, threshold and durations never reaches the
//! capture loop.

use thiserror::Error;

use crate::audio::SUPPORTED_SAMPLE_RATES;

/// Longest duration (24 h) accepted for any capture window.
pub const MAX_DURATION_SECS: f64 = 86_400.0;

/// Invalid capture configuration, raised at construction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unsupported sample rate {0} Hz (expected 8000 or 16000)")]
    UnsupportedSampleRate(u32),

    #[error("frame size must be greater than zero")]
    ZeroFrameSize,

    #[error("silence threshold {0} is outside [0.0, 1.0]")]
    ThresholdOutOfRange(f32),

    #[error("{name} must be greater than 0 and at most 86400 seconds, got {value}")]
    InvalidDuration { name: &'static str, value: f64 },

    #[error("energy ramp ceiling {ceiling_db} dBFS must be above floor {floor_db} dBFS")]
    InvalidLevelRange { floor_db: f32, ceiling_db: f32 },
}

/// Reject sample rates the capture core cannot open.
pub fn validate_sample_rate(sample_rate: u32) -> Result<(), ConfigError> {
    if SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
        Ok(())
    } else {
        Err(ConfigError::UnsupportedSampleRate(sample_rate))
    }
}

/// Reject thresholds outside the confidence range (NaN included).
pub fn validate_threshold(threshold: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange(threshold))
    }
}

/// Reject zero, negative, non-finite and over-long durations.
///
/// The upper bound keeps every accepted value convertible to a `Duration`
/// that can be added to an `Instant`.
pub fn validate_duration(name: &'static str, secs: f64) -> Result<(), ConfigError> {
    if secs > 0.0 && secs <= MAX_DURATION_SECS {
        Ok(())
    } else {
        Err(ConfigError::InvalidDuration { name, value: secs })
    }
}

/// Number of consecutive silent frames that add up to `silence_secs`.
///
/// `floor(silence_secs / (frame_size / sample_rate))`, never below 1 so a
/// very short silence window cannot disable the stop condition.
pub fn max_silent_frames(
    silence_secs: f64,
    frame_size: usize,
    sample_rate: u32,
) -> Result<u32, ConfigError> {
    validate_duration("silence duration", silence_secs)?;
    if frame_size == 0 {
        return Err(ConfigError::ZeroFrameSize);
    }
    if sample_rate == 0 {
        return Err(ConfigError::UnsupportedSampleRate(sample_rate));
    }
    let frames = (silence_secs * f64::from(sample_rate) / frame_size as f64).floor();
    Ok((frames.min(f64::from(u32::MAX)) as u32).max(1))
}
