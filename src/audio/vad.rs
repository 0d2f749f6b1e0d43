//! Voice Activity Detection: classifier seam and trailing-silence tracking.
//!
//! The capture loop consumes VAD output through two pieces:
//!
//! * [`VadClassifier`]: an injected, stateless function from one normalised
//!   frame to a speech [`Confidence`].  Neural models (Silero and friends)
//!   plug in here; [`EnergyClassifier`] is the built-in RMS fallback.
//! * [`SilenceTracker`]: a pure counter of consecutive below-threshold
//!   frames that reports when the trailing-silence stop condition is met.
//!
//! # Example
//!
//! ```rust
//! use speech_assess::audio::{Confidence, SilenceDecision, SilenceTracker};
//!
//! let mut tracker = SilenceTracker::new(Confidence::new(0.3), 2).unwrap();
//! assert_eq!(tracker.observe(Confidence::new(0.1)), SilenceDecision::Continuing);
//! assert_eq!(tracker.observe(Confidence::new(0.1)), SilenceDecision::SilenceTriggered);
//! ```

use thiserror::Error;

use crate::config::validation::{max_silent_frames, validate_threshold, ConfigError};

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Speech probability for one frame, always within `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Confidence(f32);

impl Confidence {
    /// Clamp `value` into `[0.0, 1.0]`; NaN becomes `0.0`.
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// Confidence used when the classifier could not produce a score.
    pub const SILENT: Confidence = Confidence(0.0);

    pub fn value(self) -> f32 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// VadClassifier
// ---------------------------------------------------------------------------

/// Failure of a single classifier invocation.
///
/// The capture loop never aborts on these; the frame counts as silence.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("classifier expects {expected} samples, got {got}")]
    FrameLength { expected: usize, got: usize },

    #[error("classifier inference failed: {0}")]
    Inference(String),
}

/// Stateless speech classifier injected into the capture controller.
///
/// Implementations must be `Send + Sync` so they can be held behind an
/// `Arc<dyn VadClassifier>` whose lifetime the caller owns.
pub trait VadClassifier: Send + Sync {
    /// Score one frame of normalised samples captured at `sample_rate` Hz.
    fn classify(&self, frame: &[f32], sample_rate: u32) -> Result<Confidence, ClassifierError>;

    /// Exact input length the classifier accepts at `sample_rate`.
    ///
    /// Frames of any other length are stored but not classified.
    fn expected_frame_len(&self, sample_rate: u32) -> usize;

    fn name(&self) -> &'static str {
        "unknown_vad"
    }
}

// Box<dyn VadClassifier> must stay constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn VadClassifier>) {}
};

// ---------------------------------------------------------------------------
// EnergyClassifier
// ---------------------------------------------------------------------------

/// RMS-energy classifier mapping frame loudness onto a confidence ramp.
///
/// Frames at or below `floor_db` dBFS score `0.0`, frames at or above
/// `ceiling_db` score `1.0`, and the range in between is linear.
#[derive(Debug, Clone)]
pub struct EnergyClassifier {
    frame_len: usize,
    floor_db: f32,
    ceiling_db: f32,
}

impl EnergyClassifier {
    /// Default ramp: -60 dBFS (room tone) to -30 dBFS (normal speech).
    pub fn new(frame_len: usize) -> Self {
        Self {
            frame_len,
            floor_db: -60.0,
            ceiling_db: -30.0,
        }
    }

    /// Custom dBFS ramp.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidLevelRange`] unless `ceiling_db` is above
    /// `floor_db` (NaN on either side included).
    pub fn with_range(
        frame_len: usize,
        floor_db: f32,
        ceiling_db: f32,
    ) -> Result<Self, ConfigError> {
        if floor_db.is_nan() || ceiling_db.is_nan() || ceiling_db <= floor_db {
            return Err(ConfigError::InvalidLevelRange {
                floor_db,
                ceiling_db,
            });
        }
        Ok(Self {
            frame_len,
            floor_db,
            ceiling_db,
        })
    }
}

/// RMS level of `frame` in dBFS; `-inf`-safe (silence reports -120 dB).
pub fn rms_db(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return -120.0;
    }
    let mean_sq = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
    let rms = mean_sq.sqrt();
    if rms <= 1e-6 {
        -120.0
    } else {
        20.0 * rms.log10()
    }
}

impl VadClassifier for EnergyClassifier {
    fn classify(&self, frame: &[f32], _sample_rate: u32) -> Result<Confidence, ClassifierError> {
        if frame.len() != self.frame_len {
            return Err(ClassifierError::FrameLength {
                expected: self.frame_len,
                got: frame.len(),
            });
        }
        let db = rms_db(frame);
        let score = (db - self.floor_db) / (self.ceiling_db - self.floor_db);
        Ok(Confidence::new(score))
    }

    fn expected_frame_len(&self, _sample_rate: u32) -> usize {
        self.frame_len
    }

    fn name(&self) -> &'static str {
        "energy_rms"
    }
}

// ---------------------------------------------------------------------------
// SilenceTracker
// ---------------------------------------------------------------------------

/// Outcome of feeding one confidence into the [`SilenceTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceDecision {
    Continuing,
    SilenceTriggered,
}

impl SilenceDecision {
    pub fn is_triggered(self) -> bool {
        self == SilenceDecision::SilenceTriggered
    }
}

/// Counts consecutive below-threshold frames.
///
/// The only state is the counter: it resets to 0 on any confidence at or
/// above the threshold and increments otherwise.  Silence is triggered once
/// the counter reaches `max_silent_frames`.
#[derive(Debug, Clone, PartialEq)]
pub struct SilenceTracker {
    consecutive_silent_frames: u32,
    threshold: Confidence,
    max_silent_frames: u32,
}

impl SilenceTracker {
    /// # Errors
    ///
    /// [`ConfigError::InvalidDuration`] when `max_silent_frames == 0`; a
    /// tracker that could never trigger is rejected rather than silently
    /// disabled.
    pub fn new(threshold: Confidence, max_silent_frames: u32) -> Result<Self, ConfigError> {
        if max_silent_frames == 0 {
            return Err(ConfigError::InvalidDuration {
                name: "max silent frames",
                value: 0.0,
            });
        }
        Ok(Self {
            consecutive_silent_frames: 0,
            threshold,
            max_silent_frames,
        })
    }

    /// Build a tracker from a silence window expressed in seconds.
    ///
    /// `max_silent_frames = floor(silence_secs * sample_rate / frame_size)`,
    /// clamped to at least 1.
    pub fn from_duration(
        threshold: f32,
        silence_secs: f64,
        frame_size: usize,
        sample_rate: u32,
    ) -> Result<Self, ConfigError> {
        validate_threshold(threshold)?;
        let max = max_silent_frames(silence_secs, frame_size, sample_rate)?;
        Self::new(Confidence::new(threshold), max)
    }

    /// Feed one frame's confidence.
    pub fn observe(&mut self, confidence: Confidence) -> SilenceDecision {
        if confidence >= self.threshold {
            self.consecutive_silent_frames = 0;
        } else {
            self.consecutive_silent_frames = self.consecutive_silent_frames.saturating_add(1);
        }

        if self.consecutive_silent_frames >= self.max_silent_frames {
            SilenceDecision::SilenceTriggered
        } else {
            SilenceDecision::Continuing
        }
    }

    /// Return to the initial state (no silent frames seen).
    pub fn reset(&mut self) {
        self.consecutive_silent_frames = 0;
    }

    pub fn consecutive_silent_frames(&self) -> u32 {
        self.consecutive_silent_frames
    }

    pub fn max_silent_frames(&self) -> u32 {
        self.max_silent_frames
    }

    pub fn threshold(&self) -> Confidence {
        self.threshold
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
