//! Capture state machine and the per-recording session record.
//!
//! [`CaptureState`] is the controller's lifecycle; [`CaptureSession`] holds
//! the audio accepted during one `Recording` phase together with the single
//! [`StopReason`] that ended it.

use std::time::Duration;

use tokio::time::Instant;

use crate::audio::AudioFrame;

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

// ---------------------------------------------------------------------------
// CaptureState
// ---------------------------------------------------------------------------

/// States of the capture controller.
///
/// ```text
/// Idle ──run()──▶ Recording ──silence──▶ StoppedSilence
///                           ──deadline─▶ StoppedTimeout
///                           ──cancel / device failure─▶ StoppedCancel
/// Stopped* ──reset()──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// No capture has started (or the controller was reset).
    #[default]
    Idle,

    /// The source is running and frames are being accepted.
    Recording,

    /// Trailing silence reached the configured window.
    StoppedSilence,

    /// The maximum recording duration elapsed.
    StoppedTimeout,

    /// The caller cancelled, or the device failed.
    StoppedCancel,
}

impl CaptureState {
    /// Returns `true` for the three `Stopped*` states.
    ///
    /// ```
    /// use speech_assess::pipeline::CaptureState;
    ///
    /// assert!(!CaptureState::Idle.is_terminal());
    /// assert!(!CaptureState::Recording.is_terminal());
    /// assert!(CaptureState::StoppedSilence.is_terminal());
    /// assert!(CaptureState::StoppedTimeout.is_terminal());
    /// assert!(CaptureState::StoppedCancel.is_terminal());
    /// ```
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureState::StoppedSilence | CaptureState::StoppedTimeout | CaptureState::StoppedCancel
        )
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Recording => "recording",
            CaptureState::StoppedSilence => "stopped_silence",
            CaptureState::StoppedTimeout => "stopped_timeout",
            CaptureState::StoppedCancel => "stopped_cancel",
        }
    }
}

impl From<StopReason> for CaptureState {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Silence => CaptureState::StoppedSilence,
            StopReason::Timeout => CaptureState::StoppedTimeout,
            StopReason::ManualCancel => CaptureState::StoppedCancel,
        }
    }
}

// ---------------------------------------------------------------------------
// StopReason / CancelPolicy
// ---------------------------------------------------------------------------

/// Why a capture ended.  Exactly one is recorded per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Silence,
    Timeout,
    ManualCancel,
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Silence => "silence",
            StopReason::Timeout => "timeout",
            StopReason::ManualCancel => "cancel",
        }
    }
}

/// What happens to already-captured audio when a capture is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    #[default]
    KeepAudio,
    DiscardAudio,
}

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

/// Audio and bookkeeping for one recording.
///
/// Once [`stop`](Self::stop) has been called the session is sealed: later
/// frames are refused and the first stop reason is kept.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    start_time: Instant,
    max_duration: Duration,
    frames: Vec<AudioFrame>,
    stopped: bool,
    stop_reason: Option<StopReason>,
    failure: Option<String>,
    frames_classified: usize,
    frames_unclassified: usize,
    classifier_failures: usize,
}

impl CaptureSession {
    pub fn new(start_time: Instant, max_duration: Duration) -> Self {
        Self {
            start_time,
            max_duration,
            frames: Vec::new(),
            stopped: false,
            stop_reason: None,
            failure: None,
            frames_classified: 0,
            frames_unclassified: 0,
            classifier_failures: 0,
        }
    }

    /// Append `frame` unless the session is already stopped.
    ///
    /// Returns `false` when the frame was refused.
    pub fn push_frame(&mut self, frame: AudioFrame) -> bool {
        if self.stopped {
            return false;
        }
        self.frames.push(frame);
        true
    }

    /// Seal the session with `reason`.  Returns `false` if it was already
    /// stopped (the first reason is kept).
    pub fn stop(&mut self, reason: StopReason) -> bool {
        if self.stopped {
            return false;
        }
        self.stopped = true;
        self.stop_reason = Some(reason);
        true
    }

    pub(crate) fn set_failure(&mut self, cause: String) {
        self.failure = Some(cause);
    }

    pub(crate) fn discard_audio(&mut self) {
        self.frames.clear();
    }

    pub(crate) fn record_classified(&mut self) {
        self.frames_classified += 1;
    }

    pub(crate) fn record_unclassified(&mut self) {
        self.frames_unclassified += 1;
    }

    pub(crate) fn record_classifier_failure(&mut self) {
        self.classifier_failures += 1;
    }

    /// Elapsed time since capture start, as of `now`.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start_time)
    }

    /// Whether `max_duration` has elapsed as of `now`.
    pub fn deadline_reached(&self, now: Instant) -> bool {
        self.elapsed_at(now) >= self.max_duration
    }

    /// `start_time + max_duration`, saturating at one year out.
    pub fn deadline(&self) -> Instant {
        self.start_time
            .checked_add(self.max_duration)
            .unwrap_or_else(|| self.start_time + FAR_FUTURE)
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Accepted frames in arrival order.
    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    /// Total samples across all accepted frames.
    pub fn sample_count(&self) -> usize {
        self.frames.iter().map(AudioFrame::len).sum()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Device failure that ended the session, if any.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn frames_classified(&self) -> usize {
        self.frames_classified
    }

    /// Frames stored without classification (length mismatch).
    pub fn frames_unclassified(&self) -> usize {
        self.frames_unclassified
    }

    /// Frames whose classifier call failed and counted as silence.
    pub fn classifier_failures(&self) -> usize {
        self.classifier_failures
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
