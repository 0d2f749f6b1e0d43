//! Capture controller: drives one VAD-gated recording from start to stop.
//!
//! [`CaptureController`] owns an [`AudioFrameSource`], a shared
//! [`VadClassifier`] and a [`SilenceTracker`].  [`run`](CaptureController::run)
//! starts the source and multiplexes three inputs in a single biased
//! `tokio::select!`:
//!
//! ```text
//! 1. cancel watch   ──Some(policy)──▶ StoppedCancel
//! 2. sleep_until(deadline)         ──▶ StoppedTimeout
//! 3. SourceEvent channel
//!      Frame   → append → classify (length match only) → tracker
//!                   ├─ SilenceTriggered      ──▶ StoppedSilence
//!                   └─ elapsed ≥ max_duration ──▶ StoppedTimeout
//!      Overrun → warn
//!      Failed / closed ──▶ StoppedCancel + CaptureError::Device
//! ```
//!
//! After the stop decision the source is stopped and anything still queued
//! in the channel is drained and discarded.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::audio::{
    AudioFrame, AudioFrameSource, Confidence, DeviceError, SilenceDecision, SilenceTracker,
    SourceEvent, VadClassifier,
};
use crate::config::validation::{
    validate_duration, validate_sample_rate, MAX_DURATION_SECS, validate_threshold, ConfigError,
};
use crate::config::AudioConfig;

use super::state::{CancelPolicy, CaptureSession, CaptureState, StopReason};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors returned by [`CaptureController::run`].
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("audio device error: {0}")]
    Device(#[from] DeviceError),

    #[error("invalid capture configuration: {0}")]
    Config(#[from] ConfigError),

    /// `run` was called outside `Idle`; call `reset` first.
    #[error("cannot start a capture from state '{}'", .0.label())]
    InvalidState(CaptureState),
}

// ---------------------------------------------------------------------------
// CaptureSettings
// ---------------------------------------------------------------------------

/// Parameters of a single capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// 8000 or 16000 Hz.
    pub sample_rate: u32,
    /// Samples per frame delivered by the source.
    pub frame_size: usize,
    /// Confidence at or above which a frame counts as speech.
    pub silence_threshold: f32,
    /// Trailing silence that ends the recording.
    pub silence_duration_secs: f64,
    /// Hard cap on recording length.
    pub max_duration_secs: f64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from(&AudioConfig::default())
    }
}

impl From<&AudioConfig> for CaptureSettings {
    fn from(cfg: &AudioConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            frame_size: cfg.chunk_size,
            silence_threshold: cfg.silence_threshold,
            silence_duration_secs: cfg.silence_duration_secs,
            max_duration_secs: cfg.max_duration_secs,
        }
    }
}

impl CaptureSettings {
    /// Check every field before a device is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_sample_rate(self.sample_rate)?;
        if self.frame_size == 0 {
            return Err(ConfigError::ZeroFrameSize);
        }
        validate_threshold(self.silence_threshold)?;
        validate_duration("silence duration", self.silence_duration_secs)?;
        validate_duration("max duration", self.max_duration_secs)?;
        Ok(())
    }

    /// Recording cap as a `Duration`.  Exact for settings that pass
    /// [`validate`](Self::validate); anything else saturates into
    /// `0..=MAX_DURATION_SECS`, with NaN taken as the upper bound.
    pub fn max_duration(&self) -> Duration {
        let secs = if self.max_duration_secs.is_nan() {
            MAX_DURATION_SECS
        } else {
            self.max_duration_secs.clamp(0.0, MAX_DURATION_SECS)
        };
        Duration::from_secs_f64(secs)
    }

    /// Wall-clock length of one frame.
    pub fn frame_period(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.frame_size as u64 * 1_000_000_000 / u64::from(self.sample_rate))
    }
}

// ---------------------------------------------------------------------------
// CaptureCanceller
// ---------------------------------------------------------------------------

/// Cloneable handle that stops a running capture from another task.
///
/// ```rust,no_run
/// # use speech_assess::pipeline::{CancelPolicy, CaptureController};
/// # fn demo(controller: &CaptureController) {
/// let canceller = controller.canceller();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     canceller.cancel(CancelPolicy::KeepAudio);
/// });
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CaptureCanceller {
    tx: Arc<watch::Sender<Option<CancelPolicy>>>,
}

impl CaptureCanceller {
    /// Request a stop.  Takes effect without waiting for the next frame; a
    /// request made before `run` starts is honoured as soon as it does.
    pub fn cancel(&self, policy: CancelPolicy) {
        self.tx.send_replace(Some(policy));
    }
}

// ---------------------------------------------------------------------------
// CaptureController
// ---------------------------------------------------------------------------

/// Runs the record-until-silence-or-timeout state machine.
pub struct CaptureController {
    settings: CaptureSettings,
    source: Box<dyn AudioFrameSource>,
    classifier: Arc<dyn VadClassifier>,
    tracker: SilenceTracker,
    state: CaptureState,
    cancel_tx: Arc<watch::Sender<Option<CancelPolicy>>>,
    session: Option<CaptureSession>,
}

impl CaptureController {
    /// Validate `settings` and build a controller in `Idle`.
    pub fn new(
        settings: CaptureSettings,
        source: Box<dyn AudioFrameSource>,
        classifier: Arc<dyn VadClassifier>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let tracker = SilenceTracker::from_duration(
            settings.silence_threshold,
            settings.silence_duration_secs,
            settings.frame_size,
            settings.sample_rate,
        )?;

        let expected = classifier.expected_frame_len(settings.sample_rate);
        if expected != settings.frame_size {
            log::warn!(
                "capture: {} expects {expected}-sample frames but the source delivers {}; \
                 frames will be recorded without classification",
                classifier.name(),
                settings.frame_size
            );
        }

        let (cancel_tx, _) = watch::channel(None);
        Ok(Self {
            settings,
            source,
            classifier,
            tracker,
            state: CaptureState::Idle,
            cancel_tx: Arc::new(cancel_tx),
            session: None,
        })
    }

    pub fn canceller(&self) -> CaptureCanceller {
        CaptureCanceller {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn tracker(&self) -> &SilenceTracker {
        &self.tracker
    }

    /// Partial session left behind by a failed `run`.
    pub fn take_session(&mut self) -> Option<CaptureSession> {
        self.session.take()
    }

    /// Return to `Idle` so `run` can be called again.  Clears any pending
    /// cancel request and leftover session.
    pub fn reset(&mut self) {
        self.source.stop();
        self.tracker.reset();
        self.cancel_tx.send_replace(None);
        self.session = None;
        self.state = CaptureState::Idle;
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Record until silence, timeout or cancel and hand back the session.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::InvalidState`] unless the controller is `Idle`.
    /// - [`CaptureError::Device`] when the source fails to start or fails
    ///   mid-recording.  The controller ends in `StoppedCancel` and the
    ///   partial session is available from [`take_session`](Self::take_session).
    pub async fn run(&mut self) -> Result<CaptureSession, CaptureError> {
        if self.state != CaptureState::Idle {
            return Err(CaptureError::InvalidState(self.state));
        }

        self.tracker.reset();
        self.session = None;
        let mut session = CaptureSession::new(Instant::now(), self.settings.max_duration());
        let mut cancel_rx = self.cancel_tx.subscribe();

        let pending = *cancel_rx.borrow_and_update();
        if let Some(policy) = pending {
            log::info!("capture: cancelled before recording started");
            self.cancel(&mut session, policy);
            return Ok(session);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.state = CaptureState::Recording;
        if let Err(err) = self
            .source
            .start(self.settings.frame_size, self.settings.sample_rate, tx)
        {
            log::error!("capture: failed to start audio source: {err}");
            return Err(self.fail(session, err));
        }

        log::info!(
            "capture: recording (silence window {:.1}s = {} frames, max {:.1}s)",
            self.settings.silence_duration_secs,
            self.tracker.max_silent_frames(),
            self.settings.max_duration_secs
        );

        let deadline = tokio::time::sleep_until(session.deadline());
        tokio::pin!(deadline);

        let outcome: Result<(), DeviceError> = loop {
            tokio::select! {
                biased;

                Ok(()) = cancel_rx.changed() => {
                    let requested = *cancel_rx.borrow_and_update();
                    if let Some(policy) = requested {
                        self.cancel(&mut session, policy);
                        break Ok(());
                    }
                }

                () = &mut deadline => {
                    self.finish(&mut session, StopReason::Timeout);
                    break Ok(());
                }

                event = rx.recv() => match event {
                    Some(SourceEvent::Frame(frame)) => {
                        if let Some(reason) = self.handle_frame(&mut session, frame) {
                            self.finish(&mut session, reason);
                            break Ok(());
                        }
                    }
                    Some(SourceEvent::Overrun(detail)) => {
                        log::warn!("capture: input overrun: {detail}");
                    }
                    Some(SourceEvent::Failed(err)) => break Err(err),
                    None => break Err(DeviceError::Disconnected),
                },
            }
        };

        self.source.stop();
        let late = drain_late_frames(&mut rx);
        if late > 0 {
            log::debug!("capture: discarded {late} frame(s) that arrived after stop");
        }

        match outcome {
            Ok(()) => {
                log::info!(
                    "capture: stopped ({}) after {:.2}s, {} frame(s) recorded",
                    session.stop_reason().map_or("unknown", |r| r.label()),
                    session.elapsed_at(Instant::now()).as_secs_f64(),
                    session.frames().len()
                );
                Ok(session)
            }
            Err(err) => {
                log::error!("capture: audio device failed: {err}");
                Err(self.fail(session, err))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Append, classify and decide.  Returns the stop reason, if any.
    fn handle_frame(&mut self, session: &mut CaptureSession, frame: AudioFrame) -> Option<StopReason> {
        let sample_rate = frame.sample_rate();
        let expected = self.classifier.expected_frame_len(sample_rate);

        let decision = if frame.len() == expected {
            let confidence = match self.classifier.classify(&frame.to_f32(), sample_rate) {
                Ok(confidence) => {
                    session.record_classified();
                    confidence
                }
                Err(err) => {
                    log::warn!(
                        "capture: {} failed on a frame, treating as silence: {err}",
                        self.classifier.name()
                    );
                    session.record_classifier_failure();
                    Confidence::SILENT
                }
            };
            let decision = self.tracker.observe(confidence);
            log::debug!(
                "capture: confidence {:.3}, silent frames {}/{}",
                confidence.value(),
                self.tracker.consecutive_silent_frames(),
                self.tracker.max_silent_frames()
            );
            Some(decision)
        } else {
            log::debug!(
                "capture: {}-sample frame stored unclassified (classifier expects {expected})",
                frame.len()
            );
            session.record_unclassified();
            None
        };

        session.push_frame(frame);

        if decision.is_some_and(SilenceDecision::is_triggered) {
            return Some(StopReason::Silence);
        }
        if session.deadline_reached(Instant::now()) {
            return Some(StopReason::Timeout);
        }
        None
    }

    fn finish(&mut self, session: &mut CaptureSession, reason: StopReason) {
        if session.stop(reason) {
            self.state = CaptureState::from(reason);
        }
    }

    fn cancel(&mut self, session: &mut CaptureSession, policy: CancelPolicy) {
        self.finish(session, StopReason::ManualCancel);
        if policy == CancelPolicy::DiscardAudio {
            session.discard_audio();
            log::info!("capture: cancelled, audio discarded");
        } else {
            log::info!("capture: cancelled, keeping {} frame(s)", session.frames().len());
        }
    }

    fn fail(&mut self, mut session: CaptureSession, err: DeviceError) -> CaptureError {
        session.stop(StopReason::ManualCancel);
        session.set_failure(err.to_string());
        self.state = CaptureState::StoppedCancel;
        self.session = Some(session);
        CaptureError::Device(err)
    }
}

fn drain_late_frames(rx: &mut mpsc::UnboundedReceiver<SourceEvent>) -> usize {
    let mut late = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, SourceEvent::Frame(_)) {
            late += 1;
        }
    }
    late
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ClassifierError, FrameSender};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::task::JoinHandle;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Source that replays a script of events.
    ///
    /// With no interval everything is queued during `start`; with an interval
    /// a task emits one event per tick.  The sender stays alive until `stop`
    /// so the channel never closes on its own.
    #[derive(Default)]
    struct ScriptedSource {
        script: Vec<SourceEvent>,
        interval: Option<Duration>,
        start_error: Option<DeviceError>,
        starts: Arc<AtomicUsize>,
        stopped: Arc<AtomicBool>,
        held: Option<FrameSender>,
        feeder: Option<JoinHandle<()>>,
    }

    impl ScriptedSource {
        fn queued(script: Vec<SourceEvent>) -> Self {
            Self {
                script,
                ..Self::default()
            }
        }

        fn paced(script: Vec<SourceEvent>, interval: Duration) -> Self {
            Self {
                script,
                interval: Some(interval),
                ..Self::default()
            }
        }
    }

    impl AudioFrameSource for ScriptedSource {
        fn start(&mut self, _: usize, _: u32, events: FrameSender) -> Result<(), DeviceError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.start_error.take() {
                return Err(err);
            }
            let script = std::mem::take(&mut self.script);
            match self.interval {
                None => {
                    for event in script {
                        let _ = events.send(event);
                    }
                    self.held = Some(events);
                }
                Some(interval) => {
                    self.feeder = Some(tokio::spawn(async move {
                        for event in script {
                            let _ = events.send(event);
                            tokio::time::sleep(interval).await;
                        }
                        std::future::pending::<()>().await;
                    }));
                }
            }
            Ok(())
        }

        fn stop(&mut self) {
            if let Some(feeder) = self.feeder.take() {
                feeder.abort();
            }
            self.held = None;
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// Returns the same confidence for every frame.
    struct ConstClassifier(f32);

    impl VadClassifier for ConstClassifier {
        fn classify(&self, _: &[f32], _: u32) -> Result<Confidence, ClassifierError> {
            Ok(Confidence::new(self.0))
        }
        fn expected_frame_len(&self, _: u32) -> usize {
            512
        }
    }

    /// Replays a confidence script, then reports speech.
    struct ScriptClassifier(Mutex<VecDeque<f32>>);

    impl ScriptClassifier {
        fn new(values: &[f32]) -> Self {
            Self(Mutex::new(values.iter().copied().collect()))
        }
    }

    impl VadClassifier for ScriptClassifier {
        fn classify(&self, _: &[f32], _: u32) -> Result<Confidence, ClassifierError> {
            let next = self.0.lock().unwrap().pop_front().unwrap_or(1.0);
            Ok(Confidence::new(next))
        }
        fn expected_frame_len(&self, _: u32) -> usize {
            512
        }
    }

    struct FailingClassifier;

    impl VadClassifier for FailingClassifier {
        fn classify(&self, _: &[f32], _: u32) -> Result<Confidence, ClassifierError> {
            Err(ClassifierError::Inference("model exploded".into()))
        }
        fn expected_frame_len(&self, _: u32) -> usize {
            512
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn frame(len: usize) -> SourceEvent {
        SourceEvent::Frame(AudioFrame::new(vec![100; len], 16_000))
    }

    fn frames(n: usize) -> Vec<SourceEvent> {
        (0..n).map(|_| frame(512)).collect()
    }

    fn settings(silence_secs: f64, max_secs: f64) -> CaptureSettings {
        CaptureSettings {
            sample_rate: 16_000,
            frame_size: 512,
            silence_threshold: 0.3,
            silence_duration_secs: silence_secs,
            max_duration_secs: max_secs,
        }
    }

    fn controller(
        settings: CaptureSettings,
        source: ScriptedSource,
        classifier: impl VadClassifier + 'static,
    ) -> CaptureController {
        CaptureController::new(settings, Box::new(source), Arc::new(classifier))
            .expect("valid settings")
    }

    const FRAME_PERIOD: Duration = Duration::from_millis(32);

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    #[test]
    fn settings_from_default_config() {
        let s = CaptureSettings::default();
        assert_eq!(s.sample_rate, 16_000);
        assert_eq!(s.frame_size, 512);
        assert_eq!(s.max_duration(), Duration::from_secs(60));
        assert_eq!(s.frame_period(), FRAME_PERIOD);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn invalid_settings_rejected_at_construction() {
        let mut s = settings(3.0, 60.0);
        s.sample_rate = 44_100;
        assert_eq!(s.validate(), Err(ConfigError::UnsupportedSampleRate(44_100)));

        let mut s = settings(3.0, 60.0);
        s.frame_size = 0;
        assert_eq!(s.validate(), Err(ConfigError::ZeroFrameSize));

        let mut s = settings(3.0, 60.0);
        s.silence_threshold = 1.5;
        assert_eq!(s.validate(), Err(ConfigError::ThresholdOutOfRange(1.5)));

        let s = settings(3.0, 0.0);
        assert!(matches!(
            CaptureController::new(s, Box::new(ScriptedSource::default()), Arc::new(ConstClassifier(0.0))),
            Err(ConfigError::InvalidDuration { name: "max duration", .. })
        ));

        // Too large for an Instant deadline, or for a Duration at all.
        for secs in [1e19, 1e20] {
            let s = settings(3.0, secs);
            assert!(matches!(
                CaptureController::new(s, Box::new(ScriptedSource::default()), Arc::new(ConstClassifier(0.0))),
                Err(ConfigError::InvalidDuration { name: "max duration", .. })
            ));
        }
        assert!(matches!(
            settings(1e19, 60.0).validate(),
            Err(ConfigError::InvalidDuration { name: "silence duration", .. })
        ));
    }

    #[test]
    fn max_duration_never_collapses_to_zero() {
        assert_eq!(settings(3.0, 60.0).max_duration(), Duration::from_secs(60));
        assert_eq!(
            settings(3.0, MAX_DURATION_SECS).max_duration(),
            Duration::from_secs(86_400)
        );
        assert_eq!(settings(3.0, 1e20).max_duration(), Duration::from_secs(86_400));
        assert_eq!(settings(3.0, f64::NAN).max_duration(), Duration::from_secs(86_400));
    }

    #[tokio::test(start_paused = true)]
    async fn longest_allowed_cap_still_records() {
        let mut c = controller(
            settings(3.0, MAX_DURATION_SECS),
            ScriptedSource::queued(frames(200)),
            ConstClassifier(0.0),
        );
        let session = c.run().await.expect("run");
        assert_eq!(session.stop_reason(), Some(StopReason::Silence));
        assert_eq!(session.frames().len(), 93);
    }

    // -----------------------------------------------------------------------
    // Stop conditions
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn stops_on_the_93rd_silent_frame() {
        let mut c = controller(
            settings(3.0, 60.0),
            ScriptedSource::queued(frames(200)),
            ConstClassifier(0.0),
        );

        let session = c.run().await.expect("run");

        assert_eq!(c.state(), CaptureState::StoppedSilence);
        assert_eq!(session.stop_reason(), Some(StopReason::Silence));
        assert_eq!(session.frames().len(), 93);
        assert_eq!(session.frames_classified(), 93);
        assert_eq!(session.sample_count(), 93 * 512);
    }

    #[tokio::test(start_paused = true)]
    async fn speech_resets_the_silence_window() {
        let mut script = vec![0.0; 92];
        script.push(0.9);
        script.extend(std::iter::repeat(0.0).take(93));

        let mut c = controller(
            settings(3.0, 60.0),
            ScriptedSource::queued(frames(300)),
            ScriptClassifier::new(&script),
        );

        let session = c.run().await.expect("run");
        assert_eq!(session.stop_reason(), Some(StopReason::Silence));
        assert_eq!(session.frames().len(), 92 + 1 + 93);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_source_times_out_at_the_deadline() {
        let mut c = controller(
            settings(3.0, 5.0),
            ScriptedSource::queued(Vec::new()),
            ConstClassifier(0.0),
        );
        let started = Instant::now();

        let session = c.run().await.expect("run");

        assert_eq!(c.state(), CaptureState::StoppedTimeout);
        assert_eq!(session.stop_reason(), Some(StopReason::Timeout));
        assert!(session.frames().is_empty());
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_speech_times_out_within_one_frame_of_max_duration() {
        let mut c = controller(
            settings(3.0, 5.0),
            ScriptedSource::paced(frames(1_000), FRAME_PERIOD),
            ConstClassifier(0.9),
        );
        let started = Instant::now();

        let session = c.run().await.expect("run");
        let elapsed = started.elapsed();

        assert_eq!(session.stop_reason(), Some(StopReason::Timeout));
        assert!(elapsed >= Duration::from_secs(5), "{elapsed:?}");
        assert!(elapsed <= Duration::from_secs(5) + FRAME_PERIOD, "{elapsed:?}");
        // 5 s / 32 ms = 156.25 frames
        let n = session.frames().len();
        assert!((156..=158).contains(&n), "{n} frames");
    }

    #[tokio::test]
    async fn silence_takes_precedence_over_timeout_on_the_same_frame() {
        let s = CaptureSettings {
            silence_duration_secs: 0.001,
            ..settings(3.0, 60.0)
        };
        let mut c = controller(s.clone(), ScriptedSource::default(), ConstClassifier(0.0));
        let mut session = CaptureSession::new(Instant::now(), Duration::ZERO);
        let f = AudioFrame::new(vec![0; 512], 16_000);
        assert_eq!(c.handle_frame(&mut session, f.clone()), Some(StopReason::Silence));

        let mut c = controller(s, ScriptedSource::default(), ConstClassifier(0.9));
        let mut session = CaptureSession::new(Instant::now(), Duration::ZERO);
        assert_eq!(c.handle_frame(&mut session, f), Some(StopReason::Timeout));
    }

    // -----------------------------------------------------------------------
    // Cancel
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn cancel_keeps_partial_audio_and_discards_late_frames() {
        let stopped = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource {
            stopped: Arc::clone(&stopped),
            ..ScriptedSource::paced(frames(100), FRAME_PERIOD)
        };
        let mut c = controller(settings(3.0, 60.0), source, ConstClassifier(0.9));
        let canceller = c.canceller();

        let handle = tokio::spawn(async move {
            let result = c.run().await;
            (c, result)
        });

        // Frames land at 0, 32, ..., 160 ms.
        tokio::time::sleep(FRAME_PERIOD * 5 + FRAME_PERIOD / 2).await;
        canceller.cancel(CancelPolicy::KeepAudio);

        let (c, result) = handle.await.expect("join");
        let session = result.expect("run");

        assert_eq!(c.state(), CaptureState::StoppedCancel);
        assert_eq!(session.stop_reason(), Some(StopReason::ManualCancel));
        assert_eq!(session.frames().len(), 6);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_with_discard_drops_audio() {
        let mut c = controller(
            settings(3.0, 60.0),
            ScriptedSource::paced(frames(100), FRAME_PERIOD),
            ConstClassifier(0.9),
        );
        let canceller = c.canceller();

        let handle = tokio::spawn(async move { c.run().await });
        tokio::time::sleep(FRAME_PERIOD * 3).await;
        canceller.cancel(CancelPolicy::DiscardAudio);

        let session = handle.await.expect("join").expect("run");
        assert_eq!(session.stop_reason(), Some(StopReason::ManualCancel));
        assert!(session.frames().is_empty());
    }

    #[tokio::test]
    async fn cancel_before_run_is_honoured_without_starting_the_source() {
        let starts = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            starts: Arc::clone(&starts),
            ..ScriptedSource::queued(frames(10))
        };
        let mut c = controller(settings(3.0, 60.0), source, ConstClassifier(0.9));

        c.canceller().cancel(CancelPolicy::KeepAudio);
        let session = c.run().await.expect("run");

        assert_eq!(session.stop_reason(), Some(StopReason::ManualCancel));
        assert!(session.frames().is_empty());
        assert_eq!(starts.load(Ordering::SeqCst), 0);
        assert_eq!(c.state(), CaptureState::StoppedCancel);
    }

    // -----------------------------------------------------------------------
    // Classification edge cases
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn classifier_errors_count_as_silence() {
        let mut c = controller(
            settings(3.0, 60.0),
            ScriptedSource::queued(frames(200)),
            FailingClassifier,
        );

        let session = c.run().await.expect("run");
        assert_eq!(session.stop_reason(), Some(StopReason::Silence));
        assert_eq!(session.classifier_failures(), 93);
        assert_eq!(session.frames_classified(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn short_frames_are_stored_but_not_classified() {
        let mut script = vec![frame(512), frame(100), frame(512)];
        script.extend(frames(200));
        let mut c = controller(
            settings(3.0, 60.0),
            ScriptedSource::queued(script),
            ConstClassifier(0.0),
        );

        let session = c.run().await.expect("run");
        assert_eq!(session.frames_unclassified(), 1);
        assert_eq!(session.frames().len(), 94);
        assert_eq!(session.frames()[1].len(), 100);
        assert_eq!(session.sample_count(), 93 * 512 + 100);
    }

    // -----------------------------------------------------------------------
    // Failures and lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn device_failure_ends_capture_and_keeps_partial_session() {
        let mut script = frames(4);
        script.push(SourceEvent::Failed(DeviceError::Disconnected));
        script.extend(frames(4));
        let mut c = controller(
            settings(3.0, 60.0),
            ScriptedSource::queued(script),
            ConstClassifier(0.9),
        );

        let err = c.run().await.unwrap_err();
        assert!(matches!(err, CaptureError::Device(DeviceError::Disconnected)), "{err}");
        assert_eq!(c.state(), CaptureState::StoppedCancel);

        let session = c.take_session().expect("partial session");
        assert_eq!(session.frames().len(), 4);
        assert_eq!(session.stop_reason(), Some(StopReason::ManualCancel));
        assert!(session.failure().is_some());
    }

    #[tokio::test]
    async fn start_failure_surfaces_as_device_error() {
        let source = ScriptedSource {
            start_error: Some(DeviceError::NoDevice),
            ..ScriptedSource::default()
        };
        let mut c = controller(settings(3.0, 60.0), source, ConstClassifier(0.9));

        let err = c.run().await.unwrap_err();
        assert!(matches!(err, CaptureError::Device(DeviceError::NoDevice)));
        assert_eq!(c.state(), CaptureState::StoppedCancel);
        assert!(c.take_session().is_some_and(|s| s.frames().is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn overruns_are_not_fatal() {
        let mut script = vec![SourceEvent::Overrun("xrun".into())];
        script.extend(frames(93));
        let mut c = controller(
            settings(3.0, 60.0),
            ScriptedSource::queued(script),
            ConstClassifier(0.0),
        );
        let session = c.run().await.expect("run");
        assert_eq!(session.stop_reason(), Some(StopReason::Silence));
    }

    #[tokio::test(start_paused = true)]
    async fn run_requires_reset_after_a_stop() {
        let mut c = controller(
            settings(3.0, 1.0),
            ScriptedSource::queued(Vec::new()),
            ConstClassifier(0.0),
        );
        c.run().await.expect("first run");

        let err = c.run().await.unwrap_err();
        assert!(matches!(err, CaptureError::InvalidState(CaptureState::StoppedTimeout)));

        c.canceller().cancel(CancelPolicy::KeepAudio);
        c.reset();
        assert_eq!(c.state(), CaptureState::Idle);
        assert_eq!(c.tracker().consecutive_silent_frames(), 0);

        // reset cleared the stale cancel, so this run times out normally.
        let session = c.run().await.expect("second run");
        assert_eq!(session.stop_reason(), Some(StopReason::Timeout));
    }
}
