//! Capture pipeline: the record-until-silence state machine.
//!
//! # Architecture
//!
//! ```text
//! AudioFrameSource ──SourceEvent (mpsc)──▶ CaptureController::run()
//!                                              │
//!       CaptureCanceller (watch) ─────────────▶│
//!                                              ├─ VadClassifier → SilenceTracker
//!                                              ├─ sleep_until(deadline)
//!                                              ▼
//!                                         CaptureSession ──▶ RecordingSink
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use speech_assess::audio::{CpalSource, EnergyClassifier, RecordingSink};
//! use speech_assess::pipeline::{CaptureController, CaptureSettings};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let settings = CaptureSettings::default();
//! let classifier = Arc::new(EnergyClassifier::new(settings.frame_size));
//! let mut controller = CaptureController::new(
//!     settings.clone(),
//!     Box::new(CpalSource::new(None)),
//!     classifier,
//! )?;
//!
//! let session = controller.run().await?;
//! let artifact = RecordingSink::new(settings.sample_rate).finalize(session)?;
//! artifact.write_to("take.wav")?;
//! # Ok(())
//! # }
//! ```

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{CaptureCanceller, CaptureController, CaptureError, CaptureSettings};
pub use state::{CancelPolicy, CaptureSession, CaptureState, StopReason};
