//! Audio layer: microphone capture → fixed-size frames → VAD → WAV artifact.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → FrameAssembler → SourceEvent::Frame (mpsc)
//!           → CaptureController (VadClassifier → SilenceTracker)
//!           → RecordingSink → AudioArtifact → AudioValidator
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use speech_assess::audio::{AudioFrameSource, CpalSource, SourceEvent};
//!
//! # async fn demo() {
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut source = CpalSource::new(None);
//! source.start(512, 16_000, tx).unwrap();
//!
//! while let Some(SourceEvent::Frame(frame)) = rx.recv().await {
//!     println!("received {} samples @ {}Hz", frame.len(), frame.sample_rate());
//! }
//! # }
//! ```

pub mod buffer;
pub mod capture;
pub mod frame;
pub mod quality;
pub mod vad;
pub mod wav;

pub use buffer::FrameAssembler;
pub use capture::{AudioFrameSource, CpalSource, DeviceError, DeviceLease, FrameSender, SourceEvent};
pub use frame::{AudioFormat, AudioFrame, SUPPORTED_SAMPLE_RATES};
pub use quality::{AudioValidator, ValidationError};
pub use vad::{
    ClassifierError, Confidence, EnergyClassifier, SilenceDecision, SilenceTracker, VadClassifier,
};
pub use wav::{AudioArtifact, EncodingError, RecordingSink};
