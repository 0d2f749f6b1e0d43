//! Pronunciation assessment of a finished recording.
//!
//! ```text
//! AudioArtifact + reference text
//!        │
//!        ▼
//! PronunciationAssessor::assess()  ── AzureAssessor (reqwest, REST)
//!        │
//!        ▼
//! Option<AssessmentResult> ── save_to() ──▶ pronunciation_result.json
//! ```

pub mod client;
pub mod result;

pub use client::{AssessError, AzureAssessor, PronunciationAssessor};
pub use result::{load_reference_text, AssessmentResult};
