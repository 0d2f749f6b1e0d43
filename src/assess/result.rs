//! Assessment result record, JSON persistence and reference-text loading.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::client::AssessError;

/// Scores returned by a pronunciation assessment.
///
/// Serialises with the service's PascalCase keys so the JSON file matches
/// what other tooling around the service expects:
///
/// ```json
/// {
///   "PronunciationScore": 86.0,
///   "AccuracyScore": 90.0,
///   "FluencyScore": 80.0,
///   "CompletenessScore": 100.0,
///   "RecognizedText": "Hello world.",
///   "RawResponse": { "...": "..." }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssessmentResult {
    pub pronunciation_score: f64,
    pub accuracy_score: f64,
    pub fluency_score: f64,
    pub completeness_score: f64,
    pub recognized_text: String,
    /// Full service response, kept verbatim.
    pub raw_response: serde_json::Value,
}

impl AssessmentResult {
    /// Write as pretty-printed JSON, creating parent directories as needed.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), AssessError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| AssessError::Parse(e.to_string()))?;
        std::fs::write(path, json)?;
        log::info!("assessment result saved to {}", path.display());
        Ok(())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, AssessError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| AssessError::Parse(e.to_string()))
    }
}

/// Read the text the speaker was asked to read, trimmed.
///
/// # Errors
///
/// [`AssessError::ReferenceText`] when the file is missing or holds only
/// whitespace; other I/O failures as [`AssessError::Io`].
pub fn load_reference_text(path: impl AsRef<Path>) -> Result<String, AssessError> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AssessError::ReferenceText(format!(
                "{} not found, create it with the text to read aloud",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let text = content.trim();
    if text.is_empty() {
        return Err(AssessError::ReferenceText(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(text.to_string())
}
