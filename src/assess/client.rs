//! `PronunciationAssessor` trait and the Azure Speech REST implementation.
//!
//! [`AzureAssessor`] posts a PCM16 WAV to the short-audio recognition
//! endpoint with a base64 `Pronunciation-Assessment` header (HundredMark
//! grading, phoneme granularity).  One request per recording; no retries.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde_json::Value;
use thiserror::Error;

use super::result::AssessmentResult;
use crate::audio::AudioArtifact;
use crate::config::AssessmentConfig;

// ---------------------------------------------------------------------------
// AssessError
// ---------------------------------------------------------------------------

/// Errors that can occur while assessing a recording.
#[derive(Debug, Error)]
pub enum AssessError {
    /// `SPEECH_KEY` / `SPEECH_REGION` (or their config keys) are unset.
    #[error("missing {0}; set it in settings.toml or the environment")]
    MissingCredentials(&'static str),

    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("assessment request timed out")]
    Timeout,

    /// The service answered with a non-success HTTP status.
    #[error("speech service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response (or a result file) was not the expected JSON.
    #[error("failed to parse assessment response: {0}")]
    Parse(String),

    /// The reference text file is missing or empty.
    #[error("reference text unavailable: {0}")]
    ReferenceText(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for AssessError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AssessError::Timeout
        } else {
            AssessError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// PronunciationAssessor trait
// ---------------------------------------------------------------------------

/// Async trait for pronunciation scoring backends.
///
/// Returns `Ok(None)` when the service could not recognise any speech in
/// the recording; that is a normal outcome, not an error.
#[async_trait]
pub trait PronunciationAssessor: Send + Sync {
    async fn assess(
        &self,
        audio: &AudioArtifact,
        reference_text: &str,
    ) -> Result<Option<AssessmentResult>, AssessError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn PronunciationAssessor>) {}
};

// ---------------------------------------------------------------------------
// AzureAssessor
// ---------------------------------------------------------------------------

/// Calls the Azure Speech short-audio REST API with pronunciation
/// assessment enabled.
pub struct AzureAssessor {
    client: reqwest::Client,
    endpoint: String,
    subscription_key: String,
    language: String,
}

impl AzureAssessor {
    /// Build from config.  Credentials must already be resolved (see
    /// [`AssessmentConfig::apply_env`]).
    pub fn from_config(config: &AssessmentConfig) -> Result<Self, AssessError> {
        let subscription_key = config
            .subscription_key
            .clone()
            .ok_or(AssessError::MissingCredentials("SPEECH_KEY"))?;
        let region = config
            .region
            .as_deref()
            .ok_or(AssessError::MissingCredentials("SPEECH_REGION"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Ok(Self {
            client,
            endpoint: endpoint_for_region(region),
            subscription_key,
            language: config.language.clone(),
        })
    }

    /// Point at a different base URL (sovereign clouds, local proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PronunciationAssessor for AzureAssessor {
    async fn assess(
        &self,
        audio: &AudioArtifact,
        reference_text: &str,
    ) -> Result<Option<AssessmentResult>, AssessError> {
        log::info!(
            "assessment: submitting {:.2}s of audio ({} bytes)",
            audio.duration_secs(),
            audio.bytes().len()
        );

        let content_type = format!(
            "audio/wav; codecs=audio/pcm; samplerate={}",
            audio.format().sample_rate
        );

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("language", self.language.as_str()), ("format", "detailed")])
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("Pronunciation-Assessment", assessment_header(reference_text))
            .body(audio.bytes().to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssessError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| AssessError::Parse(e.to_string()))?;

        let result = parse_response(json)?;
        match &result {
            Some(r) => log::info!(
                "assessment: pronunciation {:.1}, accuracy {:.1}, fluency {:.1}, completeness {:.1}",
                r.pronunciation_score,
                r.accuracy_score,
                r.fluency_score,
                r.completeness_score
            ),
            None => log::warn!("assessment: the service could not recognise any speech"),
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

/// Short-audio recognition URL for `region`.
pub fn endpoint_for_region(region: &str) -> String {
    format!(
        "https://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1",
        region.trim()
    )
}

/// Base64 of the assessment parameters JSON.
pub fn assessment_header(reference_text: &str) -> String {
    let params = serde_json::json!({
        "ReferenceText": reference_text,
        "GradingSystem": "HundredMark",
        "Granularity": "Phoneme",
        "Dimension": "Comprehensive",
    });
    BASE64_STANDARD.encode(params.to_string())
}

/// Turn a detailed-format recognition response into a result.
///
/// `RecognitionStatus` other than `Success` yields `Ok(None)`.  Scores are
/// read from the best hypothesis, either flat (`AccuracyScore`, `PronScore`,
/// ...) or nested under `PronunciationAssessment`.
pub fn parse_response(json: Value) -> Result<Option<AssessmentResult>, AssessError> {
    let status = json
        .get("RecognitionStatus")
        .and_then(Value::as_str)
        .ok_or_else(|| AssessError::Parse("missing RecognitionStatus".into()))?;
    if status != "Success" {
        log::debug!("assessment: recognition status {status}");
        return Ok(None);
    }

    let best = json
        .get("NBest")
        .and_then(|n| n.get(0))
        .ok_or_else(|| AssessError::Parse("response has no NBest hypotheses".into()))?;

    let recognized_text = best
        .get("Display")
        .or_else(|| json.get("DisplayText"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let pronunciation_score = score(best, "PronScore")?;
    let accuracy_score = score(best, "AccuracyScore")?;
    let fluency_score = score(best, "FluencyScore")?;
    let completeness_score = score(best, "CompletenessScore")?;

    Ok(Some(AssessmentResult {
        pronunciation_score,
        accuracy_score,
        fluency_score,
        completeness_score,
        recognized_text,
        raw_response: json,
    }))
}

fn score(best: &Value, key: &str) -> Result<f64, AssessError> {
    best.get("PronunciationAssessment")
        .and_then(|pa| pa.get(key))
        .or_else(|| best.get(key))
        .and_then(Value::as_f64)
        .ok_or_else(|| AssessError::Parse(format!("missing {key} in best hypothesis")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(key: Option<&str>, region: Option<&str>) -> AssessmentConfig {
        AssessmentConfig {
            subscription_key: key.map(str::to_string),
            region: region.map(str::to_string),
            ..AssessmentConfig::default()
        }
    }

    #[test]
    fn from_config_requires_credentials() {
        assert!(matches!(
            AzureAssessor::from_config(&config(None, Some("eastus"))),
            Err(AssessError::MissingCredentials("SPEECH_KEY"))
        ));
        assert!(matches!(
            AzureAssessor::from_config(&config(Some("k"), None)),
            Err(AssessError::MissingCredentials("SPEECH_REGION"))
        ));
    }

    #[test]
    fn endpoint_uses_region() {
        let a = AzureAssessor::from_config(&config(Some("k"), Some("westeurope"))).unwrap();
        assert_eq!(
            a.endpoint(),
            "https://westeurope.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1"
        );
        let a = a.with_endpoint("http://127.0.0.1:9000/v1");
        assert_eq!(a.endpoint(), "http://127.0.0.1:9000/v1");
    }

    #[test]
    fn header_decodes_to_assessment_params() {
        let encoded = assessment_header("Hello world");
        let decoded = BASE64_STANDARD.decode(encoded).unwrap();
        let params: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(params["ReferenceText"], "Hello world");
        assert_eq!(params["GradingSystem"], "HundredMark");
        assert_eq!(params["Granularity"], "Phoneme");
    }

    #[test]
    fn parses_flat_scores() {
        let body = json!({
            "RecognitionStatus": "Success",
            "DisplayText": "Hello world.",
            "NBest": [{
                "Display": "Hello world.",
                "AccuracyScore": 90.0,
                "FluencyScore": 80.0,
                "CompletenessScore": 100.0,
                "PronScore": 86.5
            }]
        });
        let r = parse_response(body.clone()).unwrap().expect("result");
        assert_eq!(r.pronunciation_score, 86.5);
        assert_eq!(r.accuracy_score, 90.0);
        assert_eq!(r.fluency_score, 80.0);
        assert_eq!(r.completeness_score, 100.0);
        assert_eq!(r.recognized_text, "Hello world.");
        assert_eq!(r.raw_response, body);
    }

    #[test]
    fn parses_nested_scores() {
        let body = json!({
            "RecognitionStatus": "Success",
            "DisplayText": "Good morning.",
            "NBest": [{
                "PronunciationAssessment": {
                    "AccuracyScore": 70,
                    "FluencyScore": 60,
                    "CompletenessScore": 50,
                    "PronScore": 62
                }
            }]
        });
        let r = parse_response(body).unwrap().expect("result");
        assert_eq!(r.pronunciation_score, 62.0);
        assert_eq!(r.completeness_score, 50.0);
        assert_eq!(r.recognized_text, "Good morning.");
    }

    #[test]
    fn no_match_is_not_an_error() {
        let body = json!({ "RecognitionStatus": "NoMatch", "Offset": 0, "Duration": 0 });
        assert!(parse_response(body).unwrap().is_none());
    }

    #[test]
    fn malformed_responses_are_parse_errors() {
        assert!(matches!(parse_response(json!({})), Err(AssessError::Parse(_))));
        assert!(matches!(
            parse_response(json!({ "RecognitionStatus": "Success", "NBest": [] })),
            Err(AssessError::Parse(_))
        ));
        assert!(matches!(
            parse_response(json!({
                "RecognitionStatus": "Success",
                "NBest": [{ "AccuracyScore": 1.0 }]
            })),
            Err(AssessError::Parse(_))
        ));
    }
}
