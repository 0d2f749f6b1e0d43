//! Materialising a finished capture session into a PCM16 WAV artifact.
//!
//! [`RecordingSink::finalize`] concatenates a session's frames in arrival
//! order and wraps them in a RIFF/WAVE container (`fmt ` chunk: PCM, 1
//! channel, configured rate, 16-bit; `data` chunk: little-endian samples).
//! The resulting [`AudioArtifact`] is immutable and can be written to disk
//! or handed straight to the assessment client.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use thiserror::Error;

use super::frame::{AudioFormat, AudioFrame};
use crate::pipeline::CaptureSession;

// ---------------------------------------------------------------------------
// EncodingError
// ---------------------------------------------------------------------------

/// The session could not be turned into (or read back from) a WAV artifact.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// A frame's format disagrees with the sink's configured format.
    #[error("frame {index} was captured at {got} Hz but the sink writes {expected} Hz")]
    FormatMismatch {
        index: usize,
        expected: u32,
        got: u32,
    },

    /// The WAV payload is not PCM16 mono.
    #[error("unsupported WAV layout: {channels} channel(s), {bits} bit {format:?}")]
    UnsupportedLayout {
        channels: u16,
        bits: u16,
        format: SampleFormat,
    },

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// AudioArtifact
// ---------------------------------------------------------------------------

/// A finalized WAV byte buffer plus its format descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    bytes: Vec<u8>,
    format: AudioFormat,
    sample_count: usize,
}

impl AudioArtifact {
    /// Parse WAV bytes produced elsewhere, accepting only PCM16 mono.
    pub fn from_wav_bytes(bytes: Vec<u8>) -> Result<Self, EncodingError> {
        let (spec, sample_count) = {
            let reader = WavReader::new(Cursor::new(bytes.as_slice()))?;
            (reader.spec(), reader.len() as usize)
        };
        if spec.channels != 1 || spec.bits_per_sample != 16 || spec.sample_format != SampleFormat::Int
        {
            return Err(EncodingError::UnsupportedLayout {
                channels: spec.channels,
                bits: spec.bits_per_sample,
                format: spec.sample_format,
            });
        }
        Ok(Self {
            format: AudioFormat::pcm16_mono(spec.sample_rate),
            sample_count,
            bytes,
        })
    }

    /// Read and parse a WAV file from disk.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, EncodingError> {
        let bytes = std::fs::read(path)?;
        Self::from_wav_bytes(bytes)
    }

    /// Complete WAV file contents, header included.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Number of mono samples in the `data` chunk.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Audio duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count as f64 / f64::from(self.format.sample_rate)
    }

    /// Decode the `data` chunk back into samples.
    pub fn decode_samples(&self) -> Result<Vec<i16>, EncodingError> {
        let mut reader = WavReader::new(Cursor::new(self.bytes.as_slice()))?;
        let samples = reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    /// Write the artifact to `path`, creating parent directories as needed.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), EncodingError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &self.bytes)?;
        log::info!("audio saved to {}", path.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Turns frame sequences into PCM16 mono WAV artifacts at a fixed rate.
///
/// # Example
///
/// ```rust
/// use speech_assess::audio::{AudioFrame, RecordingSink};
///
/// let sink = RecordingSink::new(16_000);
/// let frames = vec![AudioFrame::new(vec![1, 2, 3], 16_000)];
/// let artifact = sink.encode_frames(&frames).unwrap();
/// assert_eq!(artifact.decode_samples().unwrap(), vec![1, 2, 3]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RecordingSink {
    format: AudioFormat,
}

impl RecordingSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            format: AudioFormat::pcm16_mono(sample_rate),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Consume a finished session and encode its frames.
    ///
    /// Zero-frame sessions (e.g. an immediate cancel) produce a valid WAV
    /// with an empty `data` chunk.
    pub fn finalize(&self, session: CaptureSession) -> Result<AudioArtifact, EncodingError> {
        let artifact = self.encode_frames(session.frames())?;
        log::debug!(
            "finalized {} frame(s) into {} samples ({:.2}s)",
            session.frames().len(),
            artifact.sample_count(),
            artifact.duration_secs()
        );
        Ok(artifact)
    }

    /// Encode `frames` in order into one contiguous WAV buffer.
    pub fn encode_frames(&self, frames: &[AudioFrame]) -> Result<AudioArtifact, EncodingError> {
        for (index, frame) in frames.iter().enumerate() {
            if frame.sample_rate() != self.format.sample_rate {
                return Err(EncodingError::FormatMismatch {
                    index,
                    expected: self.format.sample_rate,
                    got: frame.sample_rate(),
                });
            }
        }

        let spec = WavSpec {
            channels: self.format.channels,
            sample_rate: self.format.sample_rate,
            bits_per_sample: self.format.bits_per_sample,
            sample_format: SampleFormat::Int,
        };

        let mut sample_count = 0usize;
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut buffer, spec)?;
            for frame in frames {
                for &sample in frame.samples() {
                    writer.write_sample(sample)?;
                }
                sample_count += frame.len();
            }
            writer.finalize()?;
        }

        Ok(AudioArtifact {
            bytes: buffer.into_inner(),
            format: self.format,
            sample_count,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
