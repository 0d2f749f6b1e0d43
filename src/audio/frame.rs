//! Audio frame and format types shared by capture, VAD and the WAV sink.
//!
//! An [`AudioFrame`] is the unit of streaming processing: a fixed-length
//! slice of mono PCM16 samples.  Frames are produced by an
//! [`AudioFrameSource`](crate::audio::AudioFrameSource) and never mutated
//! afterwards.

/// Sample rates the capture core accepts (Hz).
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [8_000, 16_000];

/// Scale factor between `i16` PCM and normalised `f32` in `[-1.0, 1.0)`.
const I16_SCALE: f32 = 32_768.0;

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// An immutable block of mono signed 16-bit samples.
///
/// # Example
///
/// ```rust
/// use speech_assess::audio::AudioFrame;
///
/// let frame = AudioFrame::new(vec![0, 16_384, -16_384], 16_000);
/// assert_eq!(frame.len(), 3);
/// assert_eq!(frame.to_f32(), vec![0.0, 0.5, -0.5]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioFrame {
    /// Wrap `samples` captured at `sample_rate` Hz.
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// The raw PCM16 samples in arrival order.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Sample rate the frame was captured at, in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples in the frame.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` for a frame with no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Normalise to `f32` in `[-1.0, 1.0)` for the VAD classifier.
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples
            .iter()
            .map(|&s| f32::from(s) / I16_SCALE)
            .collect()
    }

    /// Duration of the frame in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

// ---------------------------------------------------------------------------
// AudioFormat
// ---------------------------------------------------------------------------

/// Format descriptor attached to a finalized [`AudioArtifact`].
///
/// [`AudioArtifact`]: crate::audio::AudioArtifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// PCM16 mono at `sample_rate`, the only format the capture core writes.
    pub fn pcm16_mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
