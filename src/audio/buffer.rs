//! Re-chunking of device callback buffers into fixed-size frames.
//!
//! cpal hands the callback whatever buffer size the backend chose, often
//! interleaved and in a non-`i16` sample format.  [`FrameAssembler`] downmixes
//! each buffer to mono `i16`, appends it to a pending queue and emits complete
//! [`AudioFrame`]s of exactly `frame_len` samples.  Nothing is ever discarded:
//! a partial tail stays pending until the next callback completes it.
//!
//! # Example
//!
//! ```rust
//! use speech_assess::audio::FrameAssembler;
//!
//! let mut asm = FrameAssembler::new(4, 16_000);
//! let mut frames = Vec::new();
//! asm.push_interleaved(&[1_i16, 2, 3, 4, 5, 6], 1, |s| s, |f| frames.push(f));
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].samples(), &[1, 2, 3, 4]);
//! assert_eq!(asm.pending_len(), 2);
//! ```

use super::frame::AudioFrame;

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Accumulates mono samples and slices them into fixed-length frames.
pub struct FrameAssembler {
    frame_len: usize,
    sample_rate: u32,
    pending: Vec<i16>,
}

impl FrameAssembler {
    /// Create an assembler emitting frames of `frame_len` samples.
    ///
    /// # Panics
    ///
    /// Panics if `frame_len == 0`.
    pub fn new(frame_len: usize, sample_rate: u32) -> Self {
        assert!(frame_len > 0, "FrameAssembler frame_len must be > 0");
        Self {
            frame_len,
            sample_rate,
            pending: Vec::with_capacity(frame_len * 2),
        }
    }

    /// Append an interleaved device buffer and emit every completed frame.
    ///
    /// Multi-channel input is averaged down to mono.  `convert` maps one
    /// device sample to `i16`; `emit` receives frames in arrival order.
    pub fn push_interleaved<T, C, E>(&mut self, data: &[T], channels: usize, mut convert: C, mut emit: E)
    where
        T: Copy,
        C: FnMut(T) -> i16,
        E: FnMut(AudioFrame),
    {
        if channels <= 1 {
            self.pending.extend(data.iter().copied().map(&mut convert));
        } else {
            for group in data.chunks(channels) {
                let sum: i32 = group.iter().map(|&s| i32::from(convert(s))).sum();
                self.pending.push((sum / group.len() as i32) as i16);
            }
        }

        while self.pending.len() >= self.frame_len {
            let samples: Vec<i16> = self.pending.drain(..self.frame_len).collect();
            emit(AudioFrame::new(samples, self.sample_rate));
        }
    }

    /// Samples waiting for the next callback to complete a frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Configured frame length in samples.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }
}

// ---------------------------------------------------------------------------
// Sample conversion helpers
// ---------------------------------------------------------------------------

/// Convert a normalised `f32` sample to `i16`, clamping out-of-range input.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32_767.0).round() as i16
}

/// Convert an unsigned 16-bit sample (midpoint 32768) to signed.
pub fn u16_to_i16(sample: u16) -> i16 {
    (i32::from(sample) - 32_768) as i16
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(asm: &mut FrameAssembler, data: &[i16], channels: usize) -> Vec<AudioFrame> {
        let mut out = Vec::new();
        asm.push_interleaved(data, channels, |s| s, |f| out.push(f));
        out
    }

    #[test]
    fn exact_multiple_emits_all_frames() {
        let mut asm = FrameAssembler::new(3, 16_000);
        let frames = collect(&mut asm, &[1, 2, 3, 4, 5, 6], 1);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].samples(), &[4, 5, 6]);
        assert_eq!(asm.pending_len(), 0);
    }

    #[test]
    fn partial_tail_completes_on_next_push() {
        let mut asm = FrameAssembler::new(4, 16_000);
        assert!(collect(&mut asm, &[1, 2, 3], 1).is_empty());
        let frames = collect(&mut asm, &[4, 5], 1);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples(), &[1, 2, 3, 4]);
        assert_eq!(asm.pending_len(), 1);
    }

    #[test]
    fn no_sample_lost_across_odd_buffer_sizes() {
        let mut asm = FrameAssembler::new(5, 8_000);
        let mut frames = Vec::new();
        let mut next = 0_i16;
        for size in [1usize, 7, 3, 11, 2, 6] {
            let buf: Vec<i16> = (0..size)
                .map(|_| {
                    next += 1;
                    next
                })
                .collect();
            asm.push_interleaved(&buf, 1, |s| s, |f| frames.push(f));
        }
        let flat: Vec<i16> = frames.iter().flat_map(|f| f.samples().to_vec()).collect();
        let expected: Vec<i16> = (1..=(frames.len() * 5) as i16).collect();
        assert_eq!(flat, expected);
        assert_eq!(frames.len() * 5 + asm.pending_len(), 30);
        assert!(frames.iter().all(|f| f.sample_rate() == 8_000));
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let mut asm = FrameAssembler::new(2, 16_000);
        let frames = collect(&mut asm, &[100, 300, -50, 50], 2);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples(), &[200, 0]);
    }

    #[test]
    fn converters_clamp_and_center() {
        assert_eq!(f32_to_i16(2.0), 32_767);
        assert_eq!(f32_to_i16(-2.0), -32_767);
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(u16_to_i16(32_768), 0);
        assert_eq!(u16_to_i16(0), i16::MIN);
        assert_eq!(u16_to_i16(u16::MAX), i16::MAX);
    }

    #[test]
    #[should_panic(expected = "FrameAssembler frame_len must be > 0")]
    fn zero_frame_len_panics() {
        let _ = FrameAssembler::new(0, 16_000);
    }
}
