//! In-memory PCM audio buffer

use std::time::Duration;

use crate::{Error, Result};

/// Bit depths the wave codec can represent
pub const SUPPORTED_BIT_DEPTHS: [u16; 3] = [8, 16, 32];

/// Normalized, interleaved PCM samples plus format metadata.
///
/// Samples are 32-bit floats in [-1.0, 1.0], interleaved by channel.
/// Immutable once constructed; transformations build a new buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    samples: Vec<f32>,
}

impl PcmBuffer {
    /// Create a buffer, validating the format invariants.
    ///
    /// An empty sample vector is valid and represents silence.
    ///
    /// # Errors
    ///
    /// Returns error if the bit depth is outside {8, 16, 32}, the channel
    /// count is zero, or the samples do not divide into whole frames.
    pub fn new(
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
        samples: Vec<f32>,
    ) -> Result<Self> {
        if !SUPPORTED_BIT_DEPTHS.contains(&bits_per_sample) {
            return Err(Error::UnsupportedBitDepth(bits_per_sample));
        }
        if channels == 0 {
            return Err(Error::Audio("channel count must be at least 1".to_string()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(Error::Audio(format!(
                "{} samples do not divide into {channels}-channel frames",
                samples.len()
            )));
        }

        Ok(Self {
            sample_rate,
            channels,
            bits_per_sample,
            samples,
        })
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Interleaved channel count
    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Bit depth the buffer round-trips through the wave codec at
    #[must_use]
    pub const fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    /// Normalized interleaved samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Consume the buffer, returning its samples
    #[must_use]
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Whether the buffer holds no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of per-channel frames
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Playback duration at the buffer's sample rate
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = self.frame_count() as u64;
        Duration::from_nanos(frames * 1_000_000_000 / u64::from(self.sample_rate))
    }
}
