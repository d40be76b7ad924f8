//! Conversion of headerless 16-bit PCM into normalized float buffers

use std::time::Duration;

use crate::{Error, Result};

/// Sample rate of synthesized speech
pub const SPEECH_SAMPLE_RATE: u32 = 24000;

/// Channel count of synthesized speech
pub const SPEECH_CHANNELS: u16 = 1;

/// Normalization divisor for signed 16-bit samples
///
/// 32767 maps to just under 1.0 and -32768 to exactly -1.0.
const I16_SCALE: f32 = 32768.0;

/// A planar buffer of normalized samples in `[-1.0, 1.0]`
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Interpret bytes as interleaved signed 16-bit little-endian samples
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedAudio`] if the byte length is odd, if
    /// `channels` is zero, or if the samples don't divide into whole frames
    pub fn from_pcm16le(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<Self> {
        if channels == 0 {
            return Err(Error::MalformedAudio("channel count must be non-zero".to_string()));
        }

        if bytes.len() % 2 != 0 {
            return Err(Error::MalformedAudio(format!(
                "odd PCM byte length {} leaves an incomplete sample",
                bytes.len()
            )));
        }

        let channel_count = usize::from(channels);
        let sample_count = bytes.len() / 2;
        if sample_count % channel_count != 0 {
            return Err(Error::MalformedAudio(format!(
                "{sample_count} samples do not fill whole frames of {channel_count} channels"
            )));
        }

        let frames = sample_count / channel_count;
        let mut planes = vec![Vec::with_capacity(frames); channel_count];

        for (i, pair) in bytes.chunks_exact(2).enumerate() {
            let raw = i16::from_le_bytes([pair[0], pair[1]]);
            planes[i % channel_count].push(f32::from(raw) / I16_SCALE);
        }

        tracing::trace!(frames, channels, sample_rate, "converted PCM payload");

        Ok(Self {
            sample_rate,
            channels: planes,
        })
    }

    /// Build a mono buffer from already-normalized samples
    #[must_use]
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Whether the buffer holds no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Samples of one channel
    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Playback duration
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = u64::try_from(self.frames()).unwrap_or(u64::MAX);
        Duration::from_millis(frames.saturating_mul(1000) / u64::from(self.sample_rate))
    }

    /// Consume the buffer, yielding one sample vector per channel
    #[must_use]
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }
}
