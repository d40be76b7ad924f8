//! Audio playback to speakers

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};
use tokio::sync::Mutex;

use super::decode::decode_base64;
use super::pcm::{AudioBuffer, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE};
use crate::{Error, Result};

/// Extra wait past the buffer duration before giving up on the device
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Trailing delay so the device flushes its last period
const DRAIN_TAIL: Duration = Duration::from_millis(100);

/// Capability to play one buffer on an audio output
///
/// Implementations open an output context for the duration of the call,
/// resolve once playback has finished, and release the context before
/// returning.
#[async_trait]
pub trait AudioOutputPort: Send + Sync {
    /// Play a buffer to completion
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlaybackUnavailable`] if no output context can be opened
    async fn play(&self, buffer: AudioBuffer) -> Result<()>;
}

/// Plays audio to the default output device via `cpal`
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalOutput;

impl CpalOutput {
    /// Create a new `cpal` output adapter
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioOutputPort for CpalOutput {
    async fn play(&self, buffer: AudioBuffer) -> Result<()> {
        // cpal streams are not Send on every host, so the whole stream
        // lifetime stays on one blocking thread
        tokio::task::spawn_blocking(move || play_blocking(buffer))
            .await
            .map_err(|e| Error::PlaybackUnavailable(format!("playback task failed: {e}")))?
    }
}

/// Find an output config at `sample_rate`, preferring `channels`
fn output_config(device: &Device, sample_rate: u32, channels: u16) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let pick = |wanted: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == wanted && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        })
    };

    let supported = pick(channels)
        // Fallback: try stereo, then mono
        .or_else(|| pick(2))
        .or_else(|| pick(1))
        .ok_or_else(|| {
            Error::PlaybackUnavailable(format!("no output config supports {sample_rate} Hz"))
        })?;

    Ok(supported.with_sample_rate(rate).config())
}

/// Play a buffer on the current thread, returning once it has drained
fn play_blocking(buffer: AudioBuffer) -> Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::PlaybackUnavailable("no output device available".to_string()))?;

    let source_channels = u16::try_from(buffer.channel_count()).unwrap_or(SPEECH_CHANNELS);
    let config = output_config(&device, buffer.sample_rate(), source_channels)?;
    let device_channels = usize::from(config.channels);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = buffer.sample_rate(),
        channels = config.channels,
        "audio output opened"
    );

    let frames = buffer.frames();
    let duration = buffer.duration();
    let planes = buffer.into_channels();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let mut done_tx = Some(done_tx);
    let mut position = 0usize;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(device_channels) {
                    if position < frames {
                        for (channel, out) in frame.iter_mut().enumerate() {
                            *out = planes[channel % planes.len()][position];
                        }
                        position += 1;
                    } else {
                        frame.fill(0.0);
                        if let Some(tx) = done_tx.take() {
                            let _ = tx.send(());
                        }
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::PlaybackUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| Error::PlaybackUnavailable(e.to_string()))?;

    if done_rx.recv_timeout(duration + DRAIN_GRACE).is_err() {
        tracing::warn!(frames, "output device did not drain in time");
    }

    std::thread::sleep(DRAIN_TAIL);

    drop(stream);
    tracing::debug!(frames, "playback complete");

    Ok(())
}

/// Serializes playback so at most one buffer is audible at a time
pub struct PlaybackScheduler {
    output: Arc<dyn AudioOutputPort>,
    in_flight: Mutex<()>,
}

impl PlaybackScheduler {
    /// Create a scheduler over an output port
    #[must_use]
    pub fn new(output: Arc<dyn AudioOutputPort>) -> Self {
        Self {
            output,
            in_flight: Mutex::new(()),
        }
    }

    /// Play a converted buffer, waiting for any earlier playback first
    ///
    /// # Errors
    ///
    /// Returns error if the output port fails
    pub async fn play(&self, buffer: AudioBuffer) -> Result<()> {
        let _guard = self.in_flight.lock().await;
        tracing::debug!(
            frames = buffer.frames(),
            duration_ms = u64::try_from(buffer.duration().as_millis()).unwrap_or(u64::MAX),
            "starting playback"
        );
        self.output.play(buffer).await
    }

    /// Decode a base64 speech payload (24 kHz mono s16le) and play it
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] or [`Error::MalformedAudio`] for a bad
    /// payload, or the output port's error
    pub async fn play_base64(&self, payload: &str) -> Result<()> {
        let bytes = decode_base64(payload)?;
        let buffer = AudioBuffer::from_pcm16le(&bytes, SPEECH_SAMPLE_RATE, SPEECH_CHANNELS)?;
        self.play(buffer).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingOutput {
        active: AtomicUsize,
        peak: AtomicUsize,
        played: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl AudioOutputPort for CountingOutput {
        async fn play(&self, buffer: AudioBuffer) -> Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.played.lock().unwrap().push(buffer.frames());
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_play_base64_decodes_mono_speech() {
        let output = Arc::new(CountingOutput::default());
        let scheduler = PlaybackScheduler::new(output.clone());

        // four samples: 0, 1, -1, 32767
        scheduler.play_base64("AAABAP///38=").await.unwrap();

        assert_eq!(*output.played.lock().unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn test_play_base64_rejects_bad_payloads() {
        let output = Arc::new(CountingOutput::default());
        let scheduler = PlaybackScheduler::new(output.clone());

        let err = scheduler.play_base64("%%%").await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));

        // three bytes
        let err = scheduler.play_base64("AAEC").await.unwrap_err();
        assert!(matches!(err, Error::MalformedAudio(_)));

        assert!(output.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_plays_never_overlap() {
        let output = Arc::new(CountingOutput::default());
        let scheduler = PlaybackScheduler::new(output.clone());

        let a = AudioBuffer::mono(vec![0.0; 10], SPEECH_SAMPLE_RATE);
        let b = AudioBuffer::mono(vec![0.0; 20], SPEECH_SAMPLE_RATE);
        let (ra, rb) = tokio::join!(scheduler.play(a), scheduler.play(b));
        ra.unwrap();
        rb.unwrap();

        assert_eq!(output.peak.load(Ordering::SeqCst), 1);
        assert_eq!(output.played.lock().unwrap().len(), 2);
    }
}
