//! Microphone input for a single utterance
//!
//! [`Microphone::open`] settles on a device and stream format once;
//! [`Microphone::record`] starts a [`Recording`] on that same device, which
//! collects mono samples until it is finished or dropped.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};

use crate::{Error, Result};

/// Sample rate for voice capture (16kHz for speech)
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// The default input device with a 16 kHz float format chosen
pub struct Microphone {
    device: Device,
    config: StreamConfig,
}

impl Microphone {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recognition`] if there is no input device or it
    /// cannot capture float samples at 16 kHz
    pub fn open() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Recognition("no input device available".to_string()))?;
        let config = input_config(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            channels = config.channels,
            "microphone opened"
        );

        Ok(Self { device, config })
    }

    /// Start recording from this microphone
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recognition`] if the input stream cannot be started
    pub fn record(&self) -> Result<Recording> {
        let pending = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&pending);
        let channels = usize::from(self.config.channels);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = sink.lock() {
                        append_mono(&mut buf, data, channels);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "microphone stream error");
                },
                None,
            )
            .map_err(|e| Error::Recognition(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::Recognition(e.to_string()))?;

        tracing::debug!("recording started");
        Ok(Recording { stream, pending })
    }
}

/// Pick a float config at 16 kHz with the fewest channels
fn input_config(device: &Device) -> Result<StreamConfig> {
    let rate = SampleRate(CAPTURE_SAMPLE_RATE);

    let supported = device
        .supported_input_configs()
        .map_err(|e| Error::Recognition(e.to_string()))?
        .filter(|c| {
            c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
        })
        .min_by_key(SupportedStreamConfigRange::channels)
        .ok_or_else(|| {
            Error::Recognition(format!("no input config supports {CAPTURE_SAMPLE_RATE} Hz"))
        })?;

    Ok(supported.with_sample_rate(rate).config())
}

/// Append interleaved frames averaged down to one channel
fn append_mono(out: &mut Vec<f32>, data: &[f32], channels: usize) {
    if channels <= 1 {
        out.extend_from_slice(data);
        return;
    }

    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / channels as f32;
    out.extend(
        data.chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

/// An active input stream; dropping it stops the microphone
pub struct Recording {
    stream: Stream,
    pending: Arc<Mutex<Vec<f32>>>,
}

impl Recording {
    /// Take the samples captured since the last drain
    #[must_use]
    pub fn drain(&self) -> Vec<f32> {
        self.pending
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Stop the stream and return whatever had not been drained
    #[must_use]
    pub fn finish(self) -> Vec<f32> {
        drop(self.stream);
        tracing::debug!("recording stopped");
        self.pending
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }
}

/// Root-mean-square level of a block of samples
#[must_use]
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    #[allow(clippy::cast_precision_loss)]
    let len = samples.len() as f32;
    (sum / len).sqrt()
}

/// Encode mono f32 samples as 16-bit WAV for transcription
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Recognition(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Recognition(e.to_string()))?;
        }

        writer
            .finalize()
            .map_err(|e| Error::Recognition(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_mono_passes_single_channel() {
        let mut out = vec![0.5];
        append_mono(&mut out, &[0.1, -0.2, 0.3], 1);
        assert_eq!(out, vec![0.5, 0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_append_mono_averages_frames() {
        let mut out = Vec::new();
        append_mono(&mut out, &[0.5, 0.25, -1.0, 0.0, 0.2, 0.2], 2);
        assert_eq!(out, vec![0.375, -0.5, 0.2]);
    }

    #[test]
    fn test_append_mono_drops_partial_frame() {
        let mut out = Vec::new();
        append_mono(&mut out, &[1.0, 1.0, 1.0, 0.5], 3);
        assert_eq!(out, vec![1.0]);
    }

    #[test]
    fn test_rms_level() {
        assert!(rms_level(&[]).abs() < f32::EPSILON);
        assert!(rms_level(&[0.0; 100]).abs() < f32::EPSILON);
        assert!((rms_level(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_samples_to_wav_header() {
        let wav = samples_to_wav(&[0.0, 0.25, -0.25, 1.0], CAPTURE_SAMPLE_RATE).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 4 * 2);

        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, CAPTURE_SAMPLE_RATE);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 8191, -8191, 32767]);
    }
}
