//! Single-utterance speech recognition from the microphone

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::SpeechCapturePort;
use super::capture::{CAPTURE_SAMPLE_RATE, Microphone, samples_to_wav};
use super::endpoint::UtteranceDetector;
use crate::providers::Transcriber;
use crate::{Error, Result};

/// How often captured samples are drained and checked
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Records one utterance and hands it to a remote transcriber
pub struct MicrophoneRecognizer {
    transcriber: Arc<dyn Transcriber>,
    locale: String,
    max_duration: Duration,
    stop: Arc<AtomicBool>,
}

impl MicrophoneRecognizer {
    /// Create a recognizer for `locale` (e.g. "ru-RU")
    #[must_use]
    pub fn new(transcriber: Arc<dyn Transcriber>, locale: String, max_duration: Duration) -> Self {
        Self {
            transcriber,
            locale,
            max_duration,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl SpeechCapturePort for MicrophoneRecognizer {
    async fn capture_utterance(&self) -> Result<String> {
        self.stop.store(false, Ordering::SeqCst);

        let stop = Arc::clone(&self.stop);
        let max_duration = self.max_duration;
        let samples = tokio::task::spawn_blocking(move || record_utterance(&stop, max_duration))
            .await
            .map_err(|e| Error::Recognition(format!("capture task failed: {e}")))??;

        if samples.is_empty() {
            return Err(Error::Recognition("no speech captured".to_string()));
        }

        let wav = samples_to_wav(&samples, CAPTURE_SAMPLE_RATE)?;
        let transcript = self.transcriber.transcribe(&wav, &self.locale).await?;

        if transcript.trim().is_empty() {
            return Err(Error::Recognition("nothing recognized".to_string()));
        }
        Ok(transcript)
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Record until the utterance ends, `stop` is raised, or `max_duration` passes
///
/// Returns no samples if no speech was heard.
fn record_utterance(stop: &AtomicBool, max_duration: Duration) -> Result<Vec<f32>> {
    let recording = Microphone::open()?.record()?;

    let mut detector = UtteranceDetector::new();
    let mut samples = Vec::new();
    let started = Instant::now();

    while !stop.load(Ordering::SeqCst) && started.elapsed() < max_duration {
        std::thread::sleep(POLL_INTERVAL);
        let block = recording.drain();
        let complete = detector.process(&block);
        samples.extend(block);
        if complete {
            break;
        }
    }

    samples.extend(recording.finish());

    tracing::debug!(
        samples = samples.len(),
        heard_speech = detector.heard_speech(),
        "recording finished"
    );

    if detector.heard_speech() {
        Ok(samples)
    } else {
        Ok(Vec::new())
    }
}
