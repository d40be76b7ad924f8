//! Voice input
//!
//! Microphone capture, end-of-utterance detection, and the
//! [`SpeechCapturePort`] the conversation listens through.

pub mod capture;
mod endpoint;
mod recognizer;

pub use capture::{CAPTURE_SAMPLE_RATE, Microphone, Recording, rms_level, samples_to_wav};
pub use endpoint::{UtteranceDetector, UtteranceState};
pub use recognizer::MicrophoneRecognizer;

use async_trait::async_trait;

use crate::Result;

/// Capability to capture one spoken utterance as text
///
/// One session yields exactly one final transcript or an error; there are
/// no interim results.
#[async_trait]
pub trait SpeechCapturePort: Send + Sync {
    /// Listen for one utterance and return its transcript
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Recognition`] if capture or transcription fails
    async fn capture_utterance(&self) -> Result<String>;

    /// End the active session early
    fn stop(&self);
}
