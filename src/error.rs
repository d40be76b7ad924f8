//! Error types for the Alexa voice client

use thiserror::Error;

/// Result type alias for Alexa operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Alexa voice client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio payload is not valid base64
    #[error("decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    /// PCM payload does not hold a whole number of samples or frames
    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    /// No audio output context could be opened
    #[error("playback unavailable: {0}")]
    PlaybackUnavailable(String),

    /// Chat service failure of any kind
    #[error("chat error: {0}")]
    RemoteChat(String),

    /// Speech synthesis failure of any kind
    #[error("TTS error: {0}")]
    RemoteSpeech(String),

    /// Speech capture or transcription failure
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Session persistence error
    #[error("storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
