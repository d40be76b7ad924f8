//! Remote model collaborators
//!
//! The conversation depends on these traits only; [`GeminiClient`] is the
//! production adapter for all three.

mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;

use crate::Result;

/// Author of a history entry, as the chat service names it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRole {
    User,
    Model,
}

impl HistoryRole {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One prior turn sent as context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub role: HistoryRole,
    pub content: String,
}

/// A single chat completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// Prior turns, oldest first
    pub history: Vec<HistoryMessage>,
    /// The text being submitted now
    pub message: String,
    /// System instruction for the assistant persona
    pub system_instruction: String,
    /// Allow the model to ground its answer with web search
    pub web_search: bool,
}

/// A citation attached by the model's retrieval tool, as received
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Citation {
    pub title: Option<String>,
    pub uri: Option<String>,
}

/// The model's reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatReply {
    /// Reply text, possibly empty
    pub text: String,
    /// Grounding citations, unfiltered
    pub citations: Vec<Citation>,
}

/// Hosted chat-completion model
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send one request and wait for the full reply
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RemoteChat`] on any failure
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply>;
}

/// Hosted text-to-speech model
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize speech for `text`
    ///
    /// Returns base64-encoded 24 kHz mono s16le PCM, or `None` when the
    /// service answered without audio.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RemoteSpeech`] on any failure
    async fn synthesize(&self, text: &str) -> Result<Option<String>>;
}

/// Hosted speech-to-text model
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one WAV utterance spoken in `locale` (e.g. "ru-RU")
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Recognition`] on any failure
    async fn transcribe(&self, wav: &[u8], locale: &str) -> Result<String>;
}
