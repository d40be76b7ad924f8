//! Alexa - voice-enabled chat client for hosted generative AI models
//!
//! This library provides the core of the Alexa assistant:
//! - Conversation orchestration (single in-flight turn, bounded history)
//! - Remote chat, speech synthesis and transcription via Gemini
//! - Decoding and playback of raw 16-bit PCM speech
//! - Microphone capture for voice input
//! - Local persistence of the user name and chat history
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Terminal shell                     │
//! │     login  │  chat  │  /listen  │  /tts  │  /logout  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Conversation                        │
//! │  ChatModel │ SpeechSynthesizer │ SpeechCapturePort  │
//! │  AudioOutputPort │ SessionStore                      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Gemini REST  │  cpal speakers/mic  │  JSON files   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod conversation;
pub mod error;
pub mod providers;
pub mod session;
pub mod voice;

pub use audio::{AudioBuffer, AudioOutputPort, CpalOutput, PlaybackScheduler};
pub use config::Config;
pub use conversation::{
    Conversation, ConversationEvent, ConversationPorts, ListenOutcome, Phase, Rejection, Status,
    SubmitOutcome,
};
pub use error::{Error, Result};
pub use providers::{ChatModel, GeminiClient, SpeechSynthesizer, Transcriber};
pub use session::{ChatTurn, JsonFileStore, MemoryStore, Role, SessionState, SessionStore, Source};
pub use voice::{MicrophoneRecognizer, SpeechCapturePort};
