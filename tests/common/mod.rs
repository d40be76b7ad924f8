//! Shared test utilities: in-process fakes for every conversation port

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alexa_voice::config::ConversationConfig;
use alexa_voice::providers::{ChatReply, ChatRequest};
use alexa_voice::{
    AudioBuffer, AudioOutputPort, ChatModel, Conversation, ConversationEvent, ConversationPorts,
    Error, MemoryStore, Result, SessionStore, SpeechCapturePort, SpeechSynthesizer,
};
use async_trait::async_trait;
use tokio::sync::Semaphore;

/// Chat model returning scripted replies, optionally held until released
#[derive(Default)]
pub struct FakeChat {
    replies: Mutex<VecDeque<Result<ChatReply>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
    gate: Option<Semaphore>,
}

impl FakeChat {
    /// Reply with each entry in turn, then with "Ответ"
    pub fn scripted(replies: Vec<Result<ChatReply>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    /// Hold every reply until [`FakeChat::release`] is called
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Hold scripted replies until released
    pub fn with_gate(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> ChatRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        self.requests.lock().unwrap().push(request);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(ChatReply {
                text: "Ответ".to_string(),
                citations: Vec::new(),
            })
        })
    }
}

/// Speech synthesizer returning a fixed payload
pub struct FakeSpeech {
    audio: std::result::Result<Option<String>, String>,
    pub texts: Mutex<Vec<String>>,
}

impl FakeSpeech {
    /// Return this base64 payload for every request
    pub fn with_audio(payload: &str) -> Self {
        Self {
            audio: Ok(Some(payload.to_string())),
            texts: Mutex::new(Vec::new()),
        }
    }

    /// Answer without audio
    pub fn silent() -> Self {
        Self {
            audio: Ok(None),
            texts: Mutex::new(Vec::new()),
        }
    }

    /// Fail every request
    pub fn failing() -> Self {
        Self {
            audio: Err("synthesis unavailable".to_string()),
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.texts.lock().unwrap().len()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, text: &str) -> Result<Option<String>> {
        self.texts.lock().unwrap().push(text.to_string());
        self.audio.clone().map_err(Error::RemoteSpeech)
    }
}

/// Audio output that records buffers instead of playing them
#[derive(Default)]
pub struct FakeOutput {
    pub played: Mutex<Vec<AudioBuffer>>,
    unavailable: bool,
}

impl FakeOutput {
    /// An output whose context can never be opened
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn play_count(&self) -> usize {
        self.played.lock().unwrap().len()
    }
}

#[async_trait]
impl AudioOutputPort for FakeOutput {
    async fn play(&self, buffer: AudioBuffer) -> Result<()> {
        if self.unavailable {
            return Err(Error::PlaybackUnavailable("no output device".to_string()));
        }
        self.played.lock().unwrap().push(buffer);
        Ok(())
    }
}

/// Speech capture yielding scripted transcripts, optionally held until released
#[derive(Default)]
pub struct FakeCapture {
    transcripts: Mutex<VecDeque<Result<String>>>,
    gate: Option<Semaphore>,
    pub stops: AtomicUsize,
}

impl FakeCapture {
    pub fn hearing(transcripts: Vec<Result<String>>) -> Self {
        Self {
            transcripts: Mutex::new(transcripts.into()),
            ..Self::default()
        }
    }

    /// Hold the session until [`FakeCapture::release`] is called
    pub fn gated(transcripts: Vec<Result<String>>) -> Self {
        Self {
            transcripts: Mutex::new(transcripts.into()),
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechCapturePort for FakeCapture {
    async fn capture_utterance(&self) -> Result<String> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        self.transcripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Recognition("no-speech".to_string())))
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// A conversation wired to fakes
pub struct Harness {
    pub conversation: Arc<Conversation>,
    pub chat: Arc<FakeChat>,
    pub speech: Arc<FakeSpeech>,
    pub output: Arc<FakeOutput>,
    pub capture: Option<Arc<FakeCapture>>,
    pub store: Arc<MemoryStore>,
}

/// Base64 of four mono samples: 0, 1, -1, 32767
pub const SPEECH_PAYLOAD: &str = "AAABAP///38=";

pub struct HarnessBuilder {
    chat: FakeChat,
    speech: FakeSpeech,
    output: FakeOutput,
    capture: Option<FakeCapture>,
    store: MemoryStore,
    config: ConversationConfig,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            chat: FakeChat::default(),
            speech: FakeSpeech::with_audio(SPEECH_PAYLOAD),
            output: FakeOutput::default(),
            capture: None,
            store: MemoryStore::default(),
            config: ConversationConfig::default(),
        }
    }
}

impl HarnessBuilder {
    pub fn chat(mut self, chat: FakeChat) -> Self {
        self.chat = chat;
        self
    }

    pub fn speech(mut self, speech: FakeSpeech) -> Self {
        self.speech = speech;
        self
    }

    pub fn output(mut self, output: FakeOutput) -> Self {
        self.output = output;
        self
    }

    pub fn capture(mut self, capture: FakeCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn store(mut self, store: MemoryStore) -> Self {
        self.store = store;
        self
    }

    pub fn tts(mut self, enabled: bool) -> Self {
        self.config.tts_enabled = enabled;
        self
    }

    pub fn build(self) -> Harness {
        let chat = Arc::new(self.chat);
        let speech = Arc::new(self.speech);
        let output = Arc::new(self.output);
        let capture = self.capture.map(Arc::new);
        let store = Arc::new(self.store);

        let conversation = Conversation::new(
            self.config,
            ConversationPorts {
                chat: chat.clone(),
                speech: speech.clone(),
                output: output.clone(),
                capture: capture
                    .clone()
                    .map(|c| c as Arc<dyn SpeechCapturePort>),
                store: store.clone() as Arc<dyn SessionStore>,
            },
        )
        .expect("failed to build conversation");

        Harness {
            conversation: Arc::new(conversation),
            chat,
            speech,
            output,
            capture,
            store,
        }
    }
}

/// Collect every event published so far
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<ConversationEvent>) -> Vec<ConversationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Only the speaking transitions
pub fn speaking(events: &[ConversationEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            ConversationEvent::Speaking(s) => Some(*s),
            _ => None,
        })
        .collect()
}

/// Only the loading transitions
pub fn loading(events: &[ConversationEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            ConversationEvent::Loading(l) => Some(*l),
            _ => None,
        })
        .collect()
}

/// Only the listening transitions
pub fn listening(events: &[ConversationEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            ConversationEvent::Listening(l) => Some(*l),
            _ => None,
        })
        .collect()
}

/// Wait until `check` holds, yielding to spawned tasks
pub async fn wait_for(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}
