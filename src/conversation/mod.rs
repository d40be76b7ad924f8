//! Conversation orchestration
//!
//! Drives one turn end to end: append the user's turn, ask the chat model,
//! append the reply, then optionally synthesize and play it.
//!
//! ```text
//! Idle ──submit──▶ AwaitingReply ──reply/error──▶ (AwaitingSpeech) ──▶ Idle
//! ```
//!
//! Listening is orthogonal: a captured transcript is submitted exactly as if
//! it had been typed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, broadcast};

use crate::audio::{AudioOutputPort, PlaybackScheduler};
use crate::config::ConversationConfig;
use crate::providers::{
    ChatModel, ChatRequest, Citation, HistoryMessage, HistoryRole, SpeechSynthesizer,
};
use crate::session::{ChatTurn, FAREWELL_TEXT, Role, SessionState, SessionStore, Source};
use crate::voice::SpeechCapturePort;
use crate::{Error, Result};

/// Reply used when the model answers with no text
pub const EMPTY_REPLY_TEXT: &str = "Простите, я задумалась. Спросите еще раз?";

/// Reply used when the chat service fails
pub const SERVER_ERROR_TEXT: &str =
    "Что-то пошло не так с сервером. Попробуйте обновить страницу.";

/// Title used for a citation that arrives without one
pub const UNTITLED_SOURCE: &str = "Источник";

const EVENT_CAPACITY: usize = 64;

/// Where the current turn is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingReply,
    AwaitingSpeech,
}

/// Snapshot of the conversation's indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub phase: Phase,
    pub loading: bool,
    pub speaking: bool,
    pub listening: bool,
}

/// State transitions published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// A chat request started (true) or the whole turn finished (false)
    Loading(bool),
    /// Speech synthesis and playback started or finished
    Speaking(bool),
    /// Voice capture started or finished
    Listening(bool),
    /// A turn was appended to the conversation
    TurnAppended(ChatTurn),
    /// Logout replaced the conversation
    SessionReset,
}

/// Why a submission was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Text was empty or whitespace
    Empty,
    /// Another turn is still in flight
    Busy,
}

/// Result of a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The assistant replied with this turn
    Replied(ChatTurn),
    /// The chat service failed; this error turn was appended
    Failed(ChatTurn),
    /// Nothing was appended
    Rejected(Rejection),
    /// Logout reset the session before the turn finished; the reply was dropped
    Discarded,
}

/// Result of a listening session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenOutcome {
    /// A transcript was heard and submitted
    Submitted(SubmitOutcome),
    /// Capture ended without a transcript
    NothingHeard,
    /// A session was already active
    AlreadyListening,
    /// A reply is in flight
    Busy,
    /// No capture device was configured
    Unavailable,
}

/// External collaborators of a conversation
pub struct ConversationPorts {
    pub chat: Arc<dyn ChatModel>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub output: Arc<dyn AudioOutputPort>,
    pub capture: Option<Arc<dyn SpeechCapturePort>>,
    pub store: Arc<dyn SessionStore>,
}

/// Marks a turn in flight; clears the flag and reports loading=false on drop
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
    events: &'a broadcast::Sender<ConversationEvent>,
}

impl<'a> FlightGuard<'a> {
    fn acquire(
        flag: &'a AtomicBool,
        events: &'a broadcast::Sender<ConversationEvent>,
    ) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        let _ = events.send(ConversationEvent::Loading(true));
        Some(Self { flag, events })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        let _ = self.events.send(ConversationEvent::Loading(false));
    }
}

/// A single user's conversation with the assistant
pub struct Conversation {
    config: ConversationConfig,
    chat: Arc<dyn ChatModel>,
    speech: Arc<dyn SpeechSynthesizer>,
    playback: PlaybackScheduler,
    capture: Option<Arc<dyn SpeechCapturePort>>,
    store: Arc<dyn SessionStore>,
    session: Mutex<SessionState>,
    /// Bumped by logout; turns started under an older epoch never write back
    epoch: AtomicU64,
    /// Serializes store writes, which run off the async threads
    persist: AsyncMutex<()>,
    in_flight: AtomicBool,
    speaking: AtomicBool,
    listening: AtomicBool,
    tts_enabled: AtomicBool,
    events: broadcast::Sender<ConversationEvent>,
}

impl Conversation {
    /// Create a conversation, restoring the stored session
    ///
    /// # Errors
    ///
    /// Returns error if the stored session cannot be read
    pub fn new(config: ConversationConfig, ports: ConversationPorts) -> Result<Self> {
        let session = ports.store.load()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        tracing::debug!(
            turns = session.turns.len(),
            history_window = config.history_window,
            tts = config.tts_enabled,
            "conversation ready"
        );

        Ok(Self {
            tts_enabled: AtomicBool::new(config.tts_enabled),
            config,
            chat: ports.chat,
            speech: ports.speech,
            playback: PlaybackScheduler::new(ports.output),
            capture: ports.capture,
            store: ports.store,
            session: Mutex::new(session),
            epoch: AtomicU64::new(0),
            persist: AsyncMutex::new(()),
            in_flight: AtomicBool::new(false),
            speaking: AtomicBool::new(false),
            listening: AtomicBool::new(false),
            events,
        })
    }

    /// Subscribe to state transitions
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    /// Current indicators
    #[must_use]
    pub fn status(&self) -> Status {
        let loading = self.in_flight.load(Ordering::SeqCst);
        let speaking = self.speaking.load(Ordering::SeqCst);
        let phase = if speaking {
            Phase::AwaitingSpeech
        } else if loading {
            Phase::AwaitingReply
        } else {
            Phase::Idle
        };

        Status {
            phase,
            loading,
            speaking,
            listening: self.listening.load(Ordering::SeqCst),
        }
    }

    /// The logged-in name, if any
    #[must_use]
    pub fn user(&self) -> Option<String> {
        self.lock_session().ok().and_then(|s| s.user.clone())
    }

    /// All turns, oldest first
    #[must_use]
    pub fn turns(&self) -> Vec<ChatTurn> {
        self.lock_session()
            .map(|s| s.turns.clone())
            .unwrap_or_default()
    }

    /// Whether replies are spoken
    #[must_use]
    pub fn tts_enabled(&self) -> bool {
        self.tts_enabled.load(Ordering::SeqCst)
    }

    /// Turn spoken replies on or off
    pub fn set_tts_enabled(&self, enabled: bool) {
        self.tts_enabled.store(enabled, Ordering::SeqCst);
        tracing::debug!(enabled, "speech output toggled");
    }

    /// Whether a capture device is configured
    #[must_use]
    pub fn can_listen(&self) -> bool {
        self.capture.is_some()
    }

    /// Store a display name; whitespace-only names are ignored
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be saved
    pub async fn login(&self, name: &str) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(false);
        }

        let _persist = self.persist.lock().await;
        let snapshot = {
            let mut session = self.lock_session()?;
            session.user = Some(name.to_string());
            session.clone()
        };
        self.with_store(move |store| store.save(&snapshot)).await?;

        tracing::info!(user = name, "logged in");
        Ok(true)
    }

    /// Forget the user and history, leaving only a farewell turn
    ///
    /// A turn still in flight is abandoned: its reply is neither shown nor
    /// saved.
    ///
    /// # Errors
    ///
    /// Returns error if the stored session cannot be cleared
    pub async fn logout(&self) -> Result<()> {
        let _persist = self.persist.lock().await;
        {
            let mut session = self.lock_session()?;
            *session = SessionState {
                user: None,
                turns: vec![ChatTurn::new(Role::Assistant, FAREWELL_TEXT)],
            };
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        let _ = self.events.send(ConversationEvent::SessionReset);

        self.with_store(|store| store.clear()).await?;
        tracing::info!("logged out");
        Ok(())
    }

    /// Submit user text and run the turn to completion
    ///
    /// # Errors
    ///
    /// Returns error only if the in-memory session is unusable; remote
    /// failures are reported through [`SubmitOutcome::Failed`]
    pub async fn submit(&self, text: &str) -> Result<SubmitOutcome> {
        if text.trim().is_empty() {
            return Ok(SubmitOutcome::Rejected(Rejection::Empty));
        }

        let Some(_flight) = FlightGuard::acquire(&self.in_flight, &self.events) else {
            tracing::debug!("submission ignored, turn in flight");
            return Ok(SubmitOutcome::Rejected(Rejection::Busy));
        };

        let (epoch, history) = {
            let session = self.lock_session()?;
            let history = history_messages(session.recent(self.config.history_window));
            (self.epoch.load(Ordering::SeqCst), history)
        };
        if self.append(epoch, ChatTurn::new(Role::User, text)).await?.is_none() {
            return Ok(SubmitOutcome::Discarded);
        }

        let request = ChatRequest {
            model: self.config.chat_model.clone(),
            history,
            message: text.to_string(),
            system_instruction: self.config.system_instruction.clone(),
            web_search: self.config.web_search,
        };

        let reply = match self.chat.chat(request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "chat turn failed");
                let error_turn = ChatTurn::new(Role::Assistant, SERVER_ERROR_TEXT);
                return Ok(self
                    .append(epoch, error_turn)
                    .await?
                    .map_or(SubmitOutcome::Discarded, SubmitOutcome::Failed));
            }
        };

        // whitespace-only text counts as no answer
        let text = if reply.text.trim().is_empty() {
            EMPTY_REPLY_TEXT.to_string()
        } else {
            reply.text
        };
        let turn = ChatTurn::new(Role::Assistant, text).with_sources(sources(reply.citations));
        let Some(turn) = self.append(epoch, turn).await? else {
            tracing::debug!("session reset while awaiting reply, dropping it");
            return Ok(SubmitOutcome::Discarded);
        };

        if self.tts_enabled() {
            self.speak(&turn.text).await;
        }

        Ok(SubmitOutcome::Replied(turn))
    }

    /// Listen for one utterance and submit its transcript
    ///
    /// Starting while a reply is in flight or while already listening is a
    /// no-op. Recognition failures end the session silently.
    ///
    /// # Errors
    ///
    /// Returns error only if the submission itself errors
    pub async fn listen(&self) -> Result<ListenOutcome> {
        let Some(capture) = self.capture.as_ref() else {
            return Ok(ListenOutcome::Unavailable);
        };

        if self.in_flight.load(Ordering::SeqCst) {
            return Ok(ListenOutcome::Busy);
        }

        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(ListenOutcome::AlreadyListening);
        }
        let _ = self.events.send(ConversationEvent::Listening(true));

        let heard = capture.capture_utterance().await;

        self.listening.store(false, Ordering::SeqCst);
        let _ = self.events.send(ConversationEvent::Listening(false));

        match heard {
            Ok(transcript) => {
                tracing::info!(transcript = %transcript, "voice input heard");
                Ok(ListenOutcome::Submitted(self.submit(&transcript).await?))
            }
            Err(e) => {
                tracing::debug!(error = %e, "listening ended without transcript");
                Ok(ListenOutcome::NothingHeard)
            }
        }
    }

    /// Ask the active listening session to end
    pub fn stop_listening(&self) {
        if let Some(capture) = &self.capture
            && self.listening.load(Ordering::SeqCst)
        {
            capture.stop();
        }
    }

    /// Synthesize and play a reply; any failure just skips playback
    async fn speak(&self, text: &str) {
        self.speaking.store(true, Ordering::SeqCst);
        let _ = self.events.send(ConversationEvent::Speaking(true));

        match self.synthesize_and_play(text).await {
            Ok(true) => tracing::debug!("reply spoken"),
            Ok(false) => tracing::debug!("synthesis returned no audio"),
            Err(e) => tracing::warn!(error = %e, "speech skipped"),
        }

        self.speaking.store(false, Ordering::SeqCst);
        let _ = self.events.send(ConversationEvent::Speaking(false));
    }

    async fn synthesize_and_play(&self, text: &str) -> Result<bool> {
        let Some(audio) = self.speech.synthesize(text).await? else {
            return Ok(false);
        };
        self.playback.play_base64(&audio).await?;
        Ok(true)
    }

    /// Push a turn, publish it, and persist the session
    ///
    /// Returns `None` without touching the session if logout happened since
    /// `epoch` was read.
    async fn append(&self, epoch: u64, turn: ChatTurn) -> Result<Option<ChatTurn>> {
        let turn = {
            let mut session = self.lock_session()?;
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return Ok(None);
            }
            session.push(turn).clone()
        };
        let _ = self.events.send(ConversationEvent::TurnAppended(turn.clone()));

        if let Err(e) = self.save(epoch).await {
            tracing::error!(error = %e, "failed to save session");
        }
        Ok(Some(turn))
    }

    /// Write the current session unless logout happened since `epoch`
    async fn save(&self, epoch: u64) -> Result<()> {
        let _persist = self.persist.lock().await;
        let snapshot = {
            let session = self.lock_session()?;
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return Ok(());
            }
            session.clone()
        };
        self.with_store(move |store| store.save(&snapshot)).await
    }

    /// Run a store operation on the blocking pool
    async fn with_store<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&dyn SessionStore) -> Result<()> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| Error::Storage(format!("storage task failed: {e}")))?
    }

    fn lock_session(&self) -> Result<MutexGuard<'_, SessionState>> {
        self.session
            .lock()
            .map_err(|e| Error::Storage(format!("session lock poisoned: {e}")))
    }
}

/// Turns shaped as chat history
#[must_use]
pub fn history_messages(turns: &[ChatTurn]) -> Vec<HistoryMessage> {
    turns
        .iter()
        .map(|t| HistoryMessage {
            role: match t.role {
                Role::User => HistoryRole::User,
                Role::Assistant => HistoryRole::Model,
            },
            content: t.text.clone(),
        })
        .collect()
}

/// Keep citations that carry a link, naming untitled ones
fn sources(citations: Vec<Citation>) -> Vec<Source> {
    citations
        .into_iter()
        .filter_map(|c| {
            let uri = c.uri.filter(|u| !u.is_empty())?;
            let title = c
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNTITLED_SOURCE.to_string());
            Some(Source { title, uri })
        })
        .collect()
}
