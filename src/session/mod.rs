//! Conversation turns and the locally stored session

mod store;

pub use store::{JsonFileStore, MemoryStore, SessionStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Greeting shown when there is no stored history
pub const WELCOME_TEXT: &str =
    "Привет! Я Алекса. Как ваши дела? Я готова ответить на любой ваш вопрос.";

/// Farewell shown after logout
pub const FAREWELL_TEXT: &str = "До встречи! Возвращайтесь поскорее.";

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A web source cited by a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
}

impl ChatTurn {
    /// Create a turn stamped with the current time
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            sources: Vec::new(),
        }
    }

    /// Attach cited sources
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }
}

/// Everything persisted between runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Name entered at login
    pub user: Option<String>,
    /// Turns, oldest first
    pub turns: Vec<ChatTurn>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user: None,
            turns: vec![ChatTurn::new(Role::Assistant, WELCOME_TEXT)],
        }
    }
}

impl SessionState {
    /// Append a turn, keeping timestamps non-decreasing
    pub fn push(&mut self, mut turn: ChatTurn) -> &ChatTurn {
        if let Some(last) = self.turns.last()
            && turn.timestamp < last.timestamp
        {
            turn.timestamp = last.timestamp;
        }
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    /// The last `n` turns, oldest first
    #[must_use]
    pub fn recent(&self, n: usize) -> &[ChatTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_default_has_welcome() {
        let state = SessionState::default();
        assert!(state.user.is_none());
        assert_eq!(state.turns.len(), 1);
        assert_eq!(state.turns[0].role, Role::Assistant);
        assert_eq!(state.turns[0].text, WELCOME_TEXT);
    }

    #[test]
    fn test_push_keeps_timestamps_monotonic() {
        let mut state = SessionState::default();
        let first = state.turns[0].timestamp;

        let mut stale = ChatTurn::new(Role::User, "hi");
        stale.timestamp = first - Duration::seconds(30);
        let pushed = state.push(stale);

        assert_eq!(pushed.timestamp, first);
    }

    #[test]
    fn test_recent_window() {
        let mut state = SessionState {
            user: None,
            turns: Vec::new(),
        };
        for i in 0..20 {
            state.push(ChatTurn::new(Role::User, i.to_string()));
        }

        let window = state.recent(8);
        assert_eq!(window.len(), 8);
        assert_eq!(window[0].text, "12");
        assert_eq!(window[7].text, "19");
        assert_eq!(state.recent(50).len(), 20);
    }

    #[test]
    fn test_turn_json_shape() {
        let turn = ChatTurn::new(Role::Assistant, "ok").with_sources(vec![Source {
            title: "t".to_string(),
            uri: "https://example.com".to_string(),
        }]);
        let value = serde_json::to_value(&turn).unwrap();

        assert_eq!(value["role"], "assistant");
        assert_eq!(value["sources"][0]["uri"], "https://example.com");

        let plain = serde_json::to_value(ChatTurn::new(Role::User, "q")).unwrap();
        assert!(plain.get("sources").is_none());
    }
}
