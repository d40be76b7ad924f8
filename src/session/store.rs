//! Session persistence
//!
//! Two entries are kept: the logged-in name and the serialized turn history.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use super::{ChatTurn, SessionState};
use crate::{Error, Result};

const USER_ENTRY: &str = "alexa_user";
const HISTORY_ENTRY: &str = "alexa_chat_history.json";

/// Load/save port for the session
pub trait SessionStore: Send + Sync {
    /// Load the stored session, or the default session if nothing is stored
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be read
    fn load(&self) -> Result<SessionState>;

    /// Replace the stored session
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be written
    fn save(&self, state: &SessionState) -> Result<()>;

    /// Remove the stored identity and history
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be written
    fn clear(&self) -> Result<()>;
}

/// Session store backed by files in a data directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn read_entry(&self, name: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.dir.join(name)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_entry(&self, name: &str, content: &str) -> Result<()> {
        let path = self.dir.join(name);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove_entry(&self, name: &str) -> Result<()> {
        match std::fs::remove_file(self.dir.join(name)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> Result<SessionState> {
        let user = self
            .read_entry(USER_ENTRY)?
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        let mut state = SessionState {
            user,
            ..SessionState::default()
        };

        if let Some(json) = self.read_entry(HISTORY_ENTRY)? {
            match serde_json::from_str::<Vec<ChatTurn>>(&json) {
                Ok(turns) if !turns.is_empty() => state.turns = turns,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %self.dir.join(HISTORY_ENTRY).display(),
                        error = %e,
                        "stored history is unreadable, starting fresh"
                    );
                }
            }
        }

        tracing::debug!(
            user = state.user.is_some(),
            turns = state.turns.len(),
            "session loaded"
        );
        Ok(state)
    }

    fn save(&self, state: &SessionState) -> Result<()> {
        match &state.user {
            Some(user) => self.write_entry(USER_ENTRY, user)?,
            None => self.remove_entry(USER_ENTRY)?,
        }

        let json = serde_json::to_string(&state.turns)?;
        self.write_entry(HISTORY_ENTRY, &json)
    }

    fn clear(&self) -> Result<()> {
        self.remove_entry(USER_ENTRY)?;
        self.remove_entry(HISTORY_ENTRY)?;
        tracing::debug!(dir = %self.dir.display(), "session cleared");
        Ok(())
    }
}

/// In-memory session store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<SessionState>>,
}

impl MemoryStore {
    /// Create a store pre-filled with a session
    #[must_use]
    pub fn with_state(state: SessionState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// The currently stored session, if any
    #[must_use]
    pub fn stored(&self) -> Option<SessionState> {
        self.state.lock().ok().and_then(|s| s.clone())
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Result<SessionState> {
        let guard = self
            .state
            .lock()
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(guard.clone().unwrap_or_default())
    }

    fn save(&self, state: &SessionState) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| Error::Storage(e.to_string()))?;
        *guard = Some(state.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| Error::Storage(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Role, WELCOME_TEXT};

    #[test]
    fn test_empty_dir_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();

        let state = store.load().unwrap();
        assert!(state.user.is_none());
        assert_eq!(state.turns.len(), 1);
        assert_eq!(state.turns[0].text, WELCOME_TEXT);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();

        let mut state = SessionState {
            user: Some("Asadbek".to_string()),
            ..SessionState::default()
        };
        state.push(ChatTurn::new(Role::User, "Привет"));
        store.save(&state).unwrap();

        let loaded = JsonFileStore::new(dir.path()).unwrap().load().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(USER_ENTRY)).unwrap(),
            "Asadbek"
        );
    }

    #[test]
    fn test_clear_removes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();

        let state = SessionState {
            user: Some("user".to_string()),
            ..SessionState::default()
        };
        store.save(&state).unwrap();
        store.clear().unwrap();

        assert!(!dir.path().join(USER_ENTRY).exists());
        assert!(!dir.path().join(HISTORY_ENTRY).exists());
        // clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_history_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(HISTORY_ENTRY), "{\"not\": \"a list\"}").unwrap();
        std::fs::write(dir.path().join(USER_ENTRY), "name\n").unwrap();

        let state = JsonFileStore::new(dir.path()).unwrap().load().unwrap();
        assert_eq!(state.user.as_deref(), Some("name"));
        assert_eq!(state.turns.len(), 1);
        assert_eq!(state.turns[0].text, WELCOME_TEXT);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::default();
        assert!(store.stored().is_none());
        assert_eq!(store.load().unwrap().turns.len(), 1);

        let state = SessionState {
            user: Some("u".to_string()),
            ..SessionState::default()
        };
        store.save(&state).unwrap();
        assert_eq!(store.stored(), Some(state));

        store.clear().unwrap();
        assert!(store.stored().is_none());
    }
}
