//! TOML configuration file loading
//!
//! Supports `~/.config/alexa/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AlexaConfigFile {
    /// Gemini API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Gemini API base URL
    #[serde(default)]
    pub api_base: Option<String>,

    /// Directory holding the stored session
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Chat model configuration
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Spoken reply configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Voice input configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// Chat-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// Model identifier (e.g. "gemini-3-flash-preview")
    pub model: Option<String>,

    /// Number of prior turns sent with each request
    pub history_window: Option<usize>,

    /// Let the model ground answers with web search
    pub web_search: Option<bool>,

    /// Replace the built-in assistant persona
    pub system_instruction: Option<String>,
}

/// Spoken reply configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// Speak replies by default
    pub enabled: Option<bool>,

    /// TTS model (e.g. "gemini-2.5-flash-preview-tts")
    pub model: Option<String>,

    /// Prebuilt voice name (e.g. "Kore")
    pub voice: Option<String>,
}

/// Voice input configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable microphone input
    pub enabled: Option<bool>,

    /// Recognition locale
    pub locale: Option<String>,

    /// Maximum utterance length in seconds
    pub listen_secs: Option<u64>,

    /// Model used to transcribe utterances
    pub transcribe_model: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AlexaConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AlexaConfigFile {
    config_file_path().map_or_else(AlexaConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Returns `AlexaConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_from(path: &Path) -> AlexaConfigFile {
    if !path.exists() {
        return AlexaConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AlexaConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AlexaConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/alexa/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("alexa").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "api_key = \"k\"\n\n[chat]\nhistory_window = 4\n\n[speech]\nvoice = \"Puck\"\n",
        )
        .unwrap();

        let fc = load_config_from(&path);
        assert_eq!(fc.api_key.as_deref(), Some("k"));
        assert_eq!(fc.chat.history_window, Some(4));
        assert_eq!(fc.chat.model, None);
        assert_eq!(fc.speech.voice.as_deref(), Some("Puck"));
        assert_eq!(fc.voice.enabled, None);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_from(&dir.path().join("absent.toml"));
        assert!(fc.api_key.is_none());
    }

    #[test]
    fn test_invalid_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "chat = 5 = 6").unwrap();

        let fc = load_config_from(&path);
        assert!(fc.chat.model.is_none());
    }
}
