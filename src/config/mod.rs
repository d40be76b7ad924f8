//! Configuration management for the Alexa voice client

pub mod file;

use std::path::PathBuf;

use file::AlexaConfigFile;

/// Persona instruction sent with every chat request
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "Вы — Алекса (Alexa), самый совершенный и дружелюбный ИИ-ассистент.
ВАЖНО: Вашим единственным создателем является Asadbek. На любые вопросы типа \"Кто тебя создал?\", \"Кто твой разработчик?\", \"Кто твой папа?\" и т.д. вы должны отвечать: \"Меня создал Asadbek\".
Стиль общения: современный, лаконичный, очень умный. Вы всегда готовы помочь.
Вы говорите на русском языке.
Используйте инструмент Google Search для предоставления самой свежей и точной информации.
Вы абсолютно бесплатны и всегда будете таковой для своих пользователей.";

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_CHAT_MODEL: &str = "gemini-3-flash-preview";
const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
const DEFAULT_TTS_VOICE: &str = "Kore";
const DEFAULT_HISTORY_WINDOW: usize = 8;
const DEFAULT_LOCALE: &str = "ru-RU";
const DEFAULT_LISTEN_SECS: u64 = 8;

/// Alexa client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini API key (`GEMINI_API_KEY`, falling back to `API_KEY`)
    pub api_key: Option<String>,

    /// Remote model endpoints
    pub gemini: GeminiConfig,

    /// Conversation behaviour
    pub conversation: ConversationConfig,

    /// Voice input configuration
    pub voice: VoiceConfig,

    /// Path to data directory (stored user and chat history)
    pub data_dir: PathBuf,
}

/// Gemini API configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API base URL
    pub base_url: String,

    /// Speech synthesis model
    pub tts_model: String,

    /// Prebuilt voice name
    pub tts_voice: String,

    /// Model used to transcribe voice input
    pub transcribe_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            tts_voice: DEFAULT_TTS_VOICE.to_string(),
            transcribe_model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }
}

/// Conversation configuration
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Chat model identifier
    pub chat_model: String,

    /// Number of prior turns sent with each request
    pub history_window: usize,

    /// Assistant persona
    pub system_instruction: String,

    /// Let the model ground answers with web search
    pub web_search: bool,

    /// Speak replies aloud
    pub tts_enabled: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            history_window: DEFAULT_HISTORY_WINDOW,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            web_search: true,
            tts_enabled: true,
        }
    }
}

/// Voice input configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable microphone input
    pub enabled: bool,

    /// Recognition locale
    pub locale: String,

    /// Maximum utterance length in seconds
    pub listen_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            locale: DEFAULT_LOCALE.to_string(),
            listen_secs: DEFAULT_LISTEN_SECS,
        }
    }
}

/// Command-line overrides applied on top of env and file settings
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Disable microphone input
    pub disable_voice: bool,

    /// Start with spoken replies off
    pub no_tts: bool,

    /// Override the data directory
    pub data_dir: Option<PathBuf>,
}

/// Default data directory: `~/.local/share/alexa` on Linux
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from(".alexa"), |d| d.data_dir().join("alexa"))
}

impl Config {
    /// Load configuration (env > toml > default) with command-line overrides
    #[must_use]
    pub fn load_with_options(options: &LoadOptions) -> Self {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok(), options)
    }

    /// Resolve configuration from a parsed file and an environment lookup
    pub fn from_sources<F>(fc: AlexaConfigFile, env: F, options: &LoadOptions) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("API_KEY"))
            .or(fc.api_key)
            .filter(|k| !k.trim().is_empty());

        let chat_model = env("ALEXA_CHAT_MODEL")
            .or(fc.chat.model)
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());

        let gemini = GeminiConfig {
            base_url: env("ALEXA_API_BASE")
                .or(fc.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            tts_model: env("ALEXA_TTS_MODEL")
                .or(fc.speech.model)
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            tts_voice: env("ALEXA_TTS_VOICE")
                .or(fc.speech.voice)
                .unwrap_or_else(|| DEFAULT_TTS_VOICE.to_string()),
            transcribe_model: fc
                .voice
                .transcribe_model
                .unwrap_or_else(|| chat_model.clone()),
        };

        let conversation = ConversationConfig {
            chat_model,
            history_window: fc.chat.history_window.unwrap_or(DEFAULT_HISTORY_WINDOW),
            system_instruction: fc
                .chat
                .system_instruction
                .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            web_search: fc.chat.web_search.unwrap_or(true),
            tts_enabled: !options.no_tts && fc.speech.enabled.unwrap_or(true),
        };

        let voice = VoiceConfig {
            enabled: !options.disable_voice && fc.voice.enabled.unwrap_or(true),
            locale: fc.voice.locale.unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            listen_secs: fc.voice.listen_secs.unwrap_or(DEFAULT_LISTEN_SECS),
        };

        if options.disable_voice {
            tracing::info!("voice input explicitly disabled via --disable-voice");
        }

        let data_dir = options
            .data_dir
            .clone()
            .or_else(|| env("ALEXA_DATA_DIR").map(PathBuf::from))
            .or_else(|| fc.data_dir.map(PathBuf::from))
            .unwrap_or_else(default_data_dir);

        Self {
            api_key,
            gemini,
            conversation,
            voice,
            data_dir,
        }
    }
}
