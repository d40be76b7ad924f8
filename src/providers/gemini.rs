//! Gemini `generateContent` adapter for chat, speech and transcription

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatModel, ChatReply, ChatRequest, Citation, SpeechSynthesizer, Transcriber};
use crate::config::GeminiConfig;
use crate::{Error, Result};

/// Directive prepended to every text sent for synthesis
const SPEECH_DIRECTIVE: &str = "Скажи максимально естественно:";

/// Client for the Gemini REST API
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    tts_model: String,
    tts_voice: String,
    transcribe_model: String,
}

impl GeminiClient {
    /// Create a new Gemini client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, config: &GeminiConfig) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("Gemini API key required".to_string()));
        }

        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tts_model: config.tts_model.clone(),
            tts_voice: config.tts_voice.clone(),
            transcribe_model: config.transcribe_model.clone(),
        })
    }

    /// POST a `generateContent` call and parse the response
    async fn generate(
        &self,
        model: &str,
        body: &GenerateContentRequest,
    ) -> std::result::Result<GenerateContentResponse, String> {
        let url = format!("{}/models/{model}:generateContent", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        tracing::debug!(model, status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Gemini API error {status}: {body}"));
        }

        response
            .json()
            .await
            .map_err(|e| format!("failed to parse response: {e}"))
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        tracing::debug!(
            model = %request.model,
            history = request.history.len(),
            web_search = request.web_search,
            "sending chat request"
        );

        let body = chat_body(&request);
        let response = self.generate(&request.model, &body).await.map_err(|e| {
            tracing::error!(error = %e, "chat request failed");
            Error::RemoteChat(e)
        })?;

        let reply = chat_reply(response);
        tracing::info!(
            chars = reply.text.chars().count(),
            citations = reply.citations.len(),
            "chat reply received"
        );
        Ok(reply)
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiClient {
    async fn synthesize(&self, text: &str) -> Result<Option<String>> {
        tracing::debug!(model = %self.tts_model, voice = %self.tts_voice, "synthesizing speech");

        let body = speech_body(text, &self.tts_voice);
        let response = self
            .generate(&self.tts_model, &body)
            .await
            .map_err(Error::RemoteSpeech)?;

        Ok(inline_audio(response))
    }
}

#[async_trait]
impl Transcriber for GeminiClient {
    async fn transcribe(&self, wav: &[u8], locale: &str) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), locale, "starting transcription");

        let body = transcription_body(wav, locale);
        let response = self
            .generate(&self.transcribe_model, &body)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                Error::Recognition(e)
            })?;

        let transcript = response_text(&response).trim().to_string();
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

/// Build the request body for a chat turn
fn chat_body(request: &ChatRequest) -> GenerateContentRequest {
    let mut contents: Vec<Content> = request
        .history
        .iter()
        .map(|m| Content::text(Some(m.role.as_str()), &m.content))
        .collect();
    contents.push(Content::text(Some("user"), &request.message));

    GenerateContentRequest {
        contents,
        system_instruction: Some(Content::text(None, &request.system_instruction)),
        tools: if request.web_search {
            vec![Tool {
                google_search: GoogleSearch {},
            }]
        } else {
            Vec::new()
        },
        generation_config: None,
    }
}

/// Build the request body for speech synthesis
fn speech_body(text: &str, voice: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content::text(None, &format!("{SPEECH_DIRECTIVE} {text}"))],
        system_instruction: None,
        tools: Vec::new(),
        generation_config: Some(GenerationConfig {
            response_modalities: vec!["AUDIO".to_string()],
            speech_config: SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: voice.to_string(),
                    },
                },
            },
        }),
    }
}

/// Build the request body for transcribing a WAV utterance
fn transcription_body(wav: &[u8], locale: &str) -> GenerateContentRequest {
    let prompt = format!(
        "Transcribe this speech verbatim. Spoken language: {locale}. \
         Reply with the transcript only."
    );

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part {
                    text: Some(prompt),
                    inline_data: None,
                },
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: "audio/wav".to_string(),
                        data: base64::engine::general_purpose::STANDARD.encode(wav),
                    }),
                },
            ],
        }],
        system_instruction: None,
        tools: Vec::new(),
        generation_config: None,
    }
}

/// Concatenated text parts of the first candidate
fn response_text(response: &GenerateContentResponse) -> String {
    response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Extract reply text and grounding citations
fn chat_reply(response: GenerateContentResponse) -> ChatReply {
    let text = response_text(&response);

    let citations = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.grounding_metadata)
        .map(|g| {
            g.grounding_chunks
                .into_iter()
                .map(|chunk| {
                    let web = chunk.web.unwrap_or_default();
                    Citation {
                        title: web.title,
                        uri: web.uri,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    ChatReply { text, citations }
}

/// Base64 audio of the first part of the first candidate, if any
fn inline_audio(response: GenerateContentResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .inline_data
        .map(|d| d.data)
        .filter(|d| !d.is_empty())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
                inline_data: None,
            }],
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
    speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Default, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Default, Deserialize)]
struct WebSource {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}
