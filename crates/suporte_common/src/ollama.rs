//! Ollama client - local text generation over HTTP.
//!
//! The assistant delegates free-text understanding to a local Ollama
//! server. Every call is single-shot: the full system prompt is prepended
//! to the user text, so the server holds no conversational state between
//! turns. Callers that need testability go through the [`TextGen`] trait
//! and use [`FakeTextGen`] in tests.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::tools::Tool;

/// Default local Ollama endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:11434";

// System prompt for the conversational mode. The model is free-form here
// but is nudged to mention tool tokens, which we turn into suggestions.
const CHAT_PROMPT: &str = "\
Você é o assistente de TI do balcão de suporte, amigável e prestativo.

FERRAMENTAS DISPONÍVEIS:
1. RECONECTAR_PASTAS - Problemas com pastas de rede, unidades mapeadas, acesso a servidor
2. LIMPAR_CACHE - Computador lento, travamentos, erros de memória
3. REPARAR_OFFICE - Problemas com Word, Excel, PowerPoint, Outlook
4. MANUTENCAO_PLANILHA - Excel bloqueado, planilha em uso, arquivo corrompido

REGRAS:
- Seja simpático e use linguagem informal
- Se identificar um problema que pode ser resolvido com uma ferramenta, mencione-a naturalmente
- Responda de forma concisa (máximo 2-3 frases)
- Se não souber algo, seja honesto

Usuário:";

/// Ollama configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Generation timeout. Generous because small local models can be slow.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Liveness probe timeout, kept short so status checks stay snappy.
    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_liveness_timeout_secs() -> u64 {
    5
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            liveness_timeout_secs: default_liveness_timeout_secs(),
        }
    }
}

/// Ollama errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OllamaError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    #[error("invalid response payload: {0}")]
    InvalidResponse(String),

    #[error("model returned an empty response")]
    EmptyResponse,
}

/// Sampling options for one generation call.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GenOptions {
    pub temperature: f32,
    pub num_predict: u32,
}

impl GenOptions {
    /// Near-deterministic, short: classification into a closed vocabulary.
    pub const CLASSIFY: GenOptions = GenOptions {
        temperature: 0.1,
        num_predict: 50,
    };

    /// Looser sampling for conversational replies.
    pub const CHAT: GenOptions = GenOptions {
        temperature: 0.7,
        num_predict: 200,
    };
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Single-shot text generation seam.
///
/// The production implementation is [`OllamaClient`]; tests use
/// [`FakeTextGen`] and assert on its call counter.
#[async_trait]
pub trait TextGen: Send + Sync {
    /// Generate text for `system_prompt` + `user_text`.
    async fn generate(
        &self,
        system_prompt: &str,
        user_text: &str,
        options: GenOptions,
    ) -> Result<String, OllamaError>;
}

/// One conversational exchange with the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Reply text with wire tokens rewritten to human-readable labels
    pub reply: String,
    /// Tool the model mentioned, if any. Surfaced as a suggestion, never
    /// auto-executed.
    pub suggested_tool: Option<Tool>,
    /// Label for the suggested tool
    pub suggested_label: Option<String>,
}

/// HTTP client for a local Ollama server.
pub struct OllamaClient {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    /// Check whether the Ollama server is up. Any failure is "not running".
    pub async fn is_running(&self) -> bool {
        let url = format!("{}/api/tags", self.config.endpoint);
        let probe = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.liveness_timeout_secs))
            .build();
        match probe {
            Ok(client) => client
                .get(&url)
                .send()
                .await
                .map(|r| r.status().is_success())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// One conversational turn. The reply is scanned for tool mentions and
    /// wire tokens are rewritten to labels before display.
    pub async fn chat(&self, message: &str) -> Result<ChatTurn, OllamaError> {
        let raw = self.generate(CHAT_PROMPT, message, GenOptions::CHAT).await?;
        Ok(interpret_chat_reply(&raw))
    }
}

#[async_trait]
impl TextGen for OllamaClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_text: &str,
        options: GenOptions,
    ) -> Result<String, OllamaError> {
        let url = format!("{}/api/generate", self.config.endpoint);
        let prompt = format!("{system_prompt}\n{user_text}");
        let body = GenerateRequest {
            model: &self.config.model,
            prompt: &prompt,
            stream: false,
            options,
        };

        debug!("Sending generate request to {} ({})", url, self.config.model);

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                OllamaError::Timeout(self.config.timeout_secs)
            } else {
                OllamaError::Http(format!("request failed: {e}"))
            }
        })?;

        if !response.status().is_success() {
            return Err(OllamaError::Http(format!(
                "HTTP {} from Ollama",
                response.status()
            )));
        }

        let decoded: GenerateResponse = response
            .json()
            .await
            .map_err(|e| OllamaError::InvalidResponse(e.to_string()))?;

        let text = decoded.response.trim().to_string();
        if text.is_empty() {
            return Err(OllamaError::EmptyResponse);
        }
        Ok(text)
    }
}

static TOKEN_REWRITES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    Tool::PRIORITY
        .iter()
        .map(|tool| {
            let pattern = format!("(?i){}", tool.token());
            (Regex::new(&pattern).expect("static token pattern"), tool.label())
        })
        .collect()
});

/// Turn raw model output into a [`ChatTurn`]: detect the first tool mention
/// (fixed priority order) and rewrite every token occurrence to its label.
pub fn interpret_chat_reply(raw: &str) -> ChatTurn {
    let tool = Tool::find_in_text(raw);

    let mut reply = raw.to_string();
    for (pattern, label) in TOKEN_REWRITES.iter() {
        reply = pattern.replace_all(&reply, *label).into_owned();
    }

    let suggested_tool = (tool != Tool::None).then_some(tool);
    let suggested_label = suggested_tool.map(|t| t.label().to_string());

    ChatTurn {
        reply: reply.trim().to_string(),
        suggested_tool,
        suggested_label,
    }
}

/// Scripted generation client for tests: canned replies plus a call counter.
pub struct FakeTextGen {
    replies: Mutex<Vec<Result<String, OllamaError>>>,
    calls: AtomicUsize,
}

impl FakeTextGen {
    /// Pre-load a sequence of replies. The last one repeats once drained.
    pub fn new(replies: Vec<Result<String, OllamaError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always reply with the same text.
    pub fn reply(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(text.into())])
    }

    /// Always fail with the same error.
    pub fn failing(error: OllamaError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Number of generate calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGen for FakeTextGen {
    async fn generate(
        &self,
        _system_prompt: &str,
        _user_text: &str,
        _options: GenOptions,
    ) -> Result<String, OllamaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(OllamaError::EmptyResponse);
        }
        if replies.len() == 1 {
            replies[0].clone()
        } else {
            replies.remove(0)
        }
    }
}
