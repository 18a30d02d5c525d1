use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelConfig;
use crate::services::scoring::{InferenceBackend, InferenceError};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
    /// Plain completion servers answer with `text` instead of `message`.
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client (llama.cpp server, vLLM, Ollama, ...).
///
/// Sends a single user message with greedy decoding, no history.
pub struct HttpBackend {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    timeout: Option<Duration>,
}

impl HttpBackend {
    pub fn from_config(config: &ModelConfig) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| InferenceError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: chat_completions_url(&config.endpoint),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
        })
    }
}

/// Append `/chat/completions` to a base endpoint unless it is already there.
pub fn chat_completions_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

fn extract_text(body: &str) -> Result<String, InferenceError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| InferenceError::Request(format!("failed to parse completion JSON: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.and_then(|m| m.content).or(c.text))
        .filter(|t| !t.trim().is_empty())
        .ok_or(InferenceError::EmptyResponse)
}

impl InferenceBackend for HttpBackend {
    fn complete(&mut self, prompt: &str) -> Result<String, InferenceError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            max_tokens: self.max_tokens,
            temperature: 0.0,
            stream: false,
        };
        debug!(url = %self.url, model = %self.model, "sending completion request");

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(self.timeout.unwrap_or_default())
            } else {
                InferenceError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response.text().map_err(|e| InferenceError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(InferenceError::Status { status: status.as_u16(), body });
        }
        extract_text(&body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
