//! Grounded reasoning over the Anthropic messages API
//!
//! Non-streaming: one POST per attempt, retried on transient failures.
//! The model is asked for a JSON object `{"voice": ..., "screen": ...}`;
//! replies that are not valid JSON still produce an answer, using the
//! first line as the voice track and the whole reply as the screen.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};

use super::retry::{parse_retry_after, with_retry, RetryConfig};
use crate::collaborators::{GroundedAnswer, GroundedReasoner, GroundingRequest};
use crate::config::ReasoningConfig;
use crate::constants::{ai, timeouts};
use crate::error::ReasoningError;
use crate::graph::Role;

const SYSTEM_PROMPT: &str = r#"You are Parley, a code assistant that answers out loud and on screen at the same time.

Answer only from the provided file content and pull request context. If they do not contain the answer, say so.

Reply with a single JSON object and nothing else:
{"voice": "<one or two short spoken sentences, no markdown, no code>", "screen": "<markdown answer with headings and code blocks>"}"#;

/// Anthropic-backed [`GroundedReasoner`]
pub struct AnthropicReasoner {
    http: Client,
    api_key: String,
    model: String,
    max_tokens: usize,
    url: String,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl AnthropicReasoner {
    fn create_http_client(request_timeout: Duration) -> Client {
        Client::builder()
            .user_agent(concat!("Parley/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeouts::HTTP_CONNECT)
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build HTTP client: {}. Using default client.", e);
                Client::new()
            })
    }

    /// `request_timeout` bounds each HTTP attempt
    pub fn new(
        config: &ReasoningConfig,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http: Self::create_http_client(request_timeout),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            url: config.base_url.clone(),
            retry: RetryConfig::with_max_retries(config.max_retries),
            request_timeout,
        }
    }

    /// Build from config, reading the key from `config.api_key_env`
    pub fn from_config(
        config: &ReasoningConfig,
        request_timeout: Duration,
    ) -> Result<Self, ReasoningError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ReasoningError::MissingApiKey(config.api_key_env.clone()))?;
        info!(model = %config.model, "Grounded reasoning enabled");
        Ok(Self::new(config, api_key, request_timeout))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn request_body(&self, request: &GroundingRequest) -> Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": SYSTEM_PROMPT,
            "messages": [{
                "role": "user",
                "content": build_prompt(request),
            }],
        })
    }

    async fn call_once(&self, body: &Value) -> Result<String, ReasoningError> {
        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ai::API_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let json: Value = response.json().await?;
        Ok(extract_text(&json))
    }
}

#[async_trait]
impl GroundedReasoner for AnthropicReasoner {
    async fn generate_grounded_response(
        &self,
        request: GroundingRequest,
    ) -> Result<Option<GroundedAnswer>, ReasoningError> {
        let body = self.request_body(&request);
        debug!(
            model = %self.model,
            file = %request.grounding.file_path,
            history = request.history.len(),
            "Requesting grounded answer"
        );

        let text = with_retry(&self.retry, || self.call_once(&body)).await?;
        Ok(parse_answer(&text))
    }
}

/// Turn a non-success response into a `Status` error
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ReasoningError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();
    let message = api_error_message(&body).unwrap_or(body);
    error!("API error response: {} - {}", status, message);

    Err(ReasoningError::Status {
        status: status.as_u16(),
        message,
        retry_after,
    })
}

/// `{"type":"error","error":{"message":...}}` -> message
fn api_error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    json.pointer("/error/message")?
        .as_str()
        .map(str::to_string)
}

/// Join the text blocks of a messages response, skipping thinking blocks
fn extract_text(json: &Value) -> String {
    json.get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Render the user turn: grounding first, then the transcript, then the question
pub fn build_prompt(request: &GroundingRequest) -> String {
    let g = &request.grounding;
    let mut prompt = String::new();

    if !g.pr_title.is_empty() || !g.pr_description.is_empty() || !g.requirements.is_empty() {
        prompt.push_str("<pull_request>\n");
        if !g.pr_title.is_empty() {
            prompt.push_str(&format!("Title: {}\n", g.pr_title));
        }
        if !g.pr_description.is_empty() {
            prompt.push_str(&format!("Description:\n{}\n", g.pr_description.trim()));
        }
        if !g.requirements.is_empty() {
            prompt.push_str("Requirements:\n");
            for requirement in &g.requirements {
                prompt.push_str(&format!("- {}\n", requirement));
            }
        }
        prompt.push_str("</pull_request>\n\n");
    }

    if !g.file_path.is_empty() {
        prompt.push_str(&format!("<file path=\"{}\">\n", g.file_path));
        if g.file_content.is_empty() {
            prompt.push_str("(content unavailable)\n");
        } else {
            prompt.push_str(g.file_content.trim_end());
            prompt.push('\n');
        }
        prompt.push_str("</file>\n\n");
    }

    if !request.history.is_empty() {
        prompt.push_str("<conversation>\n");
        for message in &request.history {
            let speaker = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, message.content));
        }
        prompt.push_str("</conversation>\n\n");
    }

    prompt.push_str(&request.user_text);
    prompt
}

#[derive(Deserialize)]
struct RawAnswer {
    voice: String,
    screen: Value,
}

/// Parse the model's reply into both tracks; `None` if it said nothing
pub fn parse_answer(text: &str) -> Option<GroundedAnswer> {
    let text = strip_fences(text.trim());
    if text.is_empty() {
        return None;
    }

    if let Some(answer) = parse_json_answer(text) {
        return Some(answer);
    }

    debug!("Reply was not JSON, splitting into voice and screen");
    let voice = text
        .lines()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .find(|line| !line.is_empty())?
        .to_string();
    Some(GroundedAnswer {
        voice,
        screen: text.to_string(),
    })
}

fn parse_json_answer(text: &str) -> Option<GroundedAnswer> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let raw: RawAnswer = serde_json::from_str(&text[start..=end]).ok()?;
    let screen = match raw.screen {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    };
    Some(GroundedAnswer {
        voice: raw.voice.trim().to_string(),
        screen,
    })
}

/// Remove a surrounding ```json ... ``` fence if present
fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the info string ("json") on the opening line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
