use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AiError;

/// How much of an unparseable model response is carried in the error.
const EXCERPT_LEN: usize = 200;

/// One chat-completion call. The prompt is sent as a single user
/// message with JSON response mode requested.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The decoded JSON object the model returned.
    pub json: Value,
    /// Model id the endpoint actually served.
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// Seam between the pipeline and the LLM endpoint. Tests substitute a
/// scripted implementation; production uses [`HttpChatClient`].
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse, AiError>;
}

/// reqwest-backed client for an OpenAI-compatible chat-completions
/// endpoint.
pub struct HttpChatClient {
    client: reqwest::Client,
    api_key: String,
    /// Base URL without trailing slash, e.g. "https://api.openai.com/v1".
    base_url: String,
}

impl HttpChatClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse, AiError> {
        let body = serde_json::json!({
            "model": req.model,
            "max_tokens": req.max_tokens,
            "messages": [{"role": "user", "content": req.prompt}],
            "response_format": {"type": "json_object"},
        });
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %req.model, prompt_len = req.prompt.len(), "sending chat completion");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "chat completion API error");
            return Err(AiError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp.json().await?;

        let content = api_resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let json: Value = serde_json::from_str(&content).map_err(|_| AiError::BadResponse {
            excerpt: excerpt(&content),
        })?;

        let usage = api_resp.usage.unwrap_or_default();
        Ok(CompletionResponse {
            json,
            model: api_resp.model,
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
        })
    }
}

fn excerpt(s: &str) -> String {
    if s.len() <= EXCERPT_LEN {
        return s.to_string();
    }
    let mut end = EXCERPT_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

// Chat-completions API response types.

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_truncates_long_content() {
        let long = "x".repeat(500);
        let e = excerpt(&long);
        assert!(e.len() < 500);
        assert!(e.ends_with('…'));
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let s = "é".repeat(300);
        let e = excerpt(&s);
        assert!(e.ends_with('…'));
    }
}
