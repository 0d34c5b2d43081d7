//! OpenAI-compatible HTTP provider client.
//!
//! Speaks the `/chat/completions` shape that cloud gateways and local
//! runtimes (Ollama, vLLM, llama.cpp server) all expose. The only
//! provider-specific facts live in config: base URL, credential reference,
//! and model catalog.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ProviderCallError, ProviderClient, ProviderReply};
use crate::request::TokenUsage;

// ── Wire types ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

// ── Client ───────────────────────────────────────────────────────

/// HTTP client for one configured provider endpoint.
pub struct OpenAiCompatClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Map an HTTP status to retryability. Rate limits, timeouts, and
    /// server-side errors are transient; everything else means the request
    /// itself was rejected.
    fn classify_status(status: reqwest::StatusCode, body: &str) -> ProviderCallError {
        let message = format!("status {status}: {}", body.chars().take(200).collect::<String>());
        if status.as_u16() == 408 || status.as_u16() == 429 || status.is_server_error() {
            ProviderCallError::transient(message)
        } else {
            ProviderCallError::fatal(message)
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatClient {
    async fn call(
        &self,
        model: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<ProviderReply, ProviderCallError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let mut request = self.client.post(&url).timeout(timeout).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ProviderCallError::transient(format!("request failed: {e}"))
            } else {
                ProviderCallError::fatal(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderCallError::fatal(format!("malformed response body: {e}")))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ProviderCallError::transient("empty completion".to_string()));
        }

        let usage = parsed.usage.unwrap_or_default();
        Ok(ProviderReply {
            content,
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized() {
        let client = OpenAiCompatClient::new("https://api.example.com/v1/", None);
        assert_eq!(client.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        for code in [408u16, 429, 500, 502, 503, 504] {
            let status = reqwest::StatusCode::from_u16(code).unwrap();
            assert!(
                OpenAiCompatClient::classify_status(status, "").is_retryable(),
                "status {code} should be transient"
            );
        }
    }

    #[test]
    fn auth_and_validation_errors_are_fatal() {
        for code in [400u16, 401, 403, 404, 422] {
            let status = reqwest::StatusCode::from_u16(code).unwrap();
            assert!(
                !OpenAiCompatClient::classify_status(status, "").is_retryable(),
                "status {code} should be fatal"
            );
        }
    }

    #[test]
    fn response_body_parses() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "hi there"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hi there");
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 12);
    }

    #[test]
    fn missing_usage_defaults_to_zero() {
        let raw = r#"{"choices": [{"message": {"content": "ok"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.usage.is_none());
    }
}
