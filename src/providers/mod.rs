//! Provider collaborator interface and the registry of configured providers.
//!
//! The dispatcher never learns provider wire formats. It sees exactly one
//! abstraction: `call(model, prompt, timeout)` returning content + token
//! usage, or an error tagged retryable / not.

pub mod http;
pub mod registry;

use async_trait::async_trait;
use std::time::Duration;

use crate::request::TokenUsage;

pub use http::OpenAiCompatClient;
pub use registry::{ProviderRegistry, RegisteredProvider, RegistrySnapshot};

// ── Call errors ──────────────────────────────────────────────────

/// Failure of a single provider call.
///
/// Transient failures (timeout, 5xx, rate limit) are retried and then
/// failed over. Fatal failures (auth, malformed request) abort the whole
/// dispatch: the error is about the request, not the provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderCallError {
    #[error("transient provider failure: {message}")]
    Transient { message: String },

    #[error("fatal provider failure: {message}")]
    Fatal { message: String },
}

impl ProviderCallError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Whether retrying (or failing over) can help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient { message } | Self::Fatal { message } => message,
        }
    }
}

// ── Collaborator trait ───────────────────────────────────────────

/// One successful provider call.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub content: String,
    pub usage: TokenUsage,
}

/// Outbound provider abstraction.
///
/// Implementations must respect `timeout`; the dispatcher additionally
/// enforces it from the outside, so a client that hangs past the deadline
/// is treated as a transient failure.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn call(
        &self,
        model: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<ProviderReply, ProviderCallError>;
}
