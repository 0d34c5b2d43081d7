//! Request and response types consumed by external surfaces.
//!
//! The dashboard, CLI, and agent collaborators construct a [`Request`] and
//! receive a [`Response`] (or a tagged [`crate::NexusError`]). Both are
//! immutable once created.

use serde::{Deserialize, Serialize};

use crate::error::NexusError;

// ── Request type ─────────────────────────────────────────────────

/// What kind of work the caller is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Conversational chat turn.
    Chat,
    /// One-shot content or code generation.
    Generation,
    /// Multi-step architecture / design work.
    ComplexArchitecture,
    /// Review or verification of existing output.
    Verification,
    /// Image generation.
    ImageGeneration,
}

impl RequestType {
    /// All request types in display order.
    pub const ALL: &'static [RequestType] = &[
        RequestType::Chat,
        RequestType::Generation,
        RequestType::ComplexArchitecture,
        RequestType::Verification,
        RequestType::ImageGeneration,
    ];

    /// Identifier used in API payloads and config.
    pub fn id(self) -> &'static str {
        match self {
            RequestType::Chat => "chat",
            RequestType::Generation => "generation",
            RequestType::ComplexArchitecture => "complex_architecture",
            RequestType::Verification => "verification",
            RequestType::ImageGeneration => "image_generation",
        }
    }

    /// Parse from the API id string. Unknown ids are a validation error,
    /// never a silent default.
    pub fn from_id(id: &str) -> Result<Self, NexusError> {
        match id {
            "chat" => Ok(RequestType::Chat),
            "generation" => Ok(RequestType::Generation),
            "complex_architecture" => Ok(RequestType::ComplexArchitecture),
            "verification" => Ok(RequestType::Verification),
            "image_generation" => Ok(RequestType::ImageGeneration),
            other => Err(NexusError::InvalidRequest(format!(
                "unknown request_type '{other}' (expected one of: chat, generation, \
                 complex_architecture, verification, image_generation)"
            ))),
        }
    }

    /// Provider lane this request type dispatches through.
    pub fn use_case(self) -> UseCase {
        match self {
            RequestType::Chat => UseCase::Chat,
            RequestType::Generation
            | RequestType::ComplexArchitecture
            | RequestType::Verification
            | RequestType::ImageGeneration => UseCase::Agent,
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Provider activation lane. Providers opt into each lane independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UseCase {
    Chat,
    Agent,
}

impl UseCase {
    pub fn as_str(self) -> &'static str {
        match self {
            UseCase::Chat => "chat",
            UseCase::Agent => "agent",
        }
    }
}

impl std::fmt::Display for UseCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Request ──────────────────────────────────────────────────────

/// A single prompt bound for a provider. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// The raw prompt text. Scanned by the firewall before it leaves
    /// the process.
    pub prompt: String,
    /// What kind of work this is; selects the provider lane.
    pub request_type: RequestType,
    /// Provider to try first, when set and present in the candidate list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<String>,
    /// Model key or id overriding each provider's default model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
}

impl Request {
    /// Create a request. Empty prompts are rejected up front.
    pub fn new(prompt: impl Into<String>, request_type: RequestType) -> Result<Self, NexusError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(NexusError::InvalidRequest("empty prompt".into()));
        }
        Ok(Self {
            prompt,
            request_type,
            preferred_provider: None,
            model_override: None,
        })
    }

    /// Prefer a specific provider without changing the rejection rules.
    pub fn with_preferred_provider(mut self, provider: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider.into());
        self
    }

    /// Override the model used on every provider attempt.
    pub fn with_model_override(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }
}

// ── Response ─────────────────────────────────────────────────────

/// Token counts reported by the provider for one completed call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Final result of a successful dispatch. Created once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Model output text.
    pub content: String,
    /// Provider that produced the response.
    pub provider: String,
    /// Model id that was actually called.
    pub model: String,
    /// Audit trace identifier for this request.
    pub trace_id: String,
    /// Token usage reported by the provider.
    pub token_usage: TokenUsage,
    /// Estimated cost in USD, from the model's configured pricing.
    pub cost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_request_types_round_trip_ids() {
        for rt in RequestType::ALL {
            assert_eq!(RequestType::from_id(rt.id()).unwrap(), *rt);
            assert_eq!(format!("{rt}"), rt.id());
        }
    }

    #[test]
    fn unknown_request_type_is_rejected() {
        let err = RequestType::from_id("summarization").unwrap_err();
        assert!(err.to_string().contains("summarization"));
        assert!(RequestType::from_id("").is_err());
    }

    #[test]
    fn chat_uses_chat_lane_everything_else_agent() {
        assert_eq!(RequestType::Chat.use_case(), UseCase::Chat);
        assert_eq!(RequestType::Generation.use_case(), UseCase::Agent);
        assert_eq!(RequestType::ComplexArchitecture.use_case(), UseCase::Agent);
        assert_eq!(RequestType::Verification.use_case(), UseCase::Agent);
        assert_eq!(RequestType::ImageGeneration.use_case(), UseCase::Agent);
    }

    #[test]
    fn empty_prompt_is_rejected() {
        assert!(Request::new("", RequestType::Chat).is_err());
        assert!(Request::new("   ", RequestType::Chat).is_err());
    }

    #[test]
    fn builder_sets_overrides() {
        let req = Request::new("hello", RequestType::Chat)
            .unwrap()
            .with_preferred_provider("ollama")
            .with_model_override("fast");
        assert_eq!(req.preferred_provider.as_deref(), Some("ollama"));
        assert_eq!(req.model_override.as_deref(), Some("fast"));
    }

    #[test]
    fn token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 120,
            output_tokens: 30,
        };
        assert_eq!(usage.total(), 150);
    }
}
