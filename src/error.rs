//! Error taxonomy for the routing core.
//!
//! Callers see three stable error codes:
//! - `NEXUS-001` all providers exhausted
//! - `NEXUS-002` request blocked by the content firewall
//! - `NEXUS-003` no eligible provider for the request's lane
//!
//! Every dispatch-time error carries the trace identifier so the failure
//! can be looked up in the audit store.

use crate::config::ConfigError;

/// Terminal errors surfaced by [`crate::nexus::Dispatcher::route_request`].
#[derive(Debug, thiserror::Error)]
pub enum NexusError {
    /// All candidate providers were tried and every attempt failed.
    #[error("NEXUS-001: all providers exhausted after {attempts} attempt(s) (trace {trace_id})")]
    ProvidersExhausted { trace_id: String, attempts: usize },

    /// The content firewall blocked the request before any provider was
    /// contacted. Never retried.
    #[error("NEXUS-002: request blocked by content firewall: {reason} (trace {trace_id})")]
    Blocked { trace_id: String, reason: String },

    /// No provider is active for the request's use-case lane.
    #[error("NEXUS-003: routing failed, no active provider for the {lane} lane (trace {trace_id})")]
    NoEligibleProvider { trace_id: String, lane: String },

    /// A provider rejected the request itself (auth failure, malformed
    /// payload). The error is about the request, not the provider, so the
    /// dispatch aborts without failing over.
    #[error("provider '{provider}' failed fatally: {message} (trace {trace_id})")]
    ProviderFatal {
        trace_id: String,
        provider: String,
        message: String,
    },

    /// The caller cancelled the dispatch; the trace was sealed as failed.
    #[error("dispatch cancelled by caller (trace {trace_id})")]
    Cancelled { trace_id: String },

    /// The inbound request failed validation before a trace was opened.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Registry configuration was rejected at load time.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl NexusError {
    /// Stable error code, when the variant carries one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::ProvidersExhausted { .. } => Some("NEXUS-001"),
            Self::Blocked { .. } => Some("NEXUS-002"),
            Self::NoEligibleProvider { .. } => Some("NEXUS-003"),
            _ => None,
        }
    }

    /// Trace identifier attached to the failure, for audit lookup.
    pub fn trace_id(&self) -> Option<&str> {
        match self {
            Self::ProvidersExhausted { trace_id, .. }
            | Self::Blocked { trace_id, .. }
            | Self::NoEligibleProvider { trace_id, .. }
            | Self::ProviderFatal { trace_id, .. }
            | Self::Cancelled { trace_id } => Some(trace_id),
            Self::InvalidRequest(_) | Self::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_carries_nexus_001() {
        let err = NexusError::ProvidersExhausted {
            trace_id: "t-1".into(),
            attempts: 4,
        };
        assert_eq!(err.code(), Some("NEXUS-001"));
        assert!(err.to_string().contains("NEXUS-001"));
        assert_eq!(err.trace_id(), Some("t-1"));
    }

    #[test]
    fn blocked_carries_nexus_002() {
        let err = NexusError::Blocked {
            trace_id: "t-2".into(),
            reason: "credentials detected".into(),
        };
        assert_eq!(err.code(), Some("NEXUS-002"));
        assert!(err.to_string().contains("credentials detected"));
    }

    #[test]
    fn no_eligible_provider_carries_nexus_003() {
        let err = NexusError::NoEligibleProvider {
            trace_id: "t-3".into(),
            lane: "agent".into(),
        };
        assert_eq!(err.code(), Some("NEXUS-003"));
        assert!(err.to_string().contains("agent"));
    }

    #[test]
    fn validation_errors_have_no_code_or_trace() {
        let err = NexusError::InvalidRequest("unknown request_type".into());
        assert_eq!(err.code(), None);
        assert_eq!(err.trace_id(), None);
    }
}
