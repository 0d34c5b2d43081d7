//! The Nexus dispatcher: single point of entry for every outbound prompt.
//!
//! Drives the full pipeline for one request: firewall scan, routing
//! decision, provider selection, retry-within-provider, failover across
//! providers, and trace sealing. Constructed as a plain value over its
//! collaborators; multiple independent instances coexist without
//! cross-contamination (one per test, one per app).
//!
//! Failover is an explicit state machine over `(provider, attempt)`:
//! transient failures burn the current provider's retry budget then move
//! to the next candidate; fatal failures abort the whole dispatch because
//! the error is about the request, not the provider.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{FlaggedExternalPolicy, ModelInfo, NexusConfig, ProviderKind};
use crate::error::NexusError;
use crate::firewall::Scan;
use crate::providers::registry::{ProviderRegistry, RegisteredProvider};
use crate::request::{Request, Response, TokenUsage};
use crate::routing::{FirewallStatus, RequestRouter, RoutingDecision};
use crate::trace::{AttemptOutcome, Trace, TraceFlag, TraceRecorder, TraceStatus};

// ── Policy ───────────────────────────────────────────────────────

/// Dispatch-time knobs, read from [`NexusConfig`].
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// What to do with PII-flagged prompts that have no local fallback.
    pub flagged_external: FlaggedExternalPolicy,
    /// Per-attempt provider call timeout. A call that neither succeeds
    /// nor errors within this window counts as a transient failure.
    pub provider_timeout: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            flagged_external: FlaggedExternalPolicy::Warn,
            provider_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&NexusConfig> for DispatchPolicy {
    fn from(config: &NexusConfig) -> Self {
        Self {
            flagged_external: config.flagged_external_policy,
            provider_timeout: config.provider_timeout(),
        }
    }
}

// ── Dispatcher ───────────────────────────────────────────────────

/// The orchestration core.
pub struct Dispatcher {
    scanner: Arc<dyn Scan>,
    registry: Arc<ProviderRegistry>,
    recorder: Arc<TraceRecorder>,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(
        scanner: Arc<dyn Scan>,
        registry: Arc<ProviderRegistry>,
        recorder: Arc<TraceRecorder>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            scanner,
            registry,
            recorder,
            policy,
        }
    }

    pub fn recorder(&self) -> &TraceRecorder {
        &self.recorder
    }

    /// Route one request end to end.
    pub async fn route_request(&self, req: &Request) -> Result<Response, NexusError> {
        self.dispatch(req, CancellationToken::new()).await
    }

    /// Route one request with caller-controlled cancellation. When the
    /// token fires, no further provider attempts are issued and the trace
    /// is sealed as failed rather than left open.
    pub async fn dispatch(
        &self,
        req: &Request,
        cancel: CancellationToken,
    ) -> Result<Response, NexusError> {
        let mut trace = self.recorder.begin();
        tracing::debug!(
            trace_id = %trace.trace_id,
            request_type = %req.request_type,
            "dispatch started"
        );

        // Scan. A panicking scanner is treated as if the most severe
        // category were present: fail safe, never fail open.
        let scan = match catch_unwind(AssertUnwindSafe(|| self.scanner.scan(&req.prompt))) {
            Ok(scan) => scan,
            Err(_) => {
                tracing::error!(trace_id = %trace.trace_id, "content scanner panicked, failing safe");
                trace.firewall_status = FirewallStatus::Blocked;
                trace.routing_decision = Some(RoutingDecision::Rejected);
                return Err(self.seal_blocked(
                    &mut trace,
                    "scanner failure, treated as most severe category",
                ));
            }
        };
        trace.firewall_status = FirewallStatus::from_scan(&scan);

        // Route against one registry snapshot; the whole failover loop
        // below iterates this same snapshot even if a reload lands mid-way.
        let snapshot = self.registry.snapshot();
        let decision = RequestRouter::decide(&scan, snapshot.has_local());
        trace.routing_decision = Some(decision);

        if decision == RoutingDecision::Rejected {
            tracing::warn!(
                trace_id = %trace.trace_id,
                categories = %scan.summary(),
                "request blocked by content firewall"
            );
            return Err(self.seal_blocked(
                &mut trace,
                &format!("credentials detected ({})", scan.summary()),
            ));
        }

        if decision == RoutingDecision::External && scan.has_pii() {
            // Never silently sent as clean.
            trace.flag(TraceFlag::FlaggedWithoutLocalFallback);
            match self.policy.flagged_external {
                FlaggedExternalPolicy::Warn => {
                    tracing::warn!(
                        trace_id = %trace.trace_id,
                        categories = %scan.summary(),
                        "PII detected with no local provider available, proceeding external"
                    );
                }
                FlaggedExternalPolicy::Deny => {
                    return Err(self.seal_blocked(
                        &mut trace,
                        &format!(
                            "PII detected ({}) with no local provider; policy denies external dispatch",
                            scan.summary()
                        ),
                    ));
                }
            }
        }

        let use_case = req.request_type.use_case();
        let mut candidates: Vec<&RegisteredProvider> = snapshot.candidates(use_case);

        if decision == RoutingDecision::Local {
            let locals: Vec<&RegisteredProvider> = candidates
                .iter()
                .copied()
                .filter(|p| p.config.kind == ProviderKind::Local)
                .collect();
            if locals.is_empty() {
                // Configuration drift: the router saw a local provider but
                // none serves this lane. Degrade, and keep it on the record.
                trace.flag(TraceFlag::FallbackFromLocal);
                tracing::warn!(
                    trace_id = %trace.trace_id,
                    lane = %use_case,
                    "LOCAL route chosen but no local provider serves this lane, degrading to external"
                );
            } else {
                candidates = locals;
            }
        }

        if let Some(preferred) = &req.preferred_provider {
            if let Some(pos) = candidates.iter().position(|p| &p.config.name == preferred) {
                let front = candidates.remove(pos);
                candidates.insert(0, front);
            }
        }

        if candidates.is_empty() {
            trace.status = TraceStatus::Blocked;
            trace.error = Some(format!(
                "NEXUS-003: no active provider for the {use_case} lane"
            ));
            self.recorder.end(&mut trace);
            return Err(NexusError::NoEligibleProvider {
                trace_id: trace.trace_id,
                lane: use_case.to_string(),
            });
        }

        // Failover loop: (provider, attempt) in candidate order.
        for provider in candidates {
            let name = provider.config.name.as_str();
            let model_key = req
                .model_override
                .as_deref()
                .unwrap_or(&provider.config.default_model);
            let (model_id, model_info) = provider.config.resolve_model(model_key);
            let max_attempts = provider.config.retries_per_step + 1;

            for attempt in 1..=max_attempts {
                if cancel.is_cancelled() {
                    return Err(self.seal_cancelled(&mut trace));
                }

                let call = provider
                    .client
                    .call(model_id, &req.prompt, self.policy.provider_timeout);
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(self.seal_cancelled(&mut trace));
                    }
                    result = tokio::time::timeout(self.policy.provider_timeout, call) => result,
                };

                match outcome {
                    Err(_elapsed) => {
                        trace.record_attempt(
                            name,
                            attempt,
                            AttemptOutcome::TransientFailure,
                            "timeout",
                        );
                        tracing::warn!(
                            trace_id = %trace.trace_id,
                            provider = name,
                            attempt,
                            "provider call timed out"
                        );
                    }
                    Ok(Ok(reply)) => {
                        trace.record_attempt(name, attempt, AttemptOutcome::Succeeded, "");
                        trace.provider_used = Some(name.to_string());
                        trace.model_used = Some(model_id.to_string());
                        trace.status = TraceStatus::Completed;
                        let cost = estimate_cost(model_info, reply.usage);
                        let response = Response {
                            content: reply.content,
                            provider: name.to_string(),
                            model: model_id.to_string(),
                            trace_id: trace.trace_id.clone(),
                            token_usage: reply.usage,
                            cost,
                        };
                        self.recorder.end(&mut trace);
                        tracing::info!(
                            trace_id = %trace.trace_id,
                            provider = name,
                            model = model_id,
                            input_tokens = reply.usage.input_tokens,
                            output_tokens = reply.usage.output_tokens,
                            cost,
                            "dispatch completed"
                        );
                        return Ok(response);
                    }
                    Ok(Err(e)) if e.is_retryable() => {
                        trace.record_attempt(
                            name,
                            attempt,
                            AttemptOutcome::TransientFailure,
                            e.message(),
                        );
                        tracing::warn!(
                            trace_id = %trace.trace_id,
                            provider = name,
                            attempt,
                            "transient provider failure: {}",
                            e.message()
                        );
                    }
                    Ok(Err(e)) => {
                        trace.record_attempt(name, attempt, AttemptOutcome::FatalFailure, e.message());
                        trace.status = TraceStatus::Failed;
                        trace.error =
                            Some(format!("provider '{name}' failed fatally: {}", e.message()));
                        self.recorder.end(&mut trace);
                        tracing::error!(
                            trace_id = %trace.trace_id,
                            provider = name,
                            "fatal provider failure, aborting dispatch: {}",
                            e.message()
                        );
                        return Err(NexusError::ProviderFatal {
                            trace_id: trace.trace_id,
                            provider: name.to_string(),
                            message: e.message().to_string(),
                        });
                    }
                }
            }
            tracing::warn!(
                trace_id = %trace.trace_id,
                provider = name,
                "retry budget exhausted, failing over to next provider"
            );
        }

        let attempts = trace.attempts.len();
        trace.status = TraceStatus::Failed;
        trace.error = Some(format!(
            "NEXUS-001: all providers exhausted after {attempts} attempt(s)"
        ));
        self.recorder.end(&mut trace);
        Err(NexusError::ProvidersExhausted {
            trace_id: trace.trace_id,
            attempts,
        })
    }

    fn seal_blocked(&self, trace: &mut Trace, reason: &str) -> NexusError {
        trace.status = TraceStatus::Blocked;
        trace.error = Some(format!("NEXUS-002: {reason}"));
        self.recorder.end(trace);
        NexusError::Blocked {
            trace_id: trace.trace_id.clone(),
            reason: reason.to_string(),
        }
    }

    fn seal_cancelled(&self, trace: &mut Trace) -> NexusError {
        trace.status = TraceStatus::Failed;
        trace.flag(TraceFlag::Cancelled);
        trace.error = Some("dispatch cancelled by caller".into());
        self.recorder.end(trace);
        tracing::info!(trace_id = %trace.trace_id, "dispatch cancelled by caller");
        NexusError::Cancelled {
            trace_id: trace.trace_id.clone(),
        }
    }
}

/// Cost in USD from the model's configured per-million-token pricing.
/// Models without a catalog entry cost 0 (unknown pricing is not guessed).
fn estimate_cost(info: Option<&ModelInfo>, usage: TokenUsage) -> f64 {
    match info {
        Some(model) => {
            (usage.input_tokens as f64 * model.input_cost_per_mtok
                + usage.output_tokens as f64 * model.output_cost_per_mtok)
                / 1_000_000.0
        }
        None => 0.0,
    }
}

// ── Tests ────────────────────────────────────────────────────────
