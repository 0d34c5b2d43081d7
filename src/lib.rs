//! Nexus request-routing core.
//!
//! Every prompt bound for a cloud LLM provider passes through one
//! choke-point: scan for sensitive content, decide a route, dispatch with
//! retry and failover across a prioritized provider list, and record a
//! full audit trace of what happened.
//!
//! Pipeline: `Request -> scan -> route -> dispatch/failover -> record -> Response`.
//!
//! The dashboard, CLI, and agent surfaces are external collaborators; they
//! construct [`Request`] values and consume [`Response`] / trace records.

pub mod config;
pub mod error;
pub mod firewall;
pub mod nexus;
pub mod providers;
pub mod request;
pub mod routing;
pub mod trace;

pub use config::NexusConfig;
pub use error::NexusError;
pub use firewall::{ContentScanner, Scan, ScanResult};
pub use nexus::{DispatchPolicy, Dispatcher};
pub use providers::registry::ProviderRegistry;
pub use request::{Request, RequestType, Response, UseCase};
pub use routing::{FirewallStatus, RequestRouter, RoutingDecision};
pub use trace::{Trace, TraceRecorder, TraceStatus, TraceStore};
