//! Routing decision engine.
//!
//! Consumes a firewall [`crate::firewall::ScanResult`] and a single
//! provider-availability fact, and emits the EXTERNAL / LOCAL / REJECTED
//! verdict that gates whether a prompt ever reaches a cloud provider.

pub mod router;

pub use router::{FirewallStatus, RequestRouter, RoutingDecision};
