use serde::{Deserialize, Serialize};

use crate::firewall::ScanResult;

// ── Routing decision ─────────────────────────────────────────────

/// Where a scanned request is allowed to go. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingDecision {
    /// Safe to send to cloud providers.
    External,
    /// Sensitive but serviceable: keep it on a local provider.
    Local,
    /// Credentials detected. Never reaches any provider.
    Rejected,
}

impl RoutingDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutingDecision::External => "external",
            RoutingDecision::Local => "local",
            RoutingDecision::Rejected => "rejected",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "local" => RoutingDecision::Local,
            "rejected" => RoutingDecision::Rejected,
            _ => RoutingDecision::External,
        }
    }
}

// ── Firewall status ──────────────────────────────────────────────

/// Severity verdict recorded on the trace: credential > PII > clean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallStatus {
    Clean,
    Flagged,
    Blocked,
}

impl FirewallStatus {
    /// Collapse a scan result to its most severe category.
    pub fn from_scan(scan: &ScanResult) -> Self {
        if scan.has_credentials() {
            FirewallStatus::Blocked
        } else if scan.has_pii() {
            FirewallStatus::Flagged
        } else {
            FirewallStatus::Clean
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FirewallStatus::Clean => "clean",
            FirewallStatus::Flagged => "flagged",
            FirewallStatus::Blocked => "blocked",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "flagged" => FirewallStatus::Flagged,
            "blocked" => FirewallStatus::Blocked,
            _ => FirewallStatus::Clean,
        }
    }
}

// ── Router ───────────────────────────────────────────────────────

/// Pure decision table over a scan result and one availability fact.
///
/// Deliberately blind to provider health and load so the table stays
/// unit-testable independent of network conditions.
pub struct RequestRouter;

impl RequestRouter {
    /// Decide the route, in precedence order:
    ///
    /// 1. Any credential category: `Rejected`, no exceptions.
    /// 2. PII with a local provider available: `Local`.
    /// 3. PII without a local provider: `External`. The dispatcher stamps
    ///    the trace so this never goes out looking clean.
    /// 4. Clean: `External`.
    pub fn decide(scan: &ScanResult, local_provider_available: bool) -> RoutingDecision {
        if scan.has_credentials() {
            return RoutingDecision::Rejected;
        }
        if scan.has_pii() {
            return if local_provider_available {
                RoutingDecision::Local
            } else {
                RoutingDecision::External
            };
        }
        RoutingDecision::External
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::{ContentScanner, Scan};

    fn scan(text: &str) -> ScanResult {
        ContentScanner::new().scan(text)
    }

    #[test]
    fn credentials_always_rejected() {
        let result = scan("password=hunter2");
        assert_eq!(RequestRouter::decide(&result, true), RoutingDecision::Rejected);
        assert_eq!(RequestRouter::decide(&result, false), RoutingDecision::Rejected);
    }

    #[test]
    fn credentials_outrank_pii() {
        let result = scan("nexus_user@example.com password=hunter2");
        assert!(result.has_pii());
        assert_eq!(RequestRouter::decide(&result, true), RoutingDecision::Rejected);
    }

    #[test]
    fn pii_with_local_goes_local() {
        let result = scan("my ssn is 123-45-6789");
        assert_eq!(RequestRouter::decide(&result, true), RoutingDecision::Local);
    }

    #[test]
    fn pii_without_local_goes_external() {
        let result = scan("my ssn is 123-45-6789");
        assert_eq!(RequestRouter::decide(&result, false), RoutingDecision::External);
    }

    #[test]
    fn clean_goes_external() {
        let result = scan("What's the weather tomorrow?");
        assert_eq!(RequestRouter::decide(&result, true), RoutingDecision::External);
        assert_eq!(RequestRouter::decide(&result, false), RoutingDecision::External);
    }

    #[test]
    fn severity_collapses_correctly() {
        assert_eq!(
            FirewallStatus::from_scan(&scan("hello")),
            FirewallStatus::Clean
        );
        assert_eq!(
            FirewallStatus::from_scan(&scan("nexus_user@example.com")),
            FirewallStatus::Flagged
        );
        assert_eq!(
            FirewallStatus::from_scan(&scan("password=hunter2")),
            FirewallStatus::Blocked
        );
        // Credential wins over PII.
        assert_eq!(
            FirewallStatus::from_scan(&scan("nexus_user@example.com password=x1")),
            FirewallStatus::Blocked
        );
    }

    #[test]
    fn decision_string_round_trip() {
        for decision in [
            RoutingDecision::External,
            RoutingDecision::Local,
            RoutingDecision::Rejected,
        ] {
            assert_eq!(RoutingDecision::from_str_lossy(decision.as_str()), decision);
        }
        assert_eq!(
            RoutingDecision::from_str_lossy("garbage"),
            RoutingDecision::External
        );
    }
}
