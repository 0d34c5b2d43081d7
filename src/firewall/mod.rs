//! Content firewall for outbound prompts.
//!
//! Every prompt is scanned before it leaves the process. The scanner is a
//! pure battery of pattern matchers: all matchers run, the result is the
//! union of matched categories, and severity is judged downstream by the
//! router (credential > PII > clean).
//!
//! ## Design
//! - Deterministic: identical text always yields an identical result
//! - False positives preferred over false negatives
//! - No I/O, no shared state, safe under concurrent calls

pub mod scanner;

pub use scanner::{ContentScanner, CredentialKind, PiiKind, Scan, ScanResult};
