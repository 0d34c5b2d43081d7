//! Registry configuration: a reloadable TOML file describing the provider
//! fleet plus dispatch policy knobs.
//!
//! Malformed entries are rejected here, at load time, never at dispatch
//! time. Example:
//!
//! ```toml
//! flagged_external_policy = "warn"
//! provider_timeout_secs = 60
//! trace_db = "nexus_traces.db"
//!
//! [[providers]]
//! name = "openrouter"
//! kind = "external"
//! priority = 1
//! chat_active = true
//! agent_active = true
//! retries_per_step = 2
//! credential_ref = "env:OPENROUTER_API_KEY"
//! base_url = "https://openrouter.ai/api/v1"
//! default_model = "fast"
//!
//! [providers.models.fast]
//! id = "anthropic/claude-sonnet"
//! input_cost_per_mtok = 3.0
//! output_cost_per_mtok = 15.0
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

// ── Errors ───────────────────────────────────────────────────────

/// Bad registry state. Fails fast at load, never per-request.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid provider config: {0}")]
    Invalid(String),

    #[error("credential reference '{reference}' could not be resolved: {reason}")]
    Credential { reference: String, reason: String },
}

// ── Provider entries ─────────────────────────────────────────────

/// Whether a provider runs on this machine or across the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    External,
    Local,
}

/// One model offered by a provider, with pricing for cost accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Wire-level model identifier sent to the provider.
    pub id: String,
    /// USD per million input tokens.
    #[serde(default)]
    pub input_cost_per_mtok: f64,
    /// USD per million output tokens.
    #[serde(default)]
    pub output_cost_per_mtok: f64,
}

fn default_true() -> bool {
    true
}

fn default_retries() -> u32 {
    1
}

/// One provider entry in the registry file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name, referenced by `Request.preferred_provider`.
    pub name: String,
    /// Local providers keep flagged prompts on this machine.
    #[serde(default)]
    pub kind: ProviderKind,
    /// Lower priority is tried first. Must be >= 1.
    pub priority: u32,
    /// Eligible for the chat lane.
    #[serde(default = "default_true")]
    pub chat_active: bool,
    /// Eligible for the agent lane.
    #[serde(default = "default_true")]
    pub agent_active: bool,
    /// Extra attempts per provider before failing over.
    #[serde(default = "default_retries")]
    pub retries_per_step: u32,
    /// Where the API key comes from: `env:VAR_NAME`, or empty for keyless
    /// providers (e.g. a local runtime).
    #[serde(default)]
    pub credential_ref: String,
    /// Base URL of the provider's OpenAI-compatible endpoint.
    pub base_url: String,
    /// Model catalog key (or raw model id) used when the request carries
    /// no override.
    pub default_model: String,
    /// Model catalog: short key to wire id + pricing.
    #[serde(default)]
    pub models: BTreeMap<String, ModelInfo>,
}

impl ProviderConfig {
    /// Resolve a model key to its wire id and catalog entry. Keys not in
    /// the catalog are passed through as raw model ids.
    pub fn resolve_model<'a>(&'a self, key: &'a str) -> (&'a str, Option<&'a ModelInfo>) {
        match self.models.get(key) {
            Some(info) => (info.id.as_str(), Some(info)),
            None => (key, None),
        }
    }

    /// Whether this provider serves the given lane.
    pub fn active_for(&self, use_case: crate::request::UseCase) -> bool {
        match use_case {
            crate::request::UseCase::Chat => self.chat_active,
            crate::request::UseCase::Agent => self.agent_active,
        }
    }
}

// ── Dispatch policy ──────────────────────────────────────────────

/// What to do with a PII-flagged prompt when no local provider can take it.
///
/// `Warn` (the default) proceeds to external providers with the trace
/// stamped; `Deny` blocks so an outer surface can ask the user first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlaggedExternalPolicy {
    #[default]
    Warn,
    Deny,
}

fn default_timeout_secs() -> u64 {
    60
}

// ── Top-level config ─────────────────────────────────────────────

/// Full registry configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NexusConfig {
    /// Policy for PII-flagged prompts with no local fallback.
    #[serde(default)]
    pub flagged_external_policy: FlaggedExternalPolicy,
    /// Per-attempt provider call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub provider_timeout_secs: u64,
    /// SQLite file for the audit trace store. `None` keeps traces
    /// unpersisted (embedding / tests).
    #[serde(default)]
    pub trace_db: Option<PathBuf>,
    /// The provider fleet, in file order (insertion order breaks
    /// priority ties).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl NexusConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: NexusConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject malformed entries before any dispatch can see them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(ConfigError::Invalid("provider with empty name".into()));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider name '{}'",
                    provider.name
                )));
            }
            if provider.priority == 0 {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}': priority must be >= 1",
                    provider.name
                )));
            }
            if provider.base_url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}': base_url is required",
                    provider.name
                )));
            }
            if provider.default_model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}': default_model is required",
                    provider.name
                )));
            }
            for (key, model) in &provider.models {
                if model.id.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "provider '{}': model '{key}' has an empty id",
                        provider.name
                    )));
                }
            }
            if !provider.credential_ref.is_empty()
                && !provider.credential_ref.starts_with("env:")
            {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}': credential_ref must be empty or 'env:VAR_NAME', got '{}'",
                    provider.name, provider.credential_ref
                )));
            }
        }
        Ok(())
    }

    pub fn provider_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.provider_timeout_secs)
    }
}

/// Resolve a `credential_ref` to an API key.
///
/// Empty means the provider is keyless. `env:VAR` reads the variable at
/// call time so key rotation needs no restart.
pub fn resolve_credential(credential_ref: &str) -> Result<Option<String>, ConfigError> {
    if credential_ref.is_empty() {
        return Ok(None);
    }
    match credential_ref.strip_prefix("env:") {
        Some(var) => match std::env::var(var) {
            Ok(value) if !value.is_empty() => Ok(Some(value)),
            Ok(_) => Err(ConfigError::Credential {
                reference: credential_ref.to_string(),
                reason: format!("environment variable {var} is empty"),
            }),
            Err(_) => Err(ConfigError::Credential {
                reference: credential_ref.to_string(),
                reason: format!("environment variable {var} is not set"),
            }),
        },
        None => Err(ConfigError::Credential {
            reference: credential_ref.to_string(),
            reason: "expected 'env:VAR_NAME' or empty".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn provider(name: &str, priority: u32) -> ProviderConfig {
        ProviderConfig {
            name: name.into(),
            kind: ProviderKind::External,
            priority,
            chat_active: true,
            agent_active: true,
            retries_per_step: 1,
            credential_ref: String::new(),
            base_url: "http://127.0.0.1:11434/v1".into(),
            default_model: "default".into(),
            models: BTreeMap::new(),
        }
    }

    #[test]
    fn parses_full_config() {
        let raw = r#"
            flagged_external_policy = "deny"
            provider_timeout_secs = 30

            [[providers]]
            name = "openrouter"
            priority = 1
            retries_per_step = 2
            credential_ref = "env:OPENROUTER_API_KEY"
            base_url = "https://openrouter.ai/api/v1"
            default_model = "fast"

            [providers.models.fast]
            id = "anthropic/claude-sonnet"
            input_cost_per_mtok = 3.0
            output_cost_per_mtok = 15.0

            [[providers]]
            name = "ollama"
            kind = "local"
            priority = 2
            agent_active = false
            base_url = "http://127.0.0.1:11434/v1"
            default_model = "qwen3:0.6b"
        "#;
        let config: NexusConfig = toml::from_str(raw).unwrap();
        config.validate().unwrap();

        assert_eq!(config.flagged_external_policy, FlaggedExternalPolicy::Deny);
        assert_eq!(config.provider_timeout_secs, 30);
        assert_eq!(config.providers.len(), 2);

        let openrouter = &config.providers[0];
        assert_eq!(openrouter.kind, ProviderKind::External);
        assert_eq!(openrouter.retries_per_step, 2);
        let (id, info) = openrouter.resolve_model("fast");
        assert_eq!(id, "anthropic/claude-sonnet");
        assert_eq!(info.unwrap().input_cost_per_mtok, 3.0);

        let ollama = &config.providers[1];
        assert_eq!(ollama.kind, ProviderKind::Local);
        assert!(ollama.chat_active);
        assert!(!ollama.agent_active);
        // Unknown keys pass through as raw model ids.
        let (id, info) = ollama.resolve_model("qwen3:0.6b");
        assert_eq!(id, "qwen3:0.6b");
        assert!(info.is_none());
    }

    #[test]
    fn defaults_are_sensible() {
        let config = NexusConfig::default();
        assert_eq!(config.flagged_external_policy, FlaggedExternalPolicy::Warn);
        assert!(config.providers.is_empty());

        let parsed: NexusConfig = toml::from_str("").unwrap();
        assert_eq!(parsed.provider_timeout_secs, 60);
    }

    #[test]
    fn rejects_duplicate_names() {
        let config = NexusConfig {
            providers: vec![provider("a", 1), provider("a", 2)],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_zero_priority() {
        let config = NexusConfig {
            providers: vec![provider("a", 0)],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_default_model() {
        let mut p = provider("a", 1);
        p.default_model = String::new();
        let config = NexusConfig {
            providers: vec![p],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_credential_ref() {
        let mut p = provider("a", 1);
        p.credential_ref = "literal-key".into();
        let config = NexusConfig {
            providers: vec![p],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "providers = 42").unwrap();
        let err = NexusConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_surfaces_missing_file() {
        let err = NexusConfig::load(Path::new("/nonexistent/nexus.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn credential_resolution() {
        assert_eq!(resolve_credential("").unwrap(), None);
        std::env::set_var("NEXUS_TEST_KEY_A", "abc123");
        assert_eq!(
            resolve_credential("env:NEXUS_TEST_KEY_A").unwrap(),
            Some("abc123".to_string())
        );
        assert!(resolve_credential("env:NEXUS_TEST_KEY_UNSET_XYZ").is_err());
        assert!(resolve_credential("not-a-ref").is_err());
    }
}
