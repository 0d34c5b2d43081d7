//! Provider registry with snapshot semantics.
//!
//! The registry is read-mostly shared state: every dispatch clones one
//! `Arc` snapshot up front and iterates that, so a concurrent reload can
//! never hand an in-flight failover loop a half-updated provider list.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{OpenAiCompatClient, ProviderClient};
use crate::config::{resolve_credential, ConfigError, NexusConfig, ProviderConfig, ProviderKind};
use crate::request::UseCase;

// ── Snapshot ─────────────────────────────────────────────────────

/// One configured provider bound to its outbound client.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub config: ProviderConfig,
    pub client: Arc<dyn ProviderClient>,
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Immutable view of the provider fleet at one point in time.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    providers: Vec<RegisteredProvider>,
}

impl RegistrySnapshot {
    /// Providers eligible for the given lane, ascending by priority.
    /// Stable sort: insertion order breaks ties, so candidate order is
    /// reproducible for tests and audits.
    pub fn candidates(&self, use_case: UseCase) -> Vec<&RegisteredProvider> {
        let mut eligible: Vec<&RegisteredProvider> = self
            .providers
            .iter()
            .filter(|p| p.config.active_for(use_case))
            .collect();
        eligible.sort_by_key(|p| p.config.priority);
        eligible
    }

    /// Whether any local provider is active for at least one lane.
    pub fn has_local(&self) -> bool {
        self.providers.iter().any(|p| {
            p.config.kind == ProviderKind::Local
                && (p.config.chat_active || p.config.agent_active)
        })
    }

    /// All registered providers in insertion order.
    pub fn providers(&self) -> &[RegisteredProvider] {
        &self.providers
    }
}

// ── Registry ─────────────────────────────────────────────────────

/// Holds the current snapshot and swaps it atomically on reload.
pub struct ProviderRegistry {
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    config_path: Option<PathBuf>,
}

impl ProviderRegistry {
    /// Build the registry from a validated config, constructing one HTTP
    /// client per provider. Credential references are resolved eagerly so
    /// a missing key fails here, not mid-dispatch.
    pub fn from_config(config: &NexusConfig) -> Result<Self, ConfigError> {
        let snapshot = Self::build_snapshot(config)?;
        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            config_path: None,
        })
    }

    /// Load from a config file and remember the path for [`Self::reload`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = NexusConfig::load(path)?;
        let snapshot = Self::build_snapshot(&config)?;
        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Build a registry directly from parts. Used by tests to inject
    /// scripted clients.
    pub fn from_parts(providers: Vec<RegisteredProvider>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RegistrySnapshot { providers })),
            config_path: None,
        }
    }

    fn build_snapshot(config: &NexusConfig) -> Result<RegistrySnapshot, ConfigError> {
        config.validate()?;
        let mut providers = Vec::with_capacity(config.providers.len());
        for entry in &config.providers {
            let api_key = resolve_credential(&entry.credential_ref)?;
            let client: Arc<dyn ProviderClient> =
                Arc::new(OpenAiCompatClient::new(entry.base_url.clone(), api_key));
            providers.push(RegisteredProvider {
                config: entry.clone(),
                client,
            });
        }
        Ok(RegistrySnapshot { providers })
    }

    /// Current snapshot. A dispatch clones the `Arc` once and keeps using
    /// it for its whole failover loop.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().clone()
    }

    /// Re-read the config file and swap the snapshot. In-flight dispatches
    /// keep their old snapshot; new dispatches see the new fleet.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let path = self.config_path.as_ref().ok_or_else(|| {
            ConfigError::Invalid("registry was not loaded from a file, nothing to reload".into())
        })?;
        let config = NexusConfig::load(path)?;
        let snapshot = Self::build_snapshot(&config)?;
        *self.snapshot.write() = Arc::new(snapshot);
        tracing::info!(path = %path.display(), "provider registry reloaded");
        Ok(())
    }

    /// Swap in a prebuilt snapshot. Test hook for reload-atomicity checks.
    pub fn replace(&self, providers: Vec<RegisteredProvider>) {
        *self.snapshot.write() = Arc::new(RegistrySnapshot { providers });
    }
}
