//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Credentials never live in the TOML: each slot names an environment
//! variable (`credential_env`) that is read once at startup. A missing or
//! empty variable leaves the slot gapped — skipped at routing time, never an
//! error by itself.

use common::{Error, Result, Secret};
use groq_pool::{FallbackPolicy, Pool, PoolCatalog, RouterSettings, Slot};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    pub pools: Vec<PoolConfig>,
}

/// HTTP server settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Upstream endpoint and failover tuning
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub url: String,
    pub attempt_timeout_secs: u64,
    pub cooldown_secs: u64,
    pub fallback: FallbackPolicy,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: groq_pool::DEFAULT_UPSTREAM_URL.into(),
            attempt_timeout_secs: 30,
            cooldown_secs: groq_pool::DEFAULT_COOLDOWN.as_secs(),
            fallback: FallbackPolicy::default(),
        }
    }
}

/// One pool of credential slots serving a request mode
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    pub mode: String,
    pub slots: Vec<SlotConfig>,
}

/// One credential slot. The credential itself comes from the named
/// environment variable at startup.
#[derive(Debug, Deserialize)]
pub struct SlotConfig {
    pub name: String,
    pub credential_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub system_prompt: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_max_connections() -> usize {
    1000
}

fn default_model() -> String {
    groq_pool::DEFAULT_UPSTREAM_MODEL.into()
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        if !config.upstream.url.starts_with("http://")
            && !config.upstream.url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "upstream url must start with http:// or https://, got: {}",
                config.upstream.url
            )));
        }

        if config.upstream.attempt_timeout_secs == 0 {
            return Err(Error::Config(
                "attempt_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.upstream.cooldown_secs == 0 {
            return Err(Error::Config("cooldown_secs must be greater than 0".into()));
        }

        if config.server.max_connections == 0 {
            return Err(Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("ventora-chat-proxy.toml")
    }

    /// Resolve slot credentials from the process environment and build the
    /// validated pool catalog. Fails fast on a catalog-level misconfiguration
    /// (no general pool, every slot gapped) instead of surfacing it at first
    /// request.
    pub fn build_catalog(&self) -> Result<PoolCatalog> {
        let pools = self
            .pools
            .iter()
            .map(|pool| Pool {
                mode: pool.mode.clone(),
                slots: pool.slots.iter().map(resolve_slot).collect(),
            })
            .collect();

        PoolCatalog::new(pools).map_err(|e| Error::Config(e.to_string()))
    }

    /// Router tuning derived from the upstream section.
    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            policy: self.upstream.fallback,
            cooldown_window: Duration::from_secs(self.upstream.cooldown_secs),
            attempt_timeout: Duration::from_secs(self.upstream.attempt_timeout_secs),
            upstream_url: self.upstream.url.clone(),
        }
    }
}

/// Read a slot's credential from its environment variable. Unset or blank
/// variables yield a gapped slot.
fn resolve_slot(slot: &SlotConfig) -> Slot {
    let credential = match std::env::var(&slot.credential_env) {
        Ok(value) if !value.trim().is_empty() => Some(Secret::new(value)),
        _ => None,
    };
    Slot {
        name: slot.name.clone(),
        credential,
        model: slot.model.clone(),
        system_prompt: slot.system_prompt.clone(),
        temperature: slot.temperature,
        max_tokens: slot.max_tokens,
    }
}
