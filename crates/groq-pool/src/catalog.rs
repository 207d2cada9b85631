//! Mode → pool catalog
//!
//! A `Pool` is an ordered list of credential slots serving one request mode.
//! The catalog is built once at startup from resolved configuration and is
//! immutable afterwards; only the cooldown registry mutates at runtime.
//!
//! Pool selection, per request:
//! - matched mode → matched pool first, then the remaining pools in
//!   declaration order (`FullCatalog`), or the matched pool alone
//!   (`MatchedOnly`)
//! - unknown mode → the `general` pool alone, regardless of policy

use common::Secret;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

/// Mode every catalog must serve; the fallback for unknown modes.
pub const GENERAL_MODE: &str = "general";

/// One candidate: a credential plus the request shaping it implies.
#[derive(Debug, Clone)]
pub struct Slot {
    /// Human-readable slot name, used in diagnostics ("Rate limited on key: …")
    pub name: String,
    /// `None` or empty = configuration gap; the slot is skipped, never an error
    pub credential: Option<Secret<String>>,
    /// Upstream model name sent with every request through this slot
    pub model: String,
    /// Prepended as the first (system) message of every upstream request
    pub system_prompt: String,
    /// Overrides the request's temperature when set
    pub temperature: Option<f64>,
    /// Overrides the request's max_tokens when set
    pub max_tokens: Option<u32>,
}

impl Slot {
    /// A slot is usable when it carries a non-empty credential.
    pub fn usable(&self) -> bool {
        matches!(&self.credential, Some(c) if !c.is_empty())
    }
}

/// Ordered slots serving one mode.
#[derive(Debug, Clone)]
pub struct Pool {
    pub mode: String,
    pub slots: Vec<Slot>,
}

/// Whether a matched mode may fall through to the other pools.
///
/// The policy is explicit configuration, not a hardcoded behavioral fork:
/// `FullCatalog` tries the matched pool first and then every other pool in
/// declaration order; `MatchedOnly` exhausts after the matched pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    #[default]
    FullCatalog,
    MatchedOnly,
}

/// Immutable mode → pool mapping, validated at construction.
#[derive(Debug, Clone)]
pub struct PoolCatalog {
    pools: Vec<Pool>,
}

impl PoolCatalog {
    /// Build and validate a catalog. Fails fast on configuration errors that
    /// would otherwise only surface at first request: a missing `general`
    /// pool, duplicate modes, or a catalog where every slot is gapped.
    ///
    /// Individual gapped slots (and even fully-gapped pools) are tolerated —
    /// they are skipped at routing time — but a fully-gapped pool is worth a
    /// startup warning.
    pub fn new(pools: Vec<Pool>) -> Result<Self> {
        if pools.is_empty() {
            return Err(Error::Catalog("no pools configured".into()));
        }
        if !pools.iter().any(|p| p.mode == GENERAL_MODE) {
            return Err(Error::Catalog("no 'general' pool configured".into()));
        }
        for (i, pool) in pools.iter().enumerate() {
            if pools[..i].iter().any(|p| p.mode == pool.mode) {
                return Err(Error::Catalog(format!("duplicate pool mode '{}'", pool.mode)));
            }
        }
        if !pools.iter().flat_map(|p| &p.slots).any(Slot::usable) {
            return Err(Error::Catalog(
                "no slot in any pool has a credential configured".into(),
            ));
        }
        for pool in &pools {
            if !pool.slots.iter().any(Slot::usable) {
                warn!(mode = %pool.mode, "pool has no usable slots and will always fall through");
            }
        }
        Ok(Self { pools })
    }

    /// All pools in declaration order.
    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    /// Ordered pools to try for the requested mode.
    pub fn select(&self, mode: &str, policy: FallbackPolicy) -> Vec<&Pool> {
        match self.pools.iter().find(|p| p.mode == mode) {
            Some(matched) => match policy {
                FallbackPolicy::MatchedOnly => vec![matched],
                FallbackPolicy::FullCatalog => {
                    let mut ordered = vec![matched];
                    ordered.extend(self.pools.iter().filter(|p| p.mode != mode));
                    ordered
                }
            },
            // Unknown mode falls back to the general pool alone. Validated at
            // construction, so the filter always yields exactly one pool.
            None => self
                .pools
                .iter()
                .filter(|p| p.mode == GENERAL_MODE)
                .collect(),
        }
    }
}

/// Derive the request mode from the client's model string.
///
/// Everything up to and including the first `:` is a provider prefix and is
/// stripped (`groq:research` → `research`). A missing or empty model string
/// yields `general`. Modes that match no pool resolve to `general` at
/// selection time, so foreign prefixes (`google:…`) degrade gracefully.
pub fn request_mode(model: Option<&str>) -> &str {
    let Some(model) = model else {
        return GENERAL_MODE;
    };
    let mode = model.split_once(':').map_or(model, |(_, rest)| rest);
    if mode.is_empty() { GENERAL_MODE } else { mode }
}
