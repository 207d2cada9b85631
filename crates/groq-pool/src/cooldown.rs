//! Per-credential cooldown tracking
//!
//! The registry maps a credential string to the instant its cooldown expires.
//! Entries are never removed: an expired entry is simply treated as "not
//! cooling down" on lookup and gets overwritten the next time the credential
//! is rate limited. Concurrent marks on the same credential race benignly —
//! last writer wins, and competing expiry instants within the same window are
//! equal or close.
//!
//! The registry is owned by its `Router` instance, never process-global, so
//! tests can construct independent instances without cross-test leakage.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

/// Credential → cooldown-expiry map with lazy expiry.
#[derive(Debug, Default)]
pub struct CooldownRegistry {
    entries: RwLock<HashMap<String, Instant>>,
}

impl CooldownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the credential is inside an active cooldown window.
    ///
    /// A stale entry (expiry in the past) reads as not cooling down; it is
    /// left in place to be superseded by a later mark.
    pub async fn is_cooling(&self, credential: &str) -> bool {
        let entries = self.entries.read().await;
        match entries.get(credential) {
            Some(until) => Instant::now() < *until,
            None => false,
        }
    }

    /// Remaining cooldown for the credential, if any.
    pub async fn remaining(&self, credential: &str) -> Option<Duration> {
        let entries = self.entries.read().await;
        let until = entries.get(credential)?;
        let now = Instant::now();
        if now < *until { Some(*until - now) } else { None }
    }

    /// Start (or restart) a cooldown window for the credential.
    pub async fn mark(&self, credential: &str, window: Duration) {
        let until = Instant::now() + window;
        self.entries.write().await.insert(credential.to_string(), until);
        debug!(cooldown_secs = window.as_secs(), "credential marked cooling down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unmarked_credential_is_not_cooling() {
        let registry = CooldownRegistry::new();
        assert!(!registry.is_cooling("key-a").await);
        assert!(registry.remaining("key-a").await.is_none());
    }

    #[tokio::test]
    async fn marked_credential_cools_for_the_window() {
        let registry = CooldownRegistry::new();
        registry.mark("key-a", Duration::from_secs(60)).await;

        assert!(registry.is_cooling("key-a").await);
        let remaining = registry.remaining("key-a").await.unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(59));

        // Identity is the credential string itself
        assert!(!registry.is_cooling("key-b").await);
    }

    #[tokio::test]
    async fn expired_entry_reads_as_not_cooling() {
        let registry = CooldownRegistry::new();
        registry.mark("key-a", Duration::ZERO).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(!registry.is_cooling("key-a").await);
        assert!(registry.remaining("key-a").await.is_none());
    }

    #[tokio::test]
    async fn remark_supersedes_stale_entry() {
        let registry = CooldownRegistry::new();
        registry.mark("key-a", Duration::ZERO).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!registry.is_cooling("key-a").await);

        registry.mark("key-a", Duration::from_secs(60)).await;
        assert!(registry.is_cooling("key-a").await);
    }
}
