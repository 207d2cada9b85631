//! Candidate attempt loop
//!
//! Flattens the selected pools into an ordered candidate sequence and tries
//! each candidate at most once, strictly one at a time. The first 2xx
//! response short-circuits the loop, so a request is charged against at most
//! one upstream credential. A 429 marks the credential as cooling down for
//! the configured window; every other failure only updates the last-error
//! diagnostic. There is no backoff and no per-candidate retry — a candidate
//! that failed for a non-429 reason is eligible again on the very next
//! incoming request.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::{FallbackPolicy, PoolCatalog, Slot};
use crate::cooldown::CooldownRegistry;
use crate::error::{Error, Result};

/// Groq OpenAI-compatible chat completion endpoint.
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Model requested when a slot does not name one.
pub const DEFAULT_UPSTREAM_MODEL: &str = "llama-3.1-8b-instant";

/// Cooldown window applied to a rate-limited credential.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// One entry of a chat conversation, forwarded to upstream as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A validated inbound request, ready for routing.
///
/// `mode` has already been derived from the client model string (provider
/// prefix stripped); `messages` is non-empty by the ingress validity check.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub mode: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Router tuning, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub policy: FallbackPolicy,
    pub cooldown_window: Duration,
    pub attempt_timeout: Duration,
    pub upstream_url: String,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            policy: FallbackPolicy::default(),
            cooldown_window: DEFAULT_COOLDOWN,
            attempt_timeout: Duration::from_secs(30),
            upstream_url: DEFAULT_UPSTREAM_URL.into(),
        }
    }
}

/// Body sent to the upstream chat completion endpoint.
#[derive(Debug, Serialize)]
struct UpstreamRequest {
    model: String,
    temperature: f64,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

/// Result of one candidate attempt.
enum AttemptOutcome {
    Success(Value),
    RateLimited,
    Failed(String),
}

/// Key/pool failover router. Owns its cooldown registry; the catalog is
/// immutable after construction.
pub struct Router {
    catalog: PoolCatalog,
    cooldowns: CooldownRegistry,
    settings: RouterSettings,
    client: reqwest::Client,
}

impl Router {
    pub fn new(catalog: PoolCatalog, settings: RouterSettings, client: reqwest::Client) -> Self {
        Self {
            catalog,
            cooldowns: CooldownRegistry::new(),
            settings,
            client,
        }
    }

    /// Route a request through the candidate loop.
    ///
    /// Returns the first successful upstream payload verbatim, or
    /// `Error::Exhausted` with the last recorded failure once every candidate
    /// has been skipped or has failed.
    pub async fn route(&self, request: &ChatRequest) -> Result<Value> {
        let pools = self.catalog.select(&request.mode, self.settings.policy);
        let mut last_error: Option<String> = None;

        for pool in pools {
            for slot in &pool.slots {
                let Some(credential) = slot.credential.as_ref().filter(|c| !c.is_empty()) else {
                    debug!(pool = %pool.mode, slot = %slot.name, "slot has no credential, skipping");
                    continue;
                };
                if self.cooldowns.is_cooling(credential.expose()).await {
                    debug!(pool = %pool.mode, slot = %slot.name, "credential cooling down, skipping");
                    continue;
                }

                match self.attempt(slot, credential.expose(), request).await {
                    AttemptOutcome::Success(payload) => {
                        info!(pool = %pool.mode, slot = %slot.name, "upstream request succeeded");
                        return Ok(payload);
                    }
                    AttemptOutcome::RateLimited => {
                        self.cooldowns
                            .mark(credential.expose(), self.settings.cooldown_window)
                            .await;
                        warn!(
                            pool = %pool.mode,
                            slot = %slot.name,
                            cooldown_secs = self.settings.cooldown_window.as_secs(),
                            "rate limited, credential entering cooldown"
                        );
                        last_error = Some(format!("Rate limited on key: {}", slot.name));
                    }
                    AttemptOutcome::Failed(detail) => {
                        warn!(pool = %pool.mode, slot = %slot.name, error = %detail, "upstream attempt failed");
                        last_error = Some(detail);
                    }
                }
            }
        }

        Err(Error::Exhausted {
            details: last_error,
        })
    }

    /// Issue one upstream call for a candidate. Exactly one attempt — a
    /// timeout or transport failure is recorded, never retried here.
    async fn attempt(
        &self,
        slot: &Slot,
        credential: &str,
        request: &ChatRequest,
    ) -> AttemptOutcome {
        let body = upstream_body(slot, request);

        let response = match self
            .client
            .post(&self.settings.upstream_url)
            .bearer_auth(credential)
            .timeout(self.settings.attempt_timeout)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return AttemptOutcome::Failed(format!(
                    "upstream timeout after {}s",
                    self.settings.attempt_timeout.as_secs()
                ));
            }
            Err(e) => return AttemptOutcome::Failed(format!("upstream error: {e}")),
        };

        let status = response.status();
        if status.is_success() {
            match response.json::<Value>().await {
                Ok(payload) => AttemptOutcome::Success(payload),
                Err(e) => AttemptOutcome::Failed(format!("malformed upstream response: {e}")),
            }
        } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            AttemptOutcome::RateLimited
        } else {
            match response.text().await {
                Ok(text) => AttemptOutcome::Failed(text),
                Err(e) => AttemptOutcome::Failed(format!("unreadable upstream response: {e}")),
            }
        }
    }

    /// Cooldown-state summary for the health endpoint.
    ///
    /// Slot status: `gapped` (no credential), `cooling_down` (with remaining
    /// seconds), or `available`. Overall: all slots available → healthy, some
    /// available → degraded, none → unhealthy.
    pub async fn health(&self) -> Value {
        let mut pools = Vec::new();
        let mut total = 0usize;
        let mut available = 0usize;
        let mut cooling = 0usize;
        let mut gapped = 0usize;

        for pool in self.catalog.pools() {
            let mut slots = Vec::new();
            for slot in &pool.slots {
                total += 1;
                let entry = if !slot.usable() {
                    gapped += 1;
                    serde_json::json!({"name": slot.name, "status": "gapped"})
                } else {
                    let credential = slot.credential.as_ref().map(|c| c.expose().as_str());
                    match self.cooldowns.remaining(credential.unwrap_or_default()).await {
                        Some(remaining) => {
                            cooling += 1;
                            serde_json::json!({
                                "name": slot.name,
                                "status": "cooling_down",
                                "cooldown_remaining_secs": remaining.as_secs(),
                            })
                        }
                        None => {
                            available += 1;
                            serde_json::json!({"name": slot.name, "status": "available"})
                        }
                    }
                };
                slots.push(entry);
            }
            pools.push(serde_json::json!({"mode": pool.mode, "slots": slots}));
        }

        let status = if available == total && total > 0 {
            "healthy"
        } else if available > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": status,
            "slots_total": total,
            "slots_available": available,
            "slots_cooling_down": cooling,
            "slots_gapped": gapped,
            "pools": pools,
        })
    }
}

/// Assemble the upstream body: slot system prompt first, then the client
/// conversation; slot overrides beat request values beat defaults.
fn upstream_body(slot: &Slot, request: &ChatRequest) -> UpstreamRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(ChatMessage {
        role: "system".into(),
        content: slot.system_prompt.clone(),
    });
    messages.extend(request.messages.iter().cloned());

    UpstreamRequest {
        model: slot.model.clone(),
        temperature: slot
            .temperature
            .or(request.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens: slot
            .max_tokens
            .or(request.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS),
        messages,
    }
}
