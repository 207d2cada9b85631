//! Key/pool failover routing for the Ventora chat gateway
//!
//! A request names a mode (general, research, study); the catalog maps each
//! mode to an ordered pool of credential slots. The router flattens the
//! selected pools into one ordered candidate list and tries candidates
//! sequentially: gapped slots and cooling-down credentials are skipped, a 429
//! puts the credential into a fixed cooldown window, any other failure is
//! recorded and the loop moves on. The first 2xx response wins and is
//! returned verbatim; running out of candidates yields `Error::Exhausted`
//! carrying the last recorded failure for diagnostics.
//!
//! Candidate lifecycle per request:
//! 1. Catalog selects pools for the requested mode (matched pool first,
//!    then the rest in declaration order, or matched-only per policy)
//! 2. Each slot is attempted at most once, strictly one at a time
//! 3. 429 → credential `CoolingDown` for the cooldown window, continue
//! 4. Other failure → last error updated, continue (no per-candidate memory)
//! 5. 2xx → short-circuit with the upstream payload

pub mod catalog;
pub mod cooldown;
pub mod error;
pub mod router;

pub use catalog::{FallbackPolicy, GENERAL_MODE, Pool, PoolCatalog, Slot, request_mode};
pub use cooldown::CooldownRegistry;
pub use error::{Error, Result};
pub use router::{
    ChatMessage, ChatRequest, DEFAULT_COOLDOWN, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
    DEFAULT_UPSTREAM_MODEL, DEFAULT_UPSTREAM_URL, Router, RouterSettings,
};
