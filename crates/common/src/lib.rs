//! Shared types for the Ventora chat gateway

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
