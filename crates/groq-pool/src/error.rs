//! Error types for catalog and routing operations

/// Errors from catalog construction and request routing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Every candidate was gapped, cooling down, or failed. `details` carries
    /// the last recorded upstream failure, if any attempt got that far.
    #[error("all candidates exhausted")]
    Exhausted { details: Option<String> },
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_error_display_includes_detail() {
        let err = Error::Catalog("no 'general' pool configured".into());
        assert_eq!(
            err.to_string(),
            "catalog error: no 'general' pool configured"
        );
    }

    #[test]
    fn exhausted_error_keeps_details_accessible() {
        let err = Error::Exhausted {
            details: Some("Rate limited on key: backup".into()),
        };
        assert_eq!(err.to_string(), "all candidates exhausted");
        match err {
            Error::Exhausted { details } => {
                assert_eq!(details.as_deref(), Some("Rate limited on key: backup"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
