//! Error types for revenue fund core primitives

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the ledger primitives
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Range query or span with `low > up`
    #[error("Invalid range: low {low} exceeds up {up}")]
    InvalidRange { low: u64, up: u64 },

    /// Malformed hex address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let msg = format!("{}", CoreError::InvalidRange { low: 3, up: 1 });
        assert!(msg.contains("low 3 exceeds up 1"));
    }
}
