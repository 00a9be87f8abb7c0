//! Error definitions for the Vela VM.
//!
//! Memory-manager failures are fatal by design: the managed program never
//! observes them. The VM reports the condition on standard error and exits
//! with a non-zero status. These variants exist so the exit path carries a
//! typed reason rather than a bare string.

use thiserror::Error;

/// Result type for fallible VM operations.
pub type VmResult<T> = Result<T, VmError>;

/// Fatal VM error conditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// An allocation was requested with an invalid size.
    #[error("invalid allocation size: {size}")]
    InvalidAllocationSize {
        /// The rejected size.
        size: i64,
    },

    /// An allocation was requested with an unknown element type tag.
    #[error("invalid memory allocation")]
    InvalidAllocationType,

    /// A class id did not resolve against the loaded program.
    #[error("unknown class id: {id}")]
    UnknownClass {
        /// The unresolved id.
        id: i64,
    },

    /// A collector worker thread could not be created or joined.
    #[error("unable to {action} garbage collection thread")]
    CollectorThread {
        /// What failed: "create" or "join".
        action: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = VmError::InvalidAllocationSize { size: -4 };
        assert_eq!(err.to_string(), "invalid allocation size: -4");

        let err = VmError::CollectorThread { action: "create" };
        assert_eq!(err.to_string(), "unable to create garbage collection thread");
    }
}
