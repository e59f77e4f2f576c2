//! error - typed failure kinds carried inside `anyhow::Error`.
//!
//! Library functions return `anyhow::Result`; callers that need to tell a recoverable
//! condition (full registry, duplicate name) from a fatal one downcast:
//!
//!   if let Some(k) = err.downcast_ref::<PageCryptError>() { if k.is_fatal() { ... } }

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PageCryptError {
    /// Invalid block size / reserved setting / context wiring. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Persisted layout file is malformed or internally inconsistent.
    #[error("page feature layout corrupted ({path}): {reason}")]
    LayoutCorruption { path: String, reason: String },

    /// Registry has no byte or slot capacity left for the requested feature.
    #[error("page feature set '{registry}' is full: need {need} bytes, {free_bytes} bytes / {free_slots} slots free")]
    CapacityExceeded {
        registry: String,
        need: usize,
        free_bytes: usize,
        free_slots: usize,
    },

    #[error("page feature '{0}' already exists")]
    DuplicateFeature(String),

    /// Built-in feature requested on a registry that is already locked.
    #[error("cannot add built-in page feature '{0}' to a locked feature set")]
    BuiltinLocked(String),

    #[error("page feature '{0}' has zero size")]
    ZeroSize(String),

    #[error("invalid page feature name '{0}'")]
    InvalidName(String),

    /// Primitive failure or tag mismatch. Treated as tamper/corruption evidence.
    #[error("cipher failure: {0}")]
    CipherFailure(String),
}

impl PageCryptError {
    /// Fatal kinds must never be downgraded to a warning by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PageCryptError::Configuration(_)
                | PageCryptError::LayoutCorruption { .. }
                | PageCryptError::CipherFailure(_)
        )
    }

    pub(crate) fn corruption(path: impl Into<String>, reason: impl Into<String>) -> Self {
        PageCryptError::LayoutCorruption {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Kind of an `anyhow::Error`, if it carries one.
pub fn error_kind(err: &anyhow::Error) -> Option<&PageCryptError> {
    err.downcast_ref::<PageCryptError>()
}
