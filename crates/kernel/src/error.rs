//! Error classes raised by the neighbor search kernel.
//!
//! Every variant is fatal for the current step only. The caller decides
//! whether to retry the step, abort the run or degrade.

/// Errors produced while configuring or executing a search step.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Invalid boundary, tree or search parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An identity/index mismatch, a stale step or a tree queried against
    /// a sequence it was not built from.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    /// A buffer would have to grow or move while a tree depends on it.
    #[error("capacity error: {0}")]
    Capacity(String),
}

/// Convenience alias used across the kernel.
pub type Result<T> = std::result::Result<T, KernelError>;

impl KernelError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn consistency(msg: impl Into<String>) -> Self {
        Self::ConsistencyViolation(msg.into())
    }

    pub(crate) fn capacity(msg: impl Into<String>) -> Self {
        Self::Capacity(msg.into())
    }
}
