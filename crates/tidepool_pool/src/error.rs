//! # Pool Error Types
//!
//! All errors that can surface from a pool engine.

use std::error::Error as StdError;

use thiserror::Error;

/// Failure reported by a host's instantiation primitive.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HostError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HostError {
    /// Creates a host error with a message only.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a host error wrapping an underlying cause.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors that can occur in a pool engine.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The named pool is not registered with the engine.
    #[error("you're trying to {action} on pool `{pool}` that doesn't exist")]
    PoolNotFound {
        /// Name that was looked up.
        pool: String,
        /// What the caller was attempting.
        action: &'static str,
    },

    /// The host failed to produce an instance. Never retried.
    #[error("instance creation failed for pool `{pool}`: {source}")]
    InstanceCreationFailed {
        /// Pool the instance was requested for.
        pool: String,
        /// Underlying host failure.
        #[source]
        source: HostError,
    },
}

impl PoolError {
    pub(crate) fn not_found(pool: &str, action: &'static str) -> Self {
        Self::PoolNotFound {
            pool: pool.to_owned(),
            action,
        }
    }

    pub(crate) fn creation_failed(pool: &str, source: HostError) -> Self {
        Self::InstanceCreationFailed {
            pool: pool.to_owned(),
            source,
        }
    }
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
