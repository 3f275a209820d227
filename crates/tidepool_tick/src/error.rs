//! # Tick Error Types

use thiserror::Error;

use crate::phase::PhaseKind;

/// Errors that can occur while managing tick subscriptions.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickError {
    /// Explicit position past the end of the subscriber list.
    #[error("invalid subscription order {order}: only {count} subscribers registered")]
    InvalidOrder {
        /// Requested position.
        order: usize,
        /// Subscribers registered at the time.
        count: usize,
    },

    /// Unsubscribe targeted a phase that has no dispatcher.
    #[error("you're trying to unsubscribe from {phase}, but its dispatcher is not initialized")]
    DispatcherNotInitialized {
        /// Phase that was targeted.
        phase: PhaseKind,
    },
}

/// Result type for tick operations.
pub type TickResult<T> = Result<T, TickError>;
