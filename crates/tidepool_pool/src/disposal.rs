//! # Time-Sliced Disposal
//!
//! Tearing down every pool at once can destroy thousands of instances in one frame.
//! `dispose_all` instead hands the detached pools to a `DisposalTask` that destroys
//! a bounded batch per step and waits `interval` of engine time between batches.
//!
//! ## State machine
//!
//! ```text
//! Cooling(wait) --interval elapsed--> Batch --pools left--> Cooling(interval)
//!                                          \--no pools----> Complete
//! ```
//!
//! Completion is observable from any thread through a `DisposalHandle`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::engine::EngineCore;
use crate::pool::Pool;
use crate::producer::Producer;

/// Pacing of time-sliced disposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisposalConfig {
    /// Instances destroyed per batch.
    pub batch_size: usize,
    /// Engine time between two batches.
    pub interval: Duration,
}

impl DisposalConfig {
    /// Default instances per batch.
    pub const DEFAULT_BATCH_SIZE: usize = 16;
    /// Default delay between batches.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);
}

impl Default for DisposalConfig {
    fn default() -> Self {
        Self {
            batch_size: Self::DEFAULT_BATCH_SIZE,
            interval: Self::DEFAULT_INTERVAL,
        }
    }
}

#[derive(Debug, Default)]
struct DisposalState {
    complete: AtomicBool,
    destroyed: AtomicUsize,
}

/// Completion signal of a `dispose_all` call.
#[derive(Clone, Debug)]
pub struct DisposalHandle {
    state: Arc<DisposalState>,
}

impl DisposalHandle {
    /// Returns true once every pool has been emptied and released.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.complete.load(Ordering::Acquire)
    }

    /// Instances destroyed so far.
    #[must_use]
    pub fn destroyed(&self) -> usize {
        self.state.destroyed.load(Ordering::Acquire)
    }
}

pub(crate) struct DisposalTask<P: Producer> {
    pools: VecDeque<Arc<Pool<P>>>,
    config: DisposalConfig,
    cooldown: Duration,
    state: Arc<DisposalState>,
}

impl<P: Producer> DisposalTask<P> {
    pub(crate) fn new(pools: VecDeque<Arc<Pool<P>>>, config: DisposalConfig) -> Self {
        let task = Self {
            pools,
            config,
            cooldown: Duration::ZERO,
            state: Arc::new(DisposalState::default()),
        };
        if task.pools.is_empty() {
            task.state.complete.store(true, Ordering::Release);
        }
        task
    }

    pub(crate) fn handle(&self) -> DisposalHandle {
        DisposalHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.state.complete.load(Ordering::Acquire)
    }

    /// Advances the task by `dt`. Returns true once complete.
    pub(crate) fn step(&mut self, core: &EngineCore<P>, dt: Duration) -> bool {
        if self.is_complete() {
            return true;
        }

        self.cooldown = self.cooldown.saturating_sub(dt);
        if !self.cooldown.is_zero() {
            return false;
        }

        self.run_batch(core);
        if self.pools.is_empty() {
            self.state.complete.store(true, Ordering::Release);
            info!(
                kind = P::KIND,
                destroyed = self.state.destroyed.load(Ordering::Acquire),
                "Disposal complete"
            );
            return true;
        }

        self.cooldown = self.config.interval;
        false
    }

    /// Runs every remaining batch back to back.
    pub(crate) fn finish(&mut self, core: &EngineCore<P>) {
        while !self.is_complete() {
            self.cooldown = Duration::ZERO;
            self.step(core, Duration::ZERO);
        }
    }

    fn run_batch(&mut self, core: &EngineCore<P>) {
        let mut budget = self.config.batch_size.max(1);
        while let Some(pool) = self.pools.front() {
            if budget == 0 {
                // Out of budget; only drained pools may still be let go.
                if !pool.is_empty() {
                    break;
                }
            } else if let Some(instance) = pool.pop() {
                core.destroy(instance);
                self.state.destroyed.fetch_add(1, Ordering::AcqRel);
                budget -= 1;
                continue;
            }

            core.producer().release_template(pool.template());
            debug!(pool = pool.name(), kind = P::KIND, "Pool disposed");
            self.pools.pop_front();
        }
    }
}
