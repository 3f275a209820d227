//! # TIDEPOOL Tick
//!
//! Ordered per-tick update dispatch.
//!
//! Components register callbacks for a tick phase; the host calls `dispatch` once
//! per phase per frame and every subscriber runs, in order, exactly once.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut update = Dispatcher::<UpdatePhase>::new();
//! let a = update.subscribe_fn(|ctx| println!("A at tick {}", ctx.tick()));
//! update.subscribe_fn(|_| println!("B"));
//! update.subscribe_at_fn(|_| println!("C"), 1)?;   // A, C, B
//!
//! update.dispatch(Frame::new(1, Duration::from_millis(16)));
//! update.unsubscribe(a);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod dispatcher;
pub mod error;
pub mod phase;

pub use dispatcher::{Dispatcher, DispatcherState, SubscriptionId, TickContext};
pub use error::{TickError, TickResult};
pub use phase::{FixedPhase, Frame, LatePhase, PhaseKind, Subscriber, TickPhase, UpdatePhase};
