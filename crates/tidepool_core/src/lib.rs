//! # TIDEPOOL Core
//!
//! Primitives shared by the pool engine, the tick dispatcher and the coordinator:
//! - `Maybe<T>` - null-free carrier for lookups that may legitimately find nothing
//! - `Singleton<T>` / `Locator` - create-or-find access to process-wide managers
//! - `Pending<T>` / `Completer<T>` - one-shot completion usable by blocking waits,
//!   `.await`, and completion callbacks alike
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidepool_core::{Locator, Maybe, Pending};
//!
//! let locator = Locator::new();
//! let audio = locator.instance::<AudioManager>();
//!
//! let (pending, completer) = Pending::channel();
//! std::thread::spawn(move || completer.complete(42));
//! assert_eq!(pending.wait(), Ok(42));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod maybe;
pub mod pending;
pub mod singleton;

pub use maybe::{Maybe, Nullable};
pub use pending::{Completer, CompleterDropped, Pending};
pub use singleton::{Locator, Service, Singleton};
