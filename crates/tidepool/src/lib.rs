//! # TIDEPOOL
//!
//! Reusable object pools and ordered per-tick dispatch for game hosts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────── Coordinator<H: Host> ────────────────────────┐
//! │                                                                      │
//! │  prefabs() ─► PoolEngine<H::Prefabs>    (sync instantiate)           │
//! │  assets()  ─► PoolEngine<H::Assets>     (async instantiate)          │
//! │  objects() ─► PoolEngine<ObjectProducer> (PoolObject prototypes)     │
//! │                                                                      │
//! │  PhaseSet  ─► Dispatcher<UpdatePhase> / <LatePhase> / <FixedPhase>   │
//! │                                                                      │
//! └──────────── tick_update / tick_late / tick_fixed ◄── host scheduler ─┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut tidepool = Coordinator::new(host);
//! tidepool.load_manifest(&PoolManifest::from_file("pools.toml")?)?;
//!
//! tidepool.on_update(|ctx| {
//!     tracing::trace!(tick = ctx.tick(), "spawner");
//! });
//!
//! loop {
//!     tidepool.tick_update(dt);
//!     tidepool.tick_late(dt);
//! }
//! ```
//!
//! The building blocks live in their own crates: `tidepool_core` (`Maybe`,
//! `Singleton`, `Pending`, re-exported at the root), `tidepool_pool` (as `pool`)
//! and `tidepool_tick` (as `tick`).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod coordinator;
pub mod error;
pub mod host;
pub mod logging;
pub mod manifest;

pub use coordinator::{
    AssetEngine, Coordinator, CoordinatorConfig, ObjectEngine, PhaseSet, PhaseSlot, PrefabEngine,
    Subscription,
};
pub use error::{ManifestError, TidepoolError, TidepoolResult};
pub use host::{AssetParent, AssetTemplate, Host, PrefabParent, PrefabTemplate};
pub use manifest::{DisposalSettings, LoggingSettings, PoolEntry, PoolManifest};

pub use tidepool_core::{Completer, Locator, Maybe, Pending, Service, Singleton};
pub use tidepool_pool as pool;
pub use tidepool_tick as tick;
