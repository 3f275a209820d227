//! # TIDEPOOL Pool
//!
//! Recycling engine for short-lived objects.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────── PoolEngine<P> ─────────────────────┐
//! │  "bullets" ─► Pool { template, parent, [available], hooks }
//! │  "shells"  ─► Pool { ... }                             │
//! │                                                        │
//! │  deferred releases ── advance(dt) ──► return chain     │
//! │  disposal tasks    ── advance(dt) ──► batch destroy    │
//! │  completions  ◄── crossbeam queue ◄── host threads     │
//! └──────────────────────────┬─────────────────────────────┘
//!                            │ Producer
//!        PrefabProducer / AssetProducer / ObjectProducer
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut engine = PoolEngine::new(PrefabProducer::new(scene));
//! engine.create_pool(PoolArgs::new("bullets", 32, bullet_prefab))?;
//!
//! let bullet = engine.acquire("bullets")?;
//! engine.release_after("bullets", bullet, Duration::from_secs(2))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod asset;
pub mod disposal;
pub mod engine;
pub mod error;
pub mod hooks;
mod ledger;
pub mod object;
pub mod pool;
pub mod prefab;
pub mod producer;

pub use asset::{spawn_instantiation, AssetProducer, InstantiateAsync};
pub use disposal::{DisposalConfig, DisposalHandle};
pub use engine::{EngineStats, PoolEngine};
pub use error::{HostError, PoolError, PoolResult};
pub use hooks::{Hook, HookChain};
pub use object::{AsAny, ObjectProducer, PoolObject};
pub use pool::{Pool, PoolArgs};
pub use prefab::{Instantiate, PrefabProducer};
pub use producer::{Acquisition, InstanceId, PendingInstance, Producer, Production};
