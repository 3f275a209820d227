//! # Producer Seam
//!
//! The engine never instantiates anything itself. A `Producer` is the single seam
//! between a pool engine and its host: it produces instances from a template,
//! toggles them active, reparents them on return and destroys them.
//!
//! ## Design
//!
//! Three producers ship with this crate and cover the three engine flavors:
//!
//! | producer | host trait | production |
//! |---|---|---|
//! | `PrefabProducer` | `Instantiate` | always ready |
//! | `AssetProducer` | `InstantiateAsync` | always pending |
//! | `ObjectProducer` | `PoolObject` | always ready |
//!
//! Hosts may implement `Producer` directly when none of these fit.

use tidepool_core::Pending;

use crate::error::{HostError, PoolError};

/// Stable identity of an instance, used by debug-build ownership diagnostics.
pub type InstanceId = u64;

/// An instance the host is still producing.
pub type PendingInstance<I> = Pending<Result<I, HostError>>;

/// An acquisition that resolves once its instance is available and activated.
pub type Acquisition<I> = Pending<Result<I, PoolError>>;

/// Outcome of asking a producer for a new instance.
#[derive(Debug)]
pub enum Production<I> {
    /// The instance exists now.
    Ready(I),
    /// The instance will be delivered later, possibly on another thread.
    Pending(PendingInstance<I>),
}

/// Host seam used by a pool engine.
pub trait Producer: Send + Sync + 'static {
    /// Descriptor instances are produced from.
    type Template: Send + Sync + 'static;
    /// Pooled object.
    type Instance: Send + 'static;
    /// Parent context an instance is attached to while it sits in a pool.
    type Context: Clone + Send + Sync + 'static;

    /// Short label used in logs.
    const KIND: &'static str;

    /// Starts producing one instance.
    ///
    /// # Errors
    ///
    /// Returns the host failure when production cannot even start.
    fn produce(
        &self,
        template: &Self::Template,
        parent: &Self::Context,
    ) -> Result<Production<Self::Instance>, HostError>;

    /// Activates or deactivates an instance.
    fn set_active(&self, instance: &mut Self::Instance, active: bool);

    /// Built-in return behavior. Runs before any user return hook.
    fn on_return(&self, instance: &mut Self::Instance, parent: &Self::Context) {
        let _ = parent;
        self.set_active(instance, false);
    }

    /// Destroys an instance for good.
    fn destroy(&self, instance: Self::Instance);

    /// Releases whatever the host holds for a template once its pool is removed.
    fn release_template(&self, template: &Self::Template) {
        let _ = template;
    }

    /// Parent used by pools created without one.
    fn root_context(&self) -> Self::Context;

    /// Identity used by ownership diagnostics. `None` opts the instance out.
    fn identity(&self, instance: &Self::Instance) -> Option<InstanceId> {
        let _ = instance;
        None
    }
}
