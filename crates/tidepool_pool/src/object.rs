//! # Poolable Objects
//!
//! Pools of plain Rust objects that know how to clone themselves, reset on return
//! and dispose. No host is involved: the template is a prototype object and every
//! instance comes from its `factory`.

use std::any::Any;

use crate::error::HostError;
use crate::producer::{InstanceId, Producer, Production};

/// Upcast helper so boxed pool objects can be downcast to their concrete type.
pub trait AsAny: Any {
    /// `&self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// `&mut self` as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// An object that can live in an object pool.
pub trait PoolObject: AsAny + Send + Sync {
    /// Builds a fresh instance from this prototype.
    fn factory(&self) -> Box<dyn PoolObject>;

    /// Resets state when the object goes back to its pool.
    fn on_pool_return(&mut self) {}

    /// Activation toggle. Most plain objects ignore it.
    fn set_active(&mut self, active: bool) {
        let _ = active;
    }

    /// Final teardown.
    fn dispose(self: Box<Self>) {}

    /// Optional identity for ownership diagnostics.
    fn identity(&self) -> Option<InstanceId> {
        None
    }
}

impl dyn PoolObject {
    /// Borrows the concrete object.
    #[must_use]
    pub fn downcast_ref<T: PoolObject>(&self) -> Option<&T> {
        AsAny::as_any(self).downcast_ref::<T>()
    }

    /// Mutably borrows the concrete object.
    #[must_use]
    pub fn downcast_mut<T: PoolObject>(&mut self) -> Option<&mut T> {
        AsAny::as_any_mut(self).downcast_mut::<T>()
    }
}

impl std::fmt::Debug for dyn PoolObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolObject")
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

/// `Producer` for `PoolObject` prototypes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjectProducer;

impl Producer for ObjectProducer {
    type Template = Box<dyn PoolObject>;
    type Instance = Box<dyn PoolObject>;
    type Context = ();

    const KIND: &'static str = "object";

    fn produce(
        &self,
        template: &Self::Template,
        _parent: &Self::Context,
    ) -> Result<Production<Self::Instance>, HostError> {
        Ok(Production::Ready(template.factory()))
    }

    fn set_active(&self, instance: &mut Self::Instance, active: bool) {
        instance.set_active(active);
    }

    fn on_return(&self, instance: &mut Self::Instance, _parent: &Self::Context) {
        instance.set_active(false);
        instance.on_pool_return();
    }

    fn destroy(&self, instance: Self::Instance) {
        instance.dispose();
    }

    fn root_context(&self) -> Self::Context {}

    fn identity(&self, instance: &Self::Instance) -> Option<InstanceId> {
        instance.identity()
    }
}
