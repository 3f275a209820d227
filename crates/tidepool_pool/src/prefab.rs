//! # Prefab Producer
//!
//! Adapts a host's synchronous instantiation primitive.

use crate::error::HostError;
use crate::producer::{InstanceId, Producer, Production};

/// A host that can build instances immediately.
pub trait Instantiate: Send + Sync + 'static {
    /// Descriptor instances are cloned from.
    type Template: Send + Sync + 'static;
    /// Host object.
    type Instance: Send + 'static;
    /// Host parent handle.
    type Parent: Clone + Send + Sync + 'static;

    /// Builds one instance under `parent`.
    ///
    /// # Errors
    ///
    /// Returns the host failure verbatim.
    fn instantiate(
        &self,
        template: &Self::Template,
        parent: &Self::Parent,
    ) -> Result<Self::Instance, HostError>;

    /// Shows or hides an instance.
    fn set_active(&self, instance: &mut Self::Instance, active: bool);

    /// Attaches an instance to `parent`.
    fn set_parent(&self, instance: &mut Self::Instance, parent: &Self::Parent);

    /// Destroys an instance.
    fn destroy(&self, instance: Self::Instance);

    /// Scene root used when a pool names no parent.
    fn root(&self) -> Self::Parent;

    /// Optional identity for ownership diagnostics.
    fn identity(&self, instance: &Self::Instance) -> Option<InstanceId> {
        let _ = instance;
        None
    }
}

/// `Producer` over a synchronous host.
#[derive(Debug, Default)]
pub struct PrefabProducer<H> {
    host: H,
}

impl<H: Instantiate> PrefabProducer<H> {
    /// Wraps a host.
    #[must_use]
    pub const fn new(host: H) -> Self {
        Self { host }
    }

    /// The wrapped host.
    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }
}

impl<H: Instantiate> Producer for PrefabProducer<H> {
    type Template = H::Template;
    type Instance = H::Instance;
    type Context = H::Parent;

    const KIND: &'static str = "prefab";

    fn produce(
        &self,
        template: &Self::Template,
        parent: &Self::Context,
    ) -> Result<Production<Self::Instance>, HostError> {
        self.host.instantiate(template, parent).map(Production::Ready)
    }

    #[inline]
    fn set_active(&self, instance: &mut Self::Instance, active: bool) {
        self.host.set_active(instance, active);
    }

    fn on_return(&self, instance: &mut Self::Instance, parent: &Self::Context) {
        self.host.set_active(instance, false);
        self.host.set_parent(instance, parent);
    }

    fn destroy(&self, instance: Self::Instance) {
        self.host.destroy(instance);
    }

    fn root_context(&self) -> Self::Context {
        self.host.root()
    }

    fn identity(&self, instance: &Self::Instance) -> Option<InstanceId> {
        self.host.identity(instance)
    }
}
