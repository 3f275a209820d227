//! # Asset Producer
//!
//! Adapts a host whose instantiation completes later, on any thread.
//!
//! ## Tokio
//!
//! Hosts built on tokio do not need to touch `Pending` directly:
//! `spawn_instantiation` runs a future on a runtime handle and exposes its
//! output as a `PendingInstance`.

use std::future::Future;

use tidepool_core::Pending;
use tracing::debug;

use crate::error::HostError;
use crate::producer::{InstanceId, PendingInstance, Producer, Production};

/// A host that builds instances asynchronously.
pub trait InstantiateAsync: Send + Sync + 'static {
    /// Loadable asset reference.
    type Asset: Send + Sync + 'static;
    /// Host object.
    type Instance: Send + 'static;
    /// Host parent handle.
    type Parent: Clone + Send + Sync + 'static;

    /// Starts instantiating `asset` under `parent`.
    fn instantiate_async(
        &self,
        asset: &Self::Asset,
        parent: &Self::Parent,
    ) -> PendingInstance<Self::Instance>;

    /// Shows or hides an instance.
    fn set_active(&self, instance: &mut Self::Instance, active: bool);

    /// Attaches an instance to `parent`.
    fn set_parent(&self, instance: &mut Self::Instance, parent: &Self::Parent);

    /// Destroys an instance.
    fn destroy(&self, instance: Self::Instance);

    /// Drops the host's handle on a loaded asset.
    fn release_asset(&self, asset: &Self::Asset);

    /// Scene root used when a pool names no parent.
    fn root(&self) -> Self::Parent;

    /// Optional identity for ownership diagnostics.
    fn identity(&self, instance: &Self::Instance) -> Option<InstanceId> {
        let _ = instance;
        None
    }
}

/// `Producer` over an asynchronous host.
#[derive(Debug, Default)]
pub struct AssetProducer<H> {
    host: H,
}

impl<H: InstantiateAsync> AssetProducer<H> {
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

impl<H: InstantiateAsync> Producer for AssetProducer<H> {
    type Template = H::Asset;
    type Instance = H::Instance;
    type Context = H::Parent;

    const KIND: &'static str = "asset";

    fn produce(
        &self,
        template: &Self::Template,
        parent: &Self::Context,
    ) -> Result<Production<Self::Instance>, HostError> {
        Ok(Production::Pending(
            self.host.instantiate_async(template, parent),
        ))
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

    fn release_template(&self, template: &Self::Template) {
        self.host.release_asset(template);
    }

    fn root_context(&self) -> Self::Context {
        self.host.root()
    }

    fn identity(&self, instance: &Self::Instance) -> Option<InstanceId> {
        self.host.identity(instance)
    }
}

/// Runs an instantiation future on `handle` and returns its pending result.
///
/// ```rust,ignore
/// fn instantiate_async(&self, asset: &String, _: &()) -> PendingInstance<Sprite> {
///     let path = asset.clone();
///     spawn_instantiation(&self.runtime, async move { Sprite::load(&path).await })
/// }
/// ```
pub fn spawn_instantiation<I, F>(handle: &tokio::runtime::Handle, future: F) -> PendingInstance<I>
where
    I: Send + 'static,
    F: Future<Output = Result<I, HostError>> + Send + 'static,
{
    let (pending, completer) = Pending::channel();
    handle.spawn(async move {
        let outcome = future.await;
        if completer.complete(outcome).is_err() {
            debug!("Instantiation finished after its requester went away");
        }
    });
    pending
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_instantiation_resolves() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();

        let pending = spawn_instantiation(runtime.handle(), async {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            Ok::<_, HostError>(17_u32)
        });

        assert_eq!(pending.wait().unwrap().unwrap(), 17);
    }

    #[test]
    fn test_spawn_instantiation_forwards_failure() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();

        let pending = spawn_instantiation::<u32, _>(runtime.handle(), async {
            Err(HostError::new("bundle missing"))
        });

        let err = pending.wait().unwrap().unwrap_err();
        assert_eq!(err.message(), "bundle missing");
    }
}
