//! # Pool
//!
//! A single named pool: template, parent context, available stack and hook chains.
//!
//! ## Thread Safety
//!
//! Asynchronous completions push into the available stack from whatever thread the
//! host completes on, so the stack sits behind a mutex. The `retired` flag lives
//! under the same lock: once a pool is retired, pushes are refused and the caller
//! destroys the instance instead.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::hooks::{Hook, HookChain};
use crate::producer::Producer;

/// Arguments for `PoolEngine::create_pool`.
///
/// ```rust,ignore
/// let args = PoolArgs::new("bullets", 32, bullet_prefab)
///     .with_parent(projectiles)
///     .on_return(|bullet| bullet.velocity = Vec3::ZERO);
/// ```
pub struct PoolArgs<P: Producer> {
    pub(crate) name: String,
    pub(crate) amount: usize,
    pub(crate) template: P::Template,
    pub(crate) parent: Option<P::Context>,
    pub(crate) on_return: Vec<Hook<P::Instance>>,
    pub(crate) on_factory: Vec<Hook<P::Instance>>,
}

impl<P: Producer> PoolArgs<P> {
    /// Pool `name` warmed with `amount` instances of `template`.
    pub fn new(name: impl Into<String>, amount: usize, template: P::Template) -> Self {
        Self {
            name: name.into(),
            amount,
            template,
            parent: None,
            on_return: Vec::new(),
            on_factory: Vec::new(),
        }
    }

    /// Parent context for idle instances. Defaults to the producer's root.
    #[must_use]
    pub fn with_parent(mut self, parent: P::Context) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Appends a return hook.
    #[must_use]
    pub fn on_return(mut self, hook: impl Fn(&mut P::Instance) + Send + Sync + 'static) -> Self {
        self.on_return.push(Arc::new(hook));
        self
    }

    /// Appends a factory hook.
    #[must_use]
    pub fn on_factory(mut self, hook: impl Fn(&mut P::Instance) + Send + Sync + 'static) -> Self {
        self.on_factory.push(Arc::new(hook));
        self
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of instances created up front.
    #[must_use]
    pub const fn amount(&self) -> usize {
        self.amount
    }
}

impl<P: Producer> std::fmt::Debug for PoolArgs<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolArgs")
            .field("name", &self.name)
            .field("amount", &self.amount)
            .field("on_return", &self.on_return.len())
            .field("on_factory", &self.on_factory.len())
            .finish_non_exhaustive()
    }
}

struct Stack<I> {
    items: Vec<I>,
    retired: bool,
}

/// A named pool of interchangeable instances.
pub struct Pool<P: Producer> {
    name: Arc<str>,
    template: P::Template,
    parent: P::Context,
    available: Mutex<Stack<P::Instance>>,
    on_return: RwLock<HookChain<P::Instance>>,
    on_factory: RwLock<HookChain<P::Instance>>,
}

impl<P: Producer> Pool<P> {
    pub(crate) fn new(
        name: &str,
        template: P::Template,
        parent: P::Context,
        on_return: Vec<Hook<P::Instance>>,
        on_factory: Vec<Hook<P::Instance>>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            template,
            parent,
            available: Mutex::new(Stack {
                items: Vec::new(),
                retired: false,
            }),
            on_return: RwLock::new(on_return.into()),
            on_factory: RwLock::new(on_factory.into()),
        }
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Template instances are produced from.
    #[must_use]
    pub fn template(&self) -> &P::Template {
        &self.template
    }

    /// Parent context idle instances are attached to.
    #[must_use]
    pub fn parent(&self) -> &P::Context {
        &self.parent
    }

    /// Number of available instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.available.lock().items.len()
    }

    /// Returns true if nothing is available.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.available.lock().items.is_empty()
    }

    /// Returns true once the pool has been removed from its engine.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.available.lock().retired
    }

    /// Visits the available stack, bottom to top, without popping.
    ///
    /// The stack stays locked during the visit.
    pub fn for_each_available(&self, mut visit: impl FnMut(&P::Instance)) {
        let stack = self.available.lock();
        for instance in &stack.items {
            visit(instance);
        }
    }

    pub(crate) fn pop(&self) -> Option<P::Instance> {
        self.available.lock().items.pop()
    }

    /// Pushes onto the available stack. Hands the instance back if the pool is retired.
    pub(crate) fn push(&self, instance: P::Instance) -> Result<(), P::Instance> {
        let mut stack = self.available.lock();
        if stack.retired {
            return Err(instance);
        }
        stack.items.push(instance);
        Ok(())
    }

    pub(crate) fn retire(&self) {
        self.available.lock().retired = true;
    }

    pub(crate) fn drain(&self) -> Vec<P::Instance> {
        std::mem::take(&mut self.available.lock().items)
    }

    pub(crate) fn run_return_hooks(&self, instance: &mut P::Instance) {
        // Run on a snapshot so a hook may edit the chain.
        let chain = self.on_return.read().clone();
        chain.run(instance);
    }

    pub(crate) fn run_factory_hooks(&self, instance: &mut P::Instance) {
        let chain = self.on_factory.read().clone();
        chain.run(instance);
    }

    pub(crate) fn add_return_hook(&self, hook: Hook<P::Instance>) {
        self.on_return.write().push(hook);
    }

    pub(crate) fn reset_return_hooks(&self) {
        self.on_return.write().clear();
    }

    pub(crate) fn add_factory_hook(&self, hook: Hook<P::Instance>) {
        self.on_factory.write().push(hook);
    }

    pub(crate) fn reset_factory_hooks(&self) {
        self.on_factory.write().clear();
    }
}

impl<P: Producer> std::fmt::Debug for Pool<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("available", &self.len())
            .field("retired", &self.is_retired())
            .finish_non_exhaustive()
    }
}
