//! # Pool Engine
//!
//! Owns a registry of named pools backed by one `Producer`.
//!
//! ## Acquisition flavors
//!
//! | call | pool has instances | pool is empty |
//! |---|---|---|
//! | `acquire` | pop + activate | create now; blocks on an async producer |
//! | `try_acquire` | pop + activate | empty `Maybe` |
//! | `acquire_async` | resolved `Acquisition` | `Acquisition` resolved on completion |
//! | `acquire_with` | callback runs inline | callback runs on the tick thread |
//!
//! ## Engine clock
//!
//! The engine has no thread of its own. `advance(dt)` is called once per tick and
//! drives delayed releases, disposal batches and delivery of completed callback
//! acquisitions. Completions from host threads are marshalled through a
//! `crossbeam-channel` queue so callbacks always run on the ticking thread.
//!
//! A completion that can no longer be delivered never leaks: `dispose_all_now`
//! destroys whatever is queued, and once an engine is dropped its queue is shut
//! and late arrivals are destroyed on the host thread without running the
//! callback.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use tidepool_core::{CompleterDropped, Maybe, Pending};
use tracing::{debug, error, info, warn};

use crate::disposal::{DisposalConfig, DisposalHandle, DisposalTask};
use crate::error::{HostError, PoolError, PoolResult};
use crate::hooks::Hook;
use crate::ledger::OwnershipLedger;
use crate::pool::{Pool, PoolArgs};
use crate::producer::{Acquisition, Producer, Production};

/// A finished callback acquisition waiting for the ticking thread.
struct Delivery<I> {
    result: PoolResult<I>,
    callback: Box<dyn FnOnce(PoolResult<I>) + Send>,
}

impl<I> Delivery<I> {
    fn run(self) {
        (self.callback)(self.result);
    }
}

/// Counters describing an engine's lifetime activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Registered pools.
    pub pools: usize,
    /// Instances produced (warm-up and on demand).
    pub created: u64,
    /// Instances handed to callers.
    pub acquired: u64,
    /// Instances returned through the return chain.
    pub released: u64,
    /// Instances destroyed.
    pub destroyed: u64,
    /// Delayed releases not yet due.
    pub pending_releases: usize,
    /// Host instantiations the engine is still waiting on.
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
    destroyed: AtomicU64,
}

/// State shared with completion callbacks running on host threads.
pub(crate) struct EngineCore<P: Producer> {
    producer: P,
    ledger: OwnershipLedger,
    counters: Counters,
    deliveries: Sender<Delivery<P::Instance>>,
    /// Cleared when the engine is dropped; the receiver goes with it.
    accepting: RwLock<bool>,
    in_flight: AtomicUsize,
}

impl<P: Producer> EngineCore<P> {
    pub(crate) fn producer(&self) -> &P {
        &self.producer
    }

    /// Runs the factory chain on a fresh instance.
    fn prepare(&self, pool: &Pool<P>, mut instance: P::Instance) -> P::Instance {
        pool.run_factory_hooks(&mut instance);
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        self.ledger
            .track_created(self.producer.identity(&instance), &pool.shared_name());
        instance
    }

    fn activate(&self, mut instance: P::Instance) -> P::Instance {
        self.producer.set_active(&mut instance, true);
        self.counters.acquired.fetch_add(1, Ordering::Relaxed);
        if let Some(id) = self.producer.identity(&instance) {
            self.ledger.acquired(id);
        }
        instance
    }

    /// Warm-up path: factory chain, deactivate, push.
    fn stock(&self, pool: &Pool<P>, instance: P::Instance) {
        if pool.is_retired() {
            self.destroy(instance);
            return;
        }
        let mut instance = self.prepare(pool, instance);
        self.producer.set_active(&mut instance, false);
        self.shelve(pool, instance);
    }

    /// Release path: built-in return, user return chain, push.
    fn return_to(&self, pool: &Pool<P>, mut instance: P::Instance) {
        self.producer.on_return(&mut instance, pool.parent());
        pool.run_return_hooks(&mut instance);
        self.counters.released.fetch_add(1, Ordering::Relaxed);
        self.shelve(pool, instance);
    }

    fn shelve(&self, pool: &Pool<P>, instance: P::Instance) {
        let id = self.producer.identity(&instance);
        match pool.push(instance) {
            Ok(()) => {
                if let Some(id) = id {
                    self.ledger.shelved(id);
                }
            }
            Err(instance) => {
                debug!(pool = pool.name(), "Pool retired; destroying late instance");
                self.destroy(instance);
            }
        }
    }

    /// Queues a finished callback acquisition, or destroys its instance once
    /// the engine is gone.
    fn enqueue(&self, pool: &Pool<P>, delivery: Delivery<P::Instance>) {
        let rejected = {
            let accepting = self.accepting.read();
            if *accepting {
                self.deliveries.send(delivery).err().map(|err| err.into_inner())
            } else {
                Some(delivery)
            }
        };
        if let Some(delivery) = rejected {
            debug!(pool = pool.name(), "Engine gone; destroying late acquisition");
            self.discard(delivery);
        }
    }

    /// Drops an undelivered acquisition. Returns true if an instance was destroyed.
    fn discard(&self, delivery: Delivery<P::Instance>) -> bool {
        match delivery.result {
            Ok(instance) => {
                self.destroy(instance);
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn destroy(&self, instance: P::Instance) {
        if let Some(id) = self.producer.identity(&instance) {
            self.ledger.destroyed(id);
        }
        self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
        self.producer.destroy(instance);
    }

    fn warm(self: &Arc<Self>, pool: &Arc<Pool<P>>, amount: usize) -> PoolResult<()> {
        for _ in 0..amount {
            match self.producer.produce(pool.template(), pool.parent()) {
                Ok(Production::Ready(instance)) => self.stock(pool, instance),
                Ok(Production::Pending(pending)) => {
                    self.in_flight.fetch_add(1, Ordering::AcqRel);
                    let core = Arc::clone(self);
                    let target = Arc::clone(pool);
                    pending.on_complete(move |outcome| {
                        match flatten(outcome) {
                            Ok(instance) => core.stock(&target, instance),
                            Err(source) => error!(
                                pool = target.name(),
                                kind = P::KIND,
                                error = %source,
                                "Warm-up instantiation failed"
                            ),
                        }
                        core.in_flight.fetch_sub(1, Ordering::AcqRel);
                    });
                }
                Err(source) => {
                    error!(pool = pool.name(), kind = P::KIND, error = %source, "Warm-up instantiation failed");
                    return Err(PoolError::creation_failed(pool.name(), source));
                }
            }
        }
        Ok(())
    }

    /// Creates an instance for a caller, blocking on asynchronous producers.
    fn create_blocking(&self, pool: &Pool<P>) -> PoolResult<P::Instance> {
        let instance = match self.producer.produce(pool.template(), pool.parent()) {
            Ok(Production::Ready(instance)) => Ok(instance),
            Ok(Production::Pending(pending)) => flatten(pending.wait()),
            Err(source) => Err(source),
        }
        .map_err(|source| PoolError::creation_failed(pool.name(), source))?;
        Ok(self.activate(self.prepare(pool, instance)))
    }

    /// Installs the orphan path: an acquisition dropped unconsumed goes back to its pool.
    fn guard(
        self: &Arc<Self>,
        pool: &Arc<Pool<P>>,
        acquisition: Acquisition<P::Instance>,
    ) -> Acquisition<P::Instance> {
        let core = Arc::clone(self);
        let pool = Arc::clone(pool);
        acquisition.with_orphan(move |result| {
            if let Ok(instance) = result {
                debug!(pool = pool.name(), "Acquisition dropped; instance returned");
                core.return_to(&pool, instance);
            }
        })
    }
}

fn flatten<I>(outcome: Result<Result<I, HostError>, CompleterDropped>) -> Result<I, HostError> {
    outcome.unwrap_or_else(|dropped| {
        Err(HostError::with_source(
            "instantiation abandoned by host",
            dropped,
        ))
    })
}

struct DeferredRelease<P: Producer> {
    due: Duration,
    pool: Arc<Pool<P>>,
    instance: P::Instance,
}

/// Registry of named pools sharing one producer.
pub struct PoolEngine<P: Producer> {
    core: Arc<EngineCore<P>>,
    pools: HashMap<String, Arc<Pool<P>>>,
    deferred: Vec<DeferredRelease<P>>,
    disposals: Vec<DisposalTask<P>>,
    deliveries: Receiver<Delivery<P::Instance>>,
    clock: Duration,
    disposal_config: DisposalConfig,
    retiring: bool,
}

impl<P: Producer> PoolEngine<P> {
    /// Creates an engine with default disposal pacing.
    #[must_use]
    pub fn new(producer: P) -> Self {
        Self::with_config(producer, DisposalConfig::default())
    }

    /// Creates an engine with explicit disposal pacing.
    #[must_use]
    pub fn with_config(producer: P, disposal_config: DisposalConfig) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            core: Arc::new(EngineCore {
                producer,
                ledger: OwnershipLedger::default(),
                counters: Counters::default(),
                deliveries: sender,
                accepting: RwLock::new(true),
                in_flight: AtomicUsize::new(0),
            }),
            pools: HashMap::new(),
            deferred: Vec::new(),
            disposals: Vec::new(),
            deliveries: receiver,
            clock: Duration::ZERO,
            disposal_config,
            retiring: false,
        }
    }

    /// The producer backing every pool.
    #[must_use]
    pub fn producer(&self) -> &P {
        &self.core.producer
    }

    /// Current disposal pacing.
    #[must_use]
    pub const fn disposal_config(&self) -> DisposalConfig {
        self.disposal_config
    }

    /// Changes disposal pacing for subsequent `dispose_all` calls.
    pub fn set_disposal_config(&mut self, config: DisposalConfig) {
        self.disposal_config = config;
    }

    fn pool(&self, name: &str, action: &'static str) -> PoolResult<Arc<Pool<P>>> {
        self.pools
            .get(name)
            .cloned()
            .ok_or_else(|| PoolError::not_found(name, action))
    }

    // =========================================================================
    // Pool lifecycle
    // =========================================================================

    /// Creates (or overwrites) a pool and warms it with `args.amount` instances.
    ///
    /// An overwritten pool is retired: its available instances are destroyed and
    /// its template released.
    ///
    /// # Errors
    ///
    /// `InstanceCreationFailed` if the producer fails synchronously during warm-up.
    /// The pool stays registered with whatever was created before the failure.
    pub fn create_pool(&mut self, args: PoolArgs<P>) -> PoolResult<()> {
        let PoolArgs {
            name,
            amount,
            template,
            parent,
            on_return,
            on_factory,
        } = args;

        let parent = parent.unwrap_or_else(|| self.core.producer.root_context());
        let pool = Arc::new(Pool::new(&name, template, parent, on_return, on_factory));

        if let Some(previous) = self.pools.insert(name.clone(), Arc::clone(&pool)) {
            let destroyed = self.retire_pool(&previous);
            warn!(pool = %name, kind = P::KIND, destroyed, "Pool overwritten");
        }
        self.retiring = false;

        info!(pool = %name, kind = P::KIND, amount, "Pool created");
        self.core.warm(&pool, amount)
    }

    /// Warms an existing pool with `amount` more instances.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name, `InstanceCreationFailed` if the producer
    /// fails synchronously.
    pub fn fill_pool(&mut self, name: &str, amount: usize) -> PoolResult<()> {
        let pool = self.pool(name, "fill")?;
        debug!(pool = name, amount, "Filling pool");
        self.core.warm(&pool, amount)
    }

    /// Destroys every available instance of a pool.
    ///
    /// Instances held by callers are untouched. With `remove_and_free` the pool is
    /// also unregistered and its template released. Returns the number destroyed.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name.
    pub fn dispose_pool(&mut self, name: &str, remove_and_free: bool) -> PoolResult<usize> {
        let pool = self.pool(name, "dispose")?;
        if remove_and_free {
            self.pools.remove(name);
            let destroyed = self.retire_pool(&pool);
            info!(pool = name, kind = P::KIND, destroyed, "Pool removed");
            return Ok(destroyed);
        }

        let drained = pool.drain();
        let destroyed = drained.len();
        for instance in drained {
            self.core.destroy(instance);
        }
        debug!(pool = name, destroyed, "Pool emptied");
        Ok(destroyed)
    }

    fn retire_pool(&self, pool: &Pool<P>) -> usize {
        pool.retire();
        let drained = pool.drain();
        let destroyed = drained.len();
        for instance in drained {
            self.core.destroy(instance);
        }
        self.core.producer.release_template(pool.template());
        destroyed
    }

    /// Detaches every pool and destroys their instances in time-sliced batches.
    ///
    /// Batches run from `advance`. With `destroy_engine` the engine reports
    /// `is_retired` once the disposal finishes.
    pub fn dispose_all(&mut self, destroy_engine: bool) -> DisposalHandle {
        let pools: VecDeque<Arc<Pool<P>>> = self
            .pools
            .drain()
            .map(|(_, pool)| {
                pool.retire();
                pool
            })
            .collect();

        info!(kind = P::KIND, pools = pools.len(), destroy_engine, "Disposing all pools");
        let task = DisposalTask::new(pools, self.disposal_config);
        let handle = task.handle();
        if !task.is_complete() {
            self.disposals.push(task);
        }
        if destroy_engine {
            self.retiring = true;
        }
        handle
    }

    /// Runs every outstanding disposal to completion without waiting between batches.
    pub fn finish_disposals(&mut self) {
        for mut task in self.disposals.drain(..) {
            task.finish(&self.core);
        }
    }

    /// Blocking `dispose_all`. Delayed releases still pending and callback
    /// acquisitions not yet delivered are destroyed as well; their callbacks do
    /// not run. Returns the number of instances destroyed.
    pub fn dispose_all_now(&mut self, destroy_engine: bool) -> usize {
        let handle = self.dispose_all(destroy_engine);
        self.finish_disposals();
        let flushed = self.deferred.len();
        for release in self.deferred.drain(..) {
            self.core.destroy(release.instance);
        }
        handle.destroyed() + flushed + self.discard_deliveries()
    }

    fn discard_deliveries(&self) -> usize {
        self.deliveries
            .try_iter()
            .map(|delivery| usize::from(self.core.discard(delivery)))
            .sum()
    }

    // =========================================================================
    // Acquisition
    // =========================================================================

    /// Pops and activates an instance, creating one if the pool is empty.
    ///
    /// On an asynchronous producer an empty pool blocks until the host delivers.
    /// The host must not complete on the calling thread.
    ///
    /// # Errors
    ///
    /// `PoolNotFound`, or `InstanceCreationFailed` if on-demand creation fails.
    pub fn acquire(&self, name: &str) -> PoolResult<P::Instance> {
        let pool = self.pool(name, "acquire an instance")?;
        match pool.pop() {
            Some(instance) => Ok(self.core.activate(instance)),
            None => {
                debug!(pool = name, kind = P::KIND, "Pool empty, creating on demand");
                self.core.create_blocking(&pool)
            }
        }
    }

    /// Pops and activates an instance if one is available. Never creates.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name.
    pub fn try_acquire(&self, name: &str) -> PoolResult<Maybe<P::Instance>> {
        let pool = self.pool(name, "acquire an instance")?;
        Ok(pool.pop().map(|instance| self.core.activate(instance)).into())
    }

    /// Acquires without blocking; the returned `Acquisition` resolves once an
    /// instance is ready.
    ///
    /// Dropping the acquisition before consuming it returns the instance to the pool.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name. Creation failures surface through the
    /// acquisition itself.
    pub fn acquire_async(&self, name: &str) -> PoolResult<Acquisition<P::Instance>> {
        let pool = self.pool(name, "acquire an instance")?;
        if let Some(instance) = pool.pop() {
            let instance = self.core.activate(instance);
            return Ok(self.core.guard(&pool, Pending::ready(Ok(instance))));
        }

        let acquisition = match self.core.producer.produce(pool.template(), pool.parent()) {
            Ok(Production::Ready(instance)) => {
                let instance = self.core.activate(self.core.prepare(&pool, instance));
                Pending::ready(Ok(instance))
            }
            Ok(Production::Pending(pending)) => {
                let (acquisition, completer) = Pending::channel();
                self.core.in_flight.fetch_add(1, Ordering::AcqRel);
                let core = Arc::clone(&self.core);
                let target = Arc::clone(&pool);
                pending.on_complete(move |outcome| {
                    let result = flatten(outcome)
                        .map(|instance| core.activate(core.prepare(&target, instance)))
                        .map_err(|source| PoolError::creation_failed(target.name(), source));
                    if let Err(Ok(orphan)) = completer.complete(result) {
                        core.return_to(&target, orphan);
                    }
                    core.in_flight.fetch_sub(1, Ordering::AcqRel);
                });
                acquisition
            }
            Err(source) => Pending::ready(Err(PoolError::creation_failed(name, source))),
        };
        Ok(self.core.guard(&pool, acquisition))
    }

    /// Acquires and hands the outcome to `callback`.
    ///
    /// If an instance is available (or the producer is synchronous) the callback
    /// runs before this returns. Otherwise it runs from `advance` or
    /// `pump_completions` on the ticking thread once the host delivers.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name; the callback is not invoked.
    pub fn acquire_with<F>(&self, name: &str, callback: F) -> PoolResult<()>
    where
        F: FnOnce(PoolResult<P::Instance>) + Send + 'static,
    {
        let pool = self.pool(name, "acquire an instance")?;
        if let Some(instance) = pool.pop() {
            callback(Ok(self.core.activate(instance)));
            return Ok(());
        }

        match self.core.producer.produce(pool.template(), pool.parent()) {
            Ok(Production::Ready(instance)) => {
                callback(Ok(self.core.activate(self.core.prepare(&pool, instance))));
            }
            Ok(Production::Pending(pending)) => {
                self.core.in_flight.fetch_add(1, Ordering::AcqRel);
                let core = Arc::clone(&self.core);
                pending.on_complete(move |outcome| {
                    let result = flatten(outcome)
                        .map(|instance| core.activate(core.prepare(&pool, instance)))
                        .map_err(|source| PoolError::creation_failed(pool.name(), source));
                    let delivery = Delivery {
                        result,
                        callback: Box::new(callback),
                    };
                    core.enqueue(&pool, delivery);
                    core.in_flight.fetch_sub(1, Ordering::AcqRel);
                });
            }
            Err(source) => callback(Err(PoolError::creation_failed(name, source))),
        }
        Ok(())
    }

    // =========================================================================
    // Release
    // =========================================================================

    /// Returns an instance: built-in return behavior, return hooks, then push.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name. The instance is destroyed in that case.
    pub fn release(&self, name: &str, instance: P::Instance) -> PoolResult<()> {
        let pool = match self.pool(name, "return an instance") {
            Ok(pool) => pool,
            Err(err) => {
                self.core.destroy(instance);
                return Err(err);
            }
        };
        if let Some(id) = self.core.producer.identity(&instance) {
            self.core.ledger.check_release(id, name);
        }
        self.core.return_to(&pool, instance);
        Ok(())
    }

    /// Like `release`, but the instance reaches the pool only after `delay` of
    /// engine time. Until then it is invisible to the pool.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name. The instance is destroyed in that case.
    pub fn release_after(
        &mut self,
        name: &str,
        instance: P::Instance,
        delay: Duration,
    ) -> PoolResult<()> {
        let pool = match self.pool(name, "return an instance") {
            Ok(pool) => pool,
            Err(err) => {
                self.core.destroy(instance);
                return Err(err);
            }
        };
        if let Some(id) = self.core.producer.identity(&instance) {
            self.core.ledger.check_release(id, name);
        }
        self.deferred.push(DeferredRelease {
            due: self.clock + delay,
            pool,
            instance,
        });
        Ok(())
    }

    /// Delayed releases not yet due.
    #[must_use]
    pub fn pending_releases(&self) -> usize {
        self.deferred.len()
    }

    // =========================================================================
    // Hooks
    // =========================================================================

    /// Appends a return hook.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name.
    pub fn add_return_hook(
        &self,
        name: &str,
        hook: impl Fn(&mut P::Instance) + Send + Sync + 'static,
    ) -> PoolResult<()> {
        let hook: Hook<P::Instance> = Arc::new(hook);
        self.pool(name, "add a return hook")?.add_return_hook(hook);
        Ok(())
    }

    /// Drops every user return hook; only the built-in return behavior remains.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name.
    pub fn reset_return_hook(&self, name: &str) -> PoolResult<()> {
        self.pool(name, "reset the return hook")?.reset_return_hooks();
        Ok(())
    }

    /// Appends a factory hook.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name.
    pub fn add_factory_hook(
        &self,
        name: &str,
        hook: impl Fn(&mut P::Instance) + Send + Sync + 'static,
    ) -> PoolResult<()> {
        let hook: Hook<P::Instance> = Arc::new(hook);
        self.pool(name, "add a factory hook")?.add_factory_hook(hook);
        Ok(())
    }

    /// Empties the factory chain.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name.
    pub fn reset_factory_hook(&self, name: &str) -> PoolResult<()> {
        self.pool(name, "reset the factory hook")?.reset_factory_hooks();
        Ok(())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of available instances.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name.
    pub fn pool_count(&self, name: &str) -> PoolResult<usize> {
        Ok(self.pool(name, "count instances")?.len())
    }

    /// Returns true if the pool has nothing available.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name.
    pub fn is_pool_empty(&self, name: &str) -> PoolResult<bool> {
        Ok(self.pool(name, "check emptiness")?.is_empty())
    }

    /// Returns true if a pool with this name is registered.
    #[must_use]
    pub fn pool_exists(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }

    /// Number of registered pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Returns true if no pool is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Names of registered pools, in no particular order.
    pub fn pool_names(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    /// Visits a pool's available instances without popping them.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown name.
    pub fn for_each_available(
        &self,
        name: &str,
        visit: impl FnMut(&P::Instance),
    ) -> PoolResult<()> {
        self.pool(name, "inspect")?.for_each_available(visit);
        Ok(())
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let counters = &self.core.counters;
        EngineStats {
            pools: self.pools.len(),
            created: counters.created.load(Ordering::Relaxed),
            acquired: counters.acquired.load(Ordering::Relaxed),
            released: counters.released.load(Ordering::Relaxed),
            destroyed: counters.destroyed.load(Ordering::Relaxed),
            pending_releases: self.deferred.len(),
            in_flight: self.core.in_flight.load(Ordering::Acquire),
        }
    }

    /// Warnings raised by the debug-build ownership ledger. Always 0 in release builds.
    #[must_use]
    pub fn ownership_warnings(&self) -> usize {
        self.core.ledger.warnings()
    }

    // =========================================================================
    // Engine clock
    // =========================================================================

    /// Advances engine time by `dt`: due releases, one disposal step, completions.
    pub fn advance(&mut self, dt: Duration) {
        self.clock += dt;
        let now = self.clock;

        let (due, waiting): (Vec<_>, Vec<_>) =
            self.deferred.drain(..).partition(|release| release.due <= now);
        self.deferred = waiting;
        for release in due {
            self.core.return_to(&release.pool, release.instance);
        }

        let core = &self.core;
        self.disposals.retain_mut(|task| !task.step(core, dt));

        self.pump_completions();
    }

    /// Runs completed callback acquisitions. Returns how many ran.
    pub fn pump_completions(&self) -> usize {
        let mut delivered = 0;
        while let Ok(delivery) = self.deliveries.try_recv() {
            delivery.run();
            delivered += 1;
        }
        delivered
    }

    /// Engine time accumulated through `advance`.
    #[must_use]
    pub const fn clock(&self) -> Duration {
        self.clock
    }

    /// Returns true when the engine holds nothing and waits on nothing.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pools.is_empty()
            && self.deferred.is_empty()
            && self.disposals.is_empty()
            && self.deliveries.is_empty()
            && self.core.in_flight.load(Ordering::Acquire) == 0
    }

    /// Returns true once `dispose_all(true)` has finished.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retiring && self.disposals.is_empty()
    }
}

impl<P: Producer> Drop for PoolEngine<P> {
    fn drop(&mut self) {
        *self.core.accepting.write() = false;
        if self.is_idle() {
            return;
        }
        let destroyed = self.dispose_all_now(true);
        debug!(kind = P::KIND, destroyed, "Pool engine dropped while holding instances");
    }
}

impl<P: Producer> std::fmt::Debug for PoolEngine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolEngine")
            .field("kind", &P::KIND)
            .field("pools", &self.pools.len())
            .field("pending_releases", &self.deferred.len())
            .field("disposals", &self.disposals.len())
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefab::{Instantiate, PrefabProducer};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;
    use tidepool_core::Completer;

    #[derive(Debug, PartialEq, Eq)]
    struct Bullet {
        id: u64,
        active: bool,
        parent: &'static str,
        factory_runs: u32,
        returns: u32,
    }

    #[derive(Default)]
    struct Forge {
        next: AtomicU64,
        destroyed: Mutex<Vec<u64>>,
        released_templates: AtomicUsize,
        fail: AtomicBool,
    }

    impl Instantiate for Arc<Forge> {
        type Template = &'static str;
        type Instance = Bullet;
        type Parent = &'static str;

        fn instantiate(
            &self,
            _template: &&'static str,
            parent: &&'static str,
        ) -> Result<Bullet, HostError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(HostError::new("forge offline"));
            }
            Ok(Bullet {
                id: self.next.fetch_add(1, Ordering::SeqCst),
                active: true,
                parent: *parent,
                factory_runs: 0,
                returns: 0,
            })
        }

        fn set_active(&self, instance: &mut Bullet, active: bool) {
            instance.active = active;
        }

        fn set_parent(&self, instance: &mut Bullet, parent: &&'static str) {
            instance.parent = *parent;
        }

        fn destroy(&self, instance: Bullet) {
            self.destroyed.lock().push(instance.id);
        }

        fn root(&self) -> &'static str {
            "root"
        }

        fn identity(&self, instance: &Bullet) -> Option<u64> {
            Some(instance.id)
        }
    }

    type Engine = PoolEngine<PrefabProducer<Arc<Forge>>>;

    fn engine() -> (Engine, Arc<Forge>) {
        let forge = Arc::new(Forge::default());
        (PoolEngine::new(PrefabProducer::new(Arc::clone(&forge))), forge)
    }

    fn bullets(amount: usize) -> PoolArgs<PrefabProducer<Arc<Forge>>> {
        PoolArgs::new("bullets", amount, "bullet").on_factory(|b: &mut Bullet| b.factory_runs += 1)
    }

    #[test]
    fn test_create_pool_warms_inactive() {
        let (mut engine, _forge) = engine();
        engine.create_pool(bullets(5)).unwrap();

        assert_eq!(engine.pool_count("bullets").unwrap(), 5);
        engine
            .for_each_available("bullets", |b| {
                assert!(!b.active);
                assert_eq!(b.factory_runs, 1);
                assert_eq!(b.parent, "root");
            })
            .unwrap();
    }

    #[test]
    fn test_unknown_pool_reports_action() {
        let (engine, _forge) = engine();
        match engine.acquire("ghosts") {
            Err(PoolError::PoolNotFound { pool, action }) => {
                assert_eq!(pool, "ghosts");
                assert_eq!(action, "acquire an instance");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!engine.pool_exists("ghosts"));
    }

    #[test]
    fn test_acquire_release_cycle_keeps_count() {
        let (mut engine, _forge) = engine();
        engine.create_pool(bullets(3)).unwrap();

        for _ in 0..4 {
            let bullet = engine.acquire("bullets").unwrap();
            assert!(bullet.active);
            assert_eq!(engine.pool_count("bullets").unwrap(), 2);
            engine.release("bullets", bullet).unwrap();
            assert_eq!(engine.pool_count("bullets").unwrap(), 3);
        }
    }

    #[test]
    fn test_lifo_reuse() {
        let (mut engine, _forge) = engine();
        engine.create_pool(bullets(2)).unwrap();

        let first = engine.acquire("bullets").unwrap();
        let id = first.id;
        engine.release("bullets", first).unwrap();
        assert_eq!(engine.acquire("bullets").unwrap().id, id);
    }

    #[test]
    fn test_empty_pool_creates_on_demand_for_caller_only() {
        let (mut engine, _forge) = engine();
        engine.create_pool(bullets(0)).unwrap();

        assert!(engine.try_acquire("bullets").unwrap().is_null());
        let bullet = engine.acquire("bullets").unwrap();
        assert!(bullet.active);
        assert_eq!(bullet.factory_runs, 1);
        assert_eq!(engine.pool_count("bullets").unwrap(), 0);
    }

    #[test]
    fn test_return_chain_runs_builtin_first() {
        let (mut engine, _forge) = engine();
        let args = PoolArgs::new("bullets", 1, "bullet")
            .with_parent("magazine")
            .on_return(|b: &mut Bullet| {
                assert!(!b.active, "built-in deactivation runs first");
                b.returns += 1;
            });
        engine.create_pool(args).unwrap();

        let mut bullet = engine.acquire("bullets").unwrap();
        bullet.parent = "world";
        engine.release("bullets", bullet).unwrap();

        engine
            .for_each_available("bullets", |b| {
                assert_eq!(b.parent, "magazine");
                assert_eq!(b.returns, 1);
            })
            .unwrap();
    }

    #[test]
    fn test_reset_hooks() {
        let (mut engine, _forge) = engine();
        engine.create_pool(bullets(0)).unwrap();
        engine
            .add_return_hook("bullets", |b: &mut Bullet| b.returns += 10)
            .unwrap();
        engine.reset_return_hook("bullets").unwrap();
        engine.reset_factory_hook("bullets").unwrap();

        let bullet = engine.acquire("bullets").unwrap();
        assert_eq!(bullet.factory_runs, 0);
        engine.release("bullets", bullet).unwrap();
        engine
            .for_each_available("bullets", |b| {
                assert_eq!(b.returns, 0);
                assert!(!b.active);
            })
            .unwrap();
    }

    #[test]
    fn test_release_after_is_invisible_until_due() {
        let (mut engine, _forge) = engine();
        engine.create_pool(bullets(1)).unwrap();
        let bullet = engine.acquire("bullets").unwrap();

        engine
            .release_after("bullets", bullet, Duration::from_millis(100))
            .unwrap();
        assert_eq!(engine.pending_releases(), 1);

        engine.advance(Duration::from_millis(60));
        assert_eq!(engine.pool_count("bullets").unwrap(), 0);

        engine.advance(Duration::from_millis(60));
        assert_eq!(engine.pool_count("bullets").unwrap(), 1);
        assert_eq!(engine.pending_releases(), 0);
    }

    #[test]
    fn test_delayed_release_into_removed_pool_destroys() {
        let (mut engine, forge) = engine();
        engine.create_pool(bullets(1)).unwrap();
        let bullet = engine.acquire("bullets").unwrap();
        let id = bullet.id;

        engine
            .release_after("bullets", bullet, Duration::from_millis(10))
            .unwrap();
        engine.dispose_pool("bullets", true).unwrap();
        engine.advance(Duration::from_millis(20));

        assert!(forge.destroyed.lock().contains(&id));
    }

    #[test]
    fn test_dispose_pool_leaves_held_instances() {
        let (mut engine, forge) = engine();
        engine.create_pool(bullets(3)).unwrap();
        let held = engine.acquire("bullets").unwrap();

        assert_eq!(engine.dispose_pool("bullets", false).unwrap(), 2);
        assert!(engine.pool_exists("bullets"));
        assert!(!forge.destroyed.lock().contains(&held.id));

        assert_eq!(engine.dispose_pool("bullets", true).unwrap(), 0);
        assert!(!engine.pool_exists("bullets"));
    }

    #[test]
    fn test_release_into_unknown_pool_destroys() {
        let (mut engine, forge) = engine();
        engine.create_pool(bullets(1)).unwrap();
        let bullet = engine.acquire("bullets").unwrap();
        let id = bullet.id;

        assert!(engine.release("rockets", bullet).is_err());
        assert!(forge.destroyed.lock().contains(&id));
    }

    #[test]
    fn test_dispose_all_is_time_sliced() {
        let (mut engine, forge) = engine();
        engine.set_disposal_config(DisposalConfig {
            batch_size: 4,
            interval: Duration::from_millis(50),
        });
        engine.create_pool(bullets(10)).unwrap();

        let handle = engine.dispose_all(true);
        assert!(!engine.pool_exists("bullets"));
        assert!(!handle.is_complete());

        engine.advance(Duration::from_millis(16));
        assert_eq!(handle.destroyed(), 4);

        // Still cooling down between batches.
        engine.advance(Duration::from_millis(16));
        assert_eq!(handle.destroyed(), 4);

        engine.advance(Duration::from_millis(50));
        assert_eq!(handle.destroyed(), 8);
        engine.advance(Duration::from_millis(50));

        assert!(handle.is_complete());
        assert_eq!(handle.destroyed(), 10);
        assert_eq!(forge.destroyed.lock().len(), 10);
        assert!(engine.is_retired());
    }

    #[test]
    fn test_dispose_all_now_blocks_until_done() {
        let (mut engine, forge) = engine();
        engine.create_pool(bullets(40)).unwrap();
        engine.create_pool(PoolArgs::new("shells", 5, "shell")).unwrap();

        assert_eq!(engine.dispose_all_now(false), 45);
        assert_eq!(forge.destroyed.lock().len(), 45);
        assert!(engine.is_idle());
        assert!(!engine.is_retired());
    }

    #[test]
    fn test_overwrite_retires_previous_pool() {
        let (mut engine, forge) = engine();
        engine.create_pool(bullets(2)).unwrap();
        engine.create_pool(bullets(3)).unwrap();

        assert_eq!(engine.pool_count("bullets").unwrap(), 3);
        assert_eq!(forge.destroyed.lock().len(), 2);
    }

    #[test]
    fn test_sync_failure_surfaces() {
        let (mut engine, forge) = engine();
        engine.create_pool(bullets(0)).unwrap();
        forge.fail.store(true, Ordering::SeqCst);

        assert!(matches!(
            engine.acquire("bullets"),
            Err(PoolError::InstanceCreationFailed { .. })
        ));
        assert!(matches!(
            engine.fill_pool("bullets", 1),
            Err(PoolError::InstanceCreationFailed { .. })
        ));
    }

    #[test]
    fn test_acquire_with_runs_inline_for_sync_producer() {
        let (mut engine, _forge) = engine();
        engine.create_pool(bullets(0)).unwrap();

        let got = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&got);
        engine
            .acquire_with("bullets", move |result| {
                flag.store(result.is_ok(), Ordering::SeqCst);
            })
            .unwrap();
        assert!(got.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dropped_acquisition_returns_to_pool() {
        let (mut engine, _forge) = engine();
        engine.create_pool(bullets(1)).unwrap();

        let acquisition = engine.acquire_async("bullets").unwrap();
        assert_eq!(engine.pool_count("bullets").unwrap(), 0);
        drop(acquisition);
        assert_eq!(engine.pool_count("bullets").unwrap(), 1);
    }

    #[test]
    fn test_stats_track_lifecycle() {
        let (mut engine, _forge) = engine();
        engine.create_pool(bullets(2)).unwrap();
        let bullet = engine.acquire("bullets").unwrap();
        engine.release("bullets", bullet).unwrap();
        engine.dispose_pool("bullets", true).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.acquired, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.destroyed, 2);
        assert_eq!(stats.pools, 0);
    }

    /// Hands out pending instances that the test completes by hand.
    #[derive(Default)]
    struct Hatchery {
        waiting: Mutex<Vec<Completer<Result<Bullet, HostError>>>>,
        next: AtomicU64,
        destroyed: Mutex<Vec<u64>>,
    }

    impl Hatchery {
        fn hatch(&self) -> usize {
            let waiting: Vec<_> = self.waiting.lock().drain(..).collect();
            let hatched = waiting.len();
            for completer in waiting {
                let _ = completer.complete(Ok(Bullet {
                    id: self.next.fetch_add(1, Ordering::SeqCst),
                    active: true,
                    parent: "nest",
                    factory_runs: 0,
                    returns: 0,
                }));
            }
            hatched
        }
    }

    struct Eggs(Arc<Hatchery>);

    impl Producer for Eggs {
        type Template = &'static str;
        type Instance = Bullet;
        type Context = &'static str;

        const KIND: &'static str = "eggs";

        fn produce(
            &self,
            _template: &&'static str,
            _parent: &&'static str,
        ) -> Result<Production<Bullet>, HostError> {
            let (pending, completer) = Pending::channel();
            self.0.waiting.lock().push(completer);
            Ok(Production::Pending(pending))
        }

        fn set_active(&self, instance: &mut Bullet, active: bool) {
            instance.active = active;
        }

        fn destroy(&self, instance: Bullet) {
            self.0.destroyed.lock().push(instance.id);
        }

        fn root_context(&self) -> &'static str {
            "root"
        }
    }

    fn hatchery() -> (PoolEngine<Eggs>, Arc<Hatchery>) {
        let hatchery = Arc::new(Hatchery::default());
        let mut engine = PoolEngine::new(Eggs(Arc::clone(&hatchery)));
        engine.create_pool(PoolArgs::new("eggs", 0, "egg")).unwrap();
        (engine, hatchery)
    }

    fn flagged() -> (Arc<AtomicBool>, impl FnOnce(PoolResult<Bullet>) + Send + 'static) {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        (ran, move |_result: PoolResult<Bullet>| flag.store(true, Ordering::SeqCst))
    }

    #[test]
    fn test_queued_callback_runs_on_advance() {
        let (mut engine, hatchery) = hatchery();
        let (ran, callback) = flagged();
        engine.acquire_with("eggs", callback).unwrap();

        assert_eq!(hatchery.hatch(), 1);
        assert!(!ran.load(Ordering::SeqCst));
        assert!(!engine.is_idle());

        engine.advance(Duration::from_millis(16));
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(engine.dispose_all_now(true), 0);
    }

    #[test]
    fn test_dispose_all_now_destroys_queued_callbacks() {
        let (mut engine, hatchery) = hatchery();
        let (ran, callback) = flagged();
        engine.acquire_with("eggs", callback).unwrap();
        hatchery.hatch();

        assert_eq!(engine.dispose_all_now(true), 1);
        assert_eq!(*hatchery.destroyed.lock(), vec![0]);

        engine.advance(Duration::from_millis(16));
        assert!(!ran.load(Ordering::SeqCst));
        assert!(engine.is_idle());
    }

    #[test]
    fn test_dropped_engine_destroys_queued_callbacks() {
        let (engine, hatchery) = hatchery();
        let (ran, callback) = flagged();
        engine.acquire_with("eggs", callback).unwrap();
        hatchery.hatch();

        drop(engine);
        assert_eq!(*hatchery.destroyed.lock(), vec![0]);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dropped_engine_destroys_late_callbacks() {
        let (mut engine, hatchery) = hatchery();
        let (ran, callback) = flagged();
        engine.acquire_with("eggs", callback).unwrap();
        assert_eq!(engine.stats().in_flight, 1);

        assert_eq!(engine.dispose_all_now(true), 0);
        drop(engine);

        assert_eq!(hatchery.hatch(), 1);
        assert_eq!(*hatchery.destroyed.lock(), vec![0]);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_pending_acquire_async_keeps_engine_busy() {
        let (mut engine, hatchery) = hatchery();
        let acquisition = engine.acquire_async("eggs").unwrap();
        assert_eq!(engine.stats().in_flight, 1);

        engine.dispose_pool("eggs", true).unwrap();
        assert!(!engine.is_idle());

        hatchery.hatch();
        assert!(engine.is_idle());
        let egg = acquisition.wait().unwrap().unwrap();
        assert!(egg.active);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_ownership_warnings_in_debug_builds() {
        let (mut engine, _forge) = engine();
        engine.create_pool(bullets(1)).unwrap();
        engine.create_pool(PoolArgs::new("shells", 0, "shell")).unwrap();

        let bullet = engine.acquire("bullets").unwrap();
        engine.release("shells", bullet).unwrap();
        assert_eq!(engine.ownership_warnings(), 1);
        // Still pushed, exactly as in release builds.
        assert_eq!(engine.pool_count("shells").unwrap(), 1);
    }
}
