//! # Coordinator
//!
//! The one context object a game hands around: it owns the pool engines and the
//! per-phase dispatchers and is driven by the host scheduler once per frame.
//!
//! ## Frame Orchestration
//!
//! ```text
//! host frame
//!   ├─ tick_update(dt)   engines.advance(dt) ─► reap idle engines ─► Update pass
//!   ├─ tick_late(dt)     LateUpdate pass
//!   └─ tick_fixed(dt)    FixedUpdate pass (0..n times, at the fixed rate)
//! ```
//!
//! ## Lifetimes
//!
//! | Object          | Created                      | Dropped                              |
//! |-----------------|------------------------------|--------------------------------------|
//! | dispatcher      | first subscription to phase  | last subscriber leaves               |
//! | prefab engine   | first `prefabs()` access     | no pools, no disposal, nothing owed  |
//! | asset engine    | first `assets()` access      | same                                 |
//! | object engine   | first `objects()` access     | same                                 |
//!
//! Both kinds come back on demand, fresh and empty.
//!
//! An engine is checked for idleness at every `tick_update`, so one whose last
//! pool was disposed (or that was only ever accessed) is gone by the next frame.
//! Its replacement starts with a new clock, zeroed `stats()` and the current
//! `CoordinatorConfig` pacing. Code that relies on an engine's stats between
//! frames should hold a pool open, even an empty one created with an amount of
//! 0, rather than dispose it and recreate it later.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tidepool_pool::{DisposalConfig, ObjectProducer, PoolArgs, PoolEngine, Producer};
use tidepool_tick::{
    Dispatcher, FixedPhase, Frame, LatePhase, PhaseKind, Subscriber, SubscriptionId, TickContext,
    TickError, TickPhase, TickResult, UpdatePhase,
};
use tracing::{debug, info};

use crate::error::{ManifestError, TidepoolResult};
use crate::host::Host;
use crate::manifest::PoolManifest;

/// Engine over the host's prefab producer.
pub type PrefabEngine<H> = PoolEngine<<H as Host>::Prefabs>;
/// Engine over the host's asset producer.
pub type AssetEngine<H> = PoolEngine<<H as Host>::Assets>;
/// Engine over poolable objects.
pub type ObjectEngine = PoolEngine<ObjectProducer>;

// =============================================================================
// Phase set
// =============================================================================

/// The three phase dispatchers, each present only while it has subscribers.
#[derive(Debug, Default)]
pub struct PhaseSet {
    update: Option<Dispatcher<UpdatePhase>>,
    late: Option<Dispatcher<LatePhase>>,
    fixed: Option<Dispatcher<FixedPhase>>,
}

/// Maps a phase marker to its slot in a `PhaseSet`.
pub trait PhaseSlot: TickPhase + Sized {
    /// The slot, shared.
    fn slot(phases: &PhaseSet) -> Option<&Dispatcher<Self>>;
    /// The slot, exclusive.
    fn slot_mut(phases: &mut PhaseSet) -> &mut Option<Dispatcher<Self>>;
}

impl PhaseSlot for UpdatePhase {
    fn slot(phases: &PhaseSet) -> Option<&Dispatcher<Self>> {
        phases.update.as_ref()
    }

    fn slot_mut(phases: &mut PhaseSet) -> &mut Option<Dispatcher<Self>> {
        &mut phases.update
    }
}

impl PhaseSlot for LatePhase {
    fn slot(phases: &PhaseSet) -> Option<&Dispatcher<Self>> {
        phases.late.as_ref()
    }

    fn slot_mut(phases: &mut PhaseSet) -> &mut Option<Dispatcher<Self>> {
        &mut phases.late
    }
}

impl PhaseSlot for FixedPhase {
    fn slot(phases: &PhaseSet) -> Option<&Dispatcher<Self>> {
        phases.fixed.as_ref()
    }

    fn slot_mut(phases: &mut PhaseSet) -> &mut Option<Dispatcher<Self>> {
        &mut phases.fixed
    }
}

impl PhaseSet {
    /// Dispatcher of phase `P`, if one exists.
    #[must_use]
    pub fn get<P: PhaseSlot>(&self) -> Option<&Dispatcher<P>> {
        P::slot(self)
    }

    /// Whether `phase` currently has a dispatcher.
    #[must_use]
    pub fn is_active(&self, phase: PhaseKind) -> bool {
        match phase {
            PhaseKind::Update => self.update.is_some(),
            PhaseKind::LateUpdate => self.late.is_some(),
            PhaseKind::FixedUpdate => self.fixed.is_some(),
        }
    }

    /// Subscribers registered for `phase`; 0 without a dispatcher.
    #[must_use]
    pub fn subscriber_count(&self, phase: PhaseKind) -> usize {
        match phase {
            PhaseKind::Update => self.update.as_ref().map_or(0, Dispatcher::len),
            PhaseKind::LateUpdate => self.late.as_ref().map_or(0, Dispatcher::len),
            PhaseKind::FixedUpdate => self.fixed.as_ref().map_or(0, Dispatcher::len),
        }
    }

    fn ensure<P: PhaseSlot>(&mut self) -> &mut Dispatcher<P> {
        P::slot_mut(self).get_or_insert_with(|| {
            debug!(phase = %P::KIND, "Dispatcher created");
            Dispatcher::new()
        })
    }

    fn unsubscribe<P: PhaseSlot>(&mut self, id: SubscriptionId) -> TickResult<bool> {
        let slot = P::slot_mut(self);
        let Some(dispatcher) = slot.as_mut() else {
            return Err(TickError::DispatcherNotInitialized { phase: P::KIND });
        };
        let removed = dispatcher.unsubscribe(id);
        reap(slot);
        Ok(removed)
    }

    fn dispatch<P: PhaseSlot>(&mut self, frame: Frame) -> usize {
        let slot = P::slot_mut(self);
        let Some(dispatcher) = slot.as_mut() else {
            return 0;
        };
        let fired = dispatcher.dispatch(frame);
        reap(slot);
        fired
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Drops a dispatcher whose last subscriber left.
fn reap<P: TickPhase>(slot: &mut Option<Dispatcher<P>>) {
    if slot.as_ref().is_some_and(Dispatcher::is_empty) {
        *slot = None;
        info!(phase = %P::KIND, "Dispatcher retired");
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Handle to one subscription, valid across phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    /// Phase the subscriber was registered with.
    pub phase: PhaseKind,
    /// Entry inside that phase's dispatcher.
    pub id: SubscriptionId,
}

/// Coordinator configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Disposal pacing handed to every engine.
    pub disposal: DisposalConfig,
}

/// Pool engines plus phase dispatchers for one host.
pub struct Coordinator<H: Host> {
    host: H,
    config: CoordinatorConfig,
    prefabs: Option<PrefabEngine<H>>,
    assets: Option<AssetEngine<H>>,
    objects: Option<ObjectEngine>,
    phases: PhaseSet,
    tick: u64,
}

impl<H: Host> Coordinator<H> {
    /// Creates a coordinator with default configuration. Nothing is allocated
    /// until first use.
    #[must_use]
    pub fn new(host: H) -> Self {
        Self::with_config(host, CoordinatorConfig::default())
    }

    /// Creates a coordinator with explicit configuration.
    #[must_use]
    pub fn with_config(host: H, config: CoordinatorConfig) -> Self {
        Self {
            host,
            config,
            prefabs: None,
            assets: None,
            objects: None,
            phases: PhaseSet::default(),
            tick: 0,
        }
    }

    /// The host.
    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> CoordinatorConfig {
        self.config
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Changes disposal pacing for current and future engines.
    pub fn set_disposal_config(&mut self, disposal: DisposalConfig) {
        self.config.disposal = disposal;
        if let Some(engine) = self.prefabs.as_mut() {
            engine.set_disposal_config(disposal);
        }
        if let Some(engine) = self.assets.as_mut() {
            engine.set_disposal_config(disposal);
        }
        if let Some(engine) = self.objects.as_mut() {
            engine.set_disposal_config(disposal);
        }
    }

    // =========================================================================
    // Pool engines
    // =========================================================================

    /// Prefab engine, created on first access.
    ///
    /// An engine left without pools is dropped at the next `tick_update`; see
    /// the module docs.
    pub fn prefabs(&mut self) -> &mut PrefabEngine<H> {
        let host = &self.host;
        let disposal = self.config.disposal;
        self.prefabs.get_or_insert_with(|| {
            let kind = <H::Prefabs as Producer>::KIND;
            debug!(kind, "Pool engine created");
            PoolEngine::with_config(host.prefab_producer(), disposal)
        })
    }

    /// Asset engine, created on first access.
    pub fn assets(&mut self) -> &mut AssetEngine<H> {
        let host = &self.host;
        let disposal = self.config.disposal;
        self.assets.get_or_insert_with(|| {
            let kind = <H::Assets as Producer>::KIND;
            debug!(kind, "Pool engine created");
            PoolEngine::with_config(host.asset_producer(), disposal)
        })
    }

    /// Poolable-object engine, created on first access.
    pub fn objects(&mut self) -> &mut ObjectEngine {
        let disposal = self.config.disposal;
        self.objects.get_or_insert_with(|| {
            debug!(kind = ObjectProducer::KIND, "Pool engine created");
            PoolEngine::with_config(ObjectProducer, disposal)
        })
    }

    /// Prefab engine, if one is alive.
    #[must_use]
    pub const fn prefab_engine(&self) -> Option<&PrefabEngine<H>> {
        self.prefabs.as_ref()
    }

    /// Asset engine, if one is alive.
    #[must_use]
    pub const fn asset_engine(&self) -> Option<&AssetEngine<H>> {
        self.assets.as_ref()
    }

    /// Object engine, if one is alive.
    #[must_use]
    pub const fn object_engine(&self) -> Option<&ObjectEngine> {
        self.objects.as_ref()
    }

    /// Creates every pool a manifest declares and adopts its disposal pacing.
    ///
    /// A `[logging]` table installs the global formatter first; an already
    /// installed subscriber is kept. All keys are resolved before anything is
    /// created, so a manifest with an unknown key leaves the pools untouched.
    /// Returns the pools created.
    ///
    /// # Errors
    ///
    /// `UnknownTemplate` / `UnknownParent` for unresolved keys, or the pool error
    /// of a failed warm-up.
    pub fn load_manifest(&mut self, manifest: &PoolManifest) -> TidepoolResult<usize> {
        if let Some(logging) = &manifest.logging {
            let installed = logging.install();
            debug!(level = %logging.level(), installed, "Manifest logging applied");
        }

        let mut prefab_pools = Vec::with_capacity(manifest.prefabs.len());
        for entry in &manifest.prefabs {
            let template = self.host.resolve_prefab(&entry.template).ok_or_else(|| {
                ManifestError::UnknownTemplate {
                    pool: entry.name.clone(),
                    template: entry.template.clone(),
                }
            })?;
            let mut args: PoolArgs<H::Prefabs> =
                PoolArgs::new(&entry.name, entry.amount, template);
            if let Some(key) = &entry.parent {
                let parent = self.host.resolve_prefab_parent(key).ok_or_else(|| {
                    ManifestError::UnknownParent {
                        pool: entry.name.clone(),
                        parent: key.clone(),
                    }
                })?;
                args = args.with_parent(parent);
            }
            prefab_pools.push(args);
        }

        let mut asset_pools = Vec::with_capacity(manifest.assets.len());
        for entry in &manifest.assets {
            let template = self.host.resolve_asset(&entry.template).ok_or_else(|| {
                ManifestError::UnknownTemplate {
                    pool: entry.name.clone(),
                    template: entry.template.clone(),
                }
            })?;
            let mut args: PoolArgs<H::Assets> =
                PoolArgs::new(&entry.name, entry.amount, template);
            if let Some(key) = &entry.parent {
                let parent = self.host.resolve_asset_parent(key).ok_or_else(|| {
                    ManifestError::UnknownParent {
                        pool: entry.name.clone(),
                        parent: key.clone(),
                    }
                })?;
                args = args.with_parent(parent);
            }
            asset_pools.push(args);
        }

        self.set_disposal_config(manifest.disposal_config());

        let created = prefab_pools.len() + asset_pools.len();
        for args in prefab_pools {
            self.prefabs().create_pool(args)?;
        }
        for args in asset_pools {
            self.assets().create_pool(args)?;
        }
        info!(pools = created, "Manifest loaded");
        Ok(created)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Appends a subscriber to phase `P`, creating its dispatcher if needed.
    pub fn subscribe<P, S>(&mut self, subscriber: S) -> Subscription
    where
        P: PhaseSlot,
        S: Subscriber<P> + 'static,
    {
        let id = self.phases.ensure::<P>().subscribe(subscriber);
        Subscription { phase: P::KIND, id }
    }

    /// Appends a closure subscriber to phase `P`.
    pub fn subscribe_fn<P, F>(&mut self, callback: F) -> Subscription
    where
        P: PhaseSlot,
        F: FnMut(&mut TickContext<'_, P>) + Send + 'static,
    {
        self.subscribe::<P, F>(callback)
    }

    /// Inserts a subscriber into phase `P` at `order`: 0 is first, the current
    /// count is last.
    ///
    /// # Errors
    ///
    /// `InvalidOrder` if `order` exceeds the current count. A dispatcher created
    /// for the attempt is dropped again.
    pub fn subscribe_at<P, S>(&mut self, subscriber: S, order: usize) -> TickResult<Subscription>
    where
        P: PhaseSlot,
        S: Subscriber<P> + 'static,
    {
        let result = self.phases.ensure::<P>().subscribe_at(subscriber, order);
        if result.is_err() {
            reap(P::slot_mut(&mut self.phases));
        }
        Ok(Subscription {
            phase: P::KIND,
            id: result?,
        })
    }

    /// Appends a subscriber the caller keeps a handle to.
    pub fn subscribe_shared<P, S>(&mut self, subscriber: &Arc<Mutex<S>>) -> Subscription
    where
        P: PhaseSlot,
        S: Subscriber<P> + 'static,
    {
        let id = self.phases.ensure::<P>().subscribe_shared(subscriber);
        Subscription { phase: P::KIND, id }
    }

    /// Regular update closure.
    pub fn on_update<F>(&mut self, callback: F) -> Subscription
    where
        F: FnMut(&mut TickContext<'_, UpdatePhase>) + Send + 'static,
    {
        self.subscribe_fn::<UpdatePhase, F>(callback)
    }

    /// Late update closure.
    pub fn on_late_update<F>(&mut self, callback: F) -> Subscription
    where
        F: FnMut(&mut TickContext<'_, LatePhase>) + Send + 'static,
    {
        self.subscribe_fn::<LatePhase, F>(callback)
    }

    /// Fixed update closure.
    pub fn on_fixed_update<F>(&mut self, callback: F) -> Subscription
    where
        F: FnMut(&mut TickContext<'_, FixedPhase>) + Send + 'static,
    {
        self.subscribe_fn::<FixedPhase, F>(callback)
    }

    /// Removes a subscription. Returns false for a stale handle.
    ///
    /// When the phase's last subscriber leaves, its dispatcher is dropped.
    ///
    /// # Errors
    ///
    /// `DispatcherNotInitialized` if the phase has no dispatcher.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> TickResult<bool> {
        match subscription.phase {
            PhaseKind::Update => self.phases.unsubscribe::<UpdatePhase>(subscription.id),
            PhaseKind::LateUpdate => self.phases.unsubscribe::<LatePhase>(subscription.id),
            PhaseKind::FixedUpdate => self.phases.unsubscribe::<FixedPhase>(subscription.id),
        }
    }

    /// Removes a shared subscriber from phase `P` by identity.
    ///
    /// # Errors
    ///
    /// `DispatcherNotInitialized` if the phase has no dispatcher.
    pub fn unsubscribe_shared<P, S>(&mut self, subscriber: &Arc<Mutex<S>>) -> TickResult<bool>
    where
        P: PhaseSlot,
        S: Subscriber<P> + 'static,
    {
        let slot = P::slot_mut(&mut self.phases);
        let Some(dispatcher) = slot.as_mut() else {
            return Err(TickError::DispatcherNotInitialized { phase: P::KIND });
        };
        let removed = dispatcher.unsubscribe_shared(subscriber);
        reap(slot);
        Ok(removed)
    }

    /// The phase dispatchers.
    #[must_use]
    pub const fn phases(&self) -> &PhaseSet {
        &self.phases
    }

    /// Whether `phase` currently has a dispatcher.
    #[must_use]
    pub fn is_dispatcher_active(&self, phase: PhaseKind) -> bool {
        self.phases.is_active(phase)
    }

    /// Subscribers registered for `phase`.
    #[must_use]
    pub fn subscriber_count(&self, phase: PhaseKind) -> usize {
        self.phases.subscriber_count(phase)
    }

    // =========================================================================
    // Ticking
    // =========================================================================

    /// Runs one pass of phase `P` with an explicit frame. A phase without a
    /// dispatcher is a no-op. Returns how many subscribers fired.
    pub fn dispatch<P: PhaseSlot>(&mut self, frame: Frame) -> usize {
        self.phases.dispatch::<P>(frame)
    }

    /// Regular update: advances the pool engines by `dt`, drops the ones left
    /// with nothing to do, then runs the update pass.
    pub fn tick_update(&mut self, dt: Duration) -> usize {
        self.tick += 1;
        advance(&mut self.prefabs, dt);
        advance(&mut self.assets, dt);
        advance(&mut self.objects, dt);
        self.phases.dispatch::<UpdatePhase>(Frame::new(self.tick, dt))
    }

    /// Late update pass for the current tick.
    pub fn tick_late(&mut self, dt: Duration) -> usize {
        self.phases.dispatch::<LatePhase>(Frame::new(self.tick, dt))
    }

    /// Fixed update pass for the current tick.
    pub fn tick_fixed(&mut self, dt: Duration) -> usize {
        self.phases.dispatch::<FixedPhase>(Frame::new(self.tick, dt))
    }

    /// Destroys every pooled instance immediately and drops all engines and
    /// dispatchers. Returns the instances destroyed.
    pub fn shutdown(&mut self) -> usize {
        let mut destroyed = 0;
        if let Some(mut engine) = self.prefabs.take() {
            destroyed += engine.dispose_all_now(true);
        }
        if let Some(mut engine) = self.assets.take() {
            destroyed += engine.dispose_all_now(true);
        }
        if let Some(mut engine) = self.objects.take() {
            destroyed += engine.dispose_all_now(true);
        }
        self.phases.clear();
        info!(destroyed, "Coordinator shut down");
        destroyed
    }
}

fn advance<P: Producer>(slot: &mut Option<PoolEngine<P>>, dt: Duration) {
    if let Some(engine) = slot.as_mut() {
        engine.advance(dt);
        if engine.is_idle() {
            *slot = None;
            debug!(kind = P::KIND, "Pool engine torn down");
        }
    }
}

impl<H: Host> std::fmt::Debug for Coordinator<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("tick", &self.tick)
            .field("config", &self.config)
            .field("prefabs", &self.prefabs.is_some())
            .field("assets", &self.assets.is_some())
            .field("objects", &self.objects.is_some())
            .field("phases", &self.phases)
            .finish_non_exhaustive()
    }
}
