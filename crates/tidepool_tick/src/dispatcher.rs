//! # Ordered Update Dispatcher
//!
//! One dispatcher per tick phase. Subscribers live in a doubly-linked list threaded
//! through a slot arena, so insertion at any position and removal by handle are
//! cheap and handles never dangle: a `SubscriptionId` carries the slot generation.
//!
//! ## Pass semantics
//!
//! - Every entry present when `dispatch` starts fires exactly once, front to back.
//! - An entry subscribed during the pass is stamped with the pass number and skipped
//!   until the next pass.
//! - Removing the entry the pass would visit next moves the cursor forward, so
//!   removed entries never fire and the pass never loses its place.
//! - The running entry's callback is moved out of its slot while it runs. If it
//!   unsubscribes itself, the slot's generation changes and the callback is dropped
//!   instead of restored.
//!
//! ## Lifecycle
//!
//! ```text
//! Empty --subscribe--> Active --last unsubscribe--> Retired
//! ```
//!
//! The owner watches for `Retired` and drops the dispatcher.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{TickError, TickResult};
use crate::phase::{Frame, PhaseKind, Subscriber, TickPhase};

/// Handle to one subscriber entry.
///
/// - Lower 32 bits: slot index
/// - Upper 32 bits: slot generation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[inline]
    const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Slot generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

/// Where a dispatcher is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherState {
    /// Never had a subscriber.
    Empty,
    /// Has at least one subscriber.
    Active,
    /// Lost its last subscriber.
    Retired,
}

enum Callback<P: TickPhase> {
    Owned(Box<dyn Subscriber<P>>),
    Shared(Arc<Mutex<dyn Subscriber<P>>>),
}

impl<P: TickPhase> Callback<P> {
    /// Runs the callback unless it reports inactive. Returns true if it ran.
    fn invoke(&mut self, ctx: &mut TickContext<'_, P>) -> bool {
        match self {
            Callback::Owned(subscriber) => {
                if !subscriber.is_active() {
                    return false;
                }
                subscriber.on_tick(ctx);
            }
            Callback::Shared(subscriber) => {
                let mut subscriber = subscriber.lock();
                if !subscriber.is_active() {
                    return false;
                }
                subscriber.on_tick(ctx);
            }
        }
        true
    }
}

struct Slot<P: TickPhase> {
    generation: u32,
    occupied: bool,
    prev: Option<u32>,
    next: Option<u32>,
    /// Pass number at subscription time.
    joined: u64,
    /// Address of a shared subscriber, for removal by identity.
    identity: Option<usize>,
    callback: Option<Callback<P>>,
}

/// Ordered subscriber list for phase `P`.
pub struct Dispatcher<P: TickPhase> {
    slots: Vec<Slot<P>>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
    /// Next entry the running pass will visit.
    cursor: Option<u32>,
    passes: u64,
    state: DispatcherState,
}

impl<P: TickPhase> Dispatcher<P> {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            cursor: None,
            passes: 0,
            state: DispatcherState::Empty,
        }
    }

    /// Phase this dispatcher serves.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> PhaseKind {
        P::KIND
    }

    /// Number of subscribers.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if there are no subscribers.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Completed or running passes.
    #[inline]
    #[must_use]
    pub const fn passes(&self) -> u64 {
        self.passes
    }

    /// Lifecycle state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> DispatcherState {
        self.state
    }

    /// Returns true once the last subscriber has been removed.
    #[inline]
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.state == DispatcherState::Retired
    }

    /// Returns true if the handle still names a live entry.
    #[must_use]
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.slots
            .get(id.index() as usize)
            .is_some_and(|slot| slot.occupied && slot.generation == id.generation())
    }

    /// Handles in dispatch order.
    #[must_use]
    pub fn order(&self) -> Vec<SubscriptionId> {
        let mut order = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let slot = &self.slots[index as usize];
            order.push(SubscriptionId::new(index, slot.generation));
            cursor = slot.next;
        }
        order
    }

    // =========================================================================
    // Subscription
    // =========================================================================

    /// Appends a subscriber.
    pub fn subscribe<S: Subscriber<P> + 'static>(&mut self, subscriber: S) -> SubscriptionId {
        self.insert(Callback::Owned(Box::new(subscriber)), None, None)
    }

    /// Appends a closure subscriber.
    pub fn subscribe_fn<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&mut TickContext<'_, P>) + Send + 'static,
    {
        self.subscribe(callback)
    }

    /// Inserts a subscriber at `order`: 0 is first, `len()` is last.
    ///
    /// # Errors
    ///
    /// `InvalidOrder` if `order > len()`.
    pub fn subscribe_at<S: Subscriber<P> + 'static>(
        &mut self,
        subscriber: S,
        order: usize,
    ) -> TickResult<SubscriptionId> {
        let before = self.position(order)?;
        Ok(self.insert(Callback::Owned(Box::new(subscriber)), before, None))
    }

    /// Inserts a closure subscriber at `order`.
    ///
    /// # Errors
    ///
    /// `InvalidOrder` if `order > len()`.
    pub fn subscribe_at_fn<F>(&mut self, callback: F, order: usize) -> TickResult<SubscriptionId>
    where
        F: FnMut(&mut TickContext<'_, P>) + Send + 'static,
    {
        self.subscribe_at(callback, order)
    }

    /// Appends a subscriber the caller keeps a handle to.
    ///
    /// It can later be removed by identity with `unsubscribe_shared`.
    pub fn subscribe_shared<S: Subscriber<P> + 'static>(
        &mut self,
        subscriber: &Arc<Mutex<S>>,
    ) -> SubscriptionId {
        let identity = shared_identity(subscriber);
        let callback: Arc<Mutex<dyn Subscriber<P>>> = Arc::clone(subscriber) as _;
        self.insert(Callback::Shared(callback), None, Some(identity))
    }

    /// Inserts a shared subscriber at `order`.
    ///
    /// # Errors
    ///
    /// `InvalidOrder` if `order > len()`.
    pub fn subscribe_shared_at<S: Subscriber<P> + 'static>(
        &mut self,
        subscriber: &Arc<Mutex<S>>,
        order: usize,
    ) -> TickResult<SubscriptionId> {
        let before = self.position(order)?;
        let identity = shared_identity(subscriber);
        let callback: Arc<Mutex<dyn Subscriber<P>>> = Arc::clone(subscriber) as _;
        Ok(self.insert(Callback::Shared(callback), before, Some(identity)))
    }

    /// Removes exactly the entry named by `id`. Returns false for a stale handle.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.remove(id.index());
        true
    }

    /// Removes the first entry registered for this shared subscriber.
    pub fn unsubscribe_shared<S: Subscriber<P> + 'static>(
        &mut self,
        subscriber: &Arc<Mutex<S>>,
    ) -> bool {
        let identity = shared_identity(subscriber);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let slot = &self.slots[index as usize];
            if slot.identity == Some(identity) {
                self.remove(index);
                return true;
            }
            cursor = slot.next;
        }
        false
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Runs one pass. Returns how many subscribers fired.
    pub fn dispatch(&mut self, frame: Frame) -> usize {
        self.passes += 1;
        let pass = self.passes;
        self.cursor = self.head;

        let mut fired = 0;
        while let Some(index) = self.cursor {
            let slot = &mut self.slots[index as usize];
            self.cursor = slot.next;
            if slot.joined == pass {
                continue;
            }
            let generation = slot.generation;
            let Some(mut callback) = slot.callback.take() else {
                continue;
            };

            let mut ctx = TickContext {
                dispatcher: self,
                frame,
                current: SubscriptionId::new(index, generation),
            };
            if callback.invoke(&mut ctx) {
                fired += 1;
            }

            let slot = &mut self.slots[index as usize];
            if slot.occupied && slot.generation == generation {
                slot.callback = Some(callback);
            }
        }
        fired
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Entry that a subscriber inserted at `order` goes in front of.
    fn position(&self, order: usize) -> TickResult<Option<u32>> {
        if order > self.len {
            return Err(TickError::InvalidOrder {
                order,
                count: self.len,
            });
        }
        let mut before = self.head;
        for _ in 0..order {
            before = before.and_then(|index| self.slots[index as usize].next);
        }
        Ok(before)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn insert(
        &mut self,
        callback: Callback<P>,
        before: Option<u32>,
        identity: Option<usize>,
    ) -> SubscriptionId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    occupied: false,
                    prev: None,
                    next: None,
                    joined: 0,
                    identity: None,
                    callback: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let prev = match before {
            Some(next) => self.slots[next as usize].prev,
            None => self.tail,
        };

        let slot = &mut self.slots[index as usize];
        slot.occupied = true;
        slot.prev = prev;
        slot.next = before;
        slot.joined = self.passes;
        slot.identity = identity;
        slot.callback = Some(callback);
        let generation = slot.generation;

        match prev {
            Some(prev) => self.slots[prev as usize].next = Some(index),
            None => self.head = Some(index),
        }
        match before {
            Some(next) => self.slots[next as usize].prev = Some(index),
            None => self.tail = Some(index),
        }

        self.len += 1;
        if self.state != DispatcherState::Active {
            debug!(phase = %P::KIND, "Dispatcher active");
            self.state = DispatcherState::Active;
        }
        SubscriptionId::new(index, generation)
    }

    fn remove(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        let (prev, next) = (slot.prev.take(), slot.next.take());
        slot.occupied = false;
        slot.identity = None;
        slot.generation = slot.generation.wrapping_add(1);
        let callback = slot.callback.take();

        match prev {
            Some(prev) => self.slots[prev as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next as usize].prev = prev,
            None => self.tail = prev,
        }
        if self.cursor == Some(index) {
            self.cursor = next;
        }

        self.free.push(index);
        self.len -= 1;
        if self.len == 0 {
            debug!(phase = %P::KIND, "Dispatcher retired");
            self.state = DispatcherState::Retired;
        }
        drop(callback);
    }
}

fn shared_identity<T: ?Sized>(subscriber: &Arc<Mutex<T>>) -> usize {
    Arc::as_ptr(subscriber).cast::<()>() as usize
}

impl<P: TickPhase> Default for Dispatcher<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: TickPhase> std::fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("phase", &P::KIND)
            .field("len", &self.len)
            .field("passes", &self.passes)
            .field("state", &self.state)
            .finish()
    }
}

/// What a running subscriber sees of its dispatcher.
///
/// Subscriptions made through the context join the phase from the next pass;
/// removals take effect immediately.
pub struct TickContext<'a, P: TickPhase> {
    dispatcher: &'a mut Dispatcher<P>,
    frame: Frame,
    current: SubscriptionId,
}

impl<P: TickPhase> TickContext<'_, P> {
    /// Timing of the running pass.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> Frame {
        self.frame
    }

    /// Tick number of the running pass.
    #[inline]
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.frame.tick
    }

    /// Time covered by the running pass.
    #[inline]
    #[must_use]
    pub const fn delta(&self) -> std::time::Duration {
        self.frame.delta
    }

    /// Phase being dispatched.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> PhaseKind {
        P::KIND
    }

    /// Handle of the running subscriber.
    #[inline]
    #[must_use]
    pub const fn subscription(&self) -> SubscriptionId {
        self.current
    }

    /// Removes the running subscriber once it returns.
    pub fn unsubscribe_self(&mut self) -> bool {
        self.dispatcher.unsubscribe(self.current)
    }

    /// Removes another entry. If the pass has not reached it, it will not fire.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Appends a subscriber; it fires from the next pass.
    pub fn subscribe<S: Subscriber<P> + 'static>(&mut self, subscriber: S) -> SubscriptionId {
        self.dispatcher.subscribe(subscriber)
    }

    /// Appends a closure subscriber; it fires from the next pass.
    pub fn subscribe_fn<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&mut TickContext<'_, P>) + Send + 'static,
    {
        self.dispatcher.subscribe_fn(callback)
    }

    /// Inserts a closure subscriber at `order`; it fires from the next pass.
    ///
    /// # Errors
    ///
    /// `InvalidOrder` if `order` is past the end.
    pub fn subscribe_at_fn<F>(&mut self, callback: F, order: usize) -> TickResult<SubscriptionId>
    where
        F: FnMut(&mut TickContext<'_, P>) + Send + 'static,
    {
        self.dispatcher.subscribe_at_fn(callback, order)
    }

    /// Subscribers currently registered, including the running one.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.dispatcher.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::UpdatePhase;
    use std::time::Duration;

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(
        trace: &Trace,
        name: &'static str,
    ) -> impl FnMut(&mut TickContext<'_, UpdatePhase>) + Send + 'static {
        let trace = Arc::clone(trace);
        move |_ctx: &mut TickContext<'_, UpdatePhase>| trace.lock().push(name)
    }

    fn frame(tick: u64) -> Frame {
        Frame::new(tick, Duration::from_millis(16))
    }

    #[test]
    fn test_subscription_id_packing() {
        let id = SubscriptionId::new(7, 3);
        assert_eq!(id.index(), 7);
        assert_eq!(id.generation(), 3);
    }

    #[test]
    fn test_dispatch_in_insertion_order() {
        let trace = Trace::default();
        let mut dispatcher = Dispatcher::<UpdatePhase>::new();
        dispatcher.subscribe_fn(recorder(&trace, "a"));
        dispatcher.subscribe_fn(recorder(&trace, "b"));
        dispatcher.subscribe_fn(recorder(&trace, "c"));

        assert_eq!(dispatcher.dispatch(frame(1)), 3);
        assert_eq!(*trace.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_subscribe_at_positions() {
        let trace = Trace::default();
        let mut dispatcher = Dispatcher::<UpdatePhase>::new();
        dispatcher.subscribe_fn(recorder(&trace, "a"));
        dispatcher.subscribe_fn(recorder(&trace, "b"));
        dispatcher.subscribe_at_fn(recorder(&trace, "c"), 1).unwrap();
        dispatcher.subscribe_at_fn(recorder(&trace, "first"), 0).unwrap();
        dispatcher.subscribe_at_fn(recorder(&trace, "last"), 4).unwrap();

        dispatcher.dispatch(frame(1));
        assert_eq!(*trace.lock(), vec!["first", "a", "c", "b", "last"]);
    }

    #[test]
    fn test_subscribe_at_past_end_fails() {
        let mut dispatcher = Dispatcher::<UpdatePhase>::new();
        dispatcher.subscribe_fn(|_| {});
        let err = dispatcher.subscribe_at_fn(|_| {}, 2).unwrap_err();
        assert_eq!(err, TickError::InvalidOrder { order: 2, count: 1 });
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn test_unsubscribe_removes_exactly_one() {
        let trace = Trace::default();
        let mut dispatcher = Dispatcher::<UpdatePhase>::new();
        dispatcher.subscribe_fn(recorder(&trace, "a"));
        let b = dispatcher.subscribe_fn(recorder(&trace, "b"));
        dispatcher.subscribe_fn(recorder(&trace, "c"));

        assert!(dispatcher.unsubscribe(b));
        assert!(!dispatcher.unsubscribe(b));
        assert!(!dispatcher.contains(b));

        dispatcher.dispatch(frame(1));
        assert_eq!(*trace.lock(), vec!["a", "c"]);
    }

    #[test]
    fn test_stale_handle_does_not_remove_reused_slot() {
        let mut dispatcher = Dispatcher::<UpdatePhase>::new();
        let old = dispatcher.subscribe_fn(|_| {});
        dispatcher.unsubscribe(old);
        let new = dispatcher.subscribe_fn(|_| {});

        assert_eq!(old.index(), new.index());
        assert!(!dispatcher.unsubscribe(old));
        assert!(dispatcher.contains(new));
    }

    #[test]
    fn test_self_unsubscribe_mid_pass() {
        let trace = Trace::default();
        let mut dispatcher = Dispatcher::<UpdatePhase>::new();
        dispatcher.subscribe_fn(recorder(&trace, "a"));
        let sink = Arc::clone(&trace);
        dispatcher.subscribe_fn(move |ctx| {
            sink.lock().push("once");
            ctx.unsubscribe_self();
        });
        dispatcher.subscribe_fn(recorder(&trace, "c"));

        assert_eq!(dispatcher.dispatch(frame(1)), 3);
        assert_eq!(dispatcher.dispatch(frame(2)), 2);
        assert_eq!(*trace.lock(), vec!["a", "once", "c", "a", "c"]);
    }

    #[test]
    fn test_removed_before_reached_does_not_fire() {
        let trace = Trace::default();
        let mut dispatcher = Dispatcher::<UpdatePhase>::new();
        let victim = Arc::new(Mutex::new(None::<SubscriptionId>));

        let target = Arc::clone(&victim);
        dispatcher.subscribe_fn(move |ctx| {
            if let Some(id) = target.lock().take() {
                ctx.unsubscribe(id);
            }
        });
        dispatcher.subscribe_fn(recorder(&trace, "b"));
        let c = dispatcher.subscribe_fn(recorder(&trace, "c"));
        dispatcher.subscribe_fn(recorder(&trace, "d"));
        *victim.lock() = Some(c);

        dispatcher.dispatch(frame(1));
        assert_eq!(*trace.lock(), vec!["b", "d"]);
    }

    #[test]
    fn test_added_mid_pass_fires_next_pass() {
        let trace = Trace::default();
        let mut dispatcher = Dispatcher::<UpdatePhase>::new();
        let spawner = Arc::clone(&trace);
        dispatcher.subscribe_fn(move |ctx| {
            if ctx.tick() == 1 {
                let sink = Arc::clone(&spawner);
                ctx.subscribe_fn(move |_| sink.lock().push("late"));
                let sink = Arc::clone(&spawner);
                ctx.subscribe_at_fn(move |_| sink.lock().push("front"), 0).unwrap();
            }
        });

        assert_eq!(dispatcher.dispatch(frame(1)), 1);
        assert!(trace.lock().is_empty());

        assert_eq!(dispatcher.dispatch(frame(2)), 3);
        assert_eq!(*trace.lock(), vec!["front", "late"]);
    }

    #[test]
    fn test_inactive_subscribers_are_skipped() {
        struct Toggle {
            active: bool,
            hits: u32,
        }

        impl Subscriber<UpdatePhase> for Toggle {
            fn on_tick(&mut self, _ctx: &mut TickContext<'_, UpdatePhase>) {
                self.hits += 1;
            }

            fn is_active(&self) -> bool {
                self.active
            }
        }

        let toggle = Arc::new(Mutex::new(Toggle {
            active: false,
            hits: 0,
        }));
        let mut dispatcher = Dispatcher::<UpdatePhase>::new();
        dispatcher.subscribe_shared(&toggle);

        assert_eq!(dispatcher.dispatch(frame(1)), 0);
        toggle.lock().active = true;
        assert_eq!(dispatcher.dispatch(frame(2)), 1);
        assert_eq!(toggle.lock().hits, 1);
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn test_unsubscribe_shared_by_identity() {
        struct Counter(u32);

        impl Subscriber<UpdatePhase> for Counter {
            fn on_tick(&mut self, _ctx: &mut TickContext<'_, UpdatePhase>) {
                self.0 += 1;
            }
        }

        let first = Arc::new(Mutex::new(Counter(0)));
        let second = Arc::new(Mutex::new(Counter(0)));
        let mut dispatcher = Dispatcher::<UpdatePhase>::new();
        dispatcher.subscribe_shared(&first);
        dispatcher.subscribe_shared_at(&second, 0).unwrap();

        assert!(dispatcher.unsubscribe_shared(&first));
        assert!(!dispatcher.unsubscribe_shared(&first));

        dispatcher.dispatch(frame(1));
        assert_eq!(first.lock().0, 0);
        assert_eq!(second.lock().0, 1);
    }

    #[test]
    fn test_lifecycle_states() {
        let mut dispatcher = Dispatcher::<UpdatePhase>::new();
        assert_eq!(dispatcher.state(), DispatcherState::Empty);

        let id = dispatcher.subscribe_fn(|_| {});
        assert_eq!(dispatcher.state(), DispatcherState::Active);

        dispatcher.unsubscribe(id);
        assert!(dispatcher.is_retired());
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_context_exposes_frame() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let mut dispatcher = Dispatcher::<UpdatePhase>::new();
        dispatcher.subscribe_fn(move |ctx| {
            *sink.lock() = Some((ctx.tick(), ctx.delta(), ctx.phase(), ctx.subscriber_count()));
        });

        dispatcher.dispatch(frame(42));
        assert_eq!(
            *seen.lock(),
            Some((42, Duration::from_millis(16), PhaseKind::Update, 1))
        );
        assert_eq!(dispatcher.passes(), 1);
    }
}
