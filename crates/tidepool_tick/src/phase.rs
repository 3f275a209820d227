//! # Tick Phases
//!
//! A host tick runs up to three phases: the regular update, the late update that
//! follows it, and the fixed-rate update. Each phase has its own dispatcher, typed by
//! a zero-sized marker so a subscriber written for one phase cannot be registered
//! with another by accident.

use std::fmt;
use std::time::Duration;

use crate::dispatcher::TickContext;

/// Runtime tag of a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PhaseKind {
    /// Regular per-frame update.
    Update,
    /// Runs after every regular update of the frame.
    LateUpdate,
    /// Fixed-timestep update.
    FixedUpdate,
}

impl PhaseKind {
    /// All phases, in per-frame order.
    pub const ALL: [PhaseKind; 3] = [Self::Update, Self::LateUpdate, Self::FixedUpdate];

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::LateUpdate => "late update",
            Self::FixedUpdate => "fixed update",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compile-time phase marker.
pub trait TickPhase: Send + 'static {
    /// Runtime tag of this phase.
    const KIND: PhaseKind;
}

/// Marker for the regular update phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdatePhase;

/// Marker for the late update phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct LatePhase;

/// Marker for the fixed update phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedPhase;

impl TickPhase for UpdatePhase {
    const KIND: PhaseKind = PhaseKind::Update;
}

impl TickPhase for LatePhase {
    const KIND: PhaseKind = PhaseKind::LateUpdate;
}

impl TickPhase for FixedPhase {
    const KIND: PhaseKind = PhaseKind::FixedUpdate;
}

/// Timing of one dispatch pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    /// Monotonic tick number assigned by the caller.
    pub tick: u64,
    /// Time covered by this phase invocation.
    pub delta: Duration,
}

impl Frame {
    /// Creates a frame.
    #[inline]
    #[must_use]
    pub const fn new(tick: u64, delta: Duration) -> Self {
        Self { tick, delta }
    }
}

/// A per-tick callback for phase `P`.
///
/// One type may implement this for several phases:
///
/// ```rust,ignore
/// impl Subscriber<UpdatePhase> for Camera { fn on_tick(&mut self, ctx: &mut TickContext<'_, UpdatePhase>) { .. } }
/// impl Subscriber<LatePhase> for Camera { fn on_tick(&mut self, ctx: &mut TickContext<'_, LatePhase>) { .. } }
/// ```
pub trait Subscriber<P: TickPhase>: Send {
    /// Runs once per pass.
    fn on_tick(&mut self, ctx: &mut TickContext<'_, P>);

    /// Inactive subscribers are skipped without being removed.
    fn is_active(&self) -> bool {
        true
    }
}

impl<P, F> Subscriber<P> for F
where
    P: TickPhase,
    F: FnMut(&mut TickContext<'_, P>) + Send,
{
    #[inline]
    fn on_tick(&mut self, ctx: &mut TickContext<'_, P>) {
        self(ctx);
    }
}
