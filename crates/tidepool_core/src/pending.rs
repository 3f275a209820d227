//! # One-Shot Completion
//!
//! `Pending<T>` is the receiving half of a value that will be produced later, on any
//! thread. `Completer<T>` is the producing half. A pending value can be consumed in
//! exactly one of three ways:
//!
//! - `wait()` blocks the calling thread
//! - `.await` suspends an async task
//! - `on_complete(f)` registers a continuation that runs on the completing thread
//!
//! ## Orphans
//!
//! If the receiver is dropped before (or after) the value arrives, the value is not
//! lost: it is handed to the orphan handler installed with `with_orphan`. Pool
//! engines use this to shelve instances whose requester went away.
//!
//! All user callbacks run with no internal lock held.

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::{Condvar, Mutex};

/// The completing side was dropped without producing a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("completion source dropped before producing a value")]
pub struct CompleterDropped;

type Continuation<T> = Box<dyn FnOnce(Result<T, CompleterDropped>) + Send>;
type OrphanHandler<T> = Box<dyn FnOnce(T) + Send>;

enum Slot<T> {
    Waiting {
        waker: Option<Waker>,
        continuation: Option<Continuation<T>>,
    },
    Ready(T),
    /// Value handed out; nothing left to do.
    Taken,
    /// Receiver dropped before the value arrived.
    Abandoned,
    /// Completer dropped without a value.
    Broken,
}

struct Inner<T> {
    slot: Slot<T>,
    orphan: Option<OrphanHandler<T>>,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    ready: Condvar,
}

impl<T> Shared<T> {
    fn new(slot: Slot<T>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner { slot, orphan: None }),
            ready: Condvar::new(),
        })
    }
}

/// Receiving half of a one-shot completion.
#[must_use = "a dropped Pending hands its value to the orphan handler"]
pub struct Pending<T> {
    shared: Option<Arc<Shared<T>>>,
}

/// Producing half of a one-shot completion.
pub struct Completer<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Pending<T> {
    /// Creates a connected receiver/producer pair.
    pub fn channel() -> (Pending<T>, Completer<T>) {
        let shared = Shared::new(Slot::Waiting {
            waker: None,
            continuation: None,
        });
        (
            Pending {
                shared: Some(Arc::clone(&shared)),
            },
            Completer {
                shared: Some(shared),
            },
        )
    }

    /// Creates a receiver that is already complete.
    pub fn ready(value: T) -> Self {
        Self {
            shared: Some(Shared::new(Slot::Ready(value))),
        }
    }

    /// Installs the handler that receives the value if this receiver is dropped
    /// without consuming it.
    pub fn with_orphan(self, handler: impl FnOnce(T) + Send + 'static) -> Self {
        if let Some(shared) = self.shared.as_ref() {
            shared.inner.lock().orphan = Some(Box::new(handler));
        }
        self
    }

    /// Returns true once a value (or a broken completer) is observable.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.shared.as_ref().map_or(true, |shared| {
            matches!(shared.inner.lock().slot, Slot::Ready(_) | Slot::Broken)
        })
    }

    /// Blocks until the value is produced.
    ///
    /// # Errors
    ///
    /// Returns `CompleterDropped` if the producer went away without a value.
    pub fn wait(mut self) -> Result<T, CompleterDropped> {
        let Some(shared) = self.shared.take() else {
            return Err(CompleterDropped);
        };

        let mut inner = shared.inner.lock();
        loop {
            match mem::replace(&mut inner.slot, Slot::Taken) {
                Slot::Ready(value) => return Ok(value),
                waiting @ Slot::Waiting { .. } => {
                    inner.slot = waiting;
                    shared.ready.wait(&mut inner);
                }
                Slot::Broken | Slot::Taken | Slot::Abandoned => return Err(CompleterDropped),
            }
        }
    }

    /// Registers a continuation that runs once with the outcome.
    ///
    /// If the value is already there, `callback` runs immediately on this thread.
    /// Otherwise it runs on the thread that completes the value.
    pub fn on_complete(
        mut self,
        callback: impl FnOnce(Result<T, CompleterDropped>) + Send + 'static,
    ) {
        let Some(shared) = self.shared.take() else {
            callback(Err(CompleterDropped));
            return;
        };

        let mut inner = shared.inner.lock();
        match mem::replace(&mut inner.slot, Slot::Taken) {
            Slot::Ready(value) => {
                drop(inner);
                callback(Ok(value));
            }
            Slot::Waiting { waker, .. } => {
                inner.slot = Slot::Waiting {
                    waker,
                    continuation: Some(Box::new(callback)),
                };
            }
            Slot::Broken | Slot::Taken | Slot::Abandoned => {
                drop(inner);
                callback(Err(CompleterDropped));
            }
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T, CompleterDropped>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(shared) = this.shared.as_ref() else {
            return Poll::Ready(Err(CompleterDropped));
        };

        let mut inner = shared.inner.lock();
        let outcome = match mem::replace(&mut inner.slot, Slot::Taken) {
            Slot::Ready(value) => Ok(value),
            Slot::Waiting { continuation, .. } => {
                inner.slot = Slot::Waiting {
                    waker: Some(cx.waker().clone()),
                    continuation,
                };
                return Poll::Pending;
            }
            Slot::Broken | Slot::Taken | Slot::Abandoned => Err(CompleterDropped),
        };
        drop(inner);
        this.shared = None;
        Poll::Ready(outcome)
    }
}

impl<T> Drop for Pending<T> {
    fn drop(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };

        let mut inner = shared.inner.lock();
        match mem::replace(&mut inner.slot, Slot::Abandoned) {
            Slot::Ready(value) => {
                let orphan = inner.orphan.take();
                drop(inner);
                if let Some(handler) = orphan {
                    handler(value);
                }
            }
            Slot::Waiting { .. } => {}
            other @ (Slot::Taken | Slot::Broken | Slot::Abandoned) => inner.slot = other,
        }
    }
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending")
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl<T> Completer<T> {
    /// Delivers the value.
    ///
    /// # Errors
    ///
    /// Hands the value back when the receiver is gone and no orphan handler
    /// was installed, so the caller can dispose of it.
    pub fn complete(mut self, value: T) -> Result<(), T> {
        let Some(shared) = self.shared.take() else {
            return Err(value);
        };

        let mut inner = shared.inner.lock();
        match mem::replace(&mut inner.slot, Slot::Taken) {
            Slot::Waiting {
                continuation: Some(continuation),
                ..
            } => {
                drop(inner);
                continuation(Ok(value));
                Ok(())
            }
            Slot::Waiting {
                waker,
                continuation: None,
            } => {
                inner.slot = Slot::Ready(value);
                drop(inner);
                shared.ready.notify_all();
                if let Some(waker) = waker {
                    waker.wake();
                }
                Ok(())
            }
            Slot::Abandoned => {
                inner.slot = Slot::Abandoned;
                let orphan = inner.orphan.take();
                drop(inner);
                match orphan {
                    Some(handler) => {
                        handler(value);
                        Ok(())
                    }
                    None => Err(value),
                }
            }
            other @ (Slot::Ready(_) | Slot::Taken | Slot::Broken) => {
                inner.slot = other;
                Err(value)
            }
        }
    }

    /// Returns true if the receiver was dropped without registering a continuation.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.shared
            .as_ref()
            .map_or(true, |shared| matches!(shared.inner.lock().slot, Slot::Abandoned))
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };

        let mut inner = shared.inner.lock();
        match mem::replace(&mut inner.slot, Slot::Broken) {
            Slot::Waiting {
                continuation: Some(continuation),
                ..
            } => {
                inner.slot = Slot::Taken;
                drop(inner);
                continuation(Err(CompleterDropped));
            }
            Slot::Waiting {
                waker,
                continuation: None,
            } => {
                drop(inner);
                shared.ready.notify_all();
                if let Some(waker) = waker {
                    waker.wake();
                }
            }
            other @ (Slot::Ready(_) | Slot::Taken | Slot::Abandoned | Slot::Broken) => {
                inner.slot = other;
            }
        }
    }
}

impl<T> std::fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completer")
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}
