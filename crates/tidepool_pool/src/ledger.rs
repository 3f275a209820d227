//! # Ownership Ledger
//!
//! Debug-build diagnostics for caller mistakes the engine does not defend against:
//! releasing an instance twice, or releasing it into a pool other than the one that
//! created it. Both only produce a warning; the instance is pushed regardless, so
//! behavior matches release builds where the ledger compiles to nothing.
//!
//! Only instances with an identity (`Producer::identity`) are tracked.

use std::sync::Arc;

use crate::producer::InstanceId;

#[cfg(debug_assertions)]
mod tracked {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tracing::warn;

    use crate::producer::InstanceId;

    #[derive(Default)]
    struct Books {
        origin: HashMap<InstanceId, Arc<str>>,
        shelved: HashSet<InstanceId>,
    }

    #[derive(Default)]
    pub(crate) struct OwnershipLedger {
        books: Mutex<Books>,
        warnings: AtomicUsize,
    }

    impl OwnershipLedger {
        pub(crate) fn created(&self, id: InstanceId, pool: &Arc<str>) {
            self.books.lock().origin.insert(id, Arc::clone(pool));
        }

        pub(crate) fn acquired(&self, id: InstanceId) {
            self.books.lock().shelved.remove(&id);
        }

        pub(crate) fn shelved(&self, id: InstanceId) {
            self.books.lock().shelved.insert(id);
        }

        pub(crate) fn destroyed(&self, id: InstanceId) {
            let mut books = self.books.lock();
            books.origin.remove(&id);
            books.shelved.remove(&id);
        }

        pub(crate) fn check_release(&self, id: InstanceId, pool: &str) {
            let books = self.books.lock();
            if books.shelved.contains(&id) {
                self.warnings.fetch_add(1, Ordering::Relaxed);
                warn!(pool, instance = id, "Instance released twice");
            }
            if let Some(origin) = books.origin.get(&id) {
                if origin.as_ref() != pool {
                    self.warnings.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        pool,
                        origin = %origin,
                        instance = id,
                        "Instance released into a pool that did not create it"
                    );
                }
            }
        }

        pub(crate) fn warnings(&self) -> usize {
            self.warnings.load(Ordering::Relaxed)
        }
    }
}

#[cfg(not(debug_assertions))]
mod tracked {
    use std::sync::Arc;

    use crate::producer::InstanceId;

    #[derive(Default)]
    pub(crate) struct OwnershipLedger;

    impl OwnershipLedger {
        #[inline]
        pub(crate) fn created(&self, _id: InstanceId, _pool: &Arc<str>) {}
        #[inline]
        pub(crate) fn acquired(&self, _id: InstanceId) {}
        #[inline]
        pub(crate) fn shelved(&self, _id: InstanceId) {}
        #[inline]
        pub(crate) fn destroyed(&self, _id: InstanceId) {}
        #[inline]
        pub(crate) fn check_release(&self, _id: InstanceId, _pool: &str) {}
        #[inline]
        pub(crate) fn warnings(&self) -> usize {
            0
        }
    }
}

pub(crate) use tracked::OwnershipLedger;

impl OwnershipLedger {
    pub(crate) fn track_created(&self, id: Option<InstanceId>, pool: &Arc<str>) {
        if let Some(id) = id {
            self.created(id, pool);
        }
    }
}
