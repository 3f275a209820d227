//! # Singleton Locator
//!
//! Create-or-find access to process-wide manager instances.
//!
//! ## Design
//!
//! Every instance is registered under a tag derived from its type name
//! (`"<TypeName>Singleton"`), so a subsystem that never saw the creating call site
//! still finds the same instance. The registry is an explicit object (`Locator`);
//! `Locator::global()` exists for the few call sites that genuinely cross module
//! boundaries, everything else should receive a `Locator` or the instance itself.
//!
//! Creation is serialized by a reentrant lock, so at most one instance of a type is
//! ever built under concurrent first access, and a `Service::create` implementation
//! may itself resolve other services from the same locator.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::debug;

use crate::maybe::Maybe;

/// A process-wide manager reachable through a `Locator`.
pub trait Service: Send + Sync + 'static {
    /// Builds the instance on first access.
    fn create() -> Self
    where
        Self: Sized;

    /// Persistent services survive `Locator::unload_transient`.
    fn is_persistent() -> bool
    where
        Self: Sized,
    {
        false
    }

    /// Runs when the instance is removed from its locator.
    ///
    /// Callers still holding an `Arc` keep a valid (but retired) instance.
    fn on_dispose(&self) {}
}

type ErasedInstance = Arc<dyn Any + Send + Sync>;

struct Entry {
    instance: ErasedInstance,
    dispose: fn(&(dyn Any + Send + Sync)),
    persistent: bool,
}

fn dispose_erased<T: Service>(instance: &(dyn Any + Send + Sync)) {
    if let Some(service) = instance.downcast_ref::<T>() {
        service.on_dispose();
    }
}

/// Returns the registry tag for `T`.
#[must_use]
pub fn tag_of<T: ?Sized>() -> String {
    format!("{}Singleton", type_name::<T>())
}

/// Registry of singleton instances, keyed by tag.
pub struct Locator {
    entries: Mutex<HashMap<String, Entry>>,
    creation: ReentrantMutex<()>,
}

impl Locator {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            creation: ReentrantMutex::new(()),
        }
    }

    /// Returns the process-wide registry.
    pub fn global() -> &'static Locator {
        static GLOBAL: OnceLock<Locator> = OnceLock::new();
        GLOBAL.get_or_init(Locator::new)
    }

    /// Returns the instance of `T`, creating and registering it if absent.
    pub fn instance<T: Service>(&self) -> Arc<T> {
        if let Some(found) = self.lookup::<T>() {
            return found;
        }

        let _creating = self.creation.lock();
        // Another thread may have finished creating while we waited.
        if let Some(found) = self.lookup::<T>() {
            return found;
        }

        let instance = Arc::new(T::create());
        self.insert(Arc::clone(&instance));
        debug!(tag = %tag_of::<T>(), "Singleton created");
        instance
    }

    /// Returns the registered instance of `T` without creating one.
    #[must_use]
    pub fn find<T: Service>(&self) -> Maybe<Arc<T>> {
        self.lookup::<T>().into()
    }

    /// Registers an externally built instance, replacing any previous one.
    ///
    /// The replaced instance is disposed.
    pub fn register<T: Service>(&self, instance: T) -> Arc<T> {
        let instance = Arc::new(instance);
        if let Some(previous) = self.insert(Arc::clone(&instance)) {
            (previous.dispose)(previous.instance.as_ref());
        }
        instance
    }

    /// Returns true if no instance of `T` is registered. Never creates one.
    #[must_use]
    pub fn is_null<T: Service>(&self) -> bool {
        !self.entries.lock().contains_key(&tag_of::<T>())
    }

    /// Unregisters and disposes the instance of `T`.
    ///
    /// Returns false if there was nothing to dispose. The next `instance` call
    /// builds a fresh one.
    pub fn dispose<T: Service>(&self) -> bool {
        let removed = self.entries.lock().remove(&tag_of::<T>());
        match removed {
            Some(entry) => {
                (entry.dispose)(entry.instance.as_ref());
                debug!(tag = %tag_of::<T>(), "Singleton disposed");
                true
            }
            None => false,
        }
    }

    /// Disposes every non-persistent instance. Returns how many were removed.
    pub fn unload_transient(&self) -> usize {
        let removed: Vec<Entry> = {
            let mut entries = self.entries.lock();
            let tags: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| !entry.persistent)
                .map(|(tag, _)| tag.clone())
                .collect();
            tags.iter().filter_map(|tag| entries.remove(tag)).collect()
        };

        for entry in &removed {
            (entry.dispose)(entry.instance.as_ref());
        }
        removed.len()
    }

    /// Number of registered instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn lookup<T: Service>(&self) -> Option<Arc<T>> {
        let entries = self.entries.lock();
        let entry = entries.get(&tag_of::<T>())?;
        Arc::clone(&entry.instance).downcast::<T>().ok()
    }

    fn insert<T: Service>(&self, instance: Arc<T>) -> Option<Entry> {
        let entry = Entry {
            instance,
            dispose: dispose_erased::<T>,
            persistent: T::is_persistent(),
        };
        self.entries.lock().insert(tag_of::<T>(), entry)
    }
}

impl Default for Locator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locator")
            .field("registered", &self.len())
            .finish()
    }
}

/// Typed accessor over the global locator.
///
/// Usable in a `static`:
///
/// ```rust,ignore
/// static AUDIO: Singleton<AudioManager> = Singleton::new();
/// let audio = AUDIO.instance();
/// ```
pub struct Singleton<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Service> Singleton<T> {
    /// Creates the accessor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Returns the instance, creating it on first access.
    #[must_use]
    pub fn instance(&self) -> Arc<T> {
        Locator::global().instance::<T>()
    }

    /// Returns true if the instance does not currently exist.
    #[must_use]
    pub fn is_null(&self) -> bool {
        Locator::global().is_null::<T>()
    }

    /// Disposes the instance; the next access recreates it.
    pub fn dispose(&self) -> bool {
        Locator::global().dispose::<T>()
    }
}

impl<T: Service> Default for Singleton<T> {
    fn default() -> Self {
        Self::new()
    }
}
