//! # Host Seam
//!
//! Everything the coordinator needs from a game engine, in one trait. The host
//! hands out its two producers (synchronous prefabs and asynchronous assets) and,
//! optionally, resolves the string keys a pool manifest uses into real templates
//! and parents.

use tidepool_pool::Producer;

/// Template type of a host's prefab producer.
pub type PrefabTemplate<H> = <<H as Host>::Prefabs as Producer>::Template;
/// Parent type of a host's prefab producer.
pub type PrefabParent<H> = <<H as Host>::Prefabs as Producer>::Context;
/// Template type of a host's asset producer.
pub type AssetTemplate<H> = <<H as Host>::Assets as Producer>::Template;
/// Parent type of a host's asset producer.
pub type AssetParent<H> = <<H as Host>::Assets as Producer>::Context;

/// A game engine as seen by the coordinator.
///
/// Producers are requested each time an engine is (re)created, so they should be
/// cheap handles onto shared host state.
pub trait Host {
    /// Synchronous instantiation.
    type Prefabs: Producer;
    /// Asynchronous instantiation.
    type Assets: Producer;

    /// Creates the producer for the prefab engine.
    fn prefab_producer(&self) -> Self::Prefabs;

    /// Creates the producer for the asset engine.
    fn asset_producer(&self) -> Self::Assets;

    /// Resolves a manifest template key for a prefab pool.
    fn resolve_prefab(&self, key: &str) -> Option<<Self::Prefabs as Producer>::Template> {
        let _ = key;
        None
    }

    /// Resolves a manifest parent key for a prefab pool.
    fn resolve_prefab_parent(&self, key: &str) -> Option<<Self::Prefabs as Producer>::Context> {
        let _ = key;
        None
    }

    /// Resolves a manifest asset key for an asset pool.
    fn resolve_asset(&self, key: &str) -> Option<<Self::Assets as Producer>::Template> {
        let _ = key;
        None
    }

    /// Resolves a manifest parent key for an asset pool.
    fn resolve_asset_parent(&self, key: &str) -> Option<<Self::Assets as Producer>::Context> {
        let _ = key;
        None
    }
}
