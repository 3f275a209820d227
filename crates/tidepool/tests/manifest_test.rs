//! Integration test for declaring pools in a TOML manifest.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tidepool::pool::{
    AssetProducer, DisposalConfig, HostError, Instantiate, InstantiateAsync, PendingInstance,
    PrefabProducer,
};
use tidepool::Pending;
use tidepool::{Coordinator, Host, ManifestError, PoolManifest, TidepoolError};
use tracing::level_filters::LevelFilter;

#[derive(Debug)]
struct Prop {
    kind: String,
    layer: u8,
}

#[derive(Default)]
struct Workshop {
    built: AtomicU64,
}

impl Workshop {
    fn build(&self, template: &str, parent: u8) -> Prop {
        self.built.fetch_add(1, Ordering::SeqCst);
        Prop {
            kind: template.to_owned(),
            layer: parent,
        }
    }
}

struct Bench(Arc<Workshop>);

impl Instantiate for Bench {
    type Template = String;
    type Instance = Prop;
    type Parent = u8;

    fn instantiate(&self, template: &String, parent: &u8) -> Result<Prop, HostError> {
        Ok(self.0.build(template, *parent))
    }

    fn set_active(&self, _instance: &mut Prop, _active: bool) {}

    fn set_parent(&self, instance: &mut Prop, parent: &u8) {
        instance.layer = *parent;
    }

    fn destroy(&self, _instance: Prop) {}

    fn root(&self) -> u8 {
        0
    }
}

struct Catalog(Arc<Workshop>);

impl InstantiateAsync for Catalog {
    type Asset = String;
    type Instance = Prop;
    type Parent = u8;

    fn instantiate_async(&self, asset: &String, parent: &u8) -> PendingInstance<Prop> {
        Pending::ready(Ok(self.0.build(asset, *parent)))
    }

    fn set_active(&self, _instance: &mut Prop, _active: bool) {}

    fn set_parent(&self, instance: &mut Prop, parent: &u8) {
        instance.layer = *parent;
    }

    fn destroy(&self, _instance: Prop) {}

    fn release_asset(&self, _asset: &String) {}

    fn root(&self) -> u8 {
        0
    }
}

struct WorkshopHost(Arc<Workshop>);

impl Host for WorkshopHost {
    type Prefabs = PrefabProducer<Bench>;
    type Assets = AssetProducer<Catalog>;

    fn prefab_producer(&self) -> Self::Prefabs {
        PrefabProducer::new(Bench(Arc::clone(&self.0)))
    }

    fn asset_producer(&self) -> Self::Assets {
        AssetProducer::new(Catalog(Arc::clone(&self.0)))
    }

    fn resolve_prefab(&self, key: &str) -> Option<String> {
        matches!(key, "crate" | "barrel").then(|| key.to_owned())
    }

    fn resolve_prefab_parent(&self, key: &str) -> Option<u8> {
        (key == "props").then_some(3)
    }

    fn resolve_asset(&self, key: &str) -> Option<String> {
        key.strip_prefix("fx/").map(str::to_owned)
    }
}

const MANIFEST: &str = r#"
[disposal]
batch_size = 2
interval_ms = 10

[[prefab]]
name = "crates"
amount = 3
template = "crate"
parent = "props"

[[prefab]]
name = "barrels"
amount = 1
template = "barrel"

[[asset]]
name = "sparks"
amount = 2
template = "fx/spark"
"#;

fn setup() -> (Coordinator<WorkshopHost>, Arc<Workshop>) {
    let workshop = Arc::new(Workshop::default());
    (
        Coordinator::new(WorkshopHost(Arc::clone(&workshop))),
        workshop,
    )
}

#[test]
fn test_manifest_creates_every_pool() {
    let (mut coordinator, workshop) = setup();
    let manifest = PoolManifest::from_toml_str(MANIFEST).unwrap();

    assert_eq!(coordinator.load_manifest(&manifest).unwrap(), 3);
    assert_eq!(workshop.built.load(Ordering::SeqCst), 6);
    assert_eq!(coordinator.prefabs().pool_count("crates").unwrap(), 3);
    assert_eq!(coordinator.prefabs().pool_count("barrels").unwrap(), 1);
    assert_eq!(coordinator.assets().pool_count("sparks").unwrap(), 2);

    coordinator
        .prefabs()
        .for_each_available("crates", |prop| assert_eq!(prop.layer, 3))
        .unwrap();
    coordinator
        .prefabs()
        .for_each_available("barrels", |prop| assert_eq!(prop.layer, 0))
        .unwrap();
    coordinator
        .assets()
        .for_each_available("sparks", |prop| assert_eq!(prop.kind, "spark"))
        .unwrap();
}

#[test]
fn test_manifest_disposal_settings_apply_to_engines() {
    let (mut coordinator, _workshop) = setup();
    let manifest = PoolManifest::from_toml_str(MANIFEST).unwrap();
    coordinator.load_manifest(&manifest).unwrap();

    let expected = DisposalConfig {
        batch_size: 2,
        interval: Duration::from_millis(10),
    };
    assert_eq!(coordinator.config().disposal, expected);
    assert_eq!(coordinator.prefabs().disposal_config(), expected);

    // 4 prefab instances at 2 per batch, one batch per 10ms.
    let handle = coordinator.prefabs().dispose_all(true);
    coordinator.tick_update(Duration::from_millis(10));
    assert!(!handle.is_complete());
    assert_eq!(handle.destroyed(), 2);
    coordinator.tick_update(Duration::from_millis(10));
    assert!(handle.is_complete());
    assert!(coordinator.prefab_engine().is_none());
}

#[test]
fn test_unknown_template_creates_nothing() {
    let (mut coordinator, workshop) = setup();
    let manifest = PoolManifest::from_toml_str(
        r#"
        [[prefab]]
        name = "crates"
        amount = 2
        template = "crate"

        [[prefab]]
        name = "anvils"
        amount = 1
        template = "anvil"
        "#,
    )
    .unwrap();

    match coordinator.load_manifest(&manifest) {
        Err(TidepoolError::Manifest(ManifestError::UnknownTemplate { pool, template })) => {
            assert_eq!(pool, "anvils");
            assert_eq!(template, "anvil");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(workshop.built.load(Ordering::SeqCst), 0);
    assert!(coordinator.prefab_engine().is_none());
}

#[test]
fn test_unknown_parent() {
    let (mut coordinator, _workshop) = setup();
    let manifest = PoolManifest::from_toml_str(
        r#"
        [[asset]]
        name = "sparks"
        template = "fx/spark"
        parent = "props"
        "#,
    )
    .unwrap();

    let err = coordinator.load_manifest(&manifest).unwrap_err();
    assert_eq!(err.to_string(), "pool `sparks` names unknown parent `props`");
}

#[test]
fn test_manifest_from_file() {
    let path = std::env::temp_dir().join(format!("tidepool_manifest_{}.toml", std::process::id()));
    {
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();
    }

    let manifest = PoolManifest::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(manifest.pool_count(), 3);
    assert_eq!(manifest.prefabs[0].name, "crates");
    assert_eq!(manifest.assets[0].amount, 2);
}

#[test]
fn test_logging_table_installs_formatter() {
    let (mut coordinator, _workshop) = setup();
    let manifest = PoolManifest::from_toml_str(
        r#"
        [logging]
        level = "warn"
        "#,
    )
    .unwrap();

    // The only manifest in this binary with a `[logging]` table.
    assert_eq!(coordinator.load_manifest(&manifest).unwrap(), 0);
    assert_eq!(LevelFilter::current(), LevelFilter::WARN);
    assert!(!manifest.logging.unwrap().install());
}
