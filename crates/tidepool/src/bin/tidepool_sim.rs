//! # TIDEPOOL Simulation
//!
//! Headless host that exercises the coordinator end to end: manifest loading,
//! synchronous prefab pools, asynchronous asset pools on a tokio runtime, delayed
//! returns, all three tick phases and time-sliced teardown.
//!
//! ```bash
//! # Built-in manifest
//! ./tidepool_sim
//!
//! # Custom manifest and tick count
//! ./tidepool_sim pools.toml 600
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tidepool::pool::{
    spawn_instantiation, AssetProducer, HostError, Instantiate, InstantiateAsync, PendingInstance,
    PrefabProducer,
};
use tidepool::tick::{Subscriber, TickContext, UpdatePhase};
use tidepool::{logging, Coordinator, Host, PoolManifest};
use tracing::{error, info, warn};

const DEFAULT_MANIFEST: &str = r#"
[disposal]
batch_size = 8
interval_ms = 32

[logging]
level = "info"

[[prefab]]
name = "bullets"
amount = 32
template = "bullet"
parent = "projectiles"

[[prefab]]
name = "shells"
amount = 8
template = "shell"
parent = "projectiles"

[[asset]]
name = "explosions"
amount = 4
template = "fx/explosion"
parent = "effects"
"#;

const DEFAULT_TICKS: u64 = 300;
const FRAME: Duration = Duration::from_millis(16);
const FIXED_STEP: Duration = Duration::from_millis(20);

// =============================================================================
// Headless scene
// =============================================================================

/// Scene node standing in for an engine object.
#[derive(Debug)]
#[allow(dead_code)]
struct Node {
    id: u64,
    template: String,
    active: bool,
    parent: u32,
}

/// Flat scene graph: node ids only, no rendering.
#[derive(Debug, Default)]
struct SceneGraph {
    next_id: AtomicU64,
    destroyed: AtomicU64,
}

impl SceneGraph {
    fn spawn(&self, template: &str, parent: u32) -> Node {
        Node {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            template: template.to_owned(),
            active: true,
            parent,
        }
    }

    fn despawn(&self, _node: Node) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Prefab side of the scene.
struct Spawner(Arc<SceneGraph>);

impl Instantiate for Spawner {
    type Template = String;
    type Instance = Node;
    type Parent = u32;

    fn instantiate(&self, template: &String, parent: &u32) -> Result<Node, HostError> {
        Ok(self.0.spawn(template, *parent))
    }

    fn set_active(&self, instance: &mut Node, active: bool) {
        instance.active = active;
    }

    fn set_parent(&self, instance: &mut Node, parent: &u32) {
        instance.parent = *parent;
    }

    fn destroy(&self, instance: Node) {
        self.0.despawn(instance);
    }

    fn root(&self) -> u32 {
        0
    }

    fn identity(&self, instance: &Node) -> Option<u64> {
        Some(instance.id)
    }
}

/// Loads assets on a runtime with a fixed latency.
#[derive(Clone)]
struct AssetLoader {
    scene: Arc<SceneGraph>,
    runtime: tokio::runtime::Handle,
    latency: Duration,
}

impl InstantiateAsync for AssetLoader {
    type Asset = String;
    type Instance = Node;
    type Parent = u32;

    fn instantiate_async(&self, asset: &String, parent: &u32) -> PendingInstance<Node> {
        let scene = Arc::clone(&self.scene);
        let asset = asset.clone();
        let parent = *parent;
        let latency = self.latency;
        spawn_instantiation(&self.runtime, async move {
            tokio::time::sleep(latency).await;
            Ok(scene.spawn(&asset, parent))
        })
    }

    fn set_active(&self, instance: &mut Node, active: bool) {
        instance.active = active;
    }

    fn set_parent(&self, instance: &mut Node, parent: &u32) {
        instance.parent = *parent;
    }

    fn destroy(&self, instance: Node) {
        self.scene.despawn(instance);
    }

    fn release_asset(&self, asset: &String) {
        info!(asset = %asset, "Asset released");
    }

    fn root(&self) -> u32 {
        0
    }

    fn identity(&self, instance: &Node) -> Option<u64> {
        Some(instance.id)
    }
}

struct SimHost {
    scene: Arc<SceneGraph>,
    loader: AssetLoader,
}

impl Host for SimHost {
    type Prefabs = PrefabProducer<Spawner>;
    type Assets = AssetProducer<AssetLoader>;

    fn prefab_producer(&self) -> Self::Prefabs {
        PrefabProducer::new(Spawner(Arc::clone(&self.scene)))
    }

    fn asset_producer(&self) -> Self::Assets {
        AssetProducer::new(self.loader.clone())
    }

    fn resolve_prefab(&self, key: &str) -> Option<String> {
        matches!(key, "bullet" | "shell").then(|| key.to_owned())
    }

    fn resolve_prefab_parent(&self, key: &str) -> Option<u32> {
        parent_handle(key)
    }

    fn resolve_asset(&self, key: &str) -> Option<String> {
        key.starts_with("fx/").then(|| key.to_owned())
    }

    fn resolve_asset_parent(&self, key: &str) -> Option<u32> {
        parent_handle(key)
    }
}

fn parent_handle(key: &str) -> Option<u32> {
    match key {
        "projectiles" => Some(1),
        "effects" => Some(2),
        _ => None,
    }
}

// =============================================================================
// Gameplay
// =============================================================================

/// Work the update subscribers ask the main loop to do.
#[derive(Debug)]
enum Command {
    Fire,
    Eject,
    Explode,
}

/// Fires on a fixed cadence.
struct Turret {
    commands: Sender<Command>,
}

impl Subscriber<UpdatePhase> for Turret {
    fn on_tick(&mut self, ctx: &mut TickContext<'_, UpdatePhase>) {
        let tick = ctx.tick();
        let _ = self.commands.send(Command::Fire);
        if tick % 4 == 0 {
            let _ = self.commands.send(Command::Eject);
        }
        if tick % 45 == 0 {
            let _ = self.commands.send(Command::Explode);
        }
    }
}

fn run_commands(
    coordinator: &mut Coordinator<SimHost>,
    commands: &Receiver<Command>,
    landed: &Sender<Node>,
) -> tidepool::TidepoolResult<()> {
    while let Ok(command) = commands.try_recv() {
        match command {
            Command::Fire => {
                let bullet = coordinator.prefabs().acquire("bullets")?;
                coordinator
                    .prefabs()
                    .release_after("bullets", bullet, Duration::from_millis(400))?;
            }
            Command::Eject => {
                let shell = coordinator.prefabs().acquire("shells")?;
                coordinator
                    .prefabs()
                    .release_after("shells", shell, Duration::from_secs(1))?;
            }
            Command::Explode => {
                let landed = landed.clone();
                coordinator.assets().acquire_with("explosions", move |result| match result {
                    Ok(node) => {
                        let _ = landed.send(node);
                    }
                    Err(err) => warn!(%err, "Explosion failed"),
                })?;
            }
        }
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let manifest = match args.next() {
        Some(path) => PoolManifest::from_file(path)?,
        None => PoolManifest::from_toml_str(DEFAULT_MANIFEST)?,
    };
    let ticks = match args.next() {
        Some(raw) => raw.parse()?,
        None => DEFAULT_TICKS,
    };
    if manifest.logging.is_none() {
        logging::init(tracing::Level::INFO);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()?;
    let scene = Arc::new(SceneGraph::default());
    let host = SimHost {
        scene: Arc::clone(&scene),
        loader: AssetLoader {
            scene: Arc::clone(&scene),
            runtime: runtime.handle().clone(),
            latency: Duration::from_millis(5),
        },
    };

    let mut coordinator = Coordinator::new(host);
    let pools = coordinator.load_manifest(&manifest)?;
    info!(pools, ticks, "Simulation starting");

    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    let (landed_tx, landed_rx) = crossbeam_channel::unbounded::<Node>();
    coordinator.subscribe::<UpdatePhase, _>(Turret {
        commands: command_tx,
    });

    let late_passes = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&late_passes);
    coordinator.on_late_update(move |ctx| {
        counter.fetch_add(1, Ordering::Relaxed);
        if ctx.tick() >= 120 {
            ctx.unsubscribe_self();
        }
    });

    let fixed_steps = Arc::new(AtomicU64::new(0));
    let steps = Arc::clone(&fixed_steps);
    coordinator.on_fixed_update(move |_ctx| {
        steps.fetch_add(1, Ordering::Relaxed);
    });

    let mut accumulator = Duration::ZERO;
    for _ in 0..ticks {
        coordinator.tick_update(FRAME);
        run_commands(&mut coordinator, &command_rx, &landed_tx)?;
        while let Ok(node) = landed_rx.try_recv() {
            coordinator
                .assets()
                .release_after("explosions", node, Duration::from_millis(250))?;
        }
        coordinator.tick_late(FRAME);

        accumulator += FRAME;
        while accumulator >= FIXED_STEP {
            coordinator.tick_fixed(FIXED_STEP);
            accumulator -= FIXED_STEP;
        }

        if coordinator.tick() % 100 == 0 {
            if let Some(engine) = coordinator.prefab_engine() {
                info!(tick = coordinator.tick(), stats = ?engine.stats(), "Prefab engine");
            }
        }
    }

    info!(
        late_passes = late_passes.load(Ordering::Relaxed),
        fixed_steps = fixed_steps.load(Ordering::Relaxed),
        late_active = coordinator.is_dispatcher_active(tidepool::tick::PhaseKind::LateUpdate),
        "Gameplay finished"
    );

    // Time-sliced teardown of the prefab engine, then everything else at once.
    let handle = coordinator.prefabs().dispose_all(true);
    while coordinator.prefab_engine().is_some() {
        coordinator.tick_update(FRAME);
    }
    info!(destroyed = handle.destroyed(), "Prefab pools drained");

    let destroyed = coordinator.shutdown();
    info!(
        destroyed,
        created = scene.next_id.load(Ordering::Relaxed),
        scene_destroyed = scene.destroyed.load(Ordering::Relaxed),
        "Simulation complete"
    );
    Ok(())
}

fn main() {
    println!("═══════════════════════════════════════════════════════════════════");
    println!("                    TIDEPOOL SIMULATION");
    println!("                       HEADLESS HOST");
    println!("═══════════════════════════════════════════════════════════════════");
    println!();

    if let Err(err) = run() {
        error!(%err, "Simulation failed");
        eprintln!("   ✗ FATAL: {err}");
        std::process::exit(1);
    }
}
