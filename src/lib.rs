/*!
 # mc-manager

 A Rust library for installing, supervising and administering Minecraft
 game-server processes on a single host.

 ## Overview

 mc-manager provides functionality to:
 - Create server instances (vanilla, spigot or craftbukkit) with
   asynchronous installation
 - Start and stop server processes and observe their lifecycle
 - Send player-administration console commands (ban, kick, op, ...)
 - Sample per-process CPU/memory usage and stream output deltas to
   subscribers
 - Persist the registry across restarts

 ## Basic Usage

 ```no_run
 use mc_manager::{Action, ManagerConfig, ServerManager, CreateServer, Flavor};

 #[tokio::main]
 async fn main() -> mc_manager::Result<()> {
     let config = ManagerConfig::with_data_dir("/var/lib/mc-manager");
     let manager = ServerManager::new(config).await?;

     // Create a server; installation runs in the background.
     let id = manager
         .create(CreateServer {
             name: "My Server".to_string(),
             flavor: Flavor::Vanilla,
             version: "1.18.1".to_string(),
             ..Default::default()
         })
         .await?;

     // Later: start it and watch its status.
     let outcome = manager.perform_action(id, Action::Start).await;
     println!("{}: {}", outcome.success, outcome.message);

     let status = manager.get_status(id).await?;
     println!("status: {}", status);

     Ok(())
 }
 ```
*/

pub mod action;
pub mod build;
pub mod catalog;
pub mod config;
pub mod error;
pub mod process;
pub mod server;

pub use action::{Action, ActionOutcome, PlayerVerb};
pub use config::ManagerConfig;
pub use error::{Error, Result};
pub use process::{MonitorConfig, ProcessControl, ProcessMonitor, ProcessSnapshot, ProcessSupervisor};
pub use server::{Flavor, ManagedServer, ServerData, ServerStatus};

use build::{ArtifactBuilder, BuildQueue, BuildToolsBuilder};
use catalog::{RemoteCatalog, StaticCatalog, VersionCatalog};
use serde::Deserialize;
use server::{
    HardwareConfig, InstallMeta, NetworkConfig, NoQuery, PathData, PersistedServer, PlayerQuery,
    WorldOptions,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Ids are 4-digit handles, unique while the record lives.
const ID_RANGE: std::ops::Range<u32> = 1000..9999;

/// Request payload for creating a server instance.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateServer {
    /// Display name; immutable after creation.
    pub name: String,
    /// Build flavor to install.
    pub flavor: Flavor,
    /// Version identifier, resolved through the catalog.
    pub version: String,
    /// World seed; empty means a random seed.
    #[serde(default)]
    pub seed: String,
    /// One of adventure, creative, survival, spectator.
    #[serde(default = "CreateServer::default_gamemode")]
    pub gamemode: String,
    /// One of default, flat, largebiomes, amplified.
    #[serde(default = "CreateServer::default_leveltype")]
    pub leveltype: String,
}

impl CreateServer {
    fn default_gamemode() -> String {
        "survival".to_string()
    }

    fn default_leveltype() -> String {
        "default".to_string()
    }

    fn world_options(&self) -> WorldOptions {
        WorldOptions {
            seed: self.seed.clone(),
            gamemode: self.gamemode.clone(),
            leveltype: self.leveltype.clone(),
        }
    }
}

impl Default for CreateServer {
    fn default() -> Self {
        Self {
            name: String::new(),
            flavor: Flavor::Vanilla,
            version: String::new(),
            seed: String::new(),
            gamemode: Self::default_gamemode(),
            leveltype: Self::default_leveltype(),
        }
    }
}

#[derive(Debug, Default, serde::Serialize, Deserialize)]
struct PersistedRegistry {
    servers: HashMap<u32, PersistedServer>,
}

struct ManagerInner {
    config: ManagerConfig,
    control: Arc<dyn ProcessControl>,
    catalog: Arc<dyn VersionCatalog>,
    query: Arc<dyn PlayerQuery>,
    builds: Arc<BuildQueue>,
    servers: Mutex<HashMap<u32, ManagedServer>>,
    monitor: StdMutex<Option<ProcessMonitor>>,
    reconciler: StdMutex<Option<JoinHandle<()>>>,
}

/// The server registry: owns every [`ManagedServer`] keyed by id and
/// routes creation, deletion, persistence and action dispatch.
///
/// Cloning is cheap and shares the same registry. All public methods are
/// instrumented with `tracing` spans.
#[derive(Clone)]
pub struct ServerManager {
    inner: Arc<ManagerInner>,
}

impl ServerManager {
    /// Create a manager with production wiring: a real process
    /// supervisor with its monitor loop started, a remote catalog (when
    /// a manifest URL is configured), and the BuildTools pipeline.
    ///
    /// Reloads the persisted registry snapshot if one exists; reloaded
    /// records never carry a live process.
    #[tracing::instrument(skip(config), fields(data_dir = %config.data_dir.display()))]
    pub async fn new(config: ManagerConfig) -> Result<Self> {
        config::validate_config(&config)?;

        let supervisor = ProcessSupervisor::new();
        let mut monitor = ProcessMonitor::new(
            supervisor.clone(),
            MonitorConfig {
                tick: Duration::from_millis(config.monitor_tick_ms),
                resource_interval: Duration::from_millis(config.resource_interval_ms),
            },
        );
        monitor.start();

        let catalog: Arc<dyn VersionCatalog> = match &config.catalog_manifest_url {
            Some(url) => Arc::new(RemoteCatalog::populate(url.clone()).await),
            None => Arc::new(StaticCatalog::default()),
        };
        let builder: Arc<dyn ArtifactBuilder> = Arc::new(BuildToolsBuilder::new(config.build_dir()));

        Self::assemble(
            config,
            Arc::new(supervisor),
            catalog,
            Arc::new(NoQuery),
            builder,
            Some(monitor),
        )
        .await
    }

    /// Create a manager with injected collaborators and no monitor loop.
    /// Intended for embedders and tests that fake the process layer.
    pub async fn with_collaborators(
        config: ManagerConfig,
        control: Arc<dyn ProcessControl>,
        catalog: Arc<dyn VersionCatalog>,
        query: Arc<dyn PlayerQuery>,
        builder: Arc<dyn ArtifactBuilder>,
    ) -> Result<Self> {
        config::validate_config(&config)?;
        Self::assemble(config, control, catalog, query, builder, None).await
    }

    async fn assemble(
        config: ManagerConfig,
        control: Arc<dyn ProcessControl>,
        catalog: Arc<dyn VersionCatalog>,
        query: Arc<dyn PlayerQuery>,
        builder: Arc<dyn ArtifactBuilder>,
        monitor: Option<ProcessMonitor>,
    ) -> Result<Self> {
        let tick = Duration::from_millis(config.monitor_tick_ms);
        let manager = Self {
            inner: Arc::new(ManagerInner {
                config,
                control,
                catalog,
                query,
                builds: Arc::new(BuildQueue::new(builder)),
                servers: Mutex::new(HashMap::new()),
                monitor: StdMutex::new(monitor),
                reconciler: StdMutex::new(None),
            }),
        };
        manager.load_snapshot().await?;
        manager.spawn_reconciler(tick);
        Ok(manager)
    }

    /// Background reconciliation: every tick, re-derive each record's
    /// runtime state from supervisor observations, so stop completion and
    /// deadline escalation happen without anyone polling the API.
    ///
    /// The task holds only a weak handle on the registry and exits once
    /// the last [`ServerManager`] clone is dropped.
    fn spawn_reconciler(&self, tick: Duration) {
        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };

                let persist = {
                    let mut servers = inner.servers.lock().await;
                    let mut persist = false;
                    for record in servers.values_mut() {
                        persist |= record.reconcile().await;
                    }
                    persist
                };
                if persist {
                    if let Err(e) = persist_inner(&inner).await {
                        tracing::warn!(error = %e, "Failed to persist registry snapshot");
                    }
                }
            }
        });

        let mut guard = self
            .inner
            .reconciler
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *guard = Some(task);
    }

    async fn load_snapshot(&self) -> Result<()> {
        let path = self.inner.config.snapshot_path();
        if !path.is_file() {
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::Io(format!("Failed to read registry snapshot: {}", e)))?;
        let registry: PersistedRegistry = serde_json::from_str(&content)?;

        let stop_timeout = Duration::from_secs(self.inner.config.stop_timeout_secs);
        let mut servers = self.inner.servers.lock().await;
        for (id, persisted) in registry.servers {
            let record = ManagedServer::from_persisted(
                persisted,
                Arc::clone(&self.inner.control),
                Arc::clone(&self.inner.query),
                stop_timeout,
            );
            servers.insert(id, record);
        }
        tracing::info!(count = servers.len(), "Registry snapshot loaded");
        Ok(())
    }

    /// Write the full registry snapshot to durable storage.
    async fn persist(&self) -> Result<()> {
        persist_inner(&self.inner).await
    }

    async fn persist_or_warn(&self) {
        if let Err(e) = self.persist().await {
            tracing::warn!(error = %e, "Failed to persist registry snapshot");
        }
    }

    /// Create a new server instance.
    ///
    /// Allocates a fresh id and a free ephemeral port, inserts the record
    /// (observable as `Installing`) and returns the id immediately;
    /// installation continues on a background task. Install failure is
    /// visible through the status projection: `installed` stays false and
    /// the install error is recorded on the record.
    #[tracing::instrument(skip(self, spec), fields(name = %spec.name, version = %spec.version))]
    pub async fn create(&self, spec: CreateServer) -> Result<u32> {
        if spec.name.trim().is_empty() {
            return Err(Error::Validation("Server name must not be empty".to_string()));
        }
        if spec.version.trim().is_empty() {
            return Err(Error::Validation("Server version must not be empty".to_string()));
        }

        let opts = spec.world_options();
        let stop_timeout = Duration::from_secs(self.inner.config.stop_timeout_secs);

        let id = {
            let mut servers = self.inner.servers.lock().await;
            let id = allocate_id(&servers);
            let port = allocate_port(&servers)?;

            let record = ManagedServer::new(
                id,
                spec.name.clone(),
                NetworkConfig { port },
                HardwareConfig {
                    heap_mb: self.inner.config.default_heap_mb,
                },
                PathData::for_instance(&self.inner.config.servers_dir(), id, spec.flavor),
                InstallMeta {
                    version: spec.version.clone(),
                    flavor: spec.flavor,
                    installed: false,
                    created_at: chrono::Utc::now(),
                    error: None,
                },
                Arc::clone(&self.inner.control),
                Arc::clone(&self.inner.query),
                stop_timeout,
            );
            servers.insert(id, record);
            tracing::info!(id, port, "Server record created");
            id
        };

        self.persist_or_warn().await;
        self.spawn_install(id, opts);
        Ok(id)
    }

    fn spawn_install(&self, id: u32, opts: WorldOptions) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let (paths, network, version, flavor) = {
                let servers = inner.servers.lock().await;
                match servers.get(&id) {
                    Some(record) => (
                        record.paths().clone(),
                        NetworkConfig {
                            port: record.port(),
                        },
                        record.install_meta().version.clone(),
                        record.install_meta().flavor,
                    ),
                    // Deleted before the install worker got scheduled.
                    None => return,
                }
            };

            match server::install::run_install(
                &paths,
                &network,
                &version,
                flavor,
                &opts,
                &*inner.catalog,
                &inner.builds,
            )
            .await
            {
                Ok(props) => {
                    {
                        let mut servers = inner.servers.lock().await;
                        if let Some(record) = servers.get_mut(&id) {
                            record.complete_install(props);
                            tracing::info!(id, version = %version, "Install complete");
                        }
                    }
                    if let Err(e) = persist_inner(&inner).await {
                        tracing::warn!(id, error = %e, "Failed to persist after install");
                    }
                }
                Err(e) => {
                    tracing::error!(id, version = %version, error = %e, "Install failed");
                    let mut servers = inner.servers.lock().await;
                    if let Some(record) = servers.get_mut(&id) {
                        record.record_install_failure(e.to_string());
                    }
                }
            }
        });
    }

    /// Delete a server instance: stop its process if one is live (with
    /// bounded escalation), then remove its filesystem subtree and its
    /// record, and persist the change.
    ///
    /// The record stays registered until the process is confirmed gone;
    /// if it survives both the graceful stop and the hard terminate, an
    /// error is returned and the server remains manageable.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: u32) -> Result<()> {
        let pid = {
            let mut servers = self.inner.servers.lock().await;
            let record = servers
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("Server {}", id)))?;
            record.reconcile().await;
            if record.pid().is_some() {
                let _ = record.stop().await;
            }
            record.pid()
        };

        if let Some(pid) = pid {
            let stop_timeout = Duration::from_secs(self.inner.config.stop_timeout_secs);
            if !wait_for_exit(&*self.inner.control, pid, stop_timeout).await {
                tracing::warn!(id, pid, "Graceful stop timed out during delete, terminating");
                if let Err(e) = self.inner.control.kill(pid).await {
                    if self.inner.control.is_alive(pid).await {
                        return Err(Error::Process(format!(
                            "Server {} process {} could not be terminated: {}",
                            id, pid, e
                        )));
                    }
                }
                if !wait_for_exit(&*self.inner.control, pid, Duration::from_secs(5)).await {
                    return Err(Error::Process(format!(
                        "Server {} process {} survived termination",
                        id, pid
                    )));
                }
            }
        }

        let Some(record) = self.inner.servers.lock().await.remove(&id) else {
            // Removed concurrently while the process was being stopped.
            return Ok(());
        };

        let base_dir = record.paths().base_dir.clone();
        if let Err(e) = tokio::fs::remove_dir_all(&base_dir).await {
            if base_dir.exists() {
                tracing::warn!(id, error = %e, "Failed to remove instance directory");
            }
        }

        self.persist_or_warn().await;
        tracing::info!(id, "Server deleted");
        Ok(())
    }

    /// Perform a validated action on a server.
    ///
    /// Always returns a definite outcome; an unknown id yields a failed
    /// outcome rather than an error, matching the start/stop contracts.
    #[tracing::instrument(skip(self))]
    pub async fn perform_action(&self, id: u32, action: Action) -> ActionOutcome {
        let (outcome, persist) = {
            let mut servers = self.inner.servers.lock().await;
            let Some(record) = servers.get_mut(&id) else {
                return ActionOutcome::failed("Server not found");
            };
            let persist = record.reconcile().await;
            let outcome = match action {
                Action::Start => record.start().await,
                Action::Stop => record.stop().await,
                Action::Player { verb, target } => record.player_command(verb, &target).await,
            };
            (outcome, persist)
        };

        if persist {
            self.persist_or_warn().await;
        }
        outcome
    }

    /// Start a server. Shorthand for [`perform_action`](Self::perform_action).
    pub async fn start(&self, id: u32) -> ActionOutcome {
        self.perform_action(id, Action::Start).await
    }

    /// Stop a server gracefully.
    pub async fn stop(&self, id: u32) -> ActionOutcome {
        self.perform_action(id, Action::Stop).await
    }

    /// Send a player-administration command to a running server.
    pub async fn player_command(&self, id: u32, verb: PlayerVerb, target: &str) -> ActionOutcome {
        self.perform_action(
            id,
            Action::Player {
                verb,
                target: target.to_string(),
            },
        )
        .await
    }

    /// Hard-terminate a server's process. An explicit fallback for stuck
    /// processes; never invoked automatically in place of a graceful
    /// stop.
    #[tracing::instrument(skip(self))]
    pub async fn kill(&self, id: u32) -> ActionOutcome {
        let mut servers = self.inner.servers.lock().await;
        let Some(record) = servers.get_mut(&id) else {
            return ActionOutcome::failed("Server not found");
        };
        record.reconcile().await;
        record.kill().await
    }

    /// Current observed status of one server.
    #[tracing::instrument(skip(self))]
    pub async fn get_status(&self, id: u32) -> Result<ServerStatus> {
        let (status, persist) = {
            let mut servers = self.inner.servers.lock().await;
            let record = servers
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("Server {}", id)))?;
            let persist = record.reconcile().await;
            (record.status(), persist)
        };
        if persist {
            self.persist_or_warn().await;
        }
        Ok(status)
    }

    /// Full projection of one server.
    #[tracing::instrument(skip(self))]
    pub async fn get_data(&self, id: u32) -> Result<ServerData> {
        let (data, persist) = {
            let mut servers = self.inner.servers.lock().await;
            let record = servers
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("Server {}", id)))?;
            let persist = record.reconcile().await;
            (record.data().await, persist)
        };
        if persist {
            self.persist_or_warn().await;
        }
        Ok(data)
    }

    /// Projections for every registered server.
    #[tracing::instrument(skip(self))]
    pub async fn get_all_data(&self) -> HashMap<u32, ServerData> {
        let (all, persist) = {
            let mut servers = self.inner.servers.lock().await;
            let mut all = HashMap::with_capacity(servers.len());
            let mut persist = false;
            for (id, record) in servers.iter_mut() {
                persist |= record.reconcile().await;
                all.insert(*id, record.data().await);
            }
            (all, persist)
        };
        if persist {
            self.persist_or_warn().await;
        }
        all
    }

    /// Ids of every registered server.
    pub async fn server_ids(&self) -> Vec<u32> {
        self.inner.servers.lock().await.keys().copied().collect()
    }

    /// Version identifiers the catalog can currently resolve.
    pub async fn versions(&self) -> Vec<String> {
        self.inner.catalog.versions().await
    }

    /// Subscribe to the periodic per-instance snapshot stream
    /// ({cpu, memory, output delta}), pushed at the monitor's resource
    /// cadence while the process lives.
    #[tracing::instrument(skip(self))]
    pub async fn subscribe(&self, id: u32) -> Result<broadcast::Receiver<ProcessSnapshot>> {
        let pid = {
            let mut servers = self.inner.servers.lock().await;
            let record = servers
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("Server {}", id)))?;
            record.reconcile().await;
            record
                .pid()
                .ok_or_else(|| Error::InvalidState("Server is not running".to_string()))?
        };
        self.inner
            .control
            .subscribe(pid)
            .await
            .ok_or_else(|| Error::InvalidState("Server is not running".to_string()))
    }

    /// Stop every running server gracefully and shut the monitor loop
    /// down.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let ids = self.server_ids().await;
        for id in ids {
            let outcome = self.stop(id).await;
            if !outcome.success && outcome.message != "Server is not running" {
                tracing::warn!(id, message = %outcome.message, "Shutdown stop failed");
            }
        }

        let reconciler = {
            let mut guard = self
                .inner
                .reconciler
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(task) = reconciler {
            task.abort();
        }

        let monitor = {
            let mut guard = self.inner.monitor.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(mut monitor) = monitor {
            monitor.stop();
        }
    }
}

async fn persist_inner(inner: &ManagerInner) -> Result<()> {
    let registry = {
        let servers = inner.servers.lock().await;
        PersistedRegistry {
            servers: servers
                .iter()
                .map(|(id, record)| (*id, record.to_persisted()))
                .collect(),
        }
    };

    tokio::fs::create_dir_all(&inner.config.data_dir)
        .await
        .map_err(|e| Error::Io(format!("Failed to create data dir: {}", e)))?;
    let content = serde_json::to_string_pretty(&registry)?;
    tokio::fs::write(inner.config.snapshot_path(), content)
        .await
        .map_err(|e| Error::Io(format!("Failed to write registry snapshot: {}", e)))?;
    Ok(())
}

fn allocate_id(servers: &HashMap<u32, ManagedServer>) -> u32 {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    loop {
        let candidate = rng.gen_range(ID_RANGE);
        if !servers.contains_key(&candidate) {
            return candidate;
        }
    }
}

/// Pick a port the OS reports free, and which no current record holds.
fn allocate_port(servers: &HashMap<u32, ManagedServer>) -> Result<u16> {
    for _ in 0..32 {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0))
            .map_err(|e| Error::Io(format!("Failed to probe for a free port: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::Io(format!("Failed to read probed port: {}", e)))?
            .port();
        drop(listener);
        if !servers.values().any(|record| record.port() == port) {
            return Ok(port);
        }
    }
    Err(Error::Other("No free port found".to_string()))
}

async fn wait_for_exit(control: &dyn ProcessControl, pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !control.is_alive(pid).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    !control.is_alive(pid).await
}
