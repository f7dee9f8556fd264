use crate::action::{ActionOutcome, PlayerVerb};
use crate::error::Result;
use crate::process::{ProcessControl, ProcessSnapshot};
use crate::server::players::{merge_roster, Player, PlayerQuery};
use crate::server::properties;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Output substring that marks the `Starting -> Running` transition: the
/// server prints this banner once it is ready for connections.
pub const READY_MARKER: &str = "For help, type \"help\"";

/// Build flavor of a server artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    Vanilla,
    Spigot,
    CraftBukkit,
}

impl Flavor {
    /// File name of the launched artifact inside the instance directory.
    pub fn artifact_name(&self) -> &'static str {
        match self {
            Flavor::Vanilla => "vanilla.jar",
            Flavor::Spigot => "spigot.jar",
            Flavor::CraftBukkit => "craftbukkit.jar",
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flavor::Vanilla => f.write_str("vanilla"),
            Flavor::Spigot => f.write_str("spigot"),
            Flavor::CraftBukkit => f.write_str("craftbukkit"),
        }
    }
}

impl std::str::FromStr for Flavor {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "vanilla" => Ok(Flavor::Vanilla),
            "spigot" => Ok(Flavor::Spigot),
            "craftbukkit" => Ok(Flavor::CraftBukkit),
            other => Err(crate::error::Error::Validation(format!(
                "Unknown flavor '{}'",
                other
            ))),
        }
    }
}

/// Observed status of a server instance. Exactly one holds at any
/// instant; see [`ManagedServer::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Installing,
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerStatus::Installing => "installing",
            ServerStatus::Stopped => "stopped",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Network configuration of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Ephemeral port allocated free at creation; also the query port.
    pub port: u16,
}

/// Hardware budget of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Heap size in megabytes (Xmx and Xms).
    pub heap_mb: u32,
}

/// Filesystem layout of one instance, derived from its id at creation
/// and fixed thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathData {
    pub base_dir: PathBuf,
    /// Artifact name relative to `base_dir`, as passed to `-jar`.
    pub jar_name: String,
    pub jar_path: PathBuf,
    pub properties_path: PathBuf,
}

impl PathData {
    pub fn for_instance(servers_dir: &Path, id: u32, flavor: Flavor) -> Self {
        let base_dir = servers_dir.join(id.to_string());
        let jar_name = flavor.artifact_name().to_string();
        let jar_path = base_dir.join(&jar_name);
        let properties_path = base_dir.join("server.properties");
        Self {
            base_dir,
            jar_name,
            jar_path,
            properties_path,
        }
    }
}

/// Install metadata of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallMeta {
    pub version: String,
    pub flavor: Flavor,
    pub installed: bool,
    pub created_at: DateTime<Utc>,
    /// Reason of the last failed install attempt, if any. A failed
    /// install leaves the record in `Installing`; callers may retry.
    #[serde(default)]
    pub error: Option<String>,
}

/// Serialized form of a record in the registry snapshot. Process
/// identities do not survive a restart, so no runtime state is included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedServer {
    pub id: u32,
    pub name: String,
    pub network: NetworkConfig,
    pub hardware: HardwareConfig,
    pub paths: PathData,
    pub install: InstallMeta,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// Read-only projection of a record for the management surface.
#[derive(Debug, Clone, Serialize)]
pub struct ServerData {
    pub id: u32,
    pub name: String,
    pub status: ServerStatus,
    pub network: NetworkConfig,
    pub hardware: HardwareConfig,
    pub paths: PathData,
    pub install: InstallMeta,
    pub properties: HashMap<String, String>,
    pub players: Vec<Player>,
    /// Latest resource sample + output delta, present while a process is
    /// bound. Reading it drains the delta.
    pub stats: Option<ProcessSnapshot>,
}

/// One game-server instance and its state machine.
///
/// The record owns install/network/hardware metadata and a reference to
/// its current process; status is derived from supervisor observations
/// plus the `starting`/`stopping` transient flags, and the derivation is
/// centralized in [`status`](Self::status) and
/// [`reconcile`](Self::reconcile) so every call site reports the same
/// thing.
pub struct ManagedServer {
    id: u32,
    name: String,
    network: NetworkConfig,
    hardware: HardwareConfig,
    paths: PathData,
    install: InstallMeta,
    properties: HashMap<String, String>,
    players: HashMap<String, Player>,

    supervisor: Arc<dyn ProcessControl>,
    query: Arc<dyn PlayerQuery>,
    stop_timeout: Duration,

    pid: Option<u32>,
    starting: bool,
    stopping: bool,
    stop_deadline: Option<Instant>,
}

impl ManagedServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        name: String,
        network: NetworkConfig,
        hardware: HardwareConfig,
        paths: PathData,
        install: InstallMeta,
        supervisor: Arc<dyn ProcessControl>,
        query: Arc<dyn PlayerQuery>,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            id,
            name,
            network,
            hardware,
            paths,
            install,
            properties: HashMap::new(),
            players: HashMap::new(),
            supervisor,
            query,
            stop_timeout,
            pid: None,
            starting: false,
            stopping: false,
            stop_deadline: None,
        }
    }

    /// Rebuild a record from the registry snapshot. Loaded records never
    /// carry a live process.
    pub fn from_persisted(
        persisted: PersistedServer,
        supervisor: Arc<dyn ProcessControl>,
        query: Arc<dyn PlayerQuery>,
        stop_timeout: Duration,
    ) -> Self {
        let mut server = Self::new(
            persisted.id,
            persisted.name,
            persisted.network,
            persisted.hardware,
            persisted.paths,
            persisted.install,
            supervisor,
            query,
            stop_timeout,
        );
        server.properties = persisted.properties;
        server
    }

    pub fn to_persisted(&self) -> PersistedServer {
        PersistedServer {
            id: self.id,
            name: self.name.clone(),
            network: self.network.clone(),
            hardware: self.hardware.clone(),
            paths: self.paths.clone(),
            install: self.install.clone(),
            properties: self.properties.clone(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn port(&self) -> u16 {
        self.network.port
    }

    pub fn installed(&self) -> bool {
        self.install.installed
    }

    pub fn paths(&self) -> &PathData {
        &self.paths
    }

    pub fn install_meta(&self) -> &InstallMeta {
        &self.install
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Current observed status.
    ///
    /// Callers that need a fresh observation go through
    /// [`reconcile`](Self::reconcile) first; this derivation itself never
    /// touches the supervisor.
    pub fn status(&self) -> ServerStatus {
        if self.pid.is_some() {
            if self.starting {
                ServerStatus::Starting
            } else if self.stopping {
                ServerStatus::Stopping
            } else {
                ServerStatus::Running
            }
        } else if !self.install.installed {
            ServerStatus::Installing
        } else {
            ServerStatus::Stopped
        }
    }

    /// Re-derive runtime state from supervisor observations.
    ///
    /// This is the single place where pid liveness, the ready marker and
    /// the transient flags meet:
    /// - a vanished process forces `Stopped` and clears both flags
    /// - a completed stop persists the properties file (captures runtime
    ///   edits) and reports that a registry snapshot is due
    /// - `starting` clears once the ready marker shows up in the log
    /// - a stop that overruns its deadline escalates to hard terminate
    ///
    /// Returns `true` when the registry should persist its snapshot.
    pub async fn reconcile(&mut self) -> bool {
        let mut persist = false;

        if let Some(pid) = self.pid {
            if !self.supervisor.is_alive(pid).await {
                tracing::debug!(id = self.id, pid, "Bound process is gone");
                self.pid = None;
            }
        }

        match self.pid {
            None => {
                if self.stopping {
                    self.stopping = false;
                    persist = true;
                    if let Err(e) = self.save_properties() {
                        tracing::warn!(id = self.id, error = %e, "Failed to persist properties on stop");
                    }
                    tracing::info!(id = self.id, name = %self.name, "Server stopped");
                }
                self.starting = false;
                self.stop_deadline = None;
            }
            Some(pid) => {
                if self.starting {
                    if let Some(logs) = self.supervisor.logs(pid).await {
                        if logs.contains(READY_MARKER) {
                            self.starting = false;
                            tracing::info!(id = self.id, name = %self.name, "Server is ready for connections");
                        }
                    }
                }
                if self.stopping {
                    if let Some(deadline) = self.stop_deadline {
                        if Instant::now() >= deadline {
                            tracing::warn!(
                                id = self.id,
                                pid,
                                "Graceful stop overran its deadline, escalating"
                            );
                            self.stop_deadline = None;
                            if let Err(e) = self.supervisor.kill(pid).await {
                                tracing::warn!(id = self.id, pid, error = %e, "Hard terminate failed");
                            }
                        }
                    }
                }
            }
        }

        self.refresh_players().await;
        persist
    }

    async fn refresh_players(&mut self) {
        let online = if self.status() == ServerStatus::Running {
            match self.query.online_players(self.network.port).await {
                Ok(names) => names,
                Err(e) => {
                    tracing::debug!(id = self.id, error = %e, "Player query failed");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        self.players = merge_roster(&online, &self.paths.base_dir);
    }

    /// Launch the server process.
    ///
    /// Accepted iff the record is installed and no live process is
    /// bound.
    pub async fn start(&mut self) -> ActionOutcome {
        if !self.install.installed {
            return ActionOutcome::failed("Server is not installed");
        }
        if self.pid.is_some() {
            return ActionOutcome::failed("Server is already running");
        }

        let command = vec![
            "java".to_string(),
            format!("-Xmx{}M", self.hardware.heap_mb),
            format!("-Xms{}M", self.hardware.heap_mb),
            "-jar".to_string(),
            self.paths.jar_name.clone(),
            "--nogui".to_string(),
        ];

        match self.supervisor.spawn(&command, &self.paths.base_dir).await {
            Ok(pid) => {
                self.pid = Some(pid);
                self.starting = true;
                self.stopping = false;
                tracing::info!(id = self.id, name = %self.name, pid, "Server starting");
                ActionOutcome::ok("Server started successfully!")
            }
            Err(e) => {
                tracing::error!(id = self.id, name = %self.name, error = %e, "Failed to spawn server");
                ActionOutcome::failed(format!("Failed to start server: {}", e))
            }
        }
    }

    /// Ask the server to shut down gracefully by writing its shutdown
    /// command to stdin. The transition to `Stopped` is observed later by
    /// [`reconcile`](Self::reconcile).
    pub async fn stop(&mut self) -> ActionOutcome {
        let Some(pid) = self.pid else {
            return ActionOutcome::failed("Server is not running");
        };
        if self.stopping {
            return ActionOutcome::failed("Server is already stopping");
        }

        if let Err(e) = self.supervisor.send_input(pid, "stop\n").await {
            tracing::error!(id = self.id, pid, error = %e, "Failed to send stop command");
            return ActionOutcome::failed(format!("Failed to stop server: {}", e));
        }

        self.stopping = true;
        self.stop_deadline = Some(Instant::now() + self.stop_timeout);
        tracing::info!(id = self.id, name = %self.name, pid, "Server stopping");
        ActionOutcome::ok("Server is stopping")
    }

    /// Run a player-administration console command (`<verb> <target>`).
    /// Only valid while the server is `Running`.
    pub async fn player_command(&mut self, verb: PlayerVerb, target: &str) -> ActionOutcome {
        if self.status() != ServerStatus::Running {
            return ActionOutcome::failed("Server is not running");
        }
        // status() == Running implies a bound pid.
        let Some(pid) = self.pid else {
            return ActionOutcome::failed("Server is not running");
        };

        let line = format!("{} {}\n", verb.command(), target);
        match self.supervisor.send_input(pid, &line).await {
            Ok(()) => {
                tracing::info!(id = self.id, %verb, target, "Console command sent");
                ActionOutcome::ok(format!("Executed '{} {}'", verb.command(), target))
            }
            Err(e) => {
                tracing::error!(id = self.id, %verb, target, error = %e, "Console command failed");
                ActionOutcome::failed(format!("Failed to execute command: {}", e))
            }
        }
    }

    /// Explicit hard terminate. Never substituted for a graceful stop;
    /// used by callers that know the process is stuck.
    pub async fn kill(&mut self) -> ActionOutcome {
        let Some(pid) = self.pid else {
            return ActionOutcome::failed("Server is not running");
        };
        match self.supervisor.kill(pid).await {
            Ok(()) => ActionOutcome::ok("Server terminated"),
            Err(e) => ActionOutcome::failed(format!("Failed to terminate server: {}", e)),
        }
    }

    /// Flip the record to installed with its freshly written defaults.
    pub fn complete_install(&mut self, properties: HashMap<String, String>) {
        self.install.installed = true;
        self.install.error = None;
        self.properties = properties;
    }

    /// Record a failed install attempt; the record stays `Installing`.
    pub fn record_install_failure(&mut self, reason: String) {
        self.install.error = Some(reason);
    }

    pub fn load_properties(&mut self) -> Result<()> {
        self.properties = properties::load_properties(&self.paths.properties_path)?;
        Ok(())
    }

    pub fn save_properties(&self) -> Result<()> {
        properties::save_properties(&self.paths.properties_path, &self.properties)
    }

    /// Projection for the management surface; `stats` drains the output
    /// delta when a process is bound.
    pub async fn data(&self) -> ServerData {
        let stats = match self.pid {
            Some(pid) => self.supervisor.snapshot(pid).await,
            None => None,
        };
        ServerData {
            id: self.id,
            name: self.name.clone(),
            status: self.status(),
            network: self.network.clone(),
            hardware: self.hardware.clone(),
            paths: self.paths.clone(),
            install: self.install.clone(),
            properties: self.properties.clone(),
            players: self.players.values().cloned().collect(),
            stats,
        }
    }
}
