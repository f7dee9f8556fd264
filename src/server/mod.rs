//! Server instance module for mc-manager.
//!
//! This module holds one game-server instance's worth of state and
//! behavior: the state machine over supervisor observations, the install
//! step, the player roster, and the properties file format.
//!
//! # Components
//!
//! * `instance` - The `ManagedServer` record and its state machine
//! * `install` - Artifact fetch, eula, default properties
//! * `players` - Roster reconstruction and the `PlayerQuery` seam
//! * `properties` - The line-oriented `key=value` file format
pub mod install;
mod instance;
pub mod players;
pub mod properties;

pub use install::WorldOptions;
pub use instance::{
    Flavor, HardwareConfig, InstallMeta, ManagedServer, NetworkConfig, PathData, PersistedServer,
    ServerData, ServerStatus, READY_MARKER,
};
pub use players::{NoQuery, Player, PlayerQuery};
