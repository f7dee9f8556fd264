//! Process supervision module for mc-manager.
//!
//! This module owns the live OS processes behind running server
//! instances: spawning, stdin writes, output buffering, resource
//! sampling, and reaping. The state machine in
//! [`crate::server::ManagedServer`] talks to it exclusively through the
//! [`ProcessControl`] trait so it can be exercised against a fake in
//! tests.
//!
//! # Components
//!
//! * `supervisor` - The pid table, per-process readers and I/O plumbing
//! * `monitor` - The shared monitor loop: reap + resource sampling + push
pub mod monitor;
mod supervisor;

pub use monitor::{MonitorConfig, ProcessMonitor};
pub use supervisor::ProcessSupervisor;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::broadcast;

/// Point-in-time resource usage of one supervised process.
///
/// `cpu_percent` is normalized by the logical core count, so 100 means
/// the process saturates the whole machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_percent: f32,
    /// Total system memory in bytes.
    pub memory_total: u64,
    /// Used system memory in bytes.
    pub memory_used: u64,
    /// Memory held by the supervised process, in bytes.
    pub memory_process: u64,
}

/// Combined per-process record delivered to subscribers and on-demand
/// callers: the latest resource sample plus the output produced since the
/// last collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub usage: ResourceUsage,
    pub stdout_delta: String,
}

/// Control surface over live OS processes.
///
/// Implemented by [`ProcessSupervisor`]; faked in tests.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Spawns a process in `workdir`, returning its OS pid.
    async fn spawn(&self, command: &[String], workdir: &Path) -> Result<u32>;

    /// Whether `pid` still denotes a live supervised process.
    async fn is_alive(&self, pid: u32) -> bool;

    /// Writes a line of text to the process's stdin. A no-op if the pid
    /// is unknown; callers are expected to have checked liveness first.
    async fn send_input(&self, pid: u32, text: &str) -> Result<()>;

    /// Hard-terminates the process. Explicit fallback only; graceful stop
    /// goes through the server's own shutdown command.
    async fn kill(&self, pid: u32) -> Result<()>;

    /// Full output log accumulated so far, if the pid is known.
    async fn logs(&self, pid: u32) -> Option<String>;

    /// Latest resource sample plus output delta; drains the delta.
    async fn snapshot(&self, pid: u32) -> Option<ProcessSnapshot>;

    /// Subscribe to the periodic snapshot stream for `pid`, or `None` if
    /// the pid is not supervised.
    async fn subscribe(&self, pid: u32) -> Option<broadcast::Receiver<ProcessSnapshot>>;
}
