//! Shared fakes for exercising the registry and the server state machine
//! without real java processes.

#![allow(dead_code)]

use async_trait::async_trait;
use mc_manager::build::ArtifactBuilder;
use mc_manager::process::{ProcessControl, ProcessSnapshot};
use mc_manager::server::Flavor;
use mc_manager::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::broadcast;

#[derive(Default)]
struct FakeState {
    next_pid: u32,
    alive: HashSet<u32>,
    logs: HashMap<u32, String>,
    inputs: HashMap<u32, String>,
    spawns: Vec<(u32, Vec<String>, PathBuf)>,
    killed: Vec<u32>,
    channels: HashMap<u32, broadcast::Sender<ProcessSnapshot>>,
    fail_spawn: bool,
    fail_kill: bool,
    exit_on_stop: bool,
}

/// Scripted process layer: processes live until the test exits them (or,
/// with `exit_on_stop`, until they receive the `stop` console command).
pub struct FakeControl {
    state: Mutex<FakeState>,
}

impl FakeControl {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_pid: 4000,
                ..FakeState::default()
            }),
        }
    }

    /// Make every fake process exit when `stop\n` hits its stdin, like a
    /// well-behaved server would.
    pub fn exit_on_stop(&self) {
        self.state.lock().unwrap().exit_on_stop = true;
    }

    /// Reject the next spawn attempt.
    pub fn fail_next_spawn(&self) {
        self.state.lock().unwrap().fail_spawn = true;
    }

    /// Make every kill fail while the process stays alive.
    pub fn fail_kill(&self) {
        self.state.lock().unwrap().fail_kill = true;
    }

    /// Simulate the process exiting on its own.
    pub fn exit(&self, pid: u32) {
        self.state.lock().unwrap().alive.remove(&pid);
    }

    /// Append a line to the process's captured output.
    pub fn append_log(&self, pid: u32, line: &str) {
        let mut state = self.state.lock().unwrap();
        let log = state.logs.entry(pid).or_default();
        log.push_str(line);
        log.push('\n');
    }

    /// Everything written to the process's stdin so far.
    pub fn sent(&self, pid: u32) -> String {
        self.state
            .lock()
            .unwrap()
            .inputs
            .get(&pid)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_pid(&self) -> Option<u32> {
        self.state
            .lock()
            .unwrap()
            .spawns
            .last()
            .map(|(pid, _, _)| *pid)
    }

    pub fn last_spawn(&self) -> Option<(Vec<String>, PathBuf)> {
        self.state
            .lock()
            .unwrap()
            .spawns
            .last()
            .map(|(_, command, workdir)| (command.clone(), workdir.clone()))
    }

    pub fn killed(&self) -> Vec<u32> {
        self.state.lock().unwrap().killed.clone()
    }
}

#[async_trait]
impl ProcessControl for FakeControl {
    async fn spawn(&self, command: &[String], workdir: &Path) -> Result<u32> {
        let mut state = self.state.lock().unwrap();
        if state.fail_spawn {
            state.fail_spawn = false;
            return Err(Error::Spawn("injected spawn failure".to_string()));
        }

        let pid = state.next_pid;
        state.next_pid += 1;
        state.alive.insert(pid);
        state.logs.insert(pid, String::new());
        state
            .spawns
            .push((pid, command.to_vec(), workdir.to_path_buf()));
        let (sender, _) = broadcast::channel(16);
        state.channels.insert(pid, sender);
        Ok(pid)
    }

    async fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().unwrap().alive.contains(&pid)
    }

    async fn send_input(&self, pid: u32, text: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.logs.contains_key(&pid) {
            // Unknown pid: dropped, like the real supervisor.
            return Ok(());
        }
        state.inputs.entry(pid).or_default().push_str(text);
        if state.exit_on_stop && text == "stop\n" {
            state.alive.remove(&pid);
        }
        Ok(())
    }

    async fn kill(&self, pid: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_kill {
            return Err(Error::Process("injected kill failure".to_string()));
        }
        if state.alive.remove(&pid) {
            state.killed.push(pid);
            Ok(())
        } else {
            Err(Error::NotFound(format!("Process {}", pid)))
        }
    }

    async fn logs(&self, pid: u32) -> Option<String> {
        self.state.lock().unwrap().logs.get(&pid).cloned()
    }

    async fn snapshot(&self, pid: u32) -> Option<ProcessSnapshot> {
        let state = self.state.lock().unwrap();
        if state.alive.contains(&pid) {
            Some(ProcessSnapshot::default())
        } else {
            None
        }
    }

    async fn subscribe(&self, pid: u32) -> Option<broadcast::Receiver<ProcessSnapshot>> {
        self.state
            .lock()
            .unwrap()
            .channels
            .get(&pid)
            .map(|sender| sender.subscribe())
    }
}

/// Builder that writes a placeholder jar instead of running BuildTools.
pub struct FakeBuilder {
    artifacts: PathBuf,
}

impl FakeBuilder {
    pub fn new(artifacts: PathBuf) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl ArtifactBuilder for FakeBuilder {
    async fn build(&self, flavor: Flavor, version: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.artifacts)
            .await
            .map_err(|e| Error::Install(e.to_string()))?;
        let path = self.artifacts.join(format!("{}-{}.jar", flavor, version));
        tokio::fs::write(&path, b"fake jar")
            .await
            .map_err(|e| Error::Install(e.to_string()))?;
        Ok(path)
    }
}

/// Builder that always fails, for install-failure paths.
pub struct FailingBuilder;

#[async_trait]
impl ArtifactBuilder for FailingBuilder {
    async fn build(&self, _flavor: Flavor, _version: &str) -> Result<PathBuf> {
        Err(Error::Install("no build backend in this test".to_string()))
    }
}
