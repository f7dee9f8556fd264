use crate::error::{Error, Result};
use crate::process::{ProcessControl, ProcessSnapshot, ResourceUsage};
use async_process::{Child, ChildStdin, Command, Stdio};
use async_trait::async_trait;
use futures_lite::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use futures_lite::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Capacity of the per-process snapshot broadcast channel. Slow
/// subscribers lose old snapshots rather than blocking the monitor.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

/// Output accumulated from one process.
///
/// `log` grows for the lifetime of the process; `delta` holds everything
/// produced since the last collection and is drained on each snapshot.
#[derive(Debug, Default)]
pub(crate) struct OutputBuffers {
    pub(crate) log: String,
    pub(crate) delta: String,
}

impl OutputBuffers {
    fn append_line(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
        self.delta.push_str(line);
        self.delta.push('\n');
    }
}

/// Bookkeeping for one live process.
pub(crate) struct ProcessEntry {
    pub(crate) child: Child,
    stdin: Arc<Mutex<ChildStdin>>,
    pub(crate) output: Arc<StdMutex<OutputBuffers>>,
    pub(crate) readers: Vec<JoinHandle<()>>,
    pub(crate) usage: ResourceUsage,
    pub(crate) snapshots: broadcast::Sender<ProcessSnapshot>,
}

/// Owns zero or more live OS processes and their I/O.
///
/// The pid table is guarded by a mutex; the monitor loop, API-triggered
/// start/stop paths and reader tasks all reach it through that guard.
/// Cloning is cheap and shares the same table.
#[derive(Clone)]
pub struct ProcessSupervisor {
    pub(crate) processes: Arc<Mutex<HashMap<u32, ProcessEntry>>>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            processes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of currently supervised processes.
    pub async fn process_count(&self) -> usize {
        self.processes.lock().await.len()
    }

    fn spawn_reader(
        pid: u32,
        reader: impl futures_lite::io::AsyncRead + Unpin + Send + 'static,
        output: Arc<StdMutex<OutputBuffers>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Some(line) = lines.next().await {
                match line {
                    Ok(line) => {
                        tracing::trace!(pid, line = %line, "Process output");
                        if let Ok(mut buffers) = output.lock() {
                            buffers.append_line(&line);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(pid, error = %e, "Process output pipe closed");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessControl for ProcessSupervisor {
    async fn spawn(&self, command: &[String], workdir: &Path) -> Result<u32> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Spawn("Empty command line".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Spawn(format!("Failed to start process: {}", e)))?;

        let pid = child.id();

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Process("Failed to get stdin pipe from child".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Process("Failed to get stdout pipe from child".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Process("Failed to get stderr pipe from child".to_string()))?;

        let output = Arc::new(StdMutex::new(OutputBuffers::default()));
        // stderr is merged into the same buffers the server logs to.
        let readers = vec![
            Self::spawn_reader(pid, stdout, Arc::clone(&output)),
            Self::spawn_reader(pid, stderr, Arc::clone(&output)),
        ];

        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);

        let entry = ProcessEntry {
            child,
            stdin: Arc::new(Mutex::new(stdin)),
            output,
            readers,
            usage: ResourceUsage::default(),
            snapshots,
        };

        let mut processes = self.processes.lock().await;
        processes.insert(pid, entry);
        tracing::info!(pid, program = %program, workdir = %workdir.display(), "Spawned process");

        Ok(pid)
    }

    async fn is_alive(&self, pid: u32) -> bool {
        let mut processes = self.processes.lock().await;
        match processes.get_mut(&pid) {
            Some(entry) => matches!(entry.child.try_status(), Ok(None)),
            None => false,
        }
    }

    async fn send_input(&self, pid: u32, text: &str) -> Result<()> {
        let stdin = {
            let processes = self.processes.lock().await;
            match processes.get(&pid) {
                Some(entry) => Arc::clone(&entry.stdin),
                None => {
                    tracing::debug!(pid, "Input dropped for unknown process");
                    return Ok(());
                }
            }
        };

        let mut stdin = stdin.lock().await;
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| Error::Process(format!("Failed to write to stdin: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| Error::Process(format!("Failed to flush stdin: {}", e)))?;
        Ok(())
    }

    async fn kill(&self, pid: u32) -> Result<()> {
        let mut processes = self.processes.lock().await;
        let entry = processes
            .get_mut(&pid)
            .ok_or_else(|| Error::NotFound(format!("Process {}", pid)))?;

        tracing::warn!(pid, "Hard-terminating process");
        entry
            .child
            .kill()
            .map_err(|e| Error::Process(format!("Failed to kill process: {}", e)))
    }

    async fn logs(&self, pid: u32) -> Option<String> {
        let processes = self.processes.lock().await;
        let entry = processes.get(&pid)?;
        let buffers = entry.output.lock().ok()?;
        Some(buffers.log.clone())
    }

    async fn snapshot(&self, pid: u32) -> Option<ProcessSnapshot> {
        let processes = self.processes.lock().await;
        let entry = processes.get(&pid)?;
        let stdout_delta = match entry.output.lock() {
            Ok(mut buffers) => std::mem::take(&mut buffers.delta),
            Err(_) => String::new(),
        };
        Some(ProcessSnapshot {
            usage: entry.usage.clone(),
            stdout_delta,
        })
    }

    async fn subscribe(&self, pid: u32) -> Option<broadcast::Receiver<ProcessSnapshot>> {
        let processes = self.processes.lock().await;
        processes.get(&pid).map(|entry| entry.snapshots.subscribe())
    }
}
