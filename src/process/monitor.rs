use crate::process::{ProcessSnapshot, ProcessSupervisor, ResourceUsage};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};
use tokio::task::JoinHandle;
use tokio::time;

/// Monitor loop configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Reap cadence: exited processes are detected and discarded at this
    /// interval.
    pub tick: Duration,
    /// Resource sampling sub-cadence; must not be shorter than `tick`.
    pub resource_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            resource_interval: Duration::from_secs(5),
        }
    }
}

/// The shared monitor loop over all supervised processes.
///
/// One loop serves the whole fleet: every tick it reaps processes the OS
/// reports gone (tearing down their readers), and on the slower resource
/// sub-cadence it refreshes cpu/memory samples and pushes a combined
/// snapshot to each process's subscribers. A failure while sampling one
/// process never disturbs another's bookkeeping.
pub struct ProcessMonitor {
    supervisor: ProcessSupervisor,
    config: MonitorConfig,
    monitor_task: Option<JoinHandle<()>>,
    running: Arc<Mutex<bool>>,
}

impl ProcessMonitor {
    pub fn new(supervisor: ProcessSupervisor, config: MonitorConfig) -> Self {
        Self {
            supervisor,
            config,
            monitor_task: None,
            running: Arc::new(Mutex::new(false)),
        }
    }

    /// Start the monitor loop. Idempotent.
    pub fn start(&mut self) {
        {
            let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            if *running {
                return;
            }
            *running = true;
        }

        let supervisor = self.supervisor.clone();
        let running = Arc::clone(&self.running);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            let mut interval = time::interval(config.tick);
            let mut system = System::new();
            // Force a sample on the first tick.
            let mut last_sample = Instant::now() - config.resource_interval;

            loop {
                interval.tick().await;

                {
                    let running = running.lock().unwrap_or_else(|e| e.into_inner());
                    if !*running {
                        break;
                    }
                }

                reap_exited(&supervisor).await;

                if last_sample.elapsed() >= config.resource_interval {
                    last_sample = Instant::now();
                    sample_resources(&supervisor, &mut system).await;
                }
            }
        });

        self.monitor_task = Some(task);
    }

    /// Stop the monitor loop. Idempotent.
    pub fn stop(&mut self) {
        {
            let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            if !*running {
                return;
            }
            *running = false;
        }

        if let Some(task) = self.monitor_task.take() {
            task.abort();
        }
    }
}

impl Drop for ProcessMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Remove bookkeeping for every process the OS reports exited, aborting
/// its reader tasks so they never leak blocked on a dead pipe.
async fn reap_exited(supervisor: &ProcessSupervisor) {
    let mut processes = supervisor.processes.lock().await;

    let dead: Vec<u32> = processes
        .iter_mut()
        .filter_map(|(pid, entry)| match entry.child.try_status() {
            Ok(None) => None,
            Ok(Some(status)) => {
                tracing::info!(pid, %status, "Process exited, reaping");
                Some(*pid)
            }
            Err(e) => {
                tracing::warn!(pid, error = %e, "Failed to poll process, reaping");
                Some(*pid)
            }
        })
        .collect();

    for pid in dead {
        if let Some(entry) = processes.remove(&pid) {
            for reader in entry.readers {
                reader.abort();
            }
        }
    }
}

/// Refresh `{cpu, memory}` for every live process and push the combined
/// snapshot (draining the output delta) to that process's subscribers.
async fn sample_resources(supervisor: &ProcessSupervisor, system: &mut System) {
    system.refresh_memory();
    system.refresh_processes();
    let cores = system.cpus().len().max(1) as f32;

    let mut processes = supervisor.processes.lock().await;
    for (pid, entry) in processes.iter_mut() {
        let usage = match system.process(Pid::from_u32(*pid)) {
            Some(proc_info) => ResourceUsage {
                cpu_percent: proc_info.cpu_usage() / cores,
                memory_total: system.total_memory(),
                memory_used: system.used_memory(),
                memory_process: proc_info.memory(),
            },
            // Between our poll and sysinfo's refresh the process may
            // have exited; keep the previous sample and let the next
            // tick reap it.
            None => entry.usage.clone(),
        };
        entry.usage = usage.clone();

        if entry.snapshots.receiver_count() > 0 {
            let stdout_delta = match entry.output.lock() {
                Ok(mut buffers) => std::mem::take(&mut buffers.delta),
                Err(_) => String::new(),
            };
            let _ = entry.snapshots.send(ProcessSnapshot {
                usage,
                stdout_delta,
            });
        }
    }
}
