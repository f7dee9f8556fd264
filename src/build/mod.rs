//! Build pipeline for non-vanilla artifacts.
//!
//! Spigot and craftbukkit servers are compiled by BuildTools before
//! installation. Builds are expensive and BuildTools stomps over its own
//! workspace, so all build requests are serialized through a single slot:
//! one build runs at a time, later requests queue on the slot.

use crate::error::{Error, Result};
use crate::server::Flavor;
use async_process::{Command, Stdio};
use async_trait::async_trait;
use futures_lite::io::{AsyncBufReadExt, BufReader};
use futures_lite::StreamExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const BUILD_TOOLS_URL: &str =
    "https://hub.spigotmc.org/jenkins/job/BuildTools/lastSuccessfulBuild/artifact/target/BuildTools.jar";
const BUILD_TOOLS_JAR: &str = "BuildTools.jar";

/// Compiles a server artifact for a flavor/version pair, returning the
/// path of the produced jar.
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    async fn build(&self, flavor: Flavor, version: &str) -> Result<PathBuf>;
}

/// Serializes builds through a single slot.
pub struct BuildQueue {
    builder: Arc<dyn ArtifactBuilder>,
    slot: Mutex<()>,
}

impl BuildQueue {
    pub fn new(builder: Arc<dyn ArtifactBuilder>) -> Self {
        Self {
            builder,
            slot: Mutex::new(()),
        }
    }

    /// Run one build; waits for the slot if another build is in flight.
    pub async fn build(&self, flavor: Flavor, version: &str) -> Result<PathBuf> {
        let _slot = self.slot.lock().await;
        tracing::info!(%flavor, version, "Build slot acquired");
        self.builder.build(flavor, version).await
    }
}

/// Runs the official BuildTools jar in a dedicated workspace directory,
/// downloading it on first use.
pub struct BuildToolsBuilder {
    build_dir: PathBuf,
    tools_url: String,
    logs: Arc<StdMutex<String>>,
}

impl BuildToolsBuilder {
    pub fn new(build_dir: PathBuf) -> Self {
        Self {
            build_dir,
            tools_url: BUILD_TOOLS_URL.to_string(),
            logs: Arc::new(StdMutex::new(String::new())),
        }
    }

    /// Output of the current or last build run.
    pub fn progress(&self) -> String {
        let logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
        if logs.is_empty() {
            "No build process running".to_string()
        } else {
            logs.clone()
        }
    }

    async fn ensure_buildtools(&self) -> Result<PathBuf> {
        let jar = self.build_dir.join(BUILD_TOOLS_JAR);
        if jar.is_file() {
            return Ok(jar);
        }
        tokio::fs::create_dir_all(&self.build_dir)
            .await
            .map_err(|e| Error::Install(format!("Failed to create build dir: {}", e)))?;
        self.append_log("Downloading BuildTools...\n");
        crate::server::install::download_file(&self.tools_url, &jar).await?;
        Ok(jar)
    }

    fn append_log(&self, text: &str) {
        let mut logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
        logs.push_str(text);
    }
}

fn spawn_log_reader(
    reader: impl futures_lite::io::AsyncRead + Unpin + Send + 'static,
    logs: Arc<StdMutex<String>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Some(Ok(line)) = lines.next().await {
            let mut logs = logs.lock().unwrap_or_else(|e| e.into_inner());
            logs.push_str(&line);
            logs.push('\n');
        }
    })
}

#[async_trait]
impl ArtifactBuilder for BuildToolsBuilder {
    async fn build(&self, flavor: Flavor, version: &str) -> Result<PathBuf> {
        if flavor == Flavor::Vanilla {
            return Err(Error::Validation(
                "Vanilla servers are downloaded, not built".to_string(),
            ));
        }

        self.ensure_buildtools().await?;

        {
            let mut logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
            logs.clear();
        }

        let mut command = Command::new("java");
        command
            .arg("-jar")
            .arg(BUILD_TOOLS_JAR)
            .arg("--rev")
            .arg(version)
            .current_dir(&self.build_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if flavor == Flavor::CraftBukkit {
            command.arg("--compile").arg("craftbukkit");
        }

        tracing::info!(%flavor, version, "Running BuildTools");
        let mut child = command
            .spawn()
            .map_err(|e| Error::Install(format!("Failed to run BuildTools: {}", e)))?;

        // Both pipes are drained concurrently; reading them in sequence
        // deadlocks once the unread one fills its buffer.
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_log_reader(stdout, Arc::clone(&self.logs)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_log_reader(stderr, Arc::clone(&self.logs)));
        }
        for reader in readers {
            let _ = reader.await;
        }

        let status = child
            .status()
            .await
            .map_err(|e| Error::Install(format!("BuildTools wait failed: {}", e)))?;
        if !status.success() {
            return Err(Error::Install(format!(
                "BuildTools exited with {}",
                status
            )));
        }

        let artifact = self.build_dir.join(format!("{}-{}.jar", flavor, version));
        if !artifact.is_file() {
            return Err(Error::Install(format!(
                "BuildTools finished but {} is missing",
                artifact.display()
            )));
        }
        Ok(artifact)
    }
}
