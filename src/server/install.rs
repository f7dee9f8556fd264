//! The install step: turn an empty record into a launchable instance.
//!
//! Vanilla artifacts are fetched from the version catalog's download URL;
//! spigot/craftbukkit artifacts come out of the serialized build queue.
//! On success the instance directory holds the artifact, an accepted
//! eula, and freshly written default properties. Failure leaves the
//! record in `Installing` for an explicit retry.

use crate::build::BuildQueue;
use crate::catalog::VersionCatalog;
use crate::error::{Error, Result};
use crate::server::instance::{Flavor, NetworkConfig, PathData};
use crate::server::properties;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Browser-looking agent; some artifact hosts refuse default clients.
pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux i686; rv:96.0) Gecko/20100101 Firefox/96.0";

/// World-generation options captured at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldOptions {
    #[serde(default)]
    pub seed: String,
    #[serde(default = "default_gamemode")]
    pub gamemode: String,
    #[serde(default = "default_leveltype")]
    pub leveltype: String,
}

fn default_gamemode() -> String {
    "survival".to_string()
}

fn default_leveltype() -> String {
    "default".to_string()
}

impl Default for WorldOptions {
    fn default() -> Self {
        Self {
            seed: String::new(),
            gamemode: default_gamemode(),
            leveltype: default_leveltype(),
        }
    }
}

/// Download `url` to `path`.
pub(crate) async fn download_file(url: &str, path: &std::path::Path) -> Result<()> {
    let response = reqwest::Client::new()
        .get(url)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .send()
        .await
        .map_err(|e| Error::Install(format!("Download request failed: {}", e)))?
        .error_for_status()
        .map_err(|e| Error::Install(format!("Download failed: {}", e)))?;

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Install(format!("Download read failed: {}", e)))?;

    tokio::fs::write(path, &bytes)
        .await
        .map_err(|e| Error::Install(format!("Failed to write {}: {}", path.display(), e)))?;
    Ok(())
}

/// Run the install for one instance and return the default properties
/// that were written.
///
/// No registry lock is held while this runs; the caller applies the
/// returned properties to the record afterwards.
pub async fn run_install(
    paths: &PathData,
    network: &NetworkConfig,
    version: &str,
    flavor: Flavor,
    opts: &WorldOptions,
    catalog: &dyn VersionCatalog,
    builds: &BuildQueue,
) -> Result<HashMap<String, String>> {
    tokio::fs::create_dir_all(&paths.base_dir)
        .await
        .map_err(|e| Error::Install(format!("Failed to create instance dir: {}", e)))?;

    match flavor {
        Flavor::Vanilla => {
            let url = catalog.resolve(version).await?;
            tracing::info!(version, url = %url, "Downloading server artifact");
            download_file(&url, &paths.jar_path).await?;
        }
        Flavor::Spigot | Flavor::CraftBukkit => {
            let artifact = builds.build(flavor, version).await?;
            tokio::fs::copy(&artifact, &paths.jar_path)
                .await
                .map_err(|e| Error::Install(format!("Failed to place built artifact: {}", e)))?;
        }
    }

    write_eula(paths).await?;

    let props = default_properties(network, opts);
    properties::save_properties(&paths.properties_path, &props)?;

    Ok(props)
}

/// The server refuses to boot until the eula is accepted on disk.
async fn write_eula(paths: &PathData) -> Result<()> {
    let eula_path = paths.base_dir.join("eula.txt");
    tokio::fs::write(&eula_path, "eula=true\n")
        .await
        .map_err(|e| Error::Install(format!("Failed to write eula: {}", e)))?;
    Ok(())
}

fn default_properties(network: &NetworkConfig, opts: &WorldOptions) -> HashMap<String, String> {
    let mut props = HashMap::new();
    props.insert("server-port".to_string(), network.port.to_string());
    props.insert("query.port".to_string(), network.port.to_string());
    props.insert("enable-query".to_string(), "true".to_string());
    props.insert("level-name".to_string(), "world/world".to_string());
    props.insert("level-seed".to_string(), opts.seed.clone());
    props.insert("level-type".to_string(), opts.leveltype.clone());
    props.insert("gamemode".to_string(), opts.gamemode.clone());
    props
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_properties_bind_both_ports() {
        let network = NetworkConfig { port: 25599 };
        let props = default_properties(&network, &WorldOptions::default());
        assert_eq!(props["server-port"], "25599");
        assert_eq!(props["query.port"], "25599");
        assert_eq!(props["enable-query"], "true");
        assert_eq!(props["gamemode"], "survival");
    }
}
