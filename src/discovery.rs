//! Cache unit discovery
//!
//! Asks the bridge script for every cache node in a scene so job rows can be
//! written without opening the scene by hand.

use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::DiscoveryError;
use crate::host::hython::{resolve_interpreter, HythonHostConfig};
use crate::job::CacheUnitRef;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DiscoveryOutput {
    Units(Vec<String>),
    Failure { error: String },
}

/// Parse the single JSON value printed by `bridge list <scene>`
pub fn parse_discovery_output(stdout: &str) -> Result<Vec<CacheUnitRef>, DiscoveryError> {
    let trimmed = stdout.trim();
    match serde_json::from_str::<DiscoveryOutput>(trimmed) {
        Ok(DiscoveryOutput::Units(units)) => Ok(units.into_iter().map(CacheUnitRef::new).collect()),
        Ok(DiscoveryOutput::Failure { error }) => Err(DiscoveryError::Reported(error)),
        Err(e) => Err(DiscoveryError::MalformedOutput(format!("{} in '{}'", e, trimmed))),
    }
}

/// List the cache nodes of `scene` by running the bridge in list mode
pub async fn list_cache_units(
    config: &HythonHostConfig,
    scene: &str,
) -> Result<Vec<CacheUnitRef>, DiscoveryError> {
    let interpreter = resolve_interpreter(&config.interpreter);
    debug!(
        interpreter = %interpreter.display(),
        scene = %scene,
        "Listing cache units"
    );

    let mut command = Command::new(&interpreter);
    command
        .arg(&config.bridge_script)
        .arg("list")
        .arg(scene)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = match config.request_timeout {
        Some(limit) => tokio::time::timeout(limit, command.output())
            .await
            .map_err(|_| DiscoveryError::TimedOut(limit))??,
        None => command.output().await?,
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        debug!(target: "batchcache::bridge", "{}", stderr.trim());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() && stdout.trim().is_empty() {
        return Err(DiscoveryError::MalformedOutput(format!(
            "bridge exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    parse_discovery_output(&stdout)
}
