use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::BatchcacheConfig;

/// Project-level config file name looked up while walking up the tree
pub const CONFIG_FILE_NAME: &str = "batchcache.toml";

/// Discovers batchcache configuration by traversing up the directory tree
pub fn discover_config(start_dir: &Path) -> Result<Option<PathBuf>> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            return Ok(Some(config_path));
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    // Fallback to global config
    if let Some(global_config) = global_config_path() {
        if global_config.is_file() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// `~/.config/batchcache/config.toml`
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/batchcache/config.toml"))
}

/// A configuration together with the file it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub config: BatchcacheConfig,
}

/// Loads configuration with auto-discovery support
///
/// If `explicit_path` is provided, loads config from that path.
/// Otherwise, auto-discovers config by traversing up directory tree from cwd.
///
/// Returns Ok(None) if no config is found (neither explicit nor discovered).
pub fn load_config_with_discovery(explicit_path: Option<&str>) -> Result<Option<LoadedConfig>> {
    let path = match explicit_path {
        Some(path) => PathBuf::from(path),
        None => {
            let current_dir = std::env::current_dir()
                .context("Failed to get current directory for config discovery")?;
            match discover_config(&current_dir)? {
                Some(path) => path,
                None => return Ok(None),
            }
        }
    };

    let config = BatchcacheConfig::from_file(&path)?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    Ok(Some(LoadedConfig { path, config }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_config_in_current_dir() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[polling]\ninterval = \"1s\"\n").unwrap();

        let found = discover_config(temp.path()).unwrap();
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_discover_config_in_parent_dir() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "").unwrap();

        let nested = temp.path().join("shots/sh010/fx");
        fs::create_dir_all(&nested).unwrap();

        let found = discover_config(&nested).unwrap();
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_nearest_config_wins() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE_NAME), "").unwrap();

        let nested = temp.path().join("shots");
        fs::create_dir_all(&nested).unwrap();
        let nearest = nested.join(CONFIG_FILE_NAME);
        fs::write(&nearest, "").unwrap();

        assert_eq!(discover_config(&nested).unwrap(), Some(nearest));
    }

    #[test]
    fn test_load_explicit_config() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("farm.toml");
        fs::write(
            &config_path,
            "[host]\nhython = \"/opt/hfs/bin/hython\"\n\n[execution]\nmax_parallel_units = 2\n",
        )
        .unwrap();

        let loaded = load_config_with_discovery(config_path.to_str())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.path, config_path);
        assert_eq!(loaded.config.host.hython, "/opt/hfs/bin/hython");
        assert_eq!(loaded.config.execution.max_parallel_units, Some(2));
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("bad.toml");
        fs::write(&config_path, "[polling]\ninterval = \"soon\"\n").unwrap();

        assert!(load_config_with_discovery(config_path.to_str()).is_err());
    }
}
