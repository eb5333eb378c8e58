/// Configuration merger: CLI args > Env vars > Config file > Defaults
///
/// Environment variables are read by clap into the same fields as the flags,
/// so only two layers meet here: the parsed arguments and the config file.
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::CommonConfigArgs;
use crate::config::{parse_duration, parse_optional_duration, BatchcacheConfig};
use crate::config_discovery::{load_config_with_discovery, LoadedConfig};
use crate::detector::PollPolicy;
use crate::host::HythonHostConfig;
use crate::orchestrator::OrchestratorConfig;

/// Merged configuration for commands that talk to Houdini
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRunConfig {
    pub hython: String,
    pub bridge_script: PathBuf,
    pub request_timeout: Option<Duration>,
    pub poll: PollPolicy,
    pub max_parallel_units: usize,
    pub log_level: String,
    pub log_format: Option<String>,
    /// Config file the values came from, if any
    pub config_path: Option<PathBuf>,
}

impl MergedRunConfig {
    /// Discover the config file and merge it with `args`
    pub fn load(args: &CommonConfigArgs) -> Result<Self> {
        let loaded = load_config_with_discovery(args.config.as_deref())?;
        Self::merge(args, loaded)
    }

    /// Merge configuration from CLI args and config file
    pub fn merge(args: &CommonConfigArgs, loaded: Option<LoadedConfig>) -> Result<Self> {
        let (config_path, file) = match loaded {
            Some(loaded) => (Some(loaded.path), loaded.config),
            None => (None, BatchcacheConfig::default()),
        };

        let request_timeout = args
            .config_request_timeout
            .clone()
            .unwrap_or_else(|| file.host.request_timeout.clone());
        let request_timeout = parse_optional_duration(&request_timeout)
            .with_context(|| format!("Invalid request timeout: {}", request_timeout))?;

        let interval = args
            .config_poll_interval
            .clone()
            .unwrap_or_else(|| file.polling.interval.clone());
        let stall_timeout = args
            .config_stall_timeout
            .clone()
            .unwrap_or_else(|| file.polling.stall_timeout.clone());
        let max_wait = args
            .config_max_wait
            .clone()
            .unwrap_or_else(|| file.polling.max_wait.clone());

        let poll = PollPolicy {
            interval: parse_duration(&interval)
                .with_context(|| format!("Invalid poll interval: {}", interval))?,
            stall_timeout: parse_optional_duration(&stall_timeout)
                .with_context(|| format!("Invalid stall timeout: {}", stall_timeout))?,
            max_wait: parse_optional_duration(&max_wait)
                .with_context(|| format!("Invalid max wait: {}", max_wait))?,
        };
        if poll.interval.is_zero() {
            anyhow::bail!("Poll interval must be greater than zero");
        }

        let max_parallel_units = args
            .config_max_parallel_units
            .or(file.execution.max_parallel_units)
            .unwrap_or_else(num_cpus::get);
        if max_parallel_units == 0 {
            anyhow::bail!("max_parallel_units must be at least 1");
        }

        Ok(Self {
            hython: args
                .config_hython
                .clone()
                .unwrap_or_else(|| file.host.hython.clone()),
            bridge_script: PathBuf::from(
                args.config_bridge_script
                    .clone()
                    .unwrap_or_else(|| file.host.bridge_script.clone()),
            ),
            request_timeout,
            poll,
            max_parallel_units,
            log_level: args
                .config_log_level
                .clone()
                .unwrap_or_else(|| file.observability.log_level.clone()),
            log_format: file.observability.log_format.clone(),
            config_path,
        })
    }

    pub fn host_config(&self) -> HythonHostConfig {
        HythonHostConfig {
            interpreter: self.hython.clone(),
            bridge_script: self.bridge_script.clone(),
            request_timeout: self.request_timeout,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            poll: self.poll.clone(),
            max_parallel_units: self.max_parallel_units,
        }
    }
}
