use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::logging::LogFormat;

/// Complete batchcache configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BatchcacheConfig {
    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Scene host (Houdini) configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Interpreter used to run the bridge (name on PATH or absolute path)
    #[serde(default = "default_hython")]
    pub hython: String,

    /// Bridge script run by the interpreter
    #[serde(default = "default_bridge_script")]
    pub bridge_script: String,

    /// Longest wait for one bridge reply, scene loads included ("off" to wait forever)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            hython: default_hython(),
            bridge_script: default_bridge_script(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Completion polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollingConfig {
    /// Delay between two disk scans (e.g. "500ms", "2s")
    #[serde(default = "default_poll_interval")]
    pub interval: String,

    /// Give up on a unit whose frame count stops changing ("off" to wait forever)
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout: String,

    /// Absolute ceiling per unit ("off" for none)
    #[serde(default = "default_max_wait")]
    pub max_wait: String,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            stall_timeout: default_stall_timeout(),
            max_wait: default_max_wait(),
        }
    }
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ExecutionConfig {
    /// Upper bound on units cached at once in a parallel batch (default: CPU count)
    #[serde(default)]
    pub max_parallel_units: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "pretty", "compact" or "json"; unset picks by environment
    #[serde(default)]
    pub log_format: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: None,
        }
    }
}

// Default value functions
fn default_hython() -> String {
    "hython".to_string()
}

fn default_bridge_script() -> String {
    "bridge/batchcache_bridge.py".to_string()
}

fn default_request_timeout() -> String {
    "10m".to_string()
}

fn default_poll_interval() -> String {
    "500ms".to_string()
}

fn default_stall_timeout() -> String {
    "30m".to_string()
}

fn default_max_wait() -> String {
    "off".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Parse duration string (e.g., "500ms", "30s", "10m", "1h", "1d")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow!("Empty duration string"));
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("Duration is missing a unit: {}", s))?;
    let (num_str, unit) = s.split_at(split);
    let num: u64 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid duration: {}", s))?;

    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(scaled(num, 60, s)?),
        "h" => Duration::from_secs(scaled(num, 3600, s)?),
        "d" => Duration::from_secs(scaled(num, 86400, s)?),
        _ => {
            return Err(anyhow!(
                "Invalid duration unit: {}. Use: ms, s, m, h, d",
                unit
            ))
        }
    };

    Ok(duration)
}

fn scaled(num: u64, seconds_per_unit: u64, input: &str) -> Result<u64> {
    num.checked_mul(seconds_per_unit)
        .ok_or_else(|| anyhow!("Duration is too large: {}", input))
}

/// Like [`parse_duration`], but "off" and "none" mean no limit
pub fn parse_optional_duration(s: &str) -> Result<Option<Duration>> {
    match s.trim().to_lowercase().as_str() {
        "off" | "none" => Ok(None),
        _ => parse_duration(s).map(Some),
    }
}

impl BatchcacheConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: BatchcacheConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Example configuration for a render farm node
    pub fn example() -> Result<String> {
        let config = BatchcacheConfig {
            host: HostConfig {
                hython: "/opt/hfs20.5/bin/hython".to_string(),
                bridge_script: "/opt/batchcache/bridge/batchcache_bridge.py".to_string(),
                request_timeout: "15m".to_string(),
            },
            polling: PollingConfig {
                interval: "1s".to_string(),
                stall_timeout: "20m".to_string(),
                max_wait: "12h".to_string(),
            },
            execution: ExecutionConfig {
                max_parallel_units: Some(4),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: Some("compact".to_string()),
            },
        };

        Ok(toml::to_string_pretty(&config)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.hython.trim().is_empty() {
            anyhow::bail!("host.hython must be set");
        }

        if self.host.bridge_script.trim().is_empty() {
            anyhow::bail!("host.bridge_script must be set");
        }

        parse_optional_duration(&self.host.request_timeout).with_context(|| {
            format!(
                "host.request_timeout is invalid: {}",
                self.host.request_timeout
            )
        })?;

        let interval = parse_duration(&self.polling.interval)
            .with_context(|| format!("polling.interval is invalid: {}", self.polling.interval))?;
        if interval.is_zero() {
            anyhow::bail!("polling.interval must be greater than zero");
        }

        parse_optional_duration(&self.polling.stall_timeout).with_context(|| {
            format!(
                "polling.stall_timeout is invalid: {}",
                self.polling.stall_timeout
            )
        })?;
        parse_optional_duration(&self.polling.max_wait)
            .with_context(|| format!("polling.max_wait is invalid: {}", self.polling.max_wait))?;

        if self.execution.max_parallel_units == Some(0) {
            anyhow::bail!("execution.max_parallel_units must be at least 1");
        }

        if let Some(format) = &self.observability.log_format {
            if LogFormat::parse(format).is_none() {
                anyhow::bail!("observability.log_format must be one of: pretty, compact, json");
            }
        }

        Ok(())
    }
}
