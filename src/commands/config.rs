use anyhow::Result;
use tracing::info;

use crate::cli::{CommonConfigArgs, ConfigCommands};
use crate::config::BatchcacheConfig;
use crate::merger::MergedRunConfig;

pub fn run(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { path } => validate(&path),
        ConfigCommands::Generate => generate(),
        ConfigCommands::Show { common } => show(&common),
    }
}

fn validate(path: &str) -> Result<()> {
    info!("Validating config file: {}", path);

    let config = BatchcacheConfig::from_file(path)?;
    config.validate()?;

    println!("✓ Configuration file is valid: {}", path);
    println!("\nSummary:");
    println!("  - Interpreter: {}", config.host.hython);
    println!("  - Bridge script: {}", config.host.bridge_script);
    println!("  - Request timeout: {}", config.host.request_timeout);
    println!("  - Poll interval: {}", config.polling.interval);
    println!("  - Stall timeout: {}", config.polling.stall_timeout);
    println!("  - Max wait: {}", config.polling.max_wait);
    match config.execution.max_parallel_units {
        Some(units) => println!("  - Parallel units: {}", units),
        None => println!("  - Parallel units: {} (CPU count)", num_cpus::get()),
    }

    Ok(())
}

fn generate() -> Result<()> {
    info!("Generating example config");
    println!("{}", BatchcacheConfig::example()?);
    Ok(())
}

fn show(common: &CommonConfigArgs) -> Result<()> {
    info!("Showing effective configuration");

    let merged = MergedRunConfig::load(common)?;

    println!("Effective Configuration:\n");
    match &merged.config_path {
        Some(path) => println!("config file        = {}", path.display()),
        None => println!("config file        = (none, using defaults)"),
    }
    println!("hython             = {}", merged.hython);
    println!("bridge_script      = {}", merged.bridge_script.display());
    println!("request_timeout    = {}", describe_limit(merged.request_timeout));
    println!("poll_interval      = {:?}", merged.poll.interval);
    println!("stall_timeout      = {}", describe_limit(merged.poll.stall_timeout));
    println!("max_wait           = {}", describe_limit(merged.poll.max_wait));
    println!("max_parallel_units = {}", merged.max_parallel_units);
    println!("log_level          = {}", merged.log_level);
    println!(
        "log_format         = {}",
        merged.log_format.as_deref().unwrap_or("(auto)")
    );

    Ok(())
}

fn describe_limit(limit: Option<std::time::Duration>) -> String {
    match limit {
        Some(limit) => format!("{:?}", limit),
        None => "off".to_string(),
    }
}
