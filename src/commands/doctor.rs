use anyhow::Result;
use std::env;
use std::path::PathBuf;

use crate::cli::DoctorArgs;
use crate::config_discovery::{discover_config, global_config_path};
use crate::merger::MergedRunConfig;

/// Where Houdini installers put hython on each platform
const INSTALL_PATTERNS: &[&str] = &[
    "/opt/hfs*/bin/hython",
    "/Applications/Houdini/Houdini*/Frameworks/Houdini.framework/Versions/Current/Resources/bin/hython",
    "C:/Program Files/Side Effects Software/Houdini */bin/hython.exe",
];

pub fn run(args: DoctorArgs) -> Result<()> {
    println!("🔍 batchcache doctor - Houdini setup check\n");

    let mut all_ok = true;

    // Check 1: batchcache binary
    if let Ok(exe_path) = env::current_exe() {
        println!("✅ batchcache binary found: {}", exe_path.display());
        if args.verbose {
            println!("   Version: {}", env!("CARGO_PKG_VERSION"));
        }
    } else {
        println!("❌ Could not determine batchcache binary path");
        all_ok = false;
    }

    // Check 2: Configuration
    match env::current_dir().ok().map(|dir| discover_config(&dir)) {
        Some(Ok(Some(config_path))) => {
            println!("✅ Configuration found: {}", config_path.display());
        }
        Some(Err(e)) => {
            println!("❌ Configuration lookup failed: {}", e);
            all_ok = false;
        }
        _ => {
            println!("ℹ️  No batchcache.toml found, using defaults");
            if args.verbose {
                if let Some(global) = global_config_path() {
                    println!("   Global config location: {}", global.display());
                }
                println!("   Run 'batchcache config generate' for an example");
            }
        }
    }

    let config = match MergedRunConfig::load(&args.common) {
        Ok(config) => config,
        Err(e) => {
            println!("❌ Configuration is invalid: {:#}", e);
            std::process::exit(1);
        }
    };

    // Check 3: Interpreter
    match which::which(&config.hython) {
        Ok(path) => println!("✅ Interpreter found: {}", path.display()),
        Err(_) if PathBuf::from(&config.hython).is_file() => {
            println!("✅ Interpreter found: {}", config.hython);
        }
        Err(_) => {
            println!("❌ Interpreter '{}' not found on PATH", config.hython);
            let installed = find_installed_interpreters();
            if installed.is_empty() {
                println!("   No Houdini installation found in the usual locations");
            } else {
                println!("   Installed interpreters (set host.hython to one of these):");
                for path in installed {
                    println!("   - {}", path.display());
                }
            }
            all_ok = false;
        }
    }

    // Check 4: Bridge script
    if config.bridge_script.is_file() {
        println!("✅ Bridge script found: {}", config.bridge_script.display());
    } else {
        println!(
            "❌ Bridge script not found: {}",
            config.bridge_script.display()
        );
        println!("   Set host.bridge_script or pass --config-bridge-script");
        all_ok = false;
    }

    // Check 5: Environment variables
    if args.verbose {
        println!("\n📋 Environment Variables:");
        let env_vars = [
            "BATCHCACHE_CONFIG",
            "BATCHCACHE_CONFIG_HYTHON",
            "BATCHCACHE_CONFIG_BRIDGE_SCRIPT",
            "BATCHCACHE_LOG_FORMAT",
            "HFS",
            "RUST_LOG",
        ];

        let mut any_set = false;
        for var in &env_vars {
            if let Ok(value) = env::var(var) {
                println!("   {} = {}", var, value);
                any_set = true;
            }
        }

        if !any_set {
            println!("   (None set)");
        }
    }

    // Summary
    println!();
    if all_ok {
        println!("✅ All checks passed! batchcache is ready to run jobs.");
    } else {
        println!("⚠️  Some issues detected. Please fix the items marked with ❌ above.");
        std::process::exit(1);
    }

    Ok(())
}

/// Interpreters found in the standard install locations, newest last
fn find_installed_interpreters() -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = INSTALL_PATTERNS
        .iter()
        .filter_map(|pattern| glob::glob(pattern).ok())
        .flat_map(|paths| paths.filter_map(|entry| entry.ok()))
        .filter(|path| path.is_file())
        .collect();
    found.sort();
    found
}
