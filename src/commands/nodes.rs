/// `batchcache nodes` command implementation
///
/// Lists the cache nodes of a scene through the bridge's list mode.
use anyhow::{anyhow, Context, Result};

use crate::cli::NodesArgs;
use crate::discovery::list_cache_units;
use crate::job::{serialize, Batch, ExecutionMode, JobDescriptor};
use crate::merger::MergedRunConfig;

pub async fn run(args: &NodesArgs) -> Result<()> {
    let mode: ExecutionMode = args.mode.parse().map_err(|e| anyhow!("{}", e))?;
    let config = MergedRunConfig::load(&args.common)?;

    let units = list_cache_units(&config.host_config(), &args.scene)
        .await
        .with_context(|| format!("Failed to list cache nodes in {}", args.scene))?;

    if units.is_empty() {
        eprintln!("No cache nodes found in {}", args.scene);
        return Ok(());
    }

    if args.row {
        let mut job = JobDescriptor::new();
        job.push_batch(&args.scene, Batch::new(mode, units));
        print!("{}", serialize(&job));
    } else {
        for unit in &units {
            println!("{}", unit);
        }
    }

    Ok(())
}
