/// `batchcache run` command implementation
///
/// Loads the job, starts the Houdini bridge and drives every scene through
/// the orchestrator. Ctrl-C stops new triggers and the summary is still printed;
/// a second Ctrl-C exits at once.
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::RunArgs;
use crate::cli_utils::batchcache_prefix;
use crate::commands::report_issues;
use crate::host::HythonHost;
use crate::job::{load_job_file, ParseReport};
use crate::merger::MergedRunConfig;
use crate::orchestrator::{BatchOrchestrator, JobResult};
use crate::progress::ConsoleReporter;

/// Exit status after a second Ctrl-C, as a shell reports SIGINT
pub(crate) const INTERRUPTED_EXIT_CODE: i32 = 130;

pub async fn run(args: &RunArgs) -> Result<()> {
    let report = load_job_file(Path::new(&args.job))?;
    report_issues(&args.job, &report);

    let config = MergedRunConfig::load(&args.common)?;
    if let Some(path) = &config.config_path {
        info!("Using config: {}", path.display());
    }

    if report.job.is_empty() {
        warn!(job = %args.job, "Job file contains no runnable rows");
        let code = exit_code(&report, &JobResult::default());
        if code != 0 {
            std::process::exit(code);
        }
        return Ok(());
    }

    info!(
        scenes = report.job.scenes().len(),
        batches = report.job.batch_count(),
        units = report.job.unit_count(),
        workers = config.max_parallel_units,
        "Starting job"
    );

    if !config.bridge_script.is_file() {
        error!(
            "Bridge script not found: {} (set host.bridge_script or --config-bridge-script)",
            config.bridge_script.display()
        );
        std::process::exit(2);
    }

    let host = match HythonHost::spawn(&config.host_config()).await {
        Ok(host) => Arc::new(host),
        Err(e) => {
            error!("Failed to start the Houdini bridge: {}", e);
            std::process::exit(2);
        }
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted: no further units will be triggered (Ctrl-C again to quit now)");
        interrupt.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            error!("Interrupted twice, exiting without waiting for the bridge");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    let orchestrator = BatchOrchestrator::new(
        host.clone(),
        config.orchestrator_config(),
        Arc::new(ConsoleReporter::new()),
        cancel,
    );
    let result = orchestrator.run(&report.job).await;
    host.shutdown().await;

    println!();
    print!("{} {}", batchcache_prefix(), result.summary());

    let code = exit_code(&report, &result);
    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}

/// Rejected rows count as fatal, on top of the job's own outcome
pub(crate) fn exit_code(report: &ParseReport, result: &JobResult) -> i32 {
    if report.has_rejections() {
        2
    } else {
        result.exit_code()
    }
}
