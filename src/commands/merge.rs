/// `batchcache merge` command implementation
///
/// Rewrites a job file so each (scene, mode) pair appears on a single row.
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::cli::MergeArgs;
use crate::commands::report_issues;
use crate::job::{load_job_file, serialize};

pub fn run(args: &MergeArgs) -> Result<()> {
    let report = load_job_file(Path::new(&args.job))?;
    report_issues(&args.job, &report);

    if report.has_rejections() {
        warn!(
            "{} rejected row(s) are not part of the merged job",
            report.rejected.len()
        );
    }

    let merged = serialize(&report.job);

    match &args.output {
        Some(output) => {
            fs::write(output, &merged)
                .with_context(|| format!("Failed to write merged job: {}", output))?;
            info!(
                "Wrote {} scene(s) with {} unit(s) to {}",
                report.job.scenes().len(),
                report.job.unit_count(),
                output
            );
        }
        None => print!("{}", merged),
    }

    Ok(())
}
