/// `batchcache plan` command implementation
///
/// Parses a job file and prints what a run would do, without starting Houdini.
use anyhow::Result;
use std::fmt::Write as _;
use std::path::Path;

use crate::cli::PlanArgs;
use crate::commands::report_issues;
use crate::job::{load_job_file, JobDescriptor};

pub fn run(args: &PlanArgs) -> Result<()> {
    let report = load_job_file(Path::new(&args.job))?;
    report_issues(&args.job, &report);

    print!("{}", render_plan(&report.job));
    println!(
        "{} scene(s), {} batch(es), {} unit(s); {} row(s) skipped, {} rejected",
        report.job.scenes().len(),
        report.job.batch_count(),
        report.job.unit_count(),
        report.warnings.len(),
        report.rejected.len()
    );

    if report.has_rejections() {
        std::process::exit(2);
    }

    Ok(())
}

/// One block per scene, one line per batch, in execution order
pub(crate) fn render_plan(job: &JobDescriptor) -> String {
    let mut out = String::new();
    for scene in job.scenes() {
        let _ = writeln!(out, "{}", scene.scene_path);
        for (index, batch) in scene.batches.iter().enumerate() {
            let units: Vec<&str> = batch.units.iter().map(|u| u.as_str()).collect();
            let _ = writeln!(
                out,
                "  {}. {} ({}): {}",
                index + 1,
                batch.mode,
                units.len(),
                units.join(", ")
            );
        }
    }
    out
}
