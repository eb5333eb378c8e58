pub mod config;
pub mod doctor;
pub mod merge;
pub mod nodes;
pub mod plan;
pub mod run;

use tracing::{error, warn};

use crate::job::ParseReport;

/// Log skipped and rejected rows of a parsed job file
pub(crate) fn report_issues(job_path: &str, report: &ParseReport) {
    for issue in &report.warnings {
        warn!(job = %job_path, "Skipping row: {}", issue);
    }
    for issue in &report.rejected {
        error!(job = %job_path, "Rejected row: {}", issue);
    }
}
