use clap::{Args, Parser, Subcommand};

/// batchcache - Batch cache writer for Houdini scenes
///
/// Opens each scene listed in a job file, triggers its cache nodes one batch
/// at a time and waits until every frame is on disk.
#[derive(Parser, Debug)]
#[command(name = "batchcache")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Batch cache writer for Houdini scenes", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Job file to run (shorthand for `batchcache run <JOB>`)
    pub job: Option<String>,

    #[command(flatten)]
    pub common: CommonConfigArgs,
}

impl Cli {
    /// Configuration flags of whichever command was invoked, if it takes any
    pub fn common(&self) -> Option<&CommonConfigArgs> {
        match &self.command {
            None => Some(&self.common),
            Some(Commands::Run(args)) => Some(&args.common),
            Some(Commands::Nodes(args)) => Some(&args.common),
            Some(Commands::Doctor(args)) => Some(&args.common),
            Some(Commands::Config(args)) => match &args.command {
                ConfigCommands::Show { common } => Some(common),
                _ => None,
            },
            Some(Commands::Plan(_)) | Some(Commands::Merge(_)) => None,
        }
    }
}

/// Common configuration arguments shared across commands
#[derive(Args, Debug, Clone, Default)]
pub struct CommonConfigArgs {
    /// Config file path
    #[arg(short = 'c', long, env = "BATCHCACHE_CONFIG")]
    pub config: Option<String>,

    /// Houdini interpreter (name on PATH or absolute path)
    #[arg(long, env = "BATCHCACHE_CONFIG_HYTHON")]
    pub config_hython: Option<String>,

    /// Bridge script run by the interpreter
    #[arg(long, env = "BATCHCACHE_CONFIG_BRIDGE_SCRIPT")]
    pub config_bridge_script: Option<String>,

    /// Longest wait for a reply from the bridge ("off" to disable)
    #[arg(long, env = "BATCHCACHE_CONFIG_REQUEST_TIMEOUT")]
    pub config_request_timeout: Option<String>,

    /// Delay between completion checks (e.g., "500ms", "2s")
    #[arg(long, env = "BATCHCACHE_CONFIG_POLL_INTERVAL")]
    pub config_poll_interval: Option<String>,

    /// Give up on a unit with no new frames for this long ("off" to disable)
    #[arg(long, env = "BATCHCACHE_CONFIG_STALL_TIMEOUT")]
    pub config_stall_timeout: Option<String>,

    /// Give up on a unit after this long ("off" to disable)
    #[arg(long, env = "BATCHCACHE_CONFIG_MAX_WAIT")]
    pub config_max_wait: Option<String>,

    /// Maximum units cached at once in a parallel batch
    #[arg(long, env = "BATCHCACHE_CONFIG_MAX_PARALLEL_UNITS")]
    pub config_max_parallel_units: Option<usize>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, env = "BATCHCACHE_CONFIG_LOG_LEVEL")]
    pub config_log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every scene and batch of a job file
    Run(RunArgs),

    /// Parse a job file and show what would run
    Plan(PlanArgs),

    /// Rewrite a job file with rows merged per scene and mode
    Merge(MergeArgs),

    /// List the cache nodes of a scene
    Nodes(NodesArgs),

    /// Configuration management utilities
    Config(ConfigArgs),

    /// Check the Houdini installation and configuration
    Doctor(DoctorArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Job file (`scene, mode, unit, unit, ...` per line)
    pub job: String,

    #[command(flatten)]
    pub common: CommonConfigArgs,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Job file
    pub job: String,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Job file
    pub job: String,

    /// Write the merged job here instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Args, Debug)]
pub struct NodesArgs {
    /// Scene file to inspect
    pub scene: String,

    /// Execution mode used with --row
    #[arg(long, default_value = "sequential")]
    pub mode: String,

    /// Print a ready-to-use job row instead of one node per line
    #[arg(long)]
    pub row: bool,

    #[command(flatten)]
    pub common: CommonConfigArgs,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Validate {
        /// Path to config file
        path: String,
    },
    /// Generate example config file
    Generate,
    /// Show effective configuration (merged from all sources)
    Show {
        #[command(flatten)]
        common: CommonConfigArgs,
    },
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub common: CommonConfigArgs,

    /// Verbose output
    #[arg(short, long, env = "BATCHCACHE_VERBOSE")]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorthand_job_argument() {
        let cli = Cli::try_parse_from(["batchcache", "jobs/shot010.csv"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.job.as_deref(), Some("jobs/shot010.csv"));
    }

    #[test]
    fn test_run_subcommand_with_overrides() {
        let cli = Cli::try_parse_from([
            "batchcache",
            "run",
            "job.csv",
            "--config-poll-interval",
            "2s",
            "--config-max-parallel-units",
            "3",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.job, "job.csv");
                assert_eq!(args.common.config_poll_interval.as_deref(), Some("2s"));
                assert_eq!(args.common.config_max_parallel_units, Some(3));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_merge_output_flag() {
        let cli = Cli::try_parse_from(["batchcache", "merge", "job.csv", "-o", "out.csv"]).unwrap();
        match cli.command {
            Some(Commands::Merge(args)) => assert_eq!(args.output.as_deref(), Some("out.csv")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_nodes_defaults_to_sequential() {
        let cli = Cli::try_parse_from(["batchcache", "nodes", "shot.hip", "--row"]).unwrap();
        match cli.command {
            Some(Commands::Nodes(args)) => {
                assert_eq!(args.mode, "sequential");
                assert!(args.row);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
