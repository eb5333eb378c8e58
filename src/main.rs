use anyhow::Result;
use clap::{CommandFactory, Parser};

use batchcache::cli::{Cli, Commands, RunArgs};
use batchcache::{commands, config_discovery, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize structured logging
    init_logging(&cli);

    match cli.command {
        Some(Commands::Run(args)) => commands::run::run(&args).await,
        Some(Commands::Plan(args)) => commands::plan::run(&args),
        Some(Commands::Merge(args)) => commands::merge::run(&args),
        Some(Commands::Nodes(args)) => commands::nodes::run(&args).await,
        Some(Commands::Config(args)) => commands::config::run(args.command),
        Some(Commands::Doctor(args)) => commands::doctor::run(args),
        None => match cli.job {
            Some(job) => {
                let args = RunArgs {
                    job,
                    common: cli.common,
                };
                commands::run::run(&args).await
            }
            None => {
                Cli::command().print_help()?;
                std::process::exit(2);
            }
        },
    }
}

/// Log level and format come from flags, then the config file, then defaults.
/// A broken config file is ignored here and reported by the command itself.
fn init_logging(cli: &Cli) {
    let common = cli.common();
    let file = config_discovery::load_config_with_discovery(common.and_then(|c| c.config.as_deref()))
        .ok()
        .flatten()
        .map(|loaded| loaded.config.observability);

    let level = common
        .and_then(|c| c.config_log_level.clone())
        .or_else(|| file.as_ref().map(|o| o.log_level.clone()));
    let format = file.and_then(|o| o.log_format);

    logging::init(level.as_deref(), format.as_deref());
}
