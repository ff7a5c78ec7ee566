use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

use crate::cli::args::{Args, Commands, ScanArgs};
use crate::cli::commands::{run_config_command, run_rules_command, run_scan_command};

pub struct RootCommand;

impl RootCommand {
    pub async fn execute() -> Result<ExitCode> {
        let args = Args::parse();
        init_logging(args.verbosity, args.quiet);

        match &args.command {
            Commands::Scan(command) => {
                let scan_args = ScanArgs::from_command(command, &args);
                run_scan_command(scan_args).await
            }
            Commands::Rules => run_rules_command(),
            Commands::Config { init } => run_config_command(*init),
        }
    }
}

/// `RUST_LOG` wins over the flags; without it `-v` means info, `-vv` debug.
fn init_logging(verbosity: u8, quiet: bool) {
    let level = match (quiet, verbosity) {
        (true, _) => log::LevelFilter::Error,
        (false, 0) => log::LevelFilter::Warn,
        (false, 1) => log::LevelFilter::Info,
        (false, 2) => log::LevelFilter::Debug,
        (false, _) => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}
