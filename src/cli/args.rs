use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Only log errors and hide the progress bar
    #[arg(short, long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,

    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan serialized ASTs for vulnerability and usage signatures
    Scan(ScanCommand),

    /// List the registered rules in evaluation order
    Rules,

    /// Print the default configuration
    Config {
        /// Write it to ~/.config/astsentry/config.toml unless that file exists
        #[arg(long)]
        init: bool,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ScanCommand {
    /// `.ast.json` files, directories, or filelists
    pub targets: Vec<PathBuf>,

    /// Directory that tree filenames are resolved against
    #[arg(long)]
    pub source_root: Option<PathBuf>,

    /// Read AST paths from a filelist (one path per line)
    #[arg(long)]
    pub filelist: Option<PathBuf>,

    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Write findings here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only run these rules
    #[arg(long, value_delimiter = ',')]
    pub enable: Vec<String>,

    /// Skip these rules
    #[arg(long, value_delimiter = ',')]
    pub disable: Vec<String>,

    /// Number of trees scanned concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Sarif,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Sarif => write!(f, "sarif"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" | "jsonl" => Ok(OutputFormat::Json),
            "sarif" => Ok(OutputFormat::Sarif),
            _ => Err(format!("Unsupported format: {}", s)),
        }
    }
}

/// Scan options after merging global flags.
#[derive(Debug, Clone, Default)]
pub struct ScanArgs {
    pub targets: Vec<PathBuf>,
    pub source_root: Option<PathBuf>,
    pub filelist: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub output: Option<PathBuf>,
    pub enable: Vec<String>,
    pub disable: Vec<String>,
    pub jobs: Option<usize>,
    pub verbosity: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
}

impl ScanArgs {
    pub fn from_command(command: &ScanCommand, args: &Args) -> Self {
        ScanArgs {
            targets: command.targets.clone(),
            source_root: command.source_root.clone(),
            filelist: command.filelist.clone(),
            format: command.format,
            output: command.output.clone(),
            enable: command.enable.clone(),
            disable: command.disable.clone(),
            jobs: command.jobs,
            verbosity: args.verbosity,
            quiet: args.quiet,
            config: args.config.clone(),
        }
    }
}

/// A scan needs at least one target or a filelist, from flags or config.
pub fn validate_scan_args(args: &ScanArgs, configured_filelist: bool) -> anyhow::Result<()> {
    if args.targets.is_empty() && args.filelist.is_none() && !configured_filelist {
        anyhow::bail!("Nothing to scan: pass a TARGET or --filelist");
    }
    Ok(())
}
