pub mod args;
pub mod commands;
pub mod root;

pub use args::{Args, Commands, OutputFormat, ScanArgs, ScanCommand, validate_scan_args};
pub use root::RootCommand;

/// At least one tree failed or the sink rejected a finding.
pub const EXIT_FAILURES: u8 = 1;
/// Invalid configuration or arguments.
pub const EXIT_USAGE: u8 = 2;
/// Stopped by Ctrl-C.
pub const EXIT_INTERRUPTED: u8 = 130;
