pub mod config;
pub mod rules;
pub mod scan;

pub use config::run_config_command;
pub use rules::run_rules_command;
pub use scan::run_scan_command;
