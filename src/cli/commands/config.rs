use anyhow::Result;
use std::process::ExitCode;

use crate::config::AstsentryConfig;

pub fn run_config_command(init: bool) -> Result<ExitCode> {
    if !init {
        print!("{}", AstsentryConfig::generate_default_config());
        return Ok(ExitCode::SUCCESS);
    }

    let (path, created) = AstsentryConfig::ensure_user_config_exists()?;
    if created {
        println!("✅ Wrote default configuration to {}", path.display());
    } else {
        println!("Configuration already exists at {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}
