use dotenvy::dotenv;
use std::process::ExitCode;

use astsentry::cli::{EXIT_USAGE, RootCommand};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    match RootCommand::execute().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(EXIT_USAGE)
        }
    }
}
