use std::process::ExitCode;

use cdn_publish::cli::{describe_error, run, Cli};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version also land here
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    tracing::info!("CLI arguments parsed, invoking run");
    match run(cli).await {
        Ok(()) => {
            tracing::info!("CLI completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            eprintln!("{}", describe_error(&e));
            ExitCode::FAILURE
        }
    }
}
