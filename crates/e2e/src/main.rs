//! landing-smoke - run the landing page smoke checks
//!
//! Prints one success line and exits 0, or prints the error and exits 1.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use landing_smoke::{ChromeLauncher, SmokeConfig};

#[derive(Parser, Debug)]
#[command(name = "landing-smoke")]
#[command(about = "Smoke-test the landing page across viewport widths")]
#[command(version)]
struct Args {
    /// TOML file overriding the built-in defaults
    #[arg(short, long, default_value = "landing-smoke.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match SmokeConfig::load(&args.config) {
        Ok(config) => landing_smoke::run(&config, &ChromeLauncher).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(summary) => {
            println!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
