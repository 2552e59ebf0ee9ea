use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tipcam::config::ConfigResolver;
use tipcam::diagnostics::{self, COMPILED_DRIVERS, DEFAULT_DRIVER};
use tipcam::logging::init_logging;

#[derive(Parser)]
#[command(version, about = "Fetches the daily USD exchange rate and stores it")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding config.ini and .env
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch today's rate and insert it (default)
    Run,
    /// Verify connectivity and read/insert permission on the rate table
    Check,
    /// List database drivers built into this binary
    Drivers {
        /// Driver that must be present
        #[arg(long, default_value = DEFAULT_DRIVER)]
        require: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => tipcam::job::execute(cli.config_dir, cli.verbose)
            .await
            .exit_code(),
        Commands::Check => check(cli.config_dir, cli.verbose).await,
        Commands::Drivers { require } => drivers(&require, cli.verbose),
    }
}

async fn check(config_dir: Option<PathBuf>, verbose: bool) -> ExitCode {
    init_logging(None, verbose);
    info!("=== Database connectivity check ===");

    let config = match ConfigResolver::new(config_dir).resolve() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match diagnostics::check_target(&config).await {
        Ok(report) if report.is_ready() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn drivers(require: &str, verbose: bool) -> ExitCode {
    init_logging(None, verbose);
    info!("Database drivers built in: {}", COMPILED_DRIVERS.join(", "));

    if diagnostics::has_driver(require) {
        info!("Driver '{require}' is available");
        ExitCode::SUCCESS
    } else {
        warn!("Driver '{require}' is not available in this build");
        ExitCode::FAILURE
    }
}
