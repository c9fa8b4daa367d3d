//! mdist - reproducible Matomo distribution builder

use std::process::ExitCode;

use clap::Parser;
use mdist_cli::{Cli, EXIT_STALE, cmd};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .init();

    match cmd::run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            let stale = err
                .downcast_ref::<mdist_core::Error>()
                .is_some_and(mdist_core::Error::is_stale_lock);
            ExitCode::from(if stale { EXIT_STALE } else { 1 })
        }
    }
}
