/// Main entry point using Clean Architecture
/// This file is part of the outermost layer (Frameworks & Drivers)

use clap::Parser;
use csv_xxl::adapters::cli::{exit_code, run, Cli};
use std::io::Write;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    // Logs go to stderr so they never mix with CSV output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "csv_xxl=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    tracing::debug!("Running {:?}", cli.command);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = run(cli, &mut out);
    let _ = out.flush();

    if let Err(e) = result {
        tracing::debug!("Command failed: {:?}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}
