use std::process::ExitCode;
use std::sync::Arc;

use casting::config::setup_logging;
use casting::web::AppState;
use clap::Parser;
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = casting::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return ExitCode::FAILURE;
    }

    let catalog = match cli.services.catalog() {
        Ok(catalog) => Arc::new(catalog),
        Err(err) => {
            error!("Catalog error: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let ballot = match cli.ballot(&catalog) {
        Ok(ballot) => ballot,
        Err(err) => {
            error!("Ballot error: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let services = match cli.services.services(catalog.clone()) {
        Ok(services) => services,
        Err(err) => {
            error!("Configuration error: {}", err);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Loaded {} archetypes, {} choices per session",
        catalog.archetypes.len(),
        ballot.rounds()
    );

    let state = AppState::new(catalog, ballot, services, cli.static_dir.clone());
    if let Err(err) = casting::web::setup_server(&cli.listen_address, cli.port, state).await {
        error!("Application error: {}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
