//! Autoupdate - entry point for the updater binary
//!
//! Exit status: 0 no update, 1 installed, 2 cancelled, -1 error.

use autoupdate_lib::engine::{
    cli::Cli,
    config::UpdaterConfig,
    logging,
    ui,
    updater::UpdateSession,
};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            -1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = match &cli.config {
        Some(path) => UpdaterConfig::load(path)?,
        None => UpdaterConfig::default(),
    };
    let config = cli.apply(config);

    let ui = ui::select(config.silent);
    logging::init(cli.verbose, Some(ui.clone()));

    if config.debug {
        tracing::info!("debug mode enabled, requests go to the local debug server");
    }

    let mut session = UpdateSession::new(config, ui)?;
    let outcome = session.run().await;
    Ok(outcome.exit_status().code())
}
