//! Main entry point for the `warden` command line tool.

use clap::Parser;
use warden_cli::command::{self, Cli, Outcome};
use warden_cli::config::Settings;
use warden_cli::startup;
use warden_core::LockClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let _logging_guard = startup::init_logging(&settings.logging)?;
    let metrics = warden_cli::metrics::init_metrics()?;

    let store = startup::build_store(&settings).await?;
    let client = LockClient::with_config(store, settings.lock.clone());

    let outcome = command::run(cli.command, &client).await?;
    println!(
        "{}",
        match outcome {
            Outcome::Held => "held",
            Outcome::Unprotected => "unprotected",
            Outcome::Free => "free",
            Outcome::Taken => "taken",
        }
    );
    if cli.metrics {
        print!("{}", metrics.render());
    }
    Ok(())
}
