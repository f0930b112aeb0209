//! Command line interface

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use warden_core::{AcquireOptions, LockClient, LockError, acquire_lock, release_lock};

#[derive(Debug, Parser)]
#[command(name = "warden", version, about = "Hold and probe distributed locks")]
pub struct Cli {
    /// Settings file (default: conf/warden.toml)
    #[arg(short = 'c', long = "config", env = "WARDEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the collected lock metrics in Prometheus text format on exit
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Enter a critical section on the given keys and hold it
    Hold {
        /// Comma separated keys, locked in the given order
        #[arg(long, value_delimiter = ',', required = true)]
        keys: Vec<String>,
        #[arg(long, default_value_t = 1000)]
        hold_ms: u64,
        /// Fail instead of running unprotected when a key cannot be locked
        #[arg(long)]
        fail_hard: bool,
        #[arg(long)]
        lease_secs: Option<u64>,
    },
    /// Report whether a key is free without waiting for it
    Probe {
        #[arg(long)]
        key: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every key was held for the whole hold period
    Held,
    Unprotected,
    Free,
    Taken,
}

pub async fn run(command: Command, client: &LockClient) -> anyhow::Result<Outcome> {
    match command {
        Command::Hold {
            keys,
            hold_ms,
            fail_hard,
            lease_secs,
        } => {
            let mut section = client.critical_section(keys).fail_hard(fail_hard);
            if let Some(secs) = lease_secs {
                section = section.lease(Duration::from_secs(secs));
            }

            section.enter().await?;
            let outcome = if section.is_protected() {
                Outcome::Held
            } else {
                Outcome::Unprotected
            };
            info!(keys = ?section.keys(), hold_ms, ?outcome, "Holding critical section");

            tokio::time::sleep(Duration::from_millis(hold_ms)).await;
            section.exit().await;
            Ok(outcome)
        }
        Command::Probe { key } => {
            let lease = client.config().object_lease();
            let acquired =
                acquire_lock(client.lock(&key, lease), false, AcquireOptions::non_blocking())
                    .await;
            match acquired {
                Ok(lock) => {
                    release_lock(lock, true).await?;
                    Ok(Outcome::Free)
                }
                Err(LockError::NotAcquired(_)) => Ok(Outcome::Taken),
                Err(err) => Err(err.into()),
            }
        }
    }
}
