//! Command-line entry point of the `peerdrop-relay` binary.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::{RelayConfig, RelayServer};

#[derive(Parser, Debug)]
#[command(name = "peerdrop-relay", version)]
#[command(about = "PeerDrop signaling relay and transfer session service")]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:8787.
    #[arg(long, short)]
    pub listen: Option<String>,

    /// Largest accepted relay frame, in bytes.
    #[arg(long)]
    pub max_message_bytes: Option<usize>,

    /// Log joins, leaves, relays and expiries at info level.
    #[arg(long)]
    pub log_events: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Builds the effective configuration: defaults, then the config file,
    /// then the environment, then these flags.
    pub fn resolve_config(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::from_file(path)?,
            None => RelayConfig::default(),
        };
        config.apply_env_from(env)?;
        if let Some(listen) = &self.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(max) = self.max_message_bytes {
            config.max_message_bytes = max;
        }
        if self.log_events {
            config.log_events = true;
        }
        config.validate()?;
        Ok(config)
    }
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config(|key| std::env::var(key).ok())?;

    if cli.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    RelayServer::new(config).run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_environment() {
        let cli = Cli::parse_from([
            "peerdrop-relay",
            "--listen",
            "127.0.0.1:4000",
            "--log-events",
        ]);
        let config = cli
            .resolve_config(|key| match key {
                "PEERDROP_LISTEN_ADDR" => Some("127.0.0.1:5000".into()),
                "PEERDROP_SWEEP_INTERVAL_SECS" => Some("5".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:4000");
        assert_eq!(config.sweep_interval_secs, 5);
        assert!(config.log_events);
    }
}
