//! `wallet-session` command line.
//!
//! Operator tooling around the persisted session record and the pure
//! validation and classification helpers. There is no wallet agent in a
//! terminal, so nothing here connects.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::SessionConfig;
use crate::error::WalletError;
use crate::recovery::{RecoveryCatalog, classify_message};
use crate::retry::should_retry_error;
use crate::store::{FileStore, PersistenceAdapter};
use crate::validate::{NETWORK_REGISTRY, format_address, validate_connection_payload};

#[derive(Parser, Debug)]
#[command(name = "wallet-session")]
#[command(about = "Inspect and maintain wallet session state", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true, env = "WALLET_JSON_LOGS")]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the persisted session record
    Status,

    /// Remove the persisted session record
    Forget,

    /// Validate an address/public key pair as a wallet would return it
    Validate {
        #[arg(long)]
        address: String,

        #[arg(long)]
        public_key: String,

        /// Network name, key or chain id that must be supported
        #[arg(long)]
        network: Option<String>,
    },

    /// List supported networks
    Networks,

    /// Classify a raw wallet error message and list recovery options
    Diagnose { message: String },

    /// Shorten an address for display
    Format {
        address: String,

        #[arg(long)]
        prefix: Option<usize>,

        #[arg(long)]
        suffix: Option<usize>,
    },
}

pub async fn run_command(command: Command, config: &SessionConfig) -> anyhow::Result<()> {
    match command {
        Command::Status => status(config).await,
        Command::Forget => forget(config).await,
        Command::Validate {
            address,
            public_key,
            network,
        } => validate(&address, &public_key, network.as_deref()),
        Command::Networks => {
            networks();
            Ok(())
        }
        Command::Diagnose { message } => {
            diagnose(&message, config);
            Ok(())
        }
        Command::Format {
            address,
            prefix,
            suffix,
        } => {
            println!(
                "{}",
                format_address(
                    &address,
                    prefix.unwrap_or(config.address_prefix_len),
                    suffix.unwrap_or(config.address_suffix_len),
                )
            );
            Ok(())
        }
    }
}

fn adapter(config: &SessionConfig) -> PersistenceAdapter {
    PersistenceAdapter::new(Arc::new(FileStore::new(&config.session_path)))
}

async fn status(config: &SessionConfig) -> anyhow::Result<()> {
    let record = adapter(config).load_record().await;

    println!("Wallet session");
    println!("==============\n");
    println!("  store:       {}", config.session_path.display());
    println!("  connected:   {}", record.connected);
    println!(
        "  account:     {}",
        record
            .last_account
            .as_deref()
            .map(|a| format_address(a, config.address_prefix_len, config.address_suffix_len))
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "  network:     {}",
        record.preferred_network.as_deref().unwrap_or("-")
    );
    println!(
        "  since:       {}",
        record
            .connected_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "\n  auto-reconnect on next start: {}",
        if record.wants_reconnect() { "yes" } else { "no" }
    );
    Ok(())
}

async fn forget(config: &SessionConfig) -> anyhow::Result<()> {
    adapter(config).clear_session().await;
    println!("Session record cleared ({})", config.session_path.display());
    Ok(())
}

fn validate(address: &str, public_key: &str, network: Option<&str>) -> anyhow::Result<()> {
    match validate_connection_payload(Some(address), Some(public_key), network) {
        Ok(payload) => {
            println!("  [pass] address:    {}", payload.address);
            println!("  [pass] public key: {}", payload.public_key);
            if let Some(network) = payload.network {
                println!("  [pass] network:    {} ({})", network.name, network.chain_id);
            }
            Ok(())
        }
        Err(e) => {
            println!("  [FAIL] {e}");
            anyhow::bail!("payload rejected: {e}")
        }
    }
}

fn networks() {
    println!("Supported networks");
    println!("==================\n");
    for entry in NETWORK_REGISTRY {
        println!("  {:<8} {:<14} chain id {}", entry.key, entry.name, entry.chain_id);
    }
}

fn diagnose(message: &str, config: &SessionConfig) {
    let error = WalletError::new(classify_message(message), message);
    let catalog = RecoveryCatalog::new(config.install_url.clone(), config.support_url.clone());

    println!("  kind:      {}", error.kind);
    println!("  message:   {}", error.message);
    println!("  retryable: {}", should_retry_error(message));
    println!();
    for strategy in catalog.strategies(error.kind) {
        match &strategy.action_url {
            Some(url) => println!(
                "  {}. {}: {} ({url})",
                strategy.priority, strategy.title, strategy.description
            ),
            None => println!(
                "  {}. {}: {}",
                strategy.priority, strategy.title, strategy.description
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_validate_arguments() {
        let cli = Cli::try_parse_from([
            "wallet-session",
            "validate",
            "--address",
            "0xabc",
            "--public-key",
            "00ff",
            "--network",
            "testnet",
        ])
        .unwrap();

        let Command::Validate { network, .. } = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(network.as_deref(), Some("testnet"));
    }

    #[test]
    fn parses_format_overrides() {
        let cli =
            Cli::try_parse_from(["wallet-session", "format", "0x1234", "--prefix", "4"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Format {
                prefix: Some(4),
                suffix: None,
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_bad_key() {
        assert!(validate("0xabc", "nope", None).is_err());
    }

    #[tokio::test]
    async fn forget_clears_file_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            session_path: dir.path().join("session.json"),
            ..SessionConfig::default()
        };
        adapter(&config)
            .save_session("0xabc", "Testnet", chrono::Utc::now())
            .await;

        run_command(Command::Forget, &config).await.unwrap();

        assert!(!adapter(&config).load_record().await.wants_reconnect());
    }
}
