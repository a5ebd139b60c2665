//! Rusty-Wallet: replays JSON-RPC provider calls against the wallet request core

use std::path::PathBuf;
use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use eyre::WrapErr;

use rusty_wallet_adapters::{WalletAdapters, WalletConfig};
use rusty_wallet_core::{Account, AccountKind};

mod console;
mod replay;

#[derive(Parser, Debug)]
#[command(version, about = "Replays EIP-1193 provider calls through the Rusty-Wallet request core")]
struct Cli {
    /// Approve every prompt without asking
    #[arg(short, long)]
    yes: bool,

    /// Hex private key of the active account; a throwaway key is used when unset
    #[arg(long, env = "RUSTY_WALLET_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// JSON-lines file of provider calls
    requests: PathBuf,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries the responses
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Rusty-Wallet");

    let config = WalletConfig::from_env();
    let adapters = WalletAdapters::with_config(&config);
    let account = activate_account(&adapters, cli.private_key.as_deref())?;
    tracing::info!(
        account = %account.address,
        relay = adapters.relay.mode_name(),
        default_chain = config.default_chain.as_str(),
        "wallet ready"
    );

    let controller = Arc::new(adapters.controller(&config));
    let approvals = tokio::spawn(console::serve_approvals(
        adapters.approval.clone(),
        cli.yes,
    ));

    let result = replay::replay_file(controller, &cli.requests).await;
    approvals.abort();
    result
}

/// Imports the given signing key, or a throwaway one.
fn activate_account(adapters: &WalletAdapters, private_key: Option<&str>) -> eyre::Result<Account> {
    let address = match private_key {
        Some(key) => adapters
            .keyring
            .import_private_key(key, AccountKind::SimpleKeyPair)
            .wrap_err("failed to import the private key")?,
        None => {
            tracing::warn!("no private key given, using an ephemeral key");
            adapters
                .keyring
                .import_signer(PrivateKeySigner::random(), AccountKind::SimpleKeyPair)?
        }
    };
    let account = Account {
        address,
        kind: AccountKind::SimpleKeyPair,
        brand_name: "Private Key".to_owned(),
    };
    adapters.accounts.switch_to(Some(account.clone()))?;
    Ok(account)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_flags_and_request_path() {
        let cli = Cli::try_parse_from(["rusty-wallet", "-y", "session.jsonl"]).expect("parse");
        assert!(cli.yes);
        assert_eq!(cli.requests, PathBuf::from("session.jsonl"));

        let cli = Cli::try_parse_from(["rusty-wallet", "session.jsonl"]).expect("parse");
        assert!(!cli.yes);
    }

    #[test]
    fn help_is_not_taken_as_the_request_path() {
        let err = Cli::try_parse_from(["rusty-wallet", "--help"]).expect_err("help exits");
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert!(Cli::try_parse_from(["rusty-wallet"]).is_err());
        assert!(Cli::try_parse_from(["rusty-wallet", "a.jsonl", "b.jsonl"]).is_err());
    }
}
