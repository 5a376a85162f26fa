use clap::Parser;

use wallet_session::cli::{Cli, run_command};
use wallet_session::config::SessionConfig;
use wallet_session::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = SessionConfig::from_env()?;
    tracing::debug!(store = %config.session_path.display(), "Loaded configuration");

    run_command(cli.command, &config).await
}
