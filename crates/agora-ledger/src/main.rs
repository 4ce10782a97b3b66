//! Ledger Node binary
//!
//! Serves the versioned feedback ledger over HTTP.

use agora_ledger::{LedgerConfig, LedgerNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledger_node=info,agora_ledger=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Ledger Node");

    let config = LedgerConfig::from_env()?;

    let node = LedgerNode::new(config).await?;
    node.run().await?;

    Ok(())
}
