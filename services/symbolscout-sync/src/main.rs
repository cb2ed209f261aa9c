//! SymbolScout Sync - keeps passivbot coin lists clear of flagged symbols
//!
//! Each cycle:
//! 1. Fetches new events from the SymbolScout feed (or merges two watch-lists)
//! 2. Derives the set of base symbols to exclude
//! 3. Rewrites the bot's config files where that set changes them
//! 4. Restarts the bot's tmux session when any file changed

use tracing::info;

use symbolscout_sync::{Settings, SyncRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(settings.log_level())
        .init();

    info!("Starting SymbolScout Sync...");
    info!(
        "Target configs: {:?}",
        settings.target_config_files()
    );

    let runner = SyncRunner::from_settings(&settings)?;
    runner.run().await
}
