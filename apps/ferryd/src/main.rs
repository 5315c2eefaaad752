//! fileferry server entry point.
//!
//! Usage: `ferryd [ROOT]`. The optional argument overrides the configured
//! root directory.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use fileferry_server::FileServer;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting fileferry server");

    let mut config = config::Config::load()?;
    if let Some(root) = std::env::args_os().nth(1) {
        config.root = PathBuf::from(root);
    }
    if !config.root.is_dir() {
        anyhow::bail!("root {} is not a directory", config.root.display());
    }
    tracing::info!(root = %config.root.display(), port = config.port, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))?;

    tracing::info!("server shut down cleanly");
    Ok(())
}

/// Serves until Ctrl-C.
async fn run(config: config::Config) -> anyhow::Result<()> {
    let server = FileServer::new(config.server_config());
    let runner = Arc::clone(&server);
    let mut serve = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("interrupt received, shutting down");
            server.shutdown();
            serve.await??;
        }
        result = &mut serve => {
            // The accept loop only returns on its own when binding fails.
            result??;
        }
    }
    Ok(())
}
