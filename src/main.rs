//! The modserve server binary.
//!
//! Loads configuration and the media-type table, discovers modules, and
//! serves until interrupted.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use modserve::config::Config;
use modserve::hooks::HookRegistry;
use modserve::mime::MediaTypes;
use modserve::modules::ModuleManager;
use modserve::server::{Server, ServerContext};

#[derive(Parser, Debug)]
#[command(name = "modserve", version, about = "Hook-extensible static-content server")]
struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = "./httpd.conf")]
    config: PathBuf,

    /// Path to the media-type table.
    #[arg(long, default_value = "./mime.types")]
    mime_types: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let media_types = match MediaTypes::load(&args.mime_types) {
        Ok(types) => types,
        Err(e) => {
            warn!(error = %e, "serving without a media-type table");
            MediaTypes::new()
        }
    };

    let registry = Arc::new(HookRegistry::new());
    let mut modules = ModuleManager::new(Arc::clone(&registry));
    if let Some(dir) = config.modules_dir() {
        modules.discover(&dir)?;
    }

    let context = ServerContext::from_config(&config, registry, Arc::new(media_types))?;
    let server = Server::bind(&config.bind_addr()?).await?;
    let handle = server.start(context);

    tokio::signal::ctrl_c().await?;
    info!("interrupt received; shutting down");
    handle.shutdown().await;
    modules.shutdown_all();
    Ok(())
}
