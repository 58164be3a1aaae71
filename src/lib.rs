//! # modserve
//!
//! A minimal concurrent static-content server with a hook-based extension
//! mechanism: dynamically loaded modules register callbacks that intercept
//! and transform served content at defined points in the request
//! lifecycle.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use modserve::config::Config;
//! use modserve::hooks::HookRegistry;
//! use modserve::mime::MediaTypes;
//! use modserve::modules::ModuleManager;
//! use modserve::server::{Server, ServerContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("./httpd.conf")?;
//!     let registry = Arc::new(HookRegistry::new());
//!     let media_types = Arc::new(MediaTypes::load("./mime.types")?);
//!
//!     let mut modules = ModuleManager::new(Arc::clone(&registry));
//!     if let Some(dir) = config.modules_dir() {
//!         modules.discover(&dir)?;
//!     }
//!
//!     let context = ServerContext::from_config(&config, registry, media_types)?;
//!     let server = Server::bind(&config.bind_addr()?).await?;
//!     let handle = server.start(context);
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     modules.shutdown_all();
//!     Ok(())
//! }
//! ```
//!
//! ## Extending the server
//!
//! A module implements [`modules::Module`], registers hook callbacks
//! during `initialize`, and is compiled as a `cdylib` exporting its
//! constructor via [`declare_module!`]. Binaries dropped into the
//! configured `ModulesDir` are discovered at startup.

pub mod config;
pub mod hooks;
pub mod http;
pub mod mime;
pub mod modules;
pub mod resolve;
pub mod server;

pub use config::Config;
pub use hooks::{HookCallback, HookRegistry};
pub use http::{Headers, Method, Request, StatusCode};
pub use mime::MediaTypes;
pub use modules::{Module, ModuleHost, ModuleManager};
pub use server::{Server, ServerContext, ServerError, ServerHandle};
