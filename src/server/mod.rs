//! The accept loop and per-connection request pipeline.
//!
//! One task runs the accept loop; every accepted connection is handled on
//! its own task, gated by a semaphore so load cannot spawn unbounded work.
//! An atomic in-flight counter backs graceful shutdown: stopping the
//! server stops accepting, then waits until every handler has finished
//! writing its response.
//!
//! Per connection the pipeline is: read until the header block terminator,
//! parse, dispatch `start.request`, resolve the target against the
//! document root, read file bytes, dispatch `request.rawfile.process`,
//! emit the response, close. Connections are never kept alive.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigError};
use crate::hooks::{HookRegistry, HOOK_RAWFILE_PROCESS, HOOK_START_REQUEST};
use crate::http::{Method, Request, ResponseWriter, StatusCode};
use crate::mime::MediaTypes;
use crate::resolve::{self, Resolved};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a request header block before the connection is dropped.
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Admission limit: connections handled concurrently before accept pauses.
const MAX_CONNECTIONS: usize = 256;

/// Fixed body for the internal-error response.
const INTERNAL_ERROR_BODY: &[u8] = b"Internal Server Error\n";

/// Everything a connection handler needs to serve a request.
///
/// Built once at startup and shared read-only across all connections; the
/// hook registry carries its own interior locking.
pub struct ServerContext {
    /// Directory request paths are resolved under.
    pub document_root: PathBuf,
    /// Directory-index candidate filenames, tried in order.
    pub index_candidates: Vec<String>,
    /// Value of the `Server` response header and the listing footer.
    pub server_name: String,
    /// Port named in the listing footer.
    pub port: u16,
    /// Shared hook registry, populated during module discovery.
    pub registry: Arc<HookRegistry>,
    /// Extension → media-type table.
    pub media_types: Arc<MediaTypes>,
}

impl ServerContext {
    /// Builds a context from loaded configuration directives.
    pub fn from_config(
        config: &Config,
        registry: Arc<HookRegistry>,
        media_types: Arc<MediaTypes>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            document_root: config.document_root(),
            index_candidates: config.index_candidates(),
            server_name: config.server_name().to_owned(),
            port: config.port()?,
            registry,
            media_types,
        })
    }
}

/// The modserve server.
///
/// Binds a TCP address, then serves GET requests for static content with
/// hook dispatch at the defined lifecycle points.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use modserve::config::Config;
/// use modserve::hooks::HookRegistry;
/// use modserve::mime::MediaTypes;
/// use modserve::server::{Server, ServerContext};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::parse("DocumentRoot ./site\nPort 8080\n");
///     let registry = Arc::new(HookRegistry::new());
///     let media_types = Arc::new(MediaTypes::new());
///     let context = ServerContext::from_config(&config, registry, media_types)?;
///
///     let server = Server::bind(&config.bind_addr()?).await?;
///     let handle = server.start(context);
///     tokio::signal::ctrl_c().await?;
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions). This is fatal
    /// at startup: the server never proceeds to accept connections.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts the accept loop on its own task and returns a handle used to
    /// shut the server down gracefully.
    pub fn start(self, context: ServerContext) -> ServerHandle {
        let context = Arc::new(context);
        let shutdown = Arc::new(Notify::new());
        let drained = Arc::new(Notify::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(MAX_CONNECTIONS));

        let accept_task = tokio::spawn(accept_loop(
            self.listener,
            self.local_addr,
            context,
            Arc::clone(&shutdown),
            Arc::clone(&drained),
            Arc::clone(&in_flight),
            semaphore,
        ));

        ServerHandle {
            shutdown,
            drained,
            in_flight,
            accept_task,
        }
    }
}

/// Controls a running server.
pub struct ServerHandle {
    shutdown: Arc<Notify>,
    drained: Arc<Notify>,
    in_flight: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Returns the number of connections currently being handled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stops accepting new connections, then waits until every in-flight
    /// handler has finished writing its response before returning.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        let _ = self.accept_task.await;

        // notify_one stores a permit, so a handler finishing between the
        // check and the await is never missed.
        while self.in_flight.load(Ordering::Acquire) != 0 {
            self.drained.notified().await;
        }
        info!("all connections drained; shutdown complete");
    }
}

#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    listener: TcpListener,
    local_addr: SocketAddr,
    context: Arc<ServerContext>,
    shutdown: Arc<Notify>,
    drained: Arc<Notify>,
    in_flight: Arc<AtomicUsize>,
    semaphore: Arc<Semaphore>,
) {
    info!(address = %local_addr, "modserve listening");

    loop {
        // Admission limit: hold accept until a connection slot frees up.
        let permit = tokio::select! {
            _ = shutdown.notified() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (stream, peer_addr) = tokio::select! {
            _ = shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            },
        };

        debug!(peer = %peer_addr, "connection accepted");
        in_flight.fetch_add(1, Ordering::AcqRel);

        let context = Arc::clone(&context);
        let in_flight = Arc::clone(&in_flight);
        let drained = Arc::clone(&drained);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, &context).await {
                warn!(peer = %peer_addr, error = %e, "connection closed with error");
            }
            drop(permit);
            if in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                drained.notify_one();
            }
        });
    }

    debug!("accept loop stopped");
}

/// Handles a single connection over its lifetime.
///
/// Read failures and early disconnects are recovered locally: the
/// connection is dropped and no response is attempted.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    context: &ServerContext,
) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;
        if bytes_read == 0 {
            debug!(peer = %peer_addr, "peer disconnected before header block completed");
            return Ok(());
        }
        if crate::http::request::header_block_complete(&buf) {
            break;
        }
        if buf.len() > MAX_HEADER_BYTES {
            warn!(peer = %peer_addr, "header block too large; closing connection");
            return Ok(());
        }
    }

    let mut request = Request::parse(&buf);

    // The request-rewriting seam: fired before any filesystem access.
    context.registry.invoke(HOOK_START_REQUEST, &mut request);

    let mut writer = ResponseWriter::new(&mut stream, &context.server_name);

    match request.method().cloned() {
        Some(Method::Get) => serve_get(&mut writer, &mut request, context).await,
        method => {
            warn!(peer = %peer_addr, ?method, "unsupported method");
            writer
                .send_head(StatusCode::INTERNAL_SERVER_ERROR, None, Some("text/plain"))
                .await?;
            writer.send_body(INTERNAL_ERROR_BODY).await
        }
    }
}

async fn serve_get<W: AsyncWrite + Unpin>(
    writer: &mut ResponseWriter<'_, W>,
    request: &mut Request,
    context: &ServerContext,
) -> io::Result<()> {
    let decoded = resolve::decode(request.target());
    debug!(target = %decoded, "resolving request path");

    match resolve::resolve(&context.document_root, &decoded, &context.index_candidates).await {
        Resolved::File(path) => {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => Bytes::from(bytes),
                Err(e) => {
                    // A file that resolved but cannot be fully read is a
                    // per-request failure, not a handler crash.
                    warn!(path = %path.display(), error = %e, "failed to read resolved file");
                    writer
                        .send_head(StatusCode::INTERNAL_SERVER_ERROR, None, Some("text/plain"))
                        .await?;
                    return writer.send_body(INTERNAL_ERROR_BODY).await;
                }
            };

            request.set_content(bytes);
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            request.set_media_type(context.media_types.lookup(extension));

            context.registry.invoke(HOOK_RAWFILE_PROCESS, request);

            if request.is_transformed() {
                let status = request.status().unwrap_or(StatusCode::OK);
                let body = request.finalized().clone();
                writer
                    .send_head(status, Some(body.len()), request.media_type())
                    .await?;
                writer.send_body(&body).await
            } else {
                // Untransformed requests serve the raw bytes with a plain
                // 200, regardless of any status a hook may have set.
                let body = request.raw().clone();
                writer
                    .send_head(StatusCode::OK, Some(body.len()), request.media_type())
                    .await?;
                writer.send_body(&body).await
            }
        }
        Resolved::Directory(dir) => {
            let html = resolve::listing(
                &context.document_root,
                &dir,
                &decoded,
                &context.server_name,
                context.port,
            )
            .await?;
            writer
                .send_head(StatusCode::OK, None, Some("text/html"))
                .await?;
            writer.send_body(html.as_bytes()).await
        }
        Resolved::NotFound => {
            let body = format!(
                "<h1>Not found</h1><p>The request {decoded} was not found on this server.</p>\n"
            );
            writer
                .send_head(StatusCode::NOT_FOUND, None, Some("text/html"))
                .await?;
            writer.send_body(body.as_bytes()).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_reports_unusable_address() {
        let result = Server::bind("256.256.256.256:0").await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn bind_ephemeral_port() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }
}
