//! # HTTP Server
//!
//! HTTP/1 host for an [`Engine`], built on Hyper and Tokio.
//! Implements graceful shutdown with signal handling.
//!
//! ## Key Features
//!
//! - One task per connection, bodies read once under a size limit
//! - Graceful shutdown on Ctrl-C, draining open connections
//! - `x-request-id` assigned when the client sent none, echoed back
//! - [`Server::test_request`] runs the engine without the network stack

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::router::Method;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 10 << 20,
        }
    }
}

impl ServerConfig {
    /// Set the listen address
    #[must_use]
    pub const fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    /// Toggle keep-alive
    #[must_use]
    pub const fn with_keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Set the connection drain timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the request body limit
    #[must_use]
    pub const fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }
}

/// An HTTP response under construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
    /// Content type
    pub content_type: String,
    /// Response headers
    pub headers: HashMap<String, String>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            body: Bytes::new(),
            content_type: "text/plain; charset=utf-8".to_string(),
            headers: HashMap::new(),
        }
    }
}

impl Response {
    /// Create a JSON response
    #[must_use]
    pub fn json(body: impl Into<Bytes>) -> Self {
        let mut response = Self::default();
        response.set_body("application/json; charset=utf-8", body);
        response
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// 404 with a plain-text body
    #[must_use]
    pub fn not_found() -> Self {
        Self::text("404 page not found").with_status(404)
    }

    /// 500 without details
    #[must_use]
    pub fn internal_error() -> Self {
        Self::text("Internal Server Error").with_status(500)
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set or override a header
    pub fn set_header(&mut self, key: &str, value: &str) {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_string();
        } else {
            self.headers
                .insert(crate::values::canonical_header_key(key), value.to_string());
        }
    }

    /// Get a header by name (case-insensitive)
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        if key.eq_ignore_ascii_case("content-type") {
            return Some(&self.content_type);
        }
        self.headers
            .get(&crate::values::canonical_header_key(key))
            .map(String::as_str)
    }

    /// Replace body and content type
    pub fn set_body(&mut self, content_type: &str, body: impl Into<Bytes>) {
        self.content_type = content_type.to_string();
        self.body = body.into();
    }

    /// Convert to hyper Response
    fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = hyper::Response::new(Full::new(self.body));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        let pairs = std::iter::once(("Content-Type".to_string(), self.content_type)).chain(self.headers);
        for (k, v) in pairs {
            match (
                hyper::header::HeaderName::from_bytes(k.as_bytes()),
                hyper::header::HeaderValue::from_str(&v),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %k, "dropping invalid response header"),
            }
        }
        response
    }
}

/// HTTP server running an [`Engine`]
pub struct Server {
    config: ServerConfig,
    engine: Arc<Engine>,
}

impl Server {
    /// Create a server with default settings
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self::with_config(engine, ServerConfig::default())
    }

    /// Create a server
    #[must_use]
    pub fn with_config(engine: Engine, config: ServerConfig) -> Self {
        Self {
            config,
            engine: Arc::new(engine),
        }
    }

    /// Bind the server to an address
    #[must_use]
    pub const fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.address = addr;
        self
    }

    /// Settings
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The engine being served
    #[must_use]
    pub const fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Start the server with graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns `Error::Listen` if the address cannot be bound and
    /// `Error::Io` if accepting fails.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.address;
        let listen_err = |source| Error::Listen {
            address: addr.to_string(),
            source,
        };

        let socket = if addr.is_ipv4() {
            tokio::net::TcpSocket::new_v4()
        } else {
            tokio::net::TcpSocket::new_v6()
        }
        .map_err(listen_err)?;
        socket.set_reuseaddr(true).map_err(listen_err)?;
        #[cfg(not(windows))]
        {
            socket.set_reuseport(true).map_err(listen_err)?;
        }
        socket.bind(addr).map_err(listen_err)?;
        let listener = socket.listen(1024).map_err(listen_err)?;

        info!("Server listening on http://{}", addr);

        let active = Arc::new(AtomicUsize::new(0));
        let keep_alive = self.config.keep_alive;
        let max_body_size = self.config.max_body_size;

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);
                    let engine = Arc::clone(&self.engine);
                    let active = Arc::clone(&active);

                    tokio::task::spawn(async move {
                        active.fetch_add(1, Ordering::Relaxed);
                        let service = service_fn(move |req| {
                            let engine = Arc::clone(&engine);
                            async move {
                                Ok::<_, Infallible>(
                                    handle_request(req, &engine, remote_addr, max_body_size).await,
                                )
                            }
                        });
                        if let Err(err) = http1::Builder::new()
                            .keep_alive(keep_alive)
                            .serve_connection(io, service)
                            .await
                        {
                            error!("Error serving connection: {:?}", err);
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = shutdown_signal() => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout, drain)
            .await
            .is_err()
        {
            warn!(
                open = active.load(Ordering::Relaxed),
                "shutdown timeout reached with open connections"
            );
        }
        Ok(())
    }

    /// Execute a test request directly without network stack
    pub async fn test_request(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Response {
        let body = body.unwrap_or_default();
        if body.len() > self.config.max_body_size {
            return Response::text("Payload Too Large").with_status(413);
        }
        let request = headers
            .iter()
            .fold(Request::new(method, uri), |r, (k, v)| r.with_header(k, v))
            .with_body(body);
        process_request(&self.engine, request)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}

/// Core request processing logic (network agnostic)
fn process_request(engine: &Engine, mut request: Request) -> Response {
    let request_id = match request.header("x-request-id") {
        Some(id) => id.to_string(),
        None => {
            let id = generate_request_id();
            request.set_header("x-request-id", &id);
            id
        }
    };
    engine
        .dispatch(request)
        .with_header("x-request-id", &request_id)
}

async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    engine: &Engine,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let request = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(r) => r.with_remote_addr(remote_addr),
        Err(e @ Error::PayloadTooLarge { .. }) => {
            warn!(%remote_addr, error = %e, "rejecting request body");
            return Response::text("Payload Too Large").with_status(413).into_hyper();
        }
        Err(e) => {
            error!(%remote_addr, error = %e, "Failed to parse request");
            return Response::text("Bad Request").with_status(400).into_hyper();
        }
    };
    process_request(engine, request).into_hyper()
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

/// Install a JSON `tracing` subscriber filtered by `RUST_LOG`
///
/// Defaults to `bindery=info`. Does nothing if a subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bindery=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();
}
