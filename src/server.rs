//! HTTP server and graceful shutdown.
//!
//! # Dispatch
//!
//! A request path resolves to a route key: the path itself when registered,
//! else the longest registered mount (a key ending in `/`) that prefixes it.
//! Under that key the exact method wins, then the method-less slot. Failing
//! both, OPTIONS gets a synthesized preflight response and every other
//! method `405`. Unresolved paths get `404`.
//!
//! # Timeouts
//!
//! | Setting | Default | Effect |
//! |---|---|---|
//! | `read_timeout` | 5 s | HTTP/1 request headers must arrive within it |
//! | `write_timeout` | 90 s | a handler still running after it yields `503` |
//! | `idle_timeout` | 10 min | idle keep-alive connections are closed |
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Asking every open connection to finish its in-flight request and close.
//! 3. Returning from [`Server::serve`] once they have, which lets `main` exit.

use std::collections::HashSet;
use std::convert::Infallible;
use std::future::Future;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::method::MethodSlot;
use crate::options;
use crate::request::Request;
use crate::response::Response;
use crate::router::Shared;

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Connection timeouts. A zero duration selects the default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    fn normalized(self) -> Self {
        let or = |d: Duration, default: Duration| if d.is_zero() { default } else { d };
        Self {
            read_timeout: or(self.read_timeout, DEFAULT_READ_TIMEOUT),
            write_timeout: or(self.write_timeout, DEFAULT_WRITE_TIMEOUT),
            idle_timeout: or(self.idle_timeout, DEFAULT_IDLE_TIMEOUT),
        }
    }
}

/// Parses `host:port`, or `:port` meaning every interface.
pub(crate) fn parse_addr(addr: &str) -> Result<SocketAddr, Error> {
    let full = match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_owned(),
    };
    if let Ok(parsed) = full.parse() {
        return Ok(parsed);
    }
    full.to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| Error::InvalidAddress(addr.to_owned()))
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes requests over a frozen route table.
pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    paths: HashSet<String>,
    /// Mount keys, longest first.
    mounts: Vec<String>,
}

impl Dispatcher {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        let all = shared.table.get_all_paths();
        let mut mounts: Vec<String> = all.iter().filter(|p| p.ends_with('/')).cloned().collect();
        mounts.sort_by(|a, b| b.len().cmp(&a.len()));
        Self { shared, paths: all.into_iter().collect(), mounts }
    }

    pub(crate) fn route_count(&self) -> usize {
        self.paths.len()
    }

    fn resolve(&self, path: &str) -> Option<&str> {
        if let Some(route) = self.paths.get(path) {
            return Some(route.as_str());
        }
        self.mounts
            .iter()
            .find(|mount| path.starts_with(mount.as_str()))
            .map(String::as_str)
    }

    async fn dispatch(&self, req: Request) -> Response {
        let Some(route) = self.resolve(req.path()) else {
            debug!(method = %req.method(), path = req.path(), "no route");
            return Response::status(StatusCode::NOT_FOUND);
        };

        let table = &self.shared.table;
        let handler = table
            .get_handler(route, &MethodSlot::Exact(req.method().clone()))
            .or_else(|| table.get_handler(route, &MethodSlot::Any));
        if let Some(handler) = handler {
            return handler.call(req).await;
        }

        let methods = table.get_methods(route);
        if req.method() == Method::OPTIONS {
            options::preflight(&req, &methods, &table.allowed_headers(route))
        } else {
            debug!(method = %req.method(), route, "method not allowed");
            options::method_not_allowed(&methods)
        }
    }

    /// Dispatches `req`, answering `503` when the handler outlives `limit`.
    async fn dispatch_within(&self, req: Request, limit: Duration) -> Response {
        let method = req.method().clone();
        let path = req.path().to_owned();
        match tokio::time::timeout(limit, self.dispatch(req)).await {
            Ok(res) => res,
            Err(_) => {
                warn!(%method, path = %path, timeout_ms = limit.as_millis() as u64, "write timeout");
                Response::status(StatusCode::SERVICE_UNAVAILABLE)
            }
        }
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// The HTTP server built by [`RootRouter::build`](crate::RootRouter::build).
pub struct Server {
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
}

impl Server {
    pub(crate) fn new(addr: SocketAddr, dispatcher: Dispatcher, config: ServerConfig) -> Self {
        Self { addr, dispatcher: Arc::new(dispatcher), config: config.normalized() }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The effective configuration, defaults applied.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Dispatches one request in process, without a socket.
    pub async fn handle(&self, req: Request) -> Response {
        self.dispatcher.dispatch_within(req, self.config.write_timeout).await
    }

    /// Binds the configured address and serves until SIGTERM or Ctrl-C.
    ///
    /// Returns only after a full graceful shutdown.
    pub async fn serve(self) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serves connections from `listener` until `signal` resolves, then
    /// drains open connections.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, signal: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr()?;
        info!(addr = %local, "arbor listening");

        // Connections watch this to start their own graceful shutdown.
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Shutdown first: a signal stops accepting even with a backlog.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let config = self.config;
                    let shutdown_rx = shutdown_rx.clone();
                    tasks.spawn(serve_connection(stream, peer, dispatcher, config, shutdown_rx));
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        let _ = shutdown_tx.send(true);
        while tasks.join_next().await.is_some() {}

        info!("arbor stopped");
        Ok(())
    }
}

// ── Connections ───────────────────────────────────────────────────────────────

/// Request activity on one connection, for idle detection.
struct Activity {
    in_flight: AtomicUsize,
    last: Mutex<Instant>,
}

/// Marks a request in flight until dropped.
struct Busy<'a>(&'a Activity);

impl Activity {
    fn new() -> Self {
        Self { in_flight: AtomicUsize::new(0), last: Mutex::new(Instant::now()) }
    }

    fn begin(&self) -> Busy<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Busy(self)
    }

    /// Time left before the connection counts as idle.
    fn until_idle(&self, idle: Duration) -> Duration {
        if self.in_flight.load(Ordering::Acquire) > 0 {
            return idle;
        }
        idle.saturating_sub(self.last.lock().elapsed())
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        *self.0.last.lock() = Instant::now();
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let activity = Arc::new(Activity::new());

    let svc = {
        let activity = Arc::clone(&activity);
        service_fn(move |req: hyper::Request<Incoming>| {
            let dispatcher = Arc::clone(&dispatcher);
            let activity = Arc::clone(&activity);
            async move {
                let _busy = activity.begin();
                let res = respond(&dispatcher, req, config.write_timeout).await;
                Ok::<_, Infallible>(res.into_http())
            }
        })
    };

    // `auto::Builder` transparently handles both HTTP/1.1 and HTTP/2.
    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(config.read_timeout);

    let conn = builder.serve_connection(TokioIo::new(stream), svc);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        let idle_check = tokio::time::sleep(activity.until_idle(config.idle_timeout));
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    debug!(%peer, "connection error: {e}");
                }
                break;
            }
            _ = shutdown.changed(), if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
            () = idle_check, if !closing => {
                if activity.until_idle(config.idle_timeout).is_zero() {
                    debug!(%peer, "closing idle connection");
                    closing = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }
}

/// Buffers the body and dispatches one request.
async fn respond(
    dispatcher: &Dispatcher,
    req: hyper::Request<Incoming>,
    write_timeout: Duration,
) -> Response {
    let (parts, body) = req.into_parts();
    let body: Bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(path = parts.uri.path(), "reading request body: {e}");
            return Response::status(StatusCode::BAD_REQUEST);
        }
    };
    let req = Request::from(http::Request::from_parts(parts, body));
    dispatcher.dispatch_within(req, write_timeout).await
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// A signal that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` is a future that never resolves: on non-Unix platforms
    // the SIGTERM arm is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
