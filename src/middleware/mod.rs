//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns: structured tracing, authentication-header
//! inspection, request normalization.
//!
//! A [`Middleware`] is a transform from one protocol handler to another. A
//! router node applies its list in reverse declared order, so the
//! first-declared middleware ends up outermost and runs first.
//!
//! ```rust
//! use arbor::{middleware, Response, StatusCode};
//!
//! let require_key = middleware::around(|req, next| async move {
//!     if req.header("x-api-key").is_none() {
//!         return Response::status(StatusCode::UNAUTHORIZED);
//!     }
//!     next.call(req).await
//! });
//! # let _ = require_key;
//! ```
//!
//! Built-in middleware:
//! - [`trim_spaces`] and [`log_headers_and_params`]: installed on every root
//!   router, ahead of the application's own middleware
//! - [`trace::stats`]: per-request event with method, route, status, latency

mod fields;
mod trim;
pub mod trace;

use std::future::Future;
use std::sync::Arc;

use http::Method;

use crate::handler::{self, BoxedHandler};
use crate::request::Request;
use crate::response::Response;

pub use fields::{RequestFields, log_headers_and_params};
pub use trim::trim_spaces;

/// A transform from protocol handler to protocol handler.
pub type Middleware = Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync>;

/// A transform over the pre-conversion handler shape `T`.
pub type GenericMiddleware<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Wraps a fully wired endpoint, outside every middleware. Receives the
/// endpoint's method and full path.
pub type StatsHook = Arc<dyn Fn(BoxedHandler, &Method, &str) -> BoxedHandler + Send + Sync>;

/// Builds a [`Middleware`] from a handler transform.
pub fn from_fn<F>(f: F) -> Middleware
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Builds a [`Middleware`] from an async function of the request and the
/// wrapped handler. The function must call `next.call(req)` unless it
/// short-circuits with its own response.
pub fn around<F, Fut>(f: F) -> Middleware
where
    F: Fn(Request, BoxedHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |next: BoxedHandler| {
        let f = Arc::clone(&f);
        handler::boxed(move |req: Request| (*f)(req, Arc::clone(&next)))
    })
}

/// Builds a [`StatsHook`].
pub fn stats_hook<F>(f: F) -> StatsHook
where
    F: Fn(BoxedHandler, &Method, &str) -> BoxedHandler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The middleware every root router starts with, in order.
pub fn defaults() -> Vec<Middleware> {
    vec![trim_spaces(), log_headers_and_params()]
}

/// Applies `middleware` so the first element runs first.
pub(crate) fn apply(handler: BoxedHandler, middleware: &[Middleware]) -> BoxedHandler {
    middleware.iter().rev().fold(handler, |next, m| m(next))
}
