//! # arbor
//!
//! A composable HTTP routing layer for Rust services: a tree of routers
//! sharing one route table, ordered middleware stacking across nesting
//! levels, CORS preflight answered from what is registered, and an OpenAPI
//! document assembled endpoint by endpoint.
//!
//! ## The contract
//!
//! Business handlers have whatever shape the application picks, the type
//! parameter `T` of [`Router<T>`]. A conversion function turns a `T` into a
//! protocol handler. [`envelope`] ships one such shape with its conversion,
//! rendering `{"success":…,"data":…,"error":…,"meta":…}` JSON.
//!
//! Every endpoint is wired once, at registration:
//!
//! ```text
//! stats hook                          ← outermost, sees method + full path
//!   protocol middleware (root first)  ← trim_spaces, log_headers_and_params, yours…
//!     conversion                      ← T → protocol handler
//!       generic middleware (root first)
//!         business handler
//! ```
//!
//! What arbor does not do: path parameters (paths are exact keys, plus
//! subtree mounts ending in `/`), body validation, TLS.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use arbor::envelope::{self, Failure, Reply};
//! use arbor::{Config, DocConfig, Method, Request, RootRouter, describe, introspect};
//! use arbor::openapi::Operation;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), arbor::Error> {
//!     let root = RootRouter::new(
//!         Config::new("/").generic_to_http(envelope::to_http),
//!         DocConfig::new("users", "User directory", "1.0.0"),
//!     )?;
//!     root.endpoint("/status", Method::GET, introspect::status(), None)?;
//!
//!     let api = root.subrouter(Config::new("/api").allow_header("X-Tenant"));
//!     api.endpoint(
//!         "/users",
//!         Method::POST,
//!         envelope::handler(create_user),
//!         describe(|| Ok(Operation::new().summary("Create a user").response(200, "created"))),
//!     )?;
//!
//!     root.build(":3000", None)?.serve().await
//! }
//!
//! async fn create_user(req: Request) -> Result<Reply, Failure> {
//!     if req.body().is_empty() {
//!         return Err(Failure::bad_request("empty body"));
//!     }
//!     Ok(Reply::ok(serde_json::json!({"id": 99})))
//! }
//! ```

mod docs;
mod error;
mod handler;
mod method;
mod options;
mod request;
mod response;
mod router;
mod server;
mod table;

pub mod envelope;
pub mod introspect;
pub mod middleware;
pub mod openapi;
pub mod path;

pub use docs::{DocConfig, DocFn, describe};
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, boxed};
pub use http::{Method, StatusCode};
pub use method::MethodSlot;
pub use options::{DEFAULT_ALLOWED_HEADERS, MAX_AGE_SECS, allow_list, allowed_headers};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{Config, Conversion, Registry, RootRouter, Router};
pub use server::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT, Server, ServerConfig,
};
