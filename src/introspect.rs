//! Built-in service endpoints.
//!
//! | Handler | Suggested path | Answers |
//! |---|---|---|
//! | [`status`] | `/status` | Is the process alive? Empty success envelope. |
//! | [`routes`] | `/routes` | Every path with its methods. |
//! | [`openapi`] | `/openapi.json` | The OpenAPI document, as raw JSON. |
//!
//! Register them on your router:
//!
//! ```rust
//! use arbor::envelope;
//! use arbor::{Config, DocConfig, Method, RootRouter, introspect};
//!
//! # fn main() -> Result<(), arbor::Error> {
//! let root = RootRouter::new(
//!     Config::new("/").generic_to_http(envelope::to_http),
//!     DocConfig::new("svc", "example", "0.1.0"),
//! )?;
//! root.endpoint("/status", Method::GET, introspect::status(), None)?;
//! root.endpoint("/routes", Method::GET, introspect::routes(root.registry()), None)?;
//! root.handle("/openapi.json", introspect::openapi(root.registry()))?;
//! # Ok(())
//! # }
//! ```

use http::StatusCode;
use tracing::error;

use crate::envelope::{self, EnvelopeHandler, Reply};
use crate::handler::Handler;
use crate::request::Request;
use crate::response::Response;
use crate::router::Registry;

/// Liveness handler.
///
/// Always `200 OK` with `{"success":true}`. If the process can respond to
/// HTTP at all, it is alive, so this handler has no dependencies.
pub fn status() -> EnvelopeHandler {
    envelope::handler(|_req| async { Ok(Reply::default()) })
}

/// Lists every registered path with its sorted methods; `*` marks a mount.
pub fn routes(registry: Registry) -> EnvelopeHandler {
    envelope::handler(move |_req| {
        let routes = registry.list_routes();
        async move { Reply::json(&routes) }
    })
}

/// Serves the OpenAPI document as it stands at request time.
pub fn openapi(registry: Registry) -> impl Handler {
    move |_req: Request| {
        let doc = registry.openapi();
        async move {
            match serde_json::to_vec(&doc) {
                Ok(body) => Response::json(body),
                Err(e) => {
                    error!("encoding openapi document: {e}");
                    Response::status(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        }
    }
}
