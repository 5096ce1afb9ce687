//! The JSON envelope handler shape.
//!
//! Business handlers return an [`Outcome`]: data, optional metadata and a
//! status on success, or a [`Failure`] carrying the status and a message.
//! [`to_http`] is the conversion a router uses to turn such a handler into a
//! protocol handler. Every response body has the same shape:
//!
//! ```text
//! {"success":true,"data":…,"meta":…}
//! {"success":false,"error":{"message":"…"}}
//! ```
//!
//! Absent `data` and `meta` are omitted. A request carrying `Indent: true`
//! gets the body tab-indented.
//!
//! ```rust
//! use arbor::envelope::{self, Reply};
//! use serde_json::json;
//!
//! let list_users = envelope::handler(|_req| async {
//!     Ok(Reply::ok(json!([{"id": 1}])).with_meta(json!({"total": 1})))
//! });
//! let protocol = envelope::to_http(list_users);
//! # let _ = protocol;
//! ```

use std::future::Future;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::{debug, error};

use crate::handler::{self, BoxFuture, BoxedHandler};
use crate::request::Request;
use crate::response::Response;

/// Successful result of a business handler.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    data: Option<Value>,
    meta: Option<Value>,
    status: StatusCode,
}

impl Reply {
    /// `200 OK` with `data`.
    pub fn ok(data: impl Into<Value>) -> Self {
        Self { data: Some(data.into()), meta: None, status: StatusCode::OK }
    }

    /// A reply with no data.
    pub fn new(status: StatusCode) -> Self {
        Self { data: None, meta: None, status }
    }

    /// Serializes `data` into a `200 OK` reply.
    pub fn json<S: Serialize + ?Sized>(data: &S) -> Result<Self, Failure> {
        let data = serde_json::to_value(data)
            .map_err(|e| Failure::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        Ok(Self::ok(data))
    }

    pub fn with_meta(mut self, meta: impl Into<Value>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn data(&self) -> Option<&Value> { self.data.as_ref() }
    pub fn meta(&self) -> Option<&Value> { self.meta.as_ref() }
}

impl Default for Reply {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

/// Failed result of a business handler. The message is sent to the client.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{status}: {message}")]
pub struct Failure {
    pub status: StatusCode,
    pub message: String,
}

impl Failure {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

pub type Outcome = Result<Reply, Failure>;

/// The pre-conversion handler shape routed by `Router<EnvelopeHandler>`.
pub type EnvelopeHandler = Arc<dyn Fn(Request) -> BoxFuture<Outcome> + Send + Sync>;

/// Wraps an async function into an [`EnvelopeHandler`].
pub fn handler<F, Fut>(f: F) -> EnvelopeHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    Arc::new(move |req: Request| -> BoxFuture<Outcome> { Box::pin(f(req)) })
}

/// Generic middleware over [`EnvelopeHandler`], built from an async function
/// of the request and the wrapped handler.
///
/// ```rust
/// use arbor::envelope::{self, Failure};
/// use arbor::Config;
///
/// let require_tenant = envelope::around(|req, next| async move {
///     if req.header("x-tenant").is_none() {
///         return Err(Failure::bad_request("missing tenant"));
///     }
///     next(req).await
/// });
/// let config = Config::new("/tenants").generic_middleware(require_tenant);
/// # let _ = config;
/// ```
pub fn around<F, Fut>(f: F) -> impl Fn(EnvelopeHandler) -> EnvelopeHandler + Send + Sync + 'static
where
    F: Fn(Request, EnvelopeHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    let f = Arc::new(f);
    move |next: EnvelopeHandler| {
        let f = Arc::clone(&f);
        let wrapped: EnvelopeHandler = Arc::new(move |req: Request| -> BoxFuture<Outcome> {
            Box::pin((*f)(req, Arc::clone(&next)))
        });
        wrapped
    }
}

/// Converts an [`EnvelopeHandler`] into a protocol handler rendering the
/// JSON envelope.
pub fn to_http(inner: EnvelopeHandler) -> BoxedHandler {
    handler::boxed(move |req: Request| {
        let pretty = wants_indent(&req);
        let path = req.path().to_owned();
        let outcome = inner(req);
        async move {
            let outcome = outcome.await;
            if let Err(failure) = &outcome {
                if failure.status.is_server_error() {
                    error!(path = %path, status = failure.status.as_u16(), message = %failure.message, "handler failed");
                } else {
                    debug!(path = %path, status = failure.status.as_u16(), message = %failure.message, "handler failed");
                }
            }
            render(outcome, pretty)
        }
    })
}

#[derive(Serialize)]
struct Envelope<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<&'a Value>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
}

fn render(outcome: Outcome, pretty: bool) -> Response {
    let (status, envelope) = match &outcome {
        Ok(reply) => (
            reply.status,
            Envelope { success: true, data: reply.data.as_ref(), error: None, meta: reply.meta.as_ref() },
        ),
        Err(failure) => (
            failure.status,
            Envelope {
                success: false,
                data: None,
                error: Some(ErrorBody { message: &failure.message }),
                meta: None,
            },
        ),
    };

    match encode(&envelope, pretty) {
        Ok(body) => Response::builder().status(status).json(body),
        Err(e) => {
            error!("encoding response envelope: {e}");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn encode(envelope: &Envelope<'_>, pretty: bool) -> serde_json::Result<Vec<u8>> {
    if !pretty {
        return serde_json::to_vec(envelope);
    }
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"\t"));
    envelope.serialize(&mut ser)?;
    Ok(buf)
}

fn wants_indent(req: &Request) -> bool {
    matches!(req.header("indent"), Some("1" | "t" | "T" | "true" | "TRUE" | "True"))
}
