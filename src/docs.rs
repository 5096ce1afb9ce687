//! Incremental OpenAPI assembly.
//!
//! Every documented endpoint contributes one operation while it is being
//! registered, so the document is complete as soon as the router tree is.

use http::Method;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::debug;

use crate::error::{BoxError, Error};
use crate::openapi::{Document, Info, OPENAPI_VERSION, Operation, PathItem, Tag};

/// Produces the operation descriptor of one endpoint.
///
/// Called once, at registration time. An `Err` aborts startup.
pub type DocFn = Box<dyn FnOnce() -> Result<Operation, BoxError> + Send>;

/// Wraps a documentation closure for [`Router::endpoint`](crate::Router::endpoint).
///
/// ```rust
/// use arbor::{describe, openapi::Operation};
///
/// let doc = describe(|| Ok(Operation::new().summary("List users").response(200, "ok")));
/// assert!(doc.is_some());
/// ```
pub fn describe<F>(f: F) -> Option<DocFn>
where
    F: FnOnce() -> Result<Operation, BoxError> + Send + 'static,
{
    Some(Box::new(f))
}

/// Top-level document metadata, fixed at root construction.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct DocConfig {
    pub service_name: String,
    pub description: String,
    pub version: String,
    pub tags: Vec<Tag>,
}

impl DocConfig {
    pub fn new(
        service_name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            description: description.into(),
            version: version.into(),
            tags: Vec::new(),
        }
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.service_name.is_empty() {
            return Err(Error::MissingDocField("service name"));
        }
        if self.description.is_empty() {
            return Err(Error::MissingDocField("description"));
        }
        if self.version.is_empty() {
            return Err(Error::MissingDocField("version"));
        }
        Ok(())
    }
}

/// Accumulates operations into one document keyed by path and method.
pub(crate) struct DocAggregator {
    doc: RwLock<Document>,
}

impl DocAggregator {
    pub(crate) fn new(config: DocConfig) -> Self {
        let doc = Document {
            openapi: OPENAPI_VERSION.to_owned(),
            info: Info {
                title: config.service_name,
                description: config.description,
                version: config.version,
            },
            tags: config.tags,
            paths: Default::default(),
        };
        Self { doc: RwLock::new(doc) }
    }

    /// Sets the operation for `(path, method)`. Methods without an OpenAPI
    /// slot are ignored and `false` is returned; the route itself is
    /// unaffected.
    pub(crate) fn merge(&self, path: &str, method: &Method, op: Operation) -> bool {
        let mut doc = self.doc.write();
        let item = doc.paths.entry(path.to_owned()).or_default();
        let merged = item.set(method, op);
        if !merged {
            debug!(%method, path, "method has no openapi slot, documentation skipped");
            if *item == PathItem::default() {
                doc.paths.remove(path);
            }
        }
        merged
    }

    pub(crate) fn document(&self) -> Document {
        self.doc.read().clone()
    }
}
