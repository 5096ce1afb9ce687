//! Unified error type.

/// Boxed error returned by documentation closures and other user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by arbor's fallible operations.
///
/// Routing outcomes (404, 405, synthesized OPTIONS) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// configuration mistakes made while wiring the router tree, and
/// infrastructure failures such as binding to a port.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("router config: path prefix required")]
    MissingPathPrefix,

    #[error("router config: missing generic-to-http conversion")]
    MissingConversion,

    #[error("doc config: {0} required")]
    MissingDocField(&'static str),

    /// A documentation closure failed. Registration of the endpoint was
    /// aborted; nothing was added to the route table.
    #[error("documenting {method} {path}: {source}")]
    Documentation {
        method: String,
        path: String,
        source: BoxError,
    },

    #[error("router is frozen: {method} {path} registered after the server was built")]
    Frozen { method: String, path: String },

    #[error("server already built from this router")]
    AlreadyBuilt,

    #[error("invalid listen address `{0}`")]
    InvalidAddress(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
