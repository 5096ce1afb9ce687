use std::collections::BTreeMap;

use tracing::debug;

use super::{Middleware, around};
use crate::request::Request;

/// Header name prefixes left out of [`RequestFields`]: transport, caching and
/// credential headers carry no diagnostic value or must not be logged.
const IGNORED_HEADER_PREFIXES: &[&str] = &[
    "accept",
    "authorization",
    "cache-",
    "connection",
    "content-",
    "proto",
    "sec-",
    "x-forwarded-",
    "x-real-ip",
];

/// Diagnostic view of a request, attached to its extensions by
/// [`log_headers_and_params`]. Repeated identical values are collapsed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestFields {
    pub headers: BTreeMap<String, Vec<String>>,
    pub parameters: BTreeMap<String, Vec<String>>,
}

impl RequestFields {
    pub fn from_request(req: &Request) -> Self {
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in req.headers() {
            let name = name.as_str();
            if IGNORED_HEADER_PREFIXES.iter().any(|p| name.starts_with(p)) {
                continue;
            }
            if let Ok(value) = value.to_str() {
                push_unique(headers.entry(name.to_owned()).or_default(), value);
            }
        }

        let mut parameters: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in req.query_pairs() {
            push_unique(parameters.entry(key).or_default(), &value);
        }

        Self { headers, parameters }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.parameters.is_empty()
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_owned());
    }
}

/// Records the request's diagnostic headers and query parameters as a
/// [`RequestFields`] extension and a `debug` event.
pub fn log_headers_and_params() -> Middleware {
    around(|mut req, next| async move {
        let fields = RequestFields::from_request(&req);
        if !fields.is_empty() {
            debug!(
                path = req.path(),
                headers = ?fields.headers,
                parameters = ?fields.parameters,
                "request fields"
            );
            req.extensions_mut().insert(fields);
        }
        next.call(req).await
    })
}
