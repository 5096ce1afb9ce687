//! CORS preflight and `405` responses derived from the route table.
//!
//! Applications never register OPTIONS handlers themselves: when a request
//! finds no handler for its method, the registered methods at that path are
//! enough to answer it.

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ALLOW, CONTENT_TYPE, ORIGIN,
};
use http::{Method, StatusCode};

use crate::request::Request;
use crate::response::Response;

/// Headers every preflight response allows.
pub const DEFAULT_ALLOWED_HEADERS: &[&str] = &[
    "Content-Type",
    "Cache-Control",
    "Authorization",
    "X-Amz-Date",
    "X-Api-Key",
    "X-Amz-Security-Token",
    "X-Requested-With",
];

/// `Access-Control-Max-Age`, in seconds.
pub const MAX_AGE_SECS: u64 = 600;

/// The registered methods plus OPTIONS, sorted and comma-joined.
pub fn allow_list(methods: &[Method]) -> String {
    let mut names: Vec<&str> = methods.iter().map(Method::as_str).collect();
    names.push(Method::OPTIONS.as_str());
    names.sort_unstable();
    names.dedup();
    names.join(",")
}

/// The default allowed headers followed by `extra`, skipping any extra
/// header already present.
pub fn allowed_headers(extra: &[String]) -> String {
    let mut headers: Vec<&str> = DEFAULT_ALLOWED_HEADERS.to_vec();
    for header in extra {
        if !headers.iter().any(|h| h.eq_ignore_ascii_case(header)) {
            headers.push(header);
        }
    }
    headers.join(",")
}

/// Answers an OPTIONS request for a path with the given registered methods
/// and extra allowed headers.
pub(crate) fn preflight(req: &Request, methods: &[Method], extra_headers: &[String]) -> Response {
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("*");
    let allow = allow_list(methods);

    Response::builder()
        .status(StatusCode::OK)
        .header(ACCESS_CONTROL_ALLOW_HEADERS, allowed_headers(extra_headers))
        .header(ACCESS_CONTROL_ALLOW_METHODS, allow.as_str())
        .header(ALLOW, allow.as_str())
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, origin)
        .header(ACCESS_CONTROL_ALLOW_CREDENTIALS, "true")
        .header(CONTENT_TYPE, "application/json")
        .header(ACCESS_CONTROL_MAX_AGE, MAX_AGE_SECS.to_string())
        .no_body()
}

/// `405 Method Not Allowed`, advertising what the path does accept.
pub(crate) fn method_not_allowed(methods: &[Method]) -> Response {
    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header(ALLOW, allow_list(methods))
        .no_body()
}
