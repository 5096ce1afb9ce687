use http::{HeaderName, HeaderValue};

use super::{Middleware, around};
use crate::request::Request;

/// Trims surrounding whitespace from every query-string value and every
/// header value before the request reaches the endpoint.
pub fn trim_spaces() -> Middleware {
    around(|mut req, next| async move {
        trim_query(&mut req);
        trim_headers(&mut req);
        next.call(req).await
    })
}

fn trim_query(req: &mut Request) {
    let pairs = req.query_pairs();
    if pairs.iter().all(|(_, v)| v.trim() == v) {
        return;
    }
    req.set_query(pairs.iter().map(|(k, v)| (k.as_str(), v.trim())));
}

fn trim_headers(req: &mut Request) {
    let untrimmed = req
        .headers()
        .values()
        .any(|v| v.to_str().is_ok_and(|s| s.trim() != s));
    if !untrimmed {
        return;
    }

    let trimmed: Vec<(HeaderName, HeaderValue)> = req
        .headers()
        .iter()
        .map(|(name, value)| (name.clone(), trim_value(value)))
        .collect();
    let headers = req.headers_mut();
    headers.clear();
    for (name, value) in trimmed {
        headers.append(name, value);
    }
}

fn trim_value(value: &HeaderValue) -> HeaderValue {
    match value.to_str() {
        Ok(s) if s.trim() != s => HeaderValue::from_str(s.trim()).unwrap_or_else(|_| value.clone()),
        _ => value.clone(),
    }
}
