//! Incoming HTTP request type.

use bytes::Bytes;
use http::uri::PathAndQuery;
use http::{Extensions, HeaderMap, Method, Uri};
use url::form_urlencoded;

/// An incoming HTTP request with its body fully buffered.
///
/// Middleware receives the request by value and may rewrite headers, the
/// query string, or attach typed data through [`extensions_mut`](Self::extensions_mut)
/// before passing it on.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    extensions: Extensions,
}

impl Request {
    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Case-insensitive header lookup. Returns the first value, if it is
    /// valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decoded query-string pairs, in order of appearance.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query()
            .map(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replaces the query string with the url-encoded `pairs`.
    ///
    /// The path is left untouched. An empty `pairs` removes the query.
    pub fn set_query<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        let path_and_query = if query.is_empty() {
            self.path().to_owned()
        } else {
            format!("{}?{query}", self.path())
        };

        let mut parts = self.uri.clone().into_parts();
        parts.path_and_query = match PathAndQuery::try_from(path_and_query) {
            Ok(pq) => Some(pq),
            Err(_) => return,
        };
        if let Ok(uri) = Uri::from_parts(parts) {
            self.uri = uri;
        }
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            extensions: parts.extensions,
        }
    }
}
