//! Route path normalization.

/// Joins a prefix and a sub-path into one normalized route key.
///
/// Empty and `.` segments are dropped, `..` removes the previous segment, and
/// the result always starts with `/`. A trailing `/` is dropped, so the key
/// names exactly one path. Router prefixes and endpoints use this form.
///
/// ```text
/// join("/api/", "/protected")  → "/api/protected"
/// join("/", "")                → "/"
/// join("/api", "users/")       → "/api/users"
/// ```
pub fn join(prefix: &str, sub: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + sub.len() + 1);
    for segment in segments(prefix, sub) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Like [`join`], but a trailing `/` on `sub` survives and marks the result
/// as a subtree mount. Only raw handlers are mounted this way.
///
/// ```text
/// join_mount("/assets", "img/")  → "/assets/img/"
/// join_mount("/assets", "img")   → "/assets/img"
/// ```
pub fn join_mount(prefix: &str, sub: &str) -> String {
    let mut out = join(prefix, sub);
    if sub.ends_with('/') && !out.ends_with('/') {
        out.push('/');
    }
    out
}

fn segments<'a>(prefix: &'a str, sub: &'a str) -> Vec<&'a str> {
    let mut segments = Vec::new();
    for segment in prefix.split('/').chain(sub.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments
}
