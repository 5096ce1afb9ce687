//! Per-request statistics.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use super::{StatsHook, stats_hook};
use crate::handler::{self, BoxedHandler};
use crate::request::Request;

/// A [`StatsHook`] emitting one `info` event per request with the method,
/// the registered route, the response status and the elapsed time.
///
/// ```rust
/// use arbor::{Config, middleware};
/// # use arbor::envelope::EnvelopeHandler;
///
/// let config: Config<EnvelopeHandler> = Config::new("/api").stats(middleware::trace::stats());
/// # let _ = config;
/// ```
pub fn stats() -> StatsHook {
    stats_hook(|next: BoxedHandler, method, route| {
        let method = method.clone();
        let route: Arc<str> = Arc::from(route);
        handler::boxed(move |req: Request| {
            let next = Arc::clone(&next);
            let method = method.clone();
            let route = Arc::clone(&route);
            async move {
                let started = Instant::now();
                let res = next.call(req).await;
                info!(
                    %method,
                    route = &*route,
                    status = res.status_code().as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request"
                );
                res
            }
        })
    })
}
