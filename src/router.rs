//! Router tree.
//!
//! A [`RootRouter`] owns the route table and the OpenAPI document. Every
//! [`Router`] derived from it with [`Router::subrouter`] shares both and
//! carries its own copy of the configuration accumulated along the way:
//! path prefix, middleware of both tiers, default documentation parameters
//! and extra OPTIONS headers. Siblings never see each other's additions.
//!
//! ```rust
//! use arbor::envelope::{self, Reply};
//! use arbor::{Config, DocConfig, Method, RootRouter};
//!
//! # fn main() -> Result<(), arbor::Error> {
//! let root = RootRouter::new(
//!     Config::new("/").generic_to_http(envelope::to_http),
//!     DocConfig::new("users", "User directory", "1.0.0"),
//! )?;
//! let api = root.subrouter(Config::new("/api").allow_header("X-Tenant"));
//! api.endpoint("/users", Method::GET, envelope::handler(|_req| async { Ok(Reply::ok(vec![1, 2])) }), None)?;
//!
//! assert_eq!(root.list_routes()["/api/users"], vec!["GET"]);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use http::Method;
use tracing::{debug, info, warn};

use crate::docs::{DocAggregator, DocConfig, DocFn};
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::method::MethodSlot;
use crate::middleware::{self, GenericMiddleware, Middleware, StatsHook};
use crate::openapi::{Document, Parameter};
use crate::path;
use crate::server::{self, Dispatcher, Server, ServerConfig};
use crate::table::RouteTable;

/// Turns the pre-conversion handler shape `T` into a protocol handler.
pub type Conversion<T> = Arc<dyn Fn(T) -> BoxedHandler + Send + Sync>;

/// Configuration of one router node.
///
/// Lists extend the parent's lists; the conversion and the stats hook, when
/// set, replace the parent's.
pub struct Config<T> {
    path_prefix: String,
    generic_middleware: Vec<GenericMiddleware<T>>,
    middleware: Vec<Middleware>,
    default_parameters: Vec<Parameter>,
    allowed_options_headers: Vec<String>,
    generic_to_http: Option<Conversion<T>>,
    stats: Option<StatsHook>,
}

impl<T> Default for Config<T> {
    fn default() -> Self {
        Self {
            path_prefix: String::new(),
            generic_middleware: Vec::new(),
            middleware: Vec::new(),
            default_parameters: Vec::new(),
            allowed_options_headers: Vec::new(),
            generic_to_http: None,
            stats: None,
        }
    }
}

impl<T: 'static> Config<T> {
    pub fn new(path_prefix: impl Into<String>) -> Self {
        Self { path_prefix: path_prefix.into(), ..Self::default() }
    }

    /// Appends middleware over the handler shape `T`. Runs before the
    /// conversion, first-declared outermost.
    pub fn generic_middleware(mut self, f: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        self.generic_middleware.push(Arc::new(f));
        self
    }

    /// Appends protocol middleware. First-declared runs first.
    pub fn middleware(mut self, m: Middleware) -> Self {
        self.middleware.push(m);
        self
    }

    /// Appends a parameter to the documentation of every endpoint registered
    /// below this node.
    pub fn default_parameter(mut self, parameter: Parameter) -> Self {
        self.default_parameters.push(parameter);
        self
    }

    /// Appends a header name to `Access-Control-Allow-Headers` for every
    /// endpoint registered below this node.
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_options_headers.push(header.into());
        self
    }

    pub fn generic_to_http(mut self, f: impl Fn(T) -> BoxedHandler + Send + Sync + 'static) -> Self {
        self.generic_to_http = Some(Arc::new(f));
        self
    }

    pub fn stats(mut self, hook: StatsHook) -> Self {
        self.stats = Some(hook);
        self
    }
}

/// State shared by every node of one router tree and by the server built
/// from it.
pub(crate) struct Shared {
    pub(crate) table: RouteTable,
    pub(crate) docs: DocAggregator,
    built: AtomicBool,
}

/// A node of the router tree.
pub struct Router<T> {
    shared: Arc<Shared>,
    prefix: String,
    generic_middleware: Vec<GenericMiddleware<T>>,
    middleware: Vec<Middleware>,
    default_parameters: Vec<Parameter>,
    allowed_options_headers: Vec<String>,
    conversion: Conversion<T>,
    stats: Option<StatsHook>,
}

impl<T> Clone for Router<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            prefix: self.prefix.clone(),
            generic_middleware: self.generic_middleware.clone(),
            middleware: self.middleware.clone(),
            default_parameters: self.default_parameters.clone(),
            allowed_options_headers: self.allowed_options_headers.clone(),
            conversion: Arc::clone(&self.conversion),
            stats: self.stats.clone(),
        }
    }
}

impl<T: 'static> Router<T> {
    /// Derives a child node. The child's prefix is joined onto this node's,
    /// and its lists are appended to copies of this node's lists.
    pub fn subrouter(&self, config: Config<T>) -> Router<T> {
        let mut child = self.clone();
        child.prefix = path::join(&self.prefix, &config.path_prefix);
        child.generic_middleware.extend(config.generic_middleware);
        child.middleware.extend(config.middleware);
        child.default_parameters.extend(config.default_parameters);
        child.allowed_options_headers.extend(config.allowed_options_headers);
        if let Some(conversion) = config.generic_to_http {
            child.conversion = conversion;
        }
        if let Some(stats) = config.stats {
            child.stats = Some(stats);
        }
        child
    }

    /// Registers `handler` for `method` at this node's prefix joined with
    /// `subpath`. The key is exact: a trailing `/` on `subpath` is dropped.
    ///
    /// The handler is wrapped, innermost first, by the generic middleware,
    /// the conversion, the protocol middleware and the stats hook. `doc` runs
    /// before anything is registered; its failure is returned as
    /// [`Error::Documentation`] and leaves the route table untouched.
    /// Registering the same method and path twice replaces the first handler.
    pub fn endpoint(
        &self,
        subpath: &str,
        method: Method,
        handler: T,
        doc: Option<DocFn>,
    ) -> Result<(), Error> {
        let full_path = path::join(&self.prefix, subpath);
        self.ensure_open(method.as_str(), &full_path)?;

        let operation = match doc {
            Some(doc) => Some(doc().map_err(|source| Error::Documentation {
                method: method.to_string(),
                path: full_path.clone(),
                source,
            })?),
            None => None,
        };

        let handler = self.generic_middleware.iter().rev().fold(handler, |h, m| m(h));
        let handler = (self.conversion)(handler);
        let mut handler = middleware::apply(handler, &self.middleware);
        if let Some(stats) = &self.stats {
            handler = stats(handler, &method, &full_path);
        }

        let replaced = self.shared.table.add_endpoint(
            &full_path,
            MethodSlot::Exact(method.clone()),
            handler,
            &self.allowed_options_headers,
        );
        if replaced {
            warn!(%method, path = %full_path, "endpoint registered twice, replacing previous handler");
        } else {
            debug!(%method, path = %full_path, "endpoint registered");
        }

        if let Some(mut operation) = operation {
            operation.parameters.extend(self.default_parameters.iter().cloned());
            self.shared.docs.merge(&full_path, &method, operation);
        }
        Ok(())
    }

    /// Registers a raw protocol handler answering every method at
    /// `subpath`, without middleware or documentation.
    ///
    /// A path ending in `/` is a subtree mount: it also answers every request
    /// below it that has no route of its own.
    pub fn handle(&self, subpath: &str, handler: impl Handler) -> Result<(), Error> {
        let full_path = path::join_mount(&self.prefix, subpath);
        let slot = MethodSlot::Any;
        self.ensure_open(slot.as_str(), &full_path)?;

        if self.shared.table.add_handler(&full_path, slot, handler.into_boxed_handler()) {
            warn!(path = %full_path, "mount registered twice, replacing previous handler");
        } else {
            debug!(path = %full_path, "mount registered");
        }
        Ok(())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// A read-only handle on the route table and document of this tree.
    pub fn registry(&self) -> Registry {
        Registry { shared: Arc::clone(&self.shared) }
    }

    fn ensure_open(&self, method: &str, path: &str) -> Result<(), Error> {
        if self.shared.built.load(Ordering::Acquire) {
            return Err(Error::Frozen { method: method.to_owned(), path: path.to_owned() });
        }
        Ok(())
    }
}

/// The root of a router tree.
///
/// Dereferences to [`Router`] for registration and subrouting.
pub struct RootRouter<T> {
    router: Router<T>,
}

impl<T: 'static> RootRouter<T> {
    /// Validates `doc` then `config`, and creates an empty tree.
    ///
    /// The root's protocol middleware is [`middleware::defaults`] followed by
    /// the middleware in `config`.
    pub fn new(config: Config<T>, doc: DocConfig) -> Result<Self, Error> {
        doc.validate()?;
        let conversion = config.generic_to_http.ok_or(Error::MissingConversion)?;
        if config.path_prefix.is_empty() {
            return Err(Error::MissingPathPrefix);
        }

        let mut stack = middleware::defaults();
        stack.extend(config.middleware);

        info!(service = %doc.service_name, prefix = %config.path_prefix, "router created");
        let shared = Arc::new(Shared {
            table: RouteTable::new(),
            docs: DocAggregator::new(doc),
            built: AtomicBool::new(false),
        });

        Ok(Self {
            router: Router {
                shared,
                prefix: path::join(&config.path_prefix, ""),
                generic_middleware: config.generic_middleware,
                middleware: stack,
                default_parameters: config.default_parameters,
                allowed_options_headers: config.allowed_options_headers,
                conversion,
                stats: config.stats,
            },
        })
    }

    /// Freezes the tree and returns a server dispatching over it.
    ///
    /// `addr` is `host:port`, or `:port` for all interfaces. `None` and zero
    /// durations in `config` mean the default timeouts. Only the first call
    /// succeeds; afterwards registrations fail with [`Error::Frozen`].
    pub fn build(&self, addr: &str, config: Option<ServerConfig>) -> Result<Server, Error> {
        let addr = server::parse_addr(addr)?;
        if self.shared.built.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyBuilt);
        }

        let dispatcher = Dispatcher::new(Arc::clone(&self.shared));
        info!(%addr, routes = dispatcher.route_count(), "router frozen");
        Ok(Server::new(addr, dispatcher, config.unwrap_or_default()))
    }

    /// Every registered path with its sorted methods; `*` marks a mount.
    pub fn list_routes(&self) -> BTreeMap<String, Vec<String>> {
        self.registry().list_routes()
    }

    pub fn openapi(&self) -> Document {
        self.registry().openapi()
    }
}

impl<T> Deref for RootRouter<T> {
    type Target = Router<T>;

    fn deref(&self) -> &Router<T> {
        &self.router
    }
}

/// Read access to a router tree's routes and documentation, usable from
/// handlers while the server runs.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<Shared>,
}

impl Registry {
    pub fn list_routes(&self) -> BTreeMap<String, Vec<String>> {
        let table = &self.shared.table;
        table
            .get_all_paths()
            .into_iter()
            .map(|path| {
                let slots: Vec<String> = table.slots(&path).iter().map(|s| s.as_str().to_owned()).collect();
                (path, slots)
            })
            .collect()
    }

    pub fn openapi(&self) -> Document {
        self.shared.docs.document()
    }
}
