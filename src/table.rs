//! The shared route table.
//!
//! Two lock tiers: the table lock guards the path → entry map, and every
//! entry carries its own lock over its method → handler map. Lookups on
//! different paths only share the table read lock, and adding a method to an
//! existing path never takes the table write lock.
//!
//! No guard is ever held across an `.await`; lookups clone the `Arc` out.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use parking_lot::RwLock;

use crate::handler::BoxedHandler;
use crate::method::MethodSlot;

#[derive(Default)]
struct PathEntry {
    handlers: HashMap<MethodSlot, BoxedHandler>,
    allowed_headers: Vec<String>,
}

type SharedEntry = Arc<RwLock<PathEntry>>;

/// Path → method → handler, safe under concurrent registration and lookup.
#[derive(Default)]
pub(crate) struct RouteTable {
    routes: RwLock<HashMap<String, SharedEntry>>,
}

impl RouteTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn entry(&self, path: &str) -> Option<SharedEntry> {
        self.routes.read().get(path).cloned()
    }

    /// Runs `f` on the entry for `path` under its write lock, creating the
    /// entry first if needed. A new entry is published only after `f` ran, so
    /// readers never see it half-filled.
    fn write_entry<R>(&self, path: &str, f: impl FnOnce(&mut PathEntry) -> R) -> R {
        if let Some(entry) = self.entry(path) {
            return f(&mut entry.write());
        }
        let mut routes = self.routes.write();
        let entry = routes.entry(path.to_owned()).or_default();
        f(&mut entry.write())
    }

    /// Inserts or overwrites the handler for `(path, slot)`. Returns `true`
    /// when an existing handler was replaced.
    pub(crate) fn add_handler(&self, path: &str, slot: MethodSlot, handler: BoxedHandler) -> bool {
        self.write_entry(path, |entry| entry.handlers.insert(slot, handler).is_some())
    }

    pub(crate) fn get_handler(&self, path: &str, slot: &MethodSlot) -> Option<BoxedHandler> {
        let entry = self.entry(path)?;
        let entry = entry.read();
        entry.handlers.get(slot).cloned()
    }

    /// Explicitly registered methods at `path`, sorted by name. The
    /// method-less slot is not a method and is left out.
    pub(crate) fn get_methods(&self, path: &str) -> Vec<Method> {
        let Some(entry) = self.entry(path) else { return Vec::new() };
        let mut methods: Vec<Method> = entry
            .read()
            .handlers
            .keys()
            .filter_map(|slot| slot.method().cloned())
            .collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }

    /// Every registered slot at `path`, sorted by name.
    pub(crate) fn slots(&self, path: &str) -> Vec<MethodSlot> {
        let Some(entry) = self.entry(path) else { return Vec::new() };
        let mut slots: Vec<MethodSlot> = entry.read().handlers.keys().cloned().collect();
        slots.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        slots
    }

    pub(crate) fn get_all_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.routes.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Like [`add_handler`](Self::add_handler), and adds `headers` to the
    /// path's extra OPTIONS headers under the same lock. Names already present
    /// are skipped, compared case-insensitively.
    pub(crate) fn add_endpoint(
        &self,
        path: &str,
        slot: MethodSlot,
        handler: BoxedHandler,
        headers: &[String],
    ) -> bool {
        self.write_entry(path, |entry| {
            for header in headers {
                if !entry.allowed_headers.iter().any(|h| h.eq_ignore_ascii_case(header)) {
                    entry.allowed_headers.push(header.clone());
                }
            }
            entry.handlers.insert(slot, handler).is_some()
        })
    }

    pub(crate) fn allowed_headers(&self, path: &str) -> Vec<String> {
        self.entry(path)
            .map(|entry| entry.read().allowed_headers.clone())
            .unwrap_or_default()
    }
}
