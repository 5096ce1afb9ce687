//! Route-table method slots.
//!
//! A path holds one handler per HTTP method, plus an optional method-less
//! slot used by raw mounts (static files and the like). The method-less slot
//! answers any method that has no exact entry at the same path.

use std::fmt;

use http::Method;

/// The key of a handler under one path.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MethodSlot {
    /// Registered for exactly this method.
    Exact(Method),
    /// Method-less fallback.
    Any,
}

impl MethodSlot {
    /// Returns the wire representation, or `*` for the method-less slot.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact(m) => m.as_str(),
            Self::Any      => "*",
        }
    }

    pub fn method(&self) -> Option<&Method> {
        match self {
            Self::Exact(m) => Some(m),
            Self::Any      => None,
        }
    }
}

impl From<Method> for MethodSlot {
    fn from(m: Method) -> Self {
        Self::Exact(m)
    }
}

impl fmt::Display for MethodSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
