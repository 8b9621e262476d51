use std::{collections::HashMap, sync::Arc};

use regex::Regex;

use crate::{Request, Response, RouteError};

/// Request handler, writes a complete raw HTTP response for a request.
pub type Handler = Arc<dyn Fn(&mut Response, &Request) + Send + Sync>;

/// A path pattern and the handlers registered on it, keyed by method.
pub struct RouteEntry {
    pattern: String,
    regex: Regex,
    handlers: HashMap<String, Handler>,
}

impl RouteEntry {
    fn new(pattern: &str) -> Result<Self, RouteError> {
        // The pattern has to match the entire path
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| {
            RouteError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;

        let value = Self {
            pattern: pattern.to_string(),
            regex,
            handlers: HashMap::new(),
        };
        Ok(value)
    }

    /// Pattern as registered.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Register `handler` for `method`, replacing any earlier handler for the same method.
    pub fn method<F>(&mut self, method: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut Response, &Request) + Send + Sync + 'static,
    {
        self.handlers.insert(method.to_string(), Arc::new(handler));
        self
    }

    /// Methods that have a handler on this entry.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    fn resolve(&self, path: &str, method: &str) -> Option<ResolvedRoute> {
        let handler = self.handlers.get(method)?;
        let captures = self.regex.captures(path)?;

        let captures = captures
            .iter()
            .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();

        let route = ResolvedRoute {
            handler: handler.clone(),
            captures,
        };
        Some(route)
    }
}

/// Ordered set of route entries.
#[derive(Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Get the entry for `pattern`, adding it at the end if it's not registered yet.
    pub fn route(&mut self, pattern: &str) -> Result<&mut RouteEntry, RouteError> {
        let index = match self.entries.iter().position(|e| e.pattern == pattern) {
            Some(index) => index,
            None => {
                self.entries.push(RouteEntry::new(pattern)?);
                self.entries.len() - 1
            }
        };

        Ok(&mut self.entries[index])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }
}

/// Explicit and default route tables.
///
/// Explicit routes are always consulted before default routes. Within a table, entries are
/// tried in registration order and the first entry matching both path and method wins.
#[derive(Default)]
pub struct Routes {
    pub explicit: RouteTable,
    pub default: RouteTable,
}

impl Routes {
    /// Find the handler for a request path and method.
    pub fn resolve(&self, path: &str, method: &str) -> Option<ResolvedRoute> {
        self.explicit
            .iter()
            .chain(self.default.iter())
            .find_map(|entry| entry.resolve(path, method))
    }
}

/// Outcome of a successful route lookup.
pub struct ResolvedRoute {
    pub handler: Handler,
    /// Capture groups of the matched pattern, index 0 is the whole path.
    pub captures: Vec<String>,
}
