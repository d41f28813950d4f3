//! Route table and route resolution.
//!
//! Routes are slash-delimited paths forming a hierarchical namespace. A route
//! is an ancestor of another when it is a strict prefix ending at a path
//! separator.

use crate::component::{Component, ComponentFactory};
use crate::context::State;
use crate::error::ComponentError;
use crate::interpolate::Composer;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The root route.
pub const ROOT: &str = "/";

/// Normalize a route the way a POSIX path resolver would.
///
/// Repeated separators collapse, `.` segments are dropped, `..` pops a
/// segment (never above the root) and a trailing separator is removed.
#[must_use]
pub fn normalize(route: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in route.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return ROOT.to_string();
    }

    let mut normalized = String::with_capacity(route.len() + 1);
    for segment in segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    normalized
}

/// The route with its final segment removed. The root is its own parent.
#[must_use]
pub fn parent(route: &str) -> String {
    let route = normalize(route);
    match route.rfind('/') {
        Some(0) | None => ROOT.to_string(),
        Some(index) => route[..index].to_string(),
    }
}

/// Whether `candidate` is a strict, path-prefixed descendant of `route`.
#[must_use]
pub fn is_descendant(route: &str, candidate: &str) -> bool {
    if candidate == route || !candidate.starts_with(route) {
        return false;
    }
    route.ends_with('/') || candidate[route.len()..].starts_with('/')
}

/// A static mapping from route to component factory.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: BTreeMap<String, ComponentFactory>,
}

impl RouteTable {
    /// Create an empty route table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. The path is normalized before insertion.
    #[must_use]
    pub fn route<F, C>(mut self, path: &str, factory: F) -> Self
    where
        F: Fn(Composer, State) -> Result<C, ComponentError> + Send + Sync + 'static,
        C: Component,
    {
        self.insert(path, factory);
        self
    }

    /// Add or replace a route in place.
    pub fn insert<F, C>(&mut self, path: &str, factory: F)
    where
        F: Fn(Composer, State) -> Result<C, ComponentError> + Send + Sync + 'static,
        C: Component,
    {
        let factory: ComponentFactory = Arc::new(move |composer, state| {
            factory(composer, state).map(|component| Arc::new(component) as Arc<dyn Component>)
        });
        self.routes.insert(normalize(path), factory);
    }

    /// Whether a route is in the table.
    #[must_use]
    pub fn exists(&self, route: &str) -> bool {
        self.routes.contains_key(route)
    }

    /// Get the factory for a route.
    #[must_use]
    pub fn factory(&self, route: &str) -> Option<&ComponentFactory> {
        self.routes.get(route)
    }

    /// Every table route nested under `route`, keyed by the remaining suffix.
    #[must_use]
    pub fn subroutes(&self, route: &str) -> BTreeMap<String, String> {
        self.routes
            .keys()
            .filter(|candidate| is_descendant(route, candidate))
            .map(|candidate| (candidate[route.len()..].to_string(), candidate.clone()))
            .collect()
    }

    /// All routes, in sorted order.
    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.routes.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Empty;

    fn table() -> RouteTable {
        RouteTable::new()
            .route("/todo", |_, _| Ok(Empty))
            .route("/todo/list", |_, _| Ok(Empty))
            .route("/todo/list/item", |_, _| Ok(Empty))
            .route("/todos", |_, _| Ok(Empty))
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("todo"), "/todo");
        assert_eq!(normalize("/todo/"), "/todo");
        assert_eq!(normalize("//todo///list"), "/todo/list");
        assert_eq!(normalize("/todo/./list/../list"), "/todo/list");
        assert_eq!(normalize("/../.."), "/");
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/todo/list"), "/todo");
        assert_eq!(parent("/todo"), "/");
        assert_eq!(parent("/"), "/");
    }

    #[test]
    fn test_exists() {
        let routes = table();
        assert!(routes.exists("/todo"));
        assert!(!routes.exists("/missing"));
        assert_eq!(routes.len(), 4);
    }

    #[test]
    fn test_subroutes_are_path_prefixed() {
        let subroutes = table().subroutes("/todo");

        let suffixes: Vec<_> = subroutes.keys().map(String::as_str).collect();
        assert_eq!(suffixes, vec!["/list", "/list/item"]);
        assert_eq!(subroutes["/list"], "/todo/list");
    }

    #[test]
    fn test_subroutes_of_root() {
        let subroutes = table().subroutes("/");
        assert_eq!(subroutes.len(), 4);
        assert_eq!(subroutes["todo/list"], "/todo/list");
    }
}
