//! Component instance cache.
//!
//! Each context owns one cache, so an instance is reused for exactly the
//! (route, context) pair it was built for and disappears with its context.

use crate::component::Component;
use crate::error::RenderError;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

/// Live component instances keyed by route.
#[derive(Default)]
pub struct InstanceCache {
    instances: DashMap<String, Arc<dyn Component>>,
}

impl InstanceCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached instance for `route`, building it with `build` if absent.
    ///
    /// `build` runs without any cache lock held, so factories may freely touch
    /// the cache. If two builds race, the first one stored wins and the
    /// other instance is dropped.
    ///
    /// # Errors
    ///
    /// Returns whatever `build` fails with.
    pub fn get_or_build<F>(&self, route: &str, build: F) -> Result<Arc<dyn Component>, RenderError>
    where
        F: FnOnce() -> Result<Arc<dyn Component>, RenderError>,
    {
        if let Some(instance) = self.instances.get(route) {
            trace!(route = %route, "Instance cache hit");
            return Ok(Arc::clone(instance.value()));
        }

        let built = build()?;
        trace!(route = %route, "Instance cache miss, built new instance");

        let instance = self
            .instances
            .entry(route.to_string())
            .or_insert(built);
        Ok(Arc::clone(instance.value()))
    }

    /// Drop the instance for a route, if any.
    pub fn evict(&self, route: &str) -> bool {
        self.instances.remove(route).is_some()
    }

    /// Whether an instance for `route` is cached.
    #[must_use]
    pub fn contains(&self, route: &str) -> bool {
        self.instances.contains_key(route)
    }

    /// Number of cached instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
