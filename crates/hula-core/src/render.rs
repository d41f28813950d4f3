//! The render pipeline.
//!
//! Rendering walks the route hierarchy from the requested leaf up towards
//! the root. Each component renders around its already-rendered child, is
//! given a fresh identity in the context, and is wrapped in a marker element
//! so it can be found and re-activated later:
//!
//! ```text
//! /todo/list  ──render──▶ <div data-component="k3f9a0">…</div>
//!                                       │ child html
//!                                       ▼
//! /todo       ──render──▶ <div data-component="p2x81c" data-child="k3f9a0">…</div>
//! ```
//!
//! Ancestors render strictly after their child; independent subroutes
//! interpolated into one template resolve concurrently.

use crate::component::Component;
use crate::context::{ComponentId, Context};
use crate::error::RenderError;
use crate::interpolate::{ComponentHandle, Composer};
use crate::route::{self, RouteTable, ROOT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Attribute carrying a component identity.
pub const COMPONENT_ATTR: &str = "data-component";

/// Attribute linking a component to its rendered child.
pub const CHILD_ATTR: &str = "data-child";

/// The output of rendering one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResult {
    /// Identity minted for the component, if wrapped.
    pub id: Option<ComponentId>,
    /// The component's markup, including descendants.
    pub html: String,
}

/// Drives rendering against a shared route table.
#[derive(Debug, Clone)]
pub struct Renderer {
    routes: Arc<RouteTable>,
}

impl Renderer {
    /// Create a renderer over a route table.
    #[must_use]
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes: Arc::new(routes),
        }
    }

    /// The route table.
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Whether a route exists, after normalization.
    #[must_use]
    pub fn exists(&self, route: &str) -> bool {
        self.routes.exists(&route::normalize(route))
    }

    /// Handles to every subroute of `route`, bound to `context`.
    #[must_use]
    pub fn subroutes(&self, context: &Context, route: &str) -> BTreeMap<String, ComponentHandle> {
        let route = route::normalize(route);
        self.routes
            .subroutes(&route)
            .into_iter()
            .map(|(suffix, full)| {
                let handle = ComponentHandle::new(self.clone(), context.downgrade(), full);
                (suffix, handle)
            })
            .collect()
    }

    /// The live instance for `route` in `context`, built on first use.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown routes or `Construction` if the
    /// factory fails.
    pub fn instance(&self, route: &str, context: &Context) -> Result<Arc<dyn Component>, RenderError> {
        context.instances().get_or_build(route, || {
            let factory = self
                .routes
                .factory(route)
                .ok_or_else(|| RenderError::not_found(route))?;
            let composer = Composer::new(self.clone(), context, route);

            debug!(route = %route, "Constructing component instance");
            factory(composer, context.state()).map_err(|source| RenderError::Construction {
                route: route.to_string(),
                source,
            })
        })
    }

    /// Render `route`, optionally wrapped in each existing ancestor up to
    /// (but not including) the root.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the route does not exist; any component failure
    /// aborts the whole pass.
    pub async fn render(
        &self,
        route: &str,
        context: &Context,
        include_ancestors: bool,
    ) -> Result<RenderResult, RenderError> {
        let route = route::normalize(route);
        if !self.routes.exists(&route) {
            debug!(route = %route, "Render of unknown route");
            return Err(RenderError::not_found(route));
        }

        let mut current = route.clone();
        let mut result: Option<RenderResult> = None;

        loop {
            if self.routes.exists(&current) {
                let rendered = self.render_component(&current, context, result.take()).await?;
                result = Some(rendered);
            }

            current = route::parent(&current);
            if !include_ancestors || current == ROOT {
                break;
            }
        }

        result.ok_or_else(|| RenderError::not_found(route))
    }

    /// Render `route` and return only the final markup.
    ///
    /// # Errors
    ///
    /// Same as [`Renderer::render`].
    pub async fn render_html(
        &self,
        route: &str,
        context: &Context,
        include_ancestors: bool,
    ) -> Result<String, RenderError> {
        Ok(self.render(route, context, include_ancestors).await?.html)
    }

    /// Render one component around an optional child and wrap it.
    ///
    /// # Errors
    ///
    /// Returns an error if the component cannot be built or its render hook
    /// fails.
    pub async fn render_component(
        &self,
        route: &str,
        context: &Context,
        child: Option<RenderResult>,
    ) -> Result<RenderResult, RenderError> {
        let instance = self.instance(route, context)?;
        let child_html = child.as_ref().map(|child| child.html.clone());

        let markup = match instance.render(child_html) {
            Some(rendering) => rendering.resolve().await.map_err(|source| {
                warn!(route = %route, error = %source, "Component render failed");
                RenderError::component(route, source)
            })?,
            None => {
                debug!(route = %route, "Component has no render hook, passing child through");
                child.as_ref().map(|child| child.html.clone()).unwrap_or_default()
            }
        };

        let id = context.mint(route)?;
        let html = wrap(&id, child.as_ref().and_then(|child| child.id.as_ref()), &markup);

        Ok(RenderResult { id: Some(id), html })
    }
}

/// Wrap markup in a component marker element.
fn wrap(id: &ComponentId, child: Option<&ComponentId>, markup: &str) -> String {
    match child {
        Some(child) => format!(
            r#"<div {COMPONENT_ATTR}="{id}" {CHILD_ATTR}="{child}">{markup}</div>"#
        ),
        None => format!(r#"<div {COMPONENT_ATTR}="{id}">{markup}</div>"#),
    }
}
