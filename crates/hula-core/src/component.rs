//! The component contract.
//!
//! A component is built by a factory from a [`Composer`] (the interpolation
//! engine bound to its subroutes) and the context state. It may implement a
//! `render` hook producing its markup and a `register` hook attaching client
//! behavior to its mounted nodes. Both hooks are optional; an absent hook is
//! reported as `None` rather than silently treated as success.
//!
//! [`Composer`]: crate::interpolate::Composer

use crate::context::{ComponentId, State};
use crate::error::ComponentError;
use crate::interpolate::Composer;
use futures_util::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Builds a component instance for one route and context.
pub type ComponentFactory =
    Arc<dyn Fn(Composer, State) -> Result<Arc<dyn Component>, ComponentError> + Send + Sync>;

/// An opaque handle to a mounted document node.
pub type NodeHandle = Arc<dyn Any + Send + Sync>;

/// The output of a `render` hook: either ready markup or a deferred one.
pub enum Rendering {
    /// Markup available immediately.
    Ready(String),
    /// Markup that resolves later.
    Deferred(BoxFuture<'static, Result<String, ComponentError>>),
}

impl Rendering {
    /// Wrap a future producing markup.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<String, ComponentError>> + Send + 'static,
    {
        Rendering::Deferred(Box::pin(future))
    }

    /// Wait for the markup.
    ///
    /// # Errors
    ///
    /// Returns the component's error if the deferred markup fails.
    pub async fn resolve(self) -> Result<String, ComponentError> {
        match self {
            Rendering::Ready(html) => Ok(html),
            Rendering::Deferred(future) => future.await,
        }
    }
}

impl From<String> for Rendering {
    fn from(html: String) -> Self {
        Rendering::Ready(html)
    }
}

impl From<&str> for Rendering {
    fn from(html: &str) -> Self {
        Rendering::Ready(html.to_string())
    }
}

/// A live component instance.
pub trait Component: Send + Sync + 'static {
    /// Render this component around its already-rendered child.
    ///
    /// Returns `None` when the component has no markup of its own.
    fn render(&self, child: Option<String>) -> Option<Rendering> {
        let _ = child;
        None
    }

    /// Attach client-side behavior to the component's mounted nodes.
    ///
    /// Returns `None` when the component has nothing to attach.
    fn register(&self, mount: &Mount) -> Option<Result<(), ComponentError>> {
        let _ = mount;
        None
    }
}

/// A component with neither hook. Renders as a bare wrapper around its child.
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

impl Component for Empty {}

/// Requests re-renders from inside registered components.
#[derive(Debug, Clone)]
pub struct Updater {
    tx: mpsc::UnboundedSender<String>,
}

impl Updater {
    /// Create an updater and the receiver its requests arrive on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Ask for `route` to be re-rendered.
    ///
    /// Returns `false` if nothing is listening any more.
    pub fn request(&self, route: impl Into<String>) -> bool {
        self.tx.send(route.into()).is_ok()
    }
}

/// The nodes of one mounted component, passed to its `register` hook.
#[derive(Debug)]
pub struct Mount {
    id: ComponentId,
    route: String,
    nodes: Vec<NodeHandle>,
    updater: Updater,
}

impl Mount {
    pub(crate) fn new(
        id: ComponentId,
        route: impl Into<String>,
        nodes: Vec<NodeHandle>,
        updater: Updater,
    ) -> Self {
        Self {
            id,
            route: route.into(),
            nodes,
            updater,
        }
    }

    /// The component identity.
    #[must_use]
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// The route that produced the component.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// The mounted nodes not yet registered.
    #[must_use]
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// The mounted nodes of a concrete document type.
    pub fn nodes_as<T: Any>(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter().filter_map(|node| node.downcast_ref::<T>())
    }

    /// Ask for this component's route to be re-rendered.
    pub fn request_update(&self) -> bool {
        self.updater.request(self.route.clone())
    }

    /// A clone of the updater, for handlers that outlive the hook call.
    #[must_use]
    pub fn updater(&self) -> Updater {
        self.updater.clone()
    }
}
