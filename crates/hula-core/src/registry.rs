//! Client-side component activation.
//!
//! After the live document has been patched with fresh markup, [`register`]
//! walks the context's identity registry, finds each component's mounted
//! nodes and hands the not-yet-registered ones to the component's `register`
//! hook. Every node is activated at most once; identities whose nodes are gone
//! are dropped from the context.

use crate::component::{Mount, NodeHandle, Updater};
use crate::context::{ComponentId, Context};
use crate::error::RenderError;
use crate::render::Renderer;
use tracing::{debug, trace, warn};

/// The live document a client renders into.
pub trait Document {
    /// The mounted nodes belonging to a component identity, if it is present.
    fn mounted(&self, id: &ComponentId) -> Option<Vec<NodeHandle>>;

    /// Whether a node has already been registered.
    fn is_registered(&self, node: &NodeHandle) -> bool;

    /// Flag a node as registered.
    fn mark_registered(&mut self, node: &NodeHandle);

    /// Replace the rendered content with new markup.
    fn patch(&mut self, html: &str);

    /// The route currently displayed.
    fn location(&self) -> String;

    /// Record a navigation to `route`.
    fn push_history(&mut self, route: &str) {
        let _ = route;
    }
}

/// What one registration pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterStats {
    /// Nodes handed to a register hook (or flagged without one).
    pub activated: usize,
    /// Identities whose nodes were already registered.
    pub unchanged: usize,
    /// Identities removed because they are no longer mounted.
    pub removed: usize,
}

/// Activate every mounted component that has not been registered yet.
///
/// # Errors
///
/// Returns an error if an instance cannot be built or a `register` hook
/// fails. Nodes of the failing component stay unregistered.
pub fn register<D: Document + ?Sized>(
    renderer: &Renderer,
    context: &Context,
    document: &mut D,
    updater: &Updater,
) -> Result<RegisterStats, RenderError> {
    let mut stats = RegisterStats::default();

    for (id, route) in context.components() {
        let Some(nodes) = document.mounted(&id) else {
            trace!(component = %id, route = %route, "Component no longer mounted");
            context.forget(&id);
            stats.removed += 1;
            continue;
        };

        let fresh: Vec<NodeHandle> = nodes
            .into_iter()
            .filter(|node| !document.is_registered(node))
            .collect();
        if fresh.is_empty() {
            stats.unchanged += 1;
            continue;
        }

        let instance = renderer.instance(&route, context)?;
        let mount = Mount::new(id.clone(), route.clone(), fresh, updater.clone());

        match instance.register(&mount) {
            Some(Ok(())) => debug!(component = %id, route = %route, "Registered component"),
            Some(Err(source)) => {
                warn!(component = %id, route = %route, error = %source, "Register hook failed");
                return Err(RenderError::component(route, source));
            }
            None => trace!(component = %id, route = %route, "Component has no register hook"),
        }

        for node in mount.nodes() {
            document.mark_registered(node);
        }
        stats.activated += mount.nodes().len();
    }

    Ok(stats)
}
