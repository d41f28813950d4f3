//! Client rendering session.
//!
//! A session owns the client's long-lived context and its document. Every
//! render re-runs the pipeline against current state, patches the document
//! and activates whatever new components appeared.

use crate::component::Updater;
use crate::context::Context;
use crate::error::RenderError;
use crate::registry::{register, Document, RegisterStats};
use crate::render::Renderer;
use tokio::sync::mpsc;
use tracing::debug;

/// A client-side rendering session.
pub struct Session<D: Document> {
    renderer: Renderer,
    context: Context,
    document: D,
    updater: Updater,
    updates: mpsc::UnboundedReceiver<String>,
}

impl<D: Document> Session<D> {
    /// Start a session and activate the components already in the document,
    /// e.g. those rendered by the server and restored into `context`.
    ///
    /// # Errors
    ///
    /// Returns an error if activating an existing component fails.
    pub fn new(renderer: Renderer, context: Context, document: D) -> Result<Self, RenderError> {
        let (updater, updates) = Updater::channel();
        let mut session = Self {
            renderer,
            context,
            document,
            updater,
            updates,
        };
        session.register()?;
        Ok(session)
    }

    /// The session's context.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The live document.
    #[must_use]
    pub fn document(&self) -> &D {
        &self.document
    }

    /// A handle components can use to request re-renders.
    #[must_use]
    pub fn updater(&self) -> Updater {
        self.updater.clone()
    }

    /// Render `route` (or the current location) with its ancestors, patch
    /// the document and activate new components.
    ///
    /// # Errors
    ///
    /// Returns the render error; the document is left untouched on failure.
    pub async fn render(&mut self, route: Option<&str>) -> Result<RegisterStats, RenderError> {
        let route = route.map_or_else(|| self.document.location(), str::to_string);
        let html = self.renderer.render_html(&route, &self.context, true).await?;

        debug!(route = %route, bytes = html.len(), "Patching document");
        self.document.patch(&html);
        self.register()
    }

    /// Navigate to `route`: record it in history, then render it.
    ///
    /// # Errors
    ///
    /// Same as [`Session::render`].
    pub async fn go(&mut self, route: &str) -> Result<RegisterStats, RenderError> {
        self.document.push_history(route);
        self.render(Some(route)).await
    }

    /// Wait for the next update request and re-render the current location.
    ///
    /// Requests that queued up meanwhile are coalesced into one render.
    /// The session holds an updater itself, so this only returns `None` if
    /// the channel is torn down.
    pub async fn update(&mut self) -> Option<Result<RegisterStats, RenderError>> {
        let route = self.updates.recv().await?;
        let mut coalesced = 0usize;
        while self.updates.try_recv().is_ok() {
            coalesced += 1;
        }

        debug!(requested_by = %route, coalesced, "Re-rendering after update request");
        Some(self.render(None).await)
    }

    fn register(&mut self) -> Result<RegisterStats, RenderError> {
        register(&self.renderer, &self.context, &mut self.document, &self.updater)
    }
}
