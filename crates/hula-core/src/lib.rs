//! # hula-core
//!
//! Isomorphic rendering for server-defined components.
//!
//! This crate provides the pieces shared by server and client:
//!
//! - **RouteTable** - Static mapping from route to component factory
//! - **Renderer** - Walks a route up its ancestors, composing one document
//! - **Composer** - Interpolates text, deferred values and subroutes in order
//! - **Context** - Request state plus the registry of minted identities
//! - **register** - Activates mounted components in a live document
//! - **PendingCalls** - Correlates channel responses with their calls
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ RouteTable  │────▶│  Renderer   │────▶│   Composer   │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!                            │                    │
//!                            ▼                    ▼
//!                     ┌─────────────┐     ┌──────────────┐
//!                     │   Context   │◀────│ InstanceCache│
//!                     └─────────────┘     └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use hula_core::{Component, Composer, Context, Renderer, Rendering, RouteTable};
//!
//! struct Page {
//!     app: Composer,
//! }
//!
//! impl Component for Page {
//!     fn render(&self, child: Option<String>) -> Option<Rendering> {
//!         let template = self.app.template().text("<main>").value(child).text("</main>");
//!         Some(Rendering::deferred(async move { Ok(template.resolve().await?) }))
//!     }
//! }
//!
//! struct Hello;
//!
//! impl Component for Hello {
//!     fn render(&self, _child: Option<String>) -> Option<Rendering> {
//!         Some(Rendering::from("hello"))
//!     }
//! }
//!
//! # tokio_test();
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn tokio_test() {
//! let renderer = Renderer::new(
//!     RouteTable::new()
//!         .route("/page", |app, _| Ok(Page { app }))
//!         .route("/page/hello", |_, _| Ok(Hello)),
//! );
//!
//! let context = Context::new();
//! let html = renderer.render_html("/page/hello", &context, true).await.unwrap();
//! assert!(html.contains("<main><div data-component="));
//! assert_eq!(context.component_count(), 2);
//! # }
//! ```

pub mod component;
pub mod context;
pub mod error;
pub mod instance;
pub mod interpolate;
pub mod pending;
pub mod registry;
pub mod render;
pub mod route;
pub mod session;

pub use component::{Component, ComponentFactory, Empty, Mount, NodeHandle, Rendering, Updater};
pub use context::{ComponentId, Context, ContextSnapshot, State};
pub use error::{CallError, ComponentError, RenderError};
pub use instance::InstanceCache;
pub use interpolate::{ComponentHandle, Composer, Template, Value};
pub use pending::{PendingCall, PendingCalls, Settlement};
pub use registry::{register, Document, RegisterStats};
pub use render::{RenderResult, Renderer};
pub use route::RouteTable;
pub use session::Session;
