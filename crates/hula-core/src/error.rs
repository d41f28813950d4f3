//! Error types for rendering and call correlation.

use thiserror::Error;

/// HTTP-equivalent code for a missing route.
pub const NOT_FOUND: u16 = 404;

/// HTTP-equivalent code for every other render failure.
pub const INTERNAL: u16 = 500;

/// Errors raised while resolving or rendering a route.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The requested route is not in the route table.
    #[error("Path not found: {route}")]
    NotFound { route: String },

    /// A component's `render` or `register` hook failed.
    #[error("Component {route} failed: {source}")]
    Component {
        route: String,
        #[source]
        source: ComponentError,
    },

    /// A component factory refused to build an instance.
    #[error("Component {route} could not be constructed: {source}")]
    Construction {
        route: String,
        #[source]
        source: ComponentError,
    },

    /// Every candidate identity collided with one already in the context.
    #[error("Could not mint a unique component identity after {attempts} attempts")]
    IdentityExhausted { attempts: usize },

    /// Literal segments and embedded values do not interleave.
    #[error("Template has {literals} literal segments for {values} values")]
    TemplateArity { literals: usize, values: usize },

    /// The context a component was bound to has been discarded.
    #[error("Rendering context was dropped")]
    ContextDropped,
}

impl RenderError {
    /// Create a not-found error for a route.
    #[must_use]
    pub fn not_found(route: impl Into<String>) -> Self {
        RenderError::NotFound {
            route: route.into(),
        }
    }

    /// Wrap a component failure, unwrapping render errors that merely passed
    /// through the component so their original code survives.
    #[must_use]
    pub fn component(route: impl Into<String>, source: ComponentError) -> Self {
        match source {
            ComponentError::Render(inner) => *inner,
            source => RenderError::Component {
                route: route.into(),
                source,
            },
        }
    }

    /// The numeric HTTP-equivalent code for this error.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            RenderError::NotFound { .. } => NOT_FOUND,
            _ => INTERNAL,
        }
    }

    /// Whether this is a missing-route error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, RenderError::NotFound { .. })
    }
}

/// Errors returned by component code.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// A plain failure message.
    #[error("{0}")]
    Failed(String),

    /// A nested render (for example an interpolated subroute) failed.
    #[error(transparent)]
    Render(Box<RenderError>),

    /// Any other error.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ComponentError {
    /// Create a failure from a message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        ComponentError::Failed(message.into())
    }
}

impl From<RenderError> for ComponentError {
    fn from(err: RenderError) -> Self {
        ComponentError::Render(Box::new(err))
    }
}

/// Errors settling an outstanding call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The server answered with an error.
    #[error("{message}")]
    Remote { message: String, code: Option<u16> },

    /// The connection closed before a response arrived.
    #[error("Connection closed before the call was answered")]
    Disconnected,

    /// No response arrived within the configured timeout.
    #[error("Call timed out")]
    Timeout,

    /// The response was malformed.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// The call could not be sent.
    #[error("Send failed: {0}")]
    Send(String),
}
