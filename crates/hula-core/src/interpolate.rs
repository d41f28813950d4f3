//! Interpolation engine.
//!
//! A [`Template`] interleaves literal text with embedded [`Value`]s, which may
//! be plain text, deferred values, lists, rendered components or handles to
//! subroute components. Resolution runs every embedded value concurrently,
//! but the output always follows template order, never completion order.

use crate::context::{Context, WeakContext};
use crate::error::RenderError;
use crate::render::{RenderResult, Renderer};
use futures_util::future::{try_join_all, BoxFuture};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

/// A value embedded in a template.
pub enum Value {
    /// Literal text.
    Text(String),
    /// A value that resolves later.
    Deferred(BoxFuture<'static, Result<Value, RenderError>>),
    /// An ordered sequence, joined with no separator.
    List(Vec<Value>),
    /// An already-rendered component; its html is substituted.
    Rendered(RenderResult),
    /// A component that is rendered when the template resolves.
    Component(ComponentHandle),
}

impl Value {
    /// Wrap a future producing a value.
    pub fn deferred<F, V>(future: F) -> Self
    where
        F: Future<Output = Result<V, RenderError>> + Send + 'static,
        V: Into<Value>,
    {
        Value::Deferred(Box::pin(async move { future.await.map(Into::into) }))
    }

    /// Resolve to a string.
    pub fn resolve(self) -> BoxFuture<'static, Result<String, RenderError>> {
        Box::pin(async move {
            match self {
                Value::Text(text) => Ok(text),
                Value::Deferred(future) => future.await?.resolve().await,
                Value::List(values) => {
                    let parts = try_join_all(values.into_iter().map(Value::resolve)).await?;
                    Ok(parts.concat())
                }
                Value::Rendered(result) => Ok(result.html),
                Value::Component(handle) => Ok(handle.render().await?.html),
            }
        })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Value::Deferred(_) => f.write_str("Deferred(..)"),
            Value::List(values) => f.debug_tuple("List").field(values).finish(),
            Value::Rendered(result) => f.debug_tuple("Rendered").field(result).finish(),
            Value::Component(handle) => f.debug_tuple("Component").field(handle).finish(),
        }
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<&String> for Value {
    fn from(text: &String) -> Self {
        Value::Text(text.clone())
    }
}

macro_rules! impl_display_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Text(value.to_string())
                }
            }
        )*
    };
}

impl_display_value!(char, bool, i32, i64, u32, u64, usize, f64);

impl From<RenderResult> for Value {
    fn from(result: RenderResult) -> Self {
        Value::Rendered(result)
    }
}

impl From<ComponentHandle> for Value {
    fn from(handle: ComponentHandle) -> Self {
        Value::Component(handle)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(|| Value::Text(String::new()), Into::into)
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Value::List(iter.into_iter().map(Into::into).collect())
    }
}

/// Literal segments interleaved with embedded values.
///
/// There is always exactly one more literal than there are values.
#[derive(Debug)]
pub struct Template {
    literals: Vec<String>,
    values: Vec<Value>,
}

impl Template {
    /// Create an empty template.
    #[must_use]
    pub fn new() -> Self {
        Self {
            literals: vec![String::new()],
            values: Vec::new(),
        }
    }

    /// Build a template from parallel literal and value sequences.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::TemplateArity`] unless there is exactly one
    /// more literal than values.
    pub fn from_parts<S: Into<String>>(
        literals: impl IntoIterator<Item = S>,
        values: Vec<Value>,
    ) -> Result<Self, RenderError> {
        let literals: Vec<String> = literals.into_iter().map(Into::into).collect();
        if literals.len() != values.len() + 1 {
            return Err(RenderError::TemplateArity {
                literals: literals.len(),
                values: values.len(),
            });
        }
        Ok(Self { literals, values })
    }

    /// Append literal text.
    #[must_use]
    pub fn text(mut self, text: impl AsRef<str>) -> Self {
        if let Some(last) = self.literals.last_mut() {
            last.push_str(text.as_ref());
        }
        self
    }

    /// Append an embedded value.
    #[must_use]
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self.literals.push(String::new());
        self
    }

    /// Resolve every value concurrently and rebuild the string in order.
    ///
    /// # Errors
    ///
    /// Returns the first error any embedded value fails with.
    pub async fn resolve(self) -> Result<String, RenderError> {
        let Template { literals, values } = self;
        let resolved = try_join_all(values.into_iter().map(Value::resolve)).await?;

        let capacity = literals.iter().chain(resolved.iter()).map(String::len).sum();
        let mut output = String::with_capacity(capacity);
        let mut literals = literals.into_iter();
        if let Some(first) = literals.next() {
            output.push_str(&first);
        }
        for (value, literal) in resolved.iter().zip(literals) {
            output.push_str(value);
            output.push_str(&literal);
        }
        Ok(output)
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

/// A subroute bound to a context, rendered on demand.
#[derive(Clone)]
pub struct ComponentHandle {
    renderer: Renderer,
    context: WeakContext,
    route: String,
}

impl ComponentHandle {
    pub(crate) fn new(renderer: Renderer, context: WeakContext, route: String) -> Self {
        Self {
            renderer,
            context,
            route,
        }
    }

    /// The full route of this component.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Render this component alone, without a child.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is gone or rendering fails.
    pub async fn render(&self) -> Result<RenderResult, RenderError> {
        let context = self.context.upgrade()?;
        self.renderer
            .render_component(&self.route, &context, None)
            .await
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("route", &self.route)
            .finish()
    }
}

/// The interpolation engine bound to one route's subroutes.
///
/// Every component receives a composer from its factory. Subroutes resolve
/// against the component's own context, so descendants share its state and
/// identity registry.
#[derive(Clone)]
pub struct Composer {
    renderer: Renderer,
    context: WeakContext,
    route: String,
    subroutes: BTreeMap<String, String>,
}

impl Composer {
    pub(crate) fn new(renderer: Renderer, context: &Context, route: &str) -> Self {
        let subroutes = renderer.routes().subroutes(route);
        Self {
            renderer,
            context: context.downgrade(),
            route: route.to_string(),
            subroutes,
        }
    }

    /// The route this composer is bound to.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Relative suffixes of every subroute.
    pub fn subroutes(&self) -> impl Iterator<Item = &str> {
        self.subroutes.keys().map(String::as_str)
    }

    /// A handle to the subroute at a relative suffix, e.g. `"/list"`.
    #[must_use]
    pub fn sub(&self, suffix: &str) -> Option<ComponentHandle> {
        self.subroutes.get(suffix).map(|route| {
            ComponentHandle::new(self.renderer.clone(), self.context.clone(), route.clone())
        })
    }

    /// Start a template.
    #[must_use]
    pub fn template(&self) -> Template {
        Template::new()
    }

    /// Interpolate literal segments and values into one string.
    ///
    /// # Errors
    ///
    /// Returns an error on arity mismatch or if any value fails.
    pub async fn interpolate<S: Into<String>>(
        &self,
        literals: impl IntoIterator<Item = S>,
        values: Vec<Value>,
    ) -> Result<String, RenderError> {
        Template::from_parts(literals, values)?.resolve().await
    }
}

impl fmt::Debug for Composer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composer")
            .field("route", &self.route)
            .field("subroutes", &self.subroutes)
            .finish()
    }
}
