//! Rendering context and component identities.
//!
//! A context carries the request-scoped state bag and the registry of
//! component identities minted while rendering against it. It is shared by
//! reference: cloning a [`Context`] yields another handle to the same
//! context, and two contexts are "the same" only if they share identity.

use crate::error::RenderError;
use crate::instance::InstanceCache;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hula_protocol::Query;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::RandomState;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Length of a generated component identity.
pub const IDENTITY_LENGTH: usize = 6;

/// Candidates tried before minting gives up.
pub const MAX_IDENTITY_ATTEMPTS: usize = 16;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Request-scoped state handed to every component built against a context.
pub type State = Arc<Query>;

/// A short random token marking one rendered component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ComponentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Counter mixed into every candidate so successive draws differ.
static IDENTITY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a candidate identity: six base-36 characters.
#[must_use]
pub fn generate_identity() -> ComponentId {
    static KEYS: OnceLock<RandomState> = OnceLock::new();

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let counter = IDENTITY_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut bits = KEYS.get_or_init(RandomState::new).hash_one((nanos, counter));

    let mut id = String::with_capacity(IDENTITY_LENGTH);
    for _ in 0..IDENTITY_LENGTH {
        id.push(ALPHABET[(bits % 36) as usize] as char);
        bits /= 36;
    }
    ComponentId(id)
}

/// Serializable view of a context, embedded in server pages so a client can
/// pick up where the server left off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// The state bag.
    #[serde(default)]
    pub state: Query,
    /// Identity to route.
    #[serde(default)]
    pub components: BTreeMap<ComponentId, String>,
}

pub(crate) struct ContextInner {
    state: State,
    components: DashMap<ComponentId, String>,
    instances: InstanceCache,
}

/// A shared-by-reference rendering context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Create a context with empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(Query::new())
    }

    /// Create a context with the given state.
    #[must_use]
    pub fn with_state(state: Query) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                state: Arc::new(state),
                components: DashMap::new(),
                instances: InstanceCache::new(),
            }),
        }
    }

    /// Rebuild a context from a snapshot.
    #[must_use]
    pub fn restore(snapshot: ContextSnapshot) -> Self {
        let context = Self::with_state(snapshot.state);
        for (id, route) in snapshot.components {
            context.inner.components.insert(id, route);
        }
        context
    }

    /// Capture the state and identity registry.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            state: (*self.inner.state).clone(),
            components: self
                .inner
                .components
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }

    /// The state bag.
    #[must_use]
    pub fn state(&self) -> State {
        Arc::clone(&self.inner.state)
    }

    /// The route a component identity was minted for.
    #[must_use]
    pub fn route_of(&self, id: &ComponentId) -> Option<String> {
        self.inner.components.get(id).map(|route| route.clone())
    }

    /// All registered identities with their routes.
    #[must_use]
    pub fn components(&self) -> Vec<(ComponentId, String)> {
        self.inner
            .components
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of registered identities.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.inner.components.len()
    }

    /// Remove an identity, returning its route.
    pub fn forget(&self, id: &ComponentId) -> Option<String> {
        self.inner.components.remove(id).map(|(_, route)| route)
    }

    /// Mint a fresh identity for `route` and record it.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::IdentityExhausted`] if every candidate collided.
    pub fn mint(&self, route: &str) -> Result<ComponentId, RenderError> {
        self.mint_with(route, generate_identity)
    }

    pub(crate) fn mint_with(
        &self,
        route: &str,
        mut generate: impl FnMut() -> ComponentId,
    ) -> Result<ComponentId, RenderError> {
        for attempt in 0..MAX_IDENTITY_ATTEMPTS {
            let candidate = generate();
            match self.inner.components.entry(candidate) {
                Entry::Vacant(slot) => {
                    let id = slot.key().clone();
                    slot.insert(route.to_string());
                    debug!(component = %id, route = %route, "Minted component identity");
                    return Ok(id);
                }
                Entry::Occupied(slot) => {
                    debug!(component = %slot.key(), attempt, "Identity collision, retrying");
                }
            }
        }

        warn!(route = %route, "Exhausted component identity attempts");
        Err(RenderError::IdentityExhausted {
            attempts: MAX_IDENTITY_ATTEMPTS,
        })
    }

    /// Whether two handles refer to the same context.
    #[must_use]
    pub fn same(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn instances(&self) -> &InstanceCache {
        &self.inner.instances
    }

    pub(crate) fn downgrade(&self) -> WeakContext {
        WeakContext {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("state", &self.inner.state)
            .field("components", &self.inner.components.len())
            .field("instances", &self.inner.instances.len())
            .finish()
    }
}

/// A non-owning context handle, held by component instances so the context
/// and its instance cache can be dropped together.
#[derive(Clone)]
pub(crate) struct WeakContext {
    inner: Weak<ContextInner>,
}

impl WeakContext {
    pub(crate) fn upgrade(&self) -> Result<Context, RenderError> {
        self.inner
            .upgrade()
            .map(|inner| Context { inner })
            .ok_or(RenderError::ContextDropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_generated_identity_shape() {
        let id = generate_identity();
        assert_eq!(id.as_str().len(), IDENTITY_LENGTH);
        assert!(id
            .as_str()
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
    }

    #[test]
    fn test_minted_identities_are_unique() {
        let context = Context::new();
        let ids: HashSet<_> = (0..500)
            .map(|_| context.mint("/todo").unwrap())
            .collect();

        assert_eq!(ids.len(), 500);
        assert_eq!(context.component_count(), 500);
    }

    #[test]
    fn test_mint_retries_past_collisions() {
        let context = Context::new();
        context.mint_with("/a", || ComponentId::from("aaaaaa")).unwrap();

        let mut candidates = vec!["bbbbbb", "aaaaaa", "aaaaaa"];
        let id = context
            .mint_with("/b", || ComponentId::from(candidates.pop().unwrap()))
            .unwrap();

        assert_eq!(id.as_str(), "bbbbbb");
        assert_eq!(context.route_of(&id).as_deref(), Some("/b"));
    }

    #[test]
    fn test_mint_gives_up_after_bounded_attempts() {
        let context = Context::new();
        context.mint_with("/a", || ComponentId::from("aaaaaa")).unwrap();

        let err = context
            .mint_with("/a", || ComponentId::from("aaaaaa"))
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::IdentityExhausted {
                attempts: MAX_IDENTITY_ATTEMPTS
            }
        ));
        assert_eq!(context.component_count(), 1);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut state = Query::new();
        state.insert("page".to_string(), json!("2"));
        let context = Context::with_state(state);
        let id = context.mint("/todo").unwrap();

        let snapshot = context.snapshot();
        let text = serde_json::to_string(&snapshot).unwrap();
        let restored = Context::restore(serde_json::from_str(&text).unwrap());

        assert_eq!(restored.route_of(&id).as_deref(), Some("/todo"));
        assert_eq!(restored.state()["page"], json!("2"));
        assert!(!restored.same(&context));
    }

    #[test]
    fn test_forget() {
        let context = Context::new();
        let id = context.mint("/todo").unwrap();

        assert_eq!(context.forget(&id).as_deref(), Some("/todo"));
        assert!(context.route_of(&id).is_none());
    }

    #[test]
    fn test_weak_context_expires() {
        let context = Context::new();
        let weak = context.downgrade();
        assert!(weak.upgrade().unwrap().same(&context));

        drop(context);
        assert!(matches!(weak.upgrade(), Err(RenderError::ContextDropped)));
    }
}
