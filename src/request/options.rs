use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::DebugLiteral;

pub(crate) type OptionValue = Arc<dyn Any + Send + Sync>;

/// How strictly the request's HTTP version should be honoured when a
/// connection is negotiated.
///
/// Stored in the request's [`http::Extensions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VersionPolicy {
    /// Use the requested version or downgrade to a lower one.
    #[default]
    OrLower,

    /// Use the requested version or upgrade to a higher one.
    OrHigher,

    /// Use exactly the requested version.
    Exact,
}

impl VersionPolicy {
    /// The policy attached to a request, if one was set.
    pub fn of<B>(request: &http::Request<B>) -> Option<Self> {
        request.extensions().get::<Self>().copied()
    }
}

/// Out-of-band values attached to a request, keyed by name.
///
/// Values may be of any `Send + Sync` type. They are held behind an [`Arc`]
/// and never mutated by this crate, so a cloned request shares values with
/// the original but owns its own map: adding or removing entries on one
/// request is not visible on the other.
///
/// Stored in the request's [`http::Extensions`].
#[derive(Clone, Default)]
pub struct RequestOptions {
    entries: HashMap<String, OptionValue>,
}

impl RequestOptions {
    /// Create an empty set of options.
    pub fn new() -> Self {
        Self::default()
    }

    /// The options attached to a request, if any were set.
    pub fn of<B>(request: &http::Request<B>) -> Option<&Self> {
        request.extensions().get::<Self>()
    }

    /// The options attached to a request, attaching an empty set first if needed.
    pub fn of_mut<B>(request: &mut http::Request<B>) -> &mut Self {
        request.extensions_mut().get_or_insert_default::<Self>()
    }

    /// Set `key` to `value`, replacing any existing value.
    ///
    /// Returns true if a previous value was replaced.
    pub fn insert<T>(&mut self, key: impl Into<String>, value: T) -> bool
    where
        T: Any + Send + Sync,
    {
        self.entries.insert(key.into(), Arc::new(value)).is_some()
    }

    /// Add `value` under `key` only if the key is not already present.
    ///
    /// Returns true if the value was added.
    pub fn try_add<T>(&mut self, key: impl Into<String>, value: T) -> bool
    where
        T: Any + Send + Sync,
    {
        self.try_add_shared(key.into(), || Arc::new(value))
    }

    pub(crate) fn try_add_shared<F>(&mut self, key: String, value: F) -> bool
    where
        F: FnOnce() -> OptionValue,
    {
        match self.entries.entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(value());
                true
            }
        }
    }

    /// Get the value stored under `key`, if it exists and has type `T`.
    pub fn get<T>(&self, key: &str) -> Option<&T>
    where
        T: Any,
    {
        self.entries.get(key).and_then(|value| value.downcast_ref())
    }

    /// Is there a value stored under `key`?
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove the value stored under `key`. Returns true if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Are there no options?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the option keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.entries.iter()
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.keys().map(|key| (key, DebugLiteral("..."))))
            .finish()
    }
}
