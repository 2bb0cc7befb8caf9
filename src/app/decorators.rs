//! Instance and request decorators.
//!
//! Instance decorators run once, at the call, against the application's
//! [`Attachments`]. Request decorators are stored and run against every
//! request context before its middleware chain starts.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatch::RequestContext;

/// Keyed store of typed values.
///
/// Backs both instance decorations and per-request attachments. Values are
/// looked up by key and downcast to the requested type.
#[derive(Clone, Default)]
pub struct Attachments {
    map: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `key`, replacing any previous value.
    pub fn insert<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.map.insert(key.into(), Arc::new(value));
    }

    /// Value under `key` if it exists and has type `T`.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.map.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Shared handle to the value under `key`.
    ///
    /// Useful for callable attachments that need the context mutably.
    pub fn get_arc<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.map
            .get(key)
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.map.remove(key).is_some()
    }

    /// Copy every entry of `other` over this store.
    pub fn extend(&mut self, other: &Attachments) {
        for (key, value) in &other.map {
            self.map.insert(key.clone(), Arc::clone(value));
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for Attachments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}

/// Function applied to each new request context.
pub type RequestDecoratorFn = Arc<dyn Fn(&mut RequestContext) + Send + Sync>;

/// Decorations owned by one application.
#[derive(Clone, Default)]
pub struct DecoratorRegistry {
    instance: Attachments,
    request: Vec<RequestDecoratorFn>,
}

impl DecoratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `f` to the instance decorations now.
    pub fn decorate<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Attachments),
    {
        f(&mut self.instance);
    }

    /// Store `f` for every request created from now on.
    pub fn decorate_request<F>(&mut self, f: F)
    where
        F: Fn(&mut RequestContext) + Send + Sync + 'static,
    {
        self.request.push(Arc::new(f));
    }

    pub fn instance(&self) -> &Attachments {
        &self.instance
    }

    pub fn request_decorators(&self) -> &[RequestDecoratorFn] {
        &self.request
    }
}

impl std::fmt::Debug for DecoratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoratorRegistry")
            .field("instance", &self.instance)
            .field("request", &self.request.len())
            .finish()
    }
}
