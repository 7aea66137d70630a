//! Context values readable from any render function.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

/// Type-keyed store of context values.
///
/// Cloning the store is cheap; values are shared, so a render pass can read
/// from a snapshot while the owner keeps accepting new values.
#[derive(Clone, Default)]
pub struct ContextStore {
    values: HashMap<TypeId, Rc<dyn Any>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `value` the current context of type `T`, replacing any previous one.
    pub fn provide<T: Clone + 'static>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Rc::new(value));
    }

    /// Read the current context of type `T`.
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn remove<T: 'static>(&mut self) -> bool {
        self.values.remove(&TypeId::of::<T>()).is_some()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
