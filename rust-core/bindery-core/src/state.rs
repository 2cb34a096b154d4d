//! # Request State
//!
//! Key-value side channel a request's middleware and action share, e.g. the
//! JWT middleware storing the caller's id for the action to read.
//!
//! Values are type-erased; reading with the wrong type yields `None`.

use std::any::Any;
use std::collections::HashMap;

/// Typed values keyed by name, owned by one request
#[derive(Default)]
pub struct Extensions {
    data: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing any previous one under `key`
    pub fn set<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.data.insert(key.into(), Box::new(value));
    }

    /// Borrow the value under `key` if it has type `T`
    #[must_use]
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Mutably borrow the value under `key` if it has type `T`
    pub fn get_mut<T: 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.data
            .get_mut(key)
            .and_then(|boxed| boxed.downcast_mut::<T>())
    }

    /// Whether anything is stored under `key`
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Remove and return the value under `key` if it has type `T`
    pub fn remove<T: 'static>(&mut self, key: &str) -> Option<T> {
        let boxed = self.data.remove(key)?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.data.insert(key.to_string(), other);
                None
            }
        }
    }

    /// Number of stored values
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop every value, keeping the allocation
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}
