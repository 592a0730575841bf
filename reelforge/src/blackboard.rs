//! Session-scoped blackboard state.
//!
//! The blackboard threads stage outputs forward: every stage writes its
//! output under its declared key, and later stages read the keys they
//! declare as inputs. Later writes to the same key overwrite, which is what
//! lets a refinement loop replace a draft in place.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A thread-safe keyed store for one session's pipeline state.
#[derive(Debug, Default)]
pub struct Blackboard {
    data: RwLock<HashMap<String, Value>>,
}

impl Blackboard {
    /// Creates a new empty blackboard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a blackboard from existing data.
    #[must_use]
    pub fn from_data(data: HashMap<String, Value>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Creates a blackboard seeded from an immutable snapshot.
    ///
    /// Used for parallel branches: every sibling starts from the same
    /// pre-branch state and its writes stay private until the barrier.
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self::from_data(snapshot.to_dict())
    }

    /// Gets a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Sets a value, overwriting any previous value under the same key.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.data.write().insert(key.into(), value);
    }

    /// Removes a key, returning its previous value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.write().remove(key)
    }

    /// Merges a batch of writes into the blackboard.
    pub fn merge(&self, writes: HashMap<String, Value>) {
        let mut data = self.data.write();
        for (key, value) in writes {
            data.insert(key, value);
        }
    }

    /// Takes an immutable snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            data: Arc::new(self.data.read().clone()),
        }
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the blackboard is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns all keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }
}

impl Clone for Blackboard {
    fn clone(&self) -> Self {
        Self {
            data: RwLock::new(self.data.read().clone()),
        }
    }
}

/// An immutable, cheaply-clonable view of a blackboard at a point in time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    data: Arc<HashMap<String, Value>>,
}

impl Snapshot {
    /// Gets a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        (*self.data).clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
