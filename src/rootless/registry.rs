//! Native id registry
//!
//! Maps native window or surface ids back to the drawable they back. The
//! registry never owns anything: the server thread registers a drawable when
//! it gains native backing and unregisters it before the backing goes away.
//! Lookups may come from the native event thread, so the map sits behind its
//! own mutex and every call is a short lock, copy, unlock.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error};

use crate::protocol::DrawableId;

/// Thread-safe native id → drawable map
pub struct SurfaceRegistry<K> {
    map: Mutex<HashMap<K, DrawableId>>,
}

impl<K> Default for SurfaceRegistry<K> {
    fn default() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Copy + Eq + Hash + std::fmt::Debug> SurfaceRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<K, DrawableId>> {
        self.map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `id`. An id that is already registered keeps its drawable
    /// and the call returns false.
    pub fn register(&self, id: K, drawable: DrawableId) -> bool {
        let mut map = self.map();
        if let Some(existing) = map.get(&id) {
            error!("{:?} already registered for {:?}", id, existing);
            return false;
        }
        map.insert(id, drawable);
        debug!("Registered {:?} -> {:?}", id, drawable);
        true
    }

    /// Point an existing id at a different drawable
    pub fn rebind(&self, id: K, drawable: DrawableId) {
        self.map().insert(id, drawable);
    }

    pub fn lookup(&self, id: K) -> Option<DrawableId> {
        self.map().get(&id).copied()
    }

    pub fn contains(&self, id: K) -> bool {
        self.map().contains_key(&id)
    }

    pub fn unregister(&self, id: K) -> Option<DrawableId> {
        let removed = self.map().remove(&id);
        if removed.is_some() {
            debug!("Unregistered {:?}", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}
