//! Integer-handle indirection for host objects
//!
//! Native code is never given a host reference. It gets a `u64` handle into
//! one of these maps, and the host side resolves the handle back when the
//! native side calls in. Handles are issued from a monotonic counter and are
//! never reused; a lookup after removal fails with a typed stale-handle
//! error rather than resolving to the wrong object.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ConvertError;

/// Handle value that is never issued. Useful as an "absent" marker.
pub const NULL_HANDLE: u64 = 0;

/// A map from opaque `u64` handles to host objects.
pub struct HandleMap<T> {
    entries: Mutex<HashMap<u64, T>>,
    next_handle: AtomicU64,
}

impl<T> HandleMap<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            // 0 is reserved as NULL_HANDLE
            next_handle: AtomicU64::new(1),
        }
    }

    /// Store a value and return its freshly issued handle.
    pub fn insert(&self, value: T) -> u64 {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(handle, value);
        handle
    }

    /// Look up a handle without consuming it.
    pub fn get(&self, handle: u64) -> Result<T, ConvertError>
    where
        T: Clone,
    {
        self.lock()
            .get(&handle)
            .cloned()
            .ok_or(ConvertError::StaleHandle(handle))
    }

    /// Remove a handle, returning its value.
    pub fn remove(&self, handle: u64) -> Result<T, ConvertError> {
        self.lock()
            .remove(&handle)
            .ok_or(ConvertError::StaleHandle(handle))
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, T>> {
        // A panicking insert cannot leave the map half-mutated, so a
        // poisoned lock is still a consistent map.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> Default for HandleMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
