//! Registry for callback-interface implementation tables
//!
//! Other bridges assume the foreign side keeps each vtable alive and hand
//! the native side a bare pointer. Here the host side is garbage collected,
//! so the registry owns the tables: native code gets a pointer that stays
//! valid even after every host object referencing the interface has been
//! collected.
//!
//! The registry exists for hot reload. When a host runtime is torn down,
//! native drop paths triggered by that teardown may still call through
//! previously issued vtable pointers, so the registry must outlive the
//! runtime instance that populated it. `clear` is therefore only safe while
//! standing up a *replacement* runtime, never at old-instance teardown.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;

type Holder = Box<dyn Any + Send + Sync>;

/// Identifier-keyed storage of callback-interface tables.
pub struct VtableRegistry {
    tables: Mutex<HashMap<String, Holder>>,
}

impl VtableRegistry {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Store a copy of `table` under `identifier` and return a pointer to
    /// the stored copy.
    ///
    /// The pointer is valid until the entry is replaced by a `put` with the
    /// same identifier or the registry is cleared; within those bounds it is
    /// stable no matter what the map does internally, because the table is
    /// boxed. Dereferencing it is the native side's (unsafe) business.
    pub fn put<T: Send + Sync + 'static>(&self, identifier: &str, table: T) -> *const T {
        let boxed = Box::new(table);
        let pointer: *const T = &*boxed;
        self.lock().insert(identifier.to_string(), boxed);
        pointer
    }

    /// Drop every stored table.
    ///
    /// Precondition: no native code may still dereference previously issued
    /// pointers. In practice that means: call this when standing up a new
    /// host runtime instance, after the previous instance (and the native
    /// release callbacks its teardown triggered) is gone. Never call it
    /// during the old instance's teardown.
    pub fn clear(&self) {
        tracing::debug!("clearing vtable registry");
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Holder>> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for VtableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static REGISTRY: Lazy<VtableRegistry> = Lazy::new(VtableRegistry::new);

/// The process-scoped registry. Process lifetime is the point: it outlives
/// every host runtime instance, which is what makes hot reload safe.
pub fn registry() -> &'static VtableRegistry {
    &REGISTRY
}
