//! Host-visible wrappers for destructible native resources
//!
//! A `NativeResource` pairs one native handle with one release routine and
//! an idempotency guard. Explicit release from host code is the sanctioned
//! reclamation path. The drop path deliberately does *not* run the release
//! routine: host-side finalization has unspecified timing and ordering
//! relative to runtime teardown, and releasing a native resource from a
//! finalizer that may run after the native module is gone is a
//! use-after-free waiting to happen. Dropping without destroying is a leak,
//! reported at debug level, not a fault.

use std::sync::{Mutex, MutexGuard};

use crate::error::ConvertError;

type ReleaseRoutine = Box<dyn FnOnce(u64) + Send>;

/// One native handle, one release routine, released at most once.
pub struct NativeResource {
    handle: u64,
    release: Mutex<Option<ReleaseRoutine>>,
}

impl NativeResource {
    pub fn new<F>(handle: u64, release: F) -> Self
    where
        F: FnOnce(u64) + Send + 'static,
    {
        Self {
            handle,
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// The native handle, refused once the resource has been released.
    ///
    /// Handing out a released handle would let host code pass a dangling
    /// pointer back into native code.
    pub fn handle(&self) -> Result<u64, ConvertError> {
        if self.is_destroyed() {
            return Err(ConvertError::StaleHandle(self.handle));
        }
        Ok(self.handle)
    }

    /// Release the native resource now.
    ///
    /// Safe to call from any thread and safe to call more than once: the
    /// guard hands the release routine to exactly one caller, so an explicit
    /// release racing a late finalizer cannot double-free. The routine runs
    /// outside the lock.
    pub fn destroy(&self) {
        let release = self.lock().take();
        if let Some(release) = release {
            release(self.handle);
        }
    }

    /// Mark the resource released without running the release routine.
    ///
    /// For the case where ownership of the handle was transferred back to
    /// the native side, which will do its own reclamation.
    pub fn mark_destroyed(&self) {
        let _ = self.lock().take();
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ReleaseRoutine>> {
        self.release
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for NativeResource {
    fn drop(&mut self) {
        // No release here, by design. See the module docs.
        if self.is_destroyed() {
            return;
        }
        tracing::debug!(
            handle = self.handle,
            "native resource dropped without explicit destroy; handle not released"
        );
    }
}

impl std::fmt::Debug for NativeResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeResource")
            .field("handle", &self.handle)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
