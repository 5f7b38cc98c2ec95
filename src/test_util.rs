//! Shared test support.

use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;

static SERIAL: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Serialize tests that touch process-wide state: the buffer accounting
/// counters, the callback cells and the continuation map. A poisoned guard
/// from an earlier failing test is recovered rather than cascaded.
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
