//! Stable function pointers backed by swappable host state
//!
//! Native code wants a plain function pointer; the logic behind it needs
//! captured state (the host function and the call invoker). Function
//! pointers cannot capture, so each callback *shape* gets one long-lived
//! indirection cell: the `extern "C"` function reads through the cell at
//! call time, and construction/teardown swap what the cell holds.
//!
//! Cell lifecycle:
//!
//! ```text
//! Uninitialized --arm--> Active --cleanup--> Inert --arm--> Active ...
//! ```
//!
//! Repeated `arm` while `Active` keeps the existing capture: the same shape
//! is requested once per outstanding operation, and all of them share one
//! function pointer. A call through the pointer while the cell is not
//! `Active` returns a default value immediately instead of touching torn-
//! down host state; that happens routinely when teardown-triggered native
//! destructors fire callbacks, and it must never raise.

pub mod shapes;

pub use shapes::{
    ContinuationFn, ContinuationState, MethodFn, MethodHandler, MethodState,
    cleanup_continuation_callback, cleanup_method_callback, make_continuation_callback,
    make_method_callback,
};

use std::sync::Mutex;

/// What a cell currently holds.
enum CellState<S> {
    /// Never armed; no module instance has constructed this shape yet.
    Uninitialized,
    /// Armed with captured host state.
    Active(S),
    /// Cleaned up at host-runtime teardown; calls return defaults.
    Inert,
}

/// One indirection cell per callback shape.
///
/// Declared as a `static` next to its shape's `extern "C"` function, which
/// keeps the function pointer's address stable across arm/cleanup cycles.
pub struct CallbackCell<S> {
    name: &'static str,
    state: Mutex<CellState<S>>,
}

impl<S: Clone> CallbackCell<S> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(CellState::Uninitialized),
        }
    }

    /// Capture host state. If the cell is already active the existing
    /// capture wins, so repeated construction for the same shape is
    /// idempotent and the issued function pointer stays valid.
    pub fn arm(&self, state: S) {
        let mut guard = self.lock();
        match &*guard {
            CellState::Active(_) => {}
            CellState::Uninitialized | CellState::Inert => *guard = CellState::Active(state),
        }
    }

    /// Swap the capture for an inert marker. Called exactly once per
    /// host-runtime teardown; the function pointer stays callable and
    /// returns defaults from here until a re-arm.
    pub fn cleanup(&self) {
        *self.lock() = CellState::Inert;
    }

    /// Snapshot the capture, or `None` when the cell is not active.
    ///
    /// Clones out under a short lock so no host call ever runs inside it.
    pub fn get(&self) -> Option<S> {
        let guard = self.lock();
        match &*guard {
            CellState::Active(state) => Some(state.clone()),
            CellState::Uninitialized | CellState::Inert => {
                drop(guard);
                tracing::debug!(
                    shape = self.name,
                    "callback invoked without live host state; returning default"
                );
                None
            }
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(&*self.lock(), CellState::Active(_))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CellState<S>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static CELL: CallbackCell<u32> = CallbackCell::new("test-shape");

    #[test]
    fn test_cell_lifecycle() {
        let _guard = crate::test_util::serial();
        CELL.cleanup();

        // Inert (or uninitialized): calls see no state.
        assert!(CELL.get().is_none());
        assert!(!CELL.is_active());

        // First arm captures.
        CELL.arm(1);
        assert_eq!(CELL.get(), Some(1));

        // Re-arming while active keeps the first capture.
        CELL.arm(2);
        assert_eq!(CELL.get(), Some(1));

        // Cleanup goes inert; repeated reads stay default and never panic.
        CELL.cleanup();
        assert!(CELL.get().is_none());
        assert!(CELL.get().is_none());

        // Hot reload: a new runtime re-arms the same cell.
        CELL.arm(3);
        assert_eq!(CELL.get(), Some(3));
        CELL.cleanup();
    }
}
