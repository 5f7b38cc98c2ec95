//! Concrete callback shapes
//!
//! One `extern "C"` function and one cell per declared callback shape; the
//! interface code generator would emit these per interface. Two shapes live
//! here: the future-continuation shape (non-blocking convention) used by the
//! async bridge, and a vtable method shape (blocking convention) that copies
//! its result back through an out-pointer the native caller reads
//! synchronously.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::callback::CallbackCell;
use crate::error::HostError;
use crate::ffi::buffer::{ForeignBytes, NativeBuffer};
use crate::ffi::status::CallStatus;
use crate::host::handles::HandleMap;
use crate::invoker::CallInvoker;

/// Raw-pointer wrapper for crossing into the host-thread task.
///
/// Safety rests on the blocking convention: the native caller parks inside
/// `invoke_blocking` until the task completes, so the pointee outlives the
/// task and is not concurrently accessed.
struct SendPtr<T>(*mut T);

// Safety: see the type-level comment; only used under the blocking
// convention.
unsafe impl<T> Send for SendPtr<T> {}

// =========================================================================
// Future-continuation shape (non-blocking)
// =========================================================================

/// The function-pointer type native asynchronous runtimes call exactly once
/// per poll: `(continuation handle, poll status)`.
pub type ContinuationFn = extern "C" fn(continuation: u64, poll_result: i8);

/// Captured state for the continuation shape.
#[derive(Clone)]
pub struct ContinuationState {
    pub invoker: Arc<CallInvoker>,
    /// One entry per in-flight poll, keyed by the continuation handle the
    /// native side echoes back. Per-future identity lives in the handle,
    /// not in this adapter.
    pub continuations: Arc<HandleMap<oneshot::Sender<i8>>>,
}

static CONTINUATION_CELL: CallbackCell<ContinuationState> =
    CallbackCell::new("future-continuation");

extern "C" fn continuation_callback(continuation: u64, poll_result: i8) {
    // After cleanup there is no host to wake; dropping the signal is the
    // defined teardown behavior.
    let Some(state) = CONTINUATION_CELL.get() else {
        return;
    };
    let continuations = Arc::clone(&state.continuations);
    state.invoker.invoke_non_blocking(move || {
        // A missing handle means the poll was already answered; the native
        // side guarantees at-most-once per handle, so this is teardown skew,
        // not a protocol fault.
        if let Ok(sender) = continuations.remove(continuation) {
            let _ = sender.send(poll_result);
        }
    });
}

/// Get the continuation function pointer, capturing state on first use.
/// Idempotent per shape: every caller gets the same pointer.
pub fn make_continuation_callback(state: ContinuationState) -> ContinuationFn {
    CONTINUATION_CELL.arm(state);
    continuation_callback
}

/// Invalidate the continuation shape at host-runtime teardown.
pub fn cleanup_continuation_callback() {
    CONTINUATION_CELL.cleanup();
}

// =========================================================================
// Vtable method shape (blocking)
// =========================================================================

/// The function-pointer type for a vtable method: the target object's
/// handle, serialized arguments, an out-pointer for the serialized return
/// value, and the call status.
pub type MethodFn = extern "C" fn(
    target: u64,
    args: ForeignBytes,
    out_return: *mut NativeBuffer,
    status: *mut CallStatus,
);

/// Host-side dispatch for the method shape: resolves the target handle and
/// runs the host implementation over serialized arguments.
pub type MethodHandler = Arc<dyn Fn(u64, &[u8]) -> Result<Vec<u8>, HostError> + Send + Sync>;

/// Captured state for the method shape.
#[derive(Clone)]
pub struct MethodState {
    pub invoker: Arc<CallInvoker>,
    pub handler: MethodHandler,
}

static METHOD_CELL: CallbackCell<MethodState> = CallbackCell::new("vtable-method");

extern "C" fn method_callback(
    target: u64,
    args: ForeignBytes,
    out_return: *mut NativeBuffer,
    status: *mut CallStatus,
) {
    let Some(state) = METHOD_CELL.get() else {
        // Teardown path: leave the out-pointer and status untouched and
        // return the shape's default. Native destructor chains hit this.
        return;
    };

    // The argument range is only guaranteed for this call; copy it before
    // crossing threads.
    // Safety: per the ForeignBytes contract the range is live right now.
    let args: Vec<u8> = unsafe { args.as_slice() }.to_vec();
    let out_return = SendPtr(out_return);
    let status = SendPtr(status);
    let handler = Arc::clone(&state.handler);

    state.invoker.invoke_blocking(move || {
        let outcome = catch_unwind(AssertUnwindSafe(|| handler(target, &args)));
        // Safety: blocking convention; the native caller is parked, so both
        // pointers are valid and exclusively ours for the task's duration.
        unsafe { write_method_result(outcome, out_return, status) };
    });
}

/// Copy the host outcome back into the native caller's memory.
///
/// A panic in the host handler still reaches the native caller as a panic
/// status rather than unwinding across the boundary, so the caller can
/// release whatever it was holding.
unsafe fn write_method_result(
    outcome: Result<Result<Vec<u8>, HostError>, Box<dyn Any + Send>>,
    out_return: SendPtr<NativeBuffer>,
    status: SendPtr<CallStatus>,
) {
    match outcome {
        Ok(Ok(bytes)) => {
            if let Some(out) = unsafe { out_return.0.as_mut() } {
                if let Ok(buf) = NativeBuffer::from_host_bytes(&bytes) {
                    *out = buf;
                }
            }
        }
        Ok(Err(error)) => {
            if let Some(status) = unsafe { status.0.as_mut() } {
                match error {
                    HostError::Call { message, .. } => status.set_error(message.as_bytes()),
                    other => status.set_panic(&other.to_string()),
                }
            }
        }
        Err(_panic) => {
            if let Some(status) = unsafe { status.0.as_mut() } {
                status.set_panic("host callback panicked");
            }
        }
    }
}

/// Get the method function pointer, capturing dispatch state on first use.
pub fn make_method_callback(state: MethodState) -> MethodFn {
    METHOD_CELL.arm(state);
    method_callback
}

/// Invalidate the method shape at host-runtime teardown.
pub fn cleanup_method_callback() {
    METHOD_CELL.cleanup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::status::{CALL_STATUS_ERROR, CALL_STATUS_OK, CALL_STATUS_PANIC};
    use crate::host::value::HostValue;
    use crate::test_util::serial;

    fn invoke_method(
        method: MethodFn,
        target: u64,
        args: &[u8],
    ) -> (NativeBuffer, CallStatus) {
        let mut out_return = NativeBuffer::empty();
        let mut status = CallStatus::new();
        method(target, ForeignBytes::from_slice(args), &mut out_return, &mut status);
        (out_return, status)
    }

    fn echo_state(invoker: Arc<CallInvoker>) -> MethodState {
        MethodState {
            invoker,
            handler: Arc::new(|target: u64, args: &[u8]| {
                let mut out = target.to_be_bytes().to_vec();
                out.extend_from_slice(args);
                Ok(out)
            }),
        }
    }

    #[test]
    fn test_method_shape_returns_result_synchronously() {
        let _guard = serial();
        cleanup_method_callback();
        let invoker = CallInvoker::new();
        let method = make_method_callback(echo_state(Arc::clone(&invoker)));

        // Same pointer on repeated construction.
        let again = make_method_callback(echo_state(Arc::clone(&invoker)));
        assert!(std::ptr::fn_addr_eq(method, again));

        // Host thread: runs inline through invoke_blocking.
        let (out, status) = invoke_method(method, 5, b"xy");
        assert_eq!(status.code, CALL_STATUS_OK);
        let mut expected = 5u64.to_be_bytes().to_vec();
        expected.extend_from_slice(b"xy");
        assert_eq!(out.into_host_bytes(), expected);
        cleanup_method_callback();
    }

    #[test]
    fn test_method_shape_reports_host_errors() {
        let _guard = serial();
        cleanup_method_callback();
        let invoker = CallInvoker::new();
        let method = make_method_callback(MethodState {
            invoker,
            handler: Arc::new(|_: u64, _: &[u8]| {
                Err(HostError::Call {
                    message: "denied".to_string(),
                    payload: HostValue::String("denied".to_string()),
                })
            }),
        });
        let (out, status) = invoke_method(method, 1, &[]);
        assert_eq!(status.code, CALL_STATUS_ERROR);
        assert_eq!(status.error_buf.into_host_bytes(), b"denied");
        assert!(out.is_empty());
        cleanup_method_callback();
    }

    #[test]
    fn test_method_shape_catches_host_panics() {
        let _guard = serial();
        cleanup_method_callback();
        let invoker = CallInvoker::new();
        let method = make_method_callback(MethodState {
            invoker,
            handler: Arc::new(|_: u64, _: &[u8]| panic!("handler blew up")),
        });
        let (_, status) = invoke_method(method, 1, &[]);
        assert_eq!(status.code, CALL_STATUS_PANIC);
        assert_eq!(status.error_buf.into_host_bytes(), b"host callback panicked");
        cleanup_method_callback();
    }

    #[test]
    fn test_inert_method_shape_returns_default() {
        let _guard = serial();
        cleanup_method_callback();
        let invoker = CallInvoker::new();
        let method = make_method_callback(echo_state(invoker));
        cleanup_method_callback();

        // Repeated invocation after cleanup: no write, no status change,
        // no crash.
        for _ in 0..3 {
            let (out, status) = invoke_method(method, 9, b"ignored");
            assert!(out.is_empty());
            assert_eq!(status.code, CALL_STATUS_OK);
        }
    }
}
