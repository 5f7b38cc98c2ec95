//! Driving native asynchronous operations to host promises
//!
//! Native futures are poll-based: the host hands the native side a
//! continuation callback and a continuation handle, and the native side
//! invokes the callback exactly once per poll, from any thread, with a
//! status word. `FUTURE_POLL_MAYBE_READY` is the host-visible wake event
//! ("poll me again"); `FUTURE_POLL_READY` means the result can be collected
//! through the completion function under the call-status protocol.
//!
//! The continuation callback is one adapter shape, constructed idempotently
//! no matter how many futures are in flight; per-future identity is the
//! continuation handle, tracked native-side.

use std::sync::Arc;

use once_cell::sync::Lazy;
use tokio::sync::oneshot;

use crate::callback::{ContinuationFn, ContinuationState, make_continuation_callback};
use crate::error::{ConvertError, HostError};
use crate::ffi::status::{CallStatus, host_call, host_call_with_error};
use crate::host::handles::HandleMap;
use crate::host::promise::PromiseSettler;
use crate::host::value::HostValue;
use crate::invoker::CallInvoker;

/// The native future's result is ready for collection.
pub const FUTURE_POLL_READY: i8 = 0;
/// Wake event: the future made progress, poll again.
pub const FUTURE_POLL_MAYBE_READY: i8 = 1;

/// The in-flight poll registrations, keyed by continuation handle.
///
/// Process-scoped for the same reason the vtable registry is: a poll
/// answered during runtime teardown must find a map to miss in, not a
/// dangling one.
pub fn continuations() -> &'static Arc<HandleMap<oneshot::Sender<i8>>> {
    static CONTINUATIONS: Lazy<Arc<HandleMap<oneshot::Sender<i8>>>> =
        Lazy::new(|| Arc::new(HandleMap::new()));
    &CONTINUATIONS
}

/// Drive one native asynchronous operation to completion.
///
/// `start` obtains the native future handle; `poll` registers one
/// continuation per round; `complete` collects the result through the
/// call-status protocol once ready; `lift` is the dedicated bridge entry for
/// the result type; `free` releases the native future. The free runs exactly
/// once, on success and on every error path.
///
/// Must be awaited on the host run loop: the continuation is delivered as a
/// non-blocking task on the host thread.
pub async fn call_async<F>(
    invoker: Arc<CallInvoker>,
    start: impl FnOnce() -> u64,
    poll: impl Fn(u64, ContinuationFn, u64),
    complete: impl FnOnce(u64, &mut CallStatus) -> F,
    lift: impl FnOnce(F) -> Result<HostValue, ConvertError>,
    free: impl FnOnce(u64),
    error_handler: Option<fn(Vec<u8>) -> HostError>,
) -> Result<HostValue, HostError> {
    let future = start();
    let outcome = drive(&invoker, future, poll, complete, lift, error_handler).await;
    free(future);
    outcome
}

async fn drive<F>(
    invoker: &Arc<CallInvoker>,
    future: u64,
    poll: impl Fn(u64, ContinuationFn, u64),
    complete: impl FnOnce(u64, &mut CallStatus) -> F,
    lift: impl FnOnce(F) -> Result<HostValue, ConvertError>,
    error_handler: Option<fn(Vec<u8>) -> HostError>,
) -> Result<HostValue, HostError> {
    loop {
        let (sender, receiver) = oneshot::channel();
        let handle = continuations().insert(sender);
        let callback = make_continuation_callback(ContinuationState {
            invoker: Arc::clone(invoker),
            continuations: Arc::clone(continuations()),
        });
        poll(future, callback, handle);

        let poll_result = receiver.await.map_err(|_| {
            HostError::Panic("native future dropped its continuation".to_string())
        })?;
        if poll_result == FUTURE_POLL_READY {
            break;
        }
        // Anything else is a wake event; register a fresh continuation.
    }

    let lowered = match error_handler {
        Some(handler) => host_call_with_error(handler, |status| complete(future, status))?,
        None => host_call(|status| complete(future, status))?,
    };
    lift(lowered).map_err(HostError::from)
}

/// Like [`call_async`], but settling a host promise instead of returning.
///
/// This is the shape host-visible async wrappers use: the wrapper hands the
/// promise to host code immediately and spawns this on the run loop.
pub async fn settle_async_call<F>(
    settler: PromiseSettler,
    invoker: Arc<CallInvoker>,
    start: impl FnOnce() -> u64,
    poll: impl Fn(u64, ContinuationFn, u64),
    complete: impl FnOnce(u64, &mut CallStatus) -> F,
    lift: impl FnOnce(F) -> Result<HostValue, ConvertError>,
    free: impl FnOnce(u64),
    error_handler: Option<fn(Vec<u8>) -> HostError>,
) {
    match call_async(invoker, start, poll, complete, lift, free, error_handler).await {
        Ok(value) => settler.resolve(value),
        Err(error) => settler.reject(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::cleanup_continuation_callback;
    use crate::convert::BridgeString;
    use crate::convert::ValueBridge;
    use crate::ffi::buffer::NativeBuffer;
    use crate::host::runtime::HostRuntime;
    use crate::test_util::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn string_error(payload: Vec<u8>) -> HostError {
        let message = String::from_utf8_lossy(&payload).into_owned();
        HostError::Call {
            payload: HostValue::String(message.clone()),
            message,
        }
    }

    #[test]
    fn test_async_call_resolves_after_wake_events() {
        let _guard = serial();
        cleanup_continuation_callback();
        let runtime = HostRuntime::new().unwrap();
        let invoker = Arc::clone(runtime.invoker());

        let polls = Arc::new(AtomicUsize::new(0));
        let frees = Arc::new(AtomicUsize::new(0));

        let poll_count = Arc::clone(&polls);
        let free_count = Arc::clone(&frees);
        let result = runtime.block_on(call_async(
            invoker,
            || 42,
            move |future, callback, continuation| {
                assert_eq!(future, 42);
                // First poll reports progress, second reports ready; both
                // answered from a non-host thread.
                let round = poll_count.fetch_add(1, Ordering::SeqCst);
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(2));
                    let status = if round == 0 {
                        FUTURE_POLL_MAYBE_READY
                    } else {
                        FUTURE_POLL_READY
                    };
                    callback(continuation, status);
                });
            },
            |_future, _status: &mut CallStatus| {
                NativeBuffer::from_host_bytes(b"native result").unwrap()
            },
            |buf| BridgeString::to_host(buf),
            move |_future| {
                free_count.fetch_add(1, Ordering::SeqCst);
            },
            None,
        ));

        assert_eq!(result.unwrap(), HostValue::String("native result".to_string()));
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert_eq!(frees.load(Ordering::SeqCst), 1);
        assert!(continuations().is_empty());
        cleanup_continuation_callback();
    }

    #[test]
    fn test_async_call_error_path_still_frees() {
        let _guard = serial();
        cleanup_continuation_callback();
        let runtime = HostRuntime::new().unwrap();
        let invoker = Arc::clone(runtime.invoker());

        let frees = Arc::new(AtomicUsize::new(0));
        let free_count = Arc::clone(&frees);
        let result = runtime.block_on(call_async(
            invoker,
            || 7,
            |_future, callback, continuation| {
                thread::spawn(move || callback(continuation, FUTURE_POLL_READY));
            },
            |_future, status: &mut CallStatus| {
                status.set_error(b"bad input");
            },
            |_| Ok(HostValue::Undefined),
            move |_future| {
                free_count.fetch_add(1, Ordering::SeqCst);
            },
            Some(string_error),
        ));

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "bad input");
        assert!(err.is_recoverable());
        assert_eq!(frees.load(Ordering::SeqCst), 1);
        cleanup_continuation_callback();
    }

    #[test]
    fn test_promise_settles_from_spawned_async_call() {
        let _guard = serial();
        cleanup_continuation_callback();
        let runtime = HostRuntime::new().unwrap();
        let invoker = Arc::clone(runtime.invoker());
        let (promise, settler) = crate::host::promise::promise();

        let result = runtime.block_on(async move {
            // The wrapper shape: hand the promise out, spawn the drive.
            tokio::task::spawn_local(settle_async_call(
                settler,
                invoker,
                || 3,
                |_future, callback, continuation| {
                    thread::spawn(move || callback(continuation, FUTURE_POLL_READY));
                },
                |_future, _status: &mut CallStatus| {
                    NativeBuffer::from_host_bytes(b"spawned").unwrap()
                },
                |buf| BridgeString::to_host(buf),
                |_future| {},
                None,
            ));
            promise.settled().await
        });
        assert_eq!(result.unwrap(), HostValue::String("spawned".to_string()));
        cleanup_continuation_callback();
    }
}
