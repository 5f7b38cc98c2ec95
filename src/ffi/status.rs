//! Structured outcome signaling for native calls
//!
//! Every fallible native entry point takes a `*mut CallStatus` as its last
//! argument. The callee leaves it untouched on success, or fills in an error
//! code and payload. The host-side wrappers here create a fresh status per
//! call, invoke the callee, and translate the outcome:
//!
//! - `OK` → the return value is converted and handed to host code
//! - `ERROR` → the payload decodes into a catchable, typed host exception
//! - `PANIC` → a fatal error; an ordinary `ERROR` handler never sees it
//!
//! A status is never reused across calls.

use crate::error::HostError;
use crate::ffi::buffer::NativeBuffer;

/// The call completed normally.
pub const CALL_STATUS_OK: i8 = 0;
/// The callee failed in an expected way; the payload carries structured data.
pub const CALL_STATUS_ERROR: i8 = 1;
/// The callee hit a broken invariant; the payload, if any, is a diagnostic.
pub const CALL_STATUS_PANIC: i8 = 2;

/// Out-parameter through which a native callee reports its outcome.
#[repr(C)]
#[derive(Debug)]
pub struct CallStatus {
    pub code: i8,
    pub error_buf: NativeBuffer,
}

impl CallStatus {
    /// A fresh status, created per call by the wrapper.
    pub fn new() -> Self {
        Self {
            code: CALL_STATUS_OK,
            error_buf: NativeBuffer::empty(),
        }
    }

    /// Callee-side helper: report an expected failure with a payload.
    pub fn set_error(&mut self, payload: &[u8]) {
        self.code = CALL_STATUS_ERROR;
        self.error_buf = NativeBuffer::from_host_bytes(payload).unwrap_or_else(|_| NativeBuffer::empty());
    }

    /// Callee-side helper: report an invariant violation with a diagnostic.
    pub fn set_panic(&mut self, message: &str) {
        self.code = CALL_STATUS_PANIC;
        self.error_buf =
            NativeBuffer::from_host_bytes(message.as_bytes()).unwrap_or_else(|_| NativeBuffer::empty());
    }
}

impl Default for CallStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a native call that cannot fail with a typed error.
///
/// An `ERROR` outcome from the callee surfaces as
/// [`HostError::UnexpectedCallError`] since no converter was registered.
pub fn host_call<T>(caller: impl FnOnce(&mut CallStatus) -> T) -> Result<T, HostError> {
    let mut status = CallStatus::new();
    let value = caller(&mut status);
    check_call_status(status, None::<fn(Vec<u8>) -> HostError>)?;
    Ok(value)
}

/// Run a native call whose `ERROR` payload decodes through `error_handler`.
pub fn host_call_with_error<T, H>(
    error_handler: H,
    caller: impl FnOnce(&mut CallStatus) -> T,
) -> Result<T, HostError>
where
    H: FnOnce(Vec<u8>) -> HostError,
{
    let mut status = CallStatus::new();
    let value = caller(&mut status);
    check_call_status(status, Some(error_handler))?;
    Ok(value)
}

fn check_call_status<H>(status: CallStatus, error_handler: Option<H>) -> Result<(), HostError>
where
    H: FnOnce(Vec<u8>) -> HostError,
{
    match status.code {
        CALL_STATUS_OK => Ok(()),
        CALL_STATUS_ERROR => {
            // Consuming the payload frees its native allocation exactly once.
            let payload = status.error_buf.into_host_bytes();
            match error_handler {
                Some(handler) => Err(handler(payload)),
                None => Err(HostError::UnexpectedCallError),
            }
        }
        CALL_STATUS_PANIC => {
            // A callee that panics while building its diagnostic sends an
            // empty buffer; fall back to a generic internal fault.
            let payload = status.error_buf.into_host_bytes();
            if payload.is_empty() {
                Err(HostError::Panic("internal fault in native code".to_string()))
            } else {
                Err(HostError::Panic(
                    String::from_utf8_lossy(&payload).into_owned(),
                ))
            }
        }
        code => {
            status.error_buf.free();
            Err(HostError::UnexpectedStatusCode(code))
        }
    }
}
