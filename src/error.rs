//! Error taxonomy for the bridge boundary
//!
//! Three kinds of failure cross the boundary:
//! - conversion failures, raised before any native call executes
//! - recoverable native errors, carried in a call status with a payload
//! - native invariant violations (panics), surfaced as fatal errors
//!
//! A fourth kind, the stale-callback invocation, is deliberately *not* an
//! error: a callback invoked after its module has been torn down returns an
//! inert default (see `callback`). Liveness faults (a blocking invocation
//! whose task is never serviced) are the run-loop owner's responsibility and
//! are not detected here.

use thiserror::Error;

use crate::host::value::HostValue;

/// A failure to convert between a host value and a native representation.
///
/// Conversion happens before the native call executes, so a conversion
/// failure never leaves native state partially mutated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
    /// The host value had the wrong dynamic type for the requested entry.
    #[error("expected {expected}, found {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },

    /// A host number was not an integer where an integer type was requested.
    #[error("number {value} is not an integer")]
    NotAnInteger { value: f64 },

    /// An integer did not fit the requested fixed-width native type.
    #[error("value out of range for {ty}")]
    OutOfRange { ty: &'static str },

    /// A byte range crossing the boundary was not valid UTF-8.
    #[error("byte range is not valid UTF-8")]
    InvalidUtf8,

    /// Reading the requested value would read past the end of the buffer.
    #[error("reading {requested} bytes would read past the end of the buffer")]
    BufferOverflow { requested: usize },

    /// The buffer still had data after reading its containing value.
    #[error("buffer has {remaining} trailing bytes after its containing value")]
    IncompleteData { remaining: usize },

    /// A record value was missing a declared field.
    #[error("record is missing field `{0}`")]
    MissingField(&'static str),

    /// A raw discriminant did not match any declared case.
    #[error("raw value {0} does not match any declared case")]
    UnexpectedCase(i32),

    /// A null pointer crossed the boundary where an object was expected.
    #[error("raw pointer value was null")]
    NullPointer,

    /// A handle referred to an object that has already been dropped.
    #[error("handle {0} is stale; its object has already been dropped")]
    StaleHandle(u64),
}

/// An error surfaced to host code from a native call.
///
/// `Call` is the recoverable case and carries the decoded error payload;
/// host-side handlers are expected to match on it. `Panic` signals a broken
/// native invariant and is intentionally a separate variant so that handlers
/// scoped to `Call` never absorb it.
#[derive(Debug, Error)]
pub enum HostError {
    /// Recoverable native error: the callee set the error status code and
    /// attached a structured payload.
    #[error("{message}")]
    Call {
        message: String,
        payload: HostValue,
    },

    /// The callee reported an error but the call site registered no error
    /// converter for the payload.
    #[error("native call failed but no error converter was registered")]
    UnexpectedCallError,

    /// Native invariant violation, optionally carrying a diagnostic message.
    ///
    /// Not meant to be caught by ordinary error handling; resuming on top of
    /// a broken native invariant is worse than failing loudly.
    #[error("native panic: {0}")]
    Panic(String),

    /// The callee wrote a status code this crate does not know about.
    #[error("unexpected call status code {0}")]
    UnexpectedStatusCode(i8),

    /// The named module is not registered with the host runtime.
    #[error("no module named `{0}` is registered")]
    MissingModule(String),

    /// The module namespace has no function with the given name.
    #[error("namespace has no function named `{0}`")]
    MissingFunction(String),

    /// A native-call wrapper was invoked with the wrong number of arguments.
    #[error("`{function}` expects {expected} arguments, got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },

    /// A conversion failed at the boundary, before the native call ran.
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

impl HostError {
    /// True for the recoverable `Call` case only.
    ///
    /// Handlers that want "catch expected native errors, let defects
    /// propagate" should gate on this.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Call { .. })
    }
}
