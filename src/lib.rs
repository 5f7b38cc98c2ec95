//! Runtime bridge between native code and a single-threaded dynamic host
//!
//! This crate is the runtime half of a binding layer: everything that does
//! not depend on a particular interface description. The pieces:
//!
//! - `convert` - type-indexed value conversion between the two sides
//! - `ffi` - byte buffers and call-status signaling across the boundary
//! - `invoker` - marshaling host calls from arbitrary native threads
//! - `callback` - stable function pointers over swappable host state
//! - `vtable` - process-scoped storage for callback-interface tables
//! - `resource` - explicit release of native resources, decoupled from GC
//! - `future` - poll-based continuations resolving host promises
//! - `host` - the dynamic value model, namespaces and the host run loop
//!
//! Per-type converter specializations, callback shape declarations and
//! vtable layouts are produced ahead of time by an interface code generator
//! and consume the machinery here; hand-written stand-ins for generated
//! output live alongside the tests.

pub mod callback;
pub mod convert;
pub mod error;
pub mod ffi;
pub mod future;
pub mod host;
pub mod invoker;
pub mod resource;
pub mod vtable;

pub mod scenario_tests;
#[cfg(test)]
pub(crate) mod test_util;

pub use callback::{CallbackCell, ContinuationFn, MethodFn};
pub use convert::ValueBridge;
pub use error::{ConvertError, HostError};
pub use ffi::{CallStatus, ForeignBytes, NativeBuffer, host_call, host_call_with_error};
pub use host::{HostRuntime, HostValue, ModuleNamespace};
pub use invoker::CallInvoker;
pub use resource::NativeResource;
pub use vtable::VtableRegistry;
