//! Host-side model: dynamic values, handles, promises, namespaces, and the
//! single-threaded run loop.

pub mod handles;
pub mod namespace;
pub mod promise;
pub mod runtime;
pub mod value;

pub use handles::{HandleMap, NULL_HANDLE};
pub use namespace::ModuleNamespace;
pub use promise::{HostPromise, PromiseSettler, promise};
pub use runtime::HostRuntime;
pub use value::HostValue;
