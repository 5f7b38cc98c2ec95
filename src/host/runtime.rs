//! The single-threaded host run loop
//!
//! The host runtime owns the thread that all host-side execution happens on.
//! It holds the cross-thread call invoker, drains its queue between turns of
//! host code, and drives host promises to settlement. Everything here is
//! cooperative: host tasks run to completion, and native threads that need
//! host execution marshal through the invoker rather than calling in
//! directly.
//!
//! Liveness: a native thread blocked in `invoke_blocking` stays blocked
//! until this loop services the queue. Owning a `HostRuntime` means owning
//! that obligation.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use crate::error::HostError;
use crate::host::namespace::ModuleNamespace;
use crate::host::value::HostValue;
use crate::invoker::CallInvoker;

/// A host runtime instance: one host thread, one invoker, one set of
/// registered module namespaces.
///
/// Construct it on the thread that will run host code; the invoker records
/// that thread's identity at construction.
pub struct HostRuntime {
    invoker: Arc<CallInvoker>,
    namespaces: HashMap<String, ModuleNamespace>,
    rt: tokio::runtime::Runtime,
}

impl HostRuntime {
    pub fn new() -> io::Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        Ok(Self {
            invoker: CallInvoker::new(),
            namespaces: HashMap::new(),
            rt,
        })
    }

    /// The invoker native threads must use to reach this runtime's thread.
    pub fn invoker(&self) -> &Arc<CallInvoker> {
        &self.invoker
    }

    /// Expose a module namespace to host code. Registering a namespace with
    /// an already-registered name replaces it (the old module's cleanup
    /// hooks run first).
    pub fn register_namespace(&mut self, namespace: ModuleNamespace) {
        if let Some(mut old) = self.namespaces.remove(namespace.name()) {
            old.run_cleanup();
        }
        self.namespaces.insert(namespace.name().to_string(), namespace);
    }

    /// Tear a module down: run its cleanup hooks (callback cells go inert)
    /// and drop its namespace. Native code may still hold the module's
    /// function pointers afterwards; calls through them return defaults.
    pub fn unregister_namespace(&mut self, name: &str) {
        if let Some(mut namespace) = self.namespaces.remove(name) {
            namespace.run_cleanup();
        }
    }

    /// Invoke a native-call wrapper by module and function name.
    pub fn call(
        &self,
        module: &str,
        function: &str,
        args: &[HostValue],
    ) -> Result<HostValue, HostError> {
        let namespace = self
            .namespaces
            .get(module)
            .ok_or_else(|| HostError::MissingModule(module.to_string()))?;
        namespace.call(function, args)
    }

    /// Run a future on the host thread while servicing the invoker queue.
    ///
    /// Tasks that native threads enqueue (continuations, blocking callback
    /// bodies) execute here, interleaved with the future, in FIFO order.
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: std::future::Future,
    {
        let local = tokio::task::LocalSet::new();
        let invoker = Arc::clone(&self.invoker);
        local.spawn_local(async move {
            loop {
                invoker.wait_for_tasks().await;
                invoker.drain();
            }
        });
        self.rt.block_on(local.run_until(future))
    }

    /// Service the queue once, synchronously. For host code that owns its
    /// own loop structure and only needs the pending tasks run.
    pub fn drain_now(&self) -> usize {
        self.invoker.drain()
    }
}
