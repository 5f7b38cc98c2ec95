//! Dynamic namespace objects exposed to host code
//!
//! Each bridged module presents itself to the host as a namespace: a table
//! of named wrapper functions. Every wrapper owns its whole crossing:
//! argument conversion, the native call with its status, and return-value
//! conversion. The namespace also collects the module's cleanup hooks,
//! which the host runtime runs at unregistration so the module's callback
//! cells go inert before the host context disappears.

use std::collections::HashMap;

use crate::error::HostError;
use crate::host::value::HostValue;

/// A native-call wrapper as seen by host code.
pub type HostFn = Box<dyn Fn(&[HostValue]) -> Result<HostValue, HostError>>;

struct NamespaceEntry {
    arity: usize,
    func: HostFn,
}

/// A string-keyed table of native-call wrapper functions.
pub struct ModuleNamespace {
    name: String,
    entries: HashMap<String, NamespaceEntry>,
    cleanup_hooks: Vec<Box<dyn FnOnce()>>,
}

impl ModuleNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
            cleanup_hooks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Define a wrapper function. Redefining a name replaces the previous
    /// definition.
    pub fn define<F>(&mut self, name: impl Into<String>, arity: usize, func: F)
    where
        F: Fn(&[HostValue]) -> Result<HostValue, HostError> + 'static,
    {
        self.entries.insert(
            name.into(),
            NamespaceEntry {
                arity,
                func: Box::new(func),
            },
        );
    }

    /// Register a hook to run when the module is unregistered from the host
    /// runtime. Modules use this to clean up their callback cells.
    pub fn on_cleanup<F>(&mut self, hook: F)
    where
        F: FnOnce() + 'static,
    {
        self.cleanup_hooks.push(Box::new(hook));
    }

    /// Invoke a wrapper function by name, checking arity first.
    pub fn call(&self, function: &str, args: &[HostValue]) -> Result<HostValue, HostError> {
        let entry = self
            .entries
            .get(function)
            .ok_or_else(|| HostError::MissingFunction(function.to_string()))?;
        if args.len() != entry.arity {
            return Err(HostError::Arity {
                function: function.to_string(),
                expected: entry.arity,
                got: args.len(),
            });
        }
        (entry.func)(args)
    }

    /// The defined function names, unordered.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub(crate) fn run_cleanup(&mut self) {
        for hook in self.cleanup_hooks.drain(..) {
            hook();
        }
    }
}
