//! End-to-end bridge scenarios
//!
//! These tests exercise whole crossings: host call in, native work, host
//! result out, with the call status, buffers, callbacks, vtables and
//! teardown behavior all in play. The `extern "C"` functions here stand in
//! for a compiled native module.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    use crate::callback::{
        MethodState, cleanup_method_callback, make_method_callback,
    };
    use crate::convert::{BridgeI32, BridgeString, ValueBridge};
    use crate::error::HostError;
    use crate::ffi::buffer::{ForeignBytes, NativeBuffer, buffer_stats};
    use crate::ffi::status::{CALL_STATUS_OK, CallStatus, host_call, host_call_with_error};
    use crate::host::handles::HandleMap;
    use crate::host::namespace::ModuleNamespace;
    use crate::host::runtime::HostRuntime;
    use crate::host::value::HostValue;
    use crate::resource::NativeResource;
    use crate::test_util::serial;
    use crate::vtable::VtableRegistry;

    // =====================================================================
    // Native test doubles
    // =====================================================================

    /// Repeat a UTF-8 string `times` times. Consumes its copy of the input.
    extern "C" fn native_repeat_string(
        input: NativeBuffer,
        times: i32,
        status: *mut CallStatus,
    ) -> NativeBuffer {
        let bytes = input.into_host_bytes();
        let Ok(text) = std::str::from_utf8(&bytes) else {
            if let Some(status) = unsafe { status.as_mut() } {
                status.set_panic("input was not UTF-8");
            }
            return NativeBuffer::empty();
        };
        if times < 0 {
            if let Some(status) = unsafe { status.as_mut() } {
                status.set_error(b"repeat count must be non-negative");
            }
            return NativeBuffer::empty();
        }
        match NativeBuffer::from_host_bytes(text.repeat(times as usize).as_bytes()) {
            Ok(buf) => buf,
            Err(_) => {
                if let Some(status) = unsafe { status.as_mut() } {
                    status.set_panic("result too large");
                }
                NativeBuffer::empty()
            }
        }
    }

    /// Always fails with a structured payload.
    extern "C" fn native_always_fails(status: *mut CallStatus) -> NativeBuffer {
        if let Some(status) = unsafe { status.as_mut() } {
            status.set_error(b"bad input");
        }
        NativeBuffer::empty()
    }

    /// Always reports a broken invariant.
    extern "C" fn native_corrupted(status: *mut CallStatus) -> NativeBuffer {
        if let Some(status) = unsafe { status.as_mut() } {
            status.set_panic("native state corrupted");
        }
        NativeBuffer::empty()
    }

    static RELEASED_HANDLES: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn native_release(_handle: u64) {
        RELEASED_HANDLES.fetch_add(1, Ordering::SeqCst);
    }

    fn string_error(payload: Vec<u8>) -> HostError {
        let message = String::from_utf8_lossy(&payload).into_owned();
        HostError::Call {
            payload: HostValue::String(message.clone()),
            message,
        }
    }

    /// The namespace a generated module would register for the doubles.
    fn strings_module() -> ModuleNamespace {
        let mut ns = ModuleNamespace::new("strings");
        ns.define("repeat", 2, |args| {
            let times = BridgeI32::from_host(&args[1])?;
            let input = BridgeString::from_host(&args[0])?;
            let result = host_call_with_error(string_error, |status| {
                native_repeat_string(input, times, status)
            })?;
            Ok(BridgeString::to_host(result)?)
        });
        ns.define("always_fails", 0, |_args| {
            let result =
                host_call_with_error(string_error, |status| native_always_fails(status))?;
            Ok(BridgeString::to_host(result)?)
        });
        ns.define("corrupted", 0, |_args| {
            let result = host_call(|status| native_corrupted(status))?;
            Ok(BridgeString::to_host(result)?)
        });
        ns.on_cleanup(cleanup_method_callback);
        ns
    }

    // =====================================================================
    // Scenarios
    // =====================================================================

    #[test]
    fn test_string_repeat_end_to_end() {
        let _guard = serial();
        let mut runtime = HostRuntime::new().unwrap();
        runtime.register_namespace(strings_module());

        let before = buffer_stats();
        let result = runtime
            .call(
                "strings",
                "repeat",
                &[
                    HostValue::String("hello".to_string()),
                    HostValue::Number(3.0),
                ],
            )
            .unwrap();
        assert_eq!(result, HostValue::String("hellohellohello".to_string()));

        // Both crossings balanced their allocations: the lowered argument
        // and the lifted result are each one alloc and one free.
        let after = buffer_stats();
        assert_eq!(after.live, before.live);
        assert_eq!(after.allocations, before.allocations + 2);
        assert_eq!(after.frees, before.frees + 2);
    }

    #[test]
    fn test_failing_call_raises_exact_message() {
        let _guard = serial();
        let mut runtime = HostRuntime::new().unwrap();
        runtime.register_namespace(strings_module());

        let err = runtime.call("strings", "always_fails", &[]).unwrap_err();
        assert_eq!(err.to_string(), "bad input");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_panic_outcome_is_not_a_call_error() {
        let _guard = serial();
        let mut runtime = HostRuntime::new().unwrap();
        runtime.register_namespace(strings_module());

        let err = runtime.call("strings", "corrupted", &[]).unwrap_err();
        assert!(!err.is_recoverable());
        match err {
            HostError::Panic(message) => assert_eq!(message, "native state corrupted"),
            other => panic!("expected a panic outcome, got {other:?}"),
        }
    }

    #[test]
    fn test_conversion_failure_precedes_native_call() {
        let _guard = serial();
        let mut runtime = HostRuntime::new().unwrap();
        runtime.register_namespace(strings_module());

        let before = buffer_stats();
        let err = runtime
            .call(
                "strings",
                "repeat",
                &[HostValue::String("hi".to_string()), HostValue::Number(1.5)],
            )
            .unwrap_err();
        assert!(matches!(err, HostError::Convert(_)));
        // Nothing was lowered, so nothing crossed or leaked.
        assert_eq!(buffer_stats(), before);
    }

    // A callback-interface table as the code generator would lay it out.
    #[repr(C)]
    struct EventHandlerVtable {
        on_event: crate::callback::MethodFn,
        release: extern "C" fn(u64),
    }

    #[test]
    fn test_blocking_vtable_method_from_native_thread() {
        let _guard = serial();
        cleanup_method_callback();

        let runtime = HostRuntime::new().unwrap();
        let targets: Arc<HandleMap<String>> = Arc::new(HandleMap::new());
        let target = targets.insert("alpha".to_string());

        let lookup = Arc::clone(&targets);
        let method = make_method_callback(MethodState {
            invoker: Arc::clone(runtime.invoker()),
            handler: Arc::new(move |handle: u64, args: &[u8]| {
                let name = lookup.get(handle).map_err(HostError::from)?;
                let mut reply = name.into_bytes();
                reply.push(b':');
                reply.extend_from_slice(args);
                Ok(reply)
            }),
        });

        let registry = VtableRegistry::new();
        let vtable = registry.put(
            "event-handler",
            EventHandlerVtable {
                on_event: method,
                release: native_release,
            },
        );

        let done = Arc::new(AtomicBool::new(false));
        let finished = Arc::clone(&done);
        let vtable_addr = vtable as usize;
        let native = thread::spawn(move || {
            // Safety: the registry entry outlives this thread; the test
            // neither replaces nor clears it while we run.
            let vtable = unsafe { &*(vtable_addr as *const EventHandlerVtable) };
            let mut out_return = NativeBuffer::empty();
            let mut status = CallStatus::new();
            (vtable.on_event)(
                target,
                ForeignBytes::from_slice(b"ping"),
                &mut out_return,
                &mut status,
            );
            // The blocking convention: the result is already here.
            assert_eq!(status.code, CALL_STATUS_OK);
            assert_eq!(out_return.into_host_bytes(), b"alpha:ping");
            (vtable.release)(target);
            finished.store(true, Ordering::SeqCst);
        });

        runtime.block_on(async {
            while !done.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        });
        native.join().unwrap();
        assert!(RELEASED_HANDLES.load(Ordering::SeqCst) >= 1);
        cleanup_method_callback();
    }

    #[test]
    fn test_teardown_leaves_native_release_paths_harmless() {
        let _guard = serial();
        cleanup_method_callback();

        let mut runtime = HostRuntime::new().unwrap();
        let targets: Arc<HandleMap<String>> = Arc::new(HandleMap::new());
        let target = targets.insert("beta".to_string());

        let lookup = Arc::clone(&targets);
        let method = make_method_callback(MethodState {
            invoker: Arc::clone(runtime.invoker()),
            handler: Arc::new(move |handle: u64, _args: &[u8]| {
                Ok(lookup.get(handle).map_err(HostError::from)?.into_bytes())
            }),
        });
        let mut ns = ModuleNamespace::new("events");
        ns.on_cleanup(cleanup_method_callback);
        runtime.register_namespace(ns);

        // Wrap a native handle; its release routine fires a callback the way
        // teardown-triggered native destructors do.
        let resource = NativeResource::new(target, move |handle| {
            let mut out_return = NativeBuffer::empty();
            let mut status = CallStatus::new();
            method(handle, ForeignBytes::from_slice(&[]), &mut out_return, &mut status);
            // Inert callback: default result, status untouched, no crash.
            assert!(out_return.is_empty());
            assert_eq!(status.code, CALL_STATUS_OK);
        });

        // Tear the module down first, then release the resource: the exact
        // ordering hot reload produces.
        runtime.unregister_namespace("events");
        resource.destroy();
        assert!(resource.is_destroyed());

        // A second destroy is a no-op.
        resource.destroy();
    }

    #[test]
    fn test_hot_reload_reuses_registry_identifier() {
        let _guard = serial();
        cleanup_method_callback();
        let registry = VtableRegistry::new();

        // First runtime instance.
        {
            let runtime = HostRuntime::new().unwrap();
            let method = make_method_callback(MethodState {
                invoker: Arc::clone(runtime.invoker()),
                handler: Arc::new(|_: u64, _: &[u8]| Ok(b"first".to_vec())),
            });
            let vtable = registry.put(
                "reloadable",
                EventHandlerVtable {
                    on_event: method,
                    release: native_release,
                },
            );
            let mut out_return = NativeBuffer::empty();
            let mut status = CallStatus::new();
            // Safety: entry is live until the clear below.
            unsafe { ((*vtable).on_event)(1, ForeignBytes::from_slice(&[]), &mut out_return, &mut status) };
            assert_eq!(out_return.into_host_bytes(), b"first");

            // Runtime teardown: the cell goes inert, the registry stays.
            cleanup_method_callback();
            assert_eq!(registry.len(), 1);
        }

        // Standing up the replacement instance is the documented moment to
        // clear, and the same identifier then maps to a fresh table.
        registry.clear();
        let runtime = HostRuntime::new().unwrap();
        let method = make_method_callback(MethodState {
            invoker: Arc::clone(runtime.invoker()),
            handler: Arc::new(|_: u64, _: &[u8]| Ok(b"second".to_vec())),
        });
        let vtable = registry.put(
            "reloadable",
            EventHandlerVtable {
                on_event: method,
                release: native_release,
            },
        );
        let mut out_return = NativeBuffer::empty();
        let mut status = CallStatus::new();
        // Safety: fresh entry, neither replaced nor cleared again.
        unsafe { ((*vtable).on_event)(1, ForeignBytes::from_slice(&[]), &mut out_return, &mut status) };
        assert_eq!(out_return.into_host_bytes(), b"second");
        cleanup_method_callback();
    }
}
