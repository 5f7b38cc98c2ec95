//! Ownership-transferring byte buffers
//!
//! A `NativeBuffer` is a byte range owned by exactly one side at a time.
//! Nothing is ever aliased across the boundary: host→native copies into a
//! fresh native allocation, native→host copies into host memory and then
//! frees the native allocation. The copy-then-free ordering is mandatory;
//! freeing first is a use-after-free, and skipping the free leaks one
//! allocation per call.
//!
//! The `hb_buffer_*` entry points are the allocation surface native code
//! calls directly. Allocation and release are counted so tests can assert
//! the exactly-one-alloc/one-free pairing per transfer.

use std::alloc::{self, Layout};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::ConvertError;
use crate::ffi::status::{CALL_STATUS_OK, CALL_STATUS_PANIC, CallStatus};

static LIVE_BUFFERS: AtomicUsize = AtomicUsize::new(0);
static TOTAL_ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);
static TOTAL_FREES: AtomicUsize = AtomicUsize::new(0);

/// Allocation accounting snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    /// Native buffers currently alive.
    pub live: usize,
    /// Total non-empty allocations since process start.
    pub allocations: usize,
    /// Total frees since process start.
    pub frees: usize,
}

/// Snapshot the native-buffer accounting counters.
pub fn buffer_stats() -> BufferStats {
    BufferStats {
        live: LIVE_BUFFERS.load(Ordering::SeqCst),
        allocations: TOTAL_ALLOCATIONS.load(Ordering::SeqCst),
        frees: TOTAL_FREES.load(Ordering::SeqCst),
    }
}

/// A native-owned byte buffer.
///
/// Layout is fixed so native code can pass it by value. `capacity` and `len`
/// are `i32` because the boundary's length prefix type is `i32`; both are
/// always non-negative, and `data` is null exactly when `capacity` is zero.
#[repr(C)]
#[derive(Debug)]
pub struct NativeBuffer {
    capacity: i32,
    len: i32,
    data: *mut u8,
}

impl NativeBuffer {
    /// A zero-capacity buffer. Allocates nothing and needs no free.
    pub const fn empty() -> Self {
        Self {
            capacity: 0,
            len: 0,
            data: ptr::null_mut(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Allocate an uninitialized buffer of the given capacity.
    ///
    /// Fails only if the capacity cannot be represented in the boundary's
    /// `i32` length type.
    pub fn allocate(capacity: usize) -> Result<Self, ConvertError> {
        if capacity > i32::MAX as usize {
            return Err(ConvertError::BufferOverflow {
                requested: capacity,
            });
        }
        if capacity == 0 {
            return Ok(Self::empty());
        }
        let layout = Self::layout(capacity);
        let data = unsafe { alloc::alloc(layout) };
        if data.is_null() {
            alloc::handle_alloc_error(layout);
        }
        LIVE_BUFFERS.fetch_add(1, Ordering::SeqCst);
        TOTAL_ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            capacity: capacity as i32,
            len: 0,
            data,
        })
    }

    /// Host→native transfer: copy host bytes into a fresh native allocation.
    ///
    /// The caller must not assume the source slice is still needed after the
    /// call; the native callee may consume and free its private copy.
    pub fn from_host_bytes(bytes: &[u8]) -> Result<Self, ConvertError> {
        let mut buf = Self::allocate(bytes.len())?;
        if !bytes.is_empty() {
            // Safety: `data` was just allocated with capacity `bytes.len()`
            // and does not overlap the source.
            unsafe {
                ptr::copy_nonoverlapping(bytes.as_ptr(), buf.data, bytes.len());
            }
        }
        buf.len = bytes.len() as i32;
        Ok(buf)
    }

    /// Native→host transfer: copy the bytes out into host memory, then free
    /// the native allocation. Copy-then-free; never the reverse.
    pub fn into_host_bytes(self) -> Vec<u8> {
        let bytes = self.as_slice().to_vec();
        self.free();
        bytes
    }

    /// View the initialized bytes.
    pub fn as_slice(&self) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        // Safety: `data` points at a live allocation of at least `len`
        // initialized bytes; both invariants are maintained by construction.
        unsafe { std::slice::from_raw_parts(self.data, self.len as usize) }
    }

    /// Release the native allocation. Exactly one release per allocation.
    pub fn free(self) {
        if self.data.is_null() {
            return;
        }
        // Safety: `data` came from `alloc` with this exact layout and has
        // not been freed; consuming `self` prevents a second free from safe
        // code.
        unsafe {
            alloc::dealloc(self.data, Self::layout(self.capacity as usize));
        }
        LIVE_BUFFERS.fetch_sub(1, Ordering::SeqCst);
        TOTAL_FREES.fetch_add(1, Ordering::SeqCst);
    }

    fn layout(capacity: usize) -> Layout {
        // Infallible: capacity was already bounds-checked against i32::MAX.
        Layout::array::<u8>(capacity).unwrap_or_else(|_| unreachable!())
    }
}

/// A borrowed byte range owned by the host side.
///
/// Valid only for the duration of the call it is passed to; the native side
/// must copy out of it (see [`hb_buffer_from_bytes`]) rather than retain the
/// pointer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ForeignBytes {
    len: i32,
    data: *const u8,
}

impl ForeignBytes {
    /// Borrow a host slice for the duration of one call.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            len: bytes.len() as i32,
            data: bytes.as_ptr(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the borrowed bytes.
    ///
    /// # Safety
    /// The host memory this was created from must still be live; callers may
    /// only use this within the call the `ForeignBytes` was passed to.
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        if self.data.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.data, self.len as usize) }
    }
}

// =========================================================================
// Allocation entry points for native code
// =========================================================================

fn status_ok(status: *mut CallStatus) {
    // Safety: native callers pass a valid status pointer; a null check keeps
    // a buggy caller from crashing the allocator paths.
    if let Some(status) = unsafe { status.as_mut() } {
        status.code = CALL_STATUS_OK;
    }
}

fn status_panic(status: *mut CallStatus) {
    // The error buffer stays empty: allocating a message buffer from inside
    // a failed allocation path could not succeed either.
    if let Some(status) = unsafe { status.as_mut() } {
        status.code = CALL_STATUS_PANIC;
    }
}

/// Allocate a native buffer of `size` bytes.
#[unsafe(no_mangle)]
pub extern "C" fn hb_buffer_alloc(size: i32, status: *mut CallStatus) -> NativeBuffer {
    if size < 0 {
        status_panic(status);
        return NativeBuffer::empty();
    }
    match NativeBuffer::allocate(size as usize) {
        Ok(buf) => {
            status_ok(status);
            buf
        }
        Err(_) => {
            status_panic(status);
            NativeBuffer::empty()
        }
    }
}

/// Copy a borrowed host byte range into a fresh native buffer.
#[unsafe(no_mangle)]
pub extern "C" fn hb_buffer_from_bytes(bytes: ForeignBytes, status: *mut CallStatus) -> NativeBuffer {
    // Safety: per the ForeignBytes contract the range is live for this call.
    let slice = unsafe { bytes.as_slice() };
    match NativeBuffer::from_host_bytes(slice) {
        Ok(buf) => {
            status_ok(status);
            buf
        }
        Err(_) => {
            status_panic(status);
            NativeBuffer::empty()
        }
    }
}

/// Release a native buffer.
#[unsafe(no_mangle)]
pub extern "C" fn hb_buffer_free(buf: NativeBuffer, status: *mut CallStatus) {
    buf.free();
    status_ok(status);
}
