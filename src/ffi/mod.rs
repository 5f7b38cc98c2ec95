//! The raw boundary: byte buffers and call-status signaling.

pub mod buffer;
pub mod status;

pub use buffer::{BufferStats, ForeignBytes, NativeBuffer, buffer_stats};
pub use buffer::{hb_buffer_alloc, hb_buffer_free, hb_buffer_from_bytes};
pub use status::{CALL_STATUS_ERROR, CALL_STATUS_OK, CALL_STATUS_PANIC};
pub use status::{CallStatus, host_call, host_call_with_error};
