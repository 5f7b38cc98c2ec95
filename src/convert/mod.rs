//! Type-indexed value conversion between native and host representations
//!
//! One [`ValueBridge`] entry exists per semantic type. Each entry is a pure
//! pair of functions between a native representation and a [`HostValue`],
//! plus the serialized form used when the type travels inside a byte buffer
//! (compound types always travel that way). Entries hold no state and retain
//! no references past their own call.
//!
//! Serialized layout follows the boundary convention: big-endian fixed-width
//! scalars, `i32` length prefixes for text, bytes and sequences.

pub mod composite;
pub mod scalars;

pub use composite::{
    BridgeBytes, BridgeCallback, BridgeObject, BridgeOption, BridgeString, BridgeVec, Entry,
    FieldBridge, RecordBridge,
};
pub use scalars::{
    BridgeBool, BridgeF32, BridgeF64, BridgeI8, BridgeI16, BridgeI32, BridgeI64, BridgeU8,
    BridgeU16, BridgeU32, BridgeU64,
};

use crate::error::ConvertError;
use crate::ffi::buffer::NativeBuffer;
use crate::host::value::HostValue;

/// A bidirectional converter for one semantic type.
///
/// `to_host`/`from_host` cross the call boundary directly; `read`/`write`
/// handle the same type embedded in a serialized buffer. Conversions are
/// total over well-formed input and fail with a typed [`ConvertError`]
/// otherwise, always before any native call executes.
pub trait ValueBridge {
    /// The representation native code sees for this type.
    type NativeType;

    fn to_host(native: Self::NativeType) -> Result<HostValue, ConvertError>;

    fn from_host(value: &HostValue) -> Result<Self::NativeType, ConvertError>;

    fn read(reader: &mut BufferReader<'_>) -> Result<HostValue, ConvertError>;

    fn write(value: &HostValue, writer: &mut BufferWriter) -> Result<(), ConvertError>;

    /// Serialized size of `value`, used to size the receiving allocation.
    fn allocation_size(value: &HostValue) -> Result<usize, ConvertError>;
}

/// Consume a native buffer and deserialize one value of type `B` from it.
///
/// The whole buffer must be the value: trailing bytes are a conversion
/// error. The buffer's native allocation is freed by the copy-out.
pub fn lift_from_buffer<B: ValueBridge>(buf: NativeBuffer) -> Result<HostValue, ConvertError> {
    let bytes = buf.into_host_bytes();
    let mut reader = BufferReader::new(&bytes);
    let value = B::read(&mut reader)?;
    reader.finish()?;
    Ok(value)
}

/// Serialize one value of type `B` into a fresh native buffer.
pub fn lower_into_buffer<B: ValueBridge>(value: &HostValue) -> Result<NativeBuffer, ConvertError> {
    let size = B::allocation_size(value)?;
    let mut writer = BufferWriter::with_capacity(size);
    B::write(value, &mut writer)?;
    NativeBuffer::from_host_bytes(writer.as_bytes())
}

/// Cursor over a host-side copy of serialized bytes.
pub struct BufferReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Take the next `count` bytes, failing on a short buffer.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], ConvertError> {
        let end = self
            .offset
            .checked_add(count)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(ConvertError::BufferOverflow { requested: count })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    /// Assert the value consumed the whole buffer.
    pub fn finish(&self) -> Result<(), ConvertError> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(ConvertError::IncompleteData { remaining }),
        }
    }
}

/// Growable serialization sink.
pub struct BufferWriter {
    bytes: Vec<u8>,
}

impl BufferWriter {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Default for BufferWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Write an `i32` length prefix, failing if the length does not fit.
pub(crate) fn write_len_prefix(len: usize, writer: &mut BufferWriter) -> Result<(), ConvertError> {
    let len = i32::try_from(len).map_err(|_| ConvertError::BufferOverflow { requested: len })?;
    writer.write_bytes(&len.to_be_bytes());
    Ok(())
}

/// Read an `i32` length prefix, rejecting negative lengths.
pub(crate) fn read_len_prefix(reader: &mut BufferReader<'_>) -> Result<usize, ConvertError> {
    let bytes = reader.read_bytes(4)?;
    let len = i32::from_be_bytes(bytes.try_into().unwrap_or([0; 4]));
    usize::try_from(len).map_err(|_| ConvertError::BufferOverflow { requested: 0 })
}
