//! Bridge entries for text, buffers, compounds and references
//!
//! Text and byte buffers cross the boundary as whole native buffers; inside
//! a serialized value they carry an `i32` length prefix. Options, sequences
//! and records always cross as serialized buffers, composed from the entries
//! of their element and field types. Callback and object references cross as
//! opaque 64-bit handles so native code never holds a host reference.

use std::marker::PhantomData;

use crate::convert::{
    BufferReader, BufferWriter, ValueBridge, lift_from_buffer, lower_into_buffer, read_len_prefix,
    write_len_prefix,
};
use crate::error::ConvertError;
use crate::ffi::buffer::NativeBuffer;
use crate::host::value::HostValue;

/// Bridge entry for UTF-8 text.
///
/// Text converts via byte copy, never through native string types, so the
/// two sides' string encodings stay out of the contract. A top-level string
/// is the whole buffer; an embedded one is length-prefixed.
pub struct BridgeString;

impl ValueBridge for BridgeString {
    type NativeType = NativeBuffer;

    fn to_host(native: NativeBuffer) -> Result<HostValue, ConvertError> {
        let bytes = native.into_host_bytes();
        String::from_utf8(bytes)
            .map(HostValue::String)
            .map_err(|_| ConvertError::InvalidUtf8)
    }

    fn from_host(value: &HostValue) -> Result<NativeBuffer, ConvertError> {
        match value {
            HostValue::String(s) => NativeBuffer::from_host_bytes(s.as_bytes()),
            other => Err(ConvertError::WrongType {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }

    fn read(reader: &mut BufferReader<'_>) -> Result<HostValue, ConvertError> {
        let len = read_len_prefix(reader)?;
        let bytes = reader.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(|s| HostValue::String(s.to_string()))
            .map_err(|_| ConvertError::InvalidUtf8)
    }

    fn write(value: &HostValue, writer: &mut BufferWriter) -> Result<(), ConvertError> {
        match value {
            HostValue::String(s) => {
                write_len_prefix(s.len(), writer)?;
                writer.write_bytes(s.as_bytes());
                Ok(())
            }
            other => Err(ConvertError::WrongType {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }

    fn allocation_size(value: &HostValue) -> Result<usize, ConvertError> {
        match value {
            HostValue::String(s) => Ok(4 + s.len()),
            other => Err(ConvertError::WrongType {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }
}

/// Bridge entry for opaque byte buffers.
pub struct BridgeBytes;

impl ValueBridge for BridgeBytes {
    type NativeType = NativeBuffer;

    fn to_host(native: NativeBuffer) -> Result<HostValue, ConvertError> {
        Ok(HostValue::Bytes(native.into_host_bytes()))
    }

    fn from_host(value: &HostValue) -> Result<NativeBuffer, ConvertError> {
        match value {
            HostValue::Bytes(bytes) => NativeBuffer::from_host_bytes(bytes),
            other => Err(ConvertError::WrongType {
                expected: "bytes",
                found: other.type_name(),
            }),
        }
    }

    fn read(reader: &mut BufferReader<'_>) -> Result<HostValue, ConvertError> {
        let len = read_len_prefix(reader)?;
        let bytes = reader.read_bytes(len)?;
        Ok(HostValue::Bytes(bytes.to_vec()))
    }

    fn write(value: &HostValue, writer: &mut BufferWriter) -> Result<(), ConvertError> {
        match value {
            HostValue::Bytes(bytes) => {
                write_len_prefix(bytes.len(), writer)?;
                writer.write_bytes(bytes);
                Ok(())
            }
            other => Err(ConvertError::WrongType {
                expected: "bytes",
                found: other.type_name(),
            }),
        }
    }

    fn allocation_size(value: &HostValue) -> Result<usize, ConvertError> {
        match value {
            HostValue::Bytes(bytes) => Ok(4 + bytes.len()),
            other => Err(ConvertError::WrongType {
                expected: "bytes",
                found: other.type_name(),
            }),
        }
    }
}

/// Bridge entry for optional values. Serialized as a presence flag byte
/// followed by the inner value; the absent value is host `Undefined`.
pub struct BridgeOption<B>(PhantomData<B>);

impl<B: ValueBridge> ValueBridge for BridgeOption<B> {
    type NativeType = NativeBuffer;

    fn to_host(native: NativeBuffer) -> Result<HostValue, ConvertError> {
        lift_from_buffer::<Self>(native)
    }

    fn from_host(value: &HostValue) -> Result<NativeBuffer, ConvertError> {
        lower_into_buffer::<Self>(value)
    }

    fn read(reader: &mut BufferReader<'_>) -> Result<HostValue, ConvertError> {
        match reader.read_bytes(1)?[0] {
            0 => Ok(HostValue::Undefined),
            1 => B::read(reader),
            other => Err(ConvertError::UnexpectedCase(other as i32)),
        }
    }

    fn write(value: &HostValue, writer: &mut BufferWriter) -> Result<(), ConvertError> {
        if value.is_undefined() {
            writer.write_bytes(&[0]);
            Ok(())
        } else {
            writer.write_bytes(&[1]);
            B::write(value, writer)
        }
    }

    fn allocation_size(value: &HostValue) -> Result<usize, ConvertError> {
        if value.is_undefined() {
            Ok(1)
        } else {
            Ok(1 + B::allocation_size(value)?)
        }
    }
}

/// Bridge entry for sequences. Serialized as an `i32` count followed by the
/// elements.
pub struct BridgeVec<B>(PhantomData<B>);

impl<B: ValueBridge> ValueBridge for BridgeVec<B> {
    type NativeType = NativeBuffer;

    fn to_host(native: NativeBuffer) -> Result<HostValue, ConvertError> {
        lift_from_buffer::<Self>(native)
    }

    fn from_host(value: &HostValue) -> Result<NativeBuffer, ConvertError> {
        lower_into_buffer::<Self>(value)
    }

    fn read(reader: &mut BufferReader<'_>) -> Result<HostValue, ConvertError> {
        let count = read_len_prefix(reader)?;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(B::read(reader)?);
        }
        Ok(HostValue::Array(items))
    }

    fn write(value: &HostValue, writer: &mut BufferWriter) -> Result<(), ConvertError> {
        match value {
            HostValue::Array(items) => {
                write_len_prefix(items.len(), writer)?;
                for item in items {
                    B::write(item, writer)?;
                }
                Ok(())
            }
            other => Err(ConvertError::WrongType {
                expected: "array",
                found: other.type_name(),
            }),
        }
    }

    fn allocation_size(value: &HostValue) -> Result<usize, ConvertError> {
        match value {
            HostValue::Array(items) => {
                let mut size = 4;
                for item in items {
                    size += B::allocation_size(item)?;
                }
                Ok(size)
            }
            other => Err(ConvertError::WrongType {
                expected: "array",
                found: other.type_name(),
            }),
        }
    }
}

/// Object-safe view of a bridge entry, for composing record converters at
/// runtime from per-field entries.
pub trait FieldBridge {
    fn read(&self, reader: &mut BufferReader<'_>) -> Result<HostValue, ConvertError>;
    fn write(&self, value: &HostValue, writer: &mut BufferWriter) -> Result<(), ConvertError>;
    fn allocation_size(&self, value: &HostValue) -> Result<usize, ConvertError>;
}

/// Adapter from a static [`ValueBridge`] entry to a [`FieldBridge`] value.
pub struct Entry<B>(PhantomData<B>);

impl<B> Entry<B> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<B> Default for Entry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ValueBridge> FieldBridge for Entry<B> {
    fn read(&self, reader: &mut BufferReader<'_>) -> Result<HostValue, ConvertError> {
        B::read(reader)
    }

    fn write(&self, value: &HostValue, writer: &mut BufferWriter) -> Result<(), ConvertError> {
        B::write(value, writer)
    }

    fn allocation_size(&self, value: &HostValue) -> Result<usize, ConvertError> {
        B::allocation_size(value)
    }
}

/// A field-by-field record converter.
///
/// One of these exists per struct type, listing the fields in declaration
/// order; the interface code generator emits them as statics. Nested
/// records compose because `RecordBridge` is itself a [`FieldBridge`].
pub struct RecordBridge {
    type_name: &'static str,
    fields: &'static [(&'static str, &'static (dyn FieldBridge + Sync))],
}

impl RecordBridge {
    pub const fn new(
        type_name: &'static str,
        fields: &'static [(&'static str, &'static (dyn FieldBridge + Sync))],
    ) -> Self {
        Self { type_name, fields }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Consume a native buffer holding exactly one serialized record.
    pub fn lift(&self, native: NativeBuffer) -> Result<HostValue, ConvertError> {
        let bytes = native.into_host_bytes();
        let mut reader = BufferReader::new(&bytes);
        let value = FieldBridge::read(self, &mut reader)?;
        reader.finish()?;
        Ok(value)
    }

    /// Serialize a record value into a fresh native buffer.
    pub fn lower(&self, value: &HostValue) -> Result<NativeBuffer, ConvertError> {
        let mut writer = BufferWriter::with_capacity(self.allocation_size(value)?);
        FieldBridge::write(self, value, &mut writer)?;
        NativeBuffer::from_host_bytes(writer.as_bytes())
    }

    fn field_value<'a>(
        &self,
        value: &'a HostValue,
        name: &'static str,
    ) -> Result<&'a HostValue, ConvertError> {
        let fields = match value {
            HostValue::Record(fields) => fields,
            other => {
                return Err(ConvertError::WrongType {
                    expected: self.type_name,
                    found: other.type_name(),
                });
            }
        };
        fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
            .ok_or(ConvertError::MissingField(name))
    }
}

impl FieldBridge for RecordBridge {
    fn read(&self, reader: &mut BufferReader<'_>) -> Result<HostValue, ConvertError> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for (name, bridge) in self.fields {
            fields.push((name.to_string(), bridge.read(reader)?));
        }
        Ok(HostValue::Record(fields))
    }

    fn write(&self, value: &HostValue, writer: &mut BufferWriter) -> Result<(), ConvertError> {
        for (name, bridge) in self.fields {
            bridge.write(self.field_value(value, name)?, writer)?;
        }
        Ok(())
    }

    fn allocation_size(&self, value: &HostValue) -> Result<usize, ConvertError> {
        let mut size = 0;
        for (name, bridge) in self.fields {
            size += bridge.allocation_size(self.field_value(value, name)?)?;
        }
        Ok(size)
    }
}

macro_rules! handle_bridge {
    ($name:ident, $arm:ident, $label:expr, $(#[$doc:meta])*) => {
        $(#[$doc])*
        pub struct $name;

        impl ValueBridge for $name {
            type NativeType = u64;

            fn to_host(native: u64) -> Result<HostValue, ConvertError> {
                if native == 0 {
                    return Err(ConvertError::NullPointer);
                }
                Ok(HostValue::$arm(native))
            }

            fn from_host(value: &HostValue) -> Result<u64, ConvertError> {
                match value {
                    HostValue::$arm(0) => Err(ConvertError::NullPointer),
                    HostValue::$arm(handle) => Ok(*handle),
                    other => Err(ConvertError::WrongType {
                        expected: $label,
                        found: other.type_name(),
                    }),
                }
            }

            fn read(reader: &mut BufferReader<'_>) -> Result<HostValue, ConvertError> {
                let bytes = reader.read_bytes(8)?;
                Self::to_host(u64::from_be_bytes(bytes.try_into().unwrap_or([0; 8])))
            }

            fn write(value: &HostValue, writer: &mut BufferWriter) -> Result<(), ConvertError> {
                let native = Self::from_host(value)?;
                writer.write_bytes(&native.to_be_bytes());
                Ok(())
            }

            fn allocation_size(_value: &HostValue) -> Result<usize, ConvertError> {
                Ok(8)
            }
        }
    };
}

handle_bridge!(
    BridgeCallback,
    Callback,
    "callback",
    /// Bridge entry for callback references: an opaque handle into a
    /// host-side handle map, so native code never holds the host function.
);

handle_bridge!(
    BridgeObject,
    Pointer,
    "pointer",
    /// Bridge entry for native object references. The host side wraps the
    /// address in a destructible resource; only the raw address crosses.
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::scalars::{BridgeF64, BridgeI32, BridgeU32};
    use crate::test_util::serial;

    #[test]
    fn test_string_whole_buffer_round_trip() {
        let _guard = serial();
        let host = HostValue::String("grüße".to_string());
        let native = BridgeString::from_host(&host).unwrap();
        assert_eq!(BridgeString::to_host(native).unwrap(), host);
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        let _guard = serial();
        let native = NativeBuffer::from_host_bytes(&[0xff, 0xfe]).unwrap();
        assert_eq!(
            BridgeString::to_host(native),
            Err(ConvertError::InvalidUtf8)
        );
    }

    #[test]
    fn test_embedded_string_is_length_prefixed() {
        let host = HostValue::String("ab".to_string());
        let mut writer = BufferWriter::new();
        BridgeString::write(&host, &mut writer).unwrap();
        assert_eq!(writer.as_bytes(), &[0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn test_bytes_round_trip() {
        let _guard = serial();
        let host = HostValue::Bytes(vec![0, 1, 2, 0xff]);
        let native = BridgeBytes::from_host(&host).unwrap();
        assert_eq!(BridgeBytes::to_host(native).unwrap(), host);
    }

    #[test]
    fn test_option_round_trip() {
        let _guard = serial();
        for host in [HostValue::Undefined, HostValue::Number(7.0)] {
            let native = BridgeOption::<BridgeI32>::from_host(&host).unwrap();
            assert_eq!(BridgeOption::<BridgeI32>::to_host(native).unwrap(), host);
        }
    }

    #[test]
    fn test_vec_round_trip() {
        let _guard = serial();
        let host = HostValue::Array(vec![
            HostValue::Number(1.0),
            HostValue::Number(2.0),
            HostValue::Number(3.0),
        ]);
        let native = BridgeVec::<BridgeU32>::from_host(&host).unwrap();
        assert_eq!(BridgeVec::<BridgeU32>::to_host(native).unwrap(), host);
    }

    static F64_FIELD: Entry<BridgeF64> = Entry::new();
    static POINT: RecordBridge =
        RecordBridge::new("Point", &[("x", &F64_FIELD), ("y", &F64_FIELD)]);

    fn point(x: f64, y: f64) -> HostValue {
        HostValue::Record(vec![
            ("x".to_string(), HostValue::Number(x)),
            ("y".to_string(), HostValue::Number(y)),
        ])
    }

    #[test]
    fn test_record_round_trip() {
        let _guard = serial();
        let host = point(1.5, -2.5);
        let native = POINT.lower(&host).unwrap();
        assert_eq!(POINT.lift(native).unwrap(), host);
    }

    #[test]
    fn test_record_missing_field() {
        let host = HostValue::Record(vec![("x".to_string(), HostValue::Number(0.0))]);
        let mut writer = BufferWriter::new();
        assert_eq!(
            FieldBridge::write(&POINT, &host, &mut writer),
            Err(ConvertError::MissingField("y"))
        );
    }

    static POINT_FIELD: Entry<BridgeOption<BridgeI32>> = Entry::new();
    static NESTED: RecordBridge = RecordBridge::new(
        "Nested",
        &[("origin", &POINT), ("weight", &POINT_FIELD)],
    );

    #[test]
    fn test_nested_record_round_trip() {
        let _guard = serial();
        let host = HostValue::Record(vec![
            ("origin".to_string(), point(0.0, 1.0)),
            ("weight".to_string(), HostValue::Undefined),
        ]);
        let native = NESTED.lower(&host).unwrap();
        assert_eq!(NESTED.lift(native).unwrap(), host);
    }

    #[test]
    fn test_handle_bridges() {
        assert_eq!(
            BridgeCallback::to_host(9).unwrap(),
            HostValue::Callback(9)
        );
        assert_eq!(
            BridgeCallback::from_host(&HostValue::Callback(9)).unwrap(),
            9
        );
        assert_eq!(BridgeObject::to_host(0), Err(ConvertError::NullPointer));
        assert_eq!(
            BridgeObject::from_host(&HostValue::Pointer(0)),
            Err(ConvertError::NullPointer)
        );
    }

    #[test]
    fn test_lift_rejects_trailing_bytes() {
        let _guard = serial();
        let native = NativeBuffer::from_host_bytes(&[0, 0, 0, 1, 0xff]).unwrap();
        assert_eq!(
            lift_from_buffer::<BridgeI32>(native),
            Err(ConvertError::IncompleteData { remaining: 1 })
        );
    }
}
