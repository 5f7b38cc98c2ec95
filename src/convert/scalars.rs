//! Bridge entries for the scalar types
//!
//! Small integers and floats ride the host's native numeric representation.
//! 64-bit integers do not: a host number is an IEEE 754 double with 53 bits
//! of integer precision, so they ride the host's arbitrary-precision integer
//! instead and stay round-trip exact across the full range.

use crate::convert::{BufferReader, BufferWriter, ValueBridge};
use crate::error::ConvertError;
use crate::host::value::HostValue;

macro_rules! small_int_bridge {
    ($name:ident, $ty:ty, $bytes:expr, $label:expr) => {
        #[doc = concat!("Bridge entry for `", $label, "`, via the host number type.")]
        pub struct $name;

        impl ValueBridge for $name {
            type NativeType = $ty;

            fn to_host(native: $ty) -> Result<HostValue, ConvertError> {
                // Lossless: every value of this width is exact in an f64.
                Ok(HostValue::Number(native as f64))
            }

            fn from_host(value: &HostValue) -> Result<$ty, ConvertError> {
                let n = match value {
                    HostValue::Number(n) => *n,
                    other => {
                        return Err(ConvertError::WrongType {
                            expected: "number",
                            found: other.type_name(),
                        });
                    }
                };
                if !n.is_finite() || n.fract() != 0.0 {
                    return Err(ConvertError::NotAnInteger { value: n });
                }
                if n < <$ty>::MIN as f64 || n > <$ty>::MAX as f64 {
                    return Err(ConvertError::OutOfRange { ty: $label });
                }
                Ok(n as $ty)
            }

            fn read(reader: &mut BufferReader<'_>) -> Result<HostValue, ConvertError> {
                let bytes = reader.read_bytes($bytes)?;
                let native = <$ty>::from_be_bytes(bytes.try_into().unwrap_or([0; $bytes]));
                Self::to_host(native)
            }

            fn write(value: &HostValue, writer: &mut BufferWriter) -> Result<(), ConvertError> {
                let native = Self::from_host(value)?;
                writer.write_bytes(&native.to_be_bytes());
                Ok(())
            }

            fn allocation_size(_value: &HostValue) -> Result<usize, ConvertError> {
                Ok($bytes)
            }
        }
    };
}

small_int_bridge!(BridgeI8, i8, 1, "i8");
small_int_bridge!(BridgeI16, i16, 2, "i16");
small_int_bridge!(BridgeI32, i32, 4, "i32");
small_int_bridge!(BridgeU8, u8, 1, "u8");
small_int_bridge!(BridgeU16, u16, 2, "u16");
small_int_bridge!(BridgeU32, u32, 4, "u32");

macro_rules! big_int_bridge {
    ($name:ident, $ty:ty, $label:expr) => {
        #[doc = concat!("Bridge entry for `", $label, "`, via the host big-int type.")]
        pub struct $name;

        impl ValueBridge for $name {
            type NativeType = $ty;

            fn to_host(native: $ty) -> Result<HostValue, ConvertError> {
                Ok(HostValue::BigInt(native as i128))
            }

            fn from_host(value: &HostValue) -> Result<$ty, ConvertError> {
                let n = match value {
                    HostValue::BigInt(n) => *n,
                    other => {
                        return Err(ConvertError::WrongType {
                            expected: "bigint",
                            found: other.type_name(),
                        });
                    }
                };
                <$ty>::try_from(n).map_err(|_| ConvertError::OutOfRange { ty: $label })
            }

            fn read(reader: &mut BufferReader<'_>) -> Result<HostValue, ConvertError> {
                let bytes = reader.read_bytes(8)?;
                let native = <$ty>::from_be_bytes(bytes.try_into().unwrap_or([0; 8]));
                Self::to_host(native)
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

big_int_bridge!(BridgeI64, i64, "i64");
big_int_bridge!(BridgeU64, u64, "u64");

macro_rules! float_bridge {
    ($name:ident, $ty:ty, $bytes:expr) => {
        #[doc = concat!("Bridge entry for `", stringify!($ty), "`.")]
        pub struct $name;

        impl ValueBridge for $name {
            type NativeType = $ty;

            fn to_host(native: $ty) -> Result<HostValue, ConvertError> {
                Ok(HostValue::Number(native as f64))
            }

            fn from_host(value: &HostValue) -> Result<$ty, ConvertError> {
                match value {
                    // Narrowing to f32 follows the host's own float32 store:
                    // round to nearest, like a typed-array write.
                    HostValue::Number(n) => Ok(*n as $ty),
                    other => Err(ConvertError::WrongType {
                        expected: "number",
                        found: other.type_name(),
                    }),
                }
            }

            fn read(reader: &mut BufferReader<'_>) -> Result<HostValue, ConvertError> {
                let bytes = reader.read_bytes($bytes)?;
                let native = <$ty>::from_be_bytes(bytes.try_into().unwrap_or([0; $bytes]));
                Self::to_host(native)
            }

            fn write(value: &HostValue, writer: &mut BufferWriter) -> Result<(), ConvertError> {
                let native = Self::from_host(value)?;
                writer.write_bytes(&native.to_be_bytes());
                Ok(())
            }

            fn allocation_size(_value: &HostValue) -> Result<usize, ConvertError> {
                Ok($bytes)
            }
        }
    };
}

float_bridge!(BridgeF32, f32, 4);
float_bridge!(BridgeF64, f64, 8);

/// Bridge entry for booleans. Crosses the boundary as a single byte.
pub struct BridgeBool;

impl ValueBridge for BridgeBool {
    type NativeType = i8;

    fn to_host(native: i8) -> Result<HostValue, ConvertError> {
        Ok(HostValue::Boolean(native != 0))
    }

    fn from_host(value: &HostValue) -> Result<i8, ConvertError> {
        match value {
            HostValue::Boolean(b) => Ok(*b as i8),
            other => Err(ConvertError::WrongType {
                expected: "boolean",
                found: other.type_name(),
            }),
        }
    }

    fn read(reader: &mut BufferReader<'_>) -> Result<HostValue, ConvertError> {
        let bytes = reader.read_bytes(1)?;
        Self::to_host(bytes[0] as i8)
    }

    fn write(value: &HostValue, writer: &mut BufferWriter) -> Result<(), ConvertError> {
        let native = Self::from_host(value)?;
        writer.write_bytes(&[native as u8]);
        Ok(())
    }

    fn allocation_size(_value: &HostValue) -> Result<usize, ConvertError> {
        Ok(1)
    }
}
