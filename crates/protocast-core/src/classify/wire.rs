//! Wire categories and the wire types they encode with.
//!
//! Wire types, as they appear in the low three bits of a field tag:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, maps, packed repeated fields)
//! - 5: I32 (fixed32, sfixed32, float)

use crate::schema::ScalarType;
use std::fmt;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// 32-bit fixed-width
    I32 = 5,
}

impl WireType {
    /// Computes the tag a field with this wire type is encoded with
    pub fn tag(self, field_number: u32) -> u32 {
        (field_number << 3) | self as u32
    }
}

/// Encoding class of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireCategory {
    /// Two's complement or zigzag varint: int32, int64, sint32, sint64
    SignedVarint,
    /// Unsigned varint: uint32, uint64, bool
    UnsignedVarint,
    /// Fixed-width numeric: fixed*, sfixed*, float, double
    FixedWidth,
    /// Length-delimited UTF-8 string
    String,
    /// Length-delimited bytes
    Bytes,
    /// Embedded message
    Message,
    /// Enum, varint encoded
    Enum,
    /// Map, a repeated embedded key/value entry
    Map,
}

impl WireCategory {
    /// Category of a scalar type
    pub fn of_scalar(scalar: ScalarType) -> Self {
        match scalar {
            ScalarType::Int32 | ScalarType::Int64 | ScalarType::Sint32 | ScalarType::Sint64 => {
                WireCategory::SignedVarint
            }
            ScalarType::Uint32 | ScalarType::Uint64 | ScalarType::Bool => {
                WireCategory::UnsignedVarint
            }
            ScalarType::Fixed32
            | ScalarType::Fixed64
            | ScalarType::Sfixed32
            | ScalarType::Sfixed64
            | ScalarType::Float
            | ScalarType::Double => WireCategory::FixedWidth,
            ScalarType::String => WireCategory::String,
            ScalarType::Bytes => WireCategory::Bytes,
        }
    }

    /// Short lowercase name, stable for use in templates
    pub fn as_str(&self) -> &'static str {
        match self {
            WireCategory::SignedVarint => "signed-varint",
            WireCategory::UnsignedVarint => "unsigned-varint",
            WireCategory::FixedWidth => "fixed-width",
            WireCategory::String => "string",
            WireCategory::Bytes => "bytes",
            WireCategory::Message => "message",
            WireCategory::Enum => "enum",
            WireCategory::Map => "map",
        }
    }
}

impl fmt::Display for WireCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire type a scalar is encoded with
pub fn scalar_wire_type(scalar: ScalarType) -> WireType {
    match scalar {
        ScalarType::Fixed64 | ScalarType::Sfixed64 | ScalarType::Double => WireType::I64,
        ScalarType::Fixed32 | ScalarType::Sfixed32 | ScalarType::Float => WireType::I32,
        ScalarType::String | ScalarType::Bytes => WireType::Len,
        _ => WireType::Varint,
    }
}
