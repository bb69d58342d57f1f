use std::fmt::{Display, Formatter};

use crate::schema::{EnumDescriptor, FieldType};
use crate::timestamp::format_timestamp;
use crate::wire::varint::{decode_zigzag32, decode_zigzag64};

/// A decoded field value.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedValue {
    Double(f64),
    Float(f32),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Bool(bool),

    /// Enum value, with its name if the schema defines one for the number.
    Enum {
        number: i32,
        name: Option<String>,
    },

    Bytes(Vec<u8>),
    String(String),

    /// Embedded message. The fields are emitted as children of the message's
    /// node.
    Message {
        type_name: Option<String>,
    },

    /// Value of a `google.protobuf.Timestamp` message.
    Timestamp {
        seconds: i64,
        nanos: i32,
    },
}

impl DecodedValue {
    /// Return the implicit default value for a field of type `ty`.
    ///
    /// Returns `None` for types which have no scalar default.
    pub fn zero(ty: FieldType) -> Option<DecodedValue> {
        let value = match ty {
            FieldType::Double => DecodedValue::Double(0.),
            FieldType::Float => DecodedValue::Float(0.),
            FieldType::Int32 | FieldType::SInt32 | FieldType::SFixed32 => DecodedValue::Int32(0),
            FieldType::Int64 | FieldType::SInt64 | FieldType::SFixed64 => DecodedValue::Int64(0),
            FieldType::UInt32 | FieldType::Fixed32 => DecodedValue::UInt32(0),
            FieldType::UInt64 | FieldType::Fixed64 => DecodedValue::UInt64(0),
            FieldType::Bool => DecodedValue::Bool(false),
            FieldType::String => DecodedValue::String(String::new()),
            FieldType::Bytes => DecodedValue::Bytes(Vec::new()),
            FieldType::Enum | FieldType::Message | FieldType::Group => return None,
        };
        Some(value)
    }
}

impl Display for DecodedValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodedValue::Double(v) => write!(f, "{}", v),
            DecodedValue::Float(v) => write!(f, "{}", v),
            DecodedValue::Int32(v) => write!(f, "{}", v),
            DecodedValue::Int64(v) => write!(f, "{}", v),
            DecodedValue::UInt32(v) => write!(f, "{}", v),
            DecodedValue::UInt64(v) => write!(f, "{}", v),
            DecodedValue::Bool(v) => write!(f, "{}", v),
            DecodedValue::Enum {
                number,
                name: Some(name),
            } => write!(f, "{} ({})", name, number),
            DecodedValue::Enum { number, name: None } => write!(f, "{}", number),
            DecodedValue::Bytes(bytes) => {
                if bytes.is_empty() {
                    return write!(f, "<empty>");
                }
                write!(f, "{}", hex::encode(bytes))
            }
            DecodedValue::String(s) => write!(f, "{:?}", s),
            DecodedValue::Message {
                type_name: Some(name),
            } => write!(f, "{}", name),
            DecodedValue::Message { type_name: None } => write!(f, "message"),
            DecodedValue::Timestamp { seconds, nanos } => {
                match format_timestamp(*seconds, *nanos, true) {
                    Some(ts) => write!(f, "{}", ts),
                    None => write!(f, "{}s {}ns", seconds, nanos),
                }
            }
        }
    }
}

/// Reasons why a value could not be decoded as the requested type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScalarError {
    /// The payload of a `string` value is not valid UTF-8.
    InvalidUtf8,

    /// A `bool` value was not encoded as a single byte.
    InvalidBool,

    /// The type is not a scalar.
    NotScalar,
}

/// Decode a single scalar value.
///
/// `payload` is the raw encoded value, without any tag or length prefix.
/// `value` is the numeric value of the payload for varint and fixed-width
/// encodings. Integer types are decoded from `value`, so a type may be decoded
/// from any numeric wire type.
///
/// `enum_type` is used to look up the names of enum values.
pub fn decode_scalar(
    ty: FieldType,
    payload: &[u8],
    value: u64,
    enum_type: Option<&EnumDescriptor>,
) -> Result<DecodedValue, ScalarError> {
    let decoded = match ty {
        FieldType::Double => DecodedValue::Double(f64::from_bits(value)),
        FieldType::Float => DecodedValue::Float(f32::from_bits(value as u32)),
        FieldType::Int32 => DecodedValue::Int32(value as i32),
        FieldType::Int64 => DecodedValue::Int64(value as i64),
        FieldType::UInt32 | FieldType::Fixed32 => DecodedValue::UInt32(value as u32),
        FieldType::UInt64 | FieldType::Fixed64 => DecodedValue::UInt64(value),
        FieldType::SInt32 => DecodedValue::Int32(decode_zigzag32(value)),
        FieldType::SInt64 => DecodedValue::Int64(decode_zigzag64(value)),
        FieldType::SFixed32 => DecodedValue::Int32(value as u32 as i32),
        FieldType::SFixed64 => DecodedValue::Int64(value as i64),
        FieldType::Bool => {
            if payload.len() != 1 {
                return Err(ScalarError::InvalidBool);
            }
            DecodedValue::Bool(payload[0] & 1 != 0)
        }
        FieldType::Enum => {
            let number = value as i32;
            DecodedValue::Enum {
                number,
                name: enum_type
                    .and_then(|e| e.value_name(number))
                    .map(|name| name.to_string()),
            }
        }
        FieldType::String => match std::str::from_utf8(payload) {
            Ok(s) => DecodedValue::String(s.to_string()),
            Err(_) => return Err(ScalarError::InvalidUtf8),
        },
        FieldType::Bytes => DecodedValue::Bytes(payload.to_vec()),
        FieldType::Message | FieldType::Group => return Err(ScalarError::NotScalar),
    };
    Ok(decoded)
}
