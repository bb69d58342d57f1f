//! Message schemas used to interpret decoded fields.
//!
//! A [`SchemaRepository`] is an immutable snapshot of message and enum
//! descriptors, keyed by fully qualified name. It can be built
//! programmatically using [`SchemaBuilder`], or loaded from a serialized
//! `FileDescriptorSet` as produced by `protoc --descriptor_set_out` using
//! [`SchemaRepository::from_descriptor_set`].
//!
//! Repositories are never modified after construction. To change the schema
//! used by running decoders, publish a new snapshot via a [`SchemaRegistry`].

use std::fmt::{Display, Formatter};

use rustc_hash::FxHashMap;

use crate::scalar::DecodedValue;
use crate::wire::WireType;

mod descriptor_set;
mod registry;

pub use registry::SchemaRegistry;

/// Fully qualified name of the well-known timestamp message.
pub const TIMESTAMP_TYPE: &str = "google.protobuf.Timestamp";

/// Declared type of a message field.
///
/// Discriminants match the `FieldDescriptorProto.Type` enum.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Double = 1,
    Float = 2,
    Int64 = 3,
    UInt64 = 4,
    Int32 = 5,
    Fixed64 = 6,
    Fixed32 = 7,
    Bool = 8,
    String = 9,
    Group = 10,
    Message = 11,
    Bytes = 12,
    UInt32 = 13,
    Enum = 14,
    SFixed32 = 15,
    SFixed64 = 16,
    SInt32 = 17,
    SInt64 = 18,
}

impl FieldType {
    /// Convert a `FieldDescriptorProto.Type` value.
    pub fn from_descriptor(val: i32) -> Option<Self> {
        let ty = match val {
            1 => FieldType::Double,
            2 => FieldType::Float,
            3 => FieldType::Int64,
            4 => FieldType::UInt64,
            5 => FieldType::Int32,
            6 => FieldType::Fixed64,
            7 => FieldType::Fixed32,
            8 => FieldType::Bool,
            9 => FieldType::String,
            10 => FieldType::Group,
            11 => FieldType::Message,
            12 => FieldType::Bytes,
            13 => FieldType::UInt32,
            14 => FieldType::Enum,
            15 => FieldType::SFixed32,
            16 => FieldType::SFixed64,
            17 => FieldType::SInt32,
            18 => FieldType::SInt64,
            _ => return None,
        };
        Some(ty)
    }

    /// Return the name of the type as written in `.proto` files.
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Int64 => "int64",
            FieldType::UInt64 => "uint64",
            FieldType::Int32 => "int32",
            FieldType::Fixed64 => "fixed64",
            FieldType::Fixed32 => "fixed32",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Group => "group",
            FieldType::Message => "message",
            FieldType::Bytes => "bytes",
            FieldType::UInt32 => "uint32",
            FieldType::Enum => "enum",
            FieldType::SFixed32 => "sfixed32",
            FieldType::SFixed64 => "sfixed64",
            FieldType::SInt32 => "sint32",
            FieldType::SInt64 => "sint64",
        }
    }

    /// Return the wire type used for a single, unpacked value of this type.
    pub fn wire_type(self) -> WireType {
        match self {
            FieldType::Int32
            | FieldType::Int64
            | FieldType::UInt32
            | FieldType::UInt64
            | FieldType::SInt32
            | FieldType::SInt64
            | FieldType::Bool
            | FieldType::Enum => WireType::Varint,
            FieldType::Fixed64 | FieldType::SFixed64 | FieldType::Double => WireType::Fixed64,
            FieldType::Fixed32 | FieldType::SFixed32 | FieldType::Float => WireType::Fixed32,
            FieldType::String | FieldType::Bytes | FieldType::Message => {
                WireType::LengthDelimited
            }
            FieldType::Group => WireType::StartGroup,
        }
    }

    /// Return true if repeated fields of this type may use the packed
    /// representation.
    pub fn is_packable(self) -> bool {
        !matches!(
            self,
            FieldType::String | FieldType::Bytes | FieldType::Message | FieldType::Group
        )
    }

    /// Return true for message-valued types.
    pub fn is_message(self) -> bool {
        matches!(self, FieldType::Message | FieldType::Group)
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Cardinality of a field.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Label {
    #[default]
    Optional,
    Required,
    Repeated,
}

impl Label {
    /// Convert a `FieldDescriptorProto.Label` value.
    pub fn from_descriptor(val: i32) -> Option<Self> {
        match val {
            1 => Some(Label::Optional),
            2 => Some(Label::Required),
            3 => Some(Label::Repeated),
            _ => None,
        }
    }
}

/// Schema of a single field in a message.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    name: String,
    json_name: String,
    number: u64,
    field_type: FieldType,
    label: Label,
    packed: bool,
    default_value: Option<String>,
    type_name: Option<String>,
    oneof_index: Option<i32>,
}

impl FieldDescriptor {
    pub fn new(name: &str, number: u64, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            json_name: json_name(name),
            number,
            field_type,
            label: Label::Optional,
            packed: false,
            default_value: None,
            type_name: None,
            oneof_index: None,
        }
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = label;
        self
    }

    /// Mark a repeated field as using the packed representation.
    pub fn with_packed(mut self, packed: bool) -> Self {
        self.packed = packed;
        self
    }

    /// Set the default value, as written in the `.proto` file.
    pub fn with_default(mut self, default: &str) -> Self {
        self.default_value = Some(default.to_string());
        self
    }

    /// Set the fully qualified name of the message or enum type of this field.
    pub fn with_type_name(mut self, type_name: &str) -> Self {
        self.type_name = Some(type_name.trim_start_matches('.').to_string());
        self
    }

    pub fn with_json_name(mut self, json_name: &str) -> Self {
        self.json_name = json_name.to_string();
        self
    }

    /// Set the index of the `oneof` this field belongs to.
    pub fn with_oneof(mut self, index: i32) -> Self {
        self.oneof_index = Some(index);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the name used for this field in the JSON mapping.
    pub fn json_name(&self) -> &str {
        &self.json_name
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn is_repeated(&self) -> bool {
        self.label == Label::Repeated
    }

    pub fn is_required(&self) -> bool {
        self.label == Label::Required
    }

    /// Return true if this is a repeated field using the packed representation.
    pub fn is_packed(&self) -> bool {
        self.is_repeated() && self.packed && self.field_type.is_packable()
    }

    /// Return the default value as written in the schema, if there is one.
    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    /// Return the message or enum type referenced by this field.
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn oneof_index(&self) -> Option<i32> {
        self.oneof_index
    }
}

/// Schema of a message type.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageDescriptor {
    full_name: String,
    fields: Vec<FieldDescriptor>,

    /// Map of field number to index in `fields`.
    by_number: FxHashMap<u64, usize>,
}

impl MessageDescriptor {
    pub fn new(full_name: &str) -> Self {
        Self {
            full_name: full_name.trim_start_matches('.').to_string(),
            fields: Vec::new(),
            by_number: FxHashMap::default(),
        }
    }

    /// Add a field. A field with the same number as an existing field
    /// replaces it.
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        if let Some(&index) = self.by_number.get(&field.number) {
            self.fields[index] = field;
        } else {
            self.by_number.insert(field.number, self.fields.len());
            self.fields.push(field);
        }
        self
    }

    /// Return the fully qualified name, without a leading dot.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Return the fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Find a field by number.
    pub fn field(&self, number: u64) -> Option<&FieldDescriptor> {
        self.by_number.get(&number).map(|&index| &self.fields[index])
    }

    /// Return true if this is the well-known `google.protobuf.Timestamp` type.
    pub fn is_timestamp(&self) -> bool {
        self.full_name == TIMESTAMP_TYPE
    }
}

/// A named value of an enum type.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumValue {
    pub name: String,
    pub number: i32,
}

/// Schema of an enum type.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumDescriptor {
    full_name: String,
    values: Vec<EnumValue>,
}

impl EnumDescriptor {
    pub fn new(full_name: &str) -> Self {
        Self {
            full_name: full_name.trim_start_matches('.').to_string(),
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, name: &str, number: i32) -> Self {
        self.values.push(EnumValue {
            name: name.to_string(),
            number,
        });
        self
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn values(&self) -> &[EnumValue] {
        &self.values
    }

    /// Return the name of the first value with the given number.
    ///
    /// Enums with `allow_alias` may have several names for a number.
    pub fn value_name(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.number == number)
            .map(|v| v.name.as_str())
    }

    pub fn value_number(&self, name: &str) -> Option<i32> {
        self.values.iter().find(|v| v.name == name).map(|v| v.number)
    }

    /// Return the first declared value, which is the implicit default.
    pub fn first_value(&self) -> Option<&EnumValue> {
        self.values.first()
    }
}

/// Immutable collection of message and enum schemas.
#[derive(Clone, Debug, Default)]
pub struct SchemaRepository {
    messages: FxHashMap<String, MessageDescriptor>,
    enums: FxHashMap<String, EnumDescriptor>,
}

impl SchemaRepository {
    /// Find a message type by its fully qualified name.
    ///
    /// A leading dot, as used by type references in descriptors, is ignored.
    pub fn find_message_type(&self, name: &str) -> Option<&MessageDescriptor> {
        self.messages.get(name.trim_start_matches('.'))
    }

    /// Find a field of `message` by number.
    pub fn find_field<'m>(
        &self,
        message: &'m MessageDescriptor,
        number: u64,
    ) -> Option<&'m FieldDescriptor> {
        message.field(number)
    }

    /// Find an enum type by its fully qualified name.
    pub fn find_enum(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enums.get(name.trim_start_matches('.'))
    }

    /// Look up the name of value `number` in enum type `enum_type`.
    pub fn enum_value_name(&self, enum_type: &str, number: i32) -> Option<&str> {
        self.find_enum(enum_type)?.value_name(number)
    }

    /// Return the explicitly declared default value of `field`.
    ///
    /// This returns `None` if the field has no declared default, or if the
    /// default cannot be parsed as a value of the field's type.
    pub fn declared_default(&self, field: &FieldDescriptor) -> Option<DecodedValue> {
        let text = field.default_value()?;
        let value = match field.field_type() {
            FieldType::Double => DecodedValue::Double(parse_float(text)?),
            FieldType::Float => DecodedValue::Float(parse_float(text)? as f32),
            FieldType::Int32 | FieldType::SInt32 | FieldType::SFixed32 => {
                DecodedValue::Int32(text.parse().ok()?)
            }
            FieldType::Int64 | FieldType::SInt64 | FieldType::SFixed64 => {
                DecodedValue::Int64(text.parse().ok()?)
            }
            FieldType::UInt32 | FieldType::Fixed32 => DecodedValue::UInt32(text.parse().ok()?),
            FieldType::UInt64 | FieldType::Fixed64 => DecodedValue::UInt64(text.parse().ok()?),
            FieldType::Bool => DecodedValue::Bool(text.parse().ok()?),
            FieldType::String => DecodedValue::String(text.to_string()),
            FieldType::Bytes => DecodedValue::Bytes(unescape_bytes(text)?),
            FieldType::Enum => {
                let number = self.find_enum(field.type_name()?)?.value_number(text)?;
                DecodedValue::Enum {
                    number,
                    name: Some(text.to_string()),
                }
            }
            FieldType::Message | FieldType::Group => return None,
        };
        Some(value)
    }

    /// Return the number of message types.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Return an iterator over message type names.
    pub fn message_names(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(|k| k.as_str())
    }
}

/// Builder for [`SchemaRepository`].
///
/// ```
/// use pbinspect::schema::{FieldDescriptor, FieldType, MessageDescriptor, SchemaBuilder};
///
/// let schema = SchemaBuilder::new()
///     .message(
///         MessageDescriptor::new("example.Point")
///             .with_field(FieldDescriptor::new("x", 1, FieldType::SInt32))
///             .with_field(FieldDescriptor::new("y", 2, FieldType::SInt32)),
///     )
///     .build();
///
/// let point = schema.find_message_type("example.Point").unwrap();
/// assert_eq!(point.field(2).unwrap().name(), "y");
/// ```
#[derive(Default)]
pub struct SchemaBuilder {
    repo: SchemaRepository,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: MessageDescriptor) -> Self {
        self.repo
            .messages
            .insert(message.full_name().to_string(), message);
        self
    }

    pub fn enumeration(mut self, enum_desc: EnumDescriptor) -> Self {
        self.repo
            .enums
            .insert(enum_desc.full_name().to_string(), enum_desc);
        self
    }

    /// Add the well-known `google.protobuf.Timestamp` message.
    pub fn with_timestamp(self) -> Self {
        self.message(
            MessageDescriptor::new(TIMESTAMP_TYPE)
                .with_field(FieldDescriptor::new("seconds", 1, FieldType::Int64))
                .with_field(FieldDescriptor::new("nanos", 2, FieldType::Int32)),
        )
    }

    pub fn build(self) -> SchemaRepository {
        self.repo
    }
}

/// Derive the JSON name of a field from its name, by removing underscores and
/// capitalizing the letter that followed each one.
pub fn json_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        "nan" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

/// Unescape the C-style escapes used for `bytes` defaults in descriptors.
fn unescape_bytes(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes().peekable();

    while let Some(byte) = bytes.next() {
        if byte != b'\\' {
            out.push(byte);
            continue;
        }
        let escaped = match bytes.next()? {
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'v' => 0x0b,
            b'?' => b'?',
            b'\\' => b'\\',
            b'\'' => b'\'',
            b'"' => b'"',
            b'x' | b'X' => {
                let mut val = 0u32;
                let mut digits = 0;
                while digits < 2 {
                    let Some(digit) = bytes.peek().and_then(|b| (*b as char).to_digit(16)) else {
                        break;
                    };
                    val = val * 16 + digit;
                    bytes.next();
                    digits += 1;
                }
                if digits == 0 {
                    return None;
                }
                val as u8
            }
            first @ b'0'..=b'7' => {
                let mut val = (first - b'0') as u32;
                for _ in 0..2 {
                    match bytes.peek() {
                        Some(b @ b'0'..=b'7') => {
                            val = val * 8 + (b - b'0') as u32;
                            bytes.next();
                        }
                        _ => break,
                    }
                }
                u8::try_from(val).ok()?
            }
            _ => return None,
        };
        out.push(escaped);
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use pbinspect_testing::TestCases;

    use super::{
        json_name, unescape_bytes, EnumDescriptor, FieldDescriptor, FieldType, Label,
        MessageDescriptor, SchemaBuilder,
    };
    use crate::scalar::DecodedValue;

    fn test_schema() -> super::SchemaRepository {
        SchemaBuilder::new()
            .enumeration(
                EnumDescriptor::new(".test.Color")
                    .with_value("RED", 0)
                    .with_value("GREEN", 1),
            )
            .message(
                MessageDescriptor::new(".test.Msg")
                    .with_field(FieldDescriptor::new("id", 1, FieldType::Int32))
                    .with_field(
                        FieldDescriptor::new("color", 2, FieldType::Enum)
                            .with_type_name(".test.Color"),
                    ),
            )
            .build()
    }

    #[test]
    fn test_find_message_type() {
        let schema = test_schema();
        let msg = schema.find_message_type("test.Msg").unwrap();
        assert!(schema.find_message_type(".test.Msg").is_some());
        assert!(schema.find_message_type("test.Missing").is_none());

        assert_eq!(schema.find_field(msg, 1).unwrap().name(), "id");
        assert!(schema.find_field(msg, 3).is_none());
        assert_eq!(msg.field(2).unwrap().type_name(), Some("test.Color"));
    }

    #[test]
    fn test_enum_value_name() {
        let schema = test_schema();
        assert_eq!(schema.enum_value_name("test.Color", 1), Some("GREEN"));
        assert_eq!(schema.enum_value_name("test.Color", 5), None);
        assert_eq!(schema.enum_value_name("test.Shape", 0), None);
    }

    #[test]
    fn test_declared_default() {
        #[derive(Debug)]
        struct Case {
            field_type: FieldType,
            default: &'static str,
            expected: Option<DecodedValue>,
        }

        let cases = [
            Case {
                field_type: FieldType::Int32,
                default: "-5",
                expected: Some(DecodedValue::Int32(-5)),
            },
            Case {
                field_type: FieldType::UInt64,
                default: "18446744073709551615",
                expected: Some(DecodedValue::UInt64(u64::MAX)),
            },
            Case {
                field_type: FieldType::Double,
                default: "-inf",
                expected: Some(DecodedValue::Double(f64::NEG_INFINITY)),
            },
            Case {
                field_type: FieldType::Float,
                default: "1.5",
                expected: Some(DecodedValue::Float(1.5)),
            },
            Case {
                field_type: FieldType::Bool,
                default: "true",
                expected: Some(DecodedValue::Bool(true)),
            },
            Case {
                field_type: FieldType::String,
                default: "hello",
                expected: Some(DecodedValue::String("hello".into())),
            },
            Case {
                field_type: FieldType::Bytes,
                default: "a\\001\\xff",
                expected: Some(DecodedValue::Bytes(vec![b'a', 1, 0xff])),
            },
            Case {
                field_type: FieldType::Enum,
                default: "GREEN",
                expected: Some(DecodedValue::Enum {
                    number: 1,
                    name: Some("GREEN".into()),
                }),
            },
            Case {
                field_type: FieldType::Enum,
                default: "BLUE",
                expected: None,
            },
            Case {
                field_type: FieldType::Int32,
                default: "not a number",
                expected: None,
            },
        ];

        let schema = test_schema();
        cases.test_each(|case| {
            let field = FieldDescriptor::new("f", 1, case.field_type)
                .with_type_name("test.Color")
                .with_default(case.default);
            assert_eq!(schema.declared_default(&field), case.expected);
        });

        let field = FieldDescriptor::new("f", 1, FieldType::Int32);
        assert_eq!(schema.declared_default(&field), None);
    }

    #[test]
    fn test_json_name() {
        assert_eq!(json_name("foo_bar_baz"), "fooBarBaz");
        assert_eq!(json_name("id"), "id");
        assert_eq!(json_name("x_1"), "x1");
    }

    #[test]
    fn test_unescape_bytes() {
        assert_eq!(unescape_bytes("\\n\\t\\\\"), Some(b"\n\t\\".to_vec()));
        assert_eq!(unescape_bytes("\\x4a\\101"), Some(b"JA".to_vec()));
        assert_eq!(unescape_bytes("\\q"), None);
        assert_eq!(unescape_bytes("\\777"), None);
    }

    #[test]
    fn test_packed_requires_repeated() {
        let field = FieldDescriptor::new("v", 1, FieldType::Int32).with_packed(true);
        assert!(!field.is_packed());
        let field = field.with_label(Label::Repeated);
        assert!(field.is_packed());

        let field = FieldDescriptor::new("s", 1, FieldType::String)
            .with_label(Label::Repeated)
            .with_packed(true);
        assert!(!field.is_packed());
    }
}
