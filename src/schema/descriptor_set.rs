//! Loading schemas from serialized `google.protobuf.FileDescriptorSet`
//! messages.
//!
//! The types in this module correspond to messages defined in
//! [descriptor.proto](https://github.com/protocolbuffers/protobuf/blob/main/src/google/protobuf/descriptor.proto).
//! They only contain the fields needed to decode messages.

use crate::errors::DecodeError;
use crate::schema::{
    EnumDescriptor, FieldDescriptor, FieldType, Label, MessageDescriptor, SchemaBuilder,
    SchemaRepository,
};
use crate::wire::{DecodeMessage, Fields};

#[derive(Debug, Default)]
struct FileDescriptorSet {
    file: Vec<FileDescriptorProto>,
}

impl FileDescriptorSet {
    const FILE: u64 = 1;
}

impl DecodeMessage for FileDescriptorSet {
    fn decode_fields(mut fields: Fields) -> Result<Self, DecodeError> {
        let mut msg = Self::default();
        while let Some(field) = fields.next()? {
            if field.number() == Self::FILE {
                msg.file.push(FileDescriptorProto::decode_field(&field)?);
            }
        }
        Ok(msg)
    }
}

#[derive(Debug, Default)]
struct FileDescriptorProto {
    package: Option<String>,
    message_type: Vec<DescriptorProto>,
    enum_type: Vec<EnumDescriptorProto>,
    syntax: Option<String>,
}

impl FileDescriptorProto {
    const PACKAGE: u64 = 2;
    const MESSAGE_TYPE: u64 = 4;
    const ENUM_TYPE: u64 = 5;
    const SYNTAX: u64 = 12;

    fn is_proto3(&self) -> bool {
        self.syntax.as_deref() == Some("proto3")
    }
}

impl DecodeMessage for FileDescriptorProto {
    fn decode_fields(mut fields: Fields) -> Result<Self, DecodeError> {
        let mut msg = Self::default();
        while let Some(field) = fields.next()? {
            match field.number() {
                Self::PACKAGE => msg.package = Some(field.read_string()?),
                Self::MESSAGE_TYPE => msg.message_type.push(DescriptorProto::decode_field(&field)?),
                Self::ENUM_TYPE => msg.enum_type.push(EnumDescriptorProto::decode_field(&field)?),
                Self::SYNTAX => msg.syntax = Some(field.read_string()?),
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Debug, Default)]
struct DescriptorProto {
    name: Option<String>,
    field: Vec<FieldDescriptorProto>,
    nested_type: Vec<DescriptorProto>,
    enum_type: Vec<EnumDescriptorProto>,
}

impl DescriptorProto {
    const NAME: u64 = 1;
    const FIELD: u64 = 2;
    const NESTED_TYPE: u64 = 3;
    const ENUM_TYPE: u64 = 4;
}

impl DecodeMessage for DescriptorProto {
    fn decode_fields(mut fields: Fields) -> Result<Self, DecodeError> {
        let mut msg = Self::default();
        while let Some(field) = fields.next()? {
            match field.number() {
                Self::NAME => msg.name = Some(field.read_string()?),
                Self::FIELD => msg.field.push(FieldDescriptorProto::decode_field(&field)?),
                Self::NESTED_TYPE => msg.nested_type.push(DescriptorProto::decode_field(&field)?),
                Self::ENUM_TYPE => msg.enum_type.push(EnumDescriptorProto::decode_field(&field)?),
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Debug, Default)]
struct FieldDescriptorProto {
    name: Option<String>,
    number: Option<i32>,
    label: Option<i32>,
    r#type: Option<i32>,
    type_name: Option<String>,
    default_value: Option<String>,
    options: Option<FieldOptions>,
    oneof_index: Option<i32>,
    json_name: Option<String>,
    proto3_optional: bool,
}

impl FieldDescriptorProto {
    const NAME: u64 = 1;
    const NUMBER: u64 = 3;
    const LABEL: u64 = 4;
    const TYPE: u64 = 5;
    const TYPE_NAME: u64 = 6;
    const DEFAULT_VALUE: u64 = 7;
    const OPTIONS: u64 = 8;
    const ONEOF_INDEX: u64 = 9;
    const JSON_NAME: u64 = 10;
    const PROTO3_OPTIONAL: u64 = 17;
}

impl DecodeMessage for FieldDescriptorProto {
    fn decode_fields(mut fields: Fields) -> Result<Self, DecodeError> {
        let mut msg = Self::default();
        while let Some(field) = fields.next()? {
            match field.number() {
                Self::NAME => msg.name = Some(field.read_string()?),
                Self::NUMBER => msg.number = Some(field.get_int32()?),
                Self::LABEL => msg.label = Some(field.get_enum()?),
                Self::TYPE => msg.r#type = Some(field.get_enum()?),
                Self::TYPE_NAME => msg.type_name = Some(field.read_string()?),
                Self::DEFAULT_VALUE => msg.default_value = Some(field.read_string()?),
                Self::OPTIONS => msg.options = Some(FieldOptions::decode_field(&field)?),
                Self::ONEOF_INDEX => msg.oneof_index = Some(field.get_int32()?),
                Self::JSON_NAME => msg.json_name = Some(field.read_string()?),
                Self::PROTO3_OPTIONAL => msg.proto3_optional = field.get_bool()?,
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Debug, Default)]
struct FieldOptions {
    packed: Option<bool>,
}

impl FieldOptions {
    const PACKED: u64 = 2;
}

impl DecodeMessage for FieldOptions {
    fn decode_fields(mut fields: Fields) -> Result<Self, DecodeError> {
        let mut msg = Self::default();
        while let Some(field) = fields.next()? {
            if field.number() == Self::PACKED {
                msg.packed = Some(field.get_bool()?);
            }
        }
        Ok(msg)
    }
}

#[derive(Debug, Default)]
struct EnumDescriptorProto {
    name: Option<String>,
    value: Vec<EnumValueDescriptorProto>,
}

impl EnumDescriptorProto {
    const NAME: u64 = 1;
    const VALUE: u64 = 2;
}

impl DecodeMessage for EnumDescriptorProto {
    fn decode_fields(mut fields: Fields) -> Result<Self, DecodeError> {
        let mut msg = Self::default();
        while let Some(field) = fields.next()? {
            match field.number() {
                Self::NAME => msg.name = Some(field.read_string()?),
                Self::VALUE => msg.value.push(EnumValueDescriptorProto::decode_field(&field)?),
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Debug, Default)]
struct EnumValueDescriptorProto {
    name: Option<String>,
    number: Option<i32>,
}

impl EnumValueDescriptorProto {
    const NAME: u64 = 1;
    const NUMBER: u64 = 2;
}

impl DecodeMessage for EnumValueDescriptorProto {
    fn decode_fields(mut fields: Fields) -> Result<Self, DecodeError> {
        let mut msg = Self::default();
        while let Some(field) = fields.next()? {
            match field.number() {
                Self::NAME => msg.name = Some(field.read_string()?),
                Self::NUMBER => msg.number = Some(field.get_int32()?),
                _ => {}
            }
        }
        Ok(msg)
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

fn add_enum(builder: SchemaBuilder, scope: &str, proto: &EnumDescriptorProto) -> SchemaBuilder {
    let name = qualify(scope, proto.name.as_deref().unwrap_or_default());
    let mut enum_desc = EnumDescriptor::new(&name);
    for value in &proto.value {
        enum_desc = enum_desc.with_value(
            value.name.as_deref().unwrap_or_default(),
            value.number.unwrap_or_default(),
        );
    }
    builder.enumeration(enum_desc)
}

fn convert_field(proto: &FieldDescriptorProto, proto3: bool) -> Option<FieldDescriptor> {
    let name = proto.name.as_deref()?;
    let number = u64::try_from(proto.number?).ok()?;
    let field_type = FieldType::from_descriptor(proto.r#type?)?;
    let label = proto
        .label
        .and_then(Label::from_descriptor)
        .unwrap_or_default();

    // Repeated scalars are packed by default in proto3 files.
    let packed = proto
        .options
        .as_ref()
        .and_then(|opts| opts.packed)
        .unwrap_or(proto3 && label == Label::Repeated);

    let mut field = FieldDescriptor::new(name, number, field_type)
        .with_label(label)
        .with_packed(packed);
    if let Some(type_name) = &proto.type_name {
        field = field.with_type_name(type_name);
    }
    if let Some(default) = &proto.default_value {
        field = field.with_default(default);
    }
    if let Some(json_name) = &proto.json_name {
        field = field.with_json_name(json_name);
    }
    // Synthetic oneofs of proto3 `optional` fields are not real oneofs.
    if let (Some(index), false) = (proto.oneof_index, proto.proto3_optional) {
        field = field.with_oneof(index);
    }
    Some(field)
}

fn add_message(
    mut builder: SchemaBuilder,
    scope: &str,
    proto: &DescriptorProto,
    proto3: bool,
) -> SchemaBuilder {
    let name = qualify(scope, proto.name.as_deref().unwrap_or_default());

    let mut message = MessageDescriptor::new(&name);
    for field in &proto.field {
        match convert_field(field, proto3) {
            Some(field) => message = message.with_field(field),
            None => tracing::warn!(
                message_type = name.as_str(),
                field = field.name.as_deref(),
                "skipping invalid field descriptor"
            ),
        }
    }
    builder = builder.message(message);

    for nested in &proto.nested_type {
        builder = add_message(builder, &name, nested, proto3);
    }
    for enum_proto in &proto.enum_type {
        builder = add_enum(builder, &name, enum_proto);
    }
    builder
}

impl SchemaRepository {
    /// Load a schema from a serialized `google.protobuf.FileDescriptorSet`.
    ///
    /// This is the format produced by `protoc --descriptor_set_out`. Fields
    /// with an unknown type or a missing name or number are skipped with a
    /// warning. Errors are returned if the descriptor set is not a valid
    /// message.
    pub fn from_descriptor_set(buf: &[u8]) -> Result<SchemaRepository, DecodeError> {
        let set = FileDescriptorSet::decode(buf)?;

        let mut builder = SchemaBuilder::new();
        for file in &set.file {
            let package = file.package.as_deref().unwrap_or_default();
            let proto3 = file.is_proto3();
            for message in &file.message_type {
                builder = add_message(builder, package, message, proto3);
            }
            for enum_proto in &file.enum_type {
                builder = add_enum(builder, package, enum_proto);
            }
        }

        let repo = builder.build();
        tracing::debug!(
            files = set.file.len(),
            messages = repo.message_count(),
            "loaded descriptor set"
        );
        Ok(repo)
    }
}

#[cfg(test)]
mod tests {
    use pbinspect_testing::MessageBuilder;

    use crate::errors::ErrorKind;
    use crate::schema::{FieldType, Label, SchemaRepository};

    fn field_proto(name: &str, number: u64, ty: u64, label: u64) -> MessageBuilder {
        MessageBuilder::new()
            .string(1, name)
            .varint(3, number)
            .varint(4, label)
            .varint(5, ty)
    }

    fn descriptor_set(syntax: Option<&str>) -> Vec<u8> {
        let color = MessageBuilder::new()
            .string(1, "Color")
            .message(2, MessageBuilder::new().string(1, "RED").varint(2, 0))
            .message(2, MessageBuilder::new().string(1, "BLUE").varint(2, 2));

        let inner = MessageBuilder::new()
            .string(1, "Inner")
            .message(2, field_proto("value", 1, 9, 1));

        let person = MessageBuilder::new()
            .string(1, "Person")
            .message(2, field_proto("user_id", 1, 5, 2).string(7, "42"))
            .message(2, field_proto("scores", 2, 17, 3))
            .message(
                2,
                field_proto("tags", 3, 9, 3).message(8, MessageBuilder::new().varint(2, 1)),
            )
            .message(2, field_proto("color", 4, 14, 1).string(6, ".test.Color"))
            .message(2, field_proto("inner", 5, 11, 1).string(6, ".test.Person.Inner"))
            .message(2, field_proto("bad", 6, 99, 1))
            .message(3, inner);

        let mut file = MessageBuilder::new()
            .string(1, "test.proto")
            .string(2, "test")
            .message(4, person)
            .message(5, color);
        if let Some(syntax) = syntax {
            file = file.string(12, syntax);
        }

        MessageBuilder::new().message(1, file).build()
    }

    #[test]
    fn test_from_descriptor_set() {
        let repo = SchemaRepository::from_descriptor_set(&descriptor_set(None)).unwrap();
        assert_eq!(repo.message_count(), 2);

        let person = repo.find_message_type("test.Person").unwrap();
        assert_eq!(person.fields().len(), 5);

        let user_id = person.field(1).unwrap();
        assert_eq!(user_id.name(), "user_id");
        assert_eq!(user_id.json_name(), "userId");
        assert_eq!(user_id.label(), Label::Required);
        assert_eq!(user_id.default_value(), Some("42"));

        let scores = person.field(2).unwrap();
        assert_eq!(scores.field_type(), FieldType::SInt32);
        assert!(scores.is_repeated());
        assert!(!scores.is_packed());

        let color = person.field(4).unwrap();
        assert_eq!(color.type_name(), Some("test.Color"));
        assert_eq!(repo.enum_value_name("test.Color", 2), Some("BLUE"));

        let inner = person.field(5).unwrap();
        let inner_type = repo.find_message_type(inner.type_name().unwrap()).unwrap();
        assert_eq!(inner_type.full_name(), "test.Person.Inner");

        // Field with an unknown type is skipped.
        assert!(person.field(6).is_none());
    }

    #[test]
    fn test_proto3_packed_by_default() {
        let repo =
            SchemaRepository::from_descriptor_set(&descriptor_set(Some("proto3"))).unwrap();
        let person = repo.find_message_type("test.Person").unwrap();
        assert!(person.field(2).unwrap().is_packed());

        // Strings can't be packed regardless of options.
        assert!(!person.field(3).unwrap().is_packed());
    }

    #[test]
    fn test_invalid_descriptor_set() {
        let buf = MessageBuilder::new()
            .message(1, MessageBuilder::new().varint(2, 5))
            .build();
        let err = SchemaRepository::from_descriptor_set(&buf).err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::FieldTypeMismatch);
        assert_eq!(err.field(), Some(2));
    }
}
