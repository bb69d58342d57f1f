//! Generation of values for fields missing from a message.

use rustc_hash::FxHashSet;

use crate::options::AddDefaultValue;
use crate::scalar::DecodedValue;
use crate::schema::{FieldDescriptor, FieldType, MessageDescriptor, SchemaRepository};

/// Maximum number of distinct field numbers tracked per message.
pub const SEEN_SET_CAPACITY: usize = 4096;

/// Set of field numbers which have been seen in a message.
///
/// The set has a fixed capacity. Once more distinct numbers than that have
/// been inserted, it is marked as overflowed and can no longer tell which
/// fields are missing.
#[derive(Debug, Default)]
pub struct SeenSet {
    numbers: FxHashSet<u64>,
    overflowed: bool,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, number: u64) {
        if self.numbers.contains(&number) {
            return;
        }
        if self.numbers.len() >= SEEN_SET_CAPACITY {
            self.overflowed = true;
            return;
        }
        self.numbers.insert(number);
    }

    pub fn contains(&self, number: u64) -> bool {
        self.numbers.contains(&number)
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }
}

/// Fields missing from a message, and the values generated for them.
#[derive(Debug, Default)]
pub struct MissingFields<'s> {
    /// Required fields which were absent.
    pub required: Vec<&'s FieldDescriptor>,

    /// Values generated for absent fields, in declaration order.
    pub generated: Vec<(&'s FieldDescriptor, DecodedValue)>,
}

/// Find fields of `message` that are absent from `seen` and generate values
/// for them according to `policy`.
///
/// Repeated fields, message fields and members of a `oneof` never get
/// generated values. Nor do `string` and `bytes` fields without a declared
/// default.
pub fn synthesize_defaults<'s>(
    schema: &'s SchemaRepository,
    message: &'s MessageDescriptor,
    seen: &SeenSet,
    policy: AddDefaultValue,
) -> MissingFields<'s> {
    let mut missing = MissingFields::default();

    for field in message.fields() {
        if seen.contains(field.number()) {
            continue;
        }
        if field.is_required() {
            missing.required.push(field);
            continue;
        }
        if policy == AddDefaultValue::None
            || field.is_repeated()
            || field.field_type().is_message()
            || field.oneof_index().is_some()
        {
            continue;
        }
        if let Some(value) = default_value(schema, field, policy) {
            missing.generated.push((field, value));
        }
    }

    missing
}

fn default_value(
    schema: &SchemaRepository,
    field: &FieldDescriptor,
    policy: AddDefaultValue,
) -> Option<DecodedValue> {
    if let Some(value) = schema.declared_default(field) {
        return Some(value);
    }

    match field.field_type() {
        FieldType::String | FieldType::Bytes => None,
        FieldType::Enum if policy >= AddDefaultValue::DeclaredPlusEnumBool => {
            let first = schema.find_enum(field.type_name()?)?.first_value()?;
            Some(DecodedValue::Enum {
                number: first.number,
                name: Some(first.name.clone()),
            })
        }
        FieldType::Bool if policy >= AddDefaultValue::DeclaredPlusEnumBool => {
            Some(DecodedValue::Bool(false))
        }
        FieldType::Enum | FieldType::Bool => None,
        ty if policy == AddDefaultValue::All => DecodedValue::zero(ty),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pbinspect_testing::TestCases;

    use super::{synthesize_defaults, SeenSet, SEEN_SET_CAPACITY};
    use crate::options::AddDefaultValue;
    use crate::scalar::DecodedValue;
    use crate::schema::{
        EnumDescriptor, FieldDescriptor, FieldType, Label, MessageDescriptor, SchemaBuilder,
        SchemaRepository,
    };

    fn schema() -> SchemaRepository {
        SchemaBuilder::new()
            .enumeration(
                EnumDescriptor::new("test.Kind")
                    .with_value("KIND_UNKNOWN", 0)
                    .with_value("KIND_A", 1),
            )
            .message(
                MessageDescriptor::new("test.Msg")
                    .with_field(FieldDescriptor::new("count", 1, FieldType::Int32).with_default("7"))
                    .with_field(
                        FieldDescriptor::new("kind", 2, FieldType::Enum).with_type_name("test.Kind"),
                    )
                    .with_field(FieldDescriptor::new("flag", 3, FieldType::Bool))
                    .with_field(FieldDescriptor::new("ratio", 4, FieldType::Double))
                    .with_field(FieldDescriptor::new("name", 5, FieldType::String))
                    .with_field(
                        FieldDescriptor::new("values", 6, FieldType::Int32)
                            .with_label(Label::Repeated),
                    )
                    .with_field(
                        FieldDescriptor::new("child", 7, FieldType::Message)
                            .with_type_name("test.Msg"),
                    )
                    .with_field(FieldDescriptor::new("choice", 8, FieldType::UInt32).with_oneof(0))
                    .with_field(
                        FieldDescriptor::new("id", 9, FieldType::UInt64).with_label(Label::Required),
                    ),
            )
            .build()
    }

    #[test]
    fn test_synthesize_defaults() {
        #[derive(Debug)]
        struct Case {
            policy: AddDefaultValue,
            expected: Vec<(&'static str, DecodedValue)>,
        }

        let cases = [
            Case {
                policy: AddDefaultValue::None,
                expected: vec![],
            },
            Case {
                policy: AddDefaultValue::DeclaredOnly,
                expected: vec![("count", DecodedValue::Int32(7))],
            },
            Case {
                policy: AddDefaultValue::DeclaredPlusEnumBool,
                expected: vec![
                    ("count", DecodedValue::Int32(7)),
                    (
                        "kind",
                        DecodedValue::Enum {
                            number: 0,
                            name: Some("KIND_UNKNOWN".into()),
                        },
                    ),
                    ("flag", DecodedValue::Bool(false)),
                ],
            },
            Case {
                policy: AddDefaultValue::All,
                expected: vec![
                    ("count", DecodedValue::Int32(7)),
                    (
                        "kind",
                        DecodedValue::Enum {
                            number: 0,
                            name: Some("KIND_UNKNOWN".into()),
                        },
                    ),
                    ("flag", DecodedValue::Bool(false)),
                    ("ratio", DecodedValue::Double(0.)),
                ],
            },
        ];

        let schema = schema();
        let message = schema.find_message_type("test.Msg").unwrap();

        cases.test_each(|case| {
            let missing = synthesize_defaults(&schema, message, &SeenSet::new(), case.policy);

            let generated: Vec<_> = missing
                .generated
                .iter()
                .map(|(field, value)| (field.name(), value.clone()))
                .collect();
            assert_eq!(generated, case.expected);

            let required: Vec<_> = missing.required.iter().map(|f| f.name()).collect();
            assert_eq!(required, ["id"]);
        });
    }

    #[test]
    fn test_seen_fields_not_synthesized() {
        let schema = schema();
        let message = schema.find_message_type("test.Msg").unwrap();

        let mut seen = SeenSet::new();
        seen.insert(1);
        seen.insert(9);

        let missing = synthesize_defaults(&schema, message, &seen, AddDefaultValue::DeclaredOnly);
        assert!(missing.required.is_empty());
        assert!(missing.generated.is_empty());
    }

    #[test]
    fn test_seen_set_capacity() {
        let mut seen = SeenSet::new();
        for i in 0..SEEN_SET_CAPACITY as u64 {
            seen.insert(i);
            seen.insert(i);
        }
        assert!(seen.contains(SEEN_SET_CAPACITY as u64 - 1));
        assert!(!seen.overflowed());

        seen.insert(0);
        assert!(!seen.overflowed());

        seen.insert(SEEN_SET_CAPACITY as u64);
        assert!(seen.overflowed());
        assert!(!seen.contains(SEEN_SET_CAPACITY as u64));
    }
}
