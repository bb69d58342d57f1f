use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Number, Value};

use crate::scalar::DecodedValue;
use crate::timestamp::format_timestamp;

/// Receives the JSON mapping of a decoded message as a stream of events.
pub trait JsonSink {
    fn begin_object(&mut self);
    fn end_object(&mut self);
    fn begin_array(&mut self);
    fn end_array(&mut self);

    /// Set the name of the member that the next value or container is
    /// assigned to in the current object, and how it is combined with an
    /// earlier value of the same member.
    fn set_member_name(&mut self, name: &str, duplicate: DuplicateMember);

    fn write_value(&mut self, value: Value);
}

/// Handling of a member which occurs more than once in an object.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DuplicateMember {
    /// Merge the values into an array.
    #[default]
    Merge,

    /// Keep only the last value.
    Replace,
}

enum Frame {
    Object {
        members: Map<String, Value>,
        name: Option<(String, DuplicateMember)>,
    },
    Array(Vec<Value>),
}

/// [`JsonSink`] that builds a [`serde_json::Value`].
///
/// If a member name occurs more than once in an object, the values are
/// merged into an array or the last value is kept, depending on the
/// [`DuplicateMember`] passed to [`JsonSink::set_member_name`].
#[derive(Default)]
pub struct JsonBuilder {
    stack: Vec<Frame>,
    root: Option<Value>,
}

impl JsonBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the completed value, or `None` if no complete top-level value
    /// has been written.
    pub fn into_value(self) -> Option<Value> {
        self.root
    }

    fn push_value(&mut self, value: Value) {
        match self.stack.last_mut() {
            Some(Frame::Object { members, name }) => {
                let (key, duplicate) = name.take().unwrap_or_default();
                match duplicate {
                    DuplicateMember::Merge => insert_member(members, key, value),
                    DuplicateMember::Replace => {
                        members.insert(key, value);
                    }
                }
            }
            Some(Frame::Array(items)) => items.push(value),
            None => self.root = Some(value),
        }
    }
}

fn insert_member(members: &mut Map<String, Value>, key: String, value: Value) {
    match members.get_mut(&key) {
        None => {
            members.insert(key, value);
        }
        Some(Value::Array(items)) => match value {
            Value::Array(more) => items.extend(more),
            value => items.push(value),
        },
        Some(existing) => {
            let first = existing.take();
            let items = match value {
                Value::Array(more) => std::iter::once(first).chain(more).collect(),
                value => vec![first, value],
            };
            *existing = Value::Array(items);
        }
    }
}

impl JsonSink for JsonBuilder {
    fn begin_object(&mut self) {
        self.stack.push(Frame::Object {
            members: Map::new(),
            name: None,
        });
    }

    fn end_object(&mut self) {
        if let Some(Frame::Object { members, .. }) = self.stack.pop() {
            self.push_value(Value::Object(members));
        }
    }

    fn begin_array(&mut self) {
        self.stack.push(Frame::Array(Vec::new()));
    }

    fn end_array(&mut self) {
        if let Some(Frame::Array(items)) = self.stack.pop() {
            self.push_value(Value::Array(items));
        }
    }

    fn set_member_name(&mut self, member: &str, duplicate: DuplicateMember) {
        if let Some(Frame::Object { name, .. }) = self.stack.last_mut() {
            *name = Some((member.to_string(), duplicate));
        }
    }

    fn write_value(&mut self, value: Value) {
        self.push_value(value);
    }
}

fn float_value(val: f64, text: impl FnOnce() -> String) -> Value {
    if val.is_nan() {
        Value::String("NaN".into())
    } else if val.is_infinite() {
        let name = if val > 0. { "Infinity" } else { "-Infinity" };
        Value::String(name.into())
    } else {
        // Parse the shortest representation of the original value, so that
        // `f32` values don't gain digits when widened.
        text()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Convert a value to its representation in the Protocol Buffers JSON
/// mapping.
///
/// See <https://protobuf.dev/programming-guides/json/>.
pub fn json_value(value: &DecodedValue, utc: bool) -> Value {
    match value {
        DecodedValue::Double(v) => float_value(*v, || v.to_string()),
        DecodedValue::Float(v) => float_value(*v as f64, || v.to_string()),
        DecodedValue::Int32(v) => Value::from(*v),
        DecodedValue::UInt32(v) => Value::from(*v),
        DecodedValue::Int64(v) => Value::String(v.to_string()),
        DecodedValue::UInt64(v) => Value::String(v.to_string()),
        DecodedValue::Bool(v) => Value::Bool(*v),
        DecodedValue::Enum {
            name: Some(name), ..
        } => Value::String(name.clone()),
        DecodedValue::Enum { number, name: None } => Value::from(*number),
        DecodedValue::Bytes(bytes) => Value::String(STANDARD.encode(bytes)),
        DecodedValue::String(s) => Value::String(s.clone()),
        DecodedValue::Message { .. } => Value::Object(Map::new()),
        DecodedValue::Timestamp { seconds, nanos } => {
            let text = format_timestamp(*seconds, *nanos, utc)
                .unwrap_or_else(|| format!("{}s {}ns", seconds, nanos));
            Value::String(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use pbinspect_testing::TestCases;
    use serde_json::{json, Value};

    use super::{json_value, DuplicateMember, JsonBuilder, JsonSink};
    use crate::scalar::DecodedValue;

    #[test]
    fn test_json_builder() {
        let mut builder = JsonBuilder::new();
        builder.begin_object();
        builder.set_member_name("id", DuplicateMember::Merge);
        builder.write_value(json!(1));
        builder.set_member_name("tags", DuplicateMember::Merge);
        builder.begin_array();
        builder.write_value(json!("a"));
        builder.write_value(json!("b"));
        builder.end_array();
        builder.set_member_name("inner", DuplicateMember::Merge);
        builder.begin_object();
        builder.set_member_name("x", DuplicateMember::Merge);
        builder.write_value(json!(true));
        builder.end_object();
        builder.end_object();

        assert_eq!(
            builder.into_value(),
            Some(json!({
                "id": 1,
                "tags": ["a", "b"],
                "inner": {"x": true},
            }))
        );
    }

    #[test]
    fn test_json_builder_merges_duplicates() {
        let mut builder = JsonBuilder::new();
        builder.begin_object();
        for (name, val) in [("1", 10), ("2", 20), ("1", 11), ("1", 12)] {
            builder.set_member_name(name, DuplicateMember::Merge);
            builder.write_value(json!(val));
        }
        builder.set_member_name("3", DuplicateMember::Merge);
        builder.begin_array();
        builder.write_value(json!(1));
        builder.end_array();
        builder.set_member_name("3", DuplicateMember::Merge);
        builder.begin_array();
        builder.write_value(json!(2));
        builder.end_array();
        builder.end_object();

        assert_eq!(
            builder.into_value(),
            Some(json!({"1": [10, 11, 12], "2": 20, "3": [1, 2]}))
        );
    }

    #[test]
    fn test_json_builder_replaces_duplicates() {
        let mut builder = JsonBuilder::new();
        builder.begin_object();
        for (name, val) in [("id", 1), ("tag", 5), ("id", 2), ("tag", 6)] {
            let duplicate = if name == "id" {
                DuplicateMember::Replace
            } else {
                DuplicateMember::Merge
            };
            builder.set_member_name(name, duplicate);
            builder.write_value(json!(val));
        }
        builder.end_object();

        assert_eq!(builder.into_value(), Some(json!({"id": 2, "tag": [5, 6]})));
    }

    #[test]
    fn test_incomplete_value() {
        let mut builder = JsonBuilder::new();
        builder.begin_object();
        assert_eq!(builder.into_value(), None);
    }

    #[test]
    fn test_json_value() {
        #[derive(Debug)]
        struct Case {
            value: DecodedValue,
            expected: Value,
        }

        let cases = [
            Case {
                value: DecodedValue::Int32(-5),
                expected: json!(-5),
            },
            Case {
                value: DecodedValue::Int64(-5),
                expected: json!("-5"),
            },
            Case {
                value: DecodedValue::UInt64(u64::MAX),
                expected: json!("18446744073709551615"),
            },
            Case {
                value: DecodedValue::Float(1.1),
                expected: json!(1.1),
            },
            Case {
                value: DecodedValue::Double(f64::NAN),
                expected: json!("NaN"),
            },
            Case {
                value: DecodedValue::Float(f32::NEG_INFINITY),
                expected: json!("-Infinity"),
            },
            Case {
                value: DecodedValue::Bytes(b"hello".to_vec()),
                expected: json!("aGVsbG8="),
            },
            Case {
                value: DecodedValue::Enum {
                    number: 2,
                    name: Some("BLUE".into()),
                },
                expected: json!("BLUE"),
            },
            Case {
                value: DecodedValue::Enum {
                    number: 7,
                    name: None,
                },
                expected: json!(7),
            },
            Case {
                value: DecodedValue::Timestamp {
                    seconds: 0,
                    nanos: 0,
                },
                expected: json!("1970-01-01T00:00:00Z"),
            },
        ];

        cases.test_each(|case| {
            assert_eq!(json_value(&case.value, true), case.expected);
        });
    }
}
