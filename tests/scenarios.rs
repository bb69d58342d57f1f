use pbinspect::schema::{
    FieldDescriptor, FieldType, Label, MessageDescriptor, SchemaBuilder, SchemaRepository,
};
use pbinspect::wire::varint::{decode_varint, VarintStrictness};
use pbinspect::wire::{ByteCursor, Records, WireType};
use pbinspect::{
    decode_batch, decode_to_tree, format_timestamp, DecodeOptions, DecodedValue, DiagnosticKind,
    ErrorKind, Severity, MAX_RECURSION_DEPTH,
};
use pbinspect_testing::{encode_varint, MessageBuilder, TestCases};
use serde_json::json;

fn schema() -> SchemaRepository {
    SchemaBuilder::new()
        .with_timestamp()
        .message(
            MessageDescriptor::new("test.Node")
                .with_field(
                    FieldDescriptor::new("child", 1, FieldType::Message).with_type_name("test.Node"),
                )
                .with_field(FieldDescriptor::new("value", 2, FieldType::UInt32)),
        )
        .message(
            MessageDescriptor::new("test.Record")
                .with_field(FieldDescriptor::new("id", 1, FieldType::UInt64).with_label(Label::Required))
                .with_field(FieldDescriptor::new("note", 2, FieldType::String))
                .with_field(
                    FieldDescriptor::new("created", 3, FieldType::Message)
                        .with_type_name("google.protobuf.Timestamp"),
                )
                .with_field(
                    FieldDescriptor::new("readings", 4, FieldType::Fixed32)
                        .with_label(Label::Repeated)
                        .with_packed(true),
                ),
        )
        .build()
}

/// Build a `test.Node` whose innermost message is at `depth`.
fn nested_nodes(depth: u32) -> MessageBuilder {
    let mut msg = MessageBuilder::new().varint(2, depth as u64);
    for _ in 0..depth {
        msg = MessageBuilder::new().message(1, msg);
    }
    msg
}

#[test]
fn test_varint_field() {
    let buf = [0x08, 0x96, 0x01];
    let decoded = decode_to_tree(&buf, None, None, &DecodeOptions::default());

    let summary = decoded.result.unwrap();
    assert_eq!(summary.bytes_consumed, 3);
    assert_eq!(summary.field_count, 1);

    let field = decoded.tree.find("#1 varint").unwrap();
    assert_eq!(field.value(), Some(&DecodedValue::UInt32(150)));
}

#[test]
fn test_length_delimited_field() {
    let buf = [0x12, 0x03, 0x62, 0x61, 0x72];

    let record = Records::new(ByteCursor::new(&buf)).next().unwrap().unwrap();
    assert_eq!(record.field_number, 2);
    assert_eq!(record.wire_type, WireType::LengthDelimited);
    assert_eq!(record.payload, b"bar");

    let decoded = decode_to_tree(&buf, None, None, &DecodeOptions::default());
    let field = decoded.tree.find("#2 len").unwrap();
    assert_eq!(field.value(), Some(&DecodedValue::Bytes(b"bar".to_vec())));
}

#[test]
fn test_missing_required_field_is_not_fatal() {
    let schema = schema();
    let buf = MessageBuilder::new().string(2, "hello").build();

    let decoded = decode_to_tree(&buf, Some(&schema), Some("test.Record"), &DecodeOptions::default());
    assert!(decoded.result.is_ok());

    let diagnostics: Vec<_> = decoded.tree.diagnostics().collect();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].kind,
        DiagnosticKind::MissingRequiredField("id".into())
    );
    assert_eq!(diagnostics[0].severity(), Severity::Warning);
}

#[test]
fn test_epoch_timestamp() {
    let schema = schema();
    let buf = MessageBuilder::new()
        .varint(1, 1)
        .message(3, MessageBuilder::new())
        .build();

    let opts = DecodeOptions {
        display_json_mapping: true,
        ..Default::default()
    };
    let decoded = decode_to_tree(&buf, Some(&schema), Some("test.Record"), &opts);
    assert!(decoded.result.is_ok());
    assert_eq!(
        decoded.tree.find("created (3)").unwrap().label(),
        "created (3): 1970-01-01T00:00:00Z"
    );
    assert_eq!(
        decoded.json,
        Some(json!({"id": "1", "created": "1970-01-01T00:00:00Z"}))
    );

    let opts = DecodeOptions {
        use_utc_for_timestamps: false,
        ..Default::default()
    };
    let decoded = decode_to_tree(&buf, Some(&schema), Some("test.Record"), &opts);
    let local = format_timestamp(0, 0, false).unwrap();
    assert_eq!(
        decoded.tree.find("created (3)").unwrap().label(),
        format!("created (3): {}", local)
    );
}

#[test]
fn test_recursion_limit() {
    #[derive(Debug)]
    struct Case {
        max_depth: u32,
    }

    let cases = [
        Case { max_depth: 0 },
        Case { max_depth: 1 },
        Case { max_depth: 5 },
        Case { max_depth: 100 },
    ];

    let schema = schema();
    cases.test_each(|case| {
        let opts = DecodeOptions {
            max_recursion_depth: case.max_depth,
            ..Default::default()
        };

        let buf = nested_nodes(case.max_depth).build();
        let decoded = decode_to_tree(&buf, Some(&schema), Some("test.Node"), &opts);
        assert!(decoded.result.is_ok());

        let buf = nested_nodes(case.max_depth + 1).build();
        let decoded = decode_to_tree(&buf, Some(&schema), Some("test.Node"), &opts);
        let err = decoded.result.err().unwrap();
        assert_eq!(
            err.kind(),
            &ErrorKind::RecursionLimitExceeded {
                limit: case.max_depth
            }
        );
        assert_eq!(err.field(), Some(1));
    });
}

#[test]
fn test_recursion_depth_ceiling() {
    #[derive(Debug)]
    struct Case {
        max_depth: u32,
        nesting: u32,
    }

    let cases = [
        Case {
            max_depth: MAX_RECURSION_DEPTH + 1,
            nesting: MAX_RECURSION_DEPTH + 1,
        },
        Case {
            max_depth: 1_000_000,
            nesting: 2_000,
        },
        Case {
            max_depth: u32::MAX,
            nesting: 2_000,
        },
    ];

    let schema = schema();
    cases.test_each(|case| {
        let opts = DecodeOptions {
            max_recursion_depth: case.max_depth,
            ..Default::default()
        };

        let good = nested_nodes(MAX_RECURSION_DEPTH).build();
        let deep = nested_nodes(case.nesting).build();
        let results = decode_batch(&[deep, good], Some(&schema), Some("test.Node"), &opts);

        let err = results[0].result.as_ref().err().unwrap();
        assert_eq!(
            err.kind(),
            &ErrorKind::RecursionLimitExceeded {
                limit: MAX_RECURSION_DEPTH
            }
        );
        assert!(results[1].result.is_ok());
    });
}

#[test]
fn test_timestamp_does_not_count_towards_depth() {
    let schema = schema();
    let buf = MessageBuilder::new()
        .varint(1, 1)
        .message(3, MessageBuilder::new().varint(1, 60))
        .build();

    let opts = DecodeOptions {
        max_recursion_depth: 0,
        ..Default::default()
    };
    let decoded = decode_to_tree(&buf, Some(&schema), Some("test.Record"), &opts);
    assert!(decoded.result.is_ok());
    assert_eq!(
        decoded.tree.find("created (3)").unwrap().label(),
        "created (3): 1970-01-01T00:01:00Z"
    );

    // A timestamp which can't be read as one is decoded as a message.
    let buf = MessageBuilder::new()
        .varint(1, 1)
        .message(3, MessageBuilder::new().string(1, "x"))
        .build();
    let decoded = decode_to_tree(&buf, Some(&schema), Some("test.Record"), &opts);
    assert_eq!(
        decoded.result.err().map(|e| e.kind().clone()),
        Some(ErrorKind::RecursionLimitExceeded { limit: 0 })
    );
}

#[test]
fn test_packed_fixed32_length() {
    #[derive(Debug)]
    struct Case {
        len: usize,
    }

    let cases = (0..=13).map(|len| Case { len });

    let schema = schema();
    cases.test_each(|case| {
        let payload = vec![0x11; case.len];
        let buf = MessageBuilder::new().varint(1, 1).bytes(4, &payload).build();
        let decoded = decode_to_tree(&buf, Some(&schema), Some("test.Record"), &DecodeOptions::default());

        if case.len % 4 == 0 {
            assert!(decoded.result.is_ok());
            let readings = decoded.tree.find("readings (4)").unwrap();
            assert_eq!(readings.children().len(), case.len / 4);
        } else {
            let err = decoded.result.err().unwrap();
            assert_eq!(
                err.kind(),
                &ErrorKind::PackedLengthMismatch {
                    len: case.len,
                    element_size: 4
                }
            );
        }
    });
}

#[test]
fn test_records_cover_message() {
    let buf = MessageBuilder::new()
        .varint(1, 1)
        .string(2, "a longer string value")
        .fixed64(3, 9)
        .fixed32(4, 9)
        .message(5, MessageBuilder::new().varint(1, 2).string(2, "x"))
        .varint(1_000_000, u64::MAX)
        .build();

    let mut next_offset = 0;
    for record in Records::new(ByteCursor::new(&buf)) {
        let record = record.unwrap();
        assert_eq!(record.offset, next_offset);
        next_offset += record.encoded_len();
    }
    assert_eq!(next_offset, buf.len());

    let decoded = decode_to_tree(&buf, None, None, &DecodeOptions::default());
    assert_eq!(decoded.result.unwrap().bytes_consumed, buf.len());
}

#[test]
fn test_varint_values() {
    #[derive(Debug)]
    struct Case {
        value: u64,
    }

    let cases = [0, 1, 127, 128, 300, u32::MAX as u64, 1 << 63, u64::MAX].map(|value| Case { value });

    cases.test_each(|case| {
        let encoded = encode_varint(case.value);
        let decoded = decode_varint(&encoded, VarintStrictness::Strict);
        assert_eq!(decoded, Ok((case.value, encoded.len())));
    });
}

#[test]
fn test_group_wire_types_are_fatal() {
    #[derive(Debug)]
    struct Case {
        wire_type: u64,
        show_all: bool,
    }

    let cases = [
        Case {
            wire_type: 3,
            show_all: false,
        },
        Case {
            wire_type: 4,
            show_all: false,
        },
        Case {
            wire_type: 3,
            show_all: true,
        },
        Case {
            wire_type: 4,
            show_all: true,
        },
    ];

    cases.test_each(|case| {
        let buf = MessageBuilder::new()
            .varint(1, 1)
            .raw_tag(2, case.wire_type)
            .varint(3, 1)
            .build();
        let opts = DecodeOptions {
            show_all_possible_field_types: case.show_all,
            ..Default::default()
        };
        let decoded = decode_to_tree(&buf, None, None, &opts);

        let err = decoded.result.err().unwrap();
        assert_eq!(
            err.kind(),
            &ErrorKind::UnsupportedWireType(case.wire_type as u8)
        );
        assert_eq!(err.offset(), 2);

        // The field before the error is still in the tree, but not the one
        // after it.
        assert!(decoded.tree.find("#1 varint").is_some());
        assert!(decoded.tree.find("#3").is_none());
    });
}

#[test]
fn test_varint_strictness() {
    // 150 encoded with a redundant trailing byte.
    let buf = [0x08, 0x96, 0x81, 0x00];

    let decoded = decode_to_tree(&buf, None, None, &DecodeOptions::default());
    assert_eq!(
        decoded.tree.find("#1").and_then(|n| n.value()),
        Some(&DecodedValue::UInt32(150))
    );

    let opts = DecodeOptions {
        varint_strictness: VarintStrictness::Strict,
        ..Default::default()
    };
    let decoded = decode_to_tree(&buf, None, None, &opts);
    assert_eq!(
        decoded.result.err().map(|e| e.kind().clone()),
        Some(ErrorKind::InvalidVarint)
    );
}

#[test]
fn test_batch_failures_are_isolated() {
    let schema = schema();
    let good = MessageBuilder::new().varint(2, 5).build();
    let truncated = MessageBuilder::new().varint(2, 5).raw(&[0x12, 0x05, 0x01]).build();
    let too_deep = nested_nodes(3).build();

    let opts = DecodeOptions {
        max_recursion_depth: 2,
        ..Default::default()
    };
    let buffers = [good.clone(), truncated, good, too_deep];
    let results = decode_batch(&buffers, Some(&schema), Some("test.Node"), &opts);

    let kinds: Vec<_> = results
        .iter()
        .map(|d| d.result.as_ref().err().map(|e| e.kind().clone()))
        .collect();
    assert_eq!(
        kinds,
        [
            None,
            Some(ErrorKind::LengthDriftError {
                declared: 5,
                available: 1
            }),
            None,
            Some(ErrorKind::RecursionLimitExceeded { limit: 2 }),
        ]
    );

    // Each failed message has exactly one error diagnostic, on the innermost
    // message.
    for decoded in results.iter().filter(|d| d.result.is_err()) {
        let errors = decoded
            .tree
            .diagnostics()
            .filter(|d| d.severity() == Severity::Error)
            .count();
        assert_eq!(errors, 1);
    }
}
