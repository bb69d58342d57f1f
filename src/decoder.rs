use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::defaults::{synthesize_defaults, SeenSet, SEEN_SET_CAPACITY};
use crate::errors::{DecodeError, Diagnostic, DiagnosticKind, ErrorKind};
use crate::options::{DecodeOptions, MAX_RECURSION_DEPTH};
use crate::output::{
    DecodeTree, DuplicateMember, JsonBuilder, JsonMember, JsonSink, NodeId, OutputProjector,
};
use crate::packed::decode_packed;
use crate::resolve::{resolve, resolve_heuristic, ResolvedType};
use crate::scalar::{decode_scalar, DecodedValue, ScalarError};
use crate::schema::{EnumDescriptor, FieldDescriptor, FieldType, MessageDescriptor, SchemaRepository};
use crate::timestamp::read_timestamp;
use crate::wire::{read_record, ByteCursor, Records, WireRecord, WireType};

/// Statistics about a successfully decoded message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DecodeSummary {
    /// Number of bytes consumed. This is always the length of the input.
    pub bytes_consumed: usize,

    /// Number of fields in the outermost message.
    pub field_count: usize,
}

/// Error which aborted decoding of a message, and whether it has already been
/// attached to the node of the message it occurred in.
struct Failure {
    error: DecodeError,
    reported: bool,
}

impl From<DecodeError> for Failure {
    fn from(error: DecodeError) -> Self {
        Failure {
            error,
            reported: false,
        }
    }
}

/// State for decoding one message.
struct MessageDecodeContext<'s> {
    /// Schema of the message, if known.
    message: Option<&'s MessageDescriptor>,

    /// Nesting depth. The outermost message is at depth zero.
    depth: u32,

    /// Tree node that fields are added to.
    node: NodeId,

    /// Absolute offset of the start of the message.
    offset: usize,

    seen: SeenSet,
    field_count: usize,
}

impl<'s> MessageDecodeContext<'s> {
    fn new(message: Option<&'s MessageDescriptor>, depth: u32, node: NodeId, offset: usize) -> Self {
        Self {
            message,
            depth,
            node,
            offset,
            seen: SeenSet::new(),
            field_count: 0,
        }
    }
}

/// Decodes Protocol Buffers messages, using a schema where available.
///
/// ```
/// use pbinspect::{DecodeOptions, DecodeTree, MessageDecoder, OutputProjector};
///
/// let options = DecodeOptions::default();
/// let decoder = MessageDecoder::new(None, &options);
///
/// let mut tree = DecodeTree::new();
/// let mut out = OutputProjector::new(&mut tree, None, &options);
/// let summary = decoder.decode(&[0x08, 0x96, 0x01], None, &mut out).unwrap();
/// assert_eq!(summary.field_count, 1);
///
/// assert_eq!(tree.render(), "message (3 bytes, 1 fields)\n  #1 varint: 150\n");
/// ```
pub struct MessageDecoder<'s> {
    schema: Option<&'s SchemaRepository>,
    options: &'s DecodeOptions,
}

impl<'s> MessageDecoder<'s> {
    pub fn new(schema: Option<&'s SchemaRepository>, options: &'s DecodeOptions) -> Self {
        Self { schema, options }
    }

    /// Decode the message in `buf` and write it to `out`.
    ///
    /// `message_type` is the fully qualified name of the message type in the
    /// schema. If it is not set, or not found, the message is decoded without
    /// a schema.
    ///
    /// The tree receives a node for the message, even if decoding fails. Any
    /// error is attached as a diagnostic to the node of the innermost message
    /// in which it occurred, and also returned.
    pub fn decode(
        &self,
        buf: &[u8],
        message_type: Option<&str>,
        out: &mut OutputProjector,
    ) -> Result<DecodeSummary, DecodeError> {
        let cursor = ByteCursor::new(buf).with_strictness(self.options.varint_strictness);
        let message = self.find_message_type(message_type);
        let type_label = message
            .map(|m| m.full_name())
            .or(message_type)
            .unwrap_or("message")
            .to_string();

        let root = out.root();
        let node = out.node(root, type_label.clone());
        if let (Some(name), Some(_), None) = (message_type, self.schema, message) {
            let diag = Diagnostic::new(DiagnosticKind::UnknownMessageType(name.to_string()), 0);
            self.report(out, node, diag);
        }

        let mut ctx = MessageDecodeContext::new(message, 0, node, 0);
        let timestamp = message
            .filter(|m| m.is_timestamp())
            .and_then(|_| read_timestamp(cursor.clone()));

        let result = if let Some((seconds, nanos)) = timestamp {
            ctx.field_count = Records::new(cursor).count();
            let value = DecodedValue::Timestamp { seconds, nanos };
            out.json_root_value(&value);
            out.value(node, "value", value, None, false);
            Ok(())
        } else {
            out.begin_object(None);
            let result = self.decode_message(cursor, &mut ctx, out);
            out.end_object();
            result
        };

        out.set_label(
            node,
            format!(
                "{} ({} bytes, {} fields)",
                type_label,
                buf.len(),
                ctx.field_count
            ),
        );

        result
            .map(|_| DecodeSummary {
                bytes_consumed: buf.len(),
                field_count: ctx.field_count,
            })
            .map_err(|failure| failure.error)
    }

    fn find_message_type(&self, name: Option<&str>) -> Option<&'s MessageDescriptor> {
        self.schema?.find_message_type(name?)
    }

    fn find_enum(&self, field: Option<&FieldDescriptor>) -> Option<&'s EnumDescriptor> {
        let name = field?.type_name()?;
        self.schema?.find_enum(name)
    }

    fn report(&self, out: &mut OutputProjector, node: NodeId, diagnostic: Diagnostic) {
        warn!(
            offset = diagnostic.offset,
            field = diagnostic.field,
            "{}",
            diagnostic
        );
        out.attach_diagnostic(node, diagnostic);
    }

    /// Decode the fields of a message spanned by `cursor`, then handle fields
    /// that were missing.
    ///
    /// If decoding fails, the error is attached to the message's node unless a
    /// nested message already reported it.
    fn decode_message(
        &self,
        cursor: ByteCursor,
        ctx: &mut MessageDecodeContext<'s>,
        out: &mut OutputProjector,
    ) -> Result<(), Failure> {
        match self.decode_fields(cursor, ctx, out) {
            Ok(()) => {
                self.add_missing_fields(ctx, out);
                Ok(())
            }
            Err(mut failure) => {
                if !failure.reported {
                    let error = failure
                        .error
                        .with_message_type(ctx.message.map(|m| m.full_name()));
                    let diag = Diagnostic {
                        offset: error.offset(),
                        field: error.field(),
                        kind: DiagnosticKind::Failed(error.clone()),
                    };
                    self.report(out, ctx.node, diag);
                    failure = Failure {
                        error,
                        reported: true,
                    };
                }
                Err(failure)
            }
        }
    }

    fn decode_fields(
        &self,
        mut cursor: ByteCursor,
        ctx: &mut MessageDecodeContext<'s>,
        out: &mut OutputProjector,
    ) -> Result<(), Failure> {
        while !cursor.is_empty() {
            let record = read_record(&mut cursor)?;
            trace!(
                field = record.field_number,
                wire_type = record.wire_type.name(),
                offset = record.offset,
                len = record.encoded_len(),
                "read record"
            );
            ctx.field_count += 1;
            ctx.seen.insert(record.field_number);
            self.decode_field(&cursor, &record, ctx, out)?;
        }
        Ok(())
    }

    fn decode_field<'b>(
        &self,
        cursor: &ByteCursor<'b>,
        record: &WireRecord<'b>,
        ctx: &mut MessageDecodeContext<'s>,
        out: &mut OutputProjector,
    ) -> Result<(), Failure> {
        let number = record.field_number;
        let field = match (self.schema, ctx.message) {
            (Some(schema), Some(message)) => schema.find_field(message, number),
            _ => None,
        };

        let (prefix, member) = match field {
            Some(field) => (
                format!("{} ({})", field.name(), number),
                JsonMember {
                    number,
                    name: field.json_name().to_string(),
                    repeated: field.is_repeated(),
                    duplicate: if field.is_repeated() {
                        DuplicateMember::Merge
                    } else {
                        DuplicateMember::Replace
                    },
                },
            ),
            None => (
                format!("#{} {}", number, record.wire_type),
                JsonMember::unnamed(number),
            ),
        };

        if let Some(field) = field {
            if field.is_packed() && record.wire_type == WireType::LengthDelimited {
                return self.decode_packed_field(cursor, record, field, &prefix, &member, ctx, out);
            }
        }

        let (resolved, mismatch) = resolve(record, field, self.options);
        if let (ResolvedType::Declared(FieldType::Message), Some(field)) = (&resolved, field) {
            return self.decode_nested(cursor, record, field, &prefix, &member, ctx, out);
        }

        let enum_type = self.find_enum(field);
        let (value, diagnostic) = self.decode_value(record, &resolved, enum_type);
        let node = out.value(ctx.node, &prefix, value, Some(&member), false);

        if let Some(mismatch) = mismatch {
            let kind = DiagnosticKind::FieldTypeMismatch {
                declared: mismatch.declared,
                wire_type: mismatch.wire_type,
            };
            self.report(out, node, Diagnostic::for_field(kind, record.offset, number));
        }
        if let Some(kind) = diagnostic {
            self.report(out, node, Diagnostic::for_field(kind, record.offset, number));
        }

        if let ResolvedType::Candidates(types) = &resolved {
            for &ty in types {
                if let Ok(value) = decode_scalar(ty, record.payload, record.value, None) {
                    out.value(node, &format!("as {}", ty), value, None, false);
                }
            }
        }

        Ok(())
    }

    /// Decode the primary value of a scalar field.
    ///
    /// Values which can't be decoded as the resolved type are decoded
    /// heuristically instead, with a diagnostic if the type came from the
    /// schema.
    fn decode_value(
        &self,
        record: &WireRecord,
        resolved: &ResolvedType,
        enum_type: Option<&EnumDescriptor>,
    ) -> (DecodedValue, Option<DiagnosticKind>) {
        let ty = resolved.primary();
        let declared = matches!(resolved, ResolvedType::Declared(_));

        match decode_scalar(ty, record.payload, record.value, enum_type) {
            Ok(value) => (value, None),
            Err(ScalarError::InvalidUtf8) => {
                let diag = declared.then_some(DiagnosticKind::InvalidUtf8);
                (DecodedValue::Bytes(record.payload.to_vec()), diag)
            }
            Err(ScalarError::InvalidBool | ScalarError::NotScalar) => {
                let fallback = resolve_heuristic(record, self.options).primary();
                let value = decode_scalar(fallback, record.payload, record.value, None)
                    .unwrap_or_else(|_| DecodedValue::Bytes(record.payload.to_vec()));
                let diag = declared.then_some(DiagnosticKind::FieldTypeMismatch {
                    declared: ty,
                    wire_type: record.wire_type,
                });
                (value, diag)
            }
        }
    }

    fn decode_packed_field<'b>(
        &self,
        cursor: &ByteCursor<'b>,
        record: &WireRecord<'b>,
        field: &FieldDescriptor,
        prefix: &str,
        member: &JsonMember,
        ctx: &mut MessageDecodeContext<'s>,
        out: &mut OutputProjector,
    ) -> Result<(), Failure> {
        let payload = cursor.sub_cursor(record.payload, record.payload_offset);
        let values = decode_packed(payload, field.field_type(), self.find_enum(Some(field)))
            .map_err(|err| err.with_field(record.field_number))?;

        trace!(
            field = record.field_number,
            count = values.len(),
            "decoded packed field"
        );

        let node = out.node(
            ctx.node,
            format!("{}: packed ({} values)", prefix, values.len()),
        );
        for (i, value) in values.into_iter().enumerate() {
            out.value(node, &format!("[{}]", i), value, Some(member), false);
        }
        Ok(())
    }

    fn decode_nested<'b>(
        &self,
        cursor: &ByteCursor<'b>,
        record: &WireRecord<'b>,
        field: &FieldDescriptor,
        prefix: &str,
        member: &JsonMember,
        ctx: &mut MessageDecodeContext<'s>,
        out: &mut OutputProjector,
    ) -> Result<(), Failure> {
        let type_name = field.type_name();
        let nested = self.find_message_type(type_name);
        let payload = cursor.sub_cursor(record.payload, record.payload_offset);

        if let Some(nested) = nested.filter(|m| m.is_timestamp()) {
            if let Some((seconds, nanos)) = read_timestamp(payload.clone()) {
                trace!(message_type = nested.full_name(), "decoded timestamp");
                let value = DecodedValue::Timestamp { seconds, nanos };
                out.value(ctx.node, prefix, value, Some(member), false);
                return Ok(());
            }
        }

        let depth = ctx.depth + 1;
        let limit = self.options.max_recursion_depth.min(MAX_RECURSION_DEPTH);
        if depth > limit {
            return Err(DecodeError::new(
                ErrorKind::RecursionLimitExceeded { limit },
                record.payload_offset,
            )
            .with_field(record.field_number)
            .into());
        }

        debug!(
            depth,
            field = record.field_number,
            message_type = type_name,
            "decoding embedded message"
        );

        let node = out.message_node(ctx.node, prefix, nested.map(|m| m.full_name()).or(type_name));
        if nested.is_none() {
            let name = type_name.unwrap_or_default().to_string();
            let diag = Diagnostic::for_field(
                DiagnosticKind::UnknownMessageType(name),
                record.offset,
                record.field_number,
            );
            self.report(out, node, diag);
        }

        let mut child = MessageDecodeContext::new(nested, depth, node, record.payload_offset);
        out.begin_object(Some(member));
        let result = self.decode_message(payload, &mut child, out);
        out.end_object();
        result
    }

    /// Report missing required fields and generate values for other missing
    /// fields.
    fn add_missing_fields(&self, ctx: &MessageDecodeContext<'s>, out: &mut OutputProjector) {
        let (Some(schema), Some(message)) = (self.schema, ctx.message) else {
            return;
        };

        if ctx.seen.overflowed() {
            let diag = Diagnostic::new(
                DiagnosticKind::SeenSetOverflow {
                    capacity: SEEN_SET_CAPACITY,
                },
                ctx.offset,
            );
            self.report(out, ctx.node, diag);
            return;
        }

        let missing = synthesize_defaults(schema, message, &ctx.seen, self.options.add_default_value);
        for field in missing.required {
            let diag = Diagnostic::for_field(
                DiagnosticKind::MissingRequiredField(field.name().to_string()),
                ctx.offset,
                field.number(),
            );
            self.report(out, ctx.node, diag);
        }

        for (field, value) in missing.generated {
            debug!(
                message_type = message.full_name(),
                field = field.number(),
                "generated default value"
            );
            let member = JsonMember {
                number: field.number(),
                name: field.json_name().to_string(),
                repeated: false,
                duplicate: DuplicateMember::Replace,
            };
            let prefix = format!("{} ({})", field.name(), field.number());
            out.value(ctx.node, &prefix, value, Some(&member), true);
        }
    }
}

/// Result of [`decode_to_tree`].
#[derive(Debug)]
pub struct Decoded {
    pub tree: DecodeTree,

    /// JSON mapping of the message, if enabled by
    /// [`display_json_mapping`](DecodeOptions::display_json_mapping).
    ///
    /// If decoding failed, this contains the fields decoded up to the error.
    pub json: Option<Value>,

    pub result: Result<DecodeSummary, DecodeError>,
}

/// Decode a message into a new [`DecodeTree`] and, if enabled, its JSON
/// mapping.
///
/// ```
/// use pbinspect::{decode_to_tree, DecodeOptions};
///
/// let options = DecodeOptions {
///     display_json_mapping: true,
///     ..Default::default()
/// };
/// let decoded = decode_to_tree(&[0x08, 0x96, 0x01], None, None, &options);
/// assert!(decoded.result.is_ok());
/// assert_eq!(decoded.json, Some(serde_json::json!({"1": 150})));
/// ```
pub fn decode_to_tree(
    buf: &[u8],
    schema: Option<&SchemaRepository>,
    message_type: Option<&str>,
    options: &DecodeOptions,
) -> Decoded {
    let mut tree = DecodeTree::new();
    let mut json = options.display_json_mapping.then(JsonBuilder::new);

    let result = {
        let json_sink = json.as_mut().map(|j| j as &mut dyn JsonSink);
        let mut out = OutputProjector::new(&mut tree, json_sink, options);
        MessageDecoder::new(schema, options).decode(buf, message_type, &mut out)
    };

    Decoded {
        tree,
        json: json.and_then(JsonBuilder::into_value),
        result,
    }
}

/// Decode several independent messages of the same type in parallel.
///
/// Results are returned in the same order as `buffers`. A failure to decode
/// one message does not affect the others.
pub fn decode_batch<B: AsRef<[u8]> + Sync>(
    buffers: &[B],
    schema: Option<&SchemaRepository>,
    message_type: Option<&str>,
    options: &DecodeOptions,
) -> Vec<Decoded> {
    buffers
        .par_iter()
        .map(|buf| decode_to_tree(buf.as_ref(), schema, message_type, options))
        .collect()
}
