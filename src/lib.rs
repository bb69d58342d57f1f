//! pbinspect decodes captured Protocol Buffers messages into a tree of
//! labeled fields, for display in protocol analyzers and debugging tools.
//!
//! Unlike a generated message parser, pbinspect decodes whatever bytes it is
//! given. Fields that are not described by a schema are still shown, using
//! their field number and a best guess at their type. Problems such as
//! mismatched wire types are reported as diagnostics on the affected field
//! instead of aborting decoding.
//!
//! # Decoding messages
//!
//! The basic workflow is:
//!
//! 1. Optionally, load a schema into a [`SchemaRepository`]. Schemas are
//!    usually loaded from a serialized `FileDescriptorSet`, produced with
//!    `protoc --descriptor_set_out`, using
//!    [`SchemaRepository::from_descriptor_set`]. They can also be built in
//!    code using [`SchemaBuilder`](schema::SchemaBuilder).
//! 2. Configure decoding using [`DecodeOptions`].
//! 3. Decode a message using [`decode_to_tree`], or several messages in
//!    parallel using [`decode_batch`]. For control over where the output goes,
//!    use [`MessageDecoder`] with an [`OutputProjector`].
//!
//! ```
//! use pbinspect::schema::{FieldDescriptor, FieldType, MessageDescriptor, SchemaBuilder};
//! use pbinspect::{decode_to_tree, DecodeOptions};
//!
//! let schema = SchemaBuilder::new()
//!     .message(
//!         MessageDescriptor::new("demo.Point")
//!             .with_field(FieldDescriptor::new("x", 1, FieldType::SInt32))
//!             .with_field(FieldDescriptor::new("y", 2, FieldType::SInt32)),
//!     )
//!     .build();
//!
//! let decoded = decode_to_tree(&[0x08, 0x03, 0x10, 0x04], Some(&schema), Some("demo.Point"), &DecodeOptions::default());
//! assert!(decoded.result.is_ok());
//! assert_eq!(
//!     decoded.tree.render(),
//!     "demo.Point (4 bytes, 2 fields)\n  x (1): -2\n  y (2): 2\n"
//! );
//! ```
//!
//! # Output
//!
//! Decoded values are written to a [`TreeSink`], which receives one node per
//! field, and optionally a [`JsonSink`], which receives the message in the
//! [Protocol Buffers JSON mapping](https://protobuf.dev/programming-guides/json/).
//! [`DecodeTree`] and [`JsonBuilder`] are the standard implementations.
//!
//! # Errors
//!
//! Structural problems with the encoding, such as a truncated varint, stop
//! decoding of the message with a [`DecodeError`]. Fields decoded before the
//! error are kept in the output. Batch decoding isolates errors so that a
//! malformed message does not affect the others.
//!
//! # Logging
//!
//! pbinspect emits [tracing](https://docs.rs/tracing) events. Diagnostics are
//! logged at the `WARN` level, entry into embedded messages at `DEBUG` and
//! individual wire records at `TRACE`.

#![forbid(unsafe_code)]

mod decoder;
mod defaults;
mod env;
mod errors;
mod options;
mod output;
mod packed;
mod resolve;
mod scalar;
pub mod schema;
mod timestamp;
pub mod wire;

pub use decoder::{decode_batch, decode_to_tree, DecodeSummary, Decoded, MessageDecoder};
pub use defaults::SEEN_SET_CAPACITY;
pub use errors::{DecodeError, Diagnostic, DiagnosticKind, ErrorKind, Severity};
pub use options::{
    AddDefaultValue, DecodeOptions, OptionsError, ENV_PREFIX, MAX_RECURSION_DEPTH,
};
pub use output::{
    json_value, DecodeTree, DuplicateMember, JsonBuilder, JsonMember, JsonSink, NodeId,
    OutputProjector, TreeNode, TreeSink,
};
pub use packed::decode_packed;
pub use resolve::{resolve, resolve_declared, resolve_heuristic, ResolvedType, TypeMismatch};
pub use scalar::{decode_scalar, DecodedValue, ScalarError};
pub use schema::SchemaRepository;
pub use timestamp::format_timestamp;
