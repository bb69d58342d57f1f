//! Low-level Protocol Buffers wire format reader.
//!
//! This module reads the framing primitives of the wire format from an
//! in-memory buffer: varints, tags, fixed-width values and length-delimited
//! payloads. It does not know anything about schemas. Interpreting the values
//! is the job of [`MessageDecoder`](crate::MessageDecoder).
//!
//! The main types are:
//!
//! - [`ByteCursor`], which reads primitives and tracks the offset in the
//!   original capture so errors can be located
//! - [`WireRecord`], a tag plus its value, produced by [`read_record`] or by
//!   iterating over [`Records`]
//! - [`Fields`] and [`DecodeMessage`], a typed layer used to decode messages
//!   with a schema that is fixed at compile time
//!
//! See <https://protobuf.dev/programming-guides/encoding/> for a guide to the
//! encoding.

mod cursor;
mod field;
mod record;
pub mod varint;

pub use cursor::ByteCursor;
pub use field::{DecodeMessage, Field, Fields};
pub use record::{read_record, Records, WireRecord, WireType};
pub use varint::VarintStrictness;
