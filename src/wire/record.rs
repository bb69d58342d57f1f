use std::fmt::{Display, Formatter};

use crate::errors::{DecodeError, ErrorKind};
use crate::wire::cursor::ByteCursor;

/// How the value of a field is framed.
///
/// See <https://protobuf.dev/programming-guides/encoding/#structure>.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WireType {
    /// Integer value encoded as a varint.
    Varint = 0,

    /// 64-bit fixed-width little-endian value.
    Fixed64 = 1,

    /// A variable-length value with a size specified in bytes.
    LengthDelimited = 2,

    /// Deprecated start-of-group marker.
    StartGroup = 3,

    /// Deprecated end-of-group marker.
    EndGroup = 4,

    /// 32-bit fixed-width little-endian value.
    Fixed32 = 5,
}

impl WireType {
    /// Extract the wire type from the low 3 bits of a tag.
    pub fn from_tag(tag: u64) -> Result<Self, u8> {
        let wire_type = (tag & 0x7) as u8;
        match wire_type {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            _ => Err(wire_type),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WireType::Varint => "varint",
            WireType::Fixed64 => "i64",
            WireType::LengthDelimited => "len",
            WireType::StartGroup => "sgroup",
            WireType::EndGroup => "egroup",
            WireType::Fixed32 => "i32",
        }
    }
}

impl Display for WireType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single field read from a message: a tag plus its associated value.
///
/// Records borrow their payload from the buffer being decoded.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WireRecord<'a> {
    pub field_number: u64,
    pub wire_type: WireType,

    /// Raw bytes of the value, excluding the tag and any length prefix.
    pub payload: &'a [u8],

    /// Numeric value of the field.
    ///
    /// This is the decoded varint for [`WireType::Varint`], the little-endian
    /// value for fixed-width types and the payload length for
    /// [`WireType::LengthDelimited`].
    pub value: u64,

    /// Absolute offset of the tag in the original buffer.
    pub offset: usize,

    /// Absolute offset of the payload in the original buffer.
    pub payload_offset: usize,
}

impl WireRecord<'_> {
    /// Return the number of bytes used by the tag and length prefix.
    pub fn header_len(&self) -> usize {
        self.payload_offset - self.offset
    }

    /// Return the total number of bytes this record occupies in the message.
    pub fn encoded_len(&self) -> usize {
        self.header_len() + self.payload.len()
    }
}

/// Read one tag and its associated value from `cursor`.
///
/// The deprecated group wire types are rejected rather than skipped, since
/// skipping a group requires decoding its contents.
///
/// On error the cursor is left positioned at the start of the tag.
pub fn read_record<'a>(cursor: &mut ByteCursor<'a>) -> Result<WireRecord<'a>, DecodeError> {
    let start = cursor.position();
    let offset = cursor.offset();

    let result = read_record_inner(cursor, offset);
    if result.is_err() {
        cursor.rewind(start);
    }
    result
}

fn read_record_inner<'a>(
    cursor: &mut ByteCursor<'a>,
    offset: usize,
) -> Result<WireRecord<'a>, DecodeError> {
    let tag = cursor.read_varint()?;
    let field_number = tag >> 3;
    let wire_type = WireType::from_tag(tag).map_err(|wt| {
        DecodeError::new(ErrorKind::UnsupportedWireType(wt), offset).with_field(field_number)
    })?;

    let (payload_offset, payload, value) =
        read_value(cursor, wire_type, offset).map_err(|err| err.with_field(field_number))?;

    Ok(WireRecord {
        field_number,
        wire_type,
        payload,
        value,
        offset,
        payload_offset,
    })
}

/// Read the value that follows a tag. Returns the absolute payload offset, the
/// payload bytes and the numeric value.
fn read_value<'a>(
    cursor: &mut ByteCursor<'a>,
    wire_type: WireType,
    tag_offset: usize,
) -> Result<(usize, &'a [u8], u64), DecodeError> {
    let value_start = cursor.position();
    let payload_offset = cursor.offset();
    match wire_type {
        WireType::Varint => {
            let value = cursor.read_varint()?;
            Ok((payload_offset, cursor.span_since(value_start), value))
        }
        WireType::Fixed64 => {
            let value = cursor.read_fixed64()?;
            Ok((payload_offset, cursor.span_since(value_start), value))
        }
        WireType::Fixed32 => {
            let value = cursor.read_fixed32()?;
            Ok((payload_offset, cursor.span_since(value_start), value as u64))
        }
        WireType::LengthDelimited => {
            let payload = cursor.read_length_delimited()?;
            let payload_offset = cursor.offset() - payload.len();
            Ok((payload_offset, payload, payload.len() as u64))
        }
        WireType::StartGroup | WireType::EndGroup => Err(DecodeError::new(
            ErrorKind::UnsupportedWireType(wire_type as u8),
            tag_offset,
        )),
    }
}

/// Iterator over the wire records of a message.
///
/// Iteration stops after the first error.
///
/// ```
/// use pbinspect::wire::{ByteCursor, Records, WireType};
///
/// let message = [0x08, 0x96, 0x01];
/// let mut records = Records::new(ByteCursor::new(&message));
/// let record = records.next().unwrap().unwrap();
/// assert_eq!(record.field_number, 1);
/// assert_eq!(record.wire_type, WireType::Varint);
/// assert_eq!(record.value, 150);
/// assert!(records.next().is_none());
/// ```
pub struct Records<'a> {
    cursor: ByteCursor<'a>,
    failed: bool,
}

impl<'a> Records<'a> {
    pub fn new(cursor: ByteCursor<'a>) -> Self {
        Self {
            cursor,
            failed: false,
        }
    }

    pub fn cursor(&self) -> &ByteCursor<'a> {
        &self.cursor
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<WireRecord<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.is_empty() {
            return None;
        }
        let record = read_record(&mut self.cursor);
        self.failed = record.is_err();
        Some(record)
    }
}
