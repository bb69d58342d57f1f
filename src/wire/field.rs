use crate::errors::{DecodeError, ErrorKind};
use crate::wire::cursor::ByteCursor;
use crate::wire::record::{Records, WireRecord, WireType};

/// Typed access to a single field of a message whose schema is known at
/// compile time.
///
/// `Field`s are produced by iterating over fields of a message using
/// [`Fields::next`]. The accessors check that the wire type matches the
/// requested type and report [`ErrorKind::FieldTypeMismatch`] otherwise.
pub struct Field<'a> {
    record: WireRecord<'a>,
    cursor: ByteCursor<'a>,

    /// Debug name of the message type this field belongs to.
    context: Option<&'static str>,
}

impl<'a> Field<'a> {
    /// Return the field number.
    pub fn number(&self) -> u64 {
        self.record.field_number
    }

    /// Return the underlying wire record.
    pub fn record(&self) -> &WireRecord<'a> {
        &self.record
    }

    fn get_varint(&self) -> Result<u64, DecodeError> {
        match self.record.wire_type {
            WireType::Varint => Ok(self.record.value),
            _ => Err(self.error(ErrorKind::FieldTypeMismatch)),
        }
    }

    /// Get the value of a field with schema type `int32`.
    pub fn get_int32(&self) -> Result<i32, DecodeError> {
        self.get_varint().map(|v| v as i32)
    }

    /// Get the value of a field where the schema type is an enum.
    pub fn get_enum(&self) -> Result<i32, DecodeError> {
        self.get_int32()
    }

    /// Get the value of a field with schema type `bool`.
    pub fn get_bool(&self) -> Result<bool, DecodeError> {
        self.get_varint().map(|v| v != 0)
    }

    /// Read the bytes in this field.
    pub fn read_bytes(&self) -> Result<&'a [u8], DecodeError> {
        match self.record.wire_type {
            WireType::LengthDelimited => Ok(self.record.payload),
            _ => Err(self.error(ErrorKind::FieldTypeMismatch)),
        }
    }

    /// Read the UTF-8 encoded string in this field.
    pub fn read_string(&self) -> Result<String, DecodeError> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| self.error(ErrorKind::InvalidUtf8))
    }

    /// Begin reading the embedded message in this field.
    ///
    /// `context` is the name of the embedded message type being read. It is
    /// used to add context to any errors encountered.
    pub fn read_message(&self, context: Option<&'static str>) -> Result<Fields<'a>, DecodeError> {
        let payload = self.read_bytes()?;
        let cursor = self.cursor.sub_cursor(payload, self.record.payload_offset);
        Ok(Fields::new(cursor, context))
    }

    fn error(&self, kind: ErrorKind) -> DecodeError {
        DecodeError::new(kind, self.record.offset)
            .with_field(self.record.field_number)
            .with_message_type(self.context)
    }
}

/// Iterator over fields of a message.
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use pbinspect::wire::{ByteCursor, Fields};
///
/// let message = [0x08, 0x96, 0x01];
/// let mut fields = Fields::new(ByteCursor::new(&message), Some("Example"));
/// while let Some(field) = fields.next()? {
///     assert_eq!(field.number(), 1);
///     assert_eq!(field.get_int32()?, 150);
/// }
/// # Ok(()) }
/// ```
pub struct Fields<'a> {
    records: Records<'a>,

    /// Debug name of the message type.
    context: Option<&'static str>,
}

impl<'a> Fields<'a> {
    /// Read the fields of the message in `cursor`'s span.
    ///
    /// `context` is the name of the message type being read, for debugging
    /// purposes.
    pub fn new(cursor: ByteCursor<'a>, context: Option<&'static str>) -> Self {
        Self {
            records: Records::new(cursor),
            context,
        }
    }

    /// Read the next field of the message.
    ///
    /// This returns `Ok(Some(field))` if a field was read, `Ok(None)` if the
    /// end of the message was reached or `Err(err)` if an error was encountered.
    #[allow(clippy::should_implement_trait)] // Errors are returned eagerly rather than per item.
    pub fn next(&mut self) -> Result<Option<Field<'a>>, DecodeError> {
        let cursor = self.records.cursor().clone();
        match self.records.next() {
            None => Ok(None),
            Some(Ok(record)) => Ok(Some(Field {
                record,
                cursor,
                context: self.context,
            })),
            Some(Err(err)) => Err(err.with_message_type(self.context)),
        }
    }
}

/// Defines how to deserialize a type from an encoded message.
///
/// This is used for messages whose schema is fixed, such as the descriptor
/// messages that define schemas for [`MessageDecoder`](crate::MessageDecoder).
///
/// ```
/// use pbinspect::wire::{DecodeMessage, Fields};
/// use pbinspect::DecodeError;
///
/// #[derive(Default)]
/// struct Message {
///     int_field: i32,
///     string_field: Option<String>,
/// }
///
/// impl Message {
///     const INT_FIELD: u64 = 1;
///     const STRING_FIELD: u64 = 2;
/// }
///
/// impl DecodeMessage for Message {
///     fn decode_fields(mut fields: Fields) -> Result<Self, DecodeError> {
///         let mut msg = Message::default();
///         while let Some(field) = fields.next()? {
///             match field.number() {
///                 Self::INT_FIELD => msg.int_field = field.get_int32()?,
///                 Self::STRING_FIELD => msg.string_field = Some(field.read_string()?),
///                 // Unknown fields are ignored.
///                 _ => {}
///             }
///         }
///         Ok(msg)
///     }
/// }
///
/// let msg = Message::decode(&[0x08, 0x96, 0x01, 0x12, 0x02, 0x68, 0x69]).unwrap();
/// assert_eq!(msg.int_field, 150);
/// assert_eq!(msg.string_field.as_deref(), Some("hi"));
/// ```
pub trait DecodeMessage: Sized {
    /// Decode a message from a buffer.
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let ctx = Some(std::any::type_name::<Self>());
        Self::decode_fields(Fields::new(ByteCursor::new(buf), ctx))
    }

    /// Decode a message from an iterator over message fields.
    fn decode_fields(fields: Fields) -> Result<Self, DecodeError>;

    /// Decode a message stored in a field in a parent message.
    fn decode_field(field: &Field) -> Result<Self, DecodeError> {
        let ctx = Some(std::any::type_name::<Self>());
        Self::decode_fields(field.read_message(ctx)?)
    }
}
