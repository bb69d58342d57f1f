use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::schema::FieldType;
use crate::wire::WireType;

/// Error that aborts decoding of a message.
///
/// Errors record the absolute byte offset in the captured buffer nearest to
/// the point of failure, and where known the field number and message type
/// being decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeError {
    kind: ErrorKind,
    offset: usize,
    field: Option<u64>,
    message_type: Option<String>,
}

impl DecodeError {
    pub fn new(kind: ErrorKind, offset: usize) -> Self {
        Self {
            kind,
            offset,
            field: None,
            message_type: None,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Return the byte offset in the original buffer where the error occurred.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Return the field number associated with this error.
    pub fn field(&self) -> Option<u64> {
        self.field
    }

    /// Return the message type associated with this error.
    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    /// Associate a field number with this error, if it doesn't have one yet.
    pub fn with_field(mut self, field: u64) -> Self {
        self.field.get_or_insert(field);
        self
    }

    /// Associate a message type with this error, if it doesn't have one yet.
    ///
    /// Errors propagate outwards through enclosing messages, so the innermost
    /// context is kept.
    pub fn with_message_type(mut self, message_type: Option<&str>) -> Self {
        if self.message_type.is_none() {
            self.message_type = message_type.map(|s| s.to_string());
        }
        self
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.kind, self.offset)?;
        if let Some(field) = self.field {
            write!(f, " (field {}", field)?;
            if let Some(msg) = &self.message_type {
                write!(f, " of {}", msg)?;
            }
            write!(f, ")")?;
        } else if let Some(msg) = &self.message_type {
            write!(f, " (in {})", msg)?;
        }
        Ok(())
    }
}

impl Error for DecodeError {}

/// Enum describing the kind of a [`DecodeError`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The end of the buffer was reached before the final byte of a varint,
    /// or the varint was longer than 10 bytes.
    TruncatedVarint,

    /// A varint encoded more than 64 bits of data, or was not minimally
    /// encoded while strict varint checking is enabled.
    InvalidVarint,

    /// A field tag had a wire type which cannot be decoded.
    ///
    /// Protocol Buffers uses 3 bits to encode 6 wire types, leaving two values
    /// unused. The deprecated group markers (3 and 4) are also reported using
    /// this error.
    UnsupportedWireType(u8),

    /// A packed repeated field of fixed-width elements has a length that is
    /// not a multiple of the element size.
    PackedLengthMismatch { len: usize, element_size: usize },

    /// A packed repeated field of varints ended in the middle of an element.
    PackedVarintMisalignment,

    /// A field or message declared more bytes than are available.
    LengthDriftError { declared: u64, available: u64 },

    /// Messages were nested more deeply than the configured maximum.
    RecursionLimitExceeded { limit: u32 },

    /// A field in a schema file had a wire type which doesn't match its
    /// declared type.
    FieldTypeMismatch,

    /// A string field in a schema file contained invalid UTF-8.
    InvalidUtf8,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::TruncatedVarint => write!(f, "truncated varint"),
            ErrorKind::InvalidVarint => write!(f, "invalid varint"),
            ErrorKind::UnsupportedWireType(wire_type @ (3 | 4)) => {
                write!(f, "deprecated group wire type {}", wire_type)
            }
            ErrorKind::UnsupportedWireType(wire_type) => {
                write!(f, "unsupported wire type {}", wire_type)
            }
            ErrorKind::PackedLengthMismatch { len, element_size } => write!(
                f,
                "packed field length {} is not a multiple of element size {}",
                len, element_size
            ),
            ErrorKind::PackedVarintMisalignment => {
                write!(f, "packed varint field ends mid-element")
            }
            ErrorKind::LengthDriftError {
                declared,
                available,
            } => write!(
                f,
                "declared length {} but {} bytes available",
                declared, available
            ),
            ErrorKind::RecursionLimitExceeded { limit } => {
                write!(f, "message nesting exceeds limit of {}", limit)
            }
            ErrorKind::FieldTypeMismatch => write!(f, "field type mismatch"),
            ErrorKind::InvalidUtf8 => write!(f, "invalid UTF-8 in string"),
        }
    }
}

/// Severity of a [`Diagnostic`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Problem found while decoding, attached to the tree node nearest to where
/// it occurred.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,

    /// Absolute byte offset in the captured buffer.
    pub offset: usize,

    /// Field number this diagnostic relates to, if any.
    pub field: Option<u64>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, offset: usize) -> Self {
        Self {
            kind,
            offset,
            field: None,
        }
    }

    pub fn for_field(kind: DiagnosticKind, offset: usize, field: u64) -> Self {
        Self {
            kind,
            offset,
            field: Some(field),
        }
    }

    pub fn severity(&self) -> Severity {
        match self.kind {
            DiagnosticKind::Failed(_) => Severity::Error,
            DiagnosticKind::MissingRequiredField(_)
            | DiagnosticKind::UnknownMessageType(_)
            | DiagnosticKind::FieldTypeMismatch { .. }
            | DiagnosticKind::InvalidUtf8
            | DiagnosticKind::SeenSetOverflow { .. } => Severity::Warning,
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            // The error already includes its offset.
            DiagnosticKind::Failed(err) => write!(f, "{}", err),
            kind => write!(f, "{} at offset {}", kind, self.offset),
        }
    }
}

/// Kinds of [`Diagnostic`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum DiagnosticKind {
    /// A field declared `required` was not present in the message.
    MissingRequiredField(String),

    /// The named message type was not found in the schema. The message is
    /// decoded without a schema instead.
    UnknownMessageType(String),

    /// The wire type of a field is incompatible with its declared type. The
    /// field is decoded as if it had no schema.
    FieldTypeMismatch {
        declared: FieldType,
        wire_type: WireType,
    },

    /// A `string` field contained invalid UTF-8 and was decoded as bytes.
    InvalidUtf8,

    /// Too many distinct field numbers were seen in one message to track them
    /// all, so default values were not generated for it.
    SeenSetOverflow { capacity: usize },

    /// Decoding of the message stopped due to an error.
    Failed(DecodeError),
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::MissingRequiredField(name) => {
                write!(f, "missing required field \"{}\"", name)
            }
            DiagnosticKind::UnknownMessageType(name) => {
                write!(f, "unknown message type \"{}\"", name)
            }
            DiagnosticKind::FieldTypeMismatch {
                declared,
                wire_type,
            } => write!(
                f,
                "wire type {} is incompatible with declared type {}",
                wire_type, declared
            ),
            DiagnosticKind::InvalidUtf8 => write!(f, "string field is not valid UTF-8"),
            DiagnosticKind::SeenSetOverflow { capacity } => write!(
                f,
                "more than {} distinct fields, default values not generated",
                capacity
            ),
            DiagnosticKind::Failed(err) => write!(f, "{}", err),
        }
    }
}
