use crate::errors::{DecodeError, ErrorKind};
use crate::wire::varint::{decode_varint, VarintError, VarintStrictness};

/// Reader for the primitives of the Protocol Buffers wire format.
///
/// A cursor wraps an immutable byte span and a read position. Every read
/// either succeeds and advances the position by exactly the number of bytes
/// consumed, or fails and leaves the position unchanged.
///
/// Cursors for embedded messages are created with [`sub_cursor`](Self::sub_cursor).
/// They remember the offset of their span in the original buffer, so that
/// errors can always be reported relative to the start of the capture.
#[derive(Clone, Debug)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,

    /// Offset of `buf[0]` in the outermost buffer.
    base: usize,

    strictness: VarintStrictness,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            base: 0,
            strictness: VarintStrictness::default(),
        }
    }

    /// Set how non-minimal varint encodings are treated.
    pub fn with_strictness(mut self, strictness: VarintStrictness) -> Self {
        self.strictness = strictness;
        self
    }

    /// Create a cursor over `span`, which is located at absolute offset
    /// `base` in the original buffer.
    pub fn sub_cursor(&self, span: &'a [u8], base: usize) -> ByteCursor<'a> {
        ByteCursor {
            buf: span,
            pos: 0,
            base,
            strictness: self.strictness,
        }
    }

    /// Return the read position relative to the start of this cursor's span.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Return the read position relative to the start of the original buffer.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Return the absolute offset of the start of this cursor's span.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Return the length of the whole span.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Return the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Return true if all bytes have been read.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn strictness(&self) -> VarintStrictness {
        self.strictness
    }

    /// Read a base-128 varint.
    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        match decode_varint(&self.buf[self.pos..], self.strictness) {
            Ok((value, len)) => {
                self.pos += len;
                Ok(value)
            }
            Err(VarintError::Truncated) => {
                Err(DecodeError::new(ErrorKind::TruncatedVarint, self.offset()))
            }
            Err(VarintError::Overflow | VarintError::NonCanonical) => {
                Err(DecodeError::new(ErrorKind::InvalidVarint, self.offset()))
            }
        }
    }

    /// Read exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::new(
                ErrorKind::LengthDriftError {
                    declared: len as u64,
                    available: self.remaining() as u64,
                },
                self.offset(),
            ));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read a length prefix followed by that many bytes.
    ///
    /// On failure the cursor is left at the start of the length prefix.
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let start = self.pos;
        let len = self.read_varint()?;
        if len > self.remaining() as u64 {
            let err = DecodeError::new(
                ErrorKind::LengthDriftError {
                    declared: len,
                    available: self.remaining() as u64,
                },
                self.offset(),
            );
            self.pos = start;
            return Err(err);
        }
        self.read_bytes(len as usize)
    }

    /// Read a 4-byte little-endian value.
    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        let mut buf = [0; 4];
        buf.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(buf))
    }

    /// Read an 8-byte little-endian value.
    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Return the bytes read since position `start`.
    pub(crate) fn span_since(&self, start: usize) -> &'a [u8] {
        &self.buf[start..self.pos]
    }

    /// Move the read position back to `pos`, which must not be past the
    /// current position.
    pub(crate) fn rewind(&mut self, pos: usize) {
        debug_assert!(pos <= self.pos);
        self.pos = pos;
    }
}
