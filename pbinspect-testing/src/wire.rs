//! Builders for Protocol Buffers wire data.
//!
//! pbinspect only decodes, so tests construct their inputs with these
//! helpers. See <https://protobuf.dev/programming-guides/encoding/>.

/// Encode `val` as a varint.
pub fn encode_varint(mut val: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(10);

    loop {
        let mut byte = (val & 0x7f) as u8;
        if val <= 0x7f {
            bytes.push(byte);
            break;
        } else {
            byte |= 0x80;
            bytes.push(byte);
            val >>= 7;
        }
    }

    bytes
}

/// Map a signed value to its zig-zag encoded form, as used by `sint32` and
/// `sint64` fields.
pub fn encode_zigzag(val: i64) -> u64 {
    ((val << 1) ^ (val >> 63)) as u64
}

/// Incrementally build an encoded message.
///
/// ```
/// use pbinspect_testing::MessageBuilder;
///
/// let buf = MessageBuilder::new().varint(1, 150).build();
/// assert_eq!(buf, [0x08, 0x96, 0x01]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MessageBuilder {
    buf: Vec<u8>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn tag(mut self, number: u64, wire_type: u64) -> Self {
        self.buf.extend(encode_varint((number << 3) | wire_type));
        self
    }

    /// Append a varint field.
    pub fn varint(self, number: u64, val: u64) -> Self {
        let mut builder = self.tag(number, 0);
        builder.buf.extend(encode_varint(val));
        builder
    }

    /// Append a `sint32` or `sint64` field.
    pub fn sint(self, number: u64, val: i64) -> Self {
        self.varint(number, encode_zigzag(val))
    }

    /// Append a 64-bit fixed-width field.
    pub fn fixed64(self, number: u64, val: u64) -> Self {
        let mut builder = self.tag(number, 1);
        builder.buf.extend(val.to_le_bytes());
        builder
    }

    /// Append a `double` field.
    pub fn double(self, number: u64, val: f64) -> Self {
        self.fixed64(number, val.to_bits())
    }

    /// Append a 32-bit fixed-width field.
    pub fn fixed32(self, number: u64, val: u32) -> Self {
        let mut builder = self.tag(number, 5);
        builder.buf.extend(val.to_le_bytes());
        builder
    }

    /// Append a `float` field.
    pub fn float(self, number: u64, val: f32) -> Self {
        self.fixed32(number, val.to_bits())
    }

    /// Append a length-delimited field.
    pub fn bytes(self, number: u64, data: &[u8]) -> Self {
        let mut builder = self.tag(number, 2);
        builder.buf.extend(encode_varint(data.len() as u64));
        builder.buf.extend(data);
        builder
    }

    /// Append a string field.
    pub fn string(self, number: u64, val: &str) -> Self {
        self.bytes(number, val.as_bytes())
    }

    /// Append an embedded message field.
    pub fn message(self, number: u64, msg: MessageBuilder) -> Self {
        self.bytes(number, &msg.buf)
    }

    /// Append a packed repeated varint field.
    pub fn packed_varints(self, number: u64, vals: &[u64]) -> Self {
        let payload: Vec<u8> = vals.iter().copied().flat_map(encode_varint).collect();
        self.bytes(number, &payload)
    }

    /// Append a packed repeated 32-bit field.
    pub fn packed_fixed32(self, number: u64, vals: &[u32]) -> Self {
        let payload: Vec<u8> = vals.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.bytes(number, &payload)
    }

    /// Append a tag with the given raw wire type and no payload.
    ///
    /// This is used to produce group markers and invalid wire types.
    pub fn raw_tag(self, number: u64, wire_type: u64) -> Self {
        self.tag(number, wire_type)
    }

    /// Append arbitrary bytes.
    pub fn raw(mut self, data: &[u8]) -> Self {
        self.buf.extend(data);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}
