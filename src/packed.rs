//! Decoding of packed repeated fields.
//!
//! A packed field stores all elements of a repeated scalar field in a single
//! length-delimited record, without tags. See
//! <https://protobuf.dev/programming-guides/encoding/#packed>.

use crate::errors::{DecodeError, ErrorKind};
use crate::scalar::{decode_scalar, DecodedValue};
use crate::schema::{EnumDescriptor, FieldType};
use crate::wire::{ByteCursor, WireType};

/// Decode the elements of a packed field of type `element`.
///
/// `cursor` spans the payload of the field. Either all elements are decoded,
/// or an error is returned and no elements are produced.
pub fn decode_packed(
    mut cursor: ByteCursor,
    element: FieldType,
    enum_type: Option<&EnumDescriptor>,
) -> Result<Vec<DecodedValue>, DecodeError> {
    let element_size = match element.wire_type() {
        WireType::Fixed32 => 4,
        WireType::Fixed64 => 8,
        WireType::Varint => return decode_packed_varints(cursor, element, enum_type),
        _ => {
            return Err(DecodeError::new(ErrorKind::FieldTypeMismatch, cursor.offset()));
        }
    };

    let len = cursor.len();
    if len % element_size != 0 {
        return Err(DecodeError::new(
            ErrorKind::PackedLengthMismatch { len, element_size },
            cursor.offset(),
        ));
    }

    let mut values = Vec::with_capacity(len / element_size);
    while !cursor.is_empty() {
        let start = cursor.position();
        let value = if element_size == 4 {
            cursor.read_fixed32()? as u64
        } else {
            cursor.read_fixed64()?
        };
        let payload = cursor.span_since(start);
        values.push(decode_element(element, payload, value, enum_type));
    }
    Ok(values)
}

fn decode_packed_varints(
    mut cursor: ByteCursor,
    element: FieldType,
    enum_type: Option<&EnumDescriptor>,
) -> Result<Vec<DecodedValue>, DecodeError> {
    let mut values = Vec::new();
    while !cursor.is_empty() {
        let start = cursor.position();
        let value = cursor.read_varint().map_err(|err| {
            DecodeError::new(ErrorKind::PackedVarintMisalignment, err.offset())
        })?;
        let payload = cursor.span_since(start);
        values.push(decode_element(element, payload, value, enum_type));
    }
    Ok(values)
}

fn decode_element(
    element: FieldType,
    payload: &[u8],
    value: u64,
    enum_type: Option<&EnumDescriptor>,
) -> DecodedValue {
    // Only non-minimal `bool` encodings can fail here. Keep the raw number so
    // the array stays complete.
    decode_scalar(element, payload, value, enum_type).unwrap_or(DecodedValue::UInt64(value))
}

#[cfg(test)]
mod tests {
    use pbinspect_testing::{encode_varint, encode_zigzag, TestCases};

    use super::decode_packed;
    use crate::errors::ErrorKind;
    use crate::scalar::DecodedValue;
    use crate::schema::FieldType;
    use crate::wire::ByteCursor;

    #[test]
    fn test_decode_packed_varints() {
        let payload: Vec<u8> = [1, 150, u64::MAX]
            .into_iter()
            .flat_map(encode_varint)
            .collect();
        let values = decode_packed(ByteCursor::new(&payload), FieldType::UInt64, None).unwrap();
        assert_eq!(
            values,
            [
                DecodedValue::UInt64(1),
                DecodedValue::UInt64(150),
                DecodedValue::UInt64(u64::MAX)
            ]
        );

        let payload: Vec<u8> = [-1, 2]
            .into_iter()
            .map(encode_zigzag)
            .flat_map(encode_varint)
            .collect();
        let values = decode_packed(ByteCursor::new(&payload), FieldType::SInt32, None).unwrap();
        assert_eq!(values, [DecodedValue::Int32(-1), DecodedValue::Int32(2)]);
    }

    #[test]
    fn test_decode_packed_misaligned_varints() {
        let mut payload = encode_varint(300);
        payload.push(0x80);

        let buf = [vec![0; 5], payload].concat();
        let cursor = ByteCursor::new(&buf);
        let sub = cursor.sub_cursor(&buf[5..], 5);

        let err = decode_packed(sub, FieldType::Int32, None).err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::PackedVarintMisalignment);
        assert_eq!(err.offset(), 7);
    }

    #[test]
    fn test_decode_packed_fixed32() {
        #[derive(Debug)]
        struct Case {
            len: usize,
        }

        let cases = (0..=12).map(|len| Case { len }).collect::<Vec<_>>();

        cases.test_each(|case| {
            let payload = vec![0; case.len];
            let result = decode_packed(ByteCursor::new(&payload), FieldType::Fixed32, None);
            if case.len % 4 == 0 {
                assert_eq!(result.unwrap().len(), case.len / 4);
            } else {
                let err = result.err().unwrap();
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
    fn test_decode_packed_doubles() {
        let payload: Vec<u8> = [1.5f64, -2.0]
            .into_iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let values = decode_packed(ByteCursor::new(&payload), FieldType::Double, None).unwrap();
        assert_eq!(values, [DecodedValue::Double(1.5), DecodedValue::Double(-2.0)]);

        let err = decode_packed(ByteCursor::new(&payload[..12]), FieldType::SFixed64, None)
            .err()
            .unwrap();
        assert!(matches!(
            err.kind(),
            ErrorKind::PackedLengthMismatch {
                len: 12,
                element_size: 8
            }
        ));
    }
}
