//! Decoding of the well-known `google.protobuf.Timestamp` message.

use chrono::{DateTime, Local, SecondsFormat};

use crate::wire::{ByteCursor, Records, WireType};

const SECONDS: u64 = 1;
const NANOS: u64 = 2;

/// Format a timestamp as an RFC 3339 string.
///
/// If `utc` is true the timestamp uses the `Z` suffix, otherwise it is
/// converted to the local time zone. Fractional seconds are only included if
/// `nanos` is non-zero.
///
/// Returns `None` if the timestamp is out of range.
pub fn format_timestamp(seconds: i64, nanos: i32, utc: bool) -> Option<String> {
    let nanos = u32::try_from(nanos).ok().filter(|n| *n < 1_000_000_000)?;
    let dt = DateTime::from_timestamp(seconds, nanos)?;
    let formatted = if utc {
        dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    } else {
        dt.with_timezone(&Local)
            .to_rfc3339_opts(SecondsFormat::AutoSi, false)
    };
    Some(formatted)
}

/// Read the `seconds` and `nanos` fields of a timestamp message.
///
/// Returns `None` if the message is malformed, has unexpected fields or
/// encodes a timestamp that can't be formatted. The caller then decodes it as
/// an ordinary message, which reports any errors.
pub(crate) fn read_timestamp(cursor: ByteCursor) -> Option<(i64, i32)> {
    let mut seconds = 0;
    let mut nanos = 0;
    for record in Records::new(cursor) {
        let record = record.ok()?;
        match (record.field_number, record.wire_type) {
            (SECONDS, WireType::Varint) => seconds = record.value as i64,
            (NANOS, WireType::Varint) => nanos = record.value as i32,
            _ => return None,
        }
    }
    format_timestamp(seconds, nanos, true)?;
    Some((seconds, nanos))
}
