//! Choosing how to interpret the value of a wire record.

use smallvec::SmallVec;

use crate::options::DecodeOptions;
use crate::schema::{FieldDescriptor, FieldType};
use crate::wire::{WireRecord, WireType};

/// List of candidate interpretations of a value.
pub type Candidates = SmallVec<[FieldType; 8]>;

/// The interpretation chosen for a wire record.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedType {
    /// Type declared by the schema.
    Declared(FieldType),

    /// Best guess in the absence of a schema.
    Guess(FieldType),

    /// All types compatible with the wire type, best guess first.
    Candidates(Candidates),

    /// A length-delimited value with no schema, shown as raw bytes.
    Raw,
}

impl ResolvedType {
    /// Return the type used to produce the primary value of the field.
    pub fn primary(&self) -> FieldType {
        match self {
            ResolvedType::Declared(ty) | ResolvedType::Guess(ty) => *ty,
            ResolvedType::Candidates(types) => types.first().copied().unwrap_or(FieldType::Bytes),
            ResolvedType::Raw => FieldType::Bytes,
        }
    }
}

/// The declared type of a field can't be decoded from the wire type of a
/// record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TypeMismatch {
    pub declared: FieldType,
    pub wire_type: WireType,
}

/// Resolve the type of `record` using its schema.
///
/// A `float` field which arrives with the 64-bit wire type is resolved as
/// `double`.
pub fn resolve_declared(
    field: &FieldDescriptor,
    record: &WireRecord,
) -> Result<FieldType, TypeMismatch> {
    let declared = field.field_type();
    match (declared, record.wire_type) {
        (FieldType::Float, WireType::Fixed64) => Ok(FieldType::Double),
        (ty, wire_type) if ty.wire_type() == wire_type => Ok(ty),
        (_, wire_type) => Err(TypeMismatch {
            declared,
            wire_type,
        }),
    }
}

/// Resolve the type of a record without a schema.
pub fn resolve_heuristic(record: &WireRecord, options: &DecodeOptions) -> ResolvedType {
    let value = record.value;
    let unsigned = if value <= u32::MAX as u64 {
        FieldType::UInt32
    } else {
        FieldType::UInt64
    };

    match record.wire_type {
        WireType::LengthDelimited if options.try_dissect_as_string => {
            ResolvedType::Guess(FieldType::String)
        }
        WireType::LengthDelimited | WireType::StartGroup | WireType::EndGroup => ResolvedType::Raw,
        wire_type if options.show_all_possible_field_types => {
            ResolvedType::Candidates(candidates(wire_type, value, unsigned))
        }
        _ => ResolvedType::Guess(unsigned),
    }
}

/// Return the types which may be decoded from a value of `wire_type`.
fn candidates(wire_type: WireType, value: u64, unsigned: FieldType) -> Candidates {
    let fits_i32 = i32::try_from(value as i64).is_ok();
    let fits_u32 = value <= u32::MAX as u64;

    let mut types = Candidates::new();
    types.push(unsigned);

    match wire_type {
        WireType::Varint => {
            if fits_i32 {
                types.push(FieldType::Int32);
            }
            types.push(FieldType::Int64);
            if fits_u32 {
                types.push(FieldType::SInt32);
            }
            types.push(FieldType::SInt64);
            if value <= 1 {
                types.push(FieldType::Bool);
            }
            if fits_i32 {
                types.push(FieldType::Enum);
            }
        }
        WireType::Fixed32 => {
            types.extend([FieldType::SFixed32, FieldType::Float]);
        }
        WireType::Fixed64 => {
            types.extend([FieldType::SFixed64, FieldType::Double]);
        }
        _ => {}
    }

    types
}

/// Resolve the type of `record`, using the schema if there is one.
///
/// If the declared type doesn't match the wire type, the record is resolved
/// heuristically and the mismatch is returned so it can be reported.
pub fn resolve(
    record: &WireRecord,
    field: Option<&FieldDescriptor>,
    options: &DecodeOptions,
) -> (ResolvedType, Option<TypeMismatch>) {
    match field.map(|field| resolve_declared(field, record)) {
        Some(Ok(ty)) => (ResolvedType::Declared(ty), None),
        Some(Err(mismatch)) => (resolve_heuristic(record, options), Some(mismatch)),
        None => (resolve_heuristic(record, options), None),
    }
}
