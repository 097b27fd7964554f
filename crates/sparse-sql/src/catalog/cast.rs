//! Cast table.

use crate::types::DataType;

/// Returns true if a value of type `from` may be cast to `to`.
///
/// Variants cast to and from everything. Numeric, string and boolean types
/// cast among each other; structs cast field by field when the field names
/// match in order.
pub fn can_cast(from: &DataType, to: &DataType) -> bool {
    if from == to {
        return true;
    }
    match (from, to) {
        (DataType::Variant, _) | (_, DataType::Variant) => true,

        (a, b) if is_scalar(a) && is_scalar(b) => true,

        (a, DataType::Text | DataType::Varchar(_)) if a.is_temporal() => true,
        (DataType::Date, DataType::Timestamp) => true,
        (DataType::Text | DataType::Varchar(_) | DataType::Blob, DataType::Blob) => true,

        (DataType::Struct(from_fields), DataType::Struct(to_fields)) => {
            from_fields.len() == to_fields.len()
                && from_fields
                    .iter()
                    .zip(to_fields)
                    .all(|(f, t)| f.name == t.name && can_cast(&f.data_type, &t.data_type))
        }

        _ => false,
    }
}

fn is_scalar(ty: &DataType) -> bool {
    ty.is_numeric() || ty.is_string() || matches!(ty, DataType::Boolean)
}
