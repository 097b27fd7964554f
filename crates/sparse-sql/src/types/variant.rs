//! Sparse variant values.
//!
//! A variant is a self-describing value. Packing a struct into a variant
//! drops every null field, so the object form only stores fields that had a
//! value. Extracting an absent field reports "missing" rather than null;
//! callers decide whether that is an error.

use std::collections::BTreeMap;
use std::fmt;

use super::{DataType, Value};

/// A variant value: either a scalar payload or a sparse object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VariantValue {
    /// A single non-object value.
    Scalar(Box<Value>),
    /// Named fields ordered by name. Never contains a NULL entry.
    Object(BTreeMap<String, Value>),
}

impl VariantValue {
    /// Wraps a value. Structs become objects; variants are returned as is.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Variant(v) => v,
            Value::Struct(fields) => Self::from_struct(fields),
            other => VariantValue::Scalar(Box::new(other)),
        }
    }

    /// Packs struct fields into a sparse object, omitting null fields.
    ///
    /// The result does not depend on field order.
    pub fn from_struct<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        VariantValue::Object(
            fields
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .collect(),
        )
    }

    /// Returns the stored field, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            VariantValue::Object(fields) => fields.get(field),
            VariantValue::Scalar(_) => None,
        }
    }

    /// Returns true if the object stores `field`.
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Extracts a field as a variant, or `None` if the field is absent.
    ///
    /// Scalars have no fields.
    pub fn extract(&self, field: &str) -> Option<VariantValue> {
        self.get(field).cloned().map(VariantValue::from_value)
    }

    /// Number of stored fields; zero for scalars.
    pub fn len(&self) -> usize {
        match self {
            VariantValue::Object(fields) => fields.len(),
            VariantValue::Scalar(_) => 0,
        }
    }

    /// Returns true if no fields are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Casts the variant payload to a concrete type.
    pub fn cast(&self, target: &DataType) -> Result<Value, String> {
        match (self, target) {
            (_, DataType::Variant) => Ok(Value::Variant(self.clone())),
            (VariantValue::Scalar(inner), _) => inner.cast(target),
            (VariantValue::Object(fields), DataType::Struct(targets)) => targets
                .iter()
                .map(|f| {
                    let v = fields.get(&f.name).cloned().unwrap_or(Value::Null);
                    Ok((f.name.clone(), v.cast(&f.data_type)?))
                })
                .collect::<Result<Vec<_>, String>>()
                .map(Value::Struct),
            (VariantValue::Object(_), _) => Err(format!("Cannot cast VARIANT object to {}", target)),
        }
    }
}

impl fmt::Display for VariantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantValue::Scalar(v) => write!(f, "{}", v),
            VariantValue::Object(fields) => {
                write!(f, "{{")?;
                for (i, (name, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::types::StructField;

    fn fields() -> Vec<(String, Value)> {
        vec![
            ("c0".to_string(), Value::int(1)),
            ("c1".to_string(), Value::Null),
            ("c2".to_string(), Value::string("x")),
        ]
    }

    #[test]
    fn test_pack_omits_nulls() {
        let v = VariantValue::from_struct(fields());
        assert_eq!(v.len(), 2);
        assert!(v.contains("c0"));
        assert!(!v.contains("c1"));
        assert_eq!(v.to_string(), "{c0: 1, c2: x}");
    }

    #[test]
    fn test_pack_is_order_independent() {
        let mut reversed = fields();
        reversed.reverse();
        assert_eq!(
            VariantValue::from_struct(fields()),
            VariantValue::from_struct(reversed)
        );
    }

    #[test]
    fn test_extract() {
        let v = VariantValue::from_struct(fields());
        let c0 = v.extract("c0").unwrap();
        assert_eq!(c0.cast(&DataType::Int).unwrap(), Value::int(1));
        assert!(v.extract("c1").is_none());
        assert!(v.extract("nope").is_none());
        assert!(c0.extract("c0").is_none());
    }

    #[test]
    fn test_nested_variant_is_flattened() {
        let inner = VariantValue::Scalar(Box::new(Value::int(3)));
        let v = VariantValue::from_struct(vec![("a".to_string(), Value::Variant(inner.clone()))]);
        assert_eq!(v.extract("a"), Some(inner));
    }

    #[test]
    fn test_sparse_round_trip() {
        let columns = proptest::collection::vec(proptest::option::of(any::<i32>()), 0..32);
        proptest!(|(columns in columns)| {
            let fields = columns
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("c{}", i), Value::int_or_null(*v)));
            let packed = VariantValue::from_struct(fields);
            prop_assert_eq!(packed.len(), columns.iter().flatten().count());
            for (i, v) in columns.iter().enumerate() {
                let extracted = packed.extract(&format!("c{}", i));
                match v {
                    Some(v) => prop_assert_eq!(
                        extracted.map(|e| e.cast(&DataType::Int)),
                        Some(Ok(Value::int(*v)))
                    ),
                    None => prop_assert!(extracted.is_none()),
                }
            }
        });
    }

    #[test]
    fn test_object_to_struct_cast() {
        let v = VariantValue::from_struct(fields());
        let target = DataType::Struct(vec![
            StructField::new("c0", DataType::BigInt),
            StructField::new("c1", DataType::Int),
        ]);
        assert_eq!(
            v.cast(&target).unwrap(),
            Value::Struct(vec![
                ("c0".to_string(), Value::bigint(1)),
                ("c1".to_string(), Value::Null),
            ])
        );
        assert!(v.cast(&DataType::Int).is_err());
    }
}
