//! Runtime values.
//!
//! This module defines the `Value` type which represents SQL values both as
//! bound literals and as data flowing through the reference executor.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::{DataType, StructField, VariantValue};

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// NULL value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 8-bit signed integer.
    TinyInt(i8),
    /// 16-bit signed integer.
    SmallInt(i16),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    BigInt(i64),
    /// 32-bit floating point.
    Float(f32),
    /// 64-bit floating point.
    Double(f64),
    /// String value.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Date (days since epoch).
    Date(i32),
    /// Timestamp (microseconds since epoch).
    Timestamp(i64),
    /// Struct value: named fields in declaration order.
    Struct(Vec<(String, Value)>),
    /// Variant value.
    Variant(VariantValue),
}

impl Value {
    /// Creates an integer value.
    pub fn int(v: i32) -> Self {
        Value::Int(v)
    }

    /// Creates a bigint value.
    pub fn bigint(v: i64) -> Self {
        Value::BigInt(v)
    }

    /// Creates a double value.
    pub fn double(v: f64) -> Self {
        Value::Double(v)
    }

    /// Creates a string value.
    pub fn string(v: impl Into<String>) -> Self {
        Value::String(v.into())
    }

    /// Creates an integer value, or NULL.
    pub fn int_or_null(v: Option<i32>) -> Self {
        v.map_or(Value::Null, Value::Int)
    }

    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this value is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::TinyInt(i) => *i != 0,
            Value::SmallInt(i) => *i != 0,
            Value::Int(i) => *i != 0,
            Value::BigInt(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Double(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Date(_) | Value::Timestamp(_) | Value::Struct(_) | Value::Variant(_) => true,
        }
    }

    /// Converts this value to a boolean.
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(*b),
            _ => Some(self.is_truthy()),
        }
    }

    /// Converts this value to an i64.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(i64::from(*b)),
            Value::TinyInt(i) => Some(i64::from(*i)),
            Value::SmallInt(i) => Some(i64::from(*i)),
            Value::Int(i) => Some(i64::from(*i)),
            Value::BigInt(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            Value::Double(f) => Some(*f as i64),
            Value::String(s) => s.trim().parse().ok(),
            Value::Date(d) => Some(i64::from(*d)),
            Value::Timestamp(t) => Some(*t),
            Value::Bytes(_) | Value::Struct(_) | Value::Variant(_) => None,
        }
    }

    /// Converts this value to an f64.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::TinyInt(i) => Some(f64::from(*i)),
            Value::SmallInt(i) => Some(f64::from(*i)),
            Value::Int(i) => Some(f64::from(*i)),
            Value::BigInt(i) => Some(*i as f64),
            Value::Float(f) => Some(f64::from(*f)),
            Value::Double(f) => Some(*f),
            Value::String(s) => s.trim().parse().ok(),
            Value::Date(_)
            | Value::Timestamp(_)
            | Value::Bytes(_)
            | Value::Struct(_)
            | Value::Variant(_) => None,
        }
    }

    /// Converts this value to a string.
    pub fn to_string_value(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Returns the data type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Text, // NULL can be any type
            Value::Boolean(_) => DataType::Boolean,
            Value::TinyInt(_) => DataType::TinyInt,
            Value::SmallInt(_) => DataType::SmallInt,
            Value::Int(_) => DataType::Int,
            Value::BigInt(_) => DataType::BigInt,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::String(_) => DataType::Text,
            Value::Bytes(_) => DataType::Blob,
            Value::Date(_) => DataType::Date,
            Value::Timestamp(_) => DataType::Timestamp,
            Value::Struct(fields) => DataType::Struct(
                fields
                    .iter()
                    .map(|(name, v)| StructField::new(name.clone(), v.data_type()))
                    .collect(),
            ),
            Value::Variant(_) => DataType::Variant,
        }
    }

    /// Casts this value to the specified type.
    ///
    /// A variant holding a scalar casts its payload; a variant holding an
    /// object casts to a struct by field name.
    pub fn cast(&self, target: &DataType) -> Result<Value, String> {
        if self.is_null() {
            return Ok(Value::Null);
        }

        if let Value::Variant(variant) = self {
            return variant.cast(target);
        }

        match target {
            DataType::Boolean => self
                .to_bool()
                .map(Value::Boolean)
                .ok_or_else(|| "Cannot cast to boolean".to_string()),
            DataType::TinyInt => self
                .cast_integer()
                .and_then(|v| i8::try_from(v).ok())
                .map(Value::TinyInt)
                .ok_or_else(|| format!("Cannot cast {} to tinyint", self)),
            DataType::SmallInt => self
                .cast_integer()
                .and_then(|v| i16::try_from(v).ok())
                .map(Value::SmallInt)
                .ok_or_else(|| format!("Cannot cast {} to smallint", self)),
            DataType::Int => self
                .cast_integer()
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::Int)
                .ok_or_else(|| format!("Cannot cast {} to int", self)),
            DataType::BigInt => self
                .cast_integer()
                .map(Value::BigInt)
                .ok_or_else(|| format!("Cannot cast {} to bigint", self)),
            DataType::Float => self
                .to_f64()
                .map(|v| Value::Float(v as f32))
                .ok_or_else(|| "Cannot cast to float".to_string()),
            DataType::Double => self
                .to_f64()
                .map(Value::Double)
                .ok_or_else(|| "Cannot cast to double".to_string()),
            DataType::Text | DataType::Varchar(_) => self
                .to_string_value()
                .map(Value::String)
                .ok_or_else(|| "Cannot cast to string".to_string()),
            DataType::Blob => match self {
                Value::Bytes(b) => Ok(Value::Bytes(b.clone())),
                Value::String(s) => Ok(Value::Bytes(s.as_bytes().to_vec())),
                _ => Err(format!("Cannot cast {} to blob", self.data_type())),
            },
            DataType::Date => match self {
                Value::Date(d) => Ok(Value::Date(*d)),
                _ => Err(format!("Cannot cast {} to date", self.data_type())),
            },
            DataType::Timestamp => match self {
                Value::Timestamp(t) => Ok(Value::Timestamp(*t)),
                Value::Date(d) => Ok(Value::Timestamp(i64::from(*d) * 86_400_000_000)),
                _ => Err(format!("Cannot cast {} to timestamp", self.data_type())),
            },
            DataType::Struct(fields) => match self {
                Value::Struct(values) => {
                    if values.len() != fields.len()
                        || values.iter().zip(fields).any(|((n, _), f)| *n != f.name)
                    {
                        return Err(format!(
                            "Cannot cast {} to {}",
                            self.data_type(),
                            target
                        ));
                    }
                    values
                        .iter()
                        .zip(fields)
                        .map(|((name, v), f)| Ok((name.clone(), v.cast(&f.data_type)?)))
                        .collect::<Result<Vec<_>, String>>()
                        .map(Value::Struct)
                }
                _ => Err(format!("Cannot cast {} to {}", self.data_type(), target)),
            },
            DataType::Variant => Ok(Value::Variant(VariantValue::from_value(self.clone()))),
        }
    }

    /// Integer view used by casts; floats round toward zero, strings parse.
    fn cast_integer(&self) -> Option<i64> {
        match self {
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::Double(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::Float(_) | Value::Double(_) => None,
            _ => self.to_i64(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::TinyInt(a), Value::TinyInt(b)) => a == b,
            (Value::SmallInt(a), Value::SmallInt(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Variant(a), Value::Variant(b)) => a == b,
            (Value::Struct(_) | Value::Variant(_), _) | (_, Value::Struct(_) | Value::Variant(_)) => {
                false
            }
            // Cross-type numeric comparisons
            (a, b) => {
                if let (Some(a_f), Some(b_f)) = (a.to_f64(), b.to_f64()) {
                    (a_f - b_f).abs() < f64::EPSILON
                } else {
                    false
                }
            }
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            // NULL comparisons: NULL is considered less than any non-NULL value
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,

            // Same-type comparisons
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::TinyInt(a), Value::TinyInt(b)) => a.cmp(b),
            (Value::SmallInt(a), Value::SmallInt(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::BigInt(a), Value::BigInt(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Struct(a), Value::Struct(b)) => a.cmp(b),
            (Value::Variant(a), Value::Variant(b)) => a.cmp(b),

            // Cross-type numeric comparisons via f64
            (a, b) => {
                if let (Some(a_f), Some(b_f)) = (a.to_f64(), b.to_f64()) {
                    a_f.partial_cmp(&b_f).unwrap_or(Ordering::Equal)
                } else {
                    // Fall back to string comparison for incompatible types
                    let a_s = a.to_string_value().unwrap_or_default();
                    let b_s = b.to_string_value().unwrap_or_default();
                    a_s.cmp(&b_s)
                }
            }
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::TinyInt(i) => i.hash(state),
            Value::SmallInt(i) => i.hash(state),
            Value::Int(i) => i.hash(state),
            Value::BigInt(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Double(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Timestamp(t) => t.hash(state),
            Value::Struct(fields) => fields.hash(state),
            Value::Variant(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::TinyInt(i) => write!(f, "{}", i),
            Value::SmallInt(i) => write!(f, "{}", i),
            Value::Int(i) => write!(f, "{}", i),
            Value::BigInt(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => {
                write!(f, "0x")?;
                b.iter().try_for_each(|byte| write!(f, "{:02x}", byte))
            }
            Value::Date(d) => write!(f, "{}", d),
            Value::Timestamp(t) => write!(f, "{}", t),
            Value::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (name, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}': {}", name, v)?;
                }
                write!(f, "}}")
            }
            Value::Variant(v) => write!(f, "{}", v),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_null() {
        let v = Value::Null;
        assert!(v.is_null());
        assert!(!v.is_truthy());
        assert_eq!(v.cast(&DataType::Int).unwrap(), Value::Null);
    }

    #[test]
    fn test_value_comparison() {
        assert!(Value::int(10) < Value::int(20));
        assert!(Value::int(10) == Value::int(10));
        assert!(Value::Null < Value::int(0));
    }

    #[test]
    fn test_value_cross_type_comparison() {
        assert!(Value::int(10) == Value::double(10.0));
        assert!(Value::int(10) < Value::double(10.5));
    }

    #[test]
    fn test_value_cast() {
        let v = Value::int(42);
        assert_eq!(v.cast(&DataType::BigInt).unwrap(), Value::BigInt(42));
        assert_eq!(
            v.cast(&DataType::Text).unwrap(),
            Value::String("42".to_string())
        );
        assert_eq!(
            Value::string(" 7 ").cast(&DataType::SmallInt).unwrap(),
            Value::SmallInt(7)
        );
    }

    #[test]
    fn test_value_cast_overflow() {
        assert!(Value::bigint(i64::from(i32::MAX) + 1)
            .cast(&DataType::Int)
            .is_err());
        assert!(Value::double(f64::NAN).cast(&DataType::Int).is_err());
    }

    #[test]
    fn test_struct_value() {
        let v = Value::Struct(vec![
            ("a".to_string(), Value::int(1)),
            ("b".to_string(), Value::Null),
        ]);
        assert_eq!(v.to_string(), "{'a': 1, 'b': NULL}");
        assert_eq!(
            v.data_type(),
            DataType::Struct(vec![
                StructField::new("a", DataType::Int),
                StructField::new("b", DataType::Text),
            ])
        );
        assert_ne!(v, Value::int(1));
    }

    #[test]
    fn test_cast_to_variant_and_back() {
        let v = Value::int(5).cast(&DataType::Variant).unwrap();
        assert_eq!(v.data_type(), DataType::Variant);
        assert_eq!(v.cast(&DataType::Int).unwrap(), Value::int(5));
        assert_eq!(v.cast(&DataType::BigInt).unwrap(), Value::bigint(5));
    }

    #[test]
    fn test_value_hash() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(Value::int(1), "one");
        map.insert(Value::int(2), "two");

        assert_eq!(map.get(&Value::int(1)), Some(&"one"));
        assert_eq!(map.get(&Value::int(2)), Some(&"two"));
    }
}
