//! Expression evaluation for the reference executor.
//!
//! Expressions are evaluated against a [`Row`] through a [`BindingLayout`]
//! that maps each column binding to its position in the row.

use std::collections::HashMap;
use std::fmt;

use sparse_common::types::ColumnBinding;

use super::Row;
use crate::catalog::{STRUCT_PACK, STRUCT_TO_SPARSE_VARIANT, VARIANT_EXTRACT};
use crate::logical::{AggregateFunc, BinaryOp, BindData, BoundFunction, Expr, UnaryOp};
use crate::types::{Value, VariantValue};

/// Maps column bindings to row positions.
pub type BindingLayout = HashMap<ColumnBinding, usize>;

/// Builds the layout of rows produced by an operator with `bindings`.
pub fn layout_of(bindings: &[ColumnBinding]) -> BindingLayout {
    bindings
        .iter()
        .enumerate()
        .map(|(position, binding)| (*binding, position))
        .collect()
}

/// Evaluates an expression against a row.
pub fn evaluate_expr(expr: &Expr, row: &Row, layout: &BindingLayout) -> Result<Value, EvalError> {
    match expr {
        Expr::ColumnRef(column) => layout
            .get(&column.binding)
            .and_then(|&position| row.get(position))
            .cloned()
            .ok_or(EvalError::UnresolvedColumn(column.binding)),

        Expr::Literal(value) => Ok(value.clone()),

        Expr::Alias { expr, .. } => evaluate_expr(expr, row, layout),

        Expr::BinaryOp { left, op, right } => {
            let l = evaluate_expr(left, row, layout)?;
            let r = evaluate_expr(right, row, layout)?;
            evaluate_binary_op(op, &l, &r)
        }

        Expr::UnaryOp { op, expr } => {
            let val = evaluate_expr(expr, row, layout)?;
            evaluate_unary_op(op, &val)
        }

        Expr::IsNull(inner) => Ok(Value::Boolean(evaluate_expr(inner, row, layout)?.is_null())),

        Expr::IsNotNull(inner) => Ok(Value::Boolean(
            !evaluate_expr(inner, row, layout)?.is_null(),
        )),

        Expr::Cast { expr, data_type } => evaluate_expr(expr, row, layout)?
            .cast(data_type)
            .map_err(EvalError::Cast),

        Expr::Function(func) => {
            let args = func
                .args
                .iter()
                .map(|arg| evaluate_expr(arg, row, layout))
                .collect::<Result<Vec<_>, _>>()?;
            evaluate_scalar_function(func, args)
        }

        Expr::Try(inner) => match evaluate_expr(inner, row, layout) {
            Err(EvalError::MissingField(_)) => Ok(Value::Null),
            other => other,
        },

        Expr::Aggregate { func, .. } => Err(EvalError::InvalidArgument(format!(
            "aggregate {:?} evaluated outside an aggregate operator",
            func
        ))),
    }
}

/// Evaluates a predicate; NULL counts as false.
pub fn evaluate_predicate(expr: &Expr, row: &Row, layout: &BindingLayout) -> Result<bool, EvalError> {
    Ok(evaluate_expr(expr, row, layout)?.to_bool() == Some(true))
}

/// Evaluates a binary operation.
fn evaluate_binary_op(op: &BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    // AND/OR use three-valued logic; everything else propagates NULL.
    match op {
        BinaryOp::And => {
            return Ok(match (left.to_bool(), right.to_bool()) {
                (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
                (Some(true), Some(true)) => Value::Boolean(true),
                _ => Value::Null,
            });
        }
        BinaryOp::Or => {
            return Ok(match (left.to_bool(), right.to_bool()) {
                (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
                (Some(false), Some(false)) => Value::Boolean(false),
                _ => Value::Null,
            });
        }
        _ => {}
    }

    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    match op {
        BinaryOp::Eq => Ok(Value::Boolean(left == right)),
        BinaryOp::NotEq => Ok(Value::Boolean(left != right)),
        BinaryOp::Lt => Ok(Value::Boolean(left < right)),
        BinaryOp::LtEq => Ok(Value::Boolean(left <= right)),
        BinaryOp::Gt => Ok(Value::Boolean(left > right)),
        BinaryOp::GtEq => Ok(Value::Boolean(left >= right)),

        BinaryOp::Plus => evaluate_arithmetic(left, right, i64::checked_add, |a, b| a + b),
        BinaryOp::Minus => evaluate_arithmetic(left, right, i64::checked_sub, |a, b| a - b),
        BinaryOp::Multiply => evaluate_arithmetic(left, right, i64::checked_mul, |a, b| a * b),
        BinaryOp::Divide => {
            if right.to_f64() == Some(0.0) {
                return Err(EvalError::DivisionByZero);
            }
            evaluate_arithmetic(left, right, i64::checked_div, |a, b| a / b)
        }
        BinaryOp::Modulo => {
            let l = left.to_i64().ok_or(EvalError::TypeMismatch)?;
            let r = right.to_i64().ok_or(EvalError::TypeMismatch)?;
            if r == 0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::BigInt(l % r))
        }

        BinaryOp::Concat => {
            let l = left.to_string_value().unwrap_or_default();
            let r = right.to_string_value().unwrap_or_default();
            Ok(Value::String(format!("{}{}", l, r)))
        }

        BinaryOp::And | BinaryOp::Or => Err(EvalError::TypeMismatch),
    }
}

/// Evaluates arithmetic, in floating point if either side is floating.
fn evaluate_arithmetic<F, G>(
    left: &Value,
    right: &Value,
    int_op: F,
    float_op: G,
) -> Result<Value, EvalError>
where
    F: Fn(i64, i64) -> Option<i64>,
    G: Fn(f64, f64) -> f64,
{
    match (left, right) {
        (Value::Float(_), _)
        | (_, Value::Float(_))
        | (Value::Double(_), _)
        | (_, Value::Double(_)) => {
            let l = left.to_f64().ok_or(EvalError::TypeMismatch)?;
            let r = right.to_f64().ok_or(EvalError::TypeMismatch)?;
            Ok(Value::Double(float_op(l, r)))
        }
        _ => {
            let l = left.to_i64().ok_or(EvalError::TypeMismatch)?;
            let r = right.to_i64().ok_or(EvalError::TypeMismatch)?;
            int_op(l, r)
                .map(Value::BigInt)
                .ok_or_else(|| EvalError::InvalidArgument("integer overflow".to_string()))
        }
    }
}

/// Evaluates a unary operation.
fn evaluate_unary_op(op: &UnaryOp, val: &Value) -> Result<Value, EvalError> {
    if val.is_null() {
        return Ok(Value::Null);
    }

    match op {
        UnaryOp::Not => {
            let b = val.to_bool().ok_or(EvalError::TypeMismatch)?;
            Ok(Value::Boolean(!b))
        }
        UnaryOp::Minus => match val {
            Value::TinyInt(i) => Ok(Value::TinyInt(i.wrapping_neg())),
            Value::SmallInt(i) => Ok(Value::SmallInt(i.wrapping_neg())),
            Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
            Value::BigInt(i) => Ok(Value::BigInt(i.wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Double(f) => Ok(Value::Double(-f)),
            _ => Err(EvalError::TypeMismatch),
        },
    }
}

/// Evaluates a bound scalar function call over evaluated arguments.
fn evaluate_scalar_function(func: &BoundFunction, args: Vec<Value>) -> Result<Value, EvalError> {
    let first_is_null = args.first().map_or(true, Value::is_null);

    match func.name.to_lowercase().as_str() {
        STRUCT_PACK => {
            let BindData::StructPack { field_names } = &func.bind_data else {
                return Err(EvalError::InvalidArgument(
                    "struct_pack called without field names".to_string(),
                ));
            };
            if field_names.len() != args.len() {
                return Err(EvalError::InvalidArgument(format!(
                    "struct_pack has {} names for {} values",
                    field_names.len(),
                    args.len()
                )));
            }
            Ok(Value::Struct(field_names.iter().cloned().zip(args).collect()))
        }

        STRUCT_TO_SPARSE_VARIANT => match args.into_iter().next() {
            None | Some(Value::Null) => Ok(Value::Null),
            Some(Value::Struct(fields)) => Ok(Value::Variant(VariantValue::from_struct(fields))),
            Some(_) => Err(EvalError::TypeMismatch),
        },

        VARIANT_EXTRACT => {
            let field = match &func.bind_data {
                BindData::VariantExtract { field } => field.clone(),
                _ => args
                    .get(1)
                    .and_then(Value::to_string_value)
                    .ok_or_else(|| {
                        EvalError::InvalidArgument("variant_extract needs a field name".to_string())
                    })?,
            };
            match args.into_iter().next() {
                None | Some(Value::Null) => Ok(Value::Null),
                Some(Value::Variant(variant)) => variant
                    .extract(&field)
                    .map(Value::Variant)
                    .ok_or(EvalError::MissingField(field)),
                Some(_) => Err(EvalError::TypeMismatch),
            }
        }

        "upper" => {
            if first_is_null {
                return Ok(Value::Null);
            }
            let s = args[0].to_string_value().unwrap_or_default();
            Ok(Value::String(s.to_uppercase()))
        }
        "lower" => {
            if first_is_null {
                return Ok(Value::Null);
            }
            let s = args[0].to_string_value().unwrap_or_default();
            Ok(Value::String(s.to_lowercase()))
        }
        "length" => {
            if first_is_null {
                return Ok(Value::Null);
            }
            let s = args[0].to_string_value().unwrap_or_default();
            Ok(Value::BigInt(
                i64::try_from(s.chars().count()).unwrap_or(i64::MAX),
            ))
        }
        "abs" => {
            if first_is_null {
                return Ok(Value::Null);
            }
            match &args[0] {
                Value::TinyInt(i) => Ok(Value::TinyInt(i.wrapping_abs())),
                Value::SmallInt(i) => Ok(Value::SmallInt(i.wrapping_abs())),
                Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
                Value::BigInt(i) => Ok(Value::BigInt(i.wrapping_abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                Value::Double(f) => Ok(Value::Double(f.abs())),
                _ => Err(EvalError::TypeMismatch),
            }
        }
        "coalesce" => Ok(args
            .into_iter()
            .find(|arg| !arg.is_null())
            .unwrap_or(Value::Null)),

        _ => Err(EvalError::UnknownFunction(func.name.clone())),
    }
}

/// Accumulator for aggregate functions.
#[derive(Debug, Clone)]
pub struct Accumulator {
    func: AggregateFunc,
    state: AccumulatorState,
}

#[derive(Debug, Clone)]
enum AccumulatorState {
    Count(i64),
    IntSum(Option<i64>),
    FloatSum(Option<f64>),
    Avg { sum: f64, count: i64 },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl Accumulator {
    /// Creates an accumulator. Integer sums stay integral.
    pub fn new(func: AggregateFunc, integral_input: bool) -> Self {
        let state = match func {
            AggregateFunc::Count | AggregateFunc::CountStar => AccumulatorState::Count(0),
            AggregateFunc::Sum if integral_input => AccumulatorState::IntSum(None),
            AggregateFunc::Sum => AccumulatorState::FloatSum(None),
            AggregateFunc::Avg => AccumulatorState::Avg { sum: 0.0, count: 0 },
            AggregateFunc::Min => AccumulatorState::Min(None),
            AggregateFunc::Max => AccumulatorState::Max(None),
        };
        Self { func, state }
    }

    /// Accumulates a value. NULLs are skipped except by `COUNT(*)`.
    pub fn accumulate(&mut self, value: &Value) -> Result<(), EvalError> {
        if value.is_null() && self.func != AggregateFunc::CountStar {
            return Ok(());
        }

        match &mut self.state {
            AccumulatorState::Count(count) => *count += 1,
            AccumulatorState::IntSum(sum) => {
                let v = value.to_i64().ok_or(EvalError::TypeMismatch)?;
                let total = sum.unwrap_or(0).checked_add(v).ok_or_else(|| {
                    EvalError::InvalidArgument("integer overflow in SUM".to_string())
                })?;
                *sum = Some(total);
            }
            AccumulatorState::FloatSum(sum) => {
                let v = value.to_f64().ok_or(EvalError::TypeMismatch)?;
                *sum = Some(sum.unwrap_or(0.0) + v);
            }
            AccumulatorState::Avg { sum, count } => {
                *sum += value.to_f64().ok_or(EvalError::TypeMismatch)?;
                *count += 1;
            }
            AccumulatorState::Min(min) => {
                if min.as_ref().map_or(true, |m| value < m) {
                    *min = Some(value.clone());
                }
            }
            AccumulatorState::Max(max) => {
                if max.as_ref().map_or(true, |m| value > m) {
                    *max = Some(value.clone());
                }
            }
        }
        Ok(())
    }

    /// Returns the final result.
    pub fn result(&self) -> Value {
        match &self.state {
            AccumulatorState::Count(count) => Value::BigInt(*count),
            AccumulatorState::IntSum(sum) => sum.map(Value::BigInt).unwrap_or(Value::Null),
            AccumulatorState::FloatSum(sum) => sum.map(Value::Double).unwrap_or(Value::Null),
            AccumulatorState::Avg { sum, count } => {
                if *count == 0 {
                    Value::Null
                } else {
                    Value::Double(*sum / *count as f64)
                }
            }
            AccumulatorState::Min(v) | AccumulatorState::Max(v) => {
                v.clone().unwrap_or(Value::Null)
            }
        }
    }
}

/// Error type for expression evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// A variant does not store the requested field.
    MissingField(String),
    /// A column reference has no position in the input row.
    UnresolvedColumn(ColumnBinding),
    /// Type mismatch in operation.
    TypeMismatch,
    /// Division by zero.
    DivisionByZero,
    /// Cast error.
    Cast(String),
    /// Unknown function.
    UnknownFunction(String),
    /// Invalid argument.
    InvalidArgument(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::MissingField(field) => write!(f, "Missing variant field: {}", field),
            EvalError::UnresolvedColumn(binding) => write!(f, "Unresolved column: {}", binding),
            EvalError::TypeMismatch => write!(f, "Type mismatch"),
            EvalError::DivisionByZero => write!(f, "Division by zero"),
            EvalError::Cast(msg) => write!(f, "Cast error: {}", msg),
            EvalError::UnknownFunction(name) => write!(f, "Unknown function: {}", name),
            EvalError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for EvalError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BuiltinCatalog, FunctionCatalog};
    use crate::types::DataType;
    use sparse_common::types::TableIndex;

    fn binding(column: usize) -> ColumnBinding {
        ColumnBinding::new(TableIndex::new(1), column)
    }

    fn col(column: usize, data_type: DataType) -> Expr {
        Expr::column(binding(column), data_type, format!("c{}", column))
    }

    fn test_row() -> (Row, BindingLayout) {
        let row = Row::new(vec![Value::int(1), Value::Null, Value::string("x")]);
        let layout = layout_of(&[binding(0), binding(1), binding(2)]);
        (row, layout)
    }

    fn packed(catalog: &BuiltinCatalog) -> Expr {
        let pack = catalog
            .bind_scalar(
                STRUCT_PACK,
                vec![
                    col(0, DataType::Int).alias("c0"),
                    col(1, DataType::Int).alias("c1"),
                    col(2, DataType::Text).alias("c2"),
                ],
            )
            .unwrap();
        catalog.bind_scalar(STRUCT_TO_SPARSE_VARIANT, vec![pack]).unwrap()
    }

    fn extract(catalog: &BuiltinCatalog, field: &str) -> Expr {
        catalog
            .bind_scalar(VARIANT_EXTRACT, vec![packed(catalog), Expr::lit_str(field)])
            .unwrap()
    }

    #[test]
    fn test_evaluate_column_and_arithmetic() {
        let (row, layout) = test_row();
        let expr = col(0, DataType::Int).add(Expr::lit_i64(41));
        assert_eq!(evaluate_expr(&expr, &row, &layout).unwrap(), Value::BigInt(42));

        let missing = Expr::column(ColumnBinding::new(TableIndex::new(9), 0), DataType::Int, "z");
        assert!(matches!(
            evaluate_expr(&missing, &row, &layout),
            Err(EvalError::UnresolvedColumn(_))
        ));
    }

    #[test]
    fn test_three_valued_logic() {
        let (row, layout) = test_row();
        let null_cmp = col(1, DataType::Int).eq(Expr::lit_i64(1));
        assert_eq!(evaluate_expr(&null_cmp, &row, &layout).unwrap(), Value::Null);
        assert!(!evaluate_predicate(&null_cmp, &row, &layout).unwrap());

        let or = null_cmp.clone().or(Expr::lit_bool(true));
        assert_eq!(evaluate_expr(&or, &row, &layout).unwrap(), Value::Boolean(true));
        let and = null_cmp.and(Expr::lit_bool(false));
        assert_eq!(evaluate_expr(&and, &row, &layout).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_pack_omits_null_fields() {
        let catalog = BuiltinCatalog::new();
        let (row, layout) = test_row();
        let Value::Variant(v) = evaluate_expr(&packed(&catalog), &row, &layout).unwrap() else {
            panic!("expected variant");
        };
        assert_eq!(v.len(), 2);
        assert!(!v.contains("c1"));
    }

    #[test]
    fn test_extract_missing_field() {
        let catalog = BuiltinCatalog::new();
        let (row, layout) = test_row();

        let c1 = extract(&catalog, "c1");
        assert_eq!(
            evaluate_expr(&c1, &row, &layout),
            Err(EvalError::MissingField("c1".to_string()))
        );
        let guarded = catalog.bind_cast(c1.try_or_null(), &DataType::Int).unwrap();
        assert_eq!(evaluate_expr(&guarded, &row, &layout).unwrap(), Value::Null);

        let c0 = catalog
            .bind_cast(extract(&catalog, "c0").try_or_null(), &DataType::Int)
            .unwrap();
        assert_eq!(evaluate_expr(&c0, &row, &layout).unwrap(), Value::int(1));
    }

    #[test]
    fn test_try_propagates_other_errors() {
        let (row, layout) = test_row();
        let expr = col(0, DataType::Int).div(Expr::lit_i64(0)).try_or_null();
        assert_eq!(
            evaluate_expr(&expr, &row, &layout),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn test_null_variant_extracts_null() {
        let catalog = BuiltinCatalog::new();
        let row = Row::new(vec![Value::Null]);
        let layout = layout_of(&[binding(0)]);
        let expr = catalog
            .bind_scalar(
                VARIANT_EXTRACT,
                vec![col(0, DataType::Variant), Expr::lit_str("c0")],
            )
            .unwrap();
        assert_eq!(evaluate_expr(&expr, &row, &layout).unwrap(), Value::Null);
    }

    #[test]
    fn test_scalar_functions() {
        let catalog = BuiltinCatalog::new();
        let (row, layout) = test_row();
        let upper = catalog.bind_scalar("upper", vec![col(2, DataType::Text)]).unwrap();
        assert_eq!(evaluate_expr(&upper, &row, &layout).unwrap(), Value::string("X"));

        let coalesce = catalog
            .bind_scalar("coalesce", vec![col(1, DataType::Int), col(0, DataType::Int)])
            .unwrap();
        assert_eq!(evaluate_expr(&coalesce, &row, &layout).unwrap(), Value::int(1));
    }

    #[test]
    fn test_accumulators() {
        let values = [Value::int(3), Value::Null, Value::int(5)];

        let mut sum = Accumulator::new(AggregateFunc::Sum, true);
        let mut count_star = Accumulator::new(AggregateFunc::CountStar, false);
        let mut count = Accumulator::new(AggregateFunc::Count, false);
        let mut max = Accumulator::new(AggregateFunc::Max, false);
        for v in &values {
            sum.accumulate(v).unwrap();
            count_star.accumulate(v).unwrap();
            count.accumulate(v).unwrap();
            max.accumulate(v).unwrap();
        }
        assert_eq!(sum.result(), Value::BigInt(8));
        assert_eq!(count_star.result(), Value::BigInt(3));
        assert_eq!(count.result(), Value::BigInt(2));
        assert_eq!(max.result(), Value::int(5));
        assert_eq!(Accumulator::new(AggregateFunc::Avg, false).result(), Value::Null);
    }
}
