//! Built-in scalar functions and their binders.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::{BindError, FunctionCatalog};
use crate::logical::{BindData, BoundFunction, Expr};
use crate::types::{DataType, StructField, Value};

/// Packs aliased arguments into a struct.
pub const STRUCT_PACK: &str = "struct_pack";
/// Converts a struct into a sparse variant object.
pub const STRUCT_TO_SPARSE_VARIANT: &str = "struct_to_sparse_variant";
/// Extracts a named field from a variant.
pub const VARIANT_EXTRACT: &str = "variant_extract";

/// Number of arguments a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many arguments.
    Exact(usize),
    /// At least this many arguments.
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// Result of a binder: the final arguments, return type and payload.
pub type BindOutput = (Vec<Expr>, DataType, BindData);

/// A scalar function known to the catalog.
#[derive(Debug, Clone)]
pub struct ScalarFunction {
    /// Lowercase function name.
    pub name: &'static str,
    /// Accepted argument count.
    pub arity: Arity,
    /// Checks the arguments and resolves the return type.
    pub bind: fn(&'static str, Vec<Expr>) -> Result<BindOutput, BindError>,
}

/// The catalog of built-in scalar functions.
#[derive(Debug, Clone)]
pub struct BuiltinCatalog {
    functions: HashMap<&'static str, ScalarFunction>,
}

impl Default for BuiltinCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinCatalog {
    /// Creates a catalog with every built-in function registered.
    pub fn new() -> Self {
        let mut catalog = Self {
            functions: HashMap::new(),
        };
        for function in builtins() {
            catalog.register(function);
        }
        catalog
    }

    /// Registers a function, replacing any function with the same name.
    pub fn register(&mut self, function: ScalarFunction) {
        self.functions.insert(function.name, function);
    }

    /// Looks up a function by name, ignoring case.
    pub fn function(&self, name: &str) -> Option<&ScalarFunction> {
        self.functions.get(name.to_lowercase().as_str())
    }

    /// Returns the registered function names, sorted.
    pub fn function_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl FunctionCatalog for BuiltinCatalog {
    fn bind_scalar(&self, name: &str, args: Vec<Expr>) -> Result<Expr, BindError> {
        let function = self
            .function(name)
            .ok_or_else(|| BindError::UnknownFunction(name.to_string()))?;
        if !function.arity.accepts(args.len()) {
            return Err(BindError::WrongArity {
                name: function.name.to_string(),
                expected: function.arity,
                actual: args.len(),
            });
        }

        let (args, return_type, bind_data) = (function.bind)(function.name, args)?;
        Ok(Expr::Function(BoundFunction {
            name: function.name.to_string(),
            args,
            return_type,
            bind_data,
        }))
    }
}

fn builtins() -> Vec<ScalarFunction> {
    vec![
        ScalarFunction {
            name: STRUCT_PACK,
            arity: Arity::AtLeast(1),
            bind: bind_struct_pack,
        },
        ScalarFunction {
            name: STRUCT_TO_SPARSE_VARIANT,
            arity: Arity::Exact(1),
            bind: bind_struct_to_sparse_variant,
        },
        ScalarFunction {
            name: VARIANT_EXTRACT,
            arity: Arity::Exact(2),
            bind: bind_variant_extract,
        },
        ScalarFunction {
            name: "upper",
            arity: Arity::Exact(1),
            bind: bind_string_unary,
        },
        ScalarFunction {
            name: "lower",
            arity: Arity::Exact(1),
            bind: bind_string_unary,
        },
        ScalarFunction {
            name: "length",
            arity: Arity::Exact(1),
            bind: bind_length,
        },
        ScalarFunction {
            name: "abs",
            arity: Arity::Exact(1),
            bind: bind_abs,
        },
        ScalarFunction {
            name: "coalesce",
            arity: Arity::AtLeast(1),
            bind: bind_coalesce,
        },
    ]
}

/// `struct_pack(name := expr, ...)`: every argument must be aliased and the
/// aliases become the field names.
fn bind_struct_pack(name: &'static str, args: Vec<Expr>) -> Result<BindOutput, BindError> {
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(args.len());
    let mut field_names = Vec::with_capacity(args.len());
    let mut values = Vec::with_capacity(args.len());

    for arg in args {
        let (expr, field) = match arg {
            Expr::Alias { expr, name: field } => (expr, field),
            other => {
                return Err(BindError::invalid_argument(
                    name,
                    format!("argument {} must be named", other),
                ))
            }
        };
        if !seen.insert(field.clone()) {
            return Err(BindError::DuplicateField { field });
        }
        fields.push(StructField::new(field.clone(), expr.data_type()));
        field_names.push(field);
        values.push(*expr);
    }

    Ok((
        values,
        DataType::Struct(fields),
        BindData::StructPack { field_names },
    ))
}

fn bind_struct_to_sparse_variant(
    name: &'static str,
    args: Vec<Expr>,
) -> Result<BindOutput, BindError> {
    match args[0].data_type() {
        DataType::Struct(_) => Ok((args, DataType::Variant, BindData::None)),
        other => Err(BindError::invalid_argument(
            name,
            format!("expected STRUCT, got {}", other),
        )),
    }
}

/// `variant_extract(variant, 'field')`: the field name must be a constant.
fn bind_variant_extract(name: &'static str, args: Vec<Expr>) -> Result<BindOutput, BindError> {
    let source = args[0].data_type();
    if source != DataType::Variant {
        return Err(BindError::invalid_argument(
            name,
            format!("expected VARIANT, got {}", source),
        ));
    }
    let field = match &args[1] {
        Expr::Literal(Value::String(field)) => field.clone(),
        other => {
            return Err(BindError::invalid_argument(
                name,
                format!("field name must be a string literal, got {}", other),
            ))
        }
    };
    Ok((args, DataType::Variant, BindData::VariantExtract { field }))
}

fn bind_string_unary(name: &'static str, args: Vec<Expr>) -> Result<BindOutput, BindError> {
    expect_string(name, &args[0])?;
    Ok((args, DataType::Text, BindData::None))
}

fn bind_length(name: &'static str, args: Vec<Expr>) -> Result<BindOutput, BindError> {
    expect_string(name, &args[0])?;
    Ok((args, DataType::BigInt, BindData::None))
}

fn bind_abs(name: &'static str, args: Vec<Expr>) -> Result<BindOutput, BindError> {
    let ty = args[0].data_type();
    if !ty.is_numeric() {
        return Err(BindError::invalid_argument(
            name,
            format!("expected a numeric argument, got {}", ty),
        ));
    }
    Ok((args, ty, BindData::None))
}

/// The result type is the type of the first argument that is not a NULL
/// literal; every other non-NULL argument must share it.
fn bind_coalesce(name: &'static str, args: Vec<Expr>) -> Result<BindOutput, BindError> {
    let mut result: Option<DataType> = None;
    for arg in args.iter().filter(|a| !matches!(a, Expr::Literal(Value::Null))) {
        let ty = arg.data_type();
        match &result {
            None => result = Some(ty),
            Some(expected) if *expected == ty => {}
            Some(expected) => {
                return Err(BindError::invalid_argument(
                    name,
                    format!("expected {}, got {}", expected, ty),
                ))
            }
        }
    }
    Ok((args, result.unwrap_or(DataType::Text), BindData::None))
}

fn expect_string(name: &str, arg: &Expr) -> Result<(), BindError> {
    let ty = arg.data_type();
    if ty.is_string() || matches!(arg, Expr::Literal(Value::Null)) {
        Ok(())
    } else {
        Err(BindError::invalid_argument(
            name,
            format!("expected a string argument, got {}", ty),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparse_common::types::{ColumnBinding, TableIndex};

    fn col(column: usize, ty: DataType) -> Expr {
        Expr::column(
            ColumnBinding::new(TableIndex::new(0), column),
            ty,
            format!("c{}", column),
        )
    }

    #[test]
    fn test_struct_pack_uses_aliases() {
        let catalog = BuiltinCatalog::new();
        let packed = catalog
            .bind_scalar(
                "struct_pack",
                vec![
                    col(0, DataType::Int).alias("c0"),
                    col(1, DataType::Text).alias("c1"),
                ],
            )
            .unwrap();

        assert_eq!(
            packed.data_type(),
            DataType::Struct(vec![
                StructField::new("c0", DataType::Int),
                StructField::new("c1", DataType::Text),
            ])
        );
        let Expr::Function(func) = &packed else {
            panic!("expected function");
        };
        assert!(func.args.iter().all(Expr::is_column_ref));
        assert_eq!(
            func.bind_data,
            BindData::StructPack {
                field_names: vec!["c0".to_string(), "c1".to_string()]
            }
        );
    }

    #[test]
    fn test_struct_pack_rejects_bad_arguments() {
        let catalog = BuiltinCatalog::new();
        let err = catalog
            .bind_scalar(
                "struct_pack",
                vec![
                    col(0, DataType::Int).alias("a"),
                    col(1, DataType::Int).alias("a"),
                ],
            )
            .unwrap_err();
        assert_eq!(
            err,
            BindError::DuplicateField {
                field: "a".to_string()
            }
        );

        let err = catalog
            .bind_scalar("struct_pack", vec![col(0, DataType::Int)])
            .unwrap_err();
        assert!(matches!(err, BindError::InvalidArgument { .. }));

        let err = catalog.bind_scalar("struct_pack", vec![]).unwrap_err();
        assert!(matches!(err, BindError::WrongArity { .. }));
    }

    #[test]
    fn test_sparse_variant_and_extract() {
        let catalog = BuiltinCatalog::new();
        let packed = catalog
            .bind_scalar("struct_pack", vec![col(0, DataType::Int).alias("c0")])
            .unwrap();
        let variant = catalog
            .bind_scalar("STRUCT_TO_SPARSE_VARIANT", vec![packed])
            .unwrap();
        assert_eq!(variant.data_type(), DataType::Variant);

        let extracted = catalog
            .bind_scalar("variant_extract", vec![variant.clone(), Expr::lit_str("c0")])
            .unwrap();
        let Expr::Function(func) = &extracted else {
            panic!("expected function");
        };
        assert_eq!(
            func.bind_data,
            BindData::VariantExtract {
                field: "c0".to_string()
            }
        );

        let err = catalog
            .bind_scalar("variant_extract", vec![variant, col(1, DataType::Text)])
            .unwrap_err();
        assert!(matches!(err, BindError::InvalidArgument { .. }));

        let err = catalog
            .bind_scalar("struct_to_sparse_variant", vec![col(0, DataType::Int)])
            .unwrap_err();
        assert!(matches!(err, BindError::InvalidArgument { .. }));
    }

    #[test]
    fn test_bind_cast() {
        let catalog = BuiltinCatalog::new();
        let variant = col(0, DataType::Variant);

        let cast = catalog.bind_cast(variant.clone(), &DataType::Int).unwrap();
        assert_eq!(cast.data_type(), DataType::Int);
        assert!(matches!(cast, Expr::Cast { .. }));

        let same = catalog.bind_cast(variant, &DataType::Variant).unwrap();
        assert!(same.is_column_ref());

        let err = catalog
            .bind_cast(col(1, DataType::Date), &DataType::Int)
            .unwrap_err();
        assert_eq!(
            err,
            BindError::NoCastPath {
                from: DataType::Date,
                to: DataType::Int
            }
        );
    }

    #[test]
    fn test_ordinary_scalars() {
        let catalog = BuiltinCatalog::new();
        assert_eq!(
            catalog
                .bind_scalar("upper", vec![col(0, DataType::Text)])
                .unwrap()
                .data_type(),
            DataType::Text
        );
        assert_eq!(
            catalog
                .bind_scalar("abs", vec![col(0, DataType::Int)])
                .unwrap()
                .data_type(),
            DataType::Int
        );
        assert_eq!(
            catalog
                .bind_scalar("coalesce", vec![Expr::lit_null(), col(0, DataType::Double)])
                .unwrap()
                .data_type(),
            DataType::Double
        );
        assert!(matches!(
            catalog.bind_scalar("nope", vec![]),
            Err(BindError::UnknownFunction(_))
        ));
        assert!(catalog.function_names().contains(&"variant_extract"));
    }
}
