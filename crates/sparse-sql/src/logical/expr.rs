//! Bound expressions for logical plans.
//!
//! Every expression here is already bound: column references name the
//! producing operator's output by [`ColumnBinding`], and function calls carry
//! their resolved return type plus the payload the catalog attached when the
//! call was bound. Types are therefore known without consulting a schema.

use std::fmt;

use sparse_common::types::ColumnBinding;

use crate::types::{DataType, Value};

/// A bound expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to one output column of another operator.
    ColumnRef(BoundColumnRef),

    /// Literal value.
    Literal(Value),

    /// Alias (expression AS name).
    Alias {
        /// Aliased expression.
        expr: Box<Expr>,
        /// Output name.
        name: String,
    },

    /// Binary operation.
    BinaryOp {
        /// Left operand.
        left: Box<Expr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<Expr>,
    },

    /// Unary operation.
    UnaryOp {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        expr: Box<Expr>,
    },

    /// IS NULL check.
    IsNull(Box<Expr>),

    /// IS NOT NULL check.
    IsNotNull(Box<Expr>),

    /// CAST expression.
    Cast {
        /// Expression being cast.
        expr: Box<Expr>,
        /// Target type.
        data_type: DataType,
    },

    /// Bound scalar function call.
    Function(BoundFunction),

    /// Evaluates the inner expression, producing NULL when evaluation
    /// reports a missing field. Other failures still propagate.
    Try(Box<Expr>),

    /// Aggregate function call, only valid inside an aggregate operator.
    Aggregate {
        /// Aggregate function.
        func: AggregateFunc,
        /// Arguments; empty for `COUNT(*)`.
        args: Vec<Expr>,
        /// Whether duplicate inputs are ignored.
        distinct: bool,
        /// Result type.
        return_type: DataType,
    },
}

/// A column reference resolved to a binding.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundColumnRef {
    /// The referenced output column.
    pub binding: ColumnBinding,
    /// Type of the referenced column.
    pub data_type: DataType,
    /// Display name.
    pub name: String,
}

impl BoundColumnRef {
    /// Creates a new bound column reference.
    pub fn new(binding: ColumnBinding, data_type: DataType, name: impl Into<String>) -> Self {
        Self {
            binding,
            data_type,
            name: name.into(),
        }
    }
}

/// A scalar function call bound against the function catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundFunction {
    /// Catalog name of the function.
    pub name: String,
    /// Bound arguments.
    pub args: Vec<Expr>,
    /// Resolved return type.
    pub return_type: DataType,
    /// Per-call payload produced at bind time.
    pub bind_data: BindData,
}

/// Opaque per-call payload attached by the catalog when binding a function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BindData {
    /// The function needs no payload.
    #[default]
    None,
    /// Field names for `struct_pack`, one per argument.
    StructPack {
        /// Output field names in argument order.
        field_names: Vec<String>,
    },
    /// The constant field name for `variant_extract`.
    VariantExtract {
        /// Field to extract.
        field: String,
    },
}

impl Expr {
    // ===== Constructors =====

    /// Creates a bound column reference.
    pub fn column(binding: ColumnBinding, data_type: DataType, name: impl Into<String>) -> Self {
        Expr::ColumnRef(BoundColumnRef::new(binding, data_type, name))
    }

    /// Creates a literal.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Creates a literal integer.
    pub fn lit_i64(value: i64) -> Self {
        Expr::Literal(Value::BigInt(value))
    }

    /// Creates a literal string.
    pub fn lit_str(value: impl Into<String>) -> Self {
        Expr::Literal(Value::String(value.into()))
    }

    /// Creates a literal boolean.
    pub fn lit_bool(value: bool) -> Self {
        Expr::Literal(Value::Boolean(value))
    }

    /// Creates a NULL literal.
    pub fn lit_null() -> Self {
        Expr::Literal(Value::Null)
    }

    /// Creates an alias.
    pub fn alias(self, name: impl Into<String>) -> Self {
        Expr::Alias {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    /// Wraps this expression in an unchecked cast.
    ///
    /// Use the catalog's `bind_cast` when the cast path must be validated.
    pub fn cast_to(self, data_type: DataType) -> Self {
        Expr::Cast {
            expr: Box::new(self),
            data_type,
        }
    }

    /// Wraps this expression so that a missing field yields NULL.
    pub fn try_or_null(self) -> Self {
        Expr::Try(Box::new(self))
    }

    // ===== Binary operations =====

    /// Equality comparison.
    pub fn eq(self, other: Expr) -> Self {
        self.binary_op(BinaryOp::Eq, other)
    }

    /// Not equal comparison.
    pub fn not_eq(self, other: Expr) -> Self {
        self.binary_op(BinaryOp::NotEq, other)
    }

    /// Less than comparison.
    pub fn lt(self, other: Expr) -> Self {
        self.binary_op(BinaryOp::Lt, other)
    }

    /// Less than or equal comparison.
    pub fn lt_eq(self, other: Expr) -> Self {
        self.binary_op(BinaryOp::LtEq, other)
    }

    /// Greater than comparison.
    pub fn gt(self, other: Expr) -> Self {
        self.binary_op(BinaryOp::Gt, other)
    }

    /// Greater than or equal comparison.
    pub fn gt_eq(self, other: Expr) -> Self {
        self.binary_op(BinaryOp::GtEq, other)
    }

    /// Logical AND.
    pub fn and(self, other: Expr) -> Self {
        self.binary_op(BinaryOp::And, other)
    }

    /// Logical OR.
    pub fn or(self, other: Expr) -> Self {
        self.binary_op(BinaryOp::Or, other)
    }

    /// Addition.
    pub fn add(self, other: Expr) -> Self {
        self.binary_op(BinaryOp::Plus, other)
    }

    /// Subtraction.
    pub fn sub(self, other: Expr) -> Self {
        self.binary_op(BinaryOp::Minus, other)
    }

    /// Multiplication.
    pub fn mul(self, other: Expr) -> Self {
        self.binary_op(BinaryOp::Multiply, other)
    }

    /// Division.
    pub fn div(self, other: Expr) -> Self {
        self.binary_op(BinaryOp::Divide, other)
    }

    fn binary_op(self, op: BinaryOp, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    // ===== Unary operations =====

    /// Logical NOT.
    pub fn not(self) -> Self {
        Expr::UnaryOp {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    /// Negation.
    pub fn neg(self) -> Self {
        Expr::UnaryOp {
            op: UnaryOp::Minus,
            expr: Box::new(self),
        }
    }

    /// IS NULL.
    pub fn is_null(self) -> Self {
        Expr::IsNull(Box::new(self))
    }

    /// IS NOT NULL.
    pub fn is_not_null(self) -> Self {
        Expr::IsNotNull(Box::new(self))
    }

    // ===== Aggregate functions =====

    /// COUNT(*) aggregate.
    pub fn count_star() -> Self {
        Expr::Aggregate {
            func: AggregateFunc::CountStar,
            args: Vec::new(),
            distinct: false,
            return_type: DataType::BigInt,
        }
    }

    /// COUNT aggregate.
    pub fn count(self) -> Self {
        self.aggregate(AggregateFunc::Count)
    }

    /// SUM aggregate.
    pub fn sum(self) -> Self {
        self.aggregate(AggregateFunc::Sum)
    }

    /// AVG aggregate.
    pub fn avg(self) -> Self {
        self.aggregate(AggregateFunc::Avg)
    }

    /// MIN aggregate.
    pub fn min(self) -> Self {
        self.aggregate(AggregateFunc::Min)
    }

    /// MAX aggregate.
    pub fn max(self) -> Self {
        self.aggregate(AggregateFunc::Max)
    }

    fn aggregate(self, func: AggregateFunc) -> Self {
        let return_type = func.return_type(&self.data_type());
        Expr::Aggregate {
            func,
            args: vec![self],
            distinct: false,
            return_type,
        }
    }

    // ===== Analysis methods =====

    /// Returns the column reference if this expression is one.
    pub fn as_column_ref(&self) -> Option<&BoundColumnRef> {
        match self {
            Expr::ColumnRef(c) => Some(c),
            _ => None,
        }
    }

    /// Returns true if this is a plain column reference.
    pub fn is_column_ref(&self) -> bool {
        matches!(self, Expr::ColumnRef(_))
    }

    /// Returns the expression beneath any aliases.
    pub fn strip_alias(&self) -> &Expr {
        match self {
            Expr::Alias { expr, .. } => expr.strip_alias(),
            other => other,
        }
    }

    /// Returns the direct children of this expression.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::ColumnRef(_) | Expr::Literal(_) => Vec::new(),
            Expr::Alias { expr, .. }
            | Expr::UnaryOp { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::IsNull(expr)
            | Expr::IsNotNull(expr)
            | Expr::Try(expr) => vec![expr.as_ref()],
            Expr::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Function(func) => func.args.iter().collect(),
            Expr::Aggregate { args, .. } => args.iter().collect(),
        }
    }

    /// Returns mutable references to the direct children of this expression.
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::ColumnRef(_) | Expr::Literal(_) => Vec::new(),
            Expr::Alias { expr, .. }
            | Expr::UnaryOp { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::IsNull(expr)
            | Expr::IsNotNull(expr)
            | Expr::Try(expr) => vec![expr.as_mut()],
            Expr::BinaryOp { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Expr::Function(func) => func.args.iter_mut().collect(),
            Expr::Aggregate { args, .. } => args.iter_mut().collect(),
        }
    }

    /// Visits this expression and all descendants, parents first.
    pub fn visit<F: FnMut(&Expr)>(&self, f: &mut F) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// Mutably visits this expression and all descendants, parents first.
    pub fn visit_mut<F: FnMut(&mut Expr)>(&mut self, f: &mut F) {
        f(self);
        for child in self.children_mut() {
            child.visit_mut(f);
        }
    }

    /// Returns every column binding referenced by this expression, in
    /// traversal order.
    pub fn column_bindings(&self) -> Vec<ColumnBinding> {
        let mut bindings = Vec::new();
        self.visit(&mut |e| {
            if let Expr::ColumnRef(c) = e {
                bindings.push(c.binding);
            }
        });
        bindings
    }

    /// Returns true if this expression contains any aggregate functions.
    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= matches!(e, Expr::Aggregate { .. }));
        found
    }

    /// Returns true if the expression references no columns or aggregates.
    pub fn is_constant(&self) -> bool {
        let mut constant = true;
        self.visit(&mut |e| {
            constant &= !matches!(e, Expr::ColumnRef(_) | Expr::Aggregate { .. });
        });
        constant
    }

    /// Returns the output data type of this expression.
    pub fn data_type(&self) -> DataType {
        match self {
            Expr::ColumnRef(c) => c.data_type.clone(),
            Expr::Literal(v) => v.data_type(),
            Expr::Alias { expr, .. } | Expr::Try(expr) => expr.data_type(),
            Expr::BinaryOp { left, op, right } => {
                binary_op_data_type(*op, &left.data_type(), &right.data_type())
            }
            Expr::UnaryOp { op, expr } => match op {
                UnaryOp::Not => DataType::Boolean,
                UnaryOp::Minus => expr.data_type(),
            },
            Expr::IsNull(_) | Expr::IsNotNull(_) => DataType::Boolean,
            Expr::Cast { data_type, .. } => data_type.clone(),
            Expr::Function(func) => func.return_type.clone(),
            Expr::Aggregate { return_type, .. } => return_type.clone(),
        }
    }

    /// Returns the output name of this expression.
    pub fn output_name(&self) -> String {
        match self {
            Expr::ColumnRef(c) => c.name.clone(),
            Expr::Alias { name, .. } => name.clone(),
            Expr::Literal(v) => v.to_string(),
            Expr::Cast { expr, .. } | Expr::Try(expr) => expr.output_name(),
            Expr::Function(func) => {
                let args: Vec<_> = func.args.iter().map(Expr::output_name).collect();
                format!("{}({})", func.name, args.join(", "))
            }
            Expr::Aggregate { func, args, .. } => {
                let args: Vec<_> = args.iter().map(Expr::output_name).collect();
                format!("{}({})", func, args.join(", "))
            }
            other => other.to_string(),
        }
    }
}

fn binary_op_data_type(op: BinaryOp, left: &DataType, right: &DataType) -> DataType {
    match op {
        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Lt
        | BinaryOp::LtEq
        | BinaryOp::Gt
        | BinaryOp::GtEq
        | BinaryOp::And
        | BinaryOp::Or => DataType::Boolean,

        // Arithmetic preserves the wider type
        BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Modulo => left
            .wider_numeric(right)
            .unwrap_or_else(|| left.clone()),
        BinaryOp::Divide => DataType::Double,

        BinaryOp::Concat => DataType::Text,
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::ColumnRef(c) => write!(f, "{}{}", c.name, c.binding),
            Expr::Literal(Value::String(s)) => write!(f, "'{}'", s),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Alias { expr, name } => write!(f, "{} AS {}", expr, name),
            Expr::BinaryOp { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::UnaryOp { op, expr } => match op {
                UnaryOp::Not => write!(f, "(NOT {})", expr),
                UnaryOp::Minus => write!(f, "(-{})", expr),
            },
            Expr::IsNull(e) => write!(f, "{} IS NULL", e),
            Expr::IsNotNull(e) => write!(f, "{} IS NOT NULL", e),
            Expr::Cast { expr, data_type } => write!(f, "CAST({} AS {})", expr, data_type),
            Expr::Function(func) => {
                write!(f, "{}(", func.name)?;
                for (i, arg) in func.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match &func.bind_data {
                        BindData::StructPack { field_names } => {
                            let name = field_names.get(i).map_or("?", String::as_str);
                            write!(f, "{} := {}", name, arg)?;
                        }
                        _ => write!(f, "{}", arg)?,
                    }
                }
                write!(f, ")")
            }
            Expr::Try(e) => write!(f, "TRY({})", e),
            Expr::Aggregate {
                func,
                args,
                distinct,
                ..
            } => {
                if *func == AggregateFunc::CountStar {
                    return write!(f, "COUNT(*)");
                }
                write!(f, "{}(", func)?;
                if *distinct {
                    write!(f, "DISTINCT ")?;
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,

    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,

    /// `AND`, three-valued.
    And,
    /// `OR`, three-valued.
    Or,

    /// `||` string concatenation.
    Concat,
}

impl BinaryOp {
    /// Returns true if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    /// Returns true if this is a logical operator.
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Returns true if this is an arithmetic operator.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Plus
                | BinaryOp::Minus
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Eq => write!(f, "="),
            BinaryOp::NotEq => write!(f, "<>"),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::LtEq => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::GtEq => write!(f, ">="),
            BinaryOp::Plus => write!(f, "+"),
            BinaryOp::Minus => write!(f, "-"),
            BinaryOp::Multiply => write!(f, "*"),
            BinaryOp::Divide => write!(f, "/"),
            BinaryOp::Modulo => write!(f, "%"),
            BinaryOp::And => write!(f, "AND"),
            BinaryOp::Or => write!(f, "OR"),
            BinaryOp::Concat => write!(f, "||"),
        }
    }
}

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Arithmetic negation.
    Minus,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "NOT"),
            UnaryOp::Minus => write!(f, "-"),
        }
    }
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    /// `COUNT(expr)`, counting non-null inputs.
    Count,
    /// `COUNT(*)`.
    CountStar,
    /// `SUM`
    Sum,
    /// `AVG`
    Avg,
    /// `MIN`
    Min,
    /// `MAX`
    Max,
}

impl AggregateFunc {
    /// Returns the result type for the given input type.
    pub fn return_type(&self, input: &DataType) -> DataType {
        match self {
            AggregateFunc::Count | AggregateFunc::CountStar => DataType::BigInt,
            AggregateFunc::Sum => match input {
                DataType::TinyInt | DataType::SmallInt | DataType::Int | DataType::BigInt => {
                    DataType::BigInt
                }
                _ => DataType::Double,
            },
            AggregateFunc::Avg => DataType::Double,
            AggregateFunc::Min | AggregateFunc::Max => input.clone(),
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunc::Count => write!(f, "COUNT"),
            AggregateFunc::CountStar => write!(f, "COUNT(*)"),
            AggregateFunc::Sum => write!(f, "SUM"),
            AggregateFunc::Avg => write!(f, "AVG"),
            AggregateFunc::Min => write!(f, "MIN"),
            AggregateFunc::Max => write!(f, "MAX"),
        }
    }
}

/// Sort expression.
#[derive(Debug, Clone, PartialEq)]
pub struct SortExpr {
    /// Expression to sort by.
    pub expr: Expr,
    /// Sort direction.
    pub asc: bool,
    /// NULL handling.
    pub nulls_first: bool,
}

impl SortExpr {
    /// Creates a new ascending sort.
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            asc: true,
            nulls_first: false,
        }
    }

    /// Creates a new descending sort.
    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            asc: false,
            nulls_first: true,
        }
    }
}

impl fmt::Display for SortExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if self.asc {
            write!(f, " ASC")?;
        } else {
            write!(f, " DESC")?;
        }
        if self.nulls_first {
            write!(f, " NULLS FIRST")?;
        } else {
            write!(f, " NULLS LAST")?;
        }
        Ok(())
    }
}
