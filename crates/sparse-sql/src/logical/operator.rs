//! Logical operators for bound query plans.
//!
//! Operators that introduce new columns (scan, projection, aggregate,
//! empty relation) own a [`TableIndex`]; their outputs are named
//! `(table_index, position)`. Every other operator forwards the bindings of
//! its children, so a reference to a column keeps its meaning as it flows up
//! the tree.

use std::fmt;

use serde::{Deserialize, Serialize};
use sparse_common::types::{ColumnBinding, TableIndex};

use super::expr::{BinaryOp, Expr, SortExpr};
use super::schema::Schema;
use crate::types::DataType;

/// Join type for join operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    /// Matching pairs only.
    Inner,
    /// Every left row, padded with NULLs when unmatched.
    Left,
    /// Every right row, padded with NULLs when unmatched.
    Right,
    /// Every row from both sides.
    Full,
}

impl JoinType {
    /// Returns true if this join preserves all rows from the left side.
    pub fn preserves_left(&self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    /// Returns true if this join preserves all rows from the right side.
    pub fn preserves_right(&self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }

    /// Returns true if this is an outer join.
    pub fn is_outer(&self) -> bool {
        !matches!(self, JoinType::Inner)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::Left => write!(f, "LEFT"),
            JoinType::Right => write!(f, "RIGHT"),
            JoinType::Full => write!(f, "FULL"),
        }
    }
}

/// Comparison used by a join condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    /// `=`
    Equal,
    /// `<>`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
}

impl ComparisonOp {
    /// Returns the equivalent binary operator.
    pub fn to_binary_op(self) -> BinaryOp {
        match self {
            ComparisonOp::Equal => BinaryOp::Eq,
            ComparisonOp::NotEqual => BinaryOp::NotEq,
            ComparisonOp::LessThan => BinaryOp::Lt,
            ComparisonOp::LessThanOrEqual => BinaryOp::LtEq,
            ComparisonOp::GreaterThan => BinaryOp::Gt,
            ComparisonOp::GreaterThanOrEqual => BinaryOp::GtEq,
        }
    }

    /// Converts a comparison binary operator.
    pub fn from_binary_op(op: BinaryOp) -> Option<Self> {
        match op {
            BinaryOp::Eq => Some(ComparisonOp::Equal),
            BinaryOp::NotEq => Some(ComparisonOp::NotEqual),
            BinaryOp::Lt => Some(ComparisonOp::LessThan),
            BinaryOp::LtEq => Some(ComparisonOp::LessThanOrEqual),
            BinaryOp::Gt => Some(ComparisonOp::GreaterThan),
            BinaryOp::GtEq => Some(ComparisonOp::GreaterThanOrEqual),
            _ => None,
        }
    }

    /// Returns the comparison with its operands swapped (`a < b` == `b > a`).
    pub fn flip(self) -> Self {
        match self {
            ComparisonOp::LessThan => ComparisonOp::GreaterThan,
            ComparisonOp::LessThanOrEqual => ComparisonOp::GreaterThanOrEqual,
            ComparisonOp::GreaterThan => ComparisonOp::LessThan,
            ComparisonOp::GreaterThanOrEqual => ComparisonOp::LessThanOrEqual,
            other => other,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_binary_op())
    }
}

/// One condition of a comparison join.
///
/// `left` is evaluated against the left (probe) child and `right` against
/// the right (build) child.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    /// Probe-side operand.
    pub left: Expr,
    /// Build-side operand.
    pub right: Expr,
    /// Comparison between the operands.
    pub comparison: ComparisonOp,
}

impl JoinCondition {
    /// Creates a new join condition.
    pub fn new(left: Expr, right: Expr, comparison: ComparisonOp) -> Self {
        Self {
            left,
            right,
            comparison,
        }
    }

    /// Creates an equality condition.
    pub fn equal(left: Expr, right: Expr) -> Self {
        Self::new(left, right, ComparisonOp::Equal)
    }

    /// Returns the condition as a boolean expression.
    pub fn to_expr(&self) -> Expr {
        Expr::BinaryOp {
            left: Box::new(self.left.clone()),
            op: self.comparison.to_binary_op(),
            right: Box::new(self.right.clone()),
        }
    }
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.comparison, self.right)
    }
}

/// A logical operator in a bound query plan.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalOperator {
    /// Table scan.
    Scan(ScanOperator),

    /// Projection (SELECT list).
    Projection(ProjectionOperator),

    /// Filter (WHERE clause).
    Filter(FilterOperator),

    /// Join on a list of comparisons.
    ComparisonJoin(ComparisonJoinOperator),

    /// Aggregate (GROUP BY).
    Aggregate(AggregateOperator),

    /// Sort (ORDER BY).
    Sort(SortOperator),

    /// Limit (LIMIT/OFFSET).
    Limit(LimitOperator),

    /// Relation with no rows.
    EmptyRelation(EmptyRelationOperator),
}

/// An empty relation with no columns and an invalid table index.
///
/// Used as a placeholder while a node is moved out of its slot.
impl Default for LogicalOperator {
    fn default() -> Self {
        LogicalOperator::EmptyRelation(EmptyRelationOperator::default())
    }
}

impl LogicalOperator {
    /// Returns the output column bindings in output order.
    pub fn column_bindings(&self) -> Vec<ColumnBinding> {
        match self {
            LogicalOperator::Scan(op) => ColumnBinding::range(op.table_index, op.schema.len()),
            LogicalOperator::Projection(op) => ColumnBinding::range(op.table_index, op.exprs.len()),
            LogicalOperator::Aggregate(op) => {
                ColumnBinding::range(op.table_index, op.groups.len() + op.aggregates.len())
            }
            LogicalOperator::EmptyRelation(op) => {
                ColumnBinding::range(op.table_index, op.types.len())
            }
            LogicalOperator::ComparisonJoin(op) => {
                let mut bindings = op.left_bindings();
                bindings.extend(op.right_bindings());
                bindings
            }
            LogicalOperator::Filter(op) => op.input.column_bindings(),
            LogicalOperator::Sort(op) => op.input.column_bindings(),
            LogicalOperator::Limit(op) => op.input.column_bindings(),
        }
    }

    /// Returns the output column types, aligned with [`Self::column_bindings`].
    pub fn types(&self) -> Vec<DataType> {
        match self {
            LogicalOperator::Scan(op) => op.schema.types(),
            LogicalOperator::Projection(op) => op.exprs.iter().map(Expr::data_type).collect(),
            LogicalOperator::Aggregate(op) => op
                .groups
                .iter()
                .chain(&op.aggregates)
                .map(Expr::data_type)
                .collect(),
            LogicalOperator::EmptyRelation(op) => op.types.clone(),
            LogicalOperator::ComparisonJoin(op) => {
                let mut types = apply_projection_map(op.left.types(), &op.left_projection_map);
                types.extend(apply_projection_map(
                    op.right.types(),
                    &op.right_projection_map,
                ));
                types
            }
            LogicalOperator::Filter(op) => op.input.types(),
            LogicalOperator::Sort(op) => op.input.types(),
            LogicalOperator::Limit(op) => op.input.types(),
        }
    }

    /// Returns the output column names, aligned with [`Self::column_bindings`].
    pub fn column_names(&self) -> Vec<String> {
        match self {
            LogicalOperator::Scan(op) => op.schema.names(),
            LogicalOperator::Projection(op) => op.exprs.iter().map(Expr::output_name).collect(),
            LogicalOperator::Aggregate(op) => op
                .groups
                .iter()
                .chain(&op.aggregates)
                .map(Expr::output_name)
                .collect(),
            LogicalOperator::EmptyRelation(op) => {
                (0..op.types.len()).map(|i| format!("col{}", i)).collect()
            }
            LogicalOperator::ComparisonJoin(op) => {
                let mut names =
                    apply_projection_map(op.left.column_names(), &op.left_projection_map);
                names.extend(apply_projection_map(
                    op.right.column_names(),
                    &op.right_projection_map,
                ));
                names
            }
            LogicalOperator::Filter(op) => op.input.column_names(),
            LogicalOperator::Sort(op) => op.input.column_names(),
            LogicalOperator::Limit(op) => op.input.column_names(),
        }
    }

    /// Returns the children of this operator.
    pub fn children(&self) -> Vec<&LogicalOperator> {
        match self {
            LogicalOperator::Scan(_) | LogicalOperator::EmptyRelation(_) => vec![],
            LogicalOperator::Projection(op) => vec![op.input.as_ref()],
            LogicalOperator::Filter(op) => vec![op.input.as_ref()],
            LogicalOperator::Aggregate(op) => vec![op.input.as_ref()],
            LogicalOperator::Sort(op) => vec![op.input.as_ref()],
            LogicalOperator::Limit(op) => vec![op.input.as_ref()],
            LogicalOperator::ComparisonJoin(op) => vec![op.left.as_ref(), op.right.as_ref()],
        }
    }

    /// Returns mutable references to the child slots of this operator.
    pub fn children_mut(&mut self) -> Vec<&mut LogicalOperator> {
        match self {
            LogicalOperator::Scan(_) | LogicalOperator::EmptyRelation(_) => vec![],
            LogicalOperator::Projection(op) => vec![op.input.as_mut()],
            LogicalOperator::Filter(op) => vec![op.input.as_mut()],
            LogicalOperator::Aggregate(op) => vec![op.input.as_mut()],
            LogicalOperator::Sort(op) => vec![op.input.as_mut()],
            LogicalOperator::Limit(op) => vec![op.input.as_mut()],
            LogicalOperator::ComparisonJoin(op) => vec![op.left.as_mut(), op.right.as_mut()],
        }
    }

    /// Returns the expressions owned directly by this operator.
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            LogicalOperator::Scan(_)
            | LogicalOperator::EmptyRelation(_)
            | LogicalOperator::Limit(_) => vec![],
            LogicalOperator::Projection(op) => op.exprs.iter().collect(),
            LogicalOperator::Filter(op) => vec![&op.predicate],
            LogicalOperator::Aggregate(op) => op.groups.iter().chain(&op.aggregates).collect(),
            LogicalOperator::Sort(op) => op.order_by.iter().map(|s| &s.expr).collect(),
            LogicalOperator::ComparisonJoin(op) => op
                .conditions
                .iter()
                .flat_map(|c| [&c.left, &c.right])
                .collect(),
        }
    }

    /// Returns mutable references to the expressions owned by this operator.
    pub fn expressions_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            LogicalOperator::Scan(_)
            | LogicalOperator::EmptyRelation(_)
            | LogicalOperator::Limit(_) => vec![],
            LogicalOperator::Projection(op) => op.exprs.iter_mut().collect(),
            LogicalOperator::Filter(op) => vec![&mut op.predicate],
            LogicalOperator::Aggregate(op) => {
                op.groups.iter_mut().chain(op.aggregates.iter_mut()).collect()
            }
            LogicalOperator::Sort(op) => op.order_by.iter_mut().map(|s| &mut s.expr).collect(),
            LogicalOperator::ComparisonJoin(op) => op
                .conditions
                .iter_mut()
                .flat_map(|c| [&mut c.left, &mut c.right])
                .collect(),
        }
    }

    /// Returns the table index this operator introduces, if any.
    pub fn table_index(&self) -> Option<TableIndex> {
        match self {
            LogicalOperator::Scan(op) => Some(op.table_index),
            LogicalOperator::Projection(op) => Some(op.table_index),
            LogicalOperator::Aggregate(op) => Some(op.table_index),
            LogicalOperator::EmptyRelation(op) => Some(op.table_index),
            _ => None,
        }
    }

    /// Returns true if this is a leaf operator.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            LogicalOperator::Scan(_) | LogicalOperator::EmptyRelation(_)
        )
    }

    /// Returns the name of this operator type.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOperator::Scan(_) => "Scan",
            LogicalOperator::Projection(_) => "Projection",
            LogicalOperator::Filter(_) => "Filter",
            LogicalOperator::ComparisonJoin(_) => "ComparisonJoin",
            LogicalOperator::Aggregate(_) => "Aggregate",
            LogicalOperator::Sort(_) => "Sort",
            LogicalOperator::Limit(_) => "Limit",
            LogicalOperator::EmptyRelation(_) => "EmptyRelation",
        }
    }
}

/// Selects `items` through an optional projection map.
///
/// Out-of-range positions are dropped; `LogicalPlan::validate_bindings`
/// reports them.
pub fn apply_projection_map<T: Clone>(items: Vec<T>, map: &Option<Vec<usize>>) -> Vec<T> {
    match map {
        None => items,
        Some(positions) => positions
            .iter()
            .filter_map(|&p| items.get(p).cloned())
            .collect(),
    }
}

/// Table scan operator.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOperator {
    /// Index naming the scan's output columns.
    pub table_index: TableIndex,
    /// Table name.
    pub table_name: String,
    /// Table schema; every column is produced.
    pub schema: Schema,
}

impl ScanOperator {
    /// Creates a new scan operator.
    pub fn new(table_index: TableIndex, table_name: impl Into<String>, schema: Schema) -> Self {
        Self {
            table_index,
            table_name: table_name.into(),
            schema,
        }
    }
}

/// Projection operator.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionOperator {
    /// Index naming the projection's output columns.
    pub table_index: TableIndex,
    /// Input operator.
    pub input: Box<LogicalOperator>,
    /// Projected expressions, one per output column.
    pub exprs: Vec<Expr>,
}

impl ProjectionOperator {
    /// Creates a new projection operator.
    pub fn new(table_index: TableIndex, input: LogicalOperator, exprs: Vec<Expr>) -> Self {
        Self {
            table_index,
            input: Box::new(input),
            exprs,
        }
    }
}

/// Filter operator.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOperator {
    /// Input operator.
    pub input: Box<LogicalOperator>,
    /// Filter predicate.
    pub predicate: Expr,
}

impl FilterOperator {
    /// Extracts conjuncts (ANDed conditions) from the predicate.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        extract_conjuncts(&self.predicate)
    }
}

/// Extracts all conjuncts from an expression.
pub fn extract_conjuncts(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOp::And,
            right,
        } => {
            let mut result = extract_conjuncts(left);
            result.extend(extract_conjuncts(right));
            result
        }
        _ => vec![expr],
    }
}

/// Combines expressions with AND.
pub fn conjoin(exprs: Vec<Expr>) -> Option<Expr> {
    exprs.into_iter().reduce(|a, b| a.and(b))
}

/// Join operator driven by a list of comparisons between the two sides.
///
/// The left child is the probe side and the right child the build side.
/// Projection maps select and reorder each child's physical outputs into the
/// join's logical outputs; `None` passes every column through.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonJoinOperator {
    /// Probe side.
    pub left: Box<LogicalOperator>,
    /// Build side.
    pub right: Box<LogicalOperator>,
    /// Join type.
    pub join_type: JoinType,
    /// Conditions, all of which must hold for a match.
    pub conditions: Vec<JoinCondition>,
    /// Logical-to-physical column positions of the probe side.
    pub left_projection_map: Option<Vec<usize>>,
    /// Logical-to-physical column positions of the build side.
    pub right_projection_map: Option<Vec<usize>>,
}

impl ComparisonJoinOperator {
    /// Creates a join without projection maps.
    pub fn new(
        left: LogicalOperator,
        right: LogicalOperator,
        join_type: JoinType,
        conditions: Vec<JoinCondition>,
    ) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
            join_type,
            conditions,
            left_projection_map: None,
            right_projection_map: None,
        }
    }

    /// Returns the probe side's logical output bindings.
    pub fn left_bindings(&self) -> Vec<ColumnBinding> {
        apply_projection_map(self.left.column_bindings(), &self.left_projection_map)
    }

    /// Returns the build side's logical output bindings.
    pub fn right_bindings(&self) -> Vec<ColumnBinding> {
        apply_projection_map(self.right.column_bindings(), &self.right_projection_map)
    }

    /// Returns true if every condition is an equality.
    pub fn is_equi_join(&self) -> bool {
        !self.conditions.is_empty()
            && self
                .conditions
                .iter()
                .all(|c| c.comparison == ComparisonOp::Equal)
    }
}

/// Aggregate operator.
///
/// Outputs the group expressions followed by the aggregates, all under one
/// table index.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOperator {
    /// Index naming the aggregate's output columns.
    pub table_index: TableIndex,
    /// Input operator.
    pub input: Box<LogicalOperator>,
    /// Group-by expressions.
    pub groups: Vec<Expr>,
    /// Aggregate expressions.
    pub aggregates: Vec<Expr>,
}

/// Sort operator.
#[derive(Debug, Clone, PartialEq)]
pub struct SortOperator {
    /// Input operator.
    pub input: Box<LogicalOperator>,
    /// Sort expressions.
    pub order_by: Vec<SortExpr>,
}

/// Limit operator.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitOperator {
    /// Input operator.
    pub input: Box<LogicalOperator>,
    /// Number of rows to skip.
    pub offset: usize,
    /// Maximum number of rows to return.
    pub fetch: Option<usize>,
}

/// Empty relation operator.
#[derive(Debug, Clone, PartialEq)]
pub struct EmptyRelationOperator {
    /// Index naming the (typed, always empty) output columns.
    pub table_index: TableIndex,
    /// Output column types.
    pub types: Vec<DataType>,
}

impl Default for EmptyRelationOperator {
    fn default() -> Self {
        Self {
            table_index: TableIndex::INVALID,
            types: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::schema::Field;

    fn scan(index: u64, columns: usize) -> LogicalOperator {
        let fields = (0..columns)
            .map(|i| Field::nullable(format!("c{}", i), DataType::Int))
            .collect();
        LogicalOperator::Scan(ScanOperator::new(
            TableIndex::new(index),
            format!("t{}", index),
            Schema::new(fields),
        ))
    }

    fn col(table: u64, column: usize) -> Expr {
        Expr::column(
            ColumnBinding::new(TableIndex::new(table), column),
            DataType::Int,
            format!("c{}", column),
        )
    }

    #[test]
    fn test_join_type_properties() {
        assert!(JoinType::Left.preserves_left());
        assert!(!JoinType::Left.preserves_right());
        assert!(JoinType::Full.is_outer());
        assert!(!JoinType::Inner.is_outer());
    }

    #[test]
    fn test_comparison_flip() {
        assert_eq!(ComparisonOp::LessThan.flip(), ComparisonOp::GreaterThan);
        assert_eq!(ComparisonOp::Equal.flip(), ComparisonOp::Equal);
        assert_eq!(
            ComparisonOp::from_binary_op(BinaryOp::GtEq),
            Some(ComparisonOp::GreaterThanOrEqual)
        );
        assert_eq!(ComparisonOp::from_binary_op(BinaryOp::Plus), None);
    }

    #[test]
    fn test_scan_bindings() {
        let op = scan(3, 2);
        assert_eq!(
            op.column_bindings(),
            vec![
                ColumnBinding::new(TableIndex::new(3), 0),
                ColumnBinding::new(TableIndex::new(3), 1),
            ]
        );
        assert_eq!(op.table_index(), Some(TableIndex::new(3)));
        assert!(op.is_leaf());
    }

    #[test]
    fn test_join_bindings_with_projection_maps() {
        let mut join = ComparisonJoinOperator::new(
            scan(0, 2),
            scan(1, 3),
            JoinType::Left,
            vec![JoinCondition::equal(col(0, 0), col(1, 0))],
        );
        join.left_projection_map = Some(vec![1]);
        join.right_projection_map = Some(vec![2, 0]);
        let op = LogicalOperator::ComparisonJoin(join);

        assert_eq!(
            op.column_bindings(),
            vec![
                ColumnBinding::new(TableIndex::new(0), 1),
                ColumnBinding::new(TableIndex::new(1), 2),
                ColumnBinding::new(TableIndex::new(1), 0),
            ]
        );
        assert_eq!(op.types().len(), 3);
        assert_eq!(op.column_names(), vec!["c1", "c2", "c0"]);
        assert_eq!(op.expressions().len(), 2);
    }

    #[test]
    fn test_pass_through_operators() {
        let filter = LogicalOperator::Filter(FilterOperator {
            input: Box::new(scan(0, 2)),
            predicate: col(0, 0).gt(Expr::lit_i64(1)),
        });
        assert_eq!(filter.column_bindings(), scan(0, 2).column_bindings());
        assert_eq!(filter.table_index(), None);
        assert_eq!(filter.children().len(), 1);
    }

    #[test]
    fn test_default_is_invalid_empty_relation() {
        let op = LogicalOperator::default();
        assert_eq!(op.table_index(), Some(TableIndex::INVALID));
        assert!(op.column_bindings().is_empty());
    }

    #[test]
    fn test_extract_conjuncts() {
        let expr = col(0, 0)
            .eq(Expr::lit_i64(1))
            .and(col(0, 1).gt(Expr::lit_i64(2)))
            .and(col(0, 2).is_not_null());

        let conjuncts = extract_conjuncts(&expr);
        assert_eq!(conjuncts.len(), 3);
    }

    #[test]
    fn test_conjoin() {
        let exprs = vec![col(0, 0).eq(Expr::lit_i64(1)), col(0, 1).eq(Expr::lit_i64(2))];
        let combined = conjoin(exprs);
        assert!(matches!(
            combined,
            Some(Expr::BinaryOp {
                op: BinaryOp::And,
                ..
            })
        ));
        assert!(conjoin(Vec::new()).is_none());
    }
}
