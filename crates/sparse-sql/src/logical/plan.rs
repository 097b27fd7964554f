//! Logical plan wrapper and utilities.

use std::collections::{HashMap, HashSet};
use std::fmt;

use sparse_common::types::{ColumnBinding, TableIndex};
use sparse_common::{SparseError, SparseResult};

use super::expr::Expr;
use super::operator::LogicalOperator;
use crate::types::DataType;

/// A bound logical query plan.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalPlan {
    /// Root operator.
    pub root: Box<LogicalOperator>,
}

impl LogicalPlan {
    /// Creates a new logical plan.
    pub fn new(root: LogicalOperator) -> Self {
        Self {
            root: Box::new(root),
        }
    }

    /// Consumes the plan and returns its root operator.
    pub fn into_root(self) -> LogicalOperator {
        *self.root
    }

    /// Returns the output bindings of the plan.
    pub fn column_bindings(&self) -> Vec<ColumnBinding> {
        self.root.column_bindings()
    }

    /// Returns the output types of the plan.
    pub fn types(&self) -> Vec<DataType> {
        self.root.types()
    }

    /// Returns the output column names of the plan.
    pub fn column_names(&self) -> Vec<String> {
        self.root.column_names()
    }

    /// Returns the highest valid table index used by any operator.
    pub fn max_table_index(&self) -> Option<TableIndex> {
        let mut collector = TableIndexCollector::default();
        visit_plan(&self.root, &mut collector);
        collector.indices.into_iter().max()
    }

    /// Returns the operator reached by following child positions from the
    /// root. An empty path addresses the root.
    pub fn node_at(&self, path: &[usize]) -> Option<&LogicalOperator> {
        let mut node = self.root.as_ref();
        for &i in path {
            node = node.children().into_iter().nth(i)?;
        }
        Some(node)
    }

    /// Mutable version of [`Self::node_at`].
    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut LogicalOperator> {
        let mut node = self.root.as_mut();
        for &i in path {
            node = node.children_mut().into_iter().nth(i)?;
        }
        Some(node)
    }

    /// Returns the path of every operator, children before parents and
    /// left before right.
    ///
    /// Replacing the subtree at one path leaves the paths of all nodes
    /// after it in this order unchanged.
    pub fn post_order_paths(&self) -> Vec<Vec<usize>> {
        fn collect(op: &LogicalOperator, path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
            for (i, child) in op.children().into_iter().enumerate() {
                path.push(i);
                collect(child, path, out);
                path.pop();
            }
            out.push(path.clone());
        }

        let mut out = Vec::new();
        collect(&self.root, &mut Vec::new(), &mut out);
        out
    }

    /// Refreshes the type of every column reference from the operator that
    /// produces it.
    ///
    /// Fails with `UnresolvedBinding` if a reference names a column that no
    /// child produces.
    pub fn resolve_types(&mut self) -> SparseResult<()> {
        resolve_operator_types(&mut self.root)
    }

    /// Checks that the plan is internally consistent.
    ///
    /// Every column reference must name an output of one of its operator's
    /// children, join conditions must reference the side they belong to,
    /// projection map positions must be in range and no two operators may
    /// introduce the same table index.
    pub fn validate_bindings(&self) -> SparseResult<()> {
        let mut validator = BindingValidator::default();
        visit_plan(&self.root, &mut validator);
        match validator.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Returns a formatted string representation of the plan.
    pub fn display(&self) -> String {
        let mut output = String::new();
        self.format_node(&self.root, 0, &mut output);
        output
    }

    /// Returns a detailed formatted string for EXPLAIN, including the
    /// bindings and types every operator produces.
    pub fn explain(&self) -> String {
        let mut output = String::new();
        self.explain_node(&self.root, 0, &mut output);
        output
    }

    fn format_node(&self, op: &LogicalOperator, indent: usize, output: &mut String) {
        let prefix = "  ".repeat(indent);

        match op {
            LogicalOperator::Scan(scan) => {
                output.push_str(&format!(
                    "{}Scan: {} [{}]\n",
                    prefix, scan.table_name, scan.table_index
                ));
            }
            LogicalOperator::Projection(proj) => {
                output.push_str(&format!(
                    "{}Projection [{}]: {}\n",
                    prefix,
                    proj.table_index,
                    join_exprs(&proj.exprs)
                ));
            }
            LogicalOperator::Filter(filter) => {
                output.push_str(&format!("{}Filter: {}\n", prefix, filter.predicate));
            }
            LogicalOperator::ComparisonJoin(join) => {
                let conditions: Vec<_> = join.conditions.iter().map(|c| c.to_string()).collect();
                output.push_str(&format!(
                    "{}ComparisonJoin: {} ON {}",
                    prefix,
                    join.join_type,
                    conditions.join(" AND ")
                ));
                if let Some(map) = &join.left_projection_map {
                    output.push_str(&format!(" left_map={:?}", map));
                }
                if let Some(map) = &join.right_projection_map {
                    output.push_str(&format!(" right_map={:?}", map));
                }
                output.push('\n');
            }
            LogicalOperator::Aggregate(agg) => {
                output.push_str(&format!(
                    "{}Aggregate [{}]: groups=[{}] aggs=[{}]\n",
                    prefix,
                    agg.table_index,
                    join_exprs(&agg.groups),
                    join_exprs(&agg.aggregates)
                ));
            }
            LogicalOperator::Sort(sort) => {
                let exprs: Vec<_> = sort.order_by.iter().map(|e| e.to_string()).collect();
                output.push_str(&format!("{}Sort: {}\n", prefix, exprs.join(", ")));
            }
            LogicalOperator::Limit(limit) => {
                output.push_str(&format!(
                    "{}Limit: offset={} fetch={:?}\n",
                    prefix, limit.offset, limit.fetch
                ));
            }
            LogicalOperator::EmptyRelation(empty) => {
                output.push_str(&format!(
                    "{}EmptyRelation [{}]: {} columns\n",
                    prefix,
                    empty.table_index,
                    empty.types.len()
                ));
            }
        }

        for child in op.children() {
            self.format_node(child, indent + 1, output);
        }
    }

    fn explain_node(&self, op: &LogicalOperator, indent: usize, output: &mut String) {
        let prefix = "  ".repeat(indent);

        output.push_str(&format!("{}{}", prefix, op.name()));
        if let Some(index) = op.table_index() {
            output.push_str(&format!(" [{}]", index));
        }
        output.push('\n');

        let columns: Vec<_> = op
            .column_bindings()
            .into_iter()
            .zip(op.types())
            .zip(op.column_names())
            .map(|((binding, ty), name)| format!("{}{}: {}", name, binding, ty))
            .collect();
        output.push_str(&format!("{}  Output: {}\n", prefix, columns.join(", ")));

        match op {
            LogicalOperator::ComparisonJoin(join) => {
                output.push_str(&format!("{}  Type: {}\n", prefix, join.join_type));
                output.push_str(&format!("{}  Conditions:\n", prefix));
                for cond in &join.conditions {
                    output.push_str(&format!("{}    - {}\n", prefix, cond));
                }
                if let Some(map) = &join.left_projection_map {
                    output.push_str(&format!("{}  Left map: {:?}\n", prefix, map));
                }
                if let Some(map) = &join.right_projection_map {
                    output.push_str(&format!("{}  Right map: {:?}\n", prefix, map));
                }
            }
            LogicalOperator::Scan(scan) => {
                output.push_str(&format!("{}  Table: {}\n", prefix, scan.table_name));
            }
            LogicalOperator::Limit(limit) => {
                output.push_str(&format!(
                    "{}  Offset: {} Fetch: {:?}\n",
                    prefix, limit.offset, limit.fetch
                ));
            }
            _ => {
                let exprs = op.expressions();
                if !exprs.is_empty() {
                    output.push_str(&format!("{}  Expressions:\n", prefix));
                    for expr in exprs {
                        output.push_str(&format!("{}    - {}\n", prefix, expr));
                    }
                }
            }
        }

        for child in op.children() {
            self.explain_node(child, indent + 1, output);
        }
    }
}

fn join_exprs(exprs: &[Expr]) -> String {
    exprs
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl From<LogicalOperator> for LogicalPlan {
    fn from(root: LogicalOperator) -> Self {
        Self::new(root)
    }
}

/// Visitor trait for traversing logical plans.
pub trait PlanVisitor {
    /// Called before visiting children. Return false to skip them.
    fn pre_visit(&mut self, op: &LogicalOperator) -> bool;
    /// Called after visiting children.
    fn post_visit(&mut self, op: &LogicalOperator);
}

/// Visit a logical plan tree.
pub fn visit_plan<V: PlanVisitor>(op: &LogicalOperator, visitor: &mut V) {
    if visitor.pre_visit(op) {
        for child in op.children() {
            visit_plan(child, visitor);
        }
    }
    visitor.post_visit(op);
}

#[derive(Default)]
struct TableIndexCollector {
    indices: Vec<TableIndex>,
}

impl PlanVisitor for TableIndexCollector {
    fn pre_visit(&mut self, op: &LogicalOperator) -> bool {
        if let Some(index) = op.table_index().filter(|i| i.is_valid()) {
            self.indices.push(index);
        }
        true
    }

    fn post_visit(&mut self, _op: &LogicalOperator) {}
}

/// Collects the first consistency error found in a plan.
#[derive(Default)]
struct BindingValidator {
    seen_indices: HashSet<TableIndex>,
    error: Option<SparseError>,
}

impl BindingValidator {
    fn check(&mut self, op: &LogicalOperator) -> SparseResult<()> {
        if let Some(index) = op.table_index() {
            if !index.is_valid() {
                return Err(SparseError::internal(format!(
                    "{} has an invalid table index",
                    op.name()
                )));
            }
            if !self.seen_indices.insert(index) {
                return Err(SparseError::internal(format!(
                    "table index {} is introduced more than once",
                    index
                )));
            }
        }

        if let LogicalOperator::ComparisonJoin(join) = op {
            check_projection_map(&join.left_projection_map, join.left.column_bindings().len())?;
            check_projection_map(&join.right_projection_map, join.right.column_bindings().len())?;

            let left: HashSet<_> = join.left.column_bindings().into_iter().collect();
            let right: HashSet<_> = join.right.column_bindings().into_iter().collect();
            for cond in &join.conditions {
                check_references(&cond.left, &left)?;
                check_references(&cond.right, &right)?;
            }
            return Ok(());
        }

        let available: HashSet<_> = op
            .children()
            .into_iter()
            .flat_map(LogicalOperator::column_bindings)
            .collect();
        for expr in op.expressions() {
            check_references(expr, &available)?;
        }
        Ok(())
    }
}

impl PlanVisitor for BindingValidator {
    fn pre_visit(&mut self, op: &LogicalOperator) -> bool {
        if self.error.is_some() {
            return false;
        }
        if let Err(err) = self.check(op) {
            self.error = Some(err);
            return false;
        }
        true
    }

    fn post_visit(&mut self, _op: &LogicalOperator) {}
}

fn check_projection_map(map: &Option<Vec<usize>>, width: usize) -> SparseResult<()> {
    if let Some(position) = map.iter().flatten().find(|&&p| p >= width) {
        return Err(SparseError::internal(format!(
            "projection map position {} out of range for {} columns",
            position, width
        )));
    }
    Ok(())
}

fn check_references(expr: &Expr, available: &HashSet<ColumnBinding>) -> SparseResult<()> {
    match expr
        .column_bindings()
        .into_iter()
        .find(|b| !available.contains(b))
    {
        Some(binding) => Err(SparseError::UnresolvedBinding { binding }),
        None => Ok(()),
    }
}

fn resolve_operator_types(op: &mut LogicalOperator) -> SparseResult<()> {
    for child in op.children_mut() {
        resolve_operator_types(child)?;
    }

    let produced: HashMap<ColumnBinding, DataType> = op
        .children()
        .into_iter()
        .flat_map(|child| child.column_bindings().into_iter().zip(child.types()))
        .collect();

    let mut unresolved = None;
    for expr in op.expressions_mut() {
        expr.visit_mut(&mut |e| {
            if let Expr::ColumnRef(c) = e {
                match produced.get(&c.binding) {
                    Some(ty) => c.data_type = ty.clone(),
                    None => {
                        unresolved.get_or_insert(c.binding);
                    }
                }
            }
        });
    }

    match unresolved {
        Some(binding) => Err(SparseError::UnresolvedBinding { binding }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::operator::{
        ComparisonJoinOperator, FilterOperator, JoinCondition, JoinType, ProjectionOperator,
        ScanOperator,
    };
    use crate::logical::schema::{Field, Schema};

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

    fn col(table: u64, column: usize, ty: DataType) -> Expr {
        Expr::column(
            ColumnBinding::new(TableIndex::new(table), column),
            ty,
            format!("c{}", column),
        )
    }

    fn join_plan() -> LogicalPlan {
        let join = LogicalOperator::ComparisonJoin(ComparisonJoinOperator::new(
            scan(0, 2),
            scan(1, 3),
            JoinType::Left,
            vec![JoinCondition::equal(
                col(0, 0, DataType::Int),
                col(1, 0, DataType::Int),
            )],
        ));
        LogicalPlan::new(LogicalOperator::Projection(ProjectionOperator::new(
            TableIndex::new(2),
            join,
            vec![col(0, 1, DataType::Int), col(1, 2, DataType::Int)],
        )))
    }

    #[test]
    fn test_max_table_index() {
        assert_eq!(join_plan().max_table_index(), Some(TableIndex::new(2)));
        let empty = LogicalPlan::new(LogicalOperator::default());
        assert_eq!(empty.max_table_index(), None);
    }

    #[test]
    fn test_node_paths() {
        let plan = join_plan();
        assert_eq!(plan.node_at(&[]).map(|n| n.name()), Some("Projection"));
        assert_eq!(plan.node_at(&[0]).map(|n| n.name()), Some("ComparisonJoin"));
        assert_eq!(
            plan.node_at(&[0, 1]).and_then(|n| n.table_index()),
            Some(TableIndex::new(1))
        );
        assert!(plan.node_at(&[0, 2]).is_none());

        assert_eq!(
            plan.post_order_paths(),
            vec![vec![0, 0], vec![0, 1], vec![0], vec![]]
        );
    }

    #[test]
    fn test_validate_bindings() {
        let plan = join_plan();
        assert!(plan.validate_bindings().is_ok());

        let mut broken = plan.clone();
        if let Some(LogicalOperator::Projection(proj)) = broken.node_at_mut(&[]) {
            proj.exprs.push(col(7, 0, DataType::Int));
        }
        let err = broken.validate_bindings().unwrap_err();
        assert!(matches!(err, SparseError::UnresolvedBinding { .. }));
    }

    #[test]
    fn test_validate_rejects_condition_on_wrong_side() {
        let mut plan = join_plan();
        if let Some(LogicalOperator::ComparisonJoin(join)) = plan.node_at_mut(&[0]) {
            let cond = &mut join.conditions[0];
            std::mem::swap(&mut cond.left, &mut cond.right);
        }
        assert!(plan.validate_bindings().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_projection_map() {
        let mut plan = join_plan();
        if let Some(LogicalOperator::ComparisonJoin(join)) = plan.node_at_mut(&[0]) {
            join.right_projection_map = Some(vec![5]);
        }
        assert!(plan.validate_bindings().is_err());
    }

    #[test]
    fn test_resolve_types_refreshes_references() {
        let mut plan = LogicalPlan::new(LogicalOperator::Filter(FilterOperator {
            input: Box::new(scan(0, 1)),
            predicate: col(0, 0, DataType::Text).is_null(),
        }));
        plan.resolve_types().unwrap();
        let LogicalOperator::Filter(filter) = plan.root.as_ref() else {
            panic!("expected filter");
        };
        assert_eq!(filter.predicate.column_bindings().len(), 1);
        let mut types = Vec::new();
        filter.predicate.visit(&mut |e| {
            if let Expr::ColumnRef(c) = e {
                types.push(c.data_type.clone());
            }
        });
        assert_eq!(types, vec![DataType::Int]);
    }

    #[test]
    fn test_display() {
        let text = join_plan().display();
        assert!(text.starts_with("Projection [2]: c1#[0.1], c2#[1.2]\n"));
        assert!(text.contains("  ComparisonJoin: LEFT ON c0#[0.0] = c0#[1.0]\n"));
        assert!(text.contains("    Scan: t1 [1]\n"));

        let explain = join_plan().explain();
        assert!(explain.contains("Output: c1#[2.0]: INT, c2#[2.1]: INT"));
    }
}
