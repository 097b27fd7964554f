//! Logical plan builder.
//!
//! Builds bound plans directly: columns are resolved by name against the
//! current operator's outputs and every binding-introducing operator gets a
//! fresh index from a shared [`TableIndexAllocator`].

use std::collections::HashSet;

use sparse_common::types::{ColumnBinding, TableIndexAllocator};
use sparse_common::SparseError;
use thiserror::Error;

use super::expr::{Expr, SortExpr};
use super::operator::*;
use super::plan::LogicalPlan;
use super::schema::Schema;
use crate::types::DataType;

/// Errors that can occur during plan building.
#[derive(Debug, Error)]
pub enum PlanError {
    /// No input column has this name.
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// More than one input column has this name.
    #[error("Ambiguous column: {0}")]
    AmbiguousColumn(String),

    /// An expression has the wrong type for its position.
    #[error("Type error: {0}")]
    TypeError(String),

    /// The requested plan shape is not valid.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type for plan building.
pub type PlanResult<T> = Result<T, PlanError>;

impl From<PlanError> for SparseError {
    fn from(err: PlanError) -> Self {
        SparseError::planning(err.to_string())
    }
}

/// Fluent builder for bound logical plans.
#[derive(Debug)]
pub struct PlanBuilder<'a> {
    alloc: &'a TableIndexAllocator,
    root: LogicalOperator,
}

impl<'a> PlanBuilder<'a> {
    /// Starts a plan with a scan of `table_name`.
    pub fn scan(
        alloc: &'a TableIndexAllocator,
        table_name: impl Into<String>,
        schema: Schema,
    ) -> Self {
        let root = LogicalOperator::Scan(ScanOperator::new(alloc.allocate(), table_name, schema));
        Self { alloc, root }
    }

    /// Starts a plan producing no rows with the given column types.
    pub fn empty(alloc: &'a TableIndexAllocator, types: Vec<DataType>) -> Self {
        let root = LogicalOperator::EmptyRelation(EmptyRelationOperator {
            table_index: alloc.allocate(),
            types,
        });
        Self { alloc, root }
    }

    /// Continues building on top of an existing operator.
    pub fn from_operator(alloc: &'a TableIndexAllocator, root: LogicalOperator) -> Self {
        Self { alloc, root }
    }

    /// Returns the operator built so far.
    pub fn operator(&self) -> &LogicalOperator {
        &self.root
    }

    /// Resolves an output column of the current operator by name.
    pub fn col(&self, name: &str) -> PlanResult<Expr> {
        let names = self.root.column_names();
        let mut matches = names.iter().enumerate().filter(|(_, n)| *n == name);
        let position = match (matches.next(), matches.next()) {
            (Some((position, _)), None) => position,
            (Some(_), Some(_)) => return Err(PlanError::AmbiguousColumn(name.to_string())),
            (None, _) => return Err(PlanError::ColumnNotFound(name.to_string())),
        };
        self.col_at(position)
    }

    /// Resolves an output column of the current operator by position.
    pub fn col_at(&self, position: usize) -> PlanResult<Expr> {
        let bindings = self.root.column_bindings();
        let binding = bindings
            .get(position)
            .copied()
            .ok_or_else(|| PlanError::ColumnNotFound(format!("#{}", position)))?;
        let data_type = self.root.types().swap_remove(position);
        let name = self.root.column_names().swap_remove(position);
        Ok(Expr::column(binding, data_type, name))
    }

    /// Adds a filter.
    pub fn filter(self, predicate: Expr) -> PlanResult<Self> {
        if predicate.data_type() != DataType::Boolean {
            return Err(PlanError::TypeError(format!(
                "filter predicate must be BOOLEAN, got {}",
                predicate.data_type()
            )));
        }
        check_references(&predicate, &self.root.column_bindings())?;
        Ok(self.wrap(|input| {
            LogicalOperator::Filter(FilterOperator { input, predicate })
        }))
    }

    /// Adds a projection of arbitrary expressions.
    pub fn project(self, exprs: Vec<Expr>) -> PlanResult<Self> {
        if exprs.is_empty() {
            return Err(PlanError::InvalidQuery("empty projection".to_string()));
        }
        let available = self.root.column_bindings();
        for expr in &exprs {
            if expr.contains_aggregate() {
                return Err(PlanError::InvalidQuery(format!(
                    "aggregate in projection: {}",
                    expr
                )));
            }
            check_references(expr, &available)?;
        }
        let table_index = self.alloc.allocate();
        Ok(self.wrap(|input| {
            LogicalOperator::Projection(ProjectionOperator {
                table_index,
                input,
                exprs,
            })
        }))
    }

    /// Adds a projection of named columns.
    pub fn project_columns(self, names: &[&str]) -> PlanResult<Self> {
        let exprs = names
            .iter()
            .map(|name| self.col(name))
            .collect::<PlanResult<Vec<_>>>()?;
        self.project(exprs)
    }

    /// Joins with `right` on equality of the named column pairs.
    ///
    /// The first name of each pair is resolved on this side, the second on
    /// `right`.
    pub fn join(
        self,
        right: PlanBuilder<'a>,
        join_type: JoinType,
        on: &[(&str, &str)],
    ) -> PlanResult<Self> {
        let conditions = on
            .iter()
            .map(|(l, r)| Ok(JoinCondition::equal(self.col(l)?, right.col(r)?)))
            .collect::<PlanResult<Vec<_>>>()?;
        self.join_on(right, join_type, conditions)
    }

    /// Joins with `right` on arbitrary conditions.
    ///
    /// Conditions written build side first are swapped so that `left`
    /// always references this side and `right` the other.
    pub fn join_on(
        self,
        right: PlanBuilder<'a>,
        join_type: JoinType,
        conditions: Vec<JoinCondition>,
    ) -> PlanResult<Self> {
        if conditions.is_empty() {
            return Err(PlanError::InvalidQuery(
                "comparison join requires at least one condition".to_string(),
            ));
        }

        let left_bindings: HashSet<_> = self.root.column_bindings().into_iter().collect();
        let right_bindings: HashSet<_> = right.root.column_bindings().into_iter().collect();
        let within = |expr: &Expr, side: &HashSet<ColumnBinding>| {
            expr.column_bindings().iter().all(|b| side.contains(b))
        };

        let conditions = conditions
            .into_iter()
            .map(|cond| {
                if within(&cond.left, &left_bindings) && within(&cond.right, &right_bindings) {
                    Ok(cond)
                } else if within(&cond.right, &left_bindings)
                    && within(&cond.left, &right_bindings)
                {
                    Ok(JoinCondition::new(
                        cond.right,
                        cond.left,
                        cond.comparison.flip(),
                    ))
                } else {
                    Err(PlanError::InvalidQuery(format!(
                        "join condition does not separate the inputs: {}",
                        cond
                    )))
                }
            })
            .collect::<PlanResult<Vec<_>>>()?;

        let right_root = right.root;
        Ok(self.wrap(|left| {
            LogicalOperator::ComparisonJoin(ComparisonJoinOperator {
                left,
                right: Box::new(right_root),
                join_type,
                conditions,
                left_projection_map: None,
                right_projection_map: None,
            })
        }))
    }

    /// Sets the projection maps of the join at the top of the plan.
    pub fn with_projection_maps(
        mut self,
        left: Option<Vec<usize>>,
        right: Option<Vec<usize>>,
    ) -> PlanResult<Self> {
        let LogicalOperator::ComparisonJoin(join) = &mut self.root else {
            return Err(PlanError::InvalidQuery(
                "projection maps require a join".to_string(),
            ));
        };
        for (map, width) in [
            (&left, join.left.column_bindings().len()),
            (&right, join.right.column_bindings().len()),
        ] {
            if let Some(p) = map.iter().flatten().find(|&&p| p >= width) {
                return Err(PlanError::InvalidQuery(format!(
                    "projection map position {} out of range for {} columns",
                    p, width
                )));
            }
        }
        join.left_projection_map = left;
        join.right_projection_map = right;
        Ok(self)
    }

    /// Adds an aggregate.
    pub fn aggregate(self, groups: Vec<Expr>, aggregates: Vec<Expr>) -> PlanResult<Self> {
        let available = self.root.column_bindings();
        for expr in groups.iter().chain(&aggregates) {
            check_references(expr, &available)?;
        }
        if let Some(expr) = aggregates.iter().find(|e| !e.contains_aggregate()) {
            return Err(PlanError::InvalidQuery(format!("not an aggregate: {}", expr)));
        }
        let table_index = self.alloc.allocate();
        Ok(self.wrap(|input| {
            LogicalOperator::Aggregate(AggregateOperator {
                table_index,
                input,
                groups,
                aggregates,
            })
        }))
    }

    /// Adds a sort.
    pub fn sort(self, order_by: Vec<SortExpr>) -> PlanResult<Self> {
        let available = self.root.column_bindings();
        for sort in &order_by {
            check_references(&sort.expr, &available)?;
        }
        Ok(self.wrap(|input| LogicalOperator::Sort(SortOperator { input, order_by })))
    }

    /// Adds a limit.
    pub fn limit(self, offset: usize, fetch: Option<usize>) -> Self {
        self.wrap(|input| {
            LogicalOperator::Limit(LimitOperator {
                input,
                offset,
                fetch,
            })
        })
    }

    /// Finishes the plan.
    pub fn build(self) -> LogicalPlan {
        LogicalPlan::new(self.root)
    }

    /// Finishes and returns the root operator, for use as a join input.
    pub fn into_operator(self) -> LogicalOperator {
        self.root
    }

    fn wrap<F>(self, f: F) -> Self
    where
        F: FnOnce(Box<LogicalOperator>) -> LogicalOperator,
    {
        Self {
            alloc: self.alloc,
            root: f(Box::new(self.root)),
        }
    }
}

fn check_references(expr: &Expr, available: &[ColumnBinding]) -> PlanResult<()> {
    match expr
        .column_bindings()
        .into_iter()
        .find(|b| !available.contains(b))
    {
        Some(binding) => Err(PlanError::ColumnNotFound(binding.to_string())),
        None => Ok(()),
    }
}
