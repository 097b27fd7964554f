//! Operator interpretation over in-memory tables.

use std::collections::{HashMap, HashSet};
use std::fmt;

use sparse_common::SparseError;
use tracing::trace;

use super::evaluator::{evaluate_expr, evaluate_predicate, layout_of, Accumulator, EvalError};
use super::Row;
use crate::logical::{
    apply_projection_map, AggregateFunc, AggregateOperator, ComparisonJoinOperator,
    ComparisonOp, Expr, LogicalOperator, LogicalPlan, Schema, SortOperator,
};
use crate::types::{DataType, Value};

/// An in-memory table.
#[derive(Debug, Clone)]
pub struct MemTable {
    schema: Schema,
    rows: Vec<Row>,
}

impl MemTable {
    /// Creates a table, checking every row against the schema width.
    pub fn new(schema: Schema, rows: Vec<Row>) -> Result<Self, ExecutionError> {
        if let Some(bad) = rows.iter().find(|r| r.len() != schema.len()) {
            return Err(ExecutionError::Internal(format!(
                "row {} has {} values, schema has {} columns",
                bad,
                bad.len(),
                schema.len()
            )));
        }
        Ok(Self { schema, rows })
    }

    /// Returns the table schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

/// Tables visible to the executor, by name.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    tables: HashMap<String, MemTable>,
}

impl ExecutionContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table, replacing any table with the same name.
    pub fn register_table(&mut self, name: impl Into<String>, table: MemTable) {
        self.tables.insert(name.into(), table);
    }

    /// Looks up a table.
    pub fn table(&self, name: &str) -> Option<&MemTable> {
        self.tables.get(name)
    }
}

/// Output of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Output column names.
    pub columns: Vec<String>,
    /// Output column types.
    pub types: Vec<DataType>,
    /// Result rows.
    pub rows: Vec<Row>,
}

/// Executes a plan against the tables in `ctx`.
pub fn execute_plan(plan: &LogicalPlan, ctx: &ExecutionContext) -> Result<QueryResult, ExecutionError> {
    let rows = execute(&plan.root, ctx)?;
    trace!("Executed plan: {} rows", rows.len());
    Ok(QueryResult {
        columns: plan.column_names(),
        types: plan.types(),
        rows,
    })
}

/// Executes one operator. Row positions follow `op.column_bindings()`.
pub fn execute(op: &LogicalOperator, ctx: &ExecutionContext) -> Result<Vec<Row>, ExecutionError> {
    match op {
        LogicalOperator::Scan(scan) => {
            let table = ctx
                .table(&scan.table_name)
                .ok_or_else(|| ExecutionError::TableNotFound(scan.table_name.clone()))?;
            if table.schema.len() != scan.schema.len() {
                return Err(ExecutionError::Internal(format!(
                    "table {} has {} columns, scan expects {}",
                    scan.table_name,
                    table.schema.len(),
                    scan.schema.len()
                )));
            }
            Ok(table.rows.clone())
        }

        LogicalOperator::Projection(proj) => {
            let layout = layout_of(&proj.input.column_bindings());
            execute(&proj.input, ctx)?
                .iter()
                .map(|row| {
                    proj.exprs
                        .iter()
                        .map(|e| evaluate_expr(e, row, &layout))
                        .collect::<Result<Vec<_>, _>>()
                        .map(Row::new)
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(ExecutionError::from)
        }

        LogicalOperator::Filter(filter) => {
            let layout = layout_of(&filter.input.column_bindings());
            let mut out = Vec::new();
            for row in execute(&filter.input, ctx)? {
                if evaluate_predicate(&filter.predicate, &row, &layout)? {
                    out.push(row);
                }
            }
            Ok(out)
        }

        LogicalOperator::ComparisonJoin(join) => execute_join(join, ctx),

        LogicalOperator::Aggregate(agg) => execute_aggregate(agg, ctx),

        LogicalOperator::Sort(sort) => execute_sort(sort, ctx),

        LogicalOperator::Limit(limit) => {
            let rows = execute(&limit.input, ctx)?.into_iter().skip(limit.offset);
            Ok(match limit.fetch {
                Some(fetch) => rows.take(fetch).collect(),
                None => rows.collect(),
            })
        }

        LogicalOperator::EmptyRelation(_) => Ok(Vec::new()),
    }
}

/// Hash join with the build side on the right.
///
/// Equality conditions form the hash key; other comparisons are checked per
/// candidate pair against the concatenated unmapped rows. NULL keys never
/// match.
fn execute_join(
    join: &ComparisonJoinOperator,
    ctx: &ExecutionContext,
) -> Result<Vec<Row>, ExecutionError> {
    let probe_rows = execute(&join.left, ctx)?;
    let build_rows = execute(&join.right, ctx)?;

    let probe_bindings = join.left.column_bindings();
    let build_bindings = join.right.column_bindings();
    let probe_layout = layout_of(&probe_bindings);
    let build_layout = layout_of(&build_bindings);
    let combined_layout = layout_of(
        &probe_bindings
            .iter()
            .chain(&build_bindings)
            .copied()
            .collect::<Vec<_>>(),
    );

    let (equalities, residuals): (Vec<_>, Vec<_>) = join
        .conditions
        .iter()
        .partition(|c| c.comparison == ComparisonOp::Equal);
    let residuals: Vec<Expr> = residuals.iter().map(|c| c.to_expr()).collect();

    let mut table: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
    for (i, row) in build_rows.iter().enumerate() {
        let key = equalities
            .iter()
            .map(|c| evaluate_expr(&c.right, row, &build_layout))
            .collect::<Result<Vec<_>, _>>()?;
        if key.iter().any(Value::is_null) {
            continue;
        }
        table.entry(key).or_default().push(i);
    }

    let probe_width = apply_projection_map(probe_bindings, &join.left_projection_map).len();
    let build_width = apply_projection_map(build_bindings, &join.right_projection_map).len();
    let emit = |probe: Option<&Row>, build: Option<&Row>| {
        let left = probe.map_or_else(
            || Row::nulls(probe_width),
            |r| project_side(r, &join.left_projection_map),
        );
        let right = build.map_or_else(
            || Row::nulls(build_width),
            |r| project_side(r, &join.right_projection_map),
        );
        left.concat(&right)
    };

    let mut build_matched = vec![false; build_rows.len()];
    let mut out = Vec::new();
    for probe in &probe_rows {
        let key = equalities
            .iter()
            .map(|c| evaluate_expr(&c.left, probe, &probe_layout))
            .collect::<Result<Vec<_>, _>>()?;

        let mut matched = false;
        if !key.iter().any(Value::is_null) {
            for &i in table.get(&key).map(Vec::as_slice).unwrap_or_default() {
                let build = &build_rows[i];
                let pair = probe.concat(build);
                let mut accepted = true;
                for residual in &residuals {
                    if !evaluate_predicate(residual, &pair, &combined_layout)? {
                        accepted = false;
                        break;
                    }
                }
                if accepted {
                    matched = true;
                    build_matched[i] = true;
                    out.push(emit(Some(probe), Some(build)));
                }
            }
        }

        if !matched && join.join_type.preserves_left() {
            out.push(emit(Some(probe), None));
        }
    }

    if join.join_type.preserves_right() {
        for (build, _) in build_rows.iter().zip(&build_matched).filter(|(_, m)| !**m) {
            out.push(emit(None, Some(build)));
        }
    }

    Ok(out)
}

fn project_side(row: &Row, map: &Option<Vec<usize>>) -> Row {
    match map {
        Some(positions) => row.project(positions),
        None => row.clone(),
    }
}

fn execute_aggregate(
    agg: &AggregateOperator,
    ctx: &ExecutionContext,
) -> Result<Vec<Row>, ExecutionError> {
    struct Slot {
        func: AggregateFunc,
        args: Vec<Expr>,
        distinct: bool,
        integral: bool,
    }

    let layout = layout_of(&agg.input.column_bindings());
    let slots = agg
        .aggregates
        .iter()
        .map(|e| match e.strip_alias() {
            Expr::Aggregate {
                func,
                args,
                distinct,
                return_type,
            } => Ok(Slot {
                func: *func,
                args: args.clone(),
                distinct: *distinct,
                integral: return_type.is_integer(),
            }),
            other => Err(ExecutionError::Internal(format!(
                "aggregate operator holds non-aggregate expression {}",
                other
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let fresh = || -> Vec<(Accumulator, HashSet<Value>)> {
        slots
            .iter()
            .map(|s| (Accumulator::new(s.func, s.integral), HashSet::new()))
            .collect()
    };

    let mut order: Vec<Vec<Value>> = Vec::new();
    let mut groups: HashMap<Vec<Value>, Vec<(Accumulator, HashSet<Value>)>> = HashMap::new();

    for row in execute(&agg.input, ctx)? {
        let key = agg
            .groups
            .iter()
            .map(|g| evaluate_expr(g, &row, &layout))
            .collect::<Result<Vec<_>, _>>()?;
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        let states = groups.entry(key).or_insert_with(fresh);

        for (slot, (acc, seen)) in slots.iter().zip(states.iter_mut()) {
            // COUNT(*) has no argument and counts the row itself.
            let value = match slot.args.first() {
                Some(arg) => evaluate_expr(arg, &row, &layout)?,
                None => Value::Boolean(true),
            };
            if slot.distinct && !value.is_null() && !seen.insert(value.clone()) {
                continue;
            }
            acc.accumulate(&value)?;
        }
    }

    if order.is_empty() && agg.groups.is_empty() {
        let states = fresh();
        return Ok(vec![Row::new(
            states.iter().map(|(acc, _)| acc.result()).collect(),
        )]);
    }

    Ok(order
        .into_iter()
        .filter_map(|key| {
            let states = groups.remove(&key)?;
            let mut values = key;
            values.extend(states.iter().map(|(acc, _)| acc.result()));
            Some(Row::new(values))
        })
        .collect())
}

fn execute_sort(sort: &SortOperator, ctx: &ExecutionContext) -> Result<Vec<Row>, ExecutionError> {
    let layout = layout_of(&sort.input.column_bindings());
    let mut keyed = execute(&sort.input, ctx)?
        .into_iter()
        .map(|row| {
            let keys = sort
                .order_by
                .iter()
                .map(|s| evaluate_expr(&s.expr, &row, &layout))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((keys, row))
        })
        .collect::<Result<Vec<_>, ExecutionError>>()?;

    keyed.sort_by(|(a, _), (b, _)| {
        for (spec, (x, y)) in sort.order_by.iter().zip(a.iter().zip(b)) {
            let ord = match (x.is_null(), y.is_null()) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) if spec.nulls_first => std::cmp::Ordering::Less,
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) if spec.nulls_first => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) if spec.asc => x.cmp(y),
                (false, false) => y.cmp(x),
            };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });

    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

/// Error type for execution.
#[derive(Debug)]
pub enum ExecutionError {
    /// Internal error.
    Internal(String),
    /// Expression evaluation error.
    Eval(EvalError),
    /// A scan names a table that is not registered.
    TableNotFound(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Internal(msg) => write!(f, "Internal error: {}", msg),
            ExecutionError::Eval(e) => write!(f, "Evaluation error: {}", e),
            ExecutionError::TableNotFound(name) => write!(f, "Table not found: {}", name),
        }
    }
}

impl std::error::Error for ExecutionError {}

impl From<EvalError> for ExecutionError {
    fn from(e: EvalError) -> Self {
        ExecutionError::Eval(e)
    }
}

impl From<ExecutionError> for SparseError {
    fn from(e: ExecutionError) -> Self {
        SparseError::execution(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::{Field, JoinCondition, JoinType, PlanBuilder, SortExpr};
    use sparse_common::types::TableIndexAllocator;

    fn people() -> Schema {
        Schema::new(vec![
            Field::not_null("id", DataType::Int),
            Field::nullable("name", DataType::Text),
        ])
    }

    fn scores() -> Schema {
        Schema::new(vec![
            Field::nullable("person", DataType::Int),
            Field::nullable("score", DataType::Int),
        ])
    }

    fn context() -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.register_table(
            "people",
            MemTable::new(
                people(),
                vec![
                    Row::new(vec![Value::int(1), Value::string("ann")]),
                    Row::new(vec![Value::int(2), Value::string("bob")]),
                    Row::new(vec![Value::int(3), Value::Null]),
                ],
            )
            .unwrap(),
        );
        ctx.register_table(
            "scores",
            MemTable::new(
                scores(),
                vec![
                    Row::new(vec![Value::int(1), Value::int(10)]),
                    Row::new(vec![Value::int(1), Value::int(20)]),
                    Row::new(vec![Value::Null, Value::int(99)]),
                    Row::new(vec![Value::int(4), Value::int(40)]),
                ],
            )
            .unwrap(),
        );
        ctx
    }

    fn join_plan(join_type: JoinType) -> LogicalPlan {
        let alloc = TableIndexAllocator::default();
        let people = PlanBuilder::scan(&alloc, "people", people());
        let scores = PlanBuilder::scan(&alloc, "scores", scores());
        people
            .join(scores, join_type, &[("id", "person")])
            .unwrap()
            .build()
    }

    fn run(plan: &LogicalPlan) -> Vec<Row> {
        execute_plan(plan, &context()).unwrap().rows
    }

    #[test]
    fn test_memtable_width_checked() {
        assert!(MemTable::new(people(), vec![Row::new(vec![Value::int(1)])]).is_err());
    }

    #[test]
    fn test_inner_join() {
        assert_eq!(run(&join_plan(JoinType::Inner)).len(), 2);
    }

    #[test]
    fn test_left_join_pads_unmatched() {
        let rows = run(&join_plan(JoinType::Left));
        assert_eq!(rows.len(), 4);
        assert!(rows.contains(&Row::new(vec![
            Value::int(2),
            Value::string("bob"),
            Value::Null,
            Value::Null,
        ])));
    }

    #[test]
    fn test_full_join_null_keys_never_match() {
        let rows = run(&join_plan(JoinType::Full));
        // 2 matches, 2 unmatched people, 2 unmatched scores (NULL key and 4)
        assert_eq!(rows.len(), 6);
        assert_eq!(run(&join_plan(JoinType::Right)).len(), 4);
    }

    #[test]
    fn test_residual_condition() {
        let alloc = TableIndexAllocator::default();
        let people = PlanBuilder::scan(&alloc, "people", people());
        let scores = PlanBuilder::scan(&alloc, "scores", scores());
        let id = people.col("id").unwrap();
        let person = scores.col("person").unwrap();
        let score = scores.col("score").unwrap();
        let conditions = vec![
            JoinCondition::equal(id, person),
            JoinCondition::new(Expr::lit_i64(15), score, ComparisonOp::LessThan),
        ];
        let plan = people
            .join_on(scores, JoinType::Left, conditions)
            .unwrap()
            .build();
        let rows = run(&plan);
        assert_eq!(rows.len(), 3);
        assert!(rows.contains(&Row::new(vec![
            Value::int(1),
            Value::string("ann"),
            Value::int(1),
            Value::int(20),
        ])));
    }

    #[test]
    fn test_join_projection_maps() {
        let alloc = TableIndexAllocator::default();
        let people = PlanBuilder::scan(&alloc, "people", people());
        let scores = PlanBuilder::scan(&alloc, "scores", scores());
        let plan = people
            .join(scores, JoinType::Left, &[("id", "person")])
            .unwrap()
            .with_projection_maps(Some(vec![1]), Some(vec![1]))
            .unwrap()
            .build();
        let rows = run(&plan);
        assert!(rows.iter().all(|r| r.len() == 2));
        assert!(rows.contains(&Row::new(vec![Value::Null, Value::Null])));
    }

    #[test]
    fn test_aggregate_sort_limit() {
        let alloc = TableIndexAllocator::default();
        let scores = PlanBuilder::scan(&alloc, "scores", scores());
        let person = scores.col("person").unwrap();
        let score = scores.col("score").unwrap();
        let agg = scores
            .aggregate(vec![person], vec![score.sum().alias("total")])
            .unwrap();
        let total = agg.col("total").unwrap();
        let plan = agg
            .sort(vec![SortExpr::desc(total)])
            .unwrap()
            .limit(1, Some(1))
            .build();

        let rows = run(&plan);
        assert_eq!(rows, vec![Row::new(vec![Value::int(4), Value::BigInt(40)])]);
    }

    #[test]
    fn test_global_aggregate_over_empty_input() {
        let alloc = TableIndexAllocator::default();
        let scores = PlanBuilder::scan(&alloc, "scores", scores());
        let plan = scores
            .filter(Expr::lit_bool(false))
            .unwrap()
            .aggregate(vec![], vec![Expr::count_star().alias("n")])
            .unwrap()
            .build();
        assert_eq!(run(&plan), vec![Row::new(vec![Value::BigInt(0)])]);
    }

    #[test]
    fn test_missing_table() {
        let plan = join_plan(JoinType::Inner);
        let err = execute_plan(&plan, &ExecutionContext::new()).unwrap_err();
        assert!(matches!(err, ExecutionError::TableNotFound(_)));
    }
}
