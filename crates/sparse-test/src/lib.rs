//! # sparse-test
//!
//! Shared fixtures for end-to-end tests of the optimizer.
//!
//! The fixtures build wide in-memory tables, optimize a plan with a given
//! configuration, and execute both the original and the optimized plan so
//! tests can compare their rows.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::Once;

use sparse_common::{OptimizerConfig, SparseResult};
use sparse_sql::executor::{execute_plan, ExecutionContext, MemTable, QueryResult, Row};
use sparse_sql::logical::{Field, LogicalPlan, Schema};
use sparse_sql::optimizer::{OptimizationStats, Optimizer};
use sparse_sql::types::{DataType, Value};
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Installs a test subscriber once per process.
///
/// `RUST_LOG` overrides the default filter, e.g.
/// `RUST_LOG=sparse_sql=trace cargo test` prints every rewrite and the
/// EXPLAIN text before and after optimization.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("sparse_sql=warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Schema `(id INT NOT NULL, {prefix}0 INT, ..., {prefix}{n-1} INT)`.
pub fn wide_schema(prefix: &str, value_columns: usize) -> Schema {
    let mut fields = vec![Field::not_null("id", DataType::Int)];
    fields.extend(
        (0..value_columns).map(|i| Field::nullable(format!("{}{}", prefix, i), DataType::Int)),
    );
    Schema::new(fields)
}

/// Builds a row of `wide_schema` from an id and optional values.
pub fn wide_row(id: i32, values: &[Option<i32>]) -> Row {
    let mut row = vec![Value::int(id)];
    row.extend(values.iter().map(|v| Value::int_or_null(*v)));
    Row::new(row)
}

/// Builds a table of `wide_schema` rows.
pub fn wide_table(
    prefix: &str,
    value_columns: usize,
    rows: Vec<(i32, Vec<Option<i32>>)>,
) -> SparseResult<MemTable> {
    let rows = rows
        .into_iter()
        .map(|(id, values)| wide_row(id, &values))
        .collect();
    Ok(MemTable::new(wide_schema(prefix, value_columns), rows)?)
}

/// A plan run before and after optimization.
#[derive(Debug)]
pub struct Comparison {
    /// The optimized plan.
    pub optimized: LogicalPlan,
    /// Optimizer statistics.
    pub stats: OptimizationStats,
    /// Result of the original plan.
    pub before: QueryResult,
    /// Result of the optimized plan.
    pub after: QueryResult,
}

impl Comparison {
    /// Returns true if the optimizer changed the plan.
    pub fn rewritten(&self) -> bool {
        self.stats.rules_applied > 0
    }

    /// Rows of both results, each sorted, for order-insensitive comparison.
    pub fn sorted_rows(&self) -> (Vec<Row>, Vec<Row>) {
        (sorted(&self.before.rows), sorted(&self.after.rows))
    }
}

/// Optimizes `plan` with `config`, then executes both plans over `ctx`.
pub fn run_both(
    plan: &LogicalPlan,
    config: OptimizerConfig,
    ctx: &ExecutionContext,
) -> SparseResult<Comparison> {
    let before = execute_plan(plan, ctx)?;
    let (optimized, stats) = Optimizer::new(config).optimize_with_stats(plan.clone())?;
    optimized.validate_bindings()?;
    let after = execute_plan(&optimized, ctx)?;
    tracing::debug!(
        "Compared plans: {} rows before, {} rows after, {} rules applied",
        before.rows.len(),
        after.rows.len(),
        stats.rules_applied
    );
    Ok(Comparison {
        optimized,
        stats,
        before,
        after,
    })
}

/// Configuration with only the sparse-build rule enabled.
pub fn sparse_only(threshold: i64) -> OptimizerConfig {
    OptimizerConfig::minimal().with_sparse_build(true).with_sparse_build_threshold(threshold)
}

/// Returns the rows in sorted order.
pub fn sorted(rows: &[Row]) -> Vec<Row> {
    let mut rows = rows.to_vec();
    rows.sort_by(|a, b| a.values().cmp(b.values()));
    rows
}
