//! Sparse build-side packing for wide left joins.
//!
//! A hash join keeps every build row in its hash table. When the build side
//! of a left join is wide and mostly NULL, storing each row as one sparse
//! variant (which omits NULL fields) plus the join keys is much smaller than
//! storing every column. The original columns are extracted again above the
//! join.
//!
//! The pass has four parts:
//!
//! - [`classify`] / [`is_eligible`] decide whether a node may be rewritten
//! - [`rewrite`] packs the build side and builds the reconstruction
//!   projection
//! - [`reconcile_bindings`] points references to the old join outputs at the
//!   reconstruction projection
//! - [`optimize_sparse_build`] walks the plan bottom up and ties them
//!   together
//!
//! The pass is controlled by `sparse_build_optimizer_column_threshold`: the
//! minimum number of build columns for a rewrite (default 10). A negative
//! value disables it.

mod eligibility;
mod reconciler;
mod rewriter;

pub use eligibility::{classify, is_eligible, Ineligible};
pub use reconciler::reconcile_bindings;
pub use rewriter::{field_name, rewrite, SparseBuildRewrite, PACKED_COLUMN_NAME};

use tracing::{debug, trace};

use super::{OptimizerContext, OptimizerError, OptimizerResult, OptimizerRule};
use crate::logical::LogicalPlan;

/// What one run of the pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparseBuildOutcome {
    /// The threshold the run used.
    pub threshold: i64,
    /// Number of operators classified.
    pub visited: usize,
    /// Number of joins rewritten.
    pub rewritten: usize,
    /// Number of column references redirected by reconciliation.
    pub references_updated: usize,
}

impl SparseBuildOutcome {
    /// Returns true if the plan was modified.
    pub fn changed(&self) -> bool {
        self.rewritten > 0
    }
}

/// Optimizer rule wrapping [`optimize_sparse_build`].
#[derive(Debug)]
pub struct SparseBuildRule;

impl OptimizerRule for SparseBuildRule {
    fn name(&self) -> &str {
        "SparseBuild"
    }

    fn optimize(
        &self,
        plan: &mut LogicalPlan,
        ctx: &OptimizerContext<'_>,
    ) -> OptimizerResult<bool> {
        let outcome = optimize_sparse_build(plan, ctx)?;
        Ok(outcome.changed())
    }
}

/// Rewrites every eligible join in `plan`, innermost first.
///
/// The threshold is read once. Column reference types are refreshed before
/// the walk. Each node is classified once, in post order; after a node is
/// rewritten, references anywhere in the plan to its old outputs are
/// redirected to the reconstruction projection that replaced it. Nodes
/// created by a rewrite are not visited.
///
/// # Errors
///
/// Fails if the plan is inconsistent on entry, if the catalog rejects a
/// synthesized expression, or if a rewrite leaves the plan inconsistent.
/// On error `plan` is left exactly as it was passed in.
pub fn optimize_sparse_build(
    plan: &mut LogicalPlan,
    ctx: &OptimizerContext<'_>,
) -> OptimizerResult<SparseBuildOutcome> {
    let config = ctx.config().sparse_build;
    let mut outcome = SparseBuildOutcome {
        threshold: config.column_threshold,
        ..Default::default()
    };
    if !config.is_enabled() {
        trace!(
            "Sparse build disabled (threshold {})",
            config.column_threshold
        );
        return Ok(outcome);
    }

    // Rewrites happen on a copy; `plan` is only replaced once every rewrite
    // and the final binding check succeed.
    let mut working = plan.clone();
    working
        .resolve_types()
        .map_err(|e| OptimizerError::Internal(e.to_string()))?;

    for path in working.post_order_paths() {
        let node = working
            .node_at_mut(&path)
            .ok_or_else(|| OptimizerError::Internal(format!("no plan node at {:?}", path)))?;
        outcome.visited += 1;

        if let Err(reason) = classify(node, &config) {
            if !matches!(reason, Ineligible::NotAJoin) {
                trace!("Sparse build skipped {} at {:?}: {}", node.name(), path, reason);
            }
            continue;
        }

        let old_bindings = node.column_bindings();
        let original = std::mem::take(node);
        let rewritten = rewrite(original, ctx.catalog(), ctx.allocator())?;
        *node = rewritten.operator;
        let new_bindings = node.column_bindings();

        debug!(
            "Sparse build packed {} build columns ({} keys) at {:?}: packing projection {}, reconstruction projection {}",
            rewritten.packed_columns,
            rewritten.key_columns,
            path,
            rewritten.packing_index,
            rewritten.reconstruction_index
        );

        outcome.references_updated += reconcile_bindings(
            &mut working.root,
            rewritten.reconstruction_index,
            &old_bindings,
            &new_bindings,
        )?;
        outcome.rewritten += 1;
    }

    if outcome.changed() {
        working
            .validate_bindings()
            .map_err(|e| OptimizerError::Internal(e.to_string()))?;
        trace!("Plan after sparse build:\n{}", working.explain());
        *plan = working;
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::catalog::{BindError, BuiltinCatalog, FunctionCatalog, VARIANT_EXTRACT};
    use crate::logical::{
        Expr, Field, JoinType, LogicalOperator, PlanBuilder, Schema, SortExpr,
    };
    use crate::types::DataType;
    use sparse_common::types::TableIndexAllocator;
    use sparse_common::OptimizerConfig;

    fn schema(prefix: &str, columns: usize) -> Schema {
        let mut fields = vec![Field::not_null("id", DataType::Int)];
        fields.extend(
            (1..columns).map(|i| Field::nullable(format!("{}{}", prefix, i), DataType::Int)),
        );
        Schema::new(fields)
    }

    fn run(plan: &mut LogicalPlan, threshold: i64) -> SparseBuildOutcome {
        let config = OptimizerConfig::default().with_sparse_build_threshold(threshold);
        let catalog = BuiltinCatalog::new();
        let ctx = OptimizerContext::new(&config, &catalog, plan);
        optimize_sparse_build(plan, &ctx).unwrap()
    }

    /// SELECT ... FROM probe LEFT JOIN build USING (id) ORDER BY v3, with a
    /// projection and sort above the join referencing build columns.
    fn plan_with_parents(build_columns: usize) -> LogicalPlan {
        let alloc = TableIndexAllocator::default();
        let probe = PlanBuilder::scan(&alloc, "probe", schema("p", 2));
        let build = PlanBuilder::scan(&alloc, "build", schema("v", build_columns));
        let joined = probe
            .join(build, JoinType::Left, &[("id", "id")])
            .unwrap();
        let v3 = joined.col("v3").unwrap();
        let p1 = joined.col("p1").unwrap();
        let sorted = joined.sort(vec![SortExpr::asc(v3.clone())]).unwrap();
        sorted
            .project(vec![p1, v3.add(Expr::lit_i64(1)).alias("v3_plus")])
            .unwrap()
            .build()
    }

    /// Builtin catalog that refuses `reject` once `allowed` calls to it
    /// have been bound.
    #[derive(Debug)]
    struct RejectingCatalog {
        inner: BuiltinCatalog,
        reject: &'static str,
        allowed: usize,
        calls: AtomicUsize,
    }

    impl RejectingCatalog {
        fn new(reject: &'static str, allowed: usize) -> Self {
            Self {
                inner: BuiltinCatalog::new(),
                reject,
                allowed,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl FunctionCatalog for RejectingCatalog {
        fn bind_scalar(&self, name: &str, args: Vec<Expr>) -> Result<Expr, BindError> {
            if name == self.reject && self.calls.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err(BindError::UnknownFunction(name.to_string()));
            }
            self.inner.bind_scalar(name, args)
        }
    }

    fn nested_plan() -> LogicalPlan {
        let alloc = TableIndexAllocator::default();
        let a = PlanBuilder::scan(&alloc, "a", schema("a", 2));
        let b = PlanBuilder::scan(&alloc, "b", schema("b", 11));
        let c = PlanBuilder::scan(&alloc, "c", schema("c", 11));
        let ab = a.join(b, JoinType::Left, &[("id", "id")]).unwrap();
        let a_id = ab.col("a1").unwrap();
        let c_id = c.col("id").unwrap();
        let cond = crate::logical::JoinCondition::equal(a_id, c_id);
        let abc = ab.join_on(c, JoinType::Left, vec![cond]).unwrap();
        let b5 = abc.col("b5").unwrap();
        let c7 = abc.col("c7").unwrap();
        abc.project(vec![b5, c7]).unwrap().build()
    }

    #[test]
    fn test_bind_failure_leaves_plan_untouched() {
        let mut plan = plan_with_parents(12);
        let original = plan.clone();
        let config = OptimizerConfig::default();
        let catalog = RejectingCatalog::new(VARIANT_EXTRACT, 0);
        let ctx = OptimizerContext::new(&config, &catalog, &plan);

        let err = optimize_sparse_build(&mut plan, &ctx).unwrap_err();
        assert!(matches!(
            err,
            OptimizerError::Bind(BindError::UnknownFunction(ref name)) if name == VARIANT_EXTRACT
        ));
        assert_eq!(plan, original);
    }

    #[test]
    fn test_failed_outer_rewrite_discards_inner_rewrite() {
        let mut plan = nested_plan();
        let original = plan.clone();
        let config = OptimizerConfig::default();
        // The inner join binds 11 extracts; the outer join fails on its first.
        let catalog = RejectingCatalog::new(VARIANT_EXTRACT, 11);
        let ctx = OptimizerContext::new(&config, &catalog, &plan);

        assert!(matches!(
            optimize_sparse_build(&mut plan, &ctx),
            Err(OptimizerError::Bind(BindError::UnknownFunction(_)))
        ));
        assert_eq!(plan, original);
        assert!(SparseBuildRule.optimize(&mut plan, &ctx).is_err());
        assert_eq!(plan, original);
    }

    #[test]
    fn test_rewrite_and_reconcile_parents() {
        let mut plan = plan_with_parents(12);
        let before_types = plan.types();
        let outcome = run(&mut plan, 10);

        assert_eq!(outcome.rewritten, 1);
        assert_eq!(outcome.threshold, 10);
        // v3 in the sort key, p1 and v3 in the projection
        assert_eq!(outcome.references_updated, 3);
        assert_eq!(plan.types(), before_types);
        assert!(plan.validate_bindings().is_ok());
        assert_eq!(
            plan.node_at(&[0, 0]).map(LogicalOperator::name),
            Some("Projection")
        );
    }

    #[test]
    fn test_threshold_boundary() {
        let mut below = plan_with_parents(9);
        let original = below.clone();
        assert_eq!(run(&mut below, 10).rewritten, 0);
        assert_eq!(below, original);

        let mut at = plan_with_parents(10);
        assert_eq!(run(&mut at, 10).rewritten, 1);
    }

    #[test]
    fn test_negative_threshold_disables() {
        let mut plan = plan_with_parents(40);
        let original = plan.clone();
        let outcome = run(&mut plan, -1);
        assert_eq!(outcome.visited, 0);
        assert_eq!(plan, original);
    }

    #[test]
    fn test_second_run_is_noop() {
        let mut plan = plan_with_parents(12);
        run(&mut plan, 2);
        let once = plan.clone();
        let outcome = run(&mut plan, 2);
        assert_eq!(outcome.rewritten, 0);
        assert_eq!(plan, once);
    }

    #[test]
    fn test_nested_joins_rewritten_innermost_first() {
        let mut plan = nested_plan();
        let outcome = run(&mut plan, 10);
        assert_eq!(outcome.rewritten, 2);
        assert!(plan.validate_bindings().is_ok());
    }

    #[test]
    fn test_rule_reports_change() {
        let mut plan = plan_with_parents(12);
        let config = OptimizerConfig::default();
        let catalog = BuiltinCatalog::new();
        let ctx = OptimizerContext::new(&config, &catalog, &plan);
        assert!(SparseBuildRule.optimize(&mut plan, &ctx).unwrap());
        assert!(!SparseBuildRule.optimize(&mut plan, &ctx).unwrap());
    }
}
