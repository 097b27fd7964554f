//! Query optimizer.
//!
//! This module implements a rule-based optimizer that rewrites bound
//! logical plans in place. Rules run once each, in a fixed order, and report
//! whether they changed the plan.
//!
//! # Architecture
//!
//! - **OptimizerRule**: Trait for individual optimization rules
//! - **OptimizerContext**: Configuration, function catalog and table index
//!   allocator shared by the rules of one optimizer run
//! - **Optimizer**: Coordinates rule application and collects statistics
//!
//! # Optimization Rules
//!
//! - **ConstantFolding**: Evaluates constant expressions at planning time
//! - **SparseBuild**: Packs wide build sides of left joins into a single
//!   sparse variant column (see [`sparse_build`])
//!
//! # Example
//!
//! ```ignore
//! use sparse_common::OptimizerConfig;
//! use sparse_sql::optimizer::Optimizer;
//!
//! let optimizer = Optimizer::new(OptimizerConfig::default().with_sparse_build_threshold(8));
//! let optimized_plan = optimizer.optimize(plan)?;
//! ```

mod rules;
pub mod sparse_build;

pub use rules::ConstantFoldingRule;
pub use sparse_build::{SparseBuildOutcome, SparseBuildRule};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use sparse_common::types::TableIndexAllocator;
use sparse_common::{OptimizerConfig, SparseError};
use thiserror::Error;
use tracing::{debug, trace};

use crate::catalog::{BindError, BuiltinCatalog, FunctionCatalog};
use crate::logical::LogicalPlan;

/// Errors that can occur during optimization.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Rule application failed.
    #[error("Rule '{rule}' failed: {message}")]
    RuleFailed {
        /// Rule name.
        rule: String,
        /// Error message.
        message: String,
    },

    /// The catalog rejected a synthesized expression.
    #[error("Bind error: {0}")]
    Bind(#[from] BindError),

    /// The optimizer configuration is invalid.
    #[error("Invalid optimizer configuration: {0}")]
    InvalidConfig(String),

    /// Internal optimizer error.
    #[error("Internal optimizer error: {0}")]
    Internal(String),
}

/// Result type for optimizer operations.
pub type OptimizerResult<T> = Result<T, OptimizerError>;

impl From<OptimizerError> for SparseError {
    fn from(err: OptimizerError) -> Self {
        match err {
            OptimizerError::RuleFailed { rule, message } => {
                SparseError::RuleFailed { rule, message }
            }
            OptimizerError::Bind(bind) => bind.into(),
            OptimizerError::InvalidConfig(message) => SparseError::invalid_config(message),
            OptimizerError::Internal(message) => SparseError::internal(message),
        }
    }
}

/// State shared by the rules of one optimizer run.
#[derive(Debug)]
pub struct OptimizerContext<'a> {
    config: &'a OptimizerConfig,
    catalog: &'a dyn FunctionCatalog,
    allocator: TableIndexAllocator,
}

impl<'a> OptimizerContext<'a> {
    /// Creates a context whose allocator issues indices unused by `plan`.
    pub fn new(
        config: &'a OptimizerConfig,
        catalog: &'a dyn FunctionCatalog,
        plan: &LogicalPlan,
    ) -> Self {
        Self {
            config,
            catalog,
            allocator: TableIndexAllocator::after(plan.max_table_index()),
        }
    }

    /// Returns the optimizer configuration.
    pub fn config(&self) -> &OptimizerConfig {
        self.config
    }

    /// Returns the function catalog.
    pub fn catalog(&self) -> &dyn FunctionCatalog {
        self.catalog
    }

    /// Returns the allocator for new table indices.
    pub fn allocator(&self) -> &TableIndexAllocator {
        &self.allocator
    }
}

/// Trait for optimizer rules.
///
/// Each rule rewrites the plan in place. Rules must leave the plan
/// consistent and should be idempotent: applying a rule to its own output
/// does not change the plan again.
pub trait OptimizerRule: std::fmt::Debug + Send + Sync {
    /// Returns the name of this rule.
    fn name(&self) -> &str;

    /// Attempts to optimize the given plan.
    ///
    /// Returns true if the plan was modified.
    fn optimize(&self, plan: &mut LogicalPlan, ctx: &OptimizerContext<'_>)
        -> OptimizerResult<bool>;
}

/// Statistics about optimization.
#[derive(Debug, Clone, Default)]
pub struct OptimizationStats {
    /// Number of rules that changed the plan.
    pub rules_applied: usize,
    /// Per-rule application counts.
    pub rule_applications: Vec<(String, usize)>,
    /// Total optimization time in microseconds.
    pub total_time_us: u64,
}

/// The query optimizer.
#[derive(Debug)]
pub struct Optimizer {
    config: OptimizerConfig,
    catalog: Arc<dyn FunctionCatalog>,
    rules: Vec<Arc<dyn OptimizerRule>>,
}

impl Optimizer {
    /// Creates a new optimizer with the built-in function catalog.
    pub fn new(config: OptimizerConfig) -> Self {
        Self::with_catalog(config, Arc::new(BuiltinCatalog::new()))
    }

    /// Creates a new optimizer that binds synthesized calls against
    /// `catalog`.
    pub fn with_catalog(config: OptimizerConfig, catalog: Arc<dyn FunctionCatalog>) -> Self {
        let mut rules: Vec<Arc<dyn OptimizerRule>> = Vec::new();

        // Add rules in order of application
        if config.enable_constant_folding {
            rules.push(Arc::new(ConstantFoldingRule));
        }
        if config.enable_sparse_build {
            rules.push(Arc::new(SparseBuildRule));
        }

        Self {
            config,
            catalog,
            rules,
        }
    }

    /// Creates an optimizer with default configuration.
    pub fn default_optimizer() -> Self {
        Self::new(OptimizerConfig::default())
    }

    /// Optimizes a logical plan.
    pub fn optimize(&self, plan: LogicalPlan) -> OptimizerResult<LogicalPlan> {
        let (optimized, _) = self.optimize_with_stats(plan)?;
        Ok(optimized)
    }

    /// Optimizes a logical plan and returns optimization statistics.
    pub fn optimize_with_stats(
        &self,
        mut plan: LogicalPlan,
    ) -> OptimizerResult<(LogicalPlan, OptimizationStats)> {
        self.config
            .validate()
            .map_err(OptimizerError::InvalidConfig)?;

        let start = Instant::now();
        let mut stats = OptimizationStats::default();
        let mut rule_counts: HashMap<String, usize> = HashMap::new();
        let ctx = OptimizerContext::new(&self.config, self.catalog.as_ref(), &plan);

        trace!("Plan before optimization:\n{}", plan.explain());

        for rule in &self.rules {
            if rule.optimize(&mut plan, &ctx)? {
                debug!("Optimizer rule {} changed the plan", rule.name());
                stats.rules_applied += 1;
                *rule_counts.entry(rule.name().to_string()).or_insert(0) += 1;
            }
        }

        trace!("Plan after optimization:\n{}", plan.explain());

        let mut rule_applications: Vec<_> = rule_counts.into_iter().collect();
        rule_applications.sort();
        stats.rule_applications = rule_applications;
        stats.total_time_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);

        if self.config.collect_stats {
            debug!(
                rules_applied = stats.rules_applied,
                total_time_us = stats.total_time_us,
                "Optimization finished"
            );
        }

        Ok((plan, stats))
    }

    /// Adds a custom optimization rule.
    pub fn add_rule(&mut self, rule: Arc<dyn OptimizerRule>) {
        self.rules.push(rule);
    }

    /// Returns the names of the rules that will run, in order.
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::{Field, JoinType, PlanBuilder, Schema};
    use crate::types::DataType;

    fn wide_schema(prefix: &str, columns: usize) -> Schema {
        let mut fields = vec![Field::not_null("id", DataType::Int)];
        fields.extend((1..columns).map(|i| Field::nullable(format!("{}{}", prefix, i), DataType::Int)));
        Schema::new(fields)
    }

    fn left_join_plan(build_columns: usize) -> LogicalPlan {
        let alloc = TableIndexAllocator::default();
        let probe = PlanBuilder::scan(&alloc, "probe", wide_schema("p", 2));
        let build = PlanBuilder::scan(&alloc, "build", wide_schema("v", build_columns));
        probe
            .join(build, JoinType::Left, &[("id", "id")])
            .unwrap()
            .build()
    }

    #[test]
    fn test_optimizer_default() {
        let optimizer = Optimizer::default_optimizer();
        assert_eq!(optimizer.rule_names(), vec!["ConstantFolding", "SparseBuild"]);
    }

    #[test]
    fn test_optimizer_minimal_config() {
        let optimizer = Optimizer::new(OptimizerConfig::minimal());
        assert!(optimizer.rule_names().is_empty());

        let plan = left_join_plan(12);
        let optimized = optimizer.optimize(plan.clone()).unwrap();
        assert_eq!(optimized, plan);
    }

    #[test]
    fn test_optimizer_stats() {
        let optimizer = Optimizer::new(OptimizerConfig::default().with_stats(true));
        let (optimized, stats) = optimizer.optimize_with_stats(left_join_plan(12)).unwrap();

        assert_eq!(stats.rules_applied, 1);
        assert_eq!(stats.rule_applications, vec![("SparseBuild".to_string(), 1)]);
        assert!(optimized.validate_bindings().is_ok());
    }

    #[test]
    fn test_optimizer_rejects_invalid_config() {
        let optimizer = Optimizer::new(OptimizerConfig::default().with_sparse_build_threshold(0));
        let err = optimizer.optimize(left_join_plan(12)).unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidConfig(_)));
    }

    #[test]
    fn test_context_allocates_past_plan() {
        let plan = left_join_plan(3);
        let config = OptimizerConfig::default();
        let catalog = BuiltinCatalog::new();
        let ctx = OptimizerContext::new(&config, &catalog, &plan);
        let max = plan.max_table_index().unwrap();
        assert!(ctx.allocator().allocate() > max);
    }

    #[test]
    fn test_error_conversion() {
        let err: SparseError = OptimizerError::Internal("boom".to_string()).into();
        assert!(err.is_internal());

        let err: SparseError = OptimizerError::Bind(BindError::UnknownFunction("f".into())).into();
        assert!(matches!(err, SparseError::FunctionNotFound { .. }));
    }
}
