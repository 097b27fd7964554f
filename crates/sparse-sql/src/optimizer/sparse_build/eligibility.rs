//! Decides whether a join may have its build side packed.

use std::fmt;

use sparse_common::types::ColumnBinding;
use sparse_common::SparseBuildConfig;

use crate::catalog::STRUCT_TO_SPARSE_VARIANT;
use crate::logical::{Expr, JoinType, LogicalOperator};

/// Why a node was not rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligible {
    /// The threshold is negative.
    Disabled,
    /// The node is not a comparison join.
    NotAJoin,
    /// Only left joins are rewritten.
    JoinType(JoinType),
    /// The build side is narrower than the threshold.
    TooFewColumns {
        /// Build-side column count.
        columns: usize,
        /// Configured minimum.
        threshold: usize,
    },
    /// A build-side key is not a plain column reference.
    ComputedBuildKey {
        /// Index of the offending join condition.
        condition: usize,
    },
    /// A build-side key references a column the build child does not produce.
    ForeignBuildKey {
        /// The referenced binding.
        binding: ColumnBinding,
    },
    /// The build side is already a packing projection.
    AlreadyPacked,
}

impl fmt::Display for Ineligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligible::Disabled => write!(f, "sparse build is disabled"),
            Ineligible::NotAJoin => write!(f, "not a comparison join"),
            Ineligible::JoinType(join_type) => write!(f, "{} join", join_type),
            Ineligible::TooFewColumns { columns, threshold } => {
                write!(f, "build side has {} columns, threshold is {}", columns, threshold)
            }
            Ineligible::ComputedBuildKey { condition } => {
                write!(f, "build key of condition {} is not a column reference", condition)
            }
            Ineligible::ForeignBuildKey { binding } => {
                write!(f, "build key {} is not produced by the build side", binding)
            }
            Ineligible::AlreadyPacked => write!(f, "build side is already packed"),
        }
    }
}

/// Classifies a node, returning the first reason it cannot be rewritten.
///
/// Pure: classifying the same unmodified node twice gives the same answer.
pub fn classify(op: &LogicalOperator, config: &SparseBuildConfig) -> Result<(), Ineligible> {
    let threshold = config.min_columns().ok_or(Ineligible::Disabled)?;

    let LogicalOperator::ComparisonJoin(join) = op else {
        return Err(Ineligible::NotAJoin);
    };
    if join.join_type != JoinType::Left {
        return Err(Ineligible::JoinType(join.join_type));
    }

    let build_bindings = join.right.column_bindings();
    if build_bindings.len() < threshold {
        return Err(Ineligible::TooFewColumns {
            columns: build_bindings.len(),
            threshold,
        });
    }

    for (i, cond) in join.conditions.iter().enumerate() {
        let Expr::ColumnRef(key) = &cond.right else {
            return Err(Ineligible::ComputedBuildKey { condition: i });
        };
        if !build_bindings.contains(&key.binding) {
            return Err(Ineligible::ForeignBuildKey {
                binding: key.binding,
            });
        }
    }

    if is_packing_projection(&join.right) {
        return Err(Ineligible::AlreadyPacked);
    }

    Ok(())
}

/// Returns true if the node is a legal, profitable rewrite target.
pub fn is_eligible(op: &LogicalOperator, config: &SparseBuildConfig) -> bool {
    classify(op, config).is_ok()
}

/// A projection whose last output is a sparse variant pack.
pub(super) fn is_packing_projection(op: &LogicalOperator) -> bool {
    let LogicalOperator::Projection(proj) = op else {
        return false;
    };
    matches!(
        proj.exprs.last().map(Expr::strip_alias),
        Some(Expr::Function(func)) if func.name == STRUCT_TO_SPARSE_VARIANT
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::{
        ComparisonJoinOperator, JoinCondition, ProjectionOperator, ScanOperator, Schema, Field,
    };
    use crate::types::DataType;
    use sparse_common::types::TableIndex;

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

    fn join(join_type: JoinType, build_columns: usize, key: Expr) -> LogicalOperator {
        LogicalOperator::ComparisonJoin(ComparisonJoinOperator::new(
            scan(0, 1),
            scan(1, build_columns),
            join_type,
            vec![JoinCondition::equal(col(0, 0), key)],
        ))
    }

    #[test]
    fn test_threshold_boundary() {
        let config = SparseBuildConfig::new(10);
        assert_eq!(
            classify(&join(JoinType::Left, 9, col(1, 0)), &config),
            Err(Ineligible::TooFewColumns {
                columns: 9,
                threshold: 10
            })
        );
        assert!(is_eligible(&join(JoinType::Left, 10, col(1, 0)), &config));
    }

    #[test]
    fn test_negative_threshold_disables() {
        let config = SparseBuildConfig::disabled();
        assert_eq!(
            classify(&join(JoinType::Left, 50, col(1, 0)), &config),
            Err(Ineligible::Disabled)
        );
    }

    #[test]
    fn test_only_left_joins() {
        let config = SparseBuildConfig::new(2);
        for join_type in [JoinType::Inner, JoinType::Right, JoinType::Full] {
            assert_eq!(
                classify(&join(join_type, 5, col(1, 0)), &config),
                Err(Ineligible::JoinType(join_type))
            );
        }
        assert_eq!(classify(&scan(0, 20), &config), Err(Ineligible::NotAJoin));
    }

    #[test]
    fn test_build_keys_must_be_plain_columns() {
        let config = SparseBuildConfig::new(2);
        let computed = col(1, 0).add(Expr::lit_i64(1));
        assert_eq!(
            classify(&join(JoinType::Left, 5, computed), &config),
            Err(Ineligible::ComputedBuildKey { condition: 0 })
        );

        let foreign = col(7, 0);
        assert!(matches!(
            classify(&join(JoinType::Left, 5, foreign), &config),
            Err(Ineligible::ForeignBuildKey { .. })
        ));
    }

    #[test]
    fn test_packed_build_side_is_skipped() {
        let packed = Expr::Function(crate::logical::BoundFunction {
            name: STRUCT_TO_SPARSE_VARIANT.to_string(),
            args: vec![],
            return_type: DataType::Variant,
            bind_data: Default::default(),
        });
        let projection = LogicalOperator::Projection(ProjectionOperator::new(
            TableIndex::new(5),
            scan(1, 3),
            vec![col(1, 0), packed.alias("packed")],
        ));
        let op = LogicalOperator::ComparisonJoin(ComparisonJoinOperator::new(
            scan(0, 1),
            projection,
            JoinType::Left,
            vec![JoinCondition::equal(col(0, 0), col(5, 0))],
        ));
        let config = SparseBuildConfig::new(2);
        assert_eq!(classify(&op, &config), Err(Ineligible::AlreadyPacked));
        assert_eq!(classify(&op, &config), classify(&op, &config));
    }
}
