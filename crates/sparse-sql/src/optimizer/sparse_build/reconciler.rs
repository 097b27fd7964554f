//! Repairs references to the outputs of a rewritten node.
//!
//! A rewrite replaces a node whose outputs were named `old[i]` by a subtree
//! whose outputs are named `new[i]`. Every expression elsewhere in the plan
//! that referenced `old[i]` must now reference `new[i]`.

use std::collections::HashMap;

use sparse_common::types::{ColumnBinding, TableIndex};

use crate::logical::{Expr, LogicalOperator};
use crate::optimizer::{OptimizerError, OptimizerResult};

/// Substitutes `new[i]` for every reference to `old[i]` under `root`.
///
/// The walk is top down and does not enter the projection introducing
/// `stop`, whose subtree was just built and is already consistent. Each
/// reference is replaced at most once, so mappings whose domain and range
/// overlap do not chain.
///
/// Returns the number of references replaced.
///
/// # Errors
///
/// Returns `OptimizerError::Internal` if `old` and `new` differ in length.
pub fn reconcile_bindings(
    root: &mut LogicalOperator,
    stop: TableIndex,
    old: &[ColumnBinding],
    new: &[ColumnBinding],
) -> OptimizerResult<usize> {
    if old.len() != new.len() {
        return Err(OptimizerError::Internal(format!(
            "binding map mismatch: {} old bindings, {} new bindings",
            old.len(),
            new.len()
        )));
    }

    let mapping: HashMap<ColumnBinding, ColumnBinding> = old
        .iter()
        .copied()
        .zip(new.iter().copied())
        .filter(|(o, n)| o != n)
        .collect();
    if mapping.is_empty() {
        return Ok(0);
    }

    let mut replaced = 0;
    replace_references(root, stop, &mapping, &mut replaced);
    Ok(replaced)
}

fn replace_references(
    op: &mut LogicalOperator,
    stop: TableIndex,
    mapping: &HashMap<ColumnBinding, ColumnBinding>,
    replaced: &mut usize,
) {
    if let LogicalOperator::Projection(proj) = op {
        if proj.table_index == stop {
            return;
        }
    }

    for expr in op.expressions_mut() {
        expr.visit_mut(&mut |e| {
            if let Expr::ColumnRef(column) = e {
                if let Some(target) = mapping.get(&column.binding) {
                    column.binding = *target;
                    *replaced += 1;
                }
            }
        });
    }

    for child in op.children_mut() {
        replace_references(child, stop, mapping, replaced);
    }
}
