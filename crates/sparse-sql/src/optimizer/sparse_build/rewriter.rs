//! Replaces a wide build side with a single packed variant column.
//!
//! ```text
//! LEFT JOIN(probe, build)
//! ```
//! becomes
//! ```text
//! Projection[out](probe columns..., CAST(TRY(variant_extract(packed, 'cP')) AS T) AS name...)
//!   LEFT JOIN(probe, Projection[in](build keys..., struct_to_sparse_variant(struct_pack(cP := col...))))
//!     build
//! ```
//! Packed fields are named by physical build position (`c0`, `c1`, ...).
//! Null build values are dropped by the pack and come back as NULL through
//! the `TRY`, exactly like the NULLs of an unmatched probe row.

use sparse_common::types::{ColumnBinding, TableIndex, TableIndexAllocator};

use crate::catalog::{FunctionCatalog, STRUCT_PACK, STRUCT_TO_SPARSE_VARIANT, VARIANT_EXTRACT};
use crate::logical::{
    apply_projection_map, ComparisonJoinOperator, Expr, JoinType, LogicalOperator,
    ProjectionOperator,
};
use crate::optimizer::{OptimizerError, OptimizerResult};
use crate::types::DataType;

/// Output name of the packed column.
pub const PACKED_COLUMN_NAME: &str = "__sparse_build";

/// Result of rewriting one join.
#[derive(Debug)]
pub struct SparseBuildRewrite {
    /// The reconstruction projection, with the mutated join as its child.
    pub operator: LogicalOperator,
    /// Table index of the projection below the join that packs the build side.
    pub packing_index: TableIndex,
    /// Table index of the projection above the join.
    pub reconstruction_index: TableIndex,
    /// Number of physical build columns packed into the variant.
    pub packed_columns: usize,
    /// Number of distinct build keys kept beside the variant.
    pub key_columns: usize,
}

/// Returns the packed field name for a physical build column.
pub fn field_name(position: usize) -> String {
    format!("c{}", position)
}

/// Rewrites an eligible left join.
///
/// Row output is unchanged: the result produces the same columns, in the
/// same order and with the same types, as the join it replaces.
///
/// # Errors
///
/// Returns `OptimizerError::Internal` if `op` is not an eligible join, and
/// propagates catalog bind failures.
pub fn rewrite(
    op: LogicalOperator,
    catalog: &dyn FunctionCatalog,
    alloc: &TableIndexAllocator,
) -> OptimizerResult<SparseBuildRewrite> {
    let kind = op.name();
    let LogicalOperator::ComparisonJoin(mut join) = op else {
        return Err(OptimizerError::Internal(format!(
            "sparse build rewrite applied to {}",
            kind
        )));
    };
    if join.join_type != JoinType::Left {
        return Err(OptimizerError::Internal(format!(
            "sparse build rewrite applied to {} join",
            join.join_type
        )));
    }

    let build_bindings = join.right.column_bindings();
    let build_types = join.right.types();
    let build_names = join.right.column_names();
    let build_column = |position: usize| {
        Expr::column(
            build_bindings[position],
            build_types[position].clone(),
            build_names[position].clone(),
        )
    };

    // Pack every physical build column under its positional name.
    let fields = (0..build_bindings.len())
        .map(|p| build_column(p).alias(field_name(p)))
        .collect();
    let packed = catalog.bind_scalar(STRUCT_PACK, fields)?;
    let variant = catalog.bind_scalar(STRUCT_TO_SPARSE_VARIANT, vec![packed])?;

    // Distinct build keys, in condition order.
    let mut keys: Vec<usize> = Vec::new();
    for cond in &join.conditions {
        let position = build_key_position(&cond.right, &build_bindings)?;
        if !keys.contains(&position) {
            keys.push(position);
        }
    }

    let packing_index = alloc.allocate();
    let mut packing_exprs: Vec<Expr> = keys.iter().map(|&p| build_column(p)).collect();
    packing_exprs.push(variant.alias(PACKED_COLUMN_NAME));

    for cond in &mut join.conditions {
        let position = build_key_position(&cond.right, &build_bindings)?;
        let slot = keys.iter().position(|&k| k == position).ok_or_else(|| {
            OptimizerError::Internal(format!("build key {} was not re-projected", cond.right))
        })?;
        cond.right = Expr::column(
            ColumnBinding::new(packing_index, slot),
            build_types[position].clone(),
            build_names[position].clone(),
        );
    }

    let build = std::mem::take(&mut join.right);
    join.right = Box::new(LogicalOperator::Projection(ProjectionOperator {
        table_index: packing_index,
        input: build,
        exprs: packing_exprs,
    }));
    let right_map = join.right_projection_map.take();

    let reconstruction_index = alloc.allocate();
    let mut output = probe_columns(&join);

    let packed_ref = Expr::column(
        ColumnBinding::new(packing_index, keys.len()),
        DataType::Variant,
        PACKED_COLUMN_NAME,
    );
    let logical_positions = right_map.unwrap_or_else(|| (0..build_bindings.len()).collect());
    for position in logical_positions {
        let target = build_types.get(position).ok_or_else(|| {
            OptimizerError::Internal(format!(
                "build projection map position {} out of range for {} columns",
                position,
                build_types.len()
            ))
        })?;
        let extract = catalog.bind_scalar(
            VARIANT_EXTRACT,
            vec![packed_ref.clone(), Expr::lit_str(field_name(position))],
        )?;
        let restored = catalog.bind_cast(extract.try_or_null(), target)?;
        output.push(restored.alias(build_names[position].clone()));
    }

    Ok(SparseBuildRewrite {
        operator: LogicalOperator::Projection(ProjectionOperator {
            table_index: reconstruction_index,
            input: Box::new(LogicalOperator::ComparisonJoin(join)),
            exprs: output,
        }),
        packing_index,
        reconstruction_index,
        packed_columns: build_bindings.len(),
        key_columns: keys.len(),
    })
}

fn build_key_position(key: &Expr, build_bindings: &[ColumnBinding]) -> OptimizerResult<usize> {
    let Expr::ColumnRef(column) = key else {
        return Err(OptimizerError::Internal(format!(
            "build key {} is not a column reference",
            key
        )));
    };
    build_bindings
        .iter()
        .position(|b| *b == column.binding)
        .ok_or_else(|| {
            OptimizerError::Internal(format!(
                "build key {} is not produced by the build side",
                key
            ))
        })
}

/// References to the probe side's logical outputs, in join output order.
fn probe_columns(join: &ComparisonJoinOperator) -> Vec<Expr> {
    let bindings = join.left_bindings();
    let types = apply_projection_map(join.left.types(), &join.left_projection_map);
    let names = apply_projection_map(join.left.column_names(), &join.left_projection_map);
    bindings
        .into_iter()
        .zip(types)
        .zip(names)
        .map(|((binding, ty), name)| Expr::column(binding, ty, name))
        .collect()
}
