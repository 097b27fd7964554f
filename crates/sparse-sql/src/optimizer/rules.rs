//! General-purpose optimization rules.

use super::{OptimizerContext, OptimizerResult, OptimizerRule};
use crate::logical::{BinaryOp, Expr, LogicalOperator, LogicalPlan, UnaryOp};
use crate::types::Value;

// ============================================================================
// Constant Folding Rule
// ============================================================================

/// Evaluates constant expressions at planning time.
///
/// Folding never changes the type of an expression, so only operations whose
/// literal result has the operator's declared type are folded. A filter whose
/// predicate folds to `true` is removed.
///
/// # Example
///
/// Before: `SELECT 1 + 2, a FROM t WHERE 1 = 1`
/// After: `SELECT 3, a FROM t`
#[derive(Debug)]
pub struct ConstantFoldingRule;

impl OptimizerRule for ConstantFoldingRule {
    fn name(&self) -> &str {
        "ConstantFolding"
    }

    fn optimize(
        &self,
        plan: &mut LogicalPlan,
        _ctx: &OptimizerContext<'_>,
    ) -> OptimizerResult<bool> {
        Ok(self.fold_constants(&mut plan.root))
    }
}

impl ConstantFoldingRule {
    fn fold_constants(&self, op: &mut LogicalOperator) -> bool {
        let mut changed = false;
        for child in op.children_mut() {
            changed |= self.fold_constants(child);
        }

        for expr in op.expressions_mut() {
            let folded = self.fold_expr(expr);
            if folded != *expr {
                *expr = folded;
                changed = true;
            }
        }

        let always_true = matches!(
            op,
            LogicalOperator::Filter(filter)
                if matches!(filter.predicate, Expr::Literal(Value::Boolean(true)))
        );
        if always_true {
            if let LogicalOperator::Filter(filter) = std::mem::take(op) {
                *op = *filter.input;
            }
            changed = true;
        }

        changed
    }

    fn fold_expr(&self, expr: &Expr) -> Expr {
        match expr {
            Expr::BinaryOp { left, op, right } => {
                let left_folded = self.fold_expr(left);
                let right_folded = self.fold_expr(right);

                // Try to fold if both sides are literals
                if let (Expr::Literal(l), Expr::Literal(r)) = (&left_folded, &right_folded) {
                    if let Some(result) = self.fold_binary_literals(l, *op, r) {
                        return Expr::Literal(result);
                    }
                }

                Expr::BinaryOp {
                    left: Box::new(left_folded),
                    op: *op,
                    right: Box::new(right_folded),
                }
            }

            Expr::UnaryOp { op, expr: inner } => {
                let folded = self.fold_expr(inner);
                if let Expr::Literal(lit) = &folded {
                    if let Some(result) = self.fold_unary_literal(*op, lit) {
                        return Expr::Literal(result);
                    }
                }
                Expr::UnaryOp {
                    op: *op,
                    expr: Box::new(folded),
                }
            }

            Expr::Alias { expr: inner, name } => Expr::Alias {
                expr: Box::new(self.fold_expr(inner)),
                name: name.clone(),
            },

            Expr::IsNull(inner) => match self.fold_expr(inner) {
                Expr::Literal(v) => Expr::Literal(Value::Boolean(v.is_null())),
                other => Expr::IsNull(Box::new(other)),
            },

            Expr::IsNotNull(inner) => match self.fold_expr(inner) {
                Expr::Literal(v) => Expr::Literal(Value::Boolean(!v.is_null())),
                other => Expr::IsNotNull(Box::new(other)),
            },

            // Other expressions - no folding
            _ => expr.clone(),
        }
    }

    fn fold_binary_literals(&self, left: &Value, op: BinaryOp, right: &Value) -> Option<Value> {
        match (left, op, right) {
            // Integer arithmetic
            (Value::BigInt(l), BinaryOp::Plus, Value::BigInt(r)) => {
                l.checked_add(*r).map(Value::BigInt)
            }
            (Value::BigInt(l), BinaryOp::Minus, Value::BigInt(r)) => {
                l.checked_sub(*r).map(Value::BigInt)
            }
            (Value::BigInt(l), BinaryOp::Multiply, Value::BigInt(r)) => {
                l.checked_mul(*r).map(Value::BigInt)
            }
            (Value::BigInt(l), BinaryOp::Modulo, Value::BigInt(r)) if *r != 0 => {
                l.checked_rem(*r).map(Value::BigInt)
            }

            // Integer comparisons
            (Value::BigInt(l), BinaryOp::Eq, Value::BigInt(r)) => Some(Value::Boolean(l == r)),
            (Value::BigInt(l), BinaryOp::NotEq, Value::BigInt(r)) => Some(Value::Boolean(l != r)),
            (Value::BigInt(l), BinaryOp::Lt, Value::BigInt(r)) => Some(Value::Boolean(l < r)),
            (Value::BigInt(l), BinaryOp::LtEq, Value::BigInt(r)) => Some(Value::Boolean(l <= r)),
            (Value::BigInt(l), BinaryOp::Gt, Value::BigInt(r)) => Some(Value::Boolean(l > r)),
            (Value::BigInt(l), BinaryOp::GtEq, Value::BigInt(r)) => Some(Value::Boolean(l >= r)),

            // Boolean operations
            (Value::Boolean(l), BinaryOp::And, Value::Boolean(r)) => Some(Value::Boolean(*l && *r)),
            (Value::Boolean(l), BinaryOp::Or, Value::Boolean(r)) => Some(Value::Boolean(*l || *r)),

            // String concatenation
            (Value::String(l), BinaryOp::Concat, Value::String(r)) => {
                Some(Value::String(format!("{}{}", l, r)))
            }

            // String comparisons
            (Value::String(l), BinaryOp::Eq, Value::String(r)) => Some(Value::Boolean(l == r)),
            (Value::String(l), BinaryOp::NotEq, Value::String(r)) => Some(Value::Boolean(l != r)),

            _ => None,
        }
    }

    fn fold_unary_literal(&self, op: UnaryOp, lit: &Value) -> Option<Value> {
        match (op, lit) {
            (UnaryOp::Not, Value::Boolean(b)) => Some(Value::Boolean(!b)),
            (UnaryOp::Minus, Value::BigInt(i)) => i.checked_neg().map(Value::BigInt),
            (UnaryOp::Minus, Value::Double(f)) => Some(Value::Double(-f)),
            _ => None,
        }
    }
}
