//! Function catalog.
//!
//! Binding turns a function name plus bound arguments into a typed
//! [`Expr`]. The catalog resolves the return type and attaches the per-call
//! [`BindData`](crate::logical::BindData) the executor needs, so rewrites can
//! synthesize calls without knowing how individual functions are typed.

mod cast;
mod functions;

pub use cast::can_cast;
pub use functions::{
    Arity, BindOutput, BuiltinCatalog, ScalarFunction, STRUCT_PACK, STRUCT_TO_SPARSE_VARIANT,
    VARIANT_EXTRACT,
};

use std::fmt;

use sparse_common::SparseError;
use thiserror::Error;

use crate::logical::Expr;
use crate::types::DataType;

/// Errors raised while binding a function call or cast.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    /// No function with this name is registered.
    #[error("function '{0}' not found")]
    UnknownFunction(String),

    /// The call has the wrong number of arguments.
    #[error("function '{name}' expects {expected} arguments, got {actual}")]
    WrongArity {
        /// Function name.
        name: String,
        /// Accepted argument count.
        expected: Arity,
        /// Argument count of the call.
        actual: usize,
    },

    /// An argument has a type or shape the function rejects.
    #[error("invalid argument for '{name}': {message}")]
    InvalidArgument {
        /// Function name.
        name: String,
        /// What is wrong with the argument.
        message: String,
    },

    /// The cast table has no entry for this pair of types.
    #[error("no cast path from {from} to {to}")]
    NoCastPath {
        /// Source type.
        from: DataType,
        /// Target type.
        to: DataType,
    },

    /// Two `struct_pack` arguments share an alias.
    #[error("duplicate field '{field}' in struct_pack")]
    DuplicateField {
        /// The repeated field name.
        field: String,
    },
}

impl BindError {
    pub(crate) fn invalid_argument(name: &str, message: impl Into<String>) -> Self {
        BindError::InvalidArgument {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

impl From<BindError> for SparseError {
    fn from(err: BindError) -> Self {
        match err {
            BindError::UnknownFunction(name) => SparseError::FunctionNotFound { name },
            BindError::NoCastPath { from, to } => SparseError::NoCastPath {
                from: from.to_string(),
                to: to.to_string(),
            },
            other => SparseError::invalid_argument(other.to_string()),
        }
    }
}

/// Catalog bind service used by the planner and optimizer rules.
pub trait FunctionCatalog: fmt::Debug + Send + Sync {
    /// Binds a scalar function call.
    fn bind_scalar(&self, name: &str, args: Vec<Expr>) -> Result<Expr, BindError>;

    /// Binds a cast of `expr` to `target`.
    ///
    /// Casting to the expression's own type returns it unchanged.
    fn bind_cast(&self, expr: Expr, target: &DataType) -> Result<Expr, BindError> {
        let source = expr.data_type();
        if &source == target {
            return Ok(expr);
        }
        if !can_cast(&source, target) {
            return Err(BindError::NoCastPath {
                from: source,
                to: target.clone(),
            });
        }
        Ok(expr.cast_to(target.clone()))
    }
}
