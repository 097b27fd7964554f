//! Planner error types.

use std::fmt;
use thiserror::Error;

use crate::types::ColumnBinding;

/// Numeric error codes. The high byte selects the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid argument provided.
    InvalidArgument = 0x0002,
    /// A configuration value is out of range.
    InvalidConfig = 0x0003,

    // Binding errors (0x0100 - 0x01FF)
    /// Function not found in the catalog.
    FunctionNotFound = 0x0100,
    /// No cast exists between two types.
    NoCastPath = 0x0101,
    /// Type mismatch.
    TypeMismatch = 0x0102,
    /// Column reference does not resolve.
    UnresolvedBinding = 0x0103,

    // Planning errors (0x0200 - 0x02FF)
    /// Query planning failed.
    PlanningFailed = 0x0200,
    /// An optimizer rule failed.
    RuleFailed = 0x0201,

    // Execution errors (0x0300 - 0x03FF)
    /// Query execution failed.
    ExecutionFailed = 0x0300,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Binding",
            0x02 => "Planning",
            0x03 => "Execution",
            _ => "Other",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for the planner.
///
/// Each layer (catalog binding, optimization, execution) has its own error
/// enum; all of them convert into this type so callers can handle one.
///
/// # Example
///
/// ```rust
/// use sparse_common::error::{ErrorCode, SparseError, SparseResult};
///
/// fn lookup(name: &str) -> SparseResult<()> {
///     Err(SparseError::FunctionNotFound { name: name.to_string() })
/// }
///
/// assert_eq!(lookup("nope").unwrap_err().code(), ErrorCode::FunctionNotFound);
/// ```
#[derive(Debug, Error)]
pub enum SparseError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Binding Errors
    // ==========================================================================
    /// Function not found.
    #[error("function '{name}' not found")]
    FunctionNotFound {
        /// Function name.
        name: String,
    },

    /// No cast path between two types.
    #[error("cannot cast {from} to {to}")]
    NoCastPath {
        /// Source type.
        from: String,
        /// Target type.
        to: String,
    },

    /// Type mismatch.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type.
        expected: String,
        /// Actual type.
        actual: String,
    },

    /// A column reference that no operator produces.
    #[error("unresolved column binding {binding}")]
    UnresolvedBinding {
        /// The dangling binding.
        binding: ColumnBinding,
    },

    // ==========================================================================
    // Planning Errors
    // ==========================================================================
    /// Query planning failed.
    #[error("planning failed: {message}")]
    PlanningFailed {
        /// Error message.
        message: String,
    },

    /// An optimizer rule failed.
    #[error("rule '{rule}' failed: {message}")]
    RuleFailed {
        /// Rule name.
        rule: String,
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Execution Errors
    // ==========================================================================
    /// Query execution failed.
    #[error("execution failed: {message}")]
    ExecutionFailed {
        /// Error message.
        message: String,
    },
}

impl SparseError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::FunctionNotFound { .. } => ErrorCode::FunctionNotFound,
            Self::NoCastPath { .. } => ErrorCode::NoCastPath,
            Self::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            Self::UnresolvedBinding { .. } => ErrorCode::UnresolvedBinding,
            Self::PlanningFailed { .. } => ErrorCode::PlanningFailed,
            Self::RuleFailed { .. } => ErrorCode::RuleFailed,
            Self::ExecutionFailed { .. } => ErrorCode::ExecutionFailed,
        }
    }

    /// Returns true if this error indicates a defect in the planner itself
    /// rather than a problem with the query.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. } | Self::UnresolvedBinding { .. })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a planning error.
    #[must_use]
    pub fn planning(message: impl Into<String>) -> Self {
        Self::PlanningFailed {
            message: message.into(),
        }
    }

    /// Creates an execution error.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TableIndex;

    #[test]
    fn test_error_code() {
        let err = SparseError::FunctionNotFound {
            name: "struct_pack".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::FunctionNotFound);
        assert_eq!(err.code().category(), "Binding");
        assert_eq!(ErrorCode::RuleFailed.category(), "Planning");
        assert_eq!(ErrorCode::ExecutionFailed.as_u16(), 0x0300);
    }

    #[test]
    fn test_error_display() {
        let err = SparseError::NoCastPath {
            from: "STRUCT".to_string(),
            to: "INT".to_string(),
        };
        assert_eq!(err.to_string(), "cannot cast STRUCT to INT");

        let err = SparseError::UnresolvedBinding {
            binding: ColumnBinding::new(TableIndex::new(3), 1),
        };
        assert_eq!(err.to_string(), "unresolved column binding #[3.1]");
    }

    #[test]
    fn test_internal() {
        assert!(SparseError::internal("boom").is_internal());
        assert!(!SparseError::planning("bad plan").is_internal());
        assert_eq!(
            SparseError::invalid_config("x").code(),
            ErrorCode::InvalidConfig
        );
    }
}
