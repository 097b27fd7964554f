//! Error handling for the sparse-build planner.
//!
//! This module provides a unified error type and result alias used
//! across the planner crates.

mod planner;

pub use planner::{ErrorCode, SparseError};

/// Result type alias for planner operations.
pub type SparseResult<T> = std::result::Result<T, SparseError>;
