//! # sparse-common
//!
//! Common types, errors, and configuration for the sparse-build planner.
//!
//! This crate provides the foundational types used across the planner
//! crates. It includes:
//!
//! - **Types**: Plan node identities (`TableIndex`), column bindings and the
//!   fresh-index allocator
//! - **Errors**: Unified error handling with `SparseError`
//! - **Config**: Optimizer configuration structures
//!
//! ## Example
//!
//! ```rust
//! use sparse_common::types::{ColumnBinding, TableIndex, TableIndexAllocator};
//! use sparse_common::error::SparseResult;
//!
//! fn example() -> SparseResult<()> {
//!     let alloc = TableIndexAllocator::after(Some(TableIndex::new(4)));
//!     let binding = ColumnBinding::new(alloc.allocate(), 0);
//!     assert_eq!(binding.table_index, TableIndex::new(5));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::{OptimizerConfig, SparseBuildConfig};
pub use error::{ErrorCode, SparseError, SparseResult};
pub use types::{ColumnBinding, TableIndex, TableIndexAllocator};
