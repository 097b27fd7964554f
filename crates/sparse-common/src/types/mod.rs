//! Type definitions shared by the plan and optimizer crates.
//!
//! This module contains the identifier types used to name plan nodes and
//! their output columns.

mod ids;

pub use ids::{ColumnBinding, TableIndex, TableIndexAllocator};
