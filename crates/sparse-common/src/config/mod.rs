//! Configuration for the sparse-build planner.
//!
//! This module provides configuration structures for the optimizer and
//! its rules.

mod optimizer;

pub use optimizer::{OptimizerConfig, SettingDescriptor, SparseBuildConfig};
