//! # sparse-sql
//!
//! Bound logical plans, the function catalog, the query optimizer and a
//! reference executor.
//!
//! This crate implements:
//! - Runtime values, including structs and sparse variants
//! - Bound logical plans addressed by column bindings
//! - A function catalog that binds scalar calls and casts
//! - Rule-based optimization, including sparse build-side packing for wide
//!   left joins
//! - An in-memory executor for checking rewrites end to end

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Data types and values
pub mod types;

/// Logical plan representation
pub mod logical;

/// Function catalog
pub mod catalog;

/// Query optimizer
pub mod optimizer;

/// Query execution
pub mod executor;
