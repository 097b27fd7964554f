//! Reference executor for bound logical plans.
//!
//! Plans are interpreted directly over in-memory tables. Every operator
//! produces a `Vec<Row>` whose positions follow the operator's
//! `column_bindings()`, so expressions are evaluated through a
//! binding-to-position layout.
//!
//! The executor exists to check that optimizer rewrites preserve query
//! results: run a plan before and after optimization and compare the rows.
//!
//! # Example
//!
//! ```ignore
//! use sparse_sql::executor::{execute_plan, ExecutionContext, MemTable};
//!
//! let mut ctx = ExecutionContext::new();
//! ctx.register_table("t", MemTable::new(schema, rows)?);
//! let result = execute_plan(&plan, &ctx)?;
//! for row in &result.rows {
//!     println!("{}", row);
//! }
//! ```

mod evaluator;
mod operators;
mod row;

pub use evaluator::*;
pub use operators::*;
pub use row::*;
