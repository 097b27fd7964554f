//! Bound logical query plans.
//!
//! This module defines the logical plan tree the optimizer rewrites. Plans
//! are fully bound: expressions reference operator outputs by column binding
//! and carry their types, so rules can restructure the tree without a
//! catalog of table schemas.

mod builder;
mod expr;
mod operator;
mod plan;
mod schema;

pub use builder::*;
pub use expr::*;
pub use operator::*;
pub use plan::*;
pub use schema::*;
