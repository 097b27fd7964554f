//! Data types and runtime values.

mod data_type;
mod value;
mod variant;

pub use data_type::{DataType, StructField};
pub use value::Value;
pub use variant::VariantValue;
