//! Value model for records
//!
//! - **`Scalar`** - a hashable, non-null column value
//! - **`AttrValue`** - null, scalar, or array attribute value
//! - **`Record`** - attribute bag with dirty tracking and persistence state

pub mod record;
pub mod types;

pub use record::Record;
pub use types::{AttrValue, Scalar};
