//! Input/output helpers.
//!
//! - fitted-result JSON read/write (`result`)

pub mod result;

pub use result::*;
