//! Reporting utilities: formatted terminal output for fitted models.

pub mod format;

pub use format::{format_fit_summary, format_model};
