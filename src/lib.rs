//! `lrmoe` library crate.
//!
//! Logit-reduced mixture-of-experts regression fit by ECM on censored and
//! truncated multivariate responses.
//!
//! The binary (`lrmoe`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the fitting engine is usable without the CLI

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod experts;
pub mod fit;
pub mod gating;
pub mod io;
pub mod math;
pub mod model;
pub mod report;
