//! Numerical utilities: log-space arithmetic, normal tails, linear solves and
//! a bounded L-BFGS maximizer.

pub mod linalg;
pub mod logspace;
pub mod normal;
pub mod optim;

pub use linalg::*;
pub use logspace::*;
pub use optim::{MaximizeOptions, MaximizeOutcome, maximize};
