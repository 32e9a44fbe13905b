//! Model fitting.
//!
//! Responsibilities:
//!
//! - validate inputs (`FitData`)
//! - compute responsibilities and latent truncation mass (E-step)
//! - run the ECM loop: gating update, parallel expert updates, convergence
//! - build starting models from sample moments

pub mod data;
pub mod ecm;
pub mod estep;
pub mod init;

pub use data::FitData;
pub use ecm::{fit, fit_model};
pub use estep::{Posterior, e_step, split_zero_mass};
pub use init::moment_init;
