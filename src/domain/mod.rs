//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - censored/truncated observations (`Interval`, `Responses`)
//! - expert family identifiers (`ExpertKind`)
//! - fitting configuration (`FitConfig`, `PenaltyConfig`, `MStepOptions`)
//! - fit outputs (`FittingResult`, `FitStatus`, `UpdateFailure`)

pub mod types;

pub use types::*;
