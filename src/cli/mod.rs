//! Command-line parsing for the LRMoE fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "lrmoe", version, about = "Logit-reduced mixture-of-experts fitting (ECM)")]
pub struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Simulate the two-component reference scenario and fit it from a perturbed start.
    Demo(FitArgs),
    /// Print a previously exported result JSON.
    Report(ReportArgs),
}

/// Options for simulating and fitting.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Number of simulated observations.
    #[arg(short = 'n', long, default_value_t = 10_000)]
    pub n: usize,

    /// Random seed for covariates and responses.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Relative penalized log-likelihood change that counts as converged.
    #[arg(long, default_value_t = 1e-6)]
    pub tolerance: f64,

    /// Maximum number of ECM iterations.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,

    /// IRLS sweeps over the gating components per iteration.
    #[arg(long, default_value_t = 5)]
    pub gating_newton_steps: usize,

    /// Iteration cap for expert updates without a closed form (L-BFGS).
    #[arg(long, default_value_t = 20)]
    pub expert_newton_steps: usize,

    /// Fit the plain likelihood (no gating/expert priors).
    #[arg(long)]
    pub no_penalty: bool,

    /// Standard deviation of the normal prior on gating coefficients.
    #[arg(long, default_value_t = 5.0)]
    pub gating_sd: f64,

    /// Stop after this many seconds (checked between iterations).
    #[arg(long)]
    pub time_budget_secs: Option<f64>,

    /// Export the fitted model and diagnostics to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

/// Options for printing a saved result.
#[derive(Debug, Parser)]
pub struct ReportArgs {
    /// Result JSON file produced by `lrmoe demo --export`.
    #[arg(long, value_name = "JSON")]
    pub result: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_defaults() {
        let cli = Cli::parse_from(["lrmoe", "demo"]);
        assert_eq!(cli.log_level, tracing::Level::WARN);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.n, 10_000);
        assert_eq!(args.max_iterations, 200);
        assert!(!args.no_penalty);
        assert!(args.export.is_none());
    }

    #[test]
    fn global_log_level_after_subcommand() {
        let cli = Cli::parse_from(["lrmoe", "report", "--result", "fit.json", "--log-level", "debug"]);
        assert_eq!(cli.log_level, tracing::Level::DEBUG);
        let Command::Report(args) = cli.command else {
            panic!("expected report");
        };
        assert_eq!(args.result, PathBuf::from("fit.json"));
    }
}
