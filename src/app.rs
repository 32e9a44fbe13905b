//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - installs the log subscriber
//! - runs the demo fit or prints a saved result
//! - writes optional exports

use std::time::Duration;

use clap::Parser;

use crate::cli::{Cli, Command, FitArgs, ReportArgs};
use crate::domain::{FitConfig, PenaltyConfig};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `lrmoe` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    // Library code logs through `log`; the fmt subscriber picks those records up.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .init();

    match cli.command {
        Command::Demo(args) => handle_demo(args),
        Command::Report(args) => handle_report(args),
    }
}

fn handle_demo(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let run = pipeline::run_demo(args.n, args.seed, &config)?;

    println!("{}", crate::report::format_fit_summary(&run.result));

    if let Some(path) = &args.export {
        crate::io::write_result_json(path, &run.result)?;
        tracing::info!("wrote {}", path.display());
    }

    Ok(())
}

fn handle_report(args: ReportArgs) -> Result<(), AppError> {
    let file = crate::io::read_result_json(&args.result)?;
    let result = file.to_result()?;

    println!("Saved: {} ({})", file.created_at.to_rfc3339(), file.tool);
    println!("{}", crate::report::format_fit_summary(&result));
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, AppError> {
    let time_budget = match args.time_budget_secs {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(secs) => {
            return Err(AppError::new(
                2,
                format!("--time-budget-secs must be finite and >= 0, got {secs}"),
            ));
        }
        None => None,
    };
    if !(args.gating_sd.is_finite() && args.gating_sd > 0.0) {
        return Err(AppError::new(
            2,
            format!("--gating-sd must be finite and > 0, got {}", args.gating_sd),
        ));
    }

    Ok(FitConfig {
        tolerance: args.tolerance,
        max_iterations: args.max_iterations,
        gating_newton_steps: args.gating_newton_steps,
        expert_newton_steps: args.expert_newton_steps,
        penalty: PenaltyConfig {
            enabled: !args.no_penalty,
            gating_sd: args.gating_sd,
        },
        time_budget,
    })
}
