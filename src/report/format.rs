//! Formatted terminal output for a finished fit.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays free of presentation concerns
//! - output changes are localized

use crate::domain::{FitStatus, FittingResult};
use crate::model::Model;

/// Format the full fit summary (status, diagnostics, gating, experts).
pub fn format_fit_summary(result: &FittingResult) -> String {
    let mut out = String::new();

    out.push_str("=== lrmoe - LRMoE fit ===\n");
    out.push_str(&format!(
        "Status: {} after {} iteration(s)\n",
        status_label(result.status),
        result.iterations
    ));
    out.push_str(&format!(
        "Data: n={} | dims={} | components={}\n",
        result.n_obs,
        result.model.n_dims(),
        result.model.n_components()
    ));

    out.push_str("\nDiagnostics:\n");
    out.push_str(&format!("- loglik          : {:.4}\n", result.loglik));
    out.push_str(&format!("- penalized loglik: {:.4}\n", result.penalized_loglik));
    out.push_str(&format!("- AIC             : {:.4}\n", result.aic));
    out.push_str(&format!("- BIC             : {:.4}\n", result.bic));
    out.push_str(&format!("- free parameters : {}\n", result.n_params));

    out.push('\n');
    out.push_str(&format_model(&result.model));

    if !result.failures.is_empty() {
        out.push_str(&format!("\nSkipped expert updates ({}):\n", result.failures.len()));
        for f in &result.failures {
            out.push_str(&format!(
                "- iter {:>4} dim {} comp {}: {}\n",
                f.iteration,
                f.dim,
                f.component,
                truncate(&f.message, 80)
            ));
        }
    }

    out
}

/// Format gating coefficients and the expert matrix.
pub fn format_model(model: &Model) -> String {
    let mut out = String::new();

    out.push_str("Gating coefficients (last component is the reference):\n");
    for (j, row) in model.gating().coefficients().row_iter().enumerate() {
        let vals: Vec<f64> = row.iter().copied().collect();
        out.push_str(&format!("  comp {j:<3} {}\n", fmt_vec(&vals)));
    }

    out.push_str("\nExperts:\n");
    out.push_str(
        format!(
            "{:<5} {:<5} {:<20} {:>12} {:<40}\n",
            "dim", "comp", "family", "mean", "params"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<5} {:-<5} {:-<20} {:-<12} {:-<40}\n", "", "", "", "", "").trim_end());
    out.push('\n');

    for (d, row) in model.experts().rows().iter().enumerate() {
        for (j, expert) in row.iter().enumerate() {
            let kind = expert.kind();
            let params: Vec<String> = kind
                .param_names()
                .iter()
                .zip(expert.params())
                .map(|(name, v)| format!("{name}={v:.6}"))
                .collect();
            out.push_str(
                format!(
                    "{:<5} {:<5} {:<20} {:>12.4} {:<40}\n",
                    d,
                    j,
                    truncate(kind.display_name(), 20),
                    expert.mean(),
                    params.join(" ")
                )
                .trim_end(),
            );
            out.push('\n');
        }
    }

    out
}

fn status_label(status: FitStatus) -> &'static str {
    match status {
        FitStatus::Converged => "converged",
        FitStatus::IterationLimitReached => "iteration limit reached",
    }
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
