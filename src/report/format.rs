//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{FitConfig, FitStatus};
use crate::report::{MeanRms, RankedFit, RunStats};

/// Format the full run summary (counts, mass summaries, worst fits).
pub fn format_run_summary(stats: &RunStats, config: &FitConfig) -> String {
    let mut out = String::new();

    out.push_str("=== kinfit - semileptonic top-pair kinematic fit ===\n");
    out.push_str(&format!(
        "Events: read={} | fitted={} | rejected={} | skipped={}",
        stats.events_read, stats.fitted, stats.rejected, stats.skipped
    ));
    if stats.row_errors > 0 {
        out.push_str(&format!(" | bad rows={}", stats.row_errors));
    }
    out.push('\n');
    out.push_str(&format!(
        "Minimizer: step={} | max iterations={} | max calls={} | edm tolerance={:e}\n",
        config.minimizer.step,
        config.minimizer.max_iterations,
        config.minimizer.max_calls,
        config.minimizer.edm_tolerance
    ));

    out.push_str("\nFit status:\n");
    for c in &stats.status_counts {
        if c.count > 0 || c.status == FitStatus::Converged {
            out.push_str(&format!("  {:<20} {}\n", c.status.label(), c.count));
        }
    }

    out.push_str("\nBranch assignment:\n");
    out.push_str(&format!(
        "  pairing 0 (first tagged jet leptonic) {}\n  pairing 1 (first tagged jet hadronic) {}\n",
        stats.pairing_counts[0], stats.pairing_counts[1]
    ));
    out.push_str(&format!("  disagreements with truth {}\n", stats.disagreements));

    out.push_str("\nMasses (GeV):\n");
    out.push_str(&format_mean_rms("pre-fit top", stats.prefit_top_mass));
    out.push_str(&format_mean_rms("fitted top", stats.fitted_top_mass));
    out.push_str(&format_mean_rms("lep. top (pre-fit nu)", stats.leptonic_top_mass_prefit_neutrino));

    out.push_str("\nChi-square (converged):\n");
    out.push_str(&format_mean_rms("chi2", stats.chi2));
    if let Some(median) = stats.median_chi2 {
        out.push_str(&format!("  {:<22} {median:.3}\n", "median"));
    }
    out.push('\n');

    out
}

/// Format the worst-chi² table.
pub fn format_worst(rows: &[RankedFit]) -> String {
    let mut out = String::new();

    out.push_str("Worst fits (highest chi2):\n");
    out.push_str(
        format!(
            "{:<10} {:>12} {:>10} {:>8} {:<20}",
            "event", "chi2", "m_top", "pairing", "status"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<10} {:-<12} {:-<10} {:-<8} {:-<20}", "", "", "", "", "").trim_end());
    out.push('\n');

    for r in rows {
        out.push_str(
            format!(
                "{:<10} {:>12.3} {:>10.2} {:>8} {:<20}",
                r.id,
                r.chi2,
                r.top_mass,
                r.pairing.index(),
                r.status.label()
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn format_mean_rms(name: &str, value: Option<MeanRms>) -> String {
    match value {
        Some(s) => format!("  {name:<22} {:.3} ± {:.3} (n={})\n", s.mean, s.rms, s.n),
        None => format!("  {name:<22} n/a\n"),
    }
}
