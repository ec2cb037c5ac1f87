//! Command-line parsing for the kinematic fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the physics/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "kinfit", version, about = "Semileptonic top-pair kinematic fitter")]
pub struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error). Logs go to stderr.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit every event of an input CSV, print a run summary and optionally export results.
    Fit(FitArgs),
    /// Generate toy events in the input CSV layout.
    Generate(GenerateArgs),
}

/// Options for `kinfit fit`.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Event CSV (`event,object,pt,eta,phi,label,truth,truth_pt`).
    #[arg(short, long, value_name = "CSV")]
    pub input: PathBuf,

    /// Export per-event results to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// Write the run summary to JSON.
    #[arg(long, value_name = "JSON")]
    pub summary: Option<PathBuf>,

    /// Initial step size for every fit parameter.
    #[arg(long, default_value_t = 0.01)]
    pub step: f64,

    /// Minimizer iteration budget per event.
    #[arg(long, default_value_t = 1000)]
    pub max_iterations: usize,

    /// Objective-evaluation budget per event.
    #[arg(long, default_value_t = 20_000)]
    pub max_calls: usize,

    /// Convergence threshold on the estimated distance to minimum.
    #[arg(long, default_value_t = 1e-4)]
    pub edm_tolerance: f64,

    /// Chi-square increase defining one standard deviation.
    #[arg(long, default_value_t = 1.0)]
    pub error_def: f64,

    /// Drop events whose tagged jets the resolver assigns as pairing 1.
    #[arg(long)]
    pub skip_swapped: bool,

    /// Fit events one after another instead of in parallel.
    #[arg(long)]
    pub sequential: bool,

    /// Show the N worst-chi2 events.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

/// Options for `kinfit generate`.
#[derive(Debug, Parser, Clone)]
pub struct GenerateArgs {
    /// Output event CSV.
    #[arg(short, long, value_name = "CSV")]
    pub output: PathBuf,

    /// Number of events.
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub events: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Generated top mass (GeV).
    #[arg(long, default_value_t = 172.5)]
    pub top_mass: f64,

    /// Fractional jet pT smearing.
    #[arg(long, default_value_t = 0.1)]
    pub jet_smearing: f64,

    /// Fractional lepton pT smearing.
    #[arg(long, default_value_t = 0.01)]
    pub lepton_smearing: f64,

    /// Unclustered MET noise per component (GeV).
    #[arg(long, default_value_t = 10.0)]
    pub met_noise: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_defaults_match_documented_values() {
        let cli = Cli::parse_from(["kinfit", "fit", "--input", "events.csv"]);
        assert_eq!(cli.log_level, tracing::Level::WARN);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit subcommand");
        };
        assert_eq!(args.step, 0.01);
        assert_eq!(args.max_iterations, 1000);
        assert_eq!(args.max_calls, 20_000);
        assert_eq!(args.edm_tolerance, 1e-4);
        assert!(!args.skip_swapped && !args.sequential);
    }

    #[test]
    fn log_level_is_global() {
        let cli = Cli::parse_from(["kinfit", "generate", "-o", "out.csv", "--log-level", "debug", "--seed", "3"]);
        assert_eq!(cli.log_level, tracing::Level::DEBUG);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate subcommand");
        };
        assert_eq!(args.seed, 3);
        assert_eq!(args.events, 1000);
    }
}
