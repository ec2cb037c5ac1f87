//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - runs the fit pipeline and prints the report
//! - writes optional exports
//! - generates toy event files

use clap::Parser;

use crate::cli::{Cli, Command, FitArgs, GenerateArgs};
use crate::data::{SampleConfig, generate_sample};
use crate::domain::{FitConfig, MinimizerConfig};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `kinfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    // stdout carries the report; logs go to stderr.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Generate(args) => handle_generate(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let run = pipeline::run_fit(&args.input, &config)?;

    println!("{}", crate::report::format_run_summary(&run.stats, &config));
    if config.top_n > 0 {
        println!("{}", crate::report::format_worst(&run.stats.worst));
    }

    // Optional exports.
    if let Some(path) = &args.export {
        crate::io::write_results_csv(path, &run.batch.fits)?;
        tracing::info!(path = %path.display(), "wrote per-event results");
    }
    if let Some(path) = &args.summary {
        crate::io::write_summary_json(path, &args.input, &run.stats, &config)?;
        tracing::info!(path = %path.display(), "wrote run summary");
    }

    Ok(())
}

fn handle_generate(args: GenerateArgs) -> Result<(), AppError> {
    let config = sample_config_from_args(&args);
    let events = generate_sample(&config)?;
    crate::io::write_events_csv(&args.output, &events)?;
    println!("Wrote {} events to {}", events.len(), args.output.display());
    Ok(())
}

/// Build the run configuration from `fit` flags, rejecting unusable values.
pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, AppError> {
    let positive = |name: &str, v: f64| {
        if v.is_finite() && v > 0.0 {
            Ok(v)
        } else {
            Err(AppError::usage(format!("`--{name}` must be a finite number > 0 (got {v}).")))
        }
    };
    if args.max_iterations == 0 || args.max_calls == 0 {
        return Err(AppError::usage("`--max-iterations` and `--max-calls` must be > 0."));
    }

    Ok(FitConfig {
        minimizer: MinimizerConfig {
            step: positive("step", args.step)?,
            max_iterations: args.max_iterations,
            max_calls: args.max_calls,
            edm_tolerance: positive("edm-tolerance", args.edm_tolerance)?,
            error_def: positive("error-def", args.error_def)?,
        },
        skip_swapped: args.skip_swapped,
        parallel: !args.sequential,
        top_n: args.top,
    })
}

pub fn sample_config_from_args(args: &GenerateArgs) -> SampleConfig {
    SampleConfig {
        events: args.events,
        seed: args.seed,
        top_mass: args.top_mass,
        jet_smearing: args.jet_smearing,
        lepton_smearing: args.lepton_smearing,
        met_noise: args.met_noise,
        ..SampleConfig::default()
    }
}
