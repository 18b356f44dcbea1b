//! wtheta: angular correlation functions from ASCII footprints and catalogs.
//!
//! Reads a pixelized footprint and a point catalog, measures w(θ) with
//! optional jackknife covariance, and writes two ASCII tables.
//!
//! Exit codes: 0 success, 1 usage or invalid input, 2 invalid pixel
//! identifier, 3 regionation failure.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use skystat_core::SkyError;
use skystat_correlate::bins::AngularCorrelation;
use skystat_correlate::correlator::{auto_correlate, default_region_count, CorrelationConfig};
use skystat_correlate::io::{read_catalog, read_footprint, write_covariance, write_wtheta, CatalogColumns};

#[derive(Parser)]
#[command(name = "wtheta")]
#[command(about = "Angular two-point correlation with jackknife covariance")]
#[command(version)]
struct Cli {
    /// ASCII footprint file: one `pixel-id weight` pair per line
    #[arg(long)]
    footprint: PathBuf,

    /// ASCII catalog file: `lon lat [probability [magnitude]]`, degrees
    #[arg(long)]
    catalog: PathBuf,

    /// Minimum angular separation, degrees
    #[arg(long, default_value = "0.01")]
    theta_min: f64,

    /// Maximum angular separation, degrees
    #[arg(long, default_value = "10.0")]
    theta_max: f64,

    /// Logarithmic bins per decade
    #[arg(long, default_value = "5")]
    bins_per_decade: u32,

    /// Random points per data point
    #[arg(long, default_value = "1")]
    n_random: usize,

    /// Jackknife region count; 0 disables, omit for the default
    /// max(16, 2·n_bins)
    #[arg(long)]
    n_regions: Option<usize>,

    /// Cap on the pixel-estimator level
    #[arg(long)]
    max_level: Option<u8>,

    /// Force the pair estimator in every bin
    #[arg(long)]
    only_pairs: bool,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Column index of the point probability (weight)
    #[arg(long)]
    probability_column: Option<usize>,

    /// Column index of the magnitude
    #[arg(long)]
    magnitude_column: Option<usize>,

    /// Drop objects fainter than this magnitude
    #[arg(long)]
    faint_limit: Option<f64>,

    /// Output path for the w(theta) table
    #[arg(long, default_value = "wtheta.dat")]
    output: PathBuf,

    /// Output path for the covariance table
    #[arg(long, default_value = "covariance.dat")]
    covariance_output: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("wtheta: {:#}", err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// Maps the underlying error class to the documented exit codes. Context
/// layers added along the way do not hide the original `SkyError`.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<SkyError>() {
        Some(SkyError::Pixelization { .. }) => 2,
        Some(SkyError::EmptyRegion { .. }) => 3,
        _ => 1,
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let footprint = read_footprint(&cli.footprint)
        .with_context(|| format!("reading footprint {}", cli.footprint.display()))?;
    let columns = CatalogColumns {
        probability: cli.probability_column,
        magnitude: cli.magnitude_column,
        faint_limit: cli.faint_limit,
        ..CatalogColumns::default()
    };
    let catalog = read_catalog(&cli.catalog, &columns)
        .with_context(|| format!("reading catalog {}", cli.catalog.display()))?;

    let correlation = AngularCorrelation::new(cli.theta_min, cli.theta_max, cli.bins_per_decade)?;
    let config = CorrelationConfig {
        n_random: cli.n_random,
        n_regions: cli
            .n_regions
            .unwrap_or_else(|| default_region_count(correlation.n_bins())),
        max_level: cli.max_level,
        only_pairs: cli.only_pairs,
        seed: cli.seed,
        ..CorrelationConfig::default()
    };

    let result = auto_correlate(&footprint, &catalog, correlation, &config)?;
    for note in &result.notes {
        log::warn!("{}", note);
    }

    write_wtheta(&cli.output, &result)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    write_covariance(&cli.covariance_output, &result)
        .with_context(|| format!("writing {}", cli.covariance_output.display()))?;
    println!(
        "wtheta: {} bins, {} regions -> {} and {}",
        result.bins.len(),
        result.n_regions,
        cli.output.display(),
        cli.covariance_output.display()
    );
    Ok(())
}
