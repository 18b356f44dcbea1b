//! Angular two-point correlation functions on the celestial sphere.
//!
//! Given a survey footprint (weighted pixels from `skystat-core`'s
//! hierarchical pixelization), a weighted point catalog, and a set of
//! logarithmic angular bins, this crate measures w(θ) with jackknife
//! covariance from leave-one-out resampling over spatial subregions.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`footprint`] | Pixel-set bounds: containment, coverings, random sampling |
//! | [`tree`] | Dual-tree pair counting over weighted catalogs |
//! | [`field`] | Pixel overdensity fields and the pixel estimator |
//! | [`region`] | Near-equal-area jackknife regionation |
//! | [`bins`] | Angular bins, estimators, jackknife covariance |
//! | [`correlator`] | The pipeline: [`auto_correlate`] / [`cross_correlate`] |
//! | [`io`] | ASCII footprints, catalogs, and result tables |
//!
//! # Quick Start
//!
//! ```
//! use skystat_correlate::bins::AngularCorrelation;
//! use skystat_correlate::correlator::{auto_correlate, CorrelationConfig};
//! use skystat_correlate::footprint::Footprint;
//!
//! # fn main() -> skystat_core::SkyResult<()> {
//! let footprint = Footprint::full_sky();
//! let catalog: Vec<skystat_core::SkyPoint> = (0..200)
//!     .map(|i| skystat_core::SkyPoint::from_degrees(i as f64 * 1.7 % 360.0, (i % 120) as f64 - 60.0))
//!     .collect();
//!
//! let correlation = AngularCorrelation::new(1.0, 30.0, 3)?;
//! let config = CorrelationConfig {
//!     n_random: 2,
//!     seed: 42,
//!     ..CorrelationConfig::default()
//! };
//! let result = auto_correlate(&footprint, &catalog, correlation, &config)?;
//! assert_eq!(result.covariance.len(), 0); // no regions requested
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **`cli`** — the `wtheta` binary for end-to-end runs from ASCII files.
//! - **`serde`** — serialization of result types.

pub mod bins;
pub mod correlator;
pub mod field;
pub mod footprint;
pub mod io;
pub mod region;
pub mod tree;

pub use bins::{AngularBin, AngularCorrelation, PairCounter};
pub use correlator::{
    auto_correlate, cross_correlate, default_region_count, BinResult, CorrelationConfig,
    CorrelationResult,
};
pub use field::{FieldPixel, FieldUnion};
pub use footprint::{Footprint, FootprintPixel};
pub use region::RegionMap;
pub use tree::PointTree;
