//! The correlation pipeline.
//!
//! [`auto_correlate`] and [`cross_correlate`] drive the full measurement:
//! validate inputs, decide per bin between the pair and pixel estimators,
//! regionate the footprint for jackknife resampling, generate random
//! catalogs, run the dual-tree pair counts and the pixel cross-products,
//! rescale the random terms, and assemble w(θ) with its jackknife
//! covariance.
//!
//! The correlator owns the region map and the bin array for the duration
//! of a run; trees and fields borrow them read-only. Randomness comes
//! from a single explicitly seeded generator, so identical inputs and
//! seeds give bit-identical results.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use skystat_core::constants::MAX_LEVEL;
use skystat_core::{Bound, PixelKey, SkyError, SkyPoint, SkyResult};

use crate::bins::{AngularBin, AngularCorrelation, PairCounter};
use crate::field::FieldUnion;
use crate::footprint::Footprint;
use crate::region::RegionMap;
use crate::tree::PointTree;

/// Default for [`CorrelationConfig::pixel_pair_threshold`].
const PAIRS_PER_PIXEL_THRESHOLD: f64 = 200.0;

/// Finest level the pixel estimator will sample without an explicit
/// `max_level` override; finer scales go to the pair counter.
const DEFAULT_MAX_PIXEL_LEVEL: u8 = 8;

/// Knobs for one correlation run.
#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    /// Random points generated per data point. At least 1.
    pub n_random: usize,
    /// Jackknife region count; 0 disables resampling.
    pub n_regions: usize,
    /// Cap on the pixel-estimator sampling level; `None` picks the
    /// built-in default.
    pub max_level: Option<u8>,
    /// Force the pair estimator in every bin.
    pub only_pairs: bool,
    /// Expected pairs per pixel pair above which a bin switches to the
    /// pixel estimator.
    pub pixel_pair_threshold: f64,
    /// Seed for random catalog generation.
    pub seed: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            n_random: 1,
            n_regions: 0,
            max_level: None,
            only_pairs: false,
            pixel_pair_threshold: PAIRS_PER_PIXEL_THRESHOLD,
            seed: 0,
        }
    }
}

/// The recommended region count when the caller wants jackknife errors
/// but has no opinion: `max(16, 2·n_bins)`.
pub fn default_region_count(n_bins: usize) -> usize {
    (2 * n_bins).max(16)
}

/// One bin of a finished measurement.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BinResult {
    /// Bin center (geometric mean of the bounds), radians.
    pub theta: f64,
    pub theta_min: f64,
    pub theta_max: f64,
    pub wtheta: f64,
    pub wtheta_error: f64,
    /// Pixel-estimator level, `None` when the pair estimator ran.
    pub level_used: Option<u8>,
    pub gal_gal: f64,
    pub gal_rand: f64,
    pub rand_gal: f64,
    pub rand_rand: f64,
    pub pixel_wtheta: f64,
    pub pixel_weight: f64,
    /// Leave-one-out estimates, one per region; empty without jackknife.
    pub region_wtheta: Vec<f64>,
}

/// A finished correlation measurement.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CorrelationResult {
    pub bins: Vec<BinResult>,
    /// Jackknife covariance, `n_bins × n_bins`; empty without regions.
    pub covariance: Vec<Vec<f64>>,
    /// Regions actually used (may be fewer than requested).
    pub n_regions: usize,
    /// Degeneracies and other non-fatal findings, in occurrence order.
    pub notes: Vec<String>,
}

/// Measures the autocorrelation of a catalog over a footprint.
pub fn auto_correlate(
    footprint: &Footprint,
    points: &[SkyPoint],
    correlation: AngularCorrelation,
    config: &CorrelationConfig,
) -> SkyResult<CorrelationResult> {
    Correlator::new(footprint, correlation, config)?.run(points, None)
}

/// Measures the cross-correlation of two catalogs over one footprint.
pub fn cross_correlate(
    footprint: &Footprint,
    points_a: &[SkyPoint],
    points_b: &[SkyPoint],
    correlation: AngularCorrelation,
    config: &CorrelationConfig,
) -> SkyResult<CorrelationResult> {
    Correlator::new(footprint, correlation, config)?.run(points_a, Some(points_b))
}

struct Correlator<'a> {
    footprint: &'a Footprint,
    correlation: AngularCorrelation,
    config: CorrelationConfig,
    regions: Option<RegionMap>,
    notes: Vec<String>,
}

impl<'a> Correlator<'a> {
    fn new(
        footprint: &'a Footprint,
        correlation: AngularCorrelation,
        config: &CorrelationConfig,
    ) -> SkyResult<Self> {
        if footprint.area() <= 0.0 {
            return Err(SkyError::invalid_input("footprint has zero area"));
        }
        if config.n_random == 0 {
            return Err(SkyError::invalid_input("n_random must be >= 1"));
        }
        if let Some(level) = config.max_level {
            if level > MAX_LEVEL {
                return Err(SkyError::invalid_input(format!(
                    "max_level {} exceeds the {}-level hierarchy",
                    level, MAX_LEVEL
                )));
            }
        }
        Ok(Self {
            footprint,
            correlation,
            config: config.clone(),
            regions: None,
            notes: Vec::new(),
        })
    }

    fn run(
        mut self,
        points_a: &[SkyPoint],
        points_b: Option<&[SkyPoint]>,
    ) -> SkyResult<CorrelationResult> {
        if points_a.is_empty() || points_b.map_or(false, |p| p.is_empty()) {
            return Err(SkyError::invalid_input("catalog is empty"));
        }

        let n_total = points_a.len() + points_b.map_or(0, |p| p.len());
        self.assign_estimators(n_total);

        if self.config.n_regions > 0 {
            let regions = RegionMap::new(self.footprint, self.config.n_regions)?;
            self.correlation.init_regions(regions.n_region());
            self.regions = Some(regions);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.run_pair_bins(points_a, points_b, &mut rng)?;
        self.run_pixel_bins(points_a, points_b)?;
        Ok(self.assemble())
    }

    /// Chooses pair vs pixel per bin: the pixel estimator runs where the
    /// expected pair count per pixel pair `N²·A_pix/A_survey` crosses the
    /// threshold (coarse scales) and the level stays affordable;
    /// everything else pairs up.
    fn assign_estimators(&mut self, n_points: usize) {
        self.correlation.find_levels(MAX_LEVEL);
        if self.config.only_pairs {
            for bin in self.correlation.bins_mut() {
                bin.set_level(None);
            }
            return;
        }
        let max_pixel_level = self
            .config
            .max_level
            .unwrap_or(DEFAULT_MAX_PIXEL_LEVEL)
            .min(MAX_LEVEL);
        let area = self.footprint.area();
        let n = n_points as f64;
        let threshold = self.config.pixel_pair_threshold;
        for bin in self.correlation.bins_mut() {
            let keep = bin.level().is_some_and(|level| {
                level <= max_pixel_level
                    && n * n * PixelKey::average_area(level) / area >= threshold
            });
            if !keep {
                bin.set_level(None);
            }
        }
        for bin in self.correlation.bins() {
            if bin.level() == Some(0) {
                self.notes.push(format!(
                    "bin at theta = {:.4} rad uses the level-0 pixel estimator; \
                     pair statistics dominate the error at this scale",
                    bin.theta()
                ));
            }
        }
    }

    fn run_pair_bins(
        &mut self,
        points_a: &[SkyPoint],
        points_b: Option<&[SkyPoint]>,
        rng: &mut ChaCha8Rng,
    ) -> SkyResult<()> {
        let pair_indices: Vec<usize> = self
            .correlation
            .bins()
            .iter()
            .enumerate()
            .filter(|(_, bin)| bin.is_pair_bin())
            .map(|(idx, _)| idx)
            .collect();
        if pair_indices.is_empty() {
            return Ok(());
        }
        let mut bins: Vec<AngularBin> = pair_indices
            .iter()
            .map(|&idx| self.correlation.bins()[idx].clone())
            .collect();

        let use_regions = self.regions.is_some();
        let mut tree_a = PointTree::build(points_a)?;
        let randoms_a = self
            .footprint
            .generate_random_points(self.config.n_random * points_a.len(), rng);
        let mut rand_tree_a = PointTree::build(&randoms_a)?;
        if let Some(regions) = &self.regions {
            tree_a.assign_regions(regions);
            rand_tree_a.assign_regions(regions);
        }

        match points_b {
            None => {
                let ratio = rand_tree_a.total_weight() / tree_a.total_weight();
                tree_a.find_pairs(&tree_a, &mut bins, PairCounter::GalGal, use_regions);
                tree_a.find_pairs(&rand_tree_a, &mut bins, PairCounter::GalRand, use_regions);
                rand_tree_a.find_pairs(
                    &rand_tree_a,
                    &mut bins,
                    PairCounter::RandRand,
                    use_regions,
                );
                for bin in &mut bins {
                    // Autocorrelation: RG is GR by symmetry.
                    bin.copy_pair_channel(PairCounter::GalRand, PairCounter::RandGal);
                    bin.rescale_pair(PairCounter::GalRand, ratio);
                    bin.rescale_pair(PairCounter::RandGal, ratio);
                    bin.rescale_pair(PairCounter::RandRand, ratio * ratio);
                }
            }
            Some(points_b) => {
                let mut tree_b = PointTree::build(points_b)?;
                let randoms_b = self
                    .footprint
                    .generate_random_points(self.config.n_random * points_b.len(), rng);
                let mut rand_tree_b = PointTree::build(&randoms_b)?;
                if let Some(regions) = &self.regions {
                    tree_b.assign_regions(regions);
                    rand_tree_b.assign_regions(regions);
                }

                let ratio_a = rand_tree_a.total_weight() / tree_a.total_weight();
                let ratio_b = rand_tree_b.total_weight() / tree_b.total_weight();
                tree_a.find_pairs(&tree_b, &mut bins, PairCounter::GalGal, use_regions);
                tree_a.find_pairs(&rand_tree_b, &mut bins, PairCounter::GalRand, use_regions);
                rand_tree_a.find_pairs(&tree_b, &mut bins, PairCounter::RandGal, use_regions);
                rand_tree_a.find_pairs(
                    &rand_tree_b,
                    &mut bins,
                    PairCounter::RandRand,
                    use_regions,
                );
                for bin in &mut bins {
                    bin.rescale_pair(PairCounter::GalRand, ratio_b);
                    bin.rescale_pair(PairCounter::RandGal, ratio_a);
                    bin.rescale_pair(PairCounter::RandRand, ratio_a * ratio_b);
                }
            }
        }

        for (&idx, bin) in pair_indices.iter().zip(bins) {
            self.correlation.bins_mut()[idx] = bin;
        }
        Ok(())
    }

    fn run_pixel_bins(
        &mut self,
        points_a: &[SkyPoint],
        points_b: Option<&[SkyPoint]>,
    ) -> SkyResult<()> {
        let mut levels: Vec<u8> = self
            .correlation
            .bins()
            .iter()
            .filter_map(|bin| bin.level())
            .collect();
        levels.sort_unstable();
        levels.dedup();

        for level in levels {
            let indices: Vec<usize> = self
                .correlation
                .bins()
                .iter()
                .enumerate()
                .filter(|(_, bin)| bin.level() == Some(level))
                .map(|(idx, _)| idx)
                .collect();
            let mut bins: Vec<AngularBin> = indices
                .iter()
                .map(|&idx| self.correlation.bins()[idx].clone())
                .collect();

            let mut field_a = FieldUnion::sample_points(self.footprint, points_a, level)?;
            if let Err(err) = field_a.convert_to_overdensity() {
                self.notes.push(format!(
                    "pixel bins at level {} skipped: {}",
                    level, err
                ));
                continue;
            }

            match points_b {
                None => match &self.regions {
                    Some(regions) => {
                        field_a.auto_correlate_with_regions(regions, &mut bins)?
                    }
                    None => field_a.auto_correlate(&mut bins)?,
                },
                Some(points_b) => {
                    let mut field_b =
                        FieldUnion::sample_points(self.footprint, points_b, level)?;
                    if let Err(err) = field_b.convert_to_overdensity() {
                        self.notes.push(format!(
                            "pixel bins at level {} skipped: {}",
                            level, err
                        ));
                        continue;
                    }
                    match &self.regions {
                        Some(regions) => field_a.cross_correlate_with_regions(
                            &field_b,
                            regions,
                            &mut bins,
                        )?,
                        None => field_a.cross_correlate(&field_b, &mut bins)?,
                    }
                }
            }

            for (&idx, bin) in indices.iter().zip(bins) {
                self.correlation.bins_mut()[idx] = bin;
            }
        }
        Ok(())
    }

    fn assemble(mut self) -> CorrelationResult {
        let n_regions = self.correlation.n_region();
        let mut results = Vec::with_capacity(self.correlation.n_bins());
        for bin in self.correlation.bins() {
            let wtheta = bin.wtheta();
            if wtheta.is_nan() {
                self.notes.push(format!(
                    "bin [{:.6e}, {:.6e}] rad is numerically degenerate (empty denominator)",
                    bin.theta_min(),
                    bin.theta_max()
                ));
            }
            results.push(BinResult {
                theta: bin.theta(),
                theta_min: bin.theta_min(),
                theta_max: bin.theta_max(),
                wtheta,
                wtheta_error: bin.wtheta_error(),
                level_used: bin.level(),
                gal_gal: bin.pair_weight(PairCounter::GalGal),
                gal_rand: bin.pair_weight(PairCounter::GalRand),
                rand_gal: bin.pair_weight(PairCounter::RandGal),
                rand_rand: bin.pair_weight(PairCounter::RandRand),
                pixel_wtheta: bin.pixel_wtheta(),
                pixel_weight: bin.pixel_weight(),
                region_wtheta: (0..n_regions).map(|k| bin.wtheta_region(k)).collect(),
            });
        }
        CorrelationResult {
            bins: results,
            covariance: self.correlation.covariance(),
            n_regions,
            notes: self.notes,
        }
    }
}
