//! Angular bins and the correlation container.
//!
//! An [`AngularBin`] holds one angular annulus [θ_min, θ_max) together
//! with every accumulator the estimators need: the four weighted pair
//! sums (galaxy/random crossings), the raw pair counter, the pixel
//! product sums, and a parallel per-region copy of each for jackknife
//! resampling. The per-region slot k accumulates only events where
//! neither endpoint lies in region k, so each slot is directly the
//! leave-one-out measurement.
//!
//! [`AngularCorrelation`] is the ordered list of logarithmically spaced
//! bins plus the jackknife covariance reduction across them.

use skystat_core::constants::{PI, TWOPI};
use skystat_core::math::{almost_ge, almost_le};
use skystat_core::{PixelKey, SkyError, SkyResult};

/// The four pair-sum channels of the Landy–Szalay estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairCounter {
    GalGal = 0,
    GalRand = 1,
    RandGal = 2,
    RandRand = 3,
}

impl PairCounter {
    pub const ALL: [PairCounter; 4] = [
        PairCounter::GalGal,
        PairCounter::GalRand,
        PairCounter::RandGal,
        PairCounter::RandRand,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A single angular annulus with its accumulators.
///
/// Bounds are radians. The cosine and squared-sine of both bounds are
/// cached so the pair-counting inner loops never call a transcendental
/// function.
#[derive(Debug, Clone)]
pub struct AngularBin {
    theta_min: f64,
    theta_max: f64,
    theta: f64,
    cos_theta_min: f64,
    cos_theta_max: f64,
    sin2_theta_min: f64,
    sin2_theta_max: f64,
    /// Pixelization level for the pixel estimator; `None` = pair bin.
    level: Option<u8>,
    pair_weight: [f64; 4],
    pair_count: f64,
    pixel_wtheta: f64,
    pixel_weight: f64,
    n_region: usize,
    region_pair_weight: [Vec<f64>; 4],
    region_pixel_wtheta: Vec<f64>,
    region_pixel_weight: Vec<f64>,
}

impl AngularBin {
    /// Creates a bin for `[theta_min, theta_max]` radians with the
    /// midpoint at the geometric mean (logarithmic binning).
    pub fn new(theta_min: f64, theta_max: f64) -> Self {
        let (sin_min, cos_min) = libm::sincos(theta_min);
        let (sin_max, cos_max) = libm::sincos(theta_max);
        Self {
            theta_min,
            theta_max,
            theta: libm::sqrt(theta_min * theta_max),
            cos_theta_min: cos_min,
            cos_theta_max: cos_max,
            sin2_theta_min: sin_min * sin_min,
            sin2_theta_max: sin_max * sin_max,
            level: None,
            pair_weight: [0.0; 4],
            pair_count: 0.0,
            pixel_wtheta: 0.0,
            pixel_weight: 0.0,
            n_region: 0,
            region_pair_weight: [Vec::new(), Vec::new(), Vec::new(), Vec::new()],
            region_pixel_wtheta: Vec::new(),
            region_pixel_weight: Vec::new(),
        }
    }

    /// A copy with the same bounds, level and region layout but zeroed
    /// accumulators. Per-worker accumulation starts from these.
    pub fn fresh_copy(&self) -> Self {
        let mut bin = AngularBin::new(self.theta_min, self.theta_max);
        bin.set_level(self.level);
        bin.init_regions(self.n_region);
        bin
    }

    /// Allocates the per-region accumulators for `n_region` regions.
    pub fn init_regions(&mut self, n_region: usize) {
        self.n_region = n_region;
        for kind in &mut self.region_pair_weight {
            *kind = vec![0.0; n_region];
        }
        self.region_pixel_wtheta = vec![0.0; n_region];
        self.region_pixel_weight = vec![0.0; n_region];
    }

    #[inline]
    pub fn theta_min(&self) -> f64 {
        self.theta_min
    }

    #[inline]
    pub fn theta_max(&self) -> f64 {
        self.theta_max
    }

    /// The bin midpoint (geometric mean of the bounds), radians.
    #[inline]
    pub fn theta(&self) -> f64 {
        self.theta
    }

    #[inline]
    pub fn cos_theta_min(&self) -> f64 {
        self.cos_theta_min
    }

    #[inline]
    pub fn cos_theta_max(&self) -> f64 {
        self.cos_theta_max
    }

    #[inline]
    pub fn sin2_theta_min(&self) -> f64 {
        self.sin2_theta_min
    }

    #[inline]
    pub fn sin2_theta_max(&self) -> f64 {
        self.sin2_theta_max
    }

    #[inline]
    pub fn n_region(&self) -> usize {
        self.n_region
    }

    /// The pixel-estimator level, `None` for a pair bin.
    #[inline]
    pub fn level(&self) -> Option<u8> {
        self.level
    }

    pub fn set_level(&mut self, level: Option<u8>) {
        self.level = level;
    }

    #[inline]
    pub fn is_pair_bin(&self) -> bool {
        self.level.is_none()
    }

    /// Whether an angular separation lies in the bin (inclusive, with
    /// the shared tolerance).
    #[inline]
    pub fn is_within(&self, theta: f64) -> bool {
        almost_ge(theta, self.theta_min) && almost_le(theta, self.theta_max)
    }

    /// Bound check in sin²θ form. Only meaningful for bins entirely
    /// below 90°, where sin² is monotone.
    #[inline]
    pub fn is_within_sin2(&self, sin2: f64) -> bool {
        almost_ge(sin2, self.sin2_theta_min) && almost_le(sin2, self.sin2_theta_max)
    }

    /// Bound check in cos θ form (cos decreases with θ).
    #[inline]
    pub fn is_within_cos(&self, cos: f64) -> bool {
        almost_ge(cos, self.cos_theta_max) && almost_le(cos, self.cos_theta_min)
    }

    /// Solid angle of the annulus, steradians.
    pub fn area(&self) -> f64 {
        (self.cos_theta_min - self.cos_theta_max) * TWOPI
    }

    /// Expected Poisson noise for a survey of the given object density
    /// (per steradian) and area (steradians).
    pub fn poisson_noise(&self, objects_per_steradian: f64, survey_area: f64) -> f64 {
        1.0 / libm::sqrt(
            objects_per_steradian * objects_per_steradian * survey_area * self.area(),
        )
    }

    /// Deposits a weighted pair sum into one channel, with leave-one-out
    /// region bookkeeping: region slot k is credited iff neither endpoint
    /// region equals k.
    pub fn accumulate_pair(
        &mut self,
        kind: PairCounter,
        weight: f64,
        count: f64,
        region_a: Option<usize>,
        region_b: Option<usize>,
    ) {
        self.pair_weight[kind.index()] += weight;
        self.pair_count += count;
        if let (Some(a), Some(b)) = (region_a, region_b) {
            let slots = &mut self.region_pair_weight[kind.index()];
            for (k, slot) in slots.iter_mut().enumerate() {
                if k != a && k != b {
                    *slot += weight;
                }
            }
        }
    }

    /// Deposits a pixel overdensity product, mirroring the pair channel
    /// region bookkeeping.
    pub fn accumulate_pixel(
        &mut self,
        dwtheta: f64,
        dweight: f64,
        region_a: Option<usize>,
        region_b: Option<usize>,
    ) {
        self.pixel_wtheta += dwtheta;
        self.pixel_weight += dweight;
        if let (Some(a), Some(b)) = (region_a, region_b) {
            for k in 0..self.n_region {
                if k != a && k != b {
                    self.region_pixel_wtheta[k] += dwtheta;
                    self.region_pixel_weight[k] += dweight;
                }
            }
        }
    }

    /// Copies one pair channel into another, region slots included. In an
    /// autocorrelation the galaxy-random and random-galaxy sums are
    /// identical, so the second is copied rather than recounted.
    pub fn copy_pair_channel(&mut self, from: PairCounter, to: PairCounter) {
        self.pair_weight[to.index()] = self.pair_weight[from.index()];
        let source = self.region_pair_weight[from.index()].clone();
        self.region_pair_weight[to.index()] = source;
    }

    /// Rescales one pair channel (and its region slots) by `1/scale`,
    /// used to put random terms in data units when the random catalog
    /// size differs from the data size.
    pub fn rescale_pair(&mut self, kind: PairCounter, scale: f64) {
        self.pair_weight[kind.index()] /= scale;
        for slot in &mut self.region_pair_weight[kind.index()] {
            *slot /= scale;
        }
    }

    /// Merges another bin's accumulators into this one (worker merge).
    pub fn merge(&mut self, other: &AngularBin) {
        for idx in 0..4 {
            self.pair_weight[idx] += other.pair_weight[idx];
            for (slot, value) in self.region_pair_weight[idx]
                .iter_mut()
                .zip(&other.region_pair_weight[idx])
            {
                *slot += value;
            }
        }
        self.pair_count += other.pair_count;
        self.pixel_wtheta += other.pixel_wtheta;
        self.pixel_weight += other.pixel_weight;
        for (slot, value) in self
            .region_pixel_wtheta
            .iter_mut()
            .zip(&other.region_pixel_wtheta)
        {
            *slot += value;
        }
        for (slot, value) in self
            .region_pixel_weight
            .iter_mut()
            .zip(&other.region_pixel_weight)
        {
            *slot += value;
        }
    }

    #[inline]
    pub fn pair_weight(&self, kind: PairCounter) -> f64 {
        self.pair_weight[kind.index()]
    }

    #[inline]
    pub fn pair_weight_region(&self, kind: PairCounter, region: usize) -> f64 {
        self.region_pair_weight[kind.index()][region]
    }

    #[inline]
    pub fn pair_count(&self) -> f64 {
        self.pair_count
    }

    #[inline]
    pub fn pixel_wtheta(&self) -> f64 {
        self.pixel_wtheta
    }

    #[inline]
    pub fn pixel_weight(&self) -> f64 {
        self.pixel_weight
    }

    /// The correlation estimate for this bin.
    ///
    /// Pair bins use Landy–Szalay `(GG − GR − RG + RR)/RR`; pixel bins
    /// use `Σδδww / Σww`. A zero denominator yields NaN rather than an
    /// error, so one degenerate bin never aborts the run.
    pub fn wtheta(&self) -> f64 {
        if self.is_pair_bin() {
            let [gg, gr, rg, rr] = self.pair_weight;
            if rr == 0.0 {
                f64::NAN
            } else {
                (gg - gr - rg + rr) / rr
            }
        } else if self.pixel_weight == 0.0 {
            f64::NAN
        } else {
            self.pixel_wtheta / self.pixel_weight
        }
    }

    /// The leave-one-out estimate excluding region `k`.
    pub fn wtheta_region(&self, k: usize) -> f64 {
        if self.is_pair_bin() {
            let gg = self.region_pair_weight[0][k];
            let gr = self.region_pair_weight[1][k];
            let rg = self.region_pair_weight[2][k];
            let rr = self.region_pair_weight[3][k];
            if rr == 0.0 {
                f64::NAN
            } else {
                (gg - gr - rg + rr) / rr
            }
        } else if self.region_pixel_weight[k] == 0.0 {
            f64::NAN
        } else {
            self.region_pixel_wtheta[k] / self.region_pixel_weight[k]
        }
    }

    /// Mean of the leave-one-out estimates.
    pub fn mean_wtheta(&self) -> f64 {
        if self.n_region == 0 {
            return self.wtheta();
        }
        (0..self.n_region).map(|k| self.wtheta_region(k)).sum::<f64>() / self.n_region as f64
    }

    /// The uncertainty on [`wtheta`](Self::wtheta).
    ///
    /// With regions: the jackknife estimator
    /// `sqrt((N−1)/N · Σ_k (w_k − w̄)²)`. Without regions: the Poisson
    /// shot-noise fallback `1/sqrt(GG)` (pair) or `1/sqrt(Σww)` (pixel).
    pub fn wtheta_error(&self) -> f64 {
        if self.n_region > 1 {
            let mean = self.mean_wtheta();
            let sum_sq: f64 = (0..self.n_region)
                .map(|k| {
                    let d = self.wtheta_region(k) - mean;
                    d * d
                })
                .sum();
            let n = self.n_region as f64;
            libm::sqrt((n - 1.0) / n * sum_sq)
        } else if self.is_pair_bin() {
            1.0 / libm::sqrt(self.pair_weight[PairCounter::GalGal.index()])
        } else {
            1.0 / libm::sqrt(self.pixel_weight)
        }
    }
}

/// An ordered set of logarithmically spaced angular bins with the
/// jackknife covariance reduction.
#[derive(Debug, Clone)]
pub struct AngularCorrelation {
    bins: Vec<AngularBin>,
    n_region: usize,
}

impl AngularCorrelation {
    /// Builds bins covering `[theta_min_deg, theta_max_deg]` degrees at
    /// `bins_per_decade` logarithmic bins per decade.
    pub fn new(theta_min_deg: f64, theta_max_deg: f64, bins_per_decade: u32) -> SkyResult<Self> {
        if !theta_min_deg.is_finite() || !theta_max_deg.is_finite() {
            return Err(SkyError::invalid_input("non-finite angular range"));
        }
        if theta_min_deg <= 0.0 || theta_max_deg <= theta_min_deg {
            return Err(SkyError::invalid_input(format!(
                "angular range [{}, {}] degrees is empty or inverted",
                theta_min_deg, theta_max_deg
            )));
        }
        if theta_max_deg * skystat_core::constants::DEG_TO_RAD > PI {
            return Err(SkyError::invalid_input(
                "theta_max exceeds 180 degrees",
            ));
        }
        if bins_per_decade == 0 {
            return Err(SkyError::invalid_input("bins_per_decade must be >= 1"));
        }

        let step = 1.0 / bins_per_decade as f64;
        let log_min = libm::log10(theta_min_deg);
        let decades = libm::log10(theta_max_deg) - log_min;
        let n_bins = libm::ceil(decades * bins_per_decade as f64 - 1.0e-9) as usize;
        let mut bins = Vec::with_capacity(n_bins);
        for i in 0..n_bins {
            let lo = libm::pow(10.0, log_min + i as f64 * step);
            let hi = libm::pow(10.0, log_min + (i + 1) as f64 * step);
            bins.push(AngularBin::new(
                lo * skystat_core::constants::DEG_TO_RAD,
                hi * skystat_core::constants::DEG_TO_RAD,
            ));
        }
        Ok(Self { bins, n_region: 0 })
    }

    /// Assigns each bin the finest level that resolves its inner bound,
    /// capped at `max_level`. Bins whose scale is below the deepest
    /// pixelization stay `None` (pair-only).
    pub fn find_levels(&mut self, max_level: u8) {
        for bin in &mut self.bins {
            let level = PixelKey::level_for_scale(bin.theta_min()).map(|l| l.min(max_level));
            bin.set_level(level);
        }
    }

    /// Allocates region accumulators on every bin.
    pub fn init_regions(&mut self, n_region: usize) {
        self.n_region = n_region;
        for bin in &mut self.bins {
            bin.init_regions(n_region);
        }
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    #[inline]
    pub fn n_region(&self) -> usize {
        self.n_region
    }

    pub fn bins(&self) -> &[AngularBin] {
        &self.bins
    }

    pub fn bins_mut(&mut self) -> &mut [AngularBin] {
        &mut self.bins
    }

    pub fn theta_min(&self) -> f64 {
        self.bins.first().map_or(0.0, |b| b.theta_min())
    }

    pub fn theta_max(&self) -> f64 {
        self.bins.last().map_or(0.0, |b| b.theta_max())
    }

    /// The index of the bin containing the given separation, if any.
    pub fn bin_for_theta(&self, theta: f64) -> Option<usize> {
        self.bins.iter().position(|bin| bin.is_within(theta))
    }

    /// Jackknife covariance between bins:
    /// `C[i,j] = (N−1)/N · Σ_k (w_i(k) − w̄_i)(w_j(k) − w̄_j)`.
    ///
    /// Returns an empty matrix when regions were never initialized.
    pub fn covariance(&self) -> Vec<Vec<f64>> {
        let n_bins = self.bins.len();
        let n = self.n_region;
        if n < 2 {
            return Vec::new();
        }
        let means: Vec<f64> = self.bins.iter().map(|bin| bin.mean_wtheta()).collect();
        let mut matrix = vec![vec![0.0; n_bins]; n_bins];
        for i in 0..n_bins {
            for j in i..n_bins {
                let mut sum = 0.0;
                for k in 0..n {
                    sum += (self.bins[i].wtheta_region(k) - means[i])
                        * (self.bins[j].wtheta_region(k) - means[j]);
                }
                let value = (n as f64 - 1.0) / n as f64 * sum;
                matrix[i][j] = value;
                matrix[j][i] = value;
            }
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use skystat_core::constants::DEG_TO_RAD;

    #[test]
    fn test_bin_bounds_and_caches() {
        let bin = AngularBin::new(0.01, 0.1);
        assert_relative_eq!(bin.theta(), libm::sqrt(0.01 * 0.1), epsilon = 1e-15);
        assert_relative_eq!(bin.cos_theta_min(), libm::cos(0.01), epsilon = 1e-15);
        assert_relative_eq!(bin.sin2_theta_max(), libm::sin(0.1) * libm::sin(0.1));

        assert!(bin.is_within(0.05));
        assert!(bin.is_within(0.01));
        assert!(bin.is_within(0.1));
        assert!(!bin.is_within(0.2));

        let theta = 0.05;
        assert!(bin.is_within_cos(libm::cos(theta)));
        assert!(bin.is_within_sin2(libm::sin(theta) * libm::sin(theta)));
        assert!(!bin.is_within_cos(libm::cos(0.5)));
    }

    #[test]
    fn test_bin_area() {
        let bin = AngularBin::new(0.0, PI);
        assert_relative_eq!(bin.area(), 4.0 * PI, epsilon = 1e-12);
    }

    #[test]
    fn test_landy_szalay() {
        let mut bin = AngularBin::new(0.01, 0.1);
        bin.accumulate_pair(PairCounter::GalGal, 110.0, 110.0, None, None);
        bin.accumulate_pair(PairCounter::GalRand, 100.0, 100.0, None, None);
        bin.accumulate_pair(PairCounter::RandGal, 100.0, 100.0, None, None);
        bin.accumulate_pair(PairCounter::RandRand, 100.0, 100.0, None, None);
        assert_relative_eq!(bin.wtheta(), 0.1, epsilon = 1e-12);
        assert_eq!(bin.pair_count(), 410.0);
    }

    #[test]
    fn test_degenerate_rr_gives_nan() {
        let mut bin = AngularBin::new(0.01, 0.1);
        bin.accumulate_pair(PairCounter::GalGal, 10.0, 10.0, None, None);
        assert!(bin.wtheta().is_nan());

        let mut pixel_bin = AngularBin::new(0.01, 0.1);
        pixel_bin.set_level(Some(6));
        assert!(pixel_bin.wtheta().is_nan());
    }

    #[test]
    fn test_pixel_estimator() {
        let mut bin = AngularBin::new(0.01, 0.1);
        bin.set_level(Some(6));
        bin.accumulate_pixel(0.3, 1.5, None, None);
        bin.accumulate_pixel(0.3, 1.5, None, None);
        assert_relative_eq!(bin.wtheta(), 0.2, epsilon = 1e-15);
    }

    #[test]
    fn test_leave_one_out_deposits() {
        let mut bin = AngularBin::new(0.01, 0.1);
        bin.init_regions(4);
        // Pair with endpoints in regions 0 and 1: slots 2 and 3 credited.
        bin.accumulate_pair(PairCounter::GalGal, 1.0, 1.0, Some(0), Some(1));
        assert_eq!(bin.pair_weight_region(PairCounter::GalGal, 0), 0.0);
        assert_eq!(bin.pair_weight_region(PairCounter::GalGal, 1), 0.0);
        assert_eq!(bin.pair_weight_region(PairCounter::GalGal, 2), 1.0);
        assert_eq!(bin.pair_weight_region(PairCounter::GalGal, 3), 1.0);
        // Global always credited.
        assert_eq!(bin.pair_weight(PairCounter::GalGal), 1.0);
    }

    #[test]
    fn test_rescale_pair() {
        let mut bin = AngularBin::new(0.01, 0.1);
        bin.init_regions(2);
        bin.accumulate_pair(PairCounter::RandRand, 8.0, 8.0, Some(0), Some(0));
        bin.rescale_pair(PairCounter::RandRand, 4.0);
        assert_relative_eq!(bin.pair_weight(PairCounter::RandRand), 2.0);
        assert_relative_eq!(bin.pair_weight_region(PairCounter::RandRand, 1), 2.0);
    }

    #[test]
    fn test_merge() {
        let mut a = AngularBin::new(0.01, 0.1);
        let mut b = a.clone();
        a.init_regions(2);
        b.init_regions(2);
        a.accumulate_pair(PairCounter::GalGal, 1.0, 1.0, Some(0), Some(0));
        b.accumulate_pair(PairCounter::GalGal, 2.0, 2.0, Some(1), Some(1));
        b.accumulate_pixel(0.5, 1.0, Some(0), Some(1));
        a.merge(&b);
        assert_eq!(a.pair_weight(PairCounter::GalGal), 3.0);
        assert_eq!(a.pair_count(), 3.0);
        assert_eq!(a.pair_weight_region(PairCounter::GalGal, 0), 2.0);
        assert_eq!(a.pair_weight_region(PairCounter::GalGal, 1), 1.0);
        assert_eq!(a.pixel_wtheta(), 0.5);
    }

    #[test]
    fn test_jackknife_identity_linear_case() {
        // With equal denominators the pixel estimator is linear, and the
        // classical pseudovalue identity holds exactly:
        // N·w_global − (N−1)·w̄_loo = mean pseudovalue = w_global when
        // the leave-one-out sums are balanced.
        let n = 5usize;
        let mut bin = AngularBin::new(0.01, 0.1);
        bin.set_level(Some(5));
        bin.init_regions(n);
        // Every event inside exactly one region; equal event weight sums
        // per region keep the denominator constant across slots.
        for region in 0..n {
            let dw = 0.1 * (region as f64 + 1.0);
            bin.accumulate_pixel(dw, 1.0, Some(region), Some(region));
        }
        let w_global = bin.wtheta();
        let n_f = n as f64;
        let pseudo_mean: f64 = (0..n)
            .map(|k| n_f * w_global - (n_f - 1.0) * bin.wtheta_region(k))
            .sum::<f64>()
            / n_f;
        assert_abs_diff_eq!(pseudo_mean, w_global, epsilon = 1e-10);
    }

    #[test]
    fn test_jackknife_error_formula() {
        let n = 4usize;
        let mut bin = AngularBin::new(0.01, 0.1);
        bin.set_level(Some(5));
        bin.init_regions(n);
        for region in 0..n {
            bin.accumulate_pixel(0.2 * region as f64, 1.0, Some(region), Some(region));
        }
        let mean = bin.mean_wtheta();
        let expected: f64 = (0..n)
            .map(|k| {
                let d = bin.wtheta_region(k) - mean;
                d * d
            })
            .sum();
        let expected = libm::sqrt((n as f64 - 1.0) / n as f64 * expected);
        assert_abs_diff_eq!(bin.wtheta_error(), expected, epsilon = 1e-15);
    }

    #[test]
    fn test_correlation_construction() {
        let correlation = AngularCorrelation::new(0.01, 10.0, 5).unwrap();
        // Three decades at five per decade.
        assert_eq!(correlation.n_bins(), 15);
        assert_relative_eq!(
            correlation.theta_min(),
            0.01 * DEG_TO_RAD,
            epsilon = 1e-12
        );
        assert_relative_eq!(correlation.theta_max(), 10.0 * DEG_TO_RAD, max_relative = 1e-9);

        // Contiguous edges.
        for window in correlation.bins().windows(2) {
            assert_relative_eq!(window[0].theta_max(), window[1].theta_min(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_correlation_rejects_bad_ranges() {
        assert!(AngularCorrelation::new(-1.0, 10.0, 5).is_err());
        assert!(AngularCorrelation::new(10.0, 1.0, 5).is_err());
        assert!(AngularCorrelation::new(0.1, f64::NAN, 5).is_err());
        assert!(AngularCorrelation::new(0.1, 10.0, 0).is_err());
        assert!(AngularCorrelation::new(1.0, 200.0, 5).is_err());
    }

    #[test]
    fn test_find_levels_monotone() {
        let mut correlation = AngularCorrelation::new(0.01, 10.0, 5).unwrap();
        correlation.find_levels(skystat_core::constants::MAX_LEVEL);
        let levels: Vec<Option<u8>> =
            correlation.bins().iter().map(|b| b.level()).collect();
        // Wider bins use coarser levels.
        for window in levels.windows(2) {
            if let (Some(a), Some(b)) = (window[0], window[1]) {
                assert!(a >= b);
            }
        }
        // All scales here resolve within the 30-level hierarchy.
        assert!(levels.iter().all(|l| l.is_some()));
    }

    #[test]
    fn test_bin_for_theta() {
        let correlation = AngularCorrelation::new(0.1, 10.0, 5).unwrap();
        let theta = 1.0 * DEG_TO_RAD;
        let idx = correlation.bin_for_theta(theta).unwrap();
        assert!(correlation.bins()[idx].is_within(theta));
        assert_eq!(correlation.bin_for_theta(20.0 * DEG_TO_RAD), None);
    }

    #[test]
    fn test_covariance_diagonal_matches_error() {
        let n = 6usize;
        let mut correlation = AngularCorrelation::new(0.1, 1.0, 5).unwrap();
        correlation.init_regions(n);
        for (b, bin) in correlation.bins_mut().iter_mut().enumerate() {
            bin.set_level(Some(5));
            for region in 0..n {
                let dw = 0.05 * ((b + 1) * (region + 1)) as f64;
                bin.accumulate_pixel(dw, 1.0, Some(region), Some(region));
            }
        }
        let cov = correlation.covariance();
        assert_eq!(cov.len(), correlation.n_bins());
        for (i, bin) in correlation.bins().iter().enumerate() {
            let err = bin.wtheta_error();
            assert_abs_diff_eq!(cov[i][i], err * err, epsilon = 1e-12);
            // Symmetry.
            for j in 0..cov.len() {
                assert_eq!(cov[i][j], cov[j][i]);
            }
        }
    }
}
