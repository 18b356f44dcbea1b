//! Scalar fields sampled on the footprint at a single level.
//!
//! At angular scales much larger than a pixel, counting individual point
//! pairs is wasteful: the same information lives in the product of pixel
//! overdensities. A [`FieldUnion`] samples the catalog onto the footprint
//! covering at one level, converts intensities to overdensities, and
//! accumulates `δᵢ·δⱼ·wᵢ·wⱼ` over pixel pairs into the angular bins.
//!
//! The correlation methods refuse a field that has not been converted to
//! overdensity form: the product of raw intensities is not a correlation
//! function, and the conversion is explicit and exactly reversible.

use rayon::prelude::*;

use skystat_core::{Bound, CircleBound, PixelKey, SkyError, SkyPoint, SkyResult, Vector3};

use crate::bins::AngularBin;
use crate::footprint::Footprint;
use crate::region::RegionMap;

/// Pixels per pruning group: pairs of groups whose cap separation range
/// misses every bin are skipped without touching their members.
const GROUP_LEVEL_DROP: u8 = 3;

/// One sampled cell: a pixel key with an intensity, the footprint weight
/// of the cell, and the number of deposited points.
#[derive(Debug, Clone, Copy)]
pub struct FieldPixel {
    pub key: PixelKey,
    pub intensity: f64,
    /// Observed fraction of the cell, from the footprint.
    pub weight: f64,
    pub count: u32,
}

/// A single-level sampled field over a footprint.
#[derive(Debug, Clone)]
pub struct FieldUnion {
    pixels: Vec<FieldPixel>,
    level: u8,
    area: f64,
    total_intensity: f64,
    total_points: u64,
    mean_intensity: f64,
    converted_to_overdensity: bool,
    bound: CircleBound,
    center: Vector3,
}

impl FieldUnion {
    /// An empty field over the footprint covering at `level`: one pixel
    /// per covering cell, intensity zero, weight from the footprint.
    pub fn from_footprint(footprint: &Footprint, level: u8) -> SkyResult<Self> {
        let covering = footprint.simple_covering(level);
        if covering.is_empty() {
            return Err(SkyError::invalid_input(
                "footprint covering is empty at the requested level",
            ));
        }
        let pixels: Vec<FieldPixel> = covering
            .into_iter()
            .map(|key| FieldPixel {
                key,
                intensity: 0.0,
                weight: footprint.unmasked_fraction(&key),
                count: 0,
            })
            .collect();
        Ok(Self::from_parts(pixels, level, footprint.get_bound(), footprint.get_center()))
    }

    /// Samples a catalog onto the footprint at `level`: each point adds
    /// its weight to the intensity of its cell. Points outside the
    /// covering are dropped.
    pub fn sample_points(
        footprint: &Footprint,
        points: &[SkyPoint],
        level: u8,
    ) -> SkyResult<Self> {
        let mut field = Self::from_footprint(footprint, level)?;
        for p in points {
            field.add_point(p);
        }
        Ok(field)
    }

    fn from_parts(pixels: Vec<FieldPixel>, level: u8, bound: CircleBound, center: Vector3) -> Self {
        let area = pixels
            .iter()
            .map(|px| px.weight * PixelKey::average_area(level))
            .sum();
        let total_intensity = pixels.iter().map(|px| px.intensity).sum();
        let total_points = pixels.iter().map(|px| px.count as u64).sum();
        Self {
            pixels,
            level,
            area,
            total_intensity,
            total_points,
            mean_intensity: 0.0,
            converted_to_overdensity: false,
            bound,
            center,
        }
    }

    /// Deposits one point. Returns `false` when the point misses the
    /// sampled covering.
    pub fn add_point(&mut self, p: &SkyPoint) -> bool {
        let key = PixelKey::from_sky_point(p, self.level);
        match self.pixels.binary_search_by_key(&key, |px| px.key) {
            Ok(idx) => {
                self.pixels[idx].intensity += p.weight();
                self.pixels[idx].count += 1;
                self.total_intensity += p.weight();
                self.total_points += 1;
                true
            }
            Err(_) => false,
        }
    }

    #[inline]
    pub fn level(&self) -> u8 {
        self.level
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[FieldPixel] {
        &self.pixels
    }

    #[inline]
    pub fn total_intensity(&self) -> f64 {
        self.total_intensity
    }

    #[inline]
    pub fn n_points(&self) -> u64 {
        self.total_points
    }

    #[inline]
    pub fn is_over_density(&self) -> bool {
        self.converted_to_overdensity
    }

    /// The weighted mean intensity `Σ intensity / Σ weight`.
    pub fn mean_intensity(&self) -> f64 {
        if self.converted_to_overdensity {
            return self.mean_intensity;
        }
        let total_weight: f64 = self.pixels.iter().map(|px| px.weight).sum();
        self.total_intensity / total_weight
    }

    /// Replaces intensities with overdensities
    /// `δ = intensity/(weight·mean) − 1`. No-op when already converted;
    /// a field with zero mean intensity (nothing sampled) is degenerate
    /// and cannot be converted.
    pub fn convert_to_overdensity(&mut self) -> SkyResult<()> {
        if self.converted_to_overdensity {
            return Ok(());
        }
        let mean = self.mean_intensity();
        if mean == 0.0 {
            return Err(SkyError::numeric_degeneracy(
                "overdensity conversion of a field with zero mean intensity",
            ));
        }
        self.mean_intensity = mean;
        for px in &mut self.pixels {
            px.intensity = px.intensity / (px.weight * mean) - 1.0;
        }
        self.converted_to_overdensity = true;
        Ok(())
    }

    /// Restores raw intensities from overdensities. Exact inverse of
    /// [`convert_to_overdensity`](Self::convert_to_overdensity) up to
    /// rounding.
    pub fn convert_from_overdensity(&mut self) {
        if !self.converted_to_overdensity {
            return;
        }
        let mean = self.mean_intensity;
        for px in &mut self.pixels {
            px.intensity = (px.intensity + 1.0) * px.weight * mean;
        }
        self.converted_to_overdensity = false;
    }

    /// Accumulates overdensity products over unordered pixel pairs into
    /// the bins, without region bookkeeping.
    pub fn auto_correlate(&self, bins: &mut [AngularBin]) -> SkyResult<()> {
        self.correlate_impl(None, None, bins)
    }

    /// Accumulates overdensity products with leave-one-out region
    /// deposits.
    pub fn auto_correlate_with_regions(
        &self,
        regions: &RegionMap,
        bins: &mut [AngularBin],
    ) -> SkyResult<()> {
        self.correlate_impl(None, Some(regions), bins)
    }

    /// Accumulates cross products between two fields at the same level.
    pub fn cross_correlate(&self, other: &FieldUnion, bins: &mut [AngularBin]) -> SkyResult<()> {
        self.correlate_impl(Some(other), None, bins)
    }

    /// Cross products with region bookkeeping.
    pub fn cross_correlate_with_regions(
        &self,
        other: &FieldUnion,
        regions: &RegionMap,
        bins: &mut [AngularBin],
    ) -> SkyResult<()> {
        self.correlate_impl(Some(other), Some(regions), bins)
    }

    fn correlate_impl(
        &self,
        other: Option<&FieldUnion>,
        regions: Option<&RegionMap>,
        bins: &mut [AngularBin],
    ) -> SkyResult<()> {
        if !self.converted_to_overdensity
            || other.map_or(false, |f| !f.converted_to_overdensity)
        {
            return Err(SkyError::invalid_input(
                "field must be converted to overdensity before correlating",
            ));
        }
        if let Some(f) = other {
            if f.level != self.level {
                return Err(SkyError::invalid_input(format!(
                    "field levels {} and {} do not match",
                    self.level, f.level
                )));
            }
        }

        let side_a = FieldSide::new(self, regions);
        let cross = other.map(|f| FieldSide::new(f, regions));
        let autocorrelate = cross.is_none();
        let side_b = cross.as_ref().unwrap_or(&side_a);

        // Group pairs whose cap separation range misses every bin are
        // pruned wholesale; surviving groups fall back to the pixel loop.
        let template: Vec<AngularBin> = bins.iter().map(|bin| bin.fresh_copy()).collect();
        let locals: Vec<Vec<AngularBin>> = (0..side_a.groups.len())
            .into_par_iter()
            .map(|ga| {
                let mut local = template.clone();
                let gb_start = if autocorrelate { ga } else { 0 };
                for gb in gb_start..side_b.groups.len() {
                    correlate_groups(&side_a, side_b, ga, gb, autocorrelate, &mut local);
                }
                local
            })
            .collect();

        for local in locals {
            for (bin, partial) in bins.iter_mut().zip(&local) {
                bin.merge(partial);
            }
        }
        Ok(())
    }
}

/// Precomputed per-pixel geometry for one side of a correlation.
struct FieldSide<'a> {
    field: &'a FieldUnion,
    centers: Vec<Vector3>,
    region_of: Vec<Option<usize>>,
    /// (group cap, member index range) per coarse parent cell.
    groups: Vec<(CircleBound, std::ops::Range<usize>)>,
}

impl<'a> FieldSide<'a> {
    fn new(field: &'a FieldUnion, regions: Option<&RegionMap>) -> Self {
        let centers: Vec<Vector3> = field.pixels.iter().map(|px| px.key.center()).collect();
        let region_of: Vec<Option<usize>> = field
            .pixels
            .iter()
            .map(|px| regions.and_then(|r| r.region_of_key(&px.key)))
            .collect();

        let group_level = field.level.saturating_sub(GROUP_LEVEL_DROP);
        let mut groups: Vec<(CircleBound, std::ops::Range<usize>)> = Vec::new();
        let mut start = 0usize;
        while start < field.pixels.len() {
            let parent = field.pixels[start].key.parent(group_level);
            let mut end = start + 1;
            while end < field.pixels.len()
                && field.pixels[end].key.parent(group_level) == parent
            {
                end += 1;
            }
            groups.push((parent.cap(), start..end));
            start = end;
        }

        Self {
            field,
            centers,
            region_of,
            groups,
        }
    }
}

fn correlate_groups(
    side_a: &FieldSide<'_>,
    side_b: &FieldSide<'_>,
    ga: usize,
    gb: usize,
    autocorrelate: bool,
    bins: &mut [AngularBin],
) {
    let (cap_a, range_a) = &side_a.groups[ga];
    let (cap_b, range_b) = &side_b.groups[gb];

    let (lo, hi) = cap_a.separation_range(cap_b);
    let overlaps = bins
        .iter()
        .any(|bin| hi >= bin.theta_min() && lo <= bin.theta_max());
    if !overlaps {
        return;
    }

    for i in range_a.clone() {
        let px_a = &side_a.field.pixels[i];
        let j_start = if autocorrelate && ga == gb {
            i + 1
        } else {
            range_b.start
        };
        for j in j_start..range_b.end {
            let px_b = &side_b.field.pixels[j];
            let cos = side_a.centers[i].dot(&side_b.centers[j]);
            for bin in bins.iter_mut() {
                if bin.is_within_cos(cos) {
                    bin.accumulate_pixel(
                        px_a.intensity * px_b.intensity * px_a.weight * px_b.weight,
                        px_a.weight * px_b.weight,
                        side_a.region_of[i],
                        side_b.region_of[j],
                    );
                    break;
                }
            }
        }
    }
}

impl Bound for FieldUnion {
    fn area(&self) -> f64 {
        self.area
    }

    fn contains(&self, p: &SkyPoint) -> bool {
        let key = PixelKey::from_sky_point(p, self.level);
        self.pixels.binary_search_by_key(&key, |px| px.key).is_ok()
    }

    fn may_intersect(&self, key: &PixelKey) -> bool {
        let lo = self
            .pixels
            .partition_point(|px| px.key.raw() < key.range_min());
        if lo < self.pixels.len() && self.pixels[lo].key.raw() <= key.range_max() {
            return true;
        }
        // No sampled cell below the query cell; it may still sit inside one.
        lo > 0 && self.pixels[lo - 1].key.contains_key(key)
    }

    fn get_bound(&self) -> CircleBound {
        self.bound
    }

    fn get_center(&self) -> Vector3 {
        self.center
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use crate::bins::AngularCorrelation;

    fn test_bins(theta_min_deg: f64, theta_max_deg: f64, per_decade: u32) -> Vec<AngularBin> {
        let mut correlation =
            AngularCorrelation::new(theta_min_deg, theta_max_deg, per_decade).unwrap();
        for bin in correlation.bins_mut() {
            bin.set_level(Some(4));
        }
        correlation.bins().to_vec()
    }

    #[test]
    fn test_sampling_counts_points() {
        let footprint = Footprint::full_sky();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let points = footprint.generate_random_points(1000, &mut rng);
        let field = FieldUnion::sample_points(&footprint, &points, 3).unwrap();

        assert_eq!(field.n_points(), 1000);
        assert_relative_eq!(field.total_intensity(), 1000.0, epsilon = 1e-9);
        let count_sum: u64 = field.pixels().iter().map(|px| px.count as u64).sum();
        assert_eq!(count_sum, 1000);
    }

    #[test]
    fn test_add_point_outside_covering() {
        let disk = CircleBound::from_radius(Vector3::x_axis(), 0.1);
        let footprint = Footprint::from_bound(&disk, 5).unwrap();
        let mut field = FieldUnion::from_footprint(&footprint, 5).unwrap();
        assert!(!field.add_point(&SkyPoint::from_degrees(180.0, 0.0)));
        assert!(field.add_point(&SkyPoint::from_degrees(0.0, 0.0)));
    }

    #[test]
    fn test_overdensity_roundtrip() {
        let footprint = Footprint::full_sky();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let points = footprint.generate_random_points(2000, &mut rng);
        let mut field = FieldUnion::sample_points(&footprint, &points, 3).unwrap();

        let before: Vec<f64> = field.pixels().iter().map(|px| px.intensity).collect();
        field.convert_to_overdensity().unwrap();
        assert!(field.is_over_density());
        field.convert_from_overdensity();
        assert!(!field.is_over_density());

        for (px, original) in field.pixels().iter().zip(&before) {
            if *original != 0.0 {
                assert_relative_eq!(px.intensity, *original, max_relative = 1e-12);
            } else {
                assert_abs_diff_eq!(px.intensity, 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_mean_intensity() {
        let footprint = Footprint::full_sky();
        let mut field = FieldUnion::from_footprint(&footprint, 2).unwrap();
        for px_idx in 0..field.len() {
            let center = field.pixels()[px_idx].key.center();
            field.add_point(&SkyPoint::from_vector(center, 2.0));
        }
        // Every pixel has weight 1 and intensity 2.
        assert_relative_eq!(field.mean_intensity(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_raw_field_correlation_rejected() {
        let footprint = Footprint::full_sky();
        let field = FieldUnion::from_footprint(&footprint, 3).unwrap();
        let mut bins = test_bins(10.0, 40.0, 3);
        assert!(matches!(
            field.auto_correlate(&mut bins),
            Err(SkyError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_level_mismatch_rejected() {
        let footprint = Footprint::full_sky();
        let mut a = FieldUnion::from_footprint(&footprint, 3).unwrap();
        let mut b = FieldUnion::from_footprint(&footprint, 4).unwrap();
        a.convert_to_overdensity().unwrap();
        b.convert_to_overdensity().unwrap();
        let mut bins = test_bins(10.0, 40.0, 3);
        assert!(a.cross_correlate(&b, &mut bins).is_err());
    }

    #[test]
    fn test_uniform_field_correlates_to_zero() {
        // A perfectly uniform field has zero overdensity everywhere.
        let footprint = Footprint::full_sky();
        let mut field = FieldUnion::from_footprint(&footprint, 3).unwrap();
        for idx in 0..field.len() {
            let center = field.pixels()[idx].key.center();
            field.add_point(&SkyPoint::from_vector(center, 1.0));
        }
        field.convert_to_overdensity().unwrap();
        for px in field.pixels() {
            assert_abs_diff_eq!(px.intensity, 0.0, epsilon = 1e-12);
        }

        let mut bins = test_bins(10.0, 60.0, 3);
        field.auto_correlate(&mut bins).unwrap();
        for bin in &bins {
            assert!(bin.pixel_weight() > 0.0);
            assert_abs_diff_eq!(bin.wtheta(), 0.0, epsilon = 1e-12);
        }
    }

    /// Field with δ = A·z planted directly (the cube tiling is symmetric
    /// under z → −z, so the weighted mean stays exactly 1).
    fn dipole_field(amplitude: f64, level: u8) -> FieldUnion {
        let footprint = Footprint::full_sky();
        let mut field = FieldUnion::from_footprint(&footprint, level).unwrap();
        for idx in 0..field.len() {
            let center = field.pixels()[idx].key.center();
            let weight = 1.0 + amplitude * center.z;
            field.add_point(&SkyPoint::from_vector(center, weight));
        }
        field.convert_to_overdensity().unwrap();
        field
    }

    #[test]
    fn test_dipole_mean_is_unity() {
        let field = dipole_field(0.5, 3);
        assert_relative_eq!(field.mean_intensity, 1.0, epsilon = 1e-12);
        for px in field.pixels() {
            assert_relative_eq!(px.intensity, 0.5 * px.key.center().z, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_correlation_matches_brute_force() {
        let field = dipole_field(0.4, 4);
        let mut bins = test_bins(5.0, 60.0, 4);
        field.auto_correlate(&mut bins).unwrap();

        let mut brute = test_bins(5.0, 60.0, 4);
        let pixels = field.pixels();
        for i in 0..pixels.len() {
            let ci = pixels[i].key.center();
            for j in (i + 1)..pixels.len() {
                let cos = ci.dot(&pixels[j].key.center());
                for bin in brute.iter_mut() {
                    if bin.is_within_cos(cos) {
                        bin.accumulate_pixel(
                            pixels[i].intensity
                                * pixels[j].intensity
                                * pixels[i].weight
                                * pixels[j].weight,
                            pixels[i].weight * pixels[j].weight,
                            None,
                            None,
                        );
                        break;
                    }
                }
            }
        }

        for (bin, brute_bin) in bins.iter().zip(&brute) {
            assert_relative_eq!(
                bin.pixel_weight(),
                brute_bin.pixel_weight(),
                max_relative = 1e-9
            );
            assert_abs_diff_eq!(
                bin.pixel_wtheta(),
                brute_bin.pixel_wtheta(),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_dipole_recovers_analytic_correlation() {
        // <δ(n̂₁)δ(n̂₂)> = A²·cosθ/3 for δ = A·z.
        let amplitude = 0.6;
        let field = dipole_field(amplitude, 4);
        let mut bins = test_bins(20.0, 45.0, 3);
        field.auto_correlate(&mut bins).unwrap();
        for bin in &bins {
            let expected = amplitude * amplitude * libm::cos(bin.theta()) / 3.0;
            let w = bin.wtheta();
            assert!(
                (w - expected).abs() < 0.1 * amplitude * amplitude / 3.0,
                "w = {}, expected ≈ {} at θ = {}",
                w,
                expected,
                bin.theta()
            );
        }
    }

    #[test]
    fn test_cross_correlation_of_identical_fields_matches_auto() {
        let field = dipole_field(0.3, 3);
        let mut auto_bins = test_bins(15.0, 50.0, 3);
        field.auto_correlate(&mut auto_bins).unwrap();

        let mut cross_bins = test_bins(15.0, 50.0, 3);
        field.cross_correlate(&field, &mut cross_bins).unwrap();

        // Cross counts ordered pairs (and self-pairs at zero separation,
        // which no bin includes): exactly double the unordered sums.
        for (auto_bin, cross_bin) in auto_bins.iter().zip(&cross_bins) {
            assert_relative_eq!(
                cross_bin.pixel_weight(),
                2.0 * auto_bin.pixel_weight(),
                max_relative = 1e-9
            );
        }
    }

    #[test]
    fn test_region_bookkeeping_matches_brute_force() {
        let footprint = Footprint::full_sky();
        let regions = RegionMap::new(&footprint, 5).unwrap();
        let field = dipole_field(0.4, 3);

        let mut bins = test_bins(15.0, 50.0, 3);
        for bin in bins.iter_mut() {
            bin.init_regions(regions.n_region());
        }
        field.auto_correlate_with_regions(&regions, &mut bins).unwrap();

        let mut brute = test_bins(15.0, 50.0, 3);
        for bin in brute.iter_mut() {
            bin.init_regions(regions.n_region());
        }
        let pixels = field.pixels();
        for i in 0..pixels.len() {
            for j in (i + 1)..pixels.len() {
                let cos = pixels[i].key.center().dot(&pixels[j].key.center());
                for bin in brute.iter_mut() {
                    if bin.is_within_cos(cos) {
                        bin.accumulate_pixel(
                            pixels[i].intensity
                                * pixels[j].intensity
                                * pixels[i].weight
                                * pixels[j].weight,
                            pixels[i].weight * pixels[j].weight,
                            regions.region_of_key(&pixels[i].key),
                            regions.region_of_key(&pixels[j].key),
                        );
                        break;
                    }
                }
            }
        }

        for (bin, brute_bin) in bins.iter().zip(&brute) {
            for k in 0..regions.n_region() {
                assert_abs_diff_eq!(
                    bin.wtheta_region(k),
                    brute_bin.wtheta_region(k),
                    epsilon = 1e-9
                );
            }
        }
    }
}
