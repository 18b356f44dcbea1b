//! Partitioning a footprint into jackknife regions.
//!
//! A [`RegionMap`] carves the footprint into N contiguous, nearly
//! equal-area regions. The construction picks a region level with enough
//! covering pixels to balance areas (about 50 per region), orders those
//! pixels into longitude stripes, groups adjacent stripes into sections
//! roughly one region wide, and sweeps each section accumulating weighted
//! area until each region has its share. The final region absorbs the
//! remainder of its section chain.
//!
//! Imbalanced or empty regions are reported with `log::warn!` and the
//! region count is reduced; regionation never aborts a correlation run.

use skystat_core::{PixelKey, SkyError, SkyPoint, SkyResult};

use crate::footprint::Footprint;

/// Coarsest acceptable pixel budget multiplier: aim for 50 covering
/// pixels per region so areas can balance.
const PIXELS_PER_REGION: usize = 50;

/// Cap on the region level; finer levels cost memory without improving
/// the area balance.
const MAX_REGION_LEVEL: u8 = 8;

/// Allowed relative area imbalance before a warning: `1/sqrt(50)`.
const AREA_TOLERANCE: f64 = 0.1414213562373095;

/// Assignment of footprint covering pixels to jackknife regions.
#[derive(Debug, Clone)]
pub struct RegionMap {
    /// (covering pixel, region index), sorted by key.
    assignments: Vec<(PixelKey, usize)>,
    region_area: Vec<f64>,
    level: u8,
    n_region: usize,
}

impl RegionMap {
    /// Partitions the footprint into `n_region` regions.
    ///
    /// The region count is reduced (with a warning) when the footprint
    /// cannot support that many non-empty regions.
    pub fn new(footprint: &Footprint, n_region: usize) -> SkyResult<Self> {
        if n_region == 0 {
            return Err(SkyError::invalid_input("region count must be >= 1"));
        }
        if footprint.is_empty() {
            return Err(SkyError::invalid_input("cannot regionate an empty footprint"));
        }

        let level = find_region_level(footprint, n_region);
        let mut covering = footprint.simple_covering(level);
        covering.sort_by_key(|key| (key.stripe(), *key));

        let n_region = if covering.len() < n_region {
            log::warn!(
                "footprint supports only {} regions at level {}; reducing from {}",
                covering.len(),
                level,
                n_region
            );
            covering.len()
        } else {
            n_region
        };

        let weights: Vec<f64> = covering
            .iter()
            .map(|key| footprint.unmasked_fraction(key))
            .collect();
        let unit_area = PixelKey::average_area(level);
        let total_area: f64 = weights.iter().map(|w| w * unit_area).sum();
        let mean_area = total_area / covering.len() as f64;
        let area_break = total_area / n_region as f64;

        let sections = find_sections(&covering, total_area, n_region, level);

        // Sweep the sections in order, accumulating weighted area; open a
        // new region whenever the cumulative area crosses the next break
        // point (minus most of one mean pixel, so the crossing pixel does
        // not overshoot). The last region takes everything left.
        let mut assignments = Vec::with_capacity(covering.len());
        let mut region_area = vec![0.0; n_region];
        let mut cumulative = 0.0;
        let mut region = 0usize;
        for section in &sections {
            for &idx in section {
                let px_area = weights[idx] * unit_area;
                let next_break = area_break * (region as f64 + 1.0);
                if cumulative + 0.75 * mean_area >= next_break && region < n_region - 1 {
                    region += 1;
                }
                assignments.push((covering[idx], region));
                region_area[region] += px_area;
                cumulative += px_area;
            }
        }

        // Empty regions mean the footprint was too fragmented for the
        // requested count: drop them and renumber.
        let n_used = region_area.iter().filter(|&&a| a > 0.0).count();
        let (assignments, region_area, n_region) = if n_used < n_region {
            log::warn!(
                "{} of {} regions came up empty; continuing with {}",
                n_region - n_used,
                n_region,
                n_used
            );
            compact_regions(assignments, region_area)
        } else {
            (assignments, region_area, n_region)
        };

        for (k, &area) in region_area.iter().enumerate() {
            let target = total_area / n_region as f64;
            if libm::fabs(area - target) / target > AREA_TOLERANCE {
                log::warn!(
                    "region {} area {:.6e} deviates from target {:.6e} by more than {:.0}%",
                    k,
                    area,
                    target,
                    AREA_TOLERANCE * 100.0
                );
            }
        }

        let mut assignments = assignments;
        assignments.sort_by_key(|&(key, _)| key);

        Ok(Self {
            assignments,
            region_area,
            level,
            n_region,
        })
    }

    #[inline]
    pub fn n_region(&self) -> usize {
        self.n_region
    }

    /// The pixelization level regions are defined at.
    #[inline]
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Total area of one region, steradians.
    pub fn region_area(&self, region: usize) -> f64 {
        self.region_area.get(region).copied().unwrap_or(0.0)
    }

    /// The region containing a cell, after promoting it to the region
    /// level. Cells coarser than the region level span several regions
    /// and return `None`.
    pub fn region_of_key(&self, key: &PixelKey) -> Option<usize> {
        if key.level() < self.level {
            return None;
        }
        let promoted = key.parent(self.level);
        self.assignments
            .binary_search_by_key(&promoted, |&(k, _)| k)
            .ok()
            .map(|idx| self.assignments[idx].1)
    }

    /// The region containing a point, if it falls in the footprint
    /// covering.
    pub fn region_of_point(&self, p: &SkyPoint) -> Option<usize> {
        self.region_of_key(&PixelKey::from_sky_point(p, self.level))
    }

    /// The covering pixels assigned to one region.
    pub fn region_covering(&self, region: usize) -> Vec<PixelKey> {
        self.assignments
            .iter()
            .filter(|&&(_, r)| r == region)
            .map(|&(key, _)| key)
            .collect()
    }
}

/// Smallest level giving ~50 covering pixels per region, capped.
fn find_region_level(footprint: &Footprint, n_region: usize) -> u8 {
    let wanted = PIXELS_PER_REGION * n_region;
    let mut level = 0u8;
    while level < MAX_REGION_LEVEL {
        if footprint.simple_covering(level).len() >= wanted {
            break;
        }
        level += 1;
    }
    level
}

/// Groups covering pixel indices into sweep sections: contiguous stripe
/// runs, cut into chunks roughly one region-length wide.
fn find_sections(
    covering: &[PixelKey],
    total_area: f64,
    n_region: usize,
    level: u8,
) -> Vec<Vec<usize>> {
    use std::collections::BTreeMap;

    let mut by_stripe: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for (idx, key) in covering.iter().enumerate() {
        by_stripe.entry(key.stripe()).or_default().push(idx);
    }
    let stripes: Vec<u64> = by_stripe.keys().copied().collect();

    // A region should be roughly square: its side length in radians,
    // divided by one stripe's angular width, gives the section width.
    let region_length = libm::sqrt(total_area / n_region as f64);
    let stripe_width = skystat_core::constants::TWOPI / (4.0 * libm::exp2(level as f64));
    let section_width = ((region_length / stripe_width) as usize).max(1);

    let mut sections: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut run_len = 0usize;
    for (pos, &stripe) in stripes.iter().enumerate() {
        let contiguous = pos > 0 && stripes[pos - 1] + 1 == stripe;
        if run_len == section_width || (pos > 0 && !contiguous) {
            if !current.is_empty() {
                sections.push(std::mem::take(&mut current));
            }
            run_len = 0;
        }
        current.extend(by_stripe[&stripe].iter().copied());
        run_len += 1;
    }
    if !current.is_empty() {
        sections.push(current);
    }
    sections
}

/// Renumbers regions after empty ones are dropped.
fn compact_regions(
    assignments: Vec<(PixelKey, usize)>,
    region_area: Vec<f64>,
) -> (Vec<(PixelKey, usize)>, Vec<f64>, usize) {
    let mut remap = vec![usize::MAX; region_area.len()];
    let mut kept = Vec::new();
    for (old, &area) in region_area.iter().enumerate() {
        if area > 0.0 {
            remap[old] = kept.len();
            kept.push(area);
        }
    }
    let n_region = kept.len();
    let assignments = assignments
        .into_iter()
        .map(|(key, r)| (key, remap[r]))
        .collect();
    (assignments, kept, n_region)
}
