//! Survey footprints: weighted pixel-set bounds.
//!
//! A [`Footprint`] describes the observed part of the sky as an ordered
//! set of disjoint [`PixelKey`] cells, each carrying the fraction of its
//! area that was actually observed. It answers containment and coverage
//! queries for the correlation machinery and generates uniform random
//! points for the Landy–Szalay estimator.
//!
//! Footprints are built once (from explicit pixels or by covering an
//! analytic shape) and read-only afterwards.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use skystat_core::constants::MAX_LEVEL;
use skystat_core::{Bound, CircleBound, PixelKey, SkyError, SkyPoint, SkyResult, Vector3};

/// One weighted cell of a footprint.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FootprintPixel {
    pub key: PixelKey,
    /// Observed fraction of the cell, in (0, 1].
    pub weight: f64,
}

impl FootprintPixel {
    pub fn new(key: PixelKey, weight: f64) -> Self {
        Self { key, weight }
    }

    /// Weighted solid angle of the cell.
    pub fn area(&self) -> f64 {
        self.weight * PixelKey::average_area(self.key.level())
    }
}

/// The observed region of sky as disjoint weighted pixels.
#[derive(Debug, Clone)]
pub struct Footprint {
    /// Sorted by key; pairwise disjoint; weights in (0, 1].
    pixels: Vec<FootprintPixel>,
    area: f64,
    bound: CircleBound,
    center: Vector3,
    /// Cumulative weighted area, for random sampling.
    cumulative_area: Vec<f64>,
}

impl Footprint {
    /// Builds a footprint from explicit weighted pixels.
    ///
    /// Pixels are sorted; zero-weight pixels are dropped. Returns
    /// `InvalidInput` when the set is empty (or becomes empty), a weight
    /// falls outside [0, 1], or any two pixels overlap.
    pub fn from_pixels(pixels: Vec<FootprintPixel>) -> SkyResult<Self> {
        for px in &pixels {
            if !px.weight.is_finite() || px.weight < 0.0 || px.weight > 1.0 {
                return Err(SkyError::invalid_input(format!(
                    "pixel {} has weight {} outside [0, 1]",
                    px.key, px.weight
                )));
            }
        }
        let mut pixels: Vec<FootprintPixel> =
            pixels.into_iter().filter(|px| px.weight > 0.0).collect();
        if pixels.is_empty() {
            return Err(SkyError::invalid_input("footprint has zero area"));
        }
        pixels.sort_by_key(|px| px.key);
        for window in pixels.windows(2) {
            if window[0].key.range_max() >= window[1].key.range_min() {
                return Err(SkyError::invalid_input(format!(
                    "pixels {} and {} overlap",
                    window[0].key, window[1].key
                )));
            }
        }
        Ok(Self::from_sorted_disjoint(pixels))
    }

    /// Builds a footprint by covering an analytic shape at a fixed level.
    ///
    /// Cell weights estimate the fraction of each cell inside the shape,
    /// sampled on a 4×4 sub-grid; fully interior cells get weight 1.
    pub fn from_bound(shape: &impl Bound, level: u8) -> SkyResult<Self> {
        let covering = shape.get_simple_covering(level);
        let mut pixels = Vec::with_capacity(covering.len());
        for key in covering {
            let weight = contained_fraction(shape, &key);
            if weight > 0.0 {
                pixels.push(FootprintPixel::new(key, weight));
            }
        }
        if pixels.is_empty() {
            return Err(SkyError::invalid_input(
                "shape covering produced no observed pixels",
            ));
        }
        Ok(Self::from_sorted_disjoint(pixels))
    }

    /// The whole sphere at weight 1.
    pub fn full_sky() -> Self {
        let pixels = PixelKey::base_faces()
            .into_iter()
            .map(|key| FootprintPixel::new(key, 1.0))
            .collect();
        Self::from_sorted_disjoint(pixels)
    }

    fn from_sorted_disjoint(pixels: Vec<FootprintPixel>) -> Self {
        let area = pixels.iter().map(|px| px.area()).sum();

        let mut center = Vector3::zeros();
        for px in &pixels {
            center = center + px.key.center() * px.area();
        }
        let center = center.normalize();
        let center = if center.magnitude() == 0.0 {
            // Degenerate symmetric footprint (e.g. full sky).
            Vector3::z_axis()
        } else {
            center
        };

        let mut bound = CircleBound::from_point(center);
        for px in &pixels {
            bound.add_cap(&px.key.cap());
        }

        let mut cumulative_area = Vec::with_capacity(pixels.len());
        let mut running = 0.0;
        for px in &pixels {
            running += px.area();
            cumulative_area.push(running);
        }

        Self {
            pixels,
            area,
            bound,
            center,
            cumulative_area,
        }
    }

    /// The stored pixels, sorted by key.
    pub fn pixels(&self) -> &[FootprintPixel] {
        &self.pixels
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// The stored pixel that is this cell or an ancestor of it, if any.
    ///
    /// Binary search on the key range: stored pixels are disjoint, so
    /// their descendant ranges are disjoint sorted intervals.
    pub fn find_enclosing(&self, key: &PixelKey) -> Option<&FootprintPixel> {
        let idx = self
            .pixels
            .partition_point(|px| px.key.range_min() <= key.raw());
        if idx == 0 {
            return None;
        }
        let px = &self.pixels[idx - 1];
        px.key.contains_key(key).then_some(px)
    }

    /// Stored pixels that are descendants of this cell.
    fn descendants(&self, key: &PixelKey) -> &[FootprintPixel] {
        let lo = self
            .pixels
            .partition_point(|px| px.key.raw() < key.range_min());
        let hi = self
            .pixels
            .partition_point(|px| px.key.raw() <= key.range_max());
        &self.pixels[lo..hi]
    }

    /// Fraction of the cell's area inside the footprint, in [0, 1].
    pub fn unmasked_fraction(&self, key: &PixelKey) -> f64 {
        if let Some(px) = self.find_enclosing(key) {
            return px.weight;
        }
        let cell_area = PixelKey::average_area(key.level());
        let covered: f64 = self.descendants(key).iter().map(|px| px.area()).sum();
        (covered / cell_area).min(1.0)
    }

    /// Covering of the footprint at a fixed level. Stored pixels coarser
    /// than `level` expand to their descendants, finer ones promote to
    /// their ancestor; keys come back sorted and unique.
    pub fn simple_covering(&self, level: u8) -> Vec<PixelKey> {
        let mut output = Vec::new();
        for px in &self.pixels {
            if px.key.level() >= level {
                output.push(px.key.parent(level));
            } else {
                expand_to_level(px.key, level, &mut output);
            }
        }
        output.sort();
        output.dedup();
        output
    }

    /// Covering with at most `max_pixels` cells at mixed levels.
    pub fn size_covering(&self, max_pixels: usize) -> Vec<PixelKey> {
        self.get_covering(MAX_LEVEL, max_pixels)
    }

    /// Covering refined until the relative covered-area error drops to
    /// `tolerance`. Cells already inside a stored pixel are exact and
    /// never refined.
    pub fn area_covering(&self, tolerance: f64) -> Vec<PixelKey> {
        let min_level = self
            .pixels
            .iter()
            .map(|px| px.key.level())
            .min()
            .unwrap_or(0);
        let mut covering = self.simple_covering(min_level);
        loop {
            let excess: f64 = covering
                .iter()
                .filter(|key| self.find_enclosing(key).is_none())
                .map(|key| {
                    PixelKey::average_area(key.level()) * (1.0 - self.unmasked_fraction(key))
                })
                .sum();
            if excess <= tolerance * self.area {
                break;
            }
            let mut refined = Vec::with_capacity(covering.len() * 2);
            let mut progressed = false;
            for key in covering {
                let refinable =
                    self.find_enclosing(&key).is_none() && key.level() < MAX_LEVEL;
                if refinable {
                    progressed = true;
                    for child in key.children() {
                        if !self.descendants(&child).is_empty()
                            || self.find_enclosing(&child).is_some()
                        {
                            refined.push(child);
                        }
                    }
                } else {
                    refined.push(key);
                }
            }
            covering = refined;
            if !progressed {
                break;
            }
        }
        covering.sort();
        covering
    }

    /// Draws `n` points uniformly over the footprint (up to the
    /// pixelization): a pixel is chosen with probability proportional to
    /// its weighted area, then a direction is drawn inside the cell by
    /// rejection on the face-plane solid-angle density.
    pub fn generate_random_points(&self, n: usize, rng: &mut ChaCha8Rng) -> Vec<SkyPoint> {
        // Construction rejects empty footprints, so the table is never empty.
        let total = match self.cumulative_area.last() {
            Some(&total) => total,
            None => return Vec::new(),
        };
        let mut points = Vec::with_capacity(n);
        for _ in 0..n {
            let target = rng.gen::<f64>() * total;
            let idx = self.cumulative_area.partition_point(|&cum| cum <= target);
            let key = self.pixels[idx.min(self.pixels.len() - 1)].key;
            points.push(sample_in_cell(&key, rng));
        }
        points
    }
}

impl Bound for Footprint {
    fn area(&self) -> f64 {
        self.area
    }

    fn contains(&self, p: &SkyPoint) -> bool {
        let leaf = PixelKey::from_sky_point(p, MAX_LEVEL);
        self.find_enclosing(&leaf).is_some()
    }

    fn may_intersect(&self, key: &PixelKey) -> bool {
        self.find_enclosing(key).is_some() || !self.descendants(key).is_empty()
    }

    fn get_bound(&self) -> CircleBound {
        self.bound
    }

    fn get_center(&self) -> Vector3 {
        self.center
    }
}

fn expand_to_level(key: PixelKey, level: u8, output: &mut Vec<PixelKey>) {
    if key.level() == level {
        output.push(key);
        return;
    }
    for child in key.children() {
        expand_to_level(child, level, output);
    }
}

/// Fraction of the cell inside the shape, sampled on a 4×4 grid of
/// sub-cell centers.
fn contained_fraction(shape: &impl Bound, key: &PixelKey) -> f64 {
    const GRID: usize = 4;
    let (u0, u1, v0, v1) = key.uv_bounds();
    let mut hits = 0usize;
    for iu in 0..GRID {
        for iv in 0..GRID {
            let u = u0 + (u1 - u0) * (iu as f64 + 0.5) / GRID as f64;
            let v = v0 + (v1 - v0) * (iv as f64 + 0.5) / GRID as f64;
            let p = SkyPoint::from_vector(key.face_direction(u, v), 1.0);
            if shape.contains(&p) {
                hits += 1;
            }
        }
    }
    hits as f64 / (GRID * GRID) as f64
}

/// Uniform direction inside a cell, by rejection against the solid-angle
/// density `(1 + u² + v²)^{-3/2}` on the face plane.
fn sample_in_cell(key: &PixelKey, rng: &mut ChaCha8Rng) -> SkyPoint {
    let (u0, u1, v0, v1) = key.uv_bounds();
    // Density peaks at the rectangle point closest to the face center.
    let u_near = nearest_to_zero(u0, u1);
    let v_near = nearest_to_zero(v0, v1);
    let max_density = solid_angle_density(u_near, v_near);
    loop {
        let u = rng.gen_range(u0..u1);
        let v = rng.gen_range(v0..v1);
        if rng.gen::<f64>() * max_density <= solid_angle_density(u, v) {
            return SkyPoint::from_vector(key.face_direction(u, v), 1.0);
        }
    }
}

#[inline]
fn nearest_to_zero(lo: f64, hi: f64) -> f64 {
    if lo > 0.0 {
        lo
    } else if hi < 0.0 {
        hi
    } else {
        0.0
    }
}

#[inline]
fn solid_angle_density(u: f64, v: f64) -> f64 {
    let r2 = 1.0 + u * u + v * v;
    1.0 / (r2 * libm::sqrt(r2))
}
