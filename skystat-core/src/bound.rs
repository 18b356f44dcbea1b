//! The capability interface for regions on the sphere.
//!
//! Anything that can answer point containment and cell intersection
//! queries (an analytic disk, a pixel-set footprint, a sampled field)
//! implements [`Bound`]. The covering drivers here turn those two answers
//! into disjoint pixel coverings at a fixed level or under a pixel budget,
//! so each concrete region type only supplies its geometry.

use std::collections::VecDeque;

use crate::cap::CircleBound;
use crate::constants::MAX_LEVEL;
use crate::pixel::PixelKey;
use crate::point::SkyPoint;
use crate::vector3::Vector3;

/// A region on the unit sphere.
pub trait Bound {
    /// Solid angle of the region, in steradians.
    fn area(&self) -> f64;

    /// Whether the point lies inside the region.
    fn contains(&self, p: &SkyPoint) -> bool;

    /// Whether the cell could overlap the region. Conservative: may
    /// return `true` for a cell that misses the region, but never `false`
    /// for one that hits it.
    fn may_intersect(&self, key: &PixelKey) -> bool;

    /// A spherical cap enclosing the region.
    fn get_bound(&self) -> CircleBound;

    /// A representative interior direction.
    fn get_center(&self) -> Vector3;

    /// All cells at `level` that may overlap the region. The union of the
    /// returned cells covers the region; keys are sorted and disjoint.
    fn get_simple_covering(&self, level: u8) -> Vec<PixelKey> {
        let mut output = Vec::new();
        let mut queue: VecDeque<PixelKey> = PixelKey::base_faces()
            .into_iter()
            .filter(|face| self.may_intersect(face))
            .collect();
        while let Some(cell) = queue.pop_front() {
            if cell.level() == level {
                output.push(cell);
            } else {
                for child in cell.children() {
                    if self.may_intersect(&child) {
                        queue.push_back(child);
                    }
                }
            }
        }
        output.sort();
        output
    }

    /// A covering of at most `max_pixels` disjoint cells at levels up to
    /// `max_level`. Cells stop being refined once they lie entirely
    /// inside the region's bounding cap or the budget is exhausted, so
    /// the covering is a superset of the region at mixed levels.
    fn get_covering(&self, max_level: u8, max_pixels: usize) -> Vec<PixelKey> {
        let max_level = max_level.min(MAX_LEVEL);
        let enclosing = self.get_bound();
        let mut output = Vec::new();
        let mut queue: VecDeque<PixelKey> = PixelKey::base_faces()
            .into_iter()
            .filter(|face| self.may_intersect(face))
            .collect();
        while let Some(cell) = queue.pop_front() {
            let budget_left = max_pixels.saturating_sub(output.len() + queue.len());
            if cell.level() >= max_level || budget_left < 4 || enclosing.contains_cap(&cell.cap())
            {
                output.push(cell);
                continue;
            }
            let children: Vec<PixelKey> = cell
                .children()
                .into_iter()
                .filter(|child| self.may_intersect(child))
                .collect();
            if children.is_empty() {
                // Conservative parent hit with no child hits; keep the
                // parent so the union stays a superset.
                output.push(cell);
            } else {
                queue.extend(children);
            }
        }
        output.sort();
        output
    }
}

impl Bound for CircleBound {
    fn area(&self) -> f64 {
        CircleBound::area(self)
    }

    fn contains(&self, p: &SkyPoint) -> bool {
        CircleBound::contains(self, p)
    }

    fn may_intersect(&self, key: &PixelKey) -> bool {
        self.intersects(&key.cap())
    }

    fn get_bound(&self) -> CircleBound {
        *self
    }

    fn get_center(&self) -> Vector3 {
        *self.axis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEG_TO_RAD;

    #[test]
    fn test_simple_covering_contains_disk() {
        let disk = CircleBound::from_radius(Vector3::from_spherical(0.4, 0.2), 5.0 * DEG_TO_RAD);
        let covering = disk.get_simple_covering(6);
        assert!(!covering.is_empty());

        // Every boundary sample must land in some covering cell.
        let (lon0, lat0) = disk.axis().to_spherical();
        for step in 0..36 {
            let az = step as f64 * 10.0 * DEG_TO_RAD;
            let lat = lat0 + disk.radius() * libm::cos(az);
            let lon = lon0 + disk.radius() * libm::sin(az) / libm::cos(lat0);
            let p = SkyPoint::from_radians(lon, lat);
            if !disk.contains(&p) {
                continue;
            }
            let leaf = PixelKey::from_sky_point(&p, 6);
            assert!(
                covering.iter().any(|cell| cell.contains_key(&leaf)),
                "boundary sample not covered at azimuth {}",
                az
            );
        }
    }

    #[test]
    fn test_simple_covering_levels_and_order() {
        let disk = CircleBound::from_radius(Vector3::z_axis(), 10.0 * DEG_TO_RAD);
        let covering = disk.get_simple_covering(4);
        for cell in &covering {
            assert_eq!(cell.level(), 4);
        }
        for window in covering.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn test_covering_respects_budget() {
        let disk = CircleBound::from_radius(Vector3::x_axis(), 20.0 * DEG_TO_RAD);
        let covering = disk.get_covering(10, 32);
        assert!(covering.len() <= 32);
        assert!(!covering.is_empty());
        for cell in &covering {
            assert!(cell.level() <= 10);
        }

        // Interior samples stay covered despite the budget.
        for &frac in &[0.0, 0.3, 0.9] {
            let p = SkyPoint::from_radians(frac * disk.radius(), 0.0);
            let leaf = PixelKey::from_sky_point(&p, 10);
            assert!(covering.iter().any(|cell| cell.contains_key(&leaf)));
        }
    }

    #[test]
    fn test_full_sphere_covering() {
        let all = CircleBound::from_radius(Vector3::z_axis(), crate::constants::PI);
        let covering = all.get_simple_covering(0);
        assert_eq!(covering.len(), 6);
    }
}
