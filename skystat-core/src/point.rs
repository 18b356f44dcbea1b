//! Weighted points on the unit sphere.
//!
//! A [`SkyPoint`] is a unit direction plus a non-negative weight. Catalog
//! objects (galaxies) and generated randoms are both represented this way;
//! an unweighted catalog uses weight 1. Angles are degrees at the external
//! boundary and radians internally, matching the I/O convention.

use crate::constants::DEG_TO_RAD;
use crate::vector3::Vector3;

/// A weighted direction on the unit sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkyPoint {
    vector: Vector3,
    weight: f64,
}

impl SkyPoint {
    /// Creates a point from a direction vector, normalizing it.
    pub fn from_vector(vector: Vector3, weight: f64) -> Self {
        Self {
            vector: vector.normalize(),
            weight,
        }
    }

    /// Creates a point from longitude/latitude in radians, weight 1.
    pub fn from_radians(lon: f64, lat: f64) -> Self {
        Self::from_radians_weighted(lon, lat, 1.0)
    }

    /// Creates a weighted point from longitude/latitude in radians.
    pub fn from_radians_weighted(lon: f64, lat: f64, weight: f64) -> Self {
        Self {
            vector: Vector3::from_spherical(lon, lat),
            weight,
        }
    }

    /// Creates a point from longitude/latitude in degrees, weight 1.
    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self::from_degrees_weighted(lon_deg, lat_deg, 1.0)
    }

    /// Creates a weighted point from longitude/latitude in degrees.
    pub fn from_degrees_weighted(lon_deg: f64, lat_deg: f64, weight: f64) -> Self {
        Self::from_radians_weighted(lon_deg * DEG_TO_RAD, lat_deg * DEG_TO_RAD, weight)
    }

    /// The unit direction vector.
    #[inline]
    pub fn vector(&self) -> &Vector3 {
        &self.vector
    }

    /// The point weight.
    #[inline]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Returns a copy with a different weight.
    pub fn with_weight(&self, weight: f64) -> Self {
        Self {
            vector: self.vector,
            weight,
        }
    }

    /// Cosine of the separation to another point.
    #[inline]
    pub fn cos_separation(&self, other: &Self) -> f64 {
        self.vector.dot(&other.vector)
    }

    /// Squared sine of the separation to another point.
    ///
    /// Cheap form for the pair-counting inner loop: `‖a×b‖² = sin²θ` for
    /// unit vectors, no transcendental calls.
    #[inline]
    pub fn sin2_separation(&self, other: &Self) -> f64 {
        self.vector.cross(&other.vector).magnitude_squared()
    }

    /// Angular separation to another point, in radians.
    pub fn angular_separation(&self, other: &Self) -> f64 {
        self.vector.angular_separation(&other.vector)
    }

    /// Longitude/latitude in radians.
    pub fn to_spherical(&self) -> (f64, f64) {
        self.vector.to_spherical()
    }
}
