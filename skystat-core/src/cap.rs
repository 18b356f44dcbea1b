//! Spherical caps (circular bounds on the sphere).
//!
//! A [`CircleBound`] is the set of directions within a fixed angular radius
//! of an axis. Caps bound tree nodes and pixel cells; the dual-tree pair
//! walk prunes on the separation range between two caps.
//!
//! The radius is stored as the cap height `h = 1 − cos(r)`, which makes
//! containment a single dot product with no transcendental calls.

use crate::constants::PI;
use crate::math::almost_le;
use crate::point::SkyPoint;
use crate::vector3::Vector3;

/// A spherical cap: axis plus angular radius.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CircleBound {
    axis: Vector3,
    /// Cap height, `1 − cos(radius)`. 0 is a point, 2 the full sphere.
    height: f64,
}

impl CircleBound {
    /// Creates a cap from an axis and angular radius in radians.
    pub fn from_radius(axis: Vector3, radius: f64) -> Self {
        let clamped = radius.clamp(0.0, PI);
        Self {
            axis: axis.normalize(),
            height: 1.0 - libm::cos(clamped),
        }
    }

    /// Creates a cap from an axis and height `1 − cos(radius)`.
    pub fn from_height(axis: Vector3, height: f64) -> Self {
        Self {
            axis: axis.normalize(),
            height: height.clamp(0.0, 2.0),
        }
    }

    /// A zero-radius cap at the given axis.
    pub fn from_point(axis: Vector3) -> Self {
        Self::from_height(axis, 0.0)
    }

    /// The cap axis (unit vector).
    #[inline]
    pub fn axis(&self) -> &Vector3 {
        &self.axis
    }

    /// The cap height `1 − cos(radius)`.
    #[inline]
    pub fn height(&self) -> f64 {
        self.height
    }

    /// The angular radius in radians.
    pub fn radius(&self) -> f64 {
        libm::acos((1.0 - self.height).clamp(-1.0, 1.0))
    }

    /// Solid angle of the cap in steradians: `2π·h`.
    pub fn area(&self) -> f64 {
        2.0 * PI * self.height
    }

    /// Whether the direction lies inside the cap (inclusive).
    #[inline]
    pub fn contains_vector(&self, v: &Vector3) -> bool {
        almost_le(1.0 - self.axis.dot(v), self.height)
    }

    /// Whether the point lies inside the cap (inclusive).
    #[inline]
    pub fn contains(&self, p: &SkyPoint) -> bool {
        self.contains_vector(p.vector())
    }

    /// Whether another cap lies entirely inside this one.
    pub fn contains_cap(&self, other: &CircleBound) -> bool {
        let d = self.axis.angular_separation(&other.axis);
        almost_le(d + other.radius(), self.radius())
    }

    /// Whether the two caps overlap.
    pub fn intersects(&self, other: &CircleBound) -> bool {
        let d = self.axis.angular_separation(&other.axis);
        almost_le(d, self.radius() + other.radius())
    }

    /// The range of angular separations `[θ_lo, θ_hi]` between any
    /// direction in this cap and any direction in `other`, clamped to
    /// `[0, π]`.
    pub fn separation_range(&self, other: &CircleBound) -> (f64, f64) {
        let d = self.axis.angular_separation(&other.axis);
        let spread = self.radius() + other.radius();
        ((d - spread).max(0.0), (d + spread).min(PI))
    }

    /// Grows the cap to include the given direction.
    pub fn add_vector(&mut self, v: &Vector3) {
        let needed = 1.0 - self.axis.dot(v);
        if needed > self.height {
            self.height = needed.min(2.0);
        }
    }

    /// Grows the cap to include another cap entirely.
    pub fn add_cap(&mut self, other: &CircleBound) {
        let d = self.axis.angular_separation(&other.axis);
        let needed_radius = d + other.radius();
        if needed_radius >= PI {
            self.height = 2.0;
        } else {
            let needed = 1.0 - libm::cos(needed_radius);
            if needed > self.height {
                self.height = needed;
            }
        }
    }
}
