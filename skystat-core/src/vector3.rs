//! 3D Cartesian vectors for directions on the celestial sphere.
//!
//! Sky positions enter as spherical coordinates (longitude/latitude) but
//! all of the pixelization and pair-counting math is cleanest in Cartesian
//! form. The typical workflow is:
//!
//! 1. Convert spherical → Cartesian with [`from_spherical`](Vector3::from_spherical)
//! 2. Work with dot products (for unit vectors, `a.dot(&b)` = cos of the
//!    separation angle)
//! 3. Convert back with [`to_spherical`](Vector3::to_spherical)
//!
//! ```
//! use skystat_core::Vector3;
//!
//! let a = Vector3::from_spherical(0.0, 0.0);
//! let b = Vector3::from_spherical(0.0, std::f64::consts::FRAC_PI_2);
//! assert!((a.angular_separation(&b) - std::f64::consts::FRAC_PI_2).abs() < 1e-15);
//! ```

use std::fmt;

/// A 3D Cartesian vector.
///
/// Directions on the unit sphere are represented as unit vectors; the
/// spherical convention is longitude from +X toward +Y, latitude from the
/// XY plane toward +Z.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    /// Creates a new vector from x, y, z components.
    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns the zero vector `[0, 0, 0]`.
    #[inline]
    pub fn zeros() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Returns the unit vector along the X axis `[1, 0, 0]`.
    #[inline]
    pub fn x_axis() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    /// Returns the unit vector along the Y axis `[0, 1, 0]`.
    #[inline]
    pub fn y_axis() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }

    /// Returns the unit vector along the Z axis `[0, 0, 1]`.
    #[inline]
    pub fn z_axis() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    /// Returns the Euclidean length of the vector.
    #[inline]
    pub fn magnitude(&self) -> f64 {
        libm::sqrt(self.x * self.x + self.y * self.y + self.z * self.z)
    }

    /// Returns the squared magnitude. Faster than
    /// [`magnitude`](Self::magnitude) when only comparisons are needed.
    #[inline]
    pub fn magnitude_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Returns a unit vector pointing in the same direction.
    ///
    /// The zero vector normalizes to itself (avoids NaN).
    pub fn normalize(&self) -> Self {
        let mag = self.magnitude();
        if mag == 0.0 {
            *self
        } else {
            Self::new(self.x / mag, self.y / mag, self.z / mag)
        }
    }

    /// Computes the dot product with another vector.
    ///
    /// For unit vectors this is the cosine of the separation angle.
    #[inline]
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Computes the cross product with another vector.
    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Angular separation between two unit vectors, in radians.
    ///
    /// Uses `atan2(‖a×b‖, a·b)`, which stays accurate for very small and
    /// very large separations where `acos(a·b)` loses precision.
    pub fn angular_separation(&self, other: &Self) -> f64 {
        let cross_mag = self.cross(other).magnitude();
        libm::atan2(cross_mag, self.dot(other))
    }

    /// Creates a unit vector from spherical coordinates.
    ///
    /// - `lon`: azimuthal angle from +X toward +Y, in radians
    /// - `lat`: elevation from the XY plane, in radians
    pub fn from_spherical(lon: f64, lat: f64) -> Self {
        let (sin_lon, cos_lon) = libm::sincos(lon);
        let (sin_lat, cos_lat) = libm::sincos(lat);
        Self::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
    }

    /// Converts the vector to spherical coordinates `(lon, lat)`.
    ///
    /// `lon` is in `(-π, π]`, `lat` in `[-π/2, π/2]`. The vector does not
    /// need to be normalized. The zero vector maps to `(0, 0)`.
    pub fn to_spherical(&self) -> (f64, f64) {
        let d2 = self.x * self.x + self.y * self.y;

        let lon = if d2 == 0.0 {
            0.0
        } else {
            libm::atan2(self.y, self.x)
        };
        let lat = if self.z == 0.0 {
            0.0
        } else {
            libm::atan2(self.z, libm::sqrt(d2))
        };

        (lon, lat)
    }
}

/// Vector + Vector
impl std::ops::Add for Vector3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

/// Vector - Vector
impl std::ops::Sub for Vector3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Vector * scalar
impl std::ops::Mul<f64> for Vector3 {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

/// scalar * Vector
impl std::ops::Mul<Vector3> for f64 {
    type Output = Vector3;

    fn mul(self, vec: Vector3) -> Vector3 {
        vec * self
    }
}

/// -Vector
impl std::ops::Neg for Vector3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector3({:.9}, {:.9}, {:.9})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HALF_PI;

    #[test]
    fn test_construction() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(v.x, 1.0);
        assert_eq!(v.y, 2.0);
        assert_eq!(v.z, 3.0);
        assert_eq!(Vector3::x_axis(), Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(Vector3::zeros().magnitude(), 0.0);
    }

    #[test]
    fn test_magnitude_and_normalize() {
        let v = Vector3::new(3.0, 4.0, 0.0);
        assert_eq!(v.magnitude(), 5.0);
        assert_eq!(v.magnitude_squared(), 25.0);

        let unit = v.normalize();
        assert!((unit.magnitude() - 1.0).abs() < 1e-15);
        assert_eq!(unit, Vector3::new(0.6, 0.8, 0.0));

        let zero = Vector3::zeros();
        assert_eq!(zero.normalize(), zero);
    }

    #[test]
    fn test_dot_cross() {
        let x = Vector3::x_axis();
        let y = Vector3::y_axis();
        assert_eq!(x.dot(&y), 0.0);
        assert_eq!(x.cross(&y), Vector3::z_axis());

        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(4.0, 5.0, 6.0);
        assert_eq!(a.dot(&b), 32.0);
    }

    #[test]
    fn test_arithmetic() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, Vector3::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Vector3::new(3.0, 3.0, 3.0));
        assert_eq!(a * 2.0, Vector3::new(2.0, 4.0, 6.0));
        assert_eq!(3.0 * a, Vector3::new(3.0, 6.0, 9.0));
        assert_eq!(-a, Vector3::new(-1.0, -2.0, -3.0));
    }

    #[test]
    fn test_spherical_roundtrip() {
        let v = Vector3::from_spherical(0.0, 0.0);
        assert!((v.x - 1.0).abs() < 1e-15);

        let v = Vector3::from_spherical(HALF_PI, 0.0);
        assert!((v.y - 1.0).abs() < 1e-15);

        let v = Vector3::from_spherical(0.0, HALF_PI);
        assert!((v.z - 1.0).abs() < 1e-15);

        let (lon, lat) = Vector3::new(0.0, 0.0, 1.0).to_spherical();
        assert_eq!(lon, 0.0);
        assert_eq!(lat, HALF_PI);
    }

    #[test]
    fn test_angular_separation() {
        let x = Vector3::x_axis();
        let y = Vector3::y_axis();
        assert!((x.angular_separation(&y) - HALF_PI).abs() < 1e-15);
        assert!((x.angular_separation(&-x) - crate::constants::PI).abs() < 1e-15);
        assert_eq!(x.angular_separation(&x), 0.0);

        // Small-angle accuracy: acos would lose digits here.
        let tiny = 1.0e-8;
        let near = Vector3::from_spherical(tiny, 0.0);
        let sep = x.angular_separation(&near);
        assert!((sep - tiny).abs() < 1e-20, "sep = {}", sep);
    }
}
