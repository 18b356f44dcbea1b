//! Hierarchical pixelization of the unit sphere.
//!
//! The sphere is projected onto the six faces of a cube and each face is
//! recursively divided into quadrants, giving a quadtree whose leaves tile
//! the sky at exponentially decreasing scale. A cell is identified by a
//! [`PixelKey`]: a 64-bit integer packing the base face, the Z-order
//! position within the face, and the subdivision level.
//!
//! # Key layout
//!
//! ```text
//! bits 63..61   base face (0-5)
//! bits 60..s+1  Z-order interleave of the (i, j) cell position, 2·level bits
//! bit  s        sentinel 1 marking the level, s = 60 − 2·level
//! bits s-1..0   zero
//! ```
//!
//! The sentinel encoding gives constant-time level extraction, parent and
//! child arithmetic, and makes every cell's descendants a contiguous key
//! range, so containment tests and ordered pixel sets reduce to plain
//! `u64` comparisons.
//!
//! # Projection
//!
//! Cell edges are placed with the tangent projection
//! `u = tan(π/4·(2t − 1))`, which keeps the ratio of the largest to the
//! smallest cell area at any level near 1.4, under the factor-2 bound
//! the correlation estimators assume.

use crate::cap::CircleBound;
use crate::constants::{HALF_PI, MAX_LEVEL, NUM_FACES, PI, SPHERE_AREA, TWOPI};
use crate::errors::{SkyError, SkyResult};
use crate::point::SkyPoint;
use crate::vector3::Vector3;

const FACE_SHIFT: u32 = 61;
const POSITION_BITS: u32 = 60;

/// A cell of the hierarchical sphere pixelization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PixelKey(u64);

impl PixelKey {
    /// The cell containing `v` at the given level.
    ///
    /// Deterministic: identical inputs always return identical keys.
    pub fn from_point(v: &Vector3, level: u8) -> Self {
        debug_assert!(level <= MAX_LEVEL);
        let (face, u, w) = xyz_to_face_uv(v);
        let n = 1u64 << level;
        let i = st_to_index(uv_to_st(u), n);
        let j = st_to_index(uv_to_st(w), n);
        Self::from_face_ij(face, i, j, level)
    }

    /// The cell containing a sky point at the given level.
    pub fn from_sky_point(p: &SkyPoint, level: u8) -> Self {
        Self::from_point(p.vector(), level)
    }

    /// Builds a key from face and cell coordinates.
    pub fn from_face_ij(face: u8, i: u64, j: u64, level: u8) -> Self {
        debug_assert!((face as u64) < NUM_FACES);
        debug_assert!(level <= MAX_LEVEL);
        let position = morton_encode(i, j, level);
        let sentinel_bit = POSITION_BITS - 2 * level as u32;
        Self(((face as u64) << FACE_SHIFT) | (position << (sentinel_bit + 1)) | (1 << sentinel_bit))
    }

    /// The six base faces (level-0 cells).
    pub fn base_faces() -> [PixelKey; 6] {
        [0u8, 1, 2, 3, 4, 5].map(|f| Self::from_face_ij(f, 0, 0, 0))
    }

    /// Validates a raw 64-bit identifier (e.g. read from a footprint file).
    pub fn from_raw(raw: u64) -> SkyResult<Self> {
        let key = Self(raw);
        if key.is_valid() {
            Ok(key)
        } else {
            Err(SkyError::pixelization(format!(
                "invalid pixel identifier {:#018x}",
                raw
            )))
        }
    }

    /// The raw 64-bit identifier.
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Whether the key is structurally valid: a real face, a sentinel bit
    /// in an even position at or above bit 0.
    pub fn is_valid(&self) -> bool {
        if self.0 == 0 || (self.0 >> FACE_SHIFT) >= NUM_FACES {
            return false;
        }
        let tz = self.0.trailing_zeros();
        tz <= POSITION_BITS && tz % 2 == 0
    }

    /// The subdivision level, 0 (base face) through [`MAX_LEVEL`].
    #[inline]
    pub fn level(&self) -> u8 {
        ((POSITION_BITS - self.0.trailing_zeros()) / 2) as u8
    }

    /// The base face, 0-5.
    #[inline]
    pub fn face(&self) -> u8 {
        (self.0 >> FACE_SHIFT) as u8
    }

    /// The ancestor cell at a coarser (or equal) level.
    pub fn parent(&self, level: u8) -> Self {
        debug_assert!(level <= self.level());
        let lsb = 1u64 << (POSITION_BITS - 2 * level as u32);
        Self((self.0 & !((lsb << 1) - 1)) | lsb)
    }

    /// The four children, in key order.
    ///
    /// Must not be called on a cell at [`MAX_LEVEL`].
    pub fn children(&self) -> [PixelKey; 4] {
        let level = self.level();
        debug_assert!(level < MAX_LEVEL);
        let old_sentinel = POSITION_BITS - 2 * level as u32;
        let base = self.0 ^ (1 << old_sentinel);
        let new_sentinel = old_sentinel - 2;
        [0u64, 1, 2, 3]
            .map(|k| Self(base | (k << (new_sentinel + 1)) | (1 << new_sentinel)))
    }

    /// Which of its parent's four children this cell is (0-3).
    ///
    /// Matches the ordering of [`children`](Self::children). Must not be
    /// called on a base face.
    pub fn child_position(&self) -> usize {
        let level = self.level();
        debug_assert!(level > 0);
        let shift = POSITION_BITS - 2 * level as u32 + 1;
        ((self.0 >> shift) & 3) as usize
    }

    /// Smallest key of any descendant (inclusive).
    #[inline]
    pub fn range_min(&self) -> u64 {
        let lsb = self.0 & self.0.wrapping_neg();
        self.0 - lsb + 1
    }

    /// Largest key of any descendant (inclusive).
    #[inline]
    pub fn range_max(&self) -> u64 {
        let lsb = self.0 & self.0.wrapping_neg();
        self.0 + lsb - 1
    }

    /// Whether `other` is this cell or one of its descendants.
    #[inline]
    pub fn contains_key(&self, other: &PixelKey) -> bool {
        other.0 >= self.range_min() && other.0 <= self.range_max()
    }

    /// Whether the direction lies inside this cell.
    pub fn contains_vector(&self, v: &Vector3) -> bool {
        PixelKey::from_point(v, self.level()) == *self
    }

    /// Whether the sky point lies inside this cell.
    pub fn contains(&self, p: &SkyPoint) -> bool {
        self.contains_vector(p.vector())
    }

    /// Average cell solid angle at a level, in steradians.
    ///
    /// Exactly `4π / (6·4^level)`: each level step quarters the area.
    #[inline]
    pub fn average_area(level: u8) -> f64 {
        SPHERE_AREA / (NUM_FACES as f64 * libm::exp2(2.0 * level as f64))
    }

    /// Exact solid angle of this cell, in steradians.
    ///
    /// Closed form for the solid angle of a rectangle on a cube face:
    /// the signed sum of `atan(u·v/√(1+u²+v²))` over the corners.
    pub fn exact_area(&self) -> f64 {
        let (u0, u1, v0, v1) = self.uv_bounds();
        corner_solid_angle(u1, v1) - corner_solid_angle(u0, v1) - corner_solid_angle(u1, v0)
            + corner_solid_angle(u0, v0)
    }

    /// The direction at the cell center.
    pub fn center(&self) -> Vector3 {
        let (face, i, j, level) = self.decompose();
        let n = 1u64 << level;
        let u = st_to_uv(index_to_st(i, n, 0.5));
        let v = st_to_uv(index_to_st(j, n, 0.5));
        face_uv_to_xyz(face, u, v).normalize()
    }

    /// The four cell corners, counter-clockwise in (u, v).
    pub fn vertices(&self) -> [Vector3; 4] {
        let (face, i, j, level) = self.decompose();
        let n = 1u64 << level;
        let u0 = st_to_uv(index_to_st(i, n, 0.0));
        let u1 = st_to_uv(index_to_st(i, n, 1.0));
        let v0 = st_to_uv(index_to_st(j, n, 0.0));
        let v1 = st_to_uv(index_to_st(j, n, 1.0));
        [
            face_uv_to_xyz(face, u0, v0).normalize(),
            face_uv_to_xyz(face, u1, v0).normalize(),
            face_uv_to_xyz(face, u1, v1).normalize(),
            face_uv_to_xyz(face, u0, v1).normalize(),
        ]
    }

    /// The direction at face coordinates (u, v) on this cell's face.
    ///
    /// Used with [`uv_bounds`](Self::uv_bounds) to sample points inside
    /// the cell.
    pub fn face_direction(&self, u: f64, v: f64) -> Vector3 {
        face_uv_to_xyz(self.face(), u, v).normalize()
    }

    /// The (u, v) bounds of the cell on its face, `(u0, u1, v0, v1)`.
    pub fn uv_bounds(&self) -> (f64, f64, f64, f64) {
        let (_, i, j, level) = self.decompose();
        let n = 1u64 << level;
        (
            st_to_uv(index_to_st(i, n, 0.0)),
            st_to_uv(index_to_st(i, n, 1.0)),
            st_to_uv(index_to_st(j, n, 0.0)),
            st_to_uv(index_to_st(j, n, 1.0)),
        )
    }

    /// A spherical cap covering the cell: centered on the cell center,
    /// reaching the farthest corner.
    pub fn cap(&self) -> CircleBound {
        let center = self.center();
        let mut height = 0.0f64;
        for vertex in self.vertices() {
            let h = 1.0 - center.dot(&vertex);
            if h > height {
                height = h;
            }
        }
        CircleBound::from_height(center, height)
    }

    /// The neighboring cells at the same level: 8 for an interior cell,
    /// fewer at cube corners. Never includes `self`.
    ///
    /// Offsets are taken in cell coordinates; a step off the face edge
    /// produces an unnormalized direction beyond the face square, which
    /// projects onto the correct adjacent face.
    pub fn neighbors(&self) -> Vec<PixelKey> {
        let (face, i, j, level) = self.decompose();
        let n = 1u64 << level;
        let mut result = Vec::with_capacity(8);
        for di in -1i64..=1 {
            for dj in -1i64..=1 {
                if di == 0 && dj == 0 {
                    continue;
                }
                let s = (i as f64 + di as f64 + 0.5) / n as f64;
                let t = (j as f64 + dj as f64 + 0.5) / n as f64;
                let u = st_to_uv(s);
                let v = st_to_uv(t);
                let dir = face_uv_to_xyz(face, u, v).normalize();
                let key = PixelKey::from_point(&dir, level);
                if key != *self {
                    result.push(key);
                }
            }
        }
        result.sort();
        result.dedup();
        result
    }

    /// The finest level whose cell scale `sqrt(2·average_area)` still
    /// resolves the angular scale `theta` (radians).
    ///
    /// Returns `None` when no level works: either `theta` is finer than
    /// the deepest pixelization (the caller should fall back to pair
    /// counting) or larger than a base face.
    pub fn level_for_scale(theta: f64) -> Option<u8> {
        if !theta.is_finite() || theta <= 0.0 {
            return None;
        }
        let mut found = None;
        for level in 0..=MAX_LEVEL {
            let scale = libm::sqrt(2.0 * Self::average_area(level));
            if scale >= theta {
                found = Some(level);
            } else {
                break;
            }
        }
        match found {
            // Even the deepest cells are coarser than theta.
            Some(MAX_LEVEL) => None,
            other => other,
        }
    }

    /// Longitude-like band index of the cell center at its level.
    ///
    /// There are `4·2^level` stripes around the sphere, matching the cell
    /// count along the cube equator. Regionation orders covering pixels by
    /// stripe to build contiguous, longitude-aligned regions.
    pub fn stripe(&self) -> u64 {
        let n_stripes = 4 * (1u64 << self.level());
        let (lon, _) = self.center().to_spherical();
        let frac = (lon + PI) / TWOPI;
        ((frac * n_stripes as f64) as u64).min(n_stripes - 1)
    }

    fn decompose(&self) -> (u8, u64, u64, u8) {
        let level = self.level();
        let face = self.face();
        let shift = POSITION_BITS - 2 * level as u32 + 1;
        let position = if level == 0 {
            0
        } else {
            (self.0 >> shift) & ((1u64 << (2 * level as u32)) - 1)
        };
        let (i, j) = morton_decode(position, level);
        (face, i, j, level)
    }
}

impl std::fmt::Display for PixelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interleave `i` (even bits) and `j` (odd bits) into a Z-order index.
fn morton_encode(i: u64, j: u64, level: u8) -> u64 {
    let mut result = 0u64;
    for bit in 0..level as u32 {
        result |= ((i >> bit) & 1) << (2 * bit);
        result |= ((j >> bit) & 1) << (2 * bit + 1);
    }
    result
}

/// Inverse of [`morton_encode`].
fn morton_decode(position: u64, level: u8) -> (u64, u64) {
    let mut i = 0u64;
    let mut j = 0u64;
    for bit in 0..level as u32 {
        i |= ((position >> (2 * bit)) & 1) << bit;
        j |= ((position >> (2 * bit + 1)) & 1) << bit;
    }
    (i, j)
}

/// Tangent projection from cell coordinate `s ∈ [0, 1]` to the cube
/// coordinate `u ∈ [-1, 1]`. Values of `s` outside the unit interval map
/// beyond the face square, which is how neighbor stepping crosses edges.
#[inline]
fn st_to_uv(s: f64) -> f64 {
    libm::tan(HALF_PI * (s - 0.5))
}

/// Inverse of [`st_to_uv`].
#[inline]
fn uv_to_st(u: f64) -> f64 {
    0.5 + libm::atan(u) / HALF_PI
}

#[inline]
fn st_to_index(s: f64, n: u64) -> u64 {
    let i = libm::floor(s * n as f64) as i64;
    i.clamp(0, n as i64 - 1) as u64
}

#[inline]
fn index_to_st(i: u64, n: u64, offset: f64) -> f64 {
    (i as f64 + offset) / n as f64
}

/// Solid-angle primitive for one rectangle corner.
#[inline]
fn corner_solid_angle(u: f64, v: f64) -> f64 {
    libm::atan(u * v / libm::sqrt(1.0 + u * u + v * v))
}

/// Which face contains the direction, and its (u, v) on that face.
fn xyz_to_face_uv(p: &Vector3) -> (u8, f64, f64) {
    let (x, y, z) = (p.x, p.y, p.z);
    let (ax, ay, az) = (libm::fabs(x), libm::fabs(y), libm::fabs(z));

    if ax >= ay && ax >= az {
        if x >= 0.0 {
            (0, -z / ax, y / ax)
        } else {
            (1, z / ax, y / ax)
        }
    } else if ay >= ax && ay >= az {
        if y >= 0.0 {
            (2, x / ay, -z / ay)
        } else {
            (3, x / ay, z / ay)
        }
    } else if z >= 0.0 {
        (4, x / az, y / az)
    } else {
        (5, -x / az, y / az)
    }
}

/// Direction for face coordinates (u, v). Not normalized; valid for
/// |u|, |v| beyond 1, where it points into the adjacent face.
fn face_uv_to_xyz(face: u8, u: f64, v: f64) -> Vector3 {
    match face {
        0 => Vector3::new(1.0, v, -u),
        1 => Vector3::new(-1.0, v, u),
        2 => Vector3::new(u, 1.0, -v),
        3 => Vector3::new(u, -1.0, v),
        4 => Vector3::new(u, v, 1.0),
        _ => Vector3::new(-u, v, -1.0),
    }
}
