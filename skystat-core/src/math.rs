//! Tolerant floating-point comparisons for angular bounds.
//!
//! Every inclusive bound check in the workspace uses these helpers with the
//! single epsilon [`FLOAT_TOLERANCE`](crate::constants::FLOAT_TOLERANCE).

use crate::constants::FLOAT_TOLERANCE;

/// `a >= b` within the shared tolerance.
#[inline]
pub fn almost_ge(a: f64, b: f64) -> bool {
    a >= b - FLOAT_TOLERANCE
}

/// `a <= b` within the shared tolerance.
#[inline]
pub fn almost_le(a: f64, b: f64) -> bool {
    a <= b + FLOAT_TOLERANCE
}

/// `a == b` within the shared tolerance.
#[inline]
pub fn almost_eq(a: f64, b: f64) -> bool {
    libm::fabs(a - b) <= FLOAT_TOLERANCE
}
