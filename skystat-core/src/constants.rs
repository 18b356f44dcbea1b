//! Numerical constants shared across the workspace.

#[allow(clippy::excessive_precision)]
#[allow(clippy::approx_constant)]
pub const PI: f64 = 3.141592653589793238462643;

#[allow(clippy::excessive_precision)]
#[allow(clippy::approx_constant)]
pub const HALF_PI: f64 = 1.5707963267948966192313216;

#[allow(clippy::excessive_precision)]
#[allow(clippy::approx_constant)]
pub const QUARTER_PI: f64 = 0.7853981633974483096156608;

#[allow(clippy::excessive_precision)]
#[allow(clippy::approx_constant)]
pub const TWOPI: f64 = 6.283185307179586476925287;

#[allow(clippy::excessive_precision)]
pub const DEG_TO_RAD: f64 = 1.745329251994329576923691e-2;

#[allow(clippy::excessive_precision)]
pub const RAD_TO_DEG: f64 = 57.29577951308232087679815;

/// Square degrees per steradian.
#[allow(clippy::excessive_precision)]
pub const STRAD_TO_DEG2: f64 = 3282.806350011743794781695;

/// Total solid angle of the sphere, in steradians.
pub const SPHERE_AREA: f64 = 4.0 * PI;

/// Deepest level of the quadtree pixelization. Cell sides at this level
/// are below a milliarcsecond, far finer than any survey footprint.
pub const MAX_LEVEL: u8 = 30;

/// Number of base faces in the cube pixelization.
pub const NUM_FACES: u64 = 6;

/// The single tolerance used for angular-bound comparisons. Every
/// inclusive bound check in the workspace goes through
/// [`crate::math::almost_ge`] / [`crate::math::almost_le`] with this value.
pub const FLOAT_TOLERANCE: f64 = 1.0e-10;
