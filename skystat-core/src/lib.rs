//! Core geometry for astrostatistical analysis on the celestial sphere.
//!
//! This crate provides the pieces the correlation machinery in
//! `skystat-correlate` is built from:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`pixel`] | Hierarchical cube-face pixelization and the 64-bit [`PixelKey`] |
//! | [`cap`] | Spherical caps ([`CircleBound`]) and cap separation ranges |
//! | [`bound`] | The [`Bound`] capability trait and generic covering drivers |
//! | [`vector3`] | 3D Cartesian directions |
//! | [`point`] | Weighted sky points |
//! | [`math`] | Tolerant bound comparisons with the single shared epsilon |
//! | [`errors`] | [`SkyError`] / [`SkyResult`] |
//! | [`constants`] | Angle conversions, sphere area, pixelization limits |
//!
//! Angles are radians everywhere inside the workspace; degrees appear only
//! at the external I/O boundary.

pub mod bound;
pub mod cap;
pub mod constants;
pub mod errors;
pub mod math;
pub mod pixel;
pub mod point;
pub mod vector3;

pub use bound::Bound;
pub use cap::CircleBound;
pub use errors::{SkyError, SkyResult};
pub use pixel::PixelKey;
pub use point::SkyPoint;
pub use vector3::Vector3;
