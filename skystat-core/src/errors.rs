//! Error types for sphere pixelization and correlation analysis.
//!
//! A single unified error type [`SkyError`] covers the failure modes of the
//! workspace: bad caller input, broken pixelization invariants, degenerate
//! regionation, numerically empty estimators, and the I/O layer.
//!
//! # Error Categories
//!
//! | Variant | Use Case | Fatal? |
//! |---------|----------|--------|
//! | [`InvalidInput`](SkyError::InvalidInput) | Inverted ranges, non-finite values, empty footprints | No |
//! | [`Pixelization`](SkyError::Pixelization) | A key violates a tiling invariant — programming bug | Yes |
//! | [`EmptyRegion`](SkyError::EmptyRegion) | Regionation produced an empty region | No |
//! | [`NumericDegeneracy`](SkyError::NumericDegeneracy) | RR = 0 or pixel weight = 0 in a bin | No |
//! | [`Io`](SkyError::Io) | File read/write failures | No |
//! | [`Parse`](SkyError::Parse) | Malformed ASCII records | No |
//!
//! Most functions return [`SkyResult<T>`]. Use the constructor methods for
//! consistent error creation:
//!
//! ```
//! use skystat_core::errors::SkyError;
//!
//! fn check_range(theta_min: f64, theta_max: f64) -> Result<(), SkyError> {
//!     if theta_min >= theta_max {
//!         return Err(SkyError::invalid_input("inverted angular range"));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for the skystat workspace.
#[derive(Error, Debug)]
pub enum SkyError {
    /// Caller-supplied input is unusable. Reported before any work begins.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A pixel key violates a tiling invariant. This indicates a
    /// programming bug, not bad data; callers should abort.
    #[error("Pixelization invariant violated: {message}")]
    Pixelization { message: String },

    /// Regionation produced a region with no covering pixels.
    #[error("Region {region} is empty: {message}")]
    EmptyRegion { region: usize, message: String },

    /// An estimator denominator (RR or pixel weight) came out zero.
    /// The affected bin reports w = NaN; the computation continues.
    #[error("Numerical degeneracy in {context}")]
    NumericDegeneracy { context: String },

    /// File I/O failure in the collaborator layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed record in an ASCII footprint or catalog file.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Convenience alias for `Result<T, SkyError>`.
pub type SkyResult<T> = Result<T, SkyError>;

impl SkyError {
    /// Creates an [`InvalidInput`](Self::InvalidInput) error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a [`Pixelization`](Self::Pixelization) error.
    pub fn pixelization(message: impl Into<String>) -> Self {
        Self::Pixelization {
            message: message.into(),
        }
    }

    /// Creates an [`EmptyRegion`](Self::EmptyRegion) error.
    pub fn empty_region(region: usize, message: impl Into<String>) -> Self {
        Self::EmptyRegion {
            region,
            message: message.into(),
        }
    }

    /// Creates a [`NumericDegeneracy`](Self::NumericDegeneracy) error.
    pub fn numeric_degeneracy(context: impl Into<String>) -> Self {
        Self::NumericDegeneracy {
            context: context.into(),
        }
    }

    /// Creates a [`Parse`](Self::Parse) error.
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Returns `true` if the computation must abort.
    ///
    /// Only [`Pixelization`](Self::Pixelization) is fatal: it means an
    /// internal invariant broke. Everything else is recorded or surfaced
    /// to the caller and the pipeline can continue or be retried with
    /// corrected input.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Pixelization { .. })
    }
}
