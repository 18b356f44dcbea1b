//! ASCII input and output for footprints, catalogs, and results.
//!
//! The formats are deliberately plain:
//!
//! - footprint: one `pixel-id weight` pair per line;
//! - catalog: whitespace-separated columns with longitude and latitude
//!   in degrees, plus optional probability (point weight) and magnitude
//!   columns at configurable positions;
//! - w(θ) table: one row per bin, `theta w sigma_w GG GR RG RR`;
//! - covariance table: `i j C[i,j]`, n² rows.
//!
//! Angles are degrees in every file; conversion to radians happens at
//! this boundary. Output files are written atomically from a buffer, so
//! a failed run leaves no partial tables behind.
//!
//! Lines starting with `#` and blank lines are ignored on input.

use std::fs;
use std::path::Path;

use skystat_core::constants::RAD_TO_DEG;
use skystat_core::{PixelKey, SkyError, SkyPoint, SkyResult};

use crate::correlator::CorrelationResult;
use crate::footprint::{Footprint, FootprintPixel};

/// Column layout of an ASCII catalog.
#[derive(Debug, Clone)]
pub struct CatalogColumns {
    /// Zero-based column of the longitude, degrees.
    pub lon: usize,
    /// Zero-based column of the latitude, degrees.
    pub lat: usize,
    /// Column of the detection probability, used as the point weight.
    pub probability: Option<usize>,
    /// Column of the magnitude.
    pub magnitude: Option<usize>,
    /// Drop objects fainter than this magnitude (requires `magnitude`).
    pub faint_limit: Option<f64>,
}

impl Default for CatalogColumns {
    fn default() -> Self {
        Self {
            lon: 0,
            lat: 1,
            probability: None,
            magnitude: None,
            faint_limit: None,
        }
    }
}

/// Reads an ASCII footprint of `pixel-id weight` records.
pub fn read_footprint(path: impl AsRef<Path>) -> SkyResult<Footprint> {
    let content = fs::read_to_string(path)?;
    let mut pixels = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let raw: u64 = parse_field(fields.next(), number + 1, "pixel id")?;
        let weight: f64 = parse_field(fields.next(), number + 1, "weight")?;
        let key = PixelKey::from_raw(raw)?;
        pixels.push(FootprintPixel::new(key, weight));
    }
    Footprint::from_pixels(pixels)
}

/// Reads an ASCII catalog with the given column layout. Longitude and
/// latitude are degrees; the probability column (when configured)
/// becomes the point weight, otherwise weight 1.
pub fn read_catalog(
    path: impl AsRef<Path>,
    columns: &CatalogColumns,
) -> SkyResult<Vec<SkyPoint>> {
    let content = fs::read_to_string(path)?;
    let mut points = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let lon: f64 = parse_column(&fields, columns.lon, number + 1, "longitude")?;
        let lat: f64 = parse_column(&fields, columns.lat, number + 1, "latitude")?;
        if !(-90.0..=90.0).contains(&lat) {
            return Err(SkyError::parse(
                number + 1,
                format!("latitude {} outside [-90, 90]", lat),
            ));
        }
        let weight = match columns.probability {
            Some(col) => parse_column(&fields, col, number + 1, "probability")?,
            None => 1.0,
        };
        if let (Some(col), Some(limit)) = (columns.magnitude, columns.faint_limit) {
            let magnitude: f64 = parse_column(&fields, col, number + 1, "magnitude")?;
            if magnitude > limit {
                continue;
            }
        }
        points.push(SkyPoint::from_degrees_weighted(lon, lat, weight));
    }
    if points.is_empty() {
        return Err(SkyError::invalid_input("catalog file contains no objects"));
    }
    Ok(points)
}

/// Writes the w(θ) table: `theta w sigma_w GG GR RG RR`, theta in
/// degrees, one row per bin.
pub fn write_wtheta(path: impl AsRef<Path>, result: &CorrelationResult) -> SkyResult<()> {
    let mut table = String::new();
    table.push_str("# theta_deg wtheta wtheta_error gal_gal gal_rand rand_gal rand_rand\n");
    for bin in &result.bins {
        table.push_str(&format!(
            "{:.8e} {:.8e} {:.8e} {:.8e} {:.8e} {:.8e} {:.8e}\n",
            bin.theta * RAD_TO_DEG,
            bin.wtheta,
            bin.wtheta_error,
            bin.gal_gal,
            bin.gal_rand,
            bin.rand_gal,
            bin.rand_rand,
        ));
    }
    fs::write(path, table)?;
    Ok(())
}

/// Writes the covariance table: `i j C[i,j]`, n² rows. A run without
/// jackknife regions writes only the header.
pub fn write_covariance(path: impl AsRef<Path>, result: &CorrelationResult) -> SkyResult<()> {
    let mut table = String::new();
    table.push_str("# bin_i bin_j covariance\n");
    for (i, row) in result.covariance.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
            table.push_str(&format!("{} {} {:.8e}\n", i, j, value));
        }
    }
    fs::write(path, table)?;
    Ok(())
}

fn parse_field<T: std::str::FromStr>(
    field: Option<&str>,
    line: usize,
    name: &str,
) -> SkyResult<T> {
    let field = field.ok_or_else(|| SkyError::parse(line, format!("missing {}", name)))?;
    field
        .parse()
        .map_err(|_| SkyError::parse(line, format!("bad {}: {:?}", name, field)))
}

fn parse_column<T: std::str::FromStr>(
    fields: &[&str],
    column: usize,
    line: usize,
    name: &str,
) -> SkyResult<T> {
    parse_field(fields.get(column).copied(), line, name)
}
