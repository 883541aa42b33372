//! Elevation Sources Module
//!
//! Concrete [`ElevationSource`] implementations used by the command-line
//! tool: a constant surface and a regular lat/lon raster loaded from JSON.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ElevationError, Result, SunlightError};
use crate::geo::GeoPoint;
use crate::terrain::ElevationSource;

// ===================== FLAT =====================

/// The same elevation everywhere. Terrain never blocks the sun.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlatElevation(pub f64);

impl ElevationSource for FlatElevation {
    fn elevation(&self, _point: &GeoPoint) -> std::result::Result<f64, ElevationError> {
        Ok(self.0)
    }
}

// ===================== RASTER =====================

#[derive(Debug, Deserialize)]
struct RasterFile {
    south: f64,
    west: f64,
    resolution: f64,
    /// Rows from south to north, each from west to east; `null` is a void
    rows: Vec<Vec<Option<f64>>>,
}

/// Regular elevation raster with bilinear interpolation between nodes.
///
/// Node `(r, c)` sits at `(south + r * resolution, west + c * resolution)`.
/// Queries outside the raster or touching a void node are unavailable.
#[derive(Debug, Clone, PartialEq)]
pub struct GridElevation {
    south: f64,
    west: f64,
    resolution: f64,
    rows: usize,
    cols: usize,
    cells: Vec<Option<f64>>,
}

impl GridElevation {
    /// Build a raster from row-major node values (south row first).
    ///
    /// # Errors
    /// Returns [`SunlightError::InvalidElevationGrid`] for a non-positive
    /// resolution, an empty raster or ragged rows.
    pub fn new(south: f64, west: f64, resolution: f64, rows: Vec<Vec<Option<f64>>>) -> Result<Self> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(SunlightError::InvalidElevationGrid(format!("resolution {resolution} must be positive")));
        }
        GeoPoint::new(south, west)
            .map_err(|e| SunlightError::InvalidElevationGrid(format!("origin: {e}")))?;

        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.is_empty() || cols == 0 {
            return Err(SunlightError::InvalidElevationGrid("raster has no nodes".into()));
        }
        if let Some(i) = rows.iter().position(|r| r.len() != cols) {
            return Err(SunlightError::InvalidElevationGrid(format!(
                "row {i} has {} nodes, expected {cols}",
                rows[i].len()
            )));
        }

        let n_rows = rows.len();
        let cells = rows.into_iter().flatten().map(|v| v.filter(|e| e.is_finite())).collect();
        Ok(Self { south, west, resolution, rows: n_rows, cols, cells })
    }

    /// Parse the JSON raster format:
    /// `{"south": .., "west": .., "resolution": .., "rows": [[..], ..]}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RasterFile =
            serde_json::from_str(json).map_err(|e| SunlightError::InvalidElevationGrid(e.to_string()))?;
        Self::new(raw.south, raw.west, raw.resolution, raw.rows)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| SunlightError::InvalidElevationGrid(format!("{}: {e}", path.display())))?;
        let grid = Self::from_json_str(&json)?;
        debug!(path = %path.display(), rows = grid.rows, cols = grid.cols, "Loaded elevation raster");
        Ok(grid)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn node(&self, r: usize, c: usize) -> Option<f64> {
        self.cells[r * self.cols + c]
    }

    /// Fractional index of `value` along an axis of `len` nodes, or `None`
    /// when outside the raster.
    fn fractional_index(&self, value: f64, origin: f64, len: usize) -> Option<(usize, usize, f64)> {
        let f = (value - origin) / self.resolution;
        let max = (len - 1) as f64;
        if !(-1e-9..=max + 1e-9).contains(&f) {
            return None;
        }
        let f = f.clamp(0.0, max);
        let i0 = f.floor() as usize;
        // Exactly on a node: the neighbour carries no weight and may be void
        let i1 = if f > i0 as f64 { (i0 + 1).min(len - 1) } else { i0 };
        Some((i0, i1, f - i0 as f64))
    }
}

impl ElevationSource for GridElevation {
    fn elevation(&self, point: &GeoPoint) -> std::result::Result<f64, ElevationError> {
        let unavailable = || {
            SunlightError::ElevationUnavailable(format!("({}, {})", point.latitude(), point.longitude()))
        };

        let (r0, r1, tr) = self.fractional_index(point.latitude(), self.south, self.rows).ok_or_else(unavailable)?;
        let (c0, c1, tc) = self.fractional_index(point.longitude(), self.west, self.cols).ok_or_else(unavailable)?;

        let sw = self.node(r0, c0).ok_or_else(unavailable)?;
        let se = self.node(r0, c1).ok_or_else(unavailable)?;
        let nw = self.node(r1, c0).ok_or_else(unavailable)?;
        let ne = self.node(r1, c1).ok_or_else(unavailable)?;

        let south = sw + (se - sw) * tc;
        let north = nw + (ne - nw) * tc;
        Ok(south + (north - south) * tr)
    }
}

// ===================== TESTS =====================
