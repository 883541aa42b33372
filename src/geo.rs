//! Geographic Value Types Module
//!
//! Validated coordinates, bounding boxes and the small amount of geometry the
//! visibility engine needs: bearing projection and grid enumeration.

use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::error::{Result, SunlightError};

// ===================== CONSTANTS =====================

/// Meters per degree of latitude used by the equirectangular projection
pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Slack when deciding whether the last lattice row/column still lies inside
/// the box, so spans that are exact multiples of the resolution keep their edge.
const GRID_EPSILON: f64 = 1e-9;

/// Largest lattice a bounding box will enumerate. Finer resolutions over the
/// same box are rejected with [`SunlightError::GridTooLarge`].
pub const MAX_GRID_POINTS: usize = 2_000_000;

/// Below this `cos(latitude)` a longitude step is meaningless (pole).
const MIN_COS_LATITUDE: f64 = 1e-12;

// ===================== GEO POINT =====================

/// A validated WGS84 coordinate in decimal degrees.
///
/// Equality and hashing are bitwise on the stored values, so a point can be
/// used as a map key. Negative zero is normalized on construction.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Create a point, rejecting anything outside [-90, 90] x [-180, 180].
    ///
    /// # Errors
    /// [`SunlightError::InvalidCoordinate`] for out-of-range or non-finite input.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(SunlightError::InvalidCoordinate(format!(
                "latitude must be between -90 and 90, got {}",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(SunlightError::InvalidCoordinate(format!(
                "longitude must be between -180 and 180, got {}",
                longitude
            )));
        }
        Ok(Self::from_valid(latitude, longitude))
    }

    /// Build a point from arbitrary values by clamping them into range.
    /// NaN collapses to 0.
    pub(crate) fn clamped(latitude: f64, longitude: f64) -> Self {
        let lat = if latitude.is_nan() { 0.0 } else { latitude.clamp(-90.0, 90.0) };
        let lon = if longitude.is_nan() { 0.0 } else { longitude.clamp(-180.0, 180.0) };
        Self::from_valid(lat, lon)
    }

    fn from_valid(latitude: f64, longitude: f64) -> Self {
        // -0.0 + 0.0 == +0.0
        Self { latitude: latitude + 0.0, longitude: longitude + 0.0 }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Project a destination point along a compass bearing.
    ///
    /// Uses the equirectangular approximation, which is accurate enough for
    /// the tens of kilometers a terrain profile spans. The result is clamped
    /// to valid coordinate ranges rather than wrapped.
    ///
    /// # Arguments
    /// * `bearing_deg` - Compass bearing (0 = North, clockwise)
    /// * `distance_m` - Distance from this point in meters
    pub fn project(&self, bearing_deg: f64, distance_m: f64) -> GeoPoint {
        let bearing = bearing_deg.to_radians();
        let d_lat = distance_m * bearing.cos() / METERS_PER_DEGREE_LAT;

        let cos_lat = self.latitude.to_radians().cos();
        let d_lon = if cos_lat.abs() < MIN_COS_LATITUDE {
            0.0
        } else {
            distance_m * bearing.sin() / (METERS_PER_DEGREE_LAT * cos_lat)
        };

        GeoPoint::clamped(self.latitude + d_lat, self.longitude + d_lon)
    }
}

impl PartialEq for GeoPoint {
    fn eq(&self, other: &Self) -> bool {
        self.latitude.to_bits() == other.latitude.to_bits()
            && self.longitude.to_bits() == other.longitude.to_bits()
    }
}

impl Eq for GeoPoint {}

impl Hash for GeoPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.latitude.to_bits().hash(state);
        self.longitude.to_bits().hash(state);
    }
}

// ===================== BOUNDING BOX =====================

/// A rectangular lat/lon area with `north > south` and `east > west`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    north: f64,
    south: f64,
    east: f64,
    west: f64,
}

impl BoundingBox {
    /// # Errors
    /// [`SunlightError::InvalidCoordinate`] when an edge is out of range or the
    /// edges are not strictly ordered.
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Result<Self> {
        // Validates the individual edges
        GeoPoint::new(north, east)?;
        GeoPoint::new(south, west)?;

        if north <= south {
            return Err(SunlightError::InvalidCoordinate(format!(
                "north ({}) must be greater than south ({})",
                north, south
            )));
        }
        if east <= west {
            return Err(SunlightError::InvalidCoordinate(format!(
                "east ({}) must be greater than west ({})",
                east, west
            )));
        }
        Ok(Self { north, south, east, west })
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::from_valid((self.north + self.south) / 2.0, (self.east + self.west) / 2.0)
    }

    /// Inclusive containment test.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.south..=self.north).contains(&point.latitude())
            && (self.west..=self.east).contains(&point.longitude())
    }

    /// Number of lattice rows (latitudes) at a given resolution.
    pub fn grid_rows(&self, resolution: f64) -> Result<usize> {
        validate_resolution(resolution)?;
        lattice_len(self.south, self.north, resolution)
    }

    /// Number of lattice columns (longitudes) at a given resolution.
    pub fn grid_cols(&self, resolution: f64) -> Result<usize> {
        validate_resolution(resolution)?;
        lattice_len(self.west, self.east, resolution)
    }

    /// Total lattice nodes at a given resolution.
    ///
    /// # Errors
    /// [`SunlightError::InvalidResolution`] for a non-positive resolution,
    /// [`SunlightError::GridTooLarge`] above [`MAX_GRID_POINTS`] nodes.
    pub fn grid_len(&self, resolution: f64) -> Result<usize> {
        let rows = self.grid_rows(resolution)?;
        let cols = self.grid_cols(resolution)?;
        match rows.checked_mul(cols) {
            Some(n) if n <= MAX_GRID_POINTS => Ok(n),
            _ => Err(SunlightError::GridTooLarge { nodes: rows as f64 * cols as f64, limit: MAX_GRID_POINTS }),
        }
    }

    /// Enumerate the sampling lattice of this box.
    ///
    /// Row-major order: south to north, and west to east within each row.
    /// Both bounds are inclusive; when the span is not a multiple of the
    /// resolution the last row/column stops short of the edge.
    ///
    /// # Errors
    /// [`SunlightError::InvalidResolution`] unless `resolution` is finite and > 0,
    /// [`SunlightError::GridTooLarge`] above [`MAX_GRID_POINTS`] nodes.
    pub fn grid_points(&self, resolution: f64) -> Result<Vec<GeoPoint>> {
        let len = self.grid_len(resolution)?;
        let rows = self.grid_rows(resolution)?;
        let cols = self.grid_cols(resolution)?;

        let mut points = Vec::with_capacity(len);
        for row in 0..rows {
            let lat = lattice_value(self.south, self.north, row, resolution);
            for col in 0..cols {
                let lon = lattice_value(self.west, self.east, col, resolution);
                points.push(GeoPoint::from_valid(lat, lon));
            }
        }
        Ok(points)
    }

    /// Snap a point to the nearest lattice node of this box.
    ///
    /// Returns `None` when the point lies outside the box or the resolution is
    /// invalid. The returned node is bitwise identical to the one produced by
    /// [`BoundingBox::grid_points`].
    pub fn snap_to_grid(&self, point: &GeoPoint, resolution: f64) -> Option<GeoPoint> {
        if !self.contains(point) {
            return None;
        }
        let rows = self.grid_rows(resolution).ok()?;
        let cols = self.grid_cols(resolution).ok()?;

        let row = nearest_index(self.south, point.latitude(), resolution, rows);
        let col = nearest_index(self.west, point.longitude(), resolution, cols);

        Some(GeoPoint::from_valid(
            lattice_value(self.south, self.north, row, resolution),
            lattice_value(self.west, self.east, col, resolution),
        ))
    }
}

// ===================== LATTICE HELPERS =====================

pub(crate) fn validate_resolution(resolution: f64) -> Result<()> {
    if !resolution.is_finite() || resolution <= 0.0 {
        return Err(SunlightError::InvalidResolution(resolution));
    }
    Ok(())
}

/// Nodes along one axis. Counted in `f64` first so tiny resolutions are
/// rejected before the cast to `usize` can saturate.
fn lattice_len(start: f64, end: f64, resolution: f64) -> Result<usize> {
    let steps = ((end - start) / resolution + GRID_EPSILON).floor();
    if !steps.is_finite() || steps >= MAX_GRID_POINTS as f64 {
        return Err(SunlightError::GridTooLarge { nodes: steps + 1.0, limit: MAX_GRID_POINTS });
    }
    Ok(steps as usize + 1)
}

fn lattice_value(start: f64, end: f64, index: usize, resolution: f64) -> f64 {
    (start + index as f64 * resolution).min(end)
}

fn nearest_index(start: f64, value: f64, resolution: f64, len: usize) -> usize {
    let idx = ((value - start) / resolution).round().max(0.0) as usize;
    idx.min(len.saturating_sub(1))
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::collections::HashSet;

    #[test]
    fn test_geo_point_rejects_out_of_range() {
        assert!(matches!(GeoPoint::new(91.0, 0.0), Err(SunlightError::InvalidCoordinate(_))));
        assert!(matches!(GeoPoint::new(0.0, 181.0), Err(SunlightError::InvalidCoordinate(_))));
        assert!(matches!(GeoPoint::new(-90.5, 0.0), Err(SunlightError::InvalidCoordinate(_))));
        assert!(matches!(GeoPoint::new(f64::NAN, 0.0), Err(SunlightError::InvalidCoordinate(_))));
        assert!(GeoPoint::new(90.0, -180.0).is_ok());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn test_geo_point_equality_and_hash() {
        let a = GeoPoint::new(46.8182, 8.2275).unwrap();
        let b = GeoPoint::new(46.8182, 8.2275).unwrap();
        assert_eq!(a, b);

        // Negative zero must land in the same bucket as positive zero
        let z1 = GeoPoint::new(-0.0, 0.0).unwrap();
        let z2 = GeoPoint::new(0.0, -0.0).unwrap();
        assert_eq!(z1, z2);

        let set: HashSet<GeoPoint> = [a, b, z1, z2].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_bounding_box_validation() {
        assert!(matches!(
            BoundingBox::new(45.0, 46.0, 9.0, 8.0),
            Err(SunlightError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            BoundingBox::new(46.0, 45.0, 8.0, 9.0),
            Err(SunlightError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            BoundingBox::new(46.0, 46.0, 9.0, 8.0),
            Err(SunlightError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            BoundingBox::new(95.0, 46.0, 9.0, 8.0),
            Err(SunlightError::InvalidCoordinate(_))
        ));
        assert!(BoundingBox::new(47.0, 46.0, 9.0, 8.0).is_ok());
    }

    #[test]
    fn test_bounding_box_center_and_contains() {
        let bbox = BoundingBox::new(47.0, 46.0, 9.0, 8.0).unwrap();
        let c = bbox.center();
        assert_abs_diff_eq!(c.latitude(), 46.5);
        assert_abs_diff_eq!(c.longitude(), 8.5);
        assert!(bbox.contains(&c));
        assert!(bbox.contains(&GeoPoint::new(47.0, 8.0).unwrap()));
        assert!(!bbox.contains(&GeoPoint::new(47.1, 8.5).unwrap()));
    }

    #[test]
    fn test_grid_points_order_and_bounds() {
        let bbox = BoundingBox::new(46.2, 46.0, 8.3, 8.0).unwrap();
        let res = 0.1;
        let points = bbox.grid_points(res).unwrap();

        // First point is the south-west corner, second moves east
        assert_abs_diff_eq!(points[0].latitude(), 46.0);
        assert_abs_diff_eq!(points[0].longitude(), 8.0);
        assert_abs_diff_eq!(points[1].latitude(), 46.0);
        assert!(points[1].longitude() > points[0].longitude());

        for p in &points {
            assert!(p.latitude() >= bbox.south() - res / 2.0);
            assert!(p.latitude() <= bbox.north() + res / 2.0);
            assert!(p.longitude() >= bbox.west() - res / 2.0);
            assert!(p.longitude() <= bbox.east() + res / 2.0);
        }

        let expected_rows = ((bbox.north() - bbox.south()) / res).ceil() as i64;
        let expected_cols = ((bbox.east() - bbox.west()) / res).ceil() as i64;
        let rows = bbox.grid_rows(res).unwrap() as i64;
        let cols = bbox.grid_cols(res).unwrap() as i64;
        assert!((rows - expected_rows).abs() <= 1);
        assert!((cols - expected_cols).abs() <= 1);
        assert_eq!(points.len() as i64, rows * cols);
    }

    #[test]
    fn test_grid_points_partial_last_row() {
        // 0.25 span at 0.1 resolution: 46.0, 46.1, 46.2 (46.3 would overshoot)
        let bbox = BoundingBox::new(46.25, 46.0, 8.1, 8.0).unwrap();
        assert_eq!(bbox.grid_rows(0.1).unwrap(), 3);
        assert_eq!(bbox.grid_cols(0.1).unwrap(), 2);
    }

    #[test]
    fn test_grid_points_invalid_resolution() {
        let bbox = BoundingBox::new(47.0, 46.0, 9.0, 8.0).unwrap();
        assert!(matches!(bbox.grid_points(0.0), Err(SunlightError::InvalidResolution(_))));
        assert!(matches!(bbox.grid_points(-0.1), Err(SunlightError::InvalidResolution(_))));
        assert!(matches!(bbox.grid_points(f64::NAN), Err(SunlightError::InvalidResolution(_))));
    }

    #[test]
    fn test_grid_too_fine_is_rejected() {
        let bbox = BoundingBox::new(47.0, 46.0, 9.0, 8.0).unwrap();

        // Subnormal resolution: the per-axis count is infinite
        assert!(matches!(bbox.grid_rows(1e-320), Err(SunlightError::GridTooLarge { .. })));
        assert!(matches!(bbox.grid_points(1e-320), Err(SunlightError::GridTooLarge { .. })));

        // Tiny but normal resolution, rejected before any allocation
        assert!(matches!(bbox.grid_points(1e-10), Err(SunlightError::GridTooLarge { .. })));

        // Each axis is fine on its own, the product (1429 x 1429) is not
        assert_eq!(bbox.grid_rows(7e-4).unwrap(), 1429);
        assert!(matches!(
            bbox.grid_len(7e-4),
            Err(SunlightError::GridTooLarge { limit: MAX_GRID_POINTS, .. })
        ));
        assert!(bbox.snap_to_grid(&bbox.center(), 1e-10).is_none());

        assert_eq!(bbox.grid_len(0.01).unwrap(), 101 * 101);
    }

    #[test]
    fn test_snap_to_grid_matches_lattice() {
        let bbox = BoundingBox::new(46.3, 46.0, 8.3, 8.0).unwrap();
        let res = 0.1;
        let lattice: HashSet<GeoPoint> = bbox.grid_points(res).unwrap().into_iter().collect();

        let query = GeoPoint::new(46.123, 8.179).unwrap();
        let snapped = bbox.snap_to_grid(&query, res).unwrap();
        assert!(lattice.contains(&snapped));
        assert_abs_diff_eq!(snapped.latitude(), 46.1, epsilon = 1e-9);
        assert_abs_diff_eq!(snapped.longitude(), 8.2, epsilon = 1e-9);

        let outside = GeoPoint::new(45.0, 8.1).unwrap();
        assert!(bbox.snap_to_grid(&outside, res).is_none());
    }

    #[test]
    fn test_project_cardinal_directions() {
        let origin = GeoPoint::new(46.0, 8.0).unwrap();

        let north = origin.project(0.0, METERS_PER_DEGREE_LAT);
        assert_abs_diff_eq!(north.latitude(), 47.0, epsilon = 1e-9);
        assert_abs_diff_eq!(north.longitude(), 8.0, epsilon = 1e-9);

        let east = origin.project(90.0, 1000.0);
        assert_abs_diff_eq!(east.latitude(), 46.0, epsilon = 1e-9);
        let expected = 1000.0 / (METERS_PER_DEGREE_LAT * 46.0_f64.to_radians().cos());
        assert_abs_diff_eq!(east.longitude() - 8.0, expected, epsilon = 1e-9);

        let south = origin.project(180.0, 1000.0);
        assert!(south.latitude() < 46.0);
        let west = origin.project(270.0, 1000.0);
        assert!(west.longitude() < 8.0);
    }

    #[test]
    fn test_project_clamps_at_edges() {
        let near_pole = GeoPoint::new(89.99, 0.0).unwrap();
        let p = near_pole.project(0.0, 50_000.0);
        assert_eq!(p.latitude(), 90.0);

        let pole = GeoPoint::new(90.0, 10.0).unwrap();
        let q = pole.project(90.0, 10_000.0);
        assert!(q.longitude().is_finite());

        let date_line = GeoPoint::new(0.0, 179.99).unwrap();
        let r = date_line.project(90.0, 50_000.0);
        assert_eq!(r.longitude(), 180.0);
    }
}
