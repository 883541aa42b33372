//! Terrain Profile Module
//!
//! The elevation lookup capability the engine consumes, and the sampler that
//! turns it into an ordered terrain profile along one compass bearing.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ElevationError;
use crate::geo::GeoPoint;

// ===================== CONSTANTS =====================

/// Default sample distances in meters.
///
/// Logarithmic spacing: dense near the observer where small features subtend
/// large angles, sparse far out where only big relief matters.
pub const DEFAULT_SAMPLE_DISTANCES_M: [f64; 9] =
    [100.0, 200.0, 500.0, 1_000.0, 2_000.0, 5_000.0, 10_000.0, 20_000.0, 50_000.0];

// ===================== ELEVATION SOURCE =====================

/// Elevation lookup supplied by the surrounding application.
///
/// Implementations own caching, offline gating, retries and batch limits.
/// They are shared by every worker of a grid calculation, so they must be
/// safe for concurrent reads.
pub trait ElevationSource: Send + Sync {
    /// Elevation in meters above sea level at `point`.
    fn elevation(&self, point: &GeoPoint) -> Result<f64, ElevationError>;

    /// Batch lookup. Partial results are fine: points missing from the map
    /// are treated as unavailable by the caller.
    ///
    /// The default implementation issues one [`ElevationSource::elevation`]
    /// call per point and keeps the successes.
    fn elevations(&self, points: &[GeoPoint]) -> Result<HashMap<GeoPoint, f64>, ElevationError> {
        Ok(points.iter().filter_map(|p| self.elevation(p).ok().map(|e| (*p, e))).collect())
    }
}

impl<T: ElevationSource + ?Sized> ElevationSource for &T {
    fn elevation(&self, point: &GeoPoint) -> Result<f64, ElevationError> {
        (**self).elevation(point)
    }

    fn elevations(&self, points: &[GeoPoint]) -> Result<HashMap<GeoPoint, f64>, ElevationError> {
        (**self).elevations(points)
    }
}

impl<T: ElevationSource + ?Sized> ElevationSource for Arc<T> {
    fn elevation(&self, point: &GeoPoint) -> Result<f64, ElevationError> {
        (**self).elevation(point)
    }

    fn elevations(&self, points: &[GeoPoint]) -> Result<HashMap<GeoPoint, f64>, ElevationError> {
        (**self).elevations(points)
    }
}

// ===================== PROFILE TYPES =====================

/// One terrain sample: horizontal distance from the observer and elevation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TerrainPoint {
    distance_m: f64,
    elevation_m: f64,
}

impl TerrainPoint {
    /// Negative distances are treated as 0.
    pub fn new(distance_m: f64, elevation_m: f64) -> Self {
        Self { distance_m: distance_m.max(0.0), elevation_m }
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn elevation_m(&self) -> f64 {
        self.elevation_m
    }

    /// Angular elevation of this sample seen from an observer at
    /// `observer_elevation_m`, in degrees.
    pub fn angle_from(&self, observer_elevation_m: f64) -> f64 {
        (self.elevation_m - observer_elevation_m).atan2(self.distance_m).to_degrees()
    }
}

/// Terrain samples along one bearing, ordered by increasing distance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerrainProfile {
    observer: GeoPoint,
    observer_elevation_m: f64,
    azimuth: f64,
    points: Vec<TerrainPoint>,
}

impl TerrainProfile {
    /// Build a profile. Samples are sorted by distance.
    pub fn new(
        observer: GeoPoint,
        observer_elevation_m: f64,
        azimuth: f64,
        mut points: Vec<TerrainPoint>,
    ) -> Self {
        points.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        Self { observer, observer_elevation_m, azimuth, points }
    }

    pub fn observer(&self) -> &GeoPoint {
        &self.observer
    }

    pub fn observer_elevation_m(&self) -> f64 {
        self.observer_elevation_m
    }

    /// Bearing the profile was sampled along, degrees clockwise from North
    pub fn azimuth(&self) -> f64 {
        self.azimuth
    }

    pub fn points(&self) -> &[TerrainPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Blocking horizon angle in degrees. See [`crate::horizon::horizon_angle`].
    pub fn horizon_angle(&self) -> f64 {
        crate::horizon::horizon_angle(self)
    }
}

// ===================== SAMPLER =====================

/// Samples terrain along a bearing at a fixed set of distances.
///
/// Performs exactly one batch elevation request per profile and no caching or
/// retries of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainProfileSampler {
    distances_m: Vec<f64>,
}

impl Default for TerrainProfileSampler {
    fn default() -> Self {
        Self { distances_m: DEFAULT_SAMPLE_DISTANCES_M.to_vec() }
    }
}

impl TerrainProfileSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom sample distances (meters).
    ///
    /// Non-finite and non-positive entries are dropped; the rest are sorted
    /// and de-duplicated.
    pub fn with_distances(mut self, distances_m: impl IntoIterator<Item = f64>) -> Self {
        let mut d: Vec<f64> = distances_m.into_iter().filter(|x| x.is_finite() && *x > 0.0).collect();
        d.sort_by(f64::total_cmp);
        d.dedup();
        self.distances_m = d;
        self
    }

    pub fn distances_m(&self) -> &[f64] {
        &self.distances_m
    }

    /// Projected sample locations along `azimuth`, paired with their distance.
    pub fn sample_locations(&self, observer: &GeoPoint, azimuth: f64) -> Vec<(f64, GeoPoint)> {
        self.distances_m.iter().map(|&d| (d, observer.project(azimuth, d))).collect()
    }

    /// Build the terrain profile from `observer` toward `azimuth`.
    ///
    /// Any sample the source cannot resolve (missing from the batch, a
    /// non-finite value, or a failed batch) takes the observer's own
    /// elevation, so it never blocks.
    pub fn sample<E: ElevationSource + ?Sized>(
        &self,
        observer: &GeoPoint,
        observer_elevation_m: f64,
        azimuth: f64,
        source: &E,
    ) -> TerrainProfile {
        let locations = self.sample_locations(observer, azimuth);
        let points: Vec<GeoPoint> = locations.iter().map(|(_, p)| *p).collect();

        let resolved = match source.elevations(&points) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Terrain batch lookup failed, treating profile as flat");
                HashMap::new()
            }
        };

        let mut missing = 0usize;
        let samples: Vec<TerrainPoint> = locations
            .iter()
            .map(|(d, p)| {
                let elevation = match resolved.get(p) {
                    Some(e) if e.is_finite() => *e,
                    _ => {
                        missing += 1;
                        observer_elevation_m
                    }
                };
                TerrainPoint::new(*d, elevation)
            })
            .collect();

        if missing > 0 {
            debug!(missing, total = samples.len(), "Substituted observer elevation for unresolved samples");
        }

        TerrainProfile::new(*observer, observer_elevation_m, azimuth, samples)
    }
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SunlightError;
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flat(f64);

    impl ElevationSource for Flat {
        fn elevation(&self, _point: &GeoPoint) -> Result<f64, ElevationError> {
            Ok(self.0)
        }
    }

    /// Resolves only points north of a latitude; counts batch calls.
    struct NorthOnly {
        min_lat: f64,
        batches: AtomicUsize,
    }

    impl ElevationSource for NorthOnly {
        fn elevation(&self, point: &GeoPoint) -> Result<f64, ElevationError> {
            if point.latitude() >= self.min_lat {
                Ok(3000.0)
            } else {
                Err(SunlightError::ElevationUnavailable("outside coverage".into()))
            }
        }

        fn elevations(&self, points: &[GeoPoint]) -> Result<HashMap<GeoPoint, f64>, ElevationError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(points.iter().filter_map(|p| self.elevation(p).ok().map(|e| (*p, e))).collect())
        }
    }

    struct Broken;

    impl ElevationSource for Broken {
        fn elevation(&self, _point: &GeoPoint) -> Result<f64, ElevationError> {
            Err(SunlightError::ElevationUnavailable("offline".into()))
        }

        fn elevations(&self, _points: &[GeoPoint]) -> Result<HashMap<GeoPoint, f64>, ElevationError> {
            Err(SunlightError::ElevationUnavailable("offline".into()))
        }
    }

    fn observer() -> GeoPoint {
        GeoPoint::new(46.8182, 8.2275).unwrap()
    }

    #[test]
    fn test_default_distances_are_increasing() {
        let sampler = TerrainProfileSampler::new();
        let d = sampler.distances_m();
        assert_eq!(d.len(), DEFAULT_SAMPLE_DISTANCES_M.len());
        assert!(d.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(d[0], 100.0);
        assert_eq!(d[d.len() - 1], 50_000.0);
    }

    #[test]
    fn test_with_distances_sanitizes() {
        let sampler =
            TerrainProfileSampler::new().with_distances([500.0, -1.0, f64::NAN, 100.0, 500.0, 0.0]);
        assert_eq!(sampler.distances_m(), &[100.0, 500.0]);
    }

    #[test]
    fn test_flat_terrain_profile() {
        let profile = TerrainProfileSampler::new().sample(&observer(), 1200.0, 135.0, &Flat(1200.0));
        assert_eq!(profile.points().len(), DEFAULT_SAMPLE_DISTANCES_M.len());
        assert_eq!(profile.azimuth(), 135.0);
        for p in profile.points() {
            assert_eq!(p.elevation_m(), 1200.0);
            assert_abs_diff_eq!(p.angle_from(1200.0), 0.0);
        }
    }

    #[test]
    fn test_samples_follow_bearing() {
        let sampler = TerrainProfileSampler::new();
        let north = sampler.sample_locations(&observer(), 0.0);
        assert!(north.windows(2).all(|w| w[1].1.latitude() > w[0].1.latitude()));

        let west = sampler.sample_locations(&observer(), 270.0);
        assert!(west.iter().all(|(_, p)| p.longitude() < observer().longitude()));
    }

    #[test]
    fn test_missing_samples_fall_back_to_observer_elevation() {
        let source = NorthOnly { min_lat: 46.9, batches: AtomicUsize::new(0) };
        let profile = TerrainProfileSampler::new().sample(&observer(), 800.0, 0.0, &source);

        // Exactly one batch request per profile
        assert_eq!(source.batches.load(Ordering::SeqCst), 1);

        for p in profile.points() {
            let lat = observer().project(0.0, p.distance_m()).latitude();
            if lat >= 46.9 {
                assert_eq!(p.elevation_m(), 3000.0);
            } else {
                assert_eq!(p.elevation_m(), 800.0);
            }
        }
    }

    #[test]
    fn test_failed_batch_yields_flat_profile() {
        let profile = TerrainProfileSampler::new().sample(&observer(), 500.0, 90.0, &Broken);
        assert!(profile.points().iter().all(|p| p.elevation_m() == 500.0));
    }

    #[test]
    fn test_profile_sorted_by_distance() {
        let profile = TerrainProfile::new(
            observer(),
            0.0,
            0.0,
            vec![TerrainPoint::new(500.0, 1.0), TerrainPoint::new(100.0, 2.0)],
        );
        assert_eq!(profile.points()[0].distance_m(), 100.0);
        assert_eq!(profile.points()[1].distance_m(), 500.0);
    }

    #[test]
    fn test_terrain_point_angle() {
        let p = TerrainPoint::new(100.0, 1100.0);
        assert_abs_diff_eq!(p.angle_from(1000.0), 45.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.angle_from(1200.0), -45.0, epsilon = 1e-12);
        assert_eq!(TerrainPoint::new(-5.0, 0.0).distance_m(), 0.0);
    }
}
