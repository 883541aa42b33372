//! Visibility Calculation Module
//!
//! Combines the sun position solver, terrain sampler and horizon engine into
//! single-point verdicts, and fans the single-point calculation out over a
//! bounding box for map overlays.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SunlightError};
use crate::geo::{BoundingBox, GeoPoint};
use crate::horizon;
use crate::solar::{SunPosition, SunPositionSolver};
use crate::terrain::{ElevationSource, TerrainProfile, TerrainProfileSampler};

// ===================== CONSTANTS =====================

/// Observer elevation assumed when the elevation source cannot resolve it
pub const DEFAULT_OBSERVER_ELEVATION_M: f64 = 0.0;

/// How far ahead the next-sun estimate searches
const NEXT_SUN_SEARCH_WINDOW_HOURS: i64 = 24;

// ===================== RESULT TYPES =====================

/// The three mutually exclusive outcomes of a visibility query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Visibility {
    /// Sun above both the astronomical and the terrain horizon
    Visible,
    /// Sun above the astronomical horizon but hidden by terrain
    Blocked {
        /// How far the sun must still climb to clear the terrain (≥ 0)
        degrees_until_visible: f64,
        /// Estimated first instant the sun clears the current horizon angle
        next_sun_time: Option<DateTime<Utc>>,
    },
    /// Sun at or below the astronomical horizon; terrain was not consulted
    BelowHorizon,
}

/// Outcome of a single-point query. Only constructible through
/// [`VisibilityResult::visible`], [`VisibilityResult::blocked`] and
/// [`VisibilityResult::below_horizon`], which reject angles that contradict
/// the requested outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisibilityResult {
    location: GeoPoint,
    sun: SunPosition,
    horizon_angle: f64,
    visibility: Visibility,
}

impl VisibilityResult {
    fn assemble(location: GeoPoint, sun: SunPosition, horizon_angle: f64, visibility: Visibility) -> Self {
        Self { location, sun, horizon_angle, visibility }
    }

    fn blocked_state(sun: &SunPosition, horizon_angle: f64, next_sun_time: Option<DateTime<Utc>>) -> Visibility {
        let degrees_until_visible = horizon::degrees_until_visible(sun.elevation(), horizon_angle);
        Visibility::Blocked { degrees_until_visible, next_sun_time }
    }

    /// Sun clears the terrain. `None` unless the sun is above the
    /// astronomical horizon and strictly above `horizon_angle`.
    pub fn visible(location: GeoPoint, sun: SunPosition, horizon_angle: f64) -> Option<Self> {
        (sun.is_above_horizon() && sun.elevation() > horizon_angle)
            .then(|| Self::assemble(location, sun, horizon_angle, Visibility::Visible))
    }

    /// Terrain blocks a risen sun. `None` unless the sun is above the
    /// astronomical horizon and at or below `horizon_angle`.
    pub fn blocked(
        location: GeoPoint,
        sun: SunPosition,
        horizon_angle: f64,
        next_sun_time: Option<DateTime<Utc>>,
    ) -> Option<Self> {
        (sun.is_above_horizon() && sun.elevation() <= horizon_angle).then(|| {
            Self::assemble(location, sun, horizon_angle, Self::blocked_state(&sun, horizon_angle, next_sun_time))
        })
    }

    /// The sun has not risen; horizon angle is reported as 0. `None` when
    /// the sun is above the horizon.
    pub fn below_horizon(location: GeoPoint, sun: SunPosition) -> Option<Self> {
        (!sun.is_above_horizon()).then(|| Self::assemble(location, sun, 0.0, Visibility::BelowHorizon))
    }

    pub fn location(&self) -> &GeoPoint {
        &self.location
    }

    pub fn sun_position(&self) -> &SunPosition {
        &self.sun
    }

    /// Terrain horizon toward the sun, degrees
    pub fn horizon_angle(&self) -> f64 {
        self.horizon_angle
    }

    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    pub fn is_sun_visible(&self) -> bool {
        matches!(self.visibility, Visibility::Visible)
    }

    pub fn degrees_until_visible(&self) -> Option<f64> {
        match self.visibility {
            Visibility::Blocked { degrees_until_visible, .. } => Some(degrees_until_visible),
            _ => None,
        }
    }

    pub fn next_sun_visible_time(&self) -> Option<DateTime<Utc>> {
        match self.visibility {
            Visibility::Blocked { next_sun_time, .. } => next_sun_time,
            _ => None,
        }
    }
}

/// Sun visibility sampled on a regular lat/lon lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityGrid {
    bounds: BoundingBox,
    resolution: f64,
    cells: HashMap<GeoPoint, bool>,
}

impl VisibilityGrid {
    fn new(bounds: BoundingBox, resolution: f64, cells: HashMap<GeoPoint, bool>) -> Self {
        Self { bounds, resolution, cells }
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Degrees between neighbouring samples
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Exact lookup of a lattice node.
    pub fn get(&self, point: &GeoPoint) -> Option<bool> {
        self.cells.get(point).copied()
    }

    /// Visibility at the lattice node nearest to `point`, or `None` outside
    /// the grid's bounds.
    pub fn is_visible_at(&self, point: &GeoPoint) -> Option<bool> {
        let node = self.bounds.snap_to_grid(point, self.resolution)?;
        self.get(&node)
    }

    pub fn visible_count(&self) -> usize {
        self.cells.values().filter(|v| **v).count()
    }

    pub fn visible_fraction(&self) -> f64 {
        if self.cells.is_empty() { 0.0 } else { self.visible_count() as f64 / self.cells.len() as f64 }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GeoPoint, &bool)> {
        self.cells.iter()
    }

    /// Lattice rows from south to north, each from west to east.
    pub fn rows(&self) -> Vec<Vec<bool>> {
        let cols = self.bounds.grid_cols(self.resolution).unwrap_or(0);
        let points = self.bounds.grid_points(self.resolution).unwrap_or_default();
        points
            .chunks(cols.max(1))
            .map(|row| row.iter().map(|p| self.get(p).unwrap_or(false)).collect())
            .collect()
    }
}

// ===================== CANCELLATION =====================

/// Cooperative cancellation flag shared between a grid query and its owner.
///
/// Cloning shares the flag. Cancelling makes in-flight grid queries skip
/// their remaining points and return [`SunlightError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ===================== CALCULATOR =====================

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Terrain-aware sun visibility calculator.
///
/// Holds no state between queries; every call is an independent pure
/// computation over the solver and the elevation source. The grid worker
/// pool is created on first use and shared by clones.
#[derive(Debug, Clone)]
pub struct VisibilityCalculator<S, E> {
    solver: S,
    elevation: E,
    sampler: TerrainProfileSampler,
    max_workers: usize,
    estimate_next_sun: bool,
    pool: Arc<OnceLock<Option<ThreadPool>>>,
}

impl<S: SunPositionSolver, E: ElevationSource> VisibilityCalculator<S, E> {
    pub fn new(solver: S, elevation: E) -> Self {
        Self {
            solver,
            elevation,
            sampler: TerrainProfileSampler::default(),
            max_workers: default_workers(),
            estimate_next_sun: true,
            pool: Arc::default(),
        }
    }

    pub fn with_sampler(mut self, sampler: TerrainProfileSampler) -> Self {
        self.sampler = sampler;
        self
    }

    /// Upper bound on concurrent grid workers. 0 restores the default
    /// (available parallelism).
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = if max_workers == 0 { default_workers() } else { max_workers };
        self.pool = Arc::default();
        self
    }

    /// Toggle the next-sun estimate on blocked single-point results.
    pub fn with_next_sun_estimate(mut self, enabled: bool) -> Self {
        self.estimate_next_sun = enabled;
        self
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn sampler(&self) -> &TerrainProfileSampler {
        &self.sampler
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Grid worker pool, built once with `max_workers` threads. `None` if the
    /// threads could not be spawned, in which case grids use the global pool.
    fn worker_pool(&self) -> Option<&ThreadPool> {
        self.pool
            .get_or_init(|| {
                let built = ThreadPoolBuilder::new()
                    .num_threads(self.max_workers)
                    .thread_name(|i| format!("sunhorizon-grid-{i}"))
                    .build();
                match built {
                    Ok(pool) => Some(pool),
                    Err(e) => {
                        warn!(error = %e, "Could not build grid worker pool, using global pool");
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Observer elevation, or [`DEFAULT_OBSERVER_ELEVATION_M`] when unresolved.
    pub fn observer_elevation(&self, location: &GeoPoint) -> f64 {
        match self.elevation.elevation(location) {
            Ok(e) if e.is_finite() => e,
            Ok(e) => {
                warn!(lat = location.latitude(), lon = location.longitude(), value = e,
                    "Non-finite observer elevation, using default");
                DEFAULT_OBSERVER_ELEVATION_M
            }
            Err(e) => {
                warn!(lat = location.latitude(), lon = location.longitude(), error = %e,
                    "Observer elevation unavailable, using default");
                DEFAULT_OBSERVER_ELEVATION_M
            }
        }
    }

    /// Terrain profile toward the sun at `instant`, for diagnostics.
    pub fn profile_toward_sun(&self, location: &GeoPoint, instant: DateTime<Utc>) -> TerrainProfile {
        let sun = self.solver.position(location, instant);
        let observer_elevation = self.observer_elevation(location);
        self.sampler.sample(location, observer_elevation, sun.azimuth(), &self.elevation)
    }

    /// Single-point visibility. Always produces a result: elevation failures
    /// degrade to a default observer elevation and flat terrain.
    pub fn calculate_visibility(&self, location: &GeoPoint, instant: DateTime<Utc>) -> VisibilityResult {
        self.evaluate(location, instant, self.estimate_next_sun)
    }

    fn evaluate(&self, location: &GeoPoint, instant: DateTime<Utc>, estimate_next_sun: bool) -> VisibilityResult {
        let sun = self.solver.position(location, instant);
        if !sun.is_above_horizon() {
            debug!(elevation = sun.elevation(), "Sun below horizon, skipping terrain");
            return VisibilityResult::assemble(*location, sun, 0.0, Visibility::BelowHorizon);
        }

        let observer_elevation = self.observer_elevation(location);
        let profile = self.sampler.sample(location, observer_elevation, sun.azimuth(), &self.elevation);
        let horizon_angle = horizon::horizon_angle(&profile);

        if sun.elevation() > horizon_angle {
            return VisibilityResult::assemble(*location, sun, horizon_angle, Visibility::Visible);
        }

        let next_sun_time = if estimate_next_sun {
            self.solver.next_elevation_crossing(
                location,
                instant,
                horizon_angle,
                Duration::hours(NEXT_SUN_SEARCH_WINDOW_HOURS),
            )
        } else {
            None
        };
        let state = VisibilityResult::blocked_state(&sun, horizon_angle, next_sun_time);
        VisibilityResult::assemble(*location, sun, horizon_angle, state)
    }

    /// Visibility over a bounding box at `resolution` degrees.
    ///
    /// # Errors
    /// [`SunlightError::InvalidResolution`] for a non-positive resolution,
    /// [`SunlightError::GridTooLarge`] when the lattice exceeds
    /// [`crate::geo::MAX_GRID_POINTS`].
    pub fn calculate_visibility_grid(
        &self,
        bounds: &BoundingBox,
        instant: DateTime<Utc>,
        resolution: f64,
    ) -> Result<VisibilityGrid> {
        self.calculate_visibility_grid_cancellable(bounds, instant, resolution, &CancellationToken::new())
    }

    /// Like [`Self::calculate_visibility_grid`], abandoning the work once
    /// `token` is cancelled.
    ///
    /// Points are evaluated independently on a pool of at most
    /// `max_workers` threads. A point whose evaluation panics counts as not
    /// visible.
    ///
    /// # Errors
    /// [`SunlightError::InvalidResolution`], [`SunlightError::GridTooLarge`]
    /// or [`SunlightError::Cancelled`].
    pub fn calculate_visibility_grid_cancellable(
        &self,
        bounds: &BoundingBox,
        instant: DateTime<Utc>,
        resolution: f64,
        token: &CancellationToken,
    ) -> Result<VisibilityGrid> {
        let points = bounds.grid_points(resolution)?;
        debug!(points = points.len(), workers = self.max_workers, "Starting visibility grid");

        let evaluate_all = || -> Vec<Option<(GeoPoint, bool)>> {
            points
                .par_iter()
                .map(|p| {
                    if token.is_cancelled() {
                        return None;
                    }
                    Some((*p, self.point_visible(p, instant)))
                })
                .collect()
        };

        let evaluated = match self.worker_pool() {
            Some(pool) => pool.install(evaluate_all),
            None => evaluate_all(),
        };

        if token.is_cancelled() {
            debug!("Visibility grid cancelled");
            return Err(SunlightError::Cancelled);
        }

        let cells: HashMap<GeoPoint, bool> = evaluated.into_iter().flatten().collect();
        let grid = VisibilityGrid::new(*bounds, resolution, cells);
        info!(points = grid.len(), visible = grid.visible_count(), "Visibility grid complete");
        Ok(grid)
    }

    fn point_visible(&self, point: &GeoPoint, instant: DateTime<Utc>) -> bool {
        match catch_unwind(AssertUnwindSafe(|| self.evaluate(point, instant, false))) {
            Ok(result) => result.is_sun_visible(),
            Err(_) => {
                warn!(lat = point.latitude(), lon = point.longitude(), "Grid point failed, marking not visible");
                false
            }
        }
    }
}

// ===================== TESTS =====================
