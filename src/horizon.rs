//! Horizon Module
//!
//! Reduces a terrain profile to the angle of its most restrictive obstruction
//! and compares that against the sun.

use crate::terrain::TerrainProfile;

/// Blocking horizon angle of a profile, in degrees.
///
/// The maximum angular elevation over all samples, as seen from the observer.
/// The steepest sample along the sight-line decides occlusion regardless of
/// its distance. An empty profile has a horizon of 0°.
pub fn horizon_angle(profile: &TerrainProfile) -> f64 {
    let observer = profile.observer_elevation_m();
    profile.points().iter().map(|p| p.angle_from(observer)).reduce(f64::max).unwrap_or(0.0)
}

/// True when terrain hides the sun: `sun_elevation <= horizon_angle(profile)`.
pub fn is_blocked(sun_elevation: f64, profile: &TerrainProfile) -> bool {
    sun_elevation <= horizon_angle(profile)
}

/// Degrees the sun still has to climb to clear the horizon; 0 when clear.
pub fn degrees_until_visible(sun_elevation: f64, horizon: f64) -> f64 {
    (horizon - sun_elevation).max(0.0)
}
