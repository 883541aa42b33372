//! Solar Position Calculation Module
//!
//! Closed-form NOAA solar position solver plus the bisection searches built on
//! top of it (sunrise, sunset, and the next time the sun clears a given
//! elevation). The NREL SPA from `solar-positioning` is available as an
//! alternative strategy behind the same trait.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::Serialize;
use solar_positioning::{spa, time::DeltaT};
use tracing::debug;

use crate::geo::GeoPoint;
use crate::time::start_of_day;

// ===================== CONSTANTS =====================

/// Julian date of the Unix epoch (1970-01-01T00:00Z)
pub const JULIAN_UNIX_EPOCH: f64 = 2_440_587.5;

/// Julian date of J2000.0
const JULIAN_J2000: f64 = 2_451_545.0;

/// Days per Julian century
const DAYS_PER_CENTURY: f64 = 36_525.0;

const SECONDS_PER_DAY: f64 = 86_400.0;
const MINUTES_PER_DAY: f64 = 1_440.0;
const MINUTES_PER_HALF_DAY: f64 = 720.0;

/// Number of halvings in every bisection search. This is the accuracy knob:
/// 20 rounds over half a day narrow the bracket to about 0.04 s.
pub const BISECTION_ROUNDS: u32 = 20;

/// Below this `cos(lat) * sin(zenith)` the azimuth is undefined and reported as 0.
const AZIMUTH_DENOMINATOR_EPS: f64 = 0.001;

/// Coarse step when scanning forward for an elevation crossing
const CROSSING_SCAN_STEP_MINUTES: i64 = 10;

/// Fallback ΔT (seconds) when the estimator has no model for the year
const DEFAULT_DELTA_T: f64 = 69.0;

// ===================== SUN POSITION =====================

/// Sun direction as seen from the observer.
///
/// Azimuth is in [0, 360) degrees clockwise from North, elevation in
/// [-90, 90] degrees above the horizontal plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SunPosition {
    azimuth: f64,
    elevation: f64,
}

impl SunPosition {
    /// Build a position, normalizing azimuth and clamping elevation.
    /// Non-finite input yields [`SunPosition::below_horizon`].
    pub fn new(azimuth: f64, elevation: f64) -> Self {
        if !azimuth.is_finite() || !elevation.is_finite() {
            return Self::below_horizon();
        }
        let mut az = azimuth.rem_euclid(360.0);
        // rem_euclid of a tiny negative value rounds up to exactly 360
        if az >= 360.0 {
            az = 0.0;
        }
        Self { azimuth: az, elevation: elevation.clamp(-90.0, 90.0) }
    }

    /// Sentinel for an undefined or unreachable sun state.
    pub const fn below_horizon() -> Self {
        Self { azimuth: 0.0, elevation: -90.0 }
    }

    pub fn azimuth(&self) -> f64 {
        self.azimuth
    }

    pub fn elevation(&self) -> f64 {
        self.elevation
    }

    pub fn zenith(&self) -> f64 {
        90.0 - self.elevation
    }

    pub fn is_above_horizon(&self) -> bool {
        self.elevation > 0.0
    }
}

// ===================== SOLVER STRATEGY =====================

/// Capability to compute the sun's direction for a place and instant.
///
/// Implementations must be pure and never fail. The provided search methods
/// only depend on [`SunPositionSolver::position`].
pub trait SunPositionSolver: Send + Sync {
    /// Sun position at `instant` for an observer at `location`.
    fn position(&self, location: &GeoPoint, instant: DateTime<Utc>) -> SunPosition;

    /// Sun elevation in degrees at a minute offset from a local midnight.
    fn elevation_at_minute<Tz: TimeZone>(
        &self,
        location: &GeoPoint,
        midnight: &DateTime<Tz>,
        minute: f64,
    ) -> f64
    where
        Self: Sized,
    {
        let t = minute_to_instant(midnight, minute);
        self.position(location, t.with_timezone(&Utc)).elevation()
    }

    /// Sunrise on a calendar day in `tz`.
    ///
    /// Bisects minutes-of-day over [0, 720). Returns `None` when the sun does
    /// not cross the horizon in the morning half of the day (polar day or
    /// polar night).
    fn sunrise<Tz: TimeZone>(&self, location: &GeoPoint, date: NaiveDate, tz: &Tz) -> Option<DateTime<Tz>>
    where
        Self: Sized,
    {
        let midnight = start_of_day(tz, date)?;
        let minute = bisect_horizon_crossing(
            |m| self.elevation_at_minute(location, &midnight, m),
            0.0,
            MINUTES_PER_HALF_DAY,
            true,
        )?;
        Some(minute_to_instant(&midnight, minute))
    }

    /// Sunset on a calendar day in `tz`.
    ///
    /// Bisects minutes-of-day over [720, 1440). Returns `None` for polar day
    /// or polar night.
    fn sunset<Tz: TimeZone>(&self, location: &GeoPoint, date: NaiveDate, tz: &Tz) -> Option<DateTime<Tz>>
    where
        Self: Sized,
    {
        let midnight = start_of_day(tz, date)?;
        let minute = bisect_horizon_crossing(
            |m| self.elevation_at_minute(location, &midnight, m),
            MINUTES_PER_HALF_DAY,
            MINUTES_PER_DAY,
            false,
        )?;
        Some(minute_to_instant(&midnight, minute))
    }

    /// First instant after `start` at which the sun climbs above
    /// `target_elevation` degrees, searching at most `window` ahead.
    ///
    /// Scans forward in coarse steps, then refines the first bracket with
    /// bisection. Returns `start` itself if the sun is already above target.
    fn next_elevation_crossing(
        &self,
        location: &GeoPoint,
        start: DateTime<Utc>,
        target_elevation: f64,
        window: Duration,
    ) -> Option<DateTime<Utc>>
    where
        Self: Sized,
    {
        let error = |t: DateTime<Utc>| self.position(location, t).elevation() - target_elevation;

        if error(start) > 0.0 {
            return Some(start);
        }

        let step = Duration::minutes(CROSSING_SCAN_STEP_MINUTES);
        let end = start + window;
        let mut a = start;
        while a < end {
            let b = (a + step).min(end);
            if error(b) > 0.0 {
                // Crossing lies in (a, b]
                let (mut lo, mut hi) = (a, b);
                for _ in 0..BISECTION_ROUNDS {
                    let m = lo + (hi - lo) / 2;
                    if error(m) > 0.0 {
                        hi = m;
                    } else {
                        lo = m;
                    }
                }
                return Some(hi);
            }
            a = b;
        }
        None
    }
}

/// Bisect a horizon crossing of `elevation(minute)` inside `[lo, hi]`.
///
/// `rising` selects the direction: below-then-above (sunrise) or
/// above-then-below (sunset). A bracket without the expected sign change has
/// no event. The result must fall inside the calendar day.
fn bisect_horizon_crossing<F>(elevation: F, mut lo: f64, mut hi: f64, rising: bool) -> Option<f64>
where
    F: Fn(f64) -> f64,
{
    let at_lo = elevation(lo);
    let at_hi = elevation(hi);
    if !at_lo.is_finite() || !at_hi.is_finite() {
        return None;
    }
    let brackets = if rising { at_lo <= 0.0 && at_hi > 0.0 } else { at_lo > 0.0 && at_hi <= 0.0 };
    if !brackets {
        return None;
    }

    for _ in 0..BISECTION_ROUNDS {
        let mid = (lo + hi) / 2.0;
        let above = elevation(mid) > 0.0;
        if above == rising {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    let minute = (lo + hi) / 2.0;
    if (0.0..MINUTES_PER_DAY).contains(&minute) { Some(minute) } else { None }
}

fn minute_to_instant<Tz: TimeZone>(midnight: &DateTime<Tz>, minute: f64) -> DateTime<Tz> {
    midnight.clone() + Duration::milliseconds((minute * 60_000.0).round() as i64)
}

// ===================== NOAA SOLVER =====================

/// NOAA solar position algorithm (Meeus-based closed form).
///
/// Accurate to roughly 0.01° between 1800 and 2100, no refraction applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoaaSolver;

/// Julian date for a UTC instant. Leap seconds are ignored.
pub fn julian_date(instant: DateTime<Utc>) -> f64 {
    let seconds = instant.timestamp() as f64 + f64::from(instant.timestamp_subsec_nanos()) * 1e-9;
    seconds / SECONDS_PER_DAY + JULIAN_UNIX_EPOCH
}

/// Julian centuries since J2000.0
pub fn julian_century(jd: f64) -> f64 {
    (jd - JULIAN_J2000) / DAYS_PER_CENTURY
}

/// Intermediate NOAA quantities that only depend on time.
#[derive(Debug, Clone, Copy)]
struct SolarCoordinates {
    /// Solar declination in radians
    declination: f64,
    /// Equation of time in minutes
    equation_of_time: f64,
}

impl SolarCoordinates {
    fn at(jc: f64) -> Self {
        let mean_longitude = (280.46646 + jc * (36_000.76983 + jc * 0.000_303_2)).rem_euclid(360.0);
        let mean_anomaly = 357.52911 + jc * (35_999.05029 - 0.000_153_7 * jc);
        let eccentricity = 0.016_708_634 - jc * (0.000_042_037 + 0.000_000_126_7 * jc);

        let m = mean_anomaly.to_radians();
        let center = m.sin() * (1.914602 - jc * (0.004817 + 0.000014 * jc))
            + (2.0 * m).sin() * (0.019993 - 0.000101 * jc)
            + (3.0 * m).sin() * 0.000289;

        let true_longitude = mean_longitude + center;
        let omega = (125.04 - 1934.136 * jc).to_radians();
        let apparent_longitude = true_longitude - 0.00569 - 0.00478 * omega.sin();

        let seconds = 21.448 - jc * (46.815 + jc * (0.00059 - jc * 0.001813));
        let mean_obliquity = 23.0 + (26.0 + seconds / 60.0) / 60.0;
        let obliquity = (mean_obliquity + 0.00256 * omega.cos()).to_radians();

        let declination = (obliquity.sin() * apparent_longitude.to_radians().sin()).asin();

        let y = (obliquity / 2.0).tan().powi(2);
        let l0 = mean_longitude.to_radians();
        let e = eccentricity;
        let eot = y * (2.0 * l0).sin() - 2.0 * e * m.sin()
            + 4.0 * e * y * m.sin() * (2.0 * l0).cos()
            - 0.5 * y * y * (4.0 * l0).sin()
            - 1.25 * e * e * (2.0 * m).sin();

        Self { declination, equation_of_time: 4.0 * eot.to_degrees() }
    }
}

impl SunPositionSolver for NoaaSolver {
    fn position(&self, location: &GeoPoint, instant: DateTime<Utc>) -> SunPosition {
        let jd = julian_date(instant);
        let coords = SolarCoordinates::at(julian_century(jd));

        let minutes_utc = f64::from(instant.num_seconds_from_midnight()) / 60.0
            + f64::from(instant.nanosecond()) / 60e9;
        let true_solar_time =
            (minutes_utc + coords.equation_of_time + 4.0 * location.longitude()).rem_euclid(MINUTES_PER_DAY);
        let mut hour_angle = true_solar_time / 4.0 - 180.0;
        if hour_angle < -180.0 {
            hour_angle += 360.0;
        }

        let lat = location.latitude().to_radians();
        let decl = coords.declination;
        let ha = hour_angle.to_radians();

        let cos_zenith = (lat.sin() * decl.sin() + lat.cos() * decl.cos() * ha.cos()).clamp(-1.0, 1.0);
        let zenith = cos_zenith.acos();

        let denominator = lat.cos() * zenith.sin();
        let azimuth = if denominator.abs() > AZIMUTH_DENOMINATOR_EPS {
            let cos_az = ((lat.sin() * zenith.cos() - decl.sin()) / denominator).clamp(-1.0, 1.0);
            let az = 180.0 - cos_az.acos().to_degrees();
            if hour_angle > 0.0 { -az } else { az }
        } else {
            // Pole or sun at zenith: bearing is undefined
            0.0
        };

        SunPosition::new(azimuth, 90.0 - zenith.to_degrees())
    }
}

// ===================== SPA SOLVER =====================

/// NREL SPA via `solar-positioning`, without refraction.
///
/// Slower than [`NoaaSolver`] but accurate to 0.0003°. Any error from the
/// underlying library yields the below-horizon sentinel.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpaSolver;

impl SunPositionSolver for SpaSolver {
    fn position(&self, location: &GeoPoint, instant: DateTime<Utc>) -> SunPosition {
        let delta_t = DeltaT::estimate_from_date(instant.year(), instant.month()).unwrap_or(DEFAULT_DELTA_T);
        match spa::solar_position(instant, location.latitude(), location.longitude(), 0.0, delta_t, None) {
            Ok(pos) => SunPosition::new(pos.azimuth(), pos.elevation_angle()),
            Err(e) => {
                debug!(error = %e, "SPA solver failed, reporting sun below horizon");
                SunPosition::below_horizon()
            }
        }
    }
}

// ===================== MODEL SELECTION =====================

/// Solver chosen at startup (e.g. from the command line).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolarModel {
    #[default]
    Noaa,
    Spa,
}

impl FromStr for SolarModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "noaa" => Ok(Self::Noaa),
            "spa" => Ok(Self::Spa),
            other => Err(format!("Unknown solar model '{}', expected 'noaa' or 'spa'", other)),
        }
    }
}

impl SunPositionSolver for SolarModel {
    fn position(&self, location: &GeoPoint, instant: DateTime<Utc>) -> SunPosition {
        match self {
            Self::Noaa => NoaaSolver.position(location, instant),
            Self::Spa => SpaSolver.position(location, instant),
        }
    }
}

// ===================== TESTS =====================
