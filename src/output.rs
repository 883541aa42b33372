//! Output Formatting Module
//!
//! Provides terminal and JSON formatting for point and grid reports.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use sunhorizon::time::format_hms;
use sunhorizon::{BoundingBox, GeoPoint, Visibility, VisibilityGrid, VisibilityResult};

// ===================== REPORT TYPES =====================

/// Everything printed for a single observer.
#[derive(Debug, Serialize)]
pub struct PointReport {
    pub model: String,
    pub timezone: String,
    pub instant: String,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    pub day_length_seconds: Option<i64>,
    pub result: VisibilityResult,
}

impl PointReport {
    pub fn new(
        model: &str,
        at: DateTime<Tz>,
        sunrise: Option<DateTime<Tz>>,
        sunset: Option<DateTime<Tz>>,
        result: VisibilityResult,
    ) -> Self {
        let day_length_seconds = match (sunrise, sunset) {
            (Some(sr), Some(ss)) => Some((ss - sr).num_seconds()),
            _ => None,
        };
        Self {
            model: model.to_string(),
            timezone: at.timezone().name().to_string(),
            instant: at.to_rfc3339(),
            sunrise: sunrise.map(|t| t.to_rfc3339()),
            sunset: sunset.map(|t| t.to_rfc3339()),
            day_length_seconds,
            result,
        }
    }
}

/// Grid summary plus the overlay rows, north first.
#[derive(Debug, Serialize)]
pub struct GridReport {
    pub model: String,
    pub instant: String,
    pub bounds: BoundingBox,
    pub resolution: f64,
    pub points: usize,
    pub visible_fraction: f64,
    /// Rows from north to south, each from west to east
    pub rows: Vec<Vec<bool>>,
}

impl GridReport {
    pub fn new(model: &str, instant: DateTime<Utc>, grid: &VisibilityGrid) -> Self {
        let mut rows = grid.rows();
        rows.reverse();
        Self {
            model: model.to_string(),
            instant: instant.to_rfc3339(),
            bounds: *grid.bounds(),
            resolution: grid.resolution(),
            points: grid.len(),
            visible_fraction: grid.visible_fraction(),
            rows,
        }
    }
}

// ===================== TERMINAL OUTPUT =====================

fn format_location(p: &GeoPoint) -> String {
    format!(
        "{:.4}°{} {:.4}°{}",
        p.latitude().abs(),
        if p.latitude() >= 0.0 { "N" } else { "S" },
        p.longitude().abs(),
        if p.longitude() >= 0.0 { "E" } else { "W" }
    )
}

/// Print the single-point report.
///
/// # Arguments
/// * `report` - Assembled report
/// * `tz` - Display timezone for the next-sun estimate
pub fn print_point_report(report: &PointReport, tz: &Tz) {
    let result = &report.result;
    let sun = result.sun_position();

    println!("Location    : {}", format_location(result.location()));
    println!("Time        : {} ({})", report.instant, report.model);

    match (&report.sunrise, &report.sunset) {
        (Some(sr), Some(ss)) => {
            println!("Sunrise     : {}", sr);
            println!("Sunset      : {}", ss);
            if let Some(len) = report.day_length_seconds {
                println!("Daylight    : {}", format_hms(Duration::seconds(len)));
            }
        }
        (Some(sr), None) => println!("Sunrise     : {} (no sunset today)", sr),
        (None, Some(ss)) => println!("Sunset      : {} (no sunrise today)", ss),
        (None, None) => {
            if sun.is_above_horizon() {
                println!("Polar Day (Midnight Sun).");
            } else {
                println!("No sunrise or sunset today.");
            }
        }
    }

    println!();
    println!("Sun position:");
    println!("  Azimuth     : {:8.3}°", sun.azimuth());
    println!("  Altitude    : {:8.3}°", sun.elevation());
    println!("  Horizon     : {:8.3}°", result.horizon_angle());

    match result.visibility() {
        Visibility::Visible => println!("Sun is visible."),
        Visibility::BelowHorizon => println!("Sun is below the horizon."),
        Visibility::Blocked { degrees_until_visible, next_sun_time } => {
            println!("Sun is blocked by terrain ({:.3}° to go).", degrees_until_visible);
            match next_sun_time {
                Some(t) => println!("Next sun    : {}", t.with_timezone(tz).format("%Y-%m-%d %H:%M:%S %Z")),
                None => println!("Next sun    : not within 24 hours"),
            }
        }
    }
}

/// Print the grid as an ASCII overlay, north at top.
///
/// `#` marks visible sun, `.` marks shade or night.
pub fn print_grid_report(report: &GridReport) {
    let b = &report.bounds;
    println!(
        "Visibility grid {:.4}..{:.4}N {:.4}..{:.4}E every {}° at {} ({})",
        b.south(),
        b.north(),
        b.west(),
        b.east(),
        report.resolution,
        report.instant,
        report.model
    );
    println!();
    for row in &report.rows {
        let line: String = row.iter().map(|v| if *v { '#' } else { '.' }).collect();
        println!("  {}", line);
    }
    println!();
    println!("Visible     : {:.1}% of {} points", report.visible_fraction * 100.0, report.points);
}

/// Print any serializable report as pretty JSON.
pub fn print_json<T: Serialize>(report: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
