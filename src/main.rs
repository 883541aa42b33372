use chrono::{DateTime, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_english::{Dialect, parse_date_string};
use chrono_tz::Tz;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sunhorizon::time::{parse_time_ns, select_timezone};
use sunhorizon::{
    BoundingBox, ElevationSource, FlatElevation, GeoPoint, GridElevation, SolarModel, SunPositionSolver,
    VisibilityCalculator,
};

mod cli;
mod output;

use cli::{Args, DepInfo};
use output::{GridReport, PointReport};

/// Local noon is used when a date is given without a time
const DEFAULT_LOCAL_HOUR: u32 = 12;

// ===================== MAIN =====================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.show_build_info {
        return print_build_info();
    }

    // Grid mode anchors the timezone at the centre of the box
    let bounds = match args.grid_edges() {
        Some((north, south, east, west)) => Some(BoundingBox::new(north, south, east, west)?),
        None => None,
    };
    let anchor = match bounds {
        Some(b) => b.center(),
        None => GeoPoint::new(
            args.latitude.ok_or("--latitude is required")?,
            args.longitude.ok_or("--longitude is required")?,
        )?,
    };

    let tz = if args.utc { Tz::UTC } else { select_timezone(&args.timezone, anchor.latitude(), anchor.longitude()) };
    debug!(timezone = tz.name(), "Selected display timezone");

    let (date, at) = resolve_instant(&args, &tz)?;
    let model: SolarModel = args.model.parse()?;

    let elevation: Box<dyn ElevationSource> = match (&args.elevation_file, args.flat_elevation) {
        (Some(path), _) => Box::new(GridElevation::from_path(path)?),
        (None, Some(h)) => Box::new(FlatElevation(h)),
        (None, None) => Box::new(FlatElevation::default()),
    };

    let calculator = VisibilityCalculator::new(model, elevation.as_ref()).with_max_workers(args.workers);

    match bounds {
        Some(bounds) => {
            let instant = at.with_timezone(&Utc);
            let grid = calculator.calculate_visibility_grid(&bounds, instant, args.resolution)?;
            info!(points = grid.len(), "Grid finished");
            let report = GridReport::new(&args.model, instant, &grid);
            if args.json {
                output::print_json(&report)?;
            } else {
                output::print_grid_report(&report);
            }
        }
        None => {
            let result = calculator.calculate_visibility(&anchor, at.with_timezone(&Utc));
            let sunrise = model.sunrise(&anchor, date, &tz);
            let sunset = model.sunset(&anchor, date, &tz);
            let report = PointReport::new(&args.model, at, sunrise, sunset, result);
            if args.json {
                output::print_json(&report)?;
            } else {
                output::print_point_report(&report, &tz);
            }
        }
    }

    Ok(())
}

// ===================== HELPERS =====================

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_build_info() -> Result<(), Box<dyn std::error::Error>> {
    println!("Built from Git commit: {}\n", env!("APP_GIT_HASH"));
    const DEP_INFO_RAW: &str = include_str!(env!("DEPS_INFO_PATH"));
    let deps: Vec<DepInfo> = serde_json::from_str(DEP_INFO_RAW)?;

    println!("Found {} dependencies.", deps.len());
    for dep in deps {
        println!("- {} v{}", dep.name, dep.version);
        if let Some(sum) = dep.checksum {
            println!("    Checksum: {}", sum);
        }
        if let Some(src) = dep.source {
            println!("    Source:   {}", src);
        }
    }
    Ok(())
}

/// Calendar day and evaluation instant from `--date` and `--at`.
///
/// Without `--at`, "now" is used for today and local noon for any other date.
fn resolve_instant(args: &Args, tz: &Tz) -> Result<(NaiveDate, DateTime<Tz>), Box<dyn std::error::Error>> {
    let now = Utc::now().with_timezone(tz);

    // Anchor 'today' to the target timezone
    let date = match &args.date {
        Some(s) => parse_date_string(s, now, Dialect::Us)?.with_timezone(tz).date_naive(),
        None => now.date_naive(),
    };

    let at = match args.at.as_deref() {
        Some("now") => return Ok((date, now)),
        Some(at) => parse_time_ns(at)?,
        None if args.date.is_none() => return Ok((date, now)),
        None => (DEFAULT_LOCAL_HOUR, 0, 0, 0),
    };

    let (h, m, s, ns) = at;
    let naive_dt = date.and_hms_nano_opt(h, m, s, ns).ok_or("Invalid time digits")?;

    // Resolve against timezone exactly once
    match tz.from_local_datetime(&naive_dt) {
        LocalResult::Single(t) => Ok((date, t)),
        LocalResult::Ambiguous(t1, t2) => {
            // Fall Back: the same wall-clock time happens twice
            eprintln!(
                "Note: Time {} is ambiguous (DST transition). Using early option: {} (vs {})",
                naive_dt.time(),
                t1.format("%H:%M:%S %Z"),
                t2.format("%H:%M:%S %Z")
            );
            Ok((date, t1))
        }
        LocalResult::None => {
            Err(format!("The time {} does not exist on {} (DST gap/Spring Forward).", naive_dt.time(), date).into())
        }
    }
}
