//! Command-Line Interface Module
//!
//! Handles argument parsing and validation for the sunhorizon application.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

// ===================== CLI =====================

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Observer latitude in decimal degrees (-90 to 90)
    #[arg(long, allow_hyphen_values = true, value_parser = parse_latitude, env = "SUNHORIZON_LATITUDE",
          required_unless_present_any = ["show_build_info", "grid_north"])]
    pub latitude: Option<f64>,
    /// Observer longitude in decimal degrees (-180 to 180)
    #[arg(long, allow_hyphen_values = true, value_parser = parse_longitude, env = "SUNHORIZON_LONGITUDE",
          required_unless_present_any = ["show_build_info", "grid_north"])]
    pub longitude: Option<f64>,
    /// Time zone to use ("system", "location", or IANA time zone name)
    #[arg(long, default_value = "system", env = "SUNHORIZON_TIMEZONE")]
    pub timezone: String,

    /// Sun position model to use
    #[arg(long, default_value = "noaa", value_parser = ["noaa", "spa"], env = "SUNHORIZON_MODEL")]
    pub model: String,

    /// Date for calculations (e.g., "2024-12-25" or "today"); defaults to today
    #[arg(long)]
    pub date: Option<String>,
    /// Evaluate visibility at a specific time (HH:MM[:SS[.fffffffff]] or "now")
    #[arg(long)]
    pub at: Option<String>,
    /// Use UTC time zone
    #[arg(long)]
    pub utc: bool,

    // ===================== TERRAIN OPTIONS =====================
    /// JSON elevation raster ({"south", "west", "resolution", "rows"})
    #[arg(long, env = "SUNHORIZON_ELEVATION_FILE", conflicts_with = "flat_elevation")]
    pub elevation_file: Option<PathBuf>,

    /// Assume flat terrain at this elevation in meters
    #[arg(long, allow_hyphen_values = true, value_parser = parse_elevation, env = "SUNHORIZON_FLAT_ELEVATION")]
    pub flat_elevation: Option<f64>,

    // ===================== GRID OPTIONS =====================
    /// Northern edge of the visibility grid (enables grid mode)
    #[arg(long, allow_hyphen_values = true, value_parser = parse_latitude,
          requires_all = ["grid_south", "grid_east", "grid_west"])]
    pub grid_north: Option<f64>,
    /// Southern edge of the visibility grid
    #[arg(long, allow_hyphen_values = true, value_parser = parse_latitude, requires = "grid_north")]
    pub grid_south: Option<f64>,
    /// Eastern edge of the visibility grid
    #[arg(long, allow_hyphen_values = true, value_parser = parse_longitude, requires = "grid_north")]
    pub grid_east: Option<f64>,
    /// Western edge of the visibility grid
    #[arg(long, allow_hyphen_values = true, value_parser = parse_longitude, requires = "grid_north")]
    pub grid_west: Option<f64>,

    /// Grid spacing in degrees
    #[arg(long, default_value_t = 0.01, value_parser = parse_resolution, env = "SUNHORIZON_RESOLUTION")]
    pub resolution: f64,

    /// Maximum concurrent grid workers (0 = available parallelism)
    #[arg(long, default_value_t = 0, value_parser = parse_workers, env = "SUNHORIZON_WORKERS")]
    pub workers: usize,

    // ===================== OUTPUT OPTIONS =====================
    /// Print results as JSON
    #[arg(long, env = "SUNHORIZON_JSON")]
    pub json: bool,

    /// Enable debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long)]
    pub verbose: bool,

    /// Show build info from Cargo.lock at time of building
    #[arg(long)]
    pub show_build_info: bool,
}

impl Args {
    /// Grid edges as (north, south, east, west) when grid mode is requested.
    pub fn grid_edges(&self) -> Option<(f64, f64, f64, f64)> {
        Some((self.grid_north?, self.grid_south?, self.grid_east?, self.grid_west?))
    }
}

// Define the structure to match what we serialized in build.rs
#[derive(Debug, Deserialize)]
pub struct DepInfo {
    pub name: String,
    pub version: String,
    pub checksum: Option<String>,
    pub source: Option<String>,
}

// ===================== CLI VALUE PARSERS =====================

fn parse_latitude(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(-90.0..=90.0).contains(&v) {
        return Err(format!("Latitude must be between -90 and 90, got {}", v));
    }
    Ok(v)
}

fn parse_longitude(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(-180.0..=180.0).contains(&v) {
        return Err(format!("Longitude must be between -180 and 180, got {}", v));
    }
    Ok(v)
}

fn parse_elevation(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(-500.0..=9000.0).contains(&v) {
        return Err(format!("Elevation must be between -500 and 9000 meters, got {}", v));
    }
    Ok(v)
}

fn parse_resolution(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !v.is_finite() || v <= 0.0 {
        return Err(format!("Resolution must be positive, got {}", v));
    }
    Ok(v)
}

fn parse_workers(s: &str) -> Result<usize, String> {
    let v: usize = s.parse().map_err(|_| format!("Invalid integer: {}", s))?;
    if v > 1024 {
        return Err(format!("Worker count must be at most 1024, got {}", v));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_parsers() {
        assert_eq!(parse_latitude("-45.5"), Ok(-45.5));
        assert!(parse_latitude("91").is_err());
        assert!(parse_longitude("-181").is_err());
        assert!(parse_resolution("0").is_err());
        assert!(parse_resolution("nan").is_err());
        assert_eq!(parse_workers("8"), Ok(8));
        assert!(parse_workers("-1").is_err());
        assert!(parse_elevation("abc").is_err());
    }

    #[test]
    fn test_point_mode_args() {
        let args = Args::try_parse_from(["sunhorizon", "--latitude", "46.8", "--longitude", "8.2"]).unwrap();
        assert_eq!(args.latitude, Some(46.8));
        assert!(args.grid_edges().is_none());
        assert_eq!(args.model, "noaa");
    }

    #[test]
    fn test_grid_mode_args() {
        let args = Args::try_parse_from([
            "sunhorizon", "--grid-north", "47", "--grid-south", "46", "--grid-east", "9", "--grid-west", "8",
            "--resolution", "0.1",
        ])
        .unwrap();
        assert_eq!(args.grid_edges(), Some((47.0, 46.0, 9.0, 8.0)));

        // Incomplete bounds are rejected
        assert!(Args::try_parse_from(["sunhorizon", "--grid-north", "47", "--grid-south", "46"]).is_err());
    }
}
