//! Time and Timezone Utilities Module
//!
//! Provides day-boundary resolution, time parsing, timezone resolution, and
//! formatting utilities.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;
use iana_time_zone::get_timezone;
use std::sync::OnceLock;
use tzf_rs::DefaultFinder;

// tzf-rs DefaultFinder is pre-compiled and very fast
static TZF_FINDER: OnceLock<DefaultFinder> = OnceLock::new();

// ===================== DAY BOUNDARIES =====================

/// First valid instant of a calendar day in `tz`.
///
/// Normally local midnight. When midnight falls into a DST gap the first
/// existing hour is used instead; ambiguous times take the earlier instant.
/// Returns `None` only if no hour of the day's first half exists (a skipped
/// calendar day such as Samoa, 2011-12-30).
pub fn start_of_day<Z: TimeZone>(tz: &Z, date: NaiveDate) -> Option<DateTime<Z>> {
    for hour in 0..12 {
        let naive = date.and_hms_opt(hour, 0, 0)?;
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => return Some(t),
            LocalResult::Ambiguous(t, _) => return Some(t),
            LocalResult::None => continue,
        }
    }
    None
}

// ===================== TIME PARSING =====================

/// Parse a time string in HH:MM[:SS[.fffffffff]] format.
///
/// # Returns
/// Tuple of (hours, minutes, seconds, nanoseconds)
///
/// # Errors
/// Returns an error if the time format is invalid
pub fn parse_time_ns(s: &str) -> Result<(u32, u32, u32, u32), Box<dyn std::error::Error>> {
    let formats = ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];

    for fmt in formats {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Ok((t.hour(), t.minute(), t.second(), t.nanosecond()));
        }
    }
    Err("Invalid time format. Use HH:MM, HH:MM:SS, or HH:MM:SS.ns".into())
}

// ===================== TIMEZONE UTILITIES =====================

/// Get the system's configured timezone.
///
/// Falls back to UTC if the system timezone cannot be determined.
pub fn system_timezone() -> Tz {
    get_timezone().ok().and_then(|s| s.parse().ok()).unwrap_or(Tz::UTC)
}

/// Resolve timezone from geographic coordinates, or UTC if resolution fails.
pub fn resolve_timezone(lon: f64, lat: f64) -> Tz {
    let finder = TZF_FINDER.get_or_init(DefaultFinder::new);
    let tzid = finder.get_tz_name(lon, lat);
    tzid.parse::<Tz>().unwrap_or(Tz::UTC)
}

/// Pick the display timezone from a CLI-style selector.
///
/// `"system"` uses the host zone, `"location"` the zone at the coordinates,
/// anything else is parsed as an IANA name (UTC if unknown).
pub fn select_timezone(selector: &str, lat: f64, lon: f64) -> Tz {
    match selector {
        "system" => system_timezone(),
        "location" => resolve_timezone(lon, lat),
        other => other.parse().unwrap_or(Tz::UTC),
    }
}

// ===================== FORMATTING =====================

/// Format a duration as "Xh Ym Zs", truncated to whole seconds.
///
/// Negative durations are formatted by magnitude.
pub fn format_hms(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().abs();
    if total_seconds == 0 {
        return "0s".to_string();
    }

    let h = total_seconds / 3600;
    let m = (total_seconds % 3600) / 60;
    let s = total_seconds % 60;

    let mut parts = Vec::new();
    if h > 0 {
        parts.push(format!("{}h", h));
    }
    if m > 0 {
        parts.push(format!("{}m", m));
    }
    if s > 0 {
        parts.push(format!("{}s", s));
    }

    parts.join(" ")
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;
    use chrono_tz::America::Sao_Paulo;
    use chrono_tz::Europe::Zurich;
    use chrono_tz::Pacific::Apia;

    #[test]
    fn test_start_of_day_regular() {
        let d = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let t = start_of_day(&Zurich, d).unwrap();
        assert_eq!(t.hour(), 0);
        assert_eq!(t.date_naive(), d);
    }

    #[test]
    fn test_start_of_day_dst_gap_at_midnight() {
        // Brazil moved clocks forward at 00:00 on 2018-11-04
        let d = NaiveDate::from_ymd_opt(2018, 11, 4).unwrap();
        let t = start_of_day(&Sao_Paulo, d).unwrap();
        assert_eq!(t.hour(), 1);
    }

    #[test]
    fn test_start_of_day_skipped_calendar_day() {
        // Samoa skipped 2011-12-30 entirely
        let d = NaiveDate::from_ymd_opt(2011, 12, 30).unwrap();
        assert!(start_of_day(&Apia, d).is_none());
    }

    #[test]
    fn test_at_time_parsing_invalid() {
        assert!(parse_time_ns("a").is_err());
        assert!(parse_time_ns("21").is_err());
        assert!(parse_time_ns("25:00").is_err());
        assert!(parse_time_ns("12:60").is_err());
    }

    #[test]
    fn test_at_time_parsing_valid() {
        assert_eq!(parse_time_ns("12:30").unwrap(), (12, 30, 0, 0));
        assert_eq!(parse_time_ns("00:00").unwrap(), (0, 0, 0, 0));
        assert_eq!(parse_time_ns("12:30:45").unwrap(), (12, 30, 45, 0));
        assert_eq!(parse_time_ns("12:30:45.123").unwrap(), (12, 30, 45, 123_000_000));
    }

    #[test]
    fn test_select_timezone_explicit_and_fallback() {
        assert_eq!(select_timezone("Europe/Zurich", 0.0, 0.0), Zurich);
        assert_eq!(select_timezone("Not/AZone", 0.0, 0.0), Tz::UTC);
    }

    #[test]
    fn test_resolve_timezone_swiss_alps() {
        let tz = resolve_timezone(8.2275, 46.8182);
        // The dataset canonicalizes identical zones, so check the offsets instead of the name
        let winter = tz.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let summer = tz.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();
        assert_eq!(winter.offset().fix().local_minus_utc(), 3600, "got {:?}", tz);
        assert_eq!(summer.offset().fix().local_minus_utc(), 7200, "got {:?}", tz);
    }

    #[test]
    fn test_format_hms_day_length() {
        let sr = Zurich.with_ymd_and_hms(2024, 6, 21, 5, 33, 10).unwrap();
        let ss = Zurich.with_ymd_and_hms(2024, 6, 21, 21, 26, 40).unwrap();
        assert_eq!(format_hms(ss - sr), "15h 53m 30s");
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(Duration::seconds(3661)), "1h 1m 1s");
        assert_eq!(format_hms(Duration::hours(2)), "2h");
        assert_eq!(format_hms(Duration::milliseconds(45_900)), "45s");
        assert_eq!(format_hms(Duration::zero()), "0s");
        assert_eq!(format_hms(Duration::seconds(-3660)), "1h 1m");
    }
}
