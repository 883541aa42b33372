//! Terrain-aware sun visibility.
//!
//! Answers whether the sun is actually visible from a point on the Earth's
//! surface at a given instant, once surrounding terrain is taken into
//! account, and fans that answer out over a bounding box for map overlays.
//!
//! ```no_run
//! use chrono::Utc;
//! use sunhorizon::{FlatElevation, GeoPoint, NoaaSolver, VisibilityCalculator};
//!
//! let calc = VisibilityCalculator::new(NoaaSolver, FlatElevation(1500.0));
//! let here = GeoPoint::new(46.8182, 8.2275)?;
//! let result = calc.calculate_visibility(&here, Utc::now());
//! println!("visible: {}", result.is_sun_visible());
//! # Ok::<(), sunhorizon::SunlightError>(())
//! ```

pub mod elevation;
pub mod error;
pub mod geo;
pub mod horizon;
pub mod solar;
pub mod terrain;
pub mod time;
pub mod visibility;

pub use elevation::{FlatElevation, GridElevation};
pub use error::{ElevationError, Result, SunlightError};
pub use geo::{BoundingBox, GeoPoint};
pub use solar::{NoaaSolver, SolarModel, SpaSolver, SunPosition, SunPositionSolver};
pub use terrain::{ElevationSource, TerrainPoint, TerrainProfile, TerrainProfileSampler};
pub use visibility::{CancellationToken, Visibility, VisibilityCalculator, VisibilityGrid, VisibilityResult};
