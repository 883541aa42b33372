//! Error Types
//!
//! One error enum covers the whole crate. Only construction-time invariant
//! violations and grid cancellation ever reach a caller; elevation failures
//! are recovered inside the visibility calculation.

use thiserror::Error;

/// Errors produced by the sun visibility engine and its collaborators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SunlightError {
    /// Latitude, longitude or bounding box ordering out of range
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// Grid resolution must be a finite, positive number of degrees
    #[error("Invalid grid resolution: {0}")]
    InvalidResolution(f64),

    /// Grid would exceed the node limit at the requested resolution
    #[error("Grid of {nodes} points exceeds the limit of {limit}")]
    GridTooLarge { nodes: f64, limit: usize },

    /// The elevation source could not resolve one or more points
    #[error("Elevation unavailable: {0}")]
    ElevationUnavailable(String),

    /// Elevation raster file is malformed
    #[error("Invalid elevation grid: {0}")]
    InvalidElevationGrid(String),

    /// A grid query was superseded before it finished
    #[error("Visibility grid calculation cancelled")]
    Cancelled,
}

/// Errors returned by [`crate::terrain::ElevationSource`] implementations.
pub type ElevationError = SunlightError;

pub type Result<T> = std::result::Result<T, SunlightError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SunlightError::InvalidCoordinate("latitude 91 outside [-90, 90]".into());
        assert_eq!(err.to_string(), "Invalid coordinate: latitude 91 outside [-90, 90]");
        let err = SunlightError::GridTooLarge { nodes: 1e12, limit: 2_000_000 };
        assert_eq!(err.to_string(), "Grid of 1000000000000 points exceeds the limit of 2000000");
        assert_eq!(SunlightError::Cancelled.to_string(), "Visibility grid calculation cancelled");
    }
}
