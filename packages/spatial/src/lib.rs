#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Neighborhood-level spatial analysis of incident points.
//!
//! Neighborhood polygons are loaded once at startup into a
//! [`NeighborhoodSet`] (projected to Web Mercator, R-tree indexed).
//! Incident points are joined to the polygons, a binary distance-band
//! weight matrix is built over the polygon centroids, and the local
//! Getis-Ord Gi* statistic flags clusters of unusually high or low counts.

pub mod getis_ord;
pub mod hotspot;
pub mod join;
pub mod neighborhoods;
pub mod projection;
pub mod threshold;
pub mod weights;

pub use getis_ord::{LocalGiStar, local_getis_ord_star};
pub use hotspot::{DEFAULT_PERMUTATIONS, HotspotOptions, HotspotReport, analyze_hotspots};
pub use join::count_incidents;
pub use neighborhoods::{NeighborhoodSet, Region};
pub use projection::{from_web_mercator, to_web_mercator};
pub use threshold::{DEFAULT_THRESHOLD, estimate_threshold};
pub use weights::DistanceBandWeights;

/// Errors that can occur while loading boundaries or analysing hotspots.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The boundary file is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The boundary file is valid `GeoJSON` but not a feature collection.
    #[error("Boundary data must be a GeoJSON FeatureCollection")]
    NotAFeatureCollection,

    /// No usable region is available.
    #[error("No valid regions are available for hotspot analysis")]
    NoRegions,

    /// Only one region exists, so there is nothing to compare it with.
    #[error("Only one region is available; Gi* needs several regions to compare")]
    SingleRegion,

    /// Too few regions kept a neighbour within the distance band.
    #[error("Only {remaining} regions have neighbours within the distance band; Gi* needs at least two")]
    TooFewRegions {
        /// Regions left after dropping islands.
        remaining: usize,
    },

    /// Every region has the same value.
    #[error("All regions have the same incident count; hotspot analysis needs variation")]
    NoVariance,

    /// Values and weights describe different numbers of regions.
    #[error("Expected {expected} values, got {actual}")]
    LengthMismatch {
        /// Regions in the weight matrix.
        expected: usize,
        /// Values supplied.
        actual: usize,
    },

    /// An analysis parameter is out of range.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of what went wrong.
        message: String,
    },
}

impl SpatialError {
    /// Returns `true` for refusals caused by the input data rather than a
    /// fault.
    #[must_use]
    pub const fn is_refusal(&self) -> bool {
        matches!(
            self,
            Self::NoRegions
                | Self::SingleRegion
                | Self::TooFewRegions { .. }
                | Self::NoVariance
                | Self::InvalidParameter { .. }
        )
    }
}
