//! End-to-end hotspot analysis over the neighborhood set.

use geo::{MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, JsonObject};
use rand::SeedableRng as _;
use rand::rngs::StdRng;
use serde_json::Value;

use crate::getis_ord::{LocalGiStar, local_getis_ord_star};
use crate::join::count_incidents;
use crate::neighborhoods::NeighborhoodSet;
use crate::projection::from_web_mercator;
use crate::threshold::{DEFAULT_THRESHOLD, estimate_threshold};
use crate::weights::DistanceBandWeights;
use crate::SpatialError;

/// Default number of conditional permutations.
pub const DEFAULT_PERMUTATIONS: usize = 999;

/// Tuning of [`analyze_hotspots`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotspotOptions {
    /// Permutations used for pseudo p-values.
    pub permutations: usize,
    /// Seed for sampling and permutations; random when `None`.
    pub seed: Option<u64>,
}

impl Default for HotspotOptions {
    fn default() -> Self {
        Self {
            permutations: DEFAULT_PERMUTATIONS,
            seed: None,
        }
    }
}

/// Result of a hotspot analysis.
#[derive(Debug, Clone)]
pub struct HotspotReport {
    /// One EPSG:4326 feature per analysed region with `name`, `gi_star`,
    /// `p_value`, `z_score` and `crime_count` properties.
    pub collection: FeatureCollection,
    /// Distance band used, in metres.
    pub threshold: f64,
    /// Names of regions dropped for having no neighbours.
    pub removed_islands: Vec<String>,
}

struct Analysed<'a> {
    name: &'a str,
    geometry: &'a MultiPolygon<f64>,
    centroid: Point<f64>,
    count: u64,
}

/// Counts `points` (longitude/latitude) per region and computes Gi* over
/// the regions that have at least one neighbour within the distance band.
///
/// `max_distance` (metres) is used when positive; otherwise the band is
/// estimated from the region centroids.
///
/// # Errors
///
/// * [`SpatialError::NoRegions`] if the set is empty
/// * [`SpatialError::SingleRegion`] if there is one region and no band was
///   given
/// * [`SpatialError::TooFewRegions`] if fewer than two regions keep a
///   neighbour
/// * [`SpatialError::NoVariance`] if every remaining region has the same
///   count
pub fn analyze_hotspots(
    set: &NeighborhoodSet,
    points: &[Point<f64>],
    max_distance: Option<f64>,
    options: HotspotOptions,
) -> Result<HotspotReport, SpatialError> {
    if set.is_empty() {
        return Err(SpatialError::NoRegions);
    }

    let mut rng = options
        .seed
        .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

    let counts = count_incidents(set, points);
    let regions: Vec<Analysed<'_>> = set
        .regions()
        .iter()
        .zip(counts)
        .map(|(region, count)| Analysed {
            name: &region.name,
            geometry: &region.geometry,
            centroid: region.centroid,
            count,
        })
        .collect();

    let threshold = match max_distance.filter(|d| d.is_finite() && *d > 0.0) {
        Some(d) => {
            log::info!("Using requested distance band: {d:.2} m");
            d
        }
        None if regions.len() < 2 => return Err(SpatialError::SingleRegion),
        None => {
            let centroids: Vec<Point<f64>> = regions.iter().map(|r| r.centroid).collect();
            estimate_threshold(&centroids, &mut rng)
        }
    };
    let threshold = if threshold > 0.0 {
        threshold
    } else {
        DEFAULT_THRESHOLD
    };

    let centroids: Vec<Point<f64>> = regions.iter().map(|r| r.centroid).collect();
    let mut weights = DistanceBandWeights::new(&centroids, threshold);

    let islands = weights.islands();
    let mut removed_islands = Vec::new();
    let regions = if islands.is_empty() {
        regions
    } else {
        let (isolated, kept): (Vec<_>, Vec<_>) = regions
            .into_iter()
            .enumerate()
            .partition(|(i, _)| islands.binary_search(i).is_ok());
        removed_islands = isolated.iter().map(|(_, r)| r.name.to_string()).collect();
        log::warn!(
            "Removing {} regions without neighbours: {}",
            removed_islands.len(),
            removed_islands.join(", ")
        );

        if kept.len() < 2 {
            return Err(SpatialError::TooFewRegions {
                remaining: kept.len(),
            });
        }

        let kept: Vec<Analysed<'_>> = kept.into_iter().map(|(_, r)| r).collect();
        let centroids: Vec<Point<f64>> = kept.iter().map(|r| r.centroid).collect();
        weights = DistanceBandWeights::new(&centroids, threshold);
        kept
    };

    #[allow(clippy::cast_precision_loss)]
    let values: Vec<f64> = regions.iter().map(|r| r.count as f64).collect();
    if values.windows(2).all(|w| (w[0] - w[1]).abs() < f64::EPSILON) {
        log::warn!("Every region has the same incident count; Gi* is undefined");
        return Err(SpatialError::NoVariance);
    }

    let statistics = local_getis_ord_star(&values, &weights, options.permutations, &mut rng)?;
    log::info!(
        "Computed Gi* for {} regions with a {threshold:.2} m band",
        regions.len()
    );

    let features = regions
        .iter()
        .zip(statistics)
        .map(|(region, stats)| to_feature(region, stats))
        .collect();

    Ok(HotspotReport {
        collection: FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
        threshold,
        removed_islands,
    })
}

fn to_feature(region: &Analysed<'_>, stats: LocalGiStar) -> Feature {
    let geometry: MultiPolygon<f64> = from_web_mercator(region.geometry);

    let mut properties = JsonObject::new();
    properties.insert("name".to_string(), Value::from(region.name));
    properties.insert("gi_star".to_string(), number(stats.gi_star));
    properties.insert("p_value".to_string(), number(stats.p_value));
    properties.insert("z_score".to_string(), number(stats.z_score));
    properties.insert("crime_count".to_string(), Value::from(region.count));

    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Non-finite values have no JSON representation and become `null`.
fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
}

#[cfg(test)]
mod tests {
    use geo::point;

    use super::*;
    use crate::neighborhoods::tests::square;

    /// A 4x4 grid of 0.01 degree cells near the equator plus one far away.
    fn grid_with_island() -> NeighborhoodSet {
        let mut polygons = Vec::new();
        for row in 0..4 {
            for col in 0..4 {
                polygons.push((
                    format!("cell {row}-{col}"),
                    square(f64::from(col) * 0.01, f64::from(row) * 0.01, 0.01),
                ));
            }
        }
        polygons.push(("island".to_string(), square(5.0, 5.0, 0.01)));
        NeighborhoodSet::from_polygons(polygons)
    }

    fn points_in_corner() -> Vec<Point<f64>> {
        let mut points = Vec::new();
        for i in 0..30 {
            let offset = f64::from(i) * 0.0002;
            points.push(point!(x: 0.001 + offset, y: 0.002 + offset));
        }
        points.push(point!(x: 0.035, y: 0.035));
        points
    }

    fn options() -> HotspotOptions {
        HotspotOptions {
            permutations: 199,
            seed: Some(11),
        }
    }

    #[test]
    fn finds_hotspot_and_drops_island() {
        let set = grid_with_island();
        // Cells are ~1113 m apart; 1200 m links orthogonal neighbours only.
        let report = analyze_hotspots(&set, &points_in_corner(), Some(1200.0), options()).unwrap();

        assert_eq!(report.removed_islands, vec!["island".to_string()]);
        assert_eq!(report.collection.features.len(), 16);
        assert!((report.threshold - 1200.0).abs() < f64::EPSILON);

        let corner = &report.collection.features[0];
        let props = corner.properties.as_ref().unwrap();
        assert_eq!(props["name"], "cell 0-0");
        assert_eq!(props["crime_count"], 30);
        assert!(props["z_score"].as_f64().unwrap() > 0.0);
        for key in ["gi_star", "p_value", "z_score", "crime_count", "name"] {
            assert!(props.contains_key(key), "{key}");
        }

        // Geometry is back in longitude/latitude.
        let geometry: geo::Geometry<f64> =
            corner.geometry.clone().unwrap().try_into().unwrap();
        let geo::Geometry::MultiPolygon(mp) = geometry else {
            panic!("expected a multipolygon");
        };
        let first = mp.0[0].exterior().0[0];
        assert!(first.x.abs() < 1e-9 && first.y.abs() < 1e-9);
    }

    #[test]
    fn estimates_band_when_not_given() {
        // A row of ten cells: the median centroid distance is three cells,
        // so the band links adjacent cells.
        let set = NeighborhoodSet::from_polygons((0..10).map(|i| {
            (
                format!("cell {i}"),
                square(f64::from(i) * 0.01, 0.0, 0.01),
            )
        }));
        let report = analyze_hotspots(&set, &points_in_corner(), None, options()).unwrap();

        assert!(report.threshold > 1113.0 && report.threshold < 2226.0);
        assert!(report.removed_islands.is_empty());
        assert_eq!(report.collection.features.len(), 10);
    }

    #[test]
    fn refuses_equal_counts() {
        let set = grid_with_island();
        let err = analyze_hotspots(&set, &[], Some(1200.0), options()).unwrap_err();
        assert!(matches!(err, SpatialError::NoVariance));
    }

    #[test]
    fn refuses_small_sets() {
        let empty = NeighborhoodSet::from_polygons(Vec::new());
        assert!(matches!(
            analyze_hotspots(&empty, &[], None, options()),
            Err(SpatialError::NoRegions)
        ));

        let single = NeighborhoodSet::from_polygons([("only".to_string(), square(0.0, 0.0, 1.0))]);
        assert!(matches!(
            analyze_hotspots(&single, &[], None, options()),
            Err(SpatialError::SingleRegion)
        ));
        assert!(matches!(
            analyze_hotspots(&single, &[], Some(100.0), options()),
            Err(SpatialError::TooFewRegions { remaining: 0 })
        ));
    }
}
