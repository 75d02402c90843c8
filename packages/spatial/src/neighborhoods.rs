//! The neighborhood polygon set hotspot analysis runs over.
//!
//! Boundaries are read once from a `GeoJSON` feature collection in
//! EPSG:4326, projected to Web Mercator and indexed in an R-tree of
//! envelopes for point lookups.

use std::path::Path;

use geo::{Area as _, BoundingRect as _, Centroid as _, Intersects as _, MultiPolygon, Point};
use geojson::{Feature, GeoJson};
use rstar::{AABB, RTree, RTreeObject};

use crate::SpatialError;
use crate::projection::to_web_mercator;

/// Property holding a region's display name.
pub const NAME_PROPERTY: &str = "NAME";

/// Fallback name property.
pub const ALTERNATE_NAME_PROPERTY: &str = "NBH_NAMES";

/// One neighborhood, in Web Mercator metres.
#[derive(Debug, Clone)]
pub struct Region {
    /// Display name.
    pub name: String,
    /// Boundary in EPSG:3857.
    pub geometry: MultiPolygon<f64>,
    /// Centroid of `geometry`.
    pub centroid: Point<f64>,
}

/// Envelope of a region stored in the R-tree.
struct RegionEnvelope {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Immutable set of neighborhood polygons with a spatial index.
pub struct NeighborhoodSet {
    regions: Vec<Region>,
    index: RTree<RegionEnvelope>,
}

impl std::fmt::Debug for NeighborhoodSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeighborhoodSet")
            .field("regions", &self.regions.len())
            .finish_non_exhaustive()
    }
}

impl NeighborhoodSet {
    /// Reads a boundary file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a `GeoJSON`
    /// feature collection.
    pub fn load(path: &Path) -> Result<Self, SpatialError> {
        let text = std::fs::read_to_string(path)?;
        let set = Self::from_geojson_str(&text)?;
        log::info!(
            "Loaded {} neighborhood boundaries from {}",
            set.len(),
            path.display()
        );
        Ok(set)
    }

    /// Parses a `GeoJSON` feature collection of (multi)polygons in EPSG:4326.
    ///
    /// Features whose geometry is missing, not polygonal, or invalid are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not a `GeoJSON` feature collection.
    pub fn from_geojson_str(text: &str) -> Result<Self, SpatialError> {
        let GeoJson::FeatureCollection(collection) = text.parse::<GeoJson>()? else {
            return Err(SpatialError::NotAFeatureCollection);
        };

        let total = collection.features.len();
        let polygons = collection
            .features
            .into_iter()
            .enumerate()
            .filter_map(|(index, feature)| {
                let name = display_name(&feature, index);
                let geometry = feature_multipolygon(feature)?;
                Some((name, geometry))
            });

        let set = Self::from_polygons(polygons);
        if set.len() < total {
            log::warn!(
                "Dropped {} of {total} boundary features with missing or invalid geometry",
                total - set.len()
            );
        }
        Ok(set)
    }

    /// Builds a set from named polygons in EPSG:4326. Invalid polygons are
    /// skipped.
    pub fn from_polygons(polygons: impl IntoIterator<Item = (String, MultiPolygon<f64>)>) -> Self {
        let regions: Vec<Region> = polygons
            .into_iter()
            .filter_map(|(name, geometry)| {
                if !is_usable(&geometry) {
                    log::debug!("Skipping invalid boundary {name}");
                    return None;
                }
                let geometry: MultiPolygon<f64> = to_web_mercator(&geometry);
                let centroid = geometry.centroid()?;
                Some(Region {
                    name,
                    geometry,
                    centroid,
                })
            })
            .collect();

        let entries = regions
            .iter()
            .enumerate()
            .map(|(index, region)| RegionEnvelope {
                index,
                envelope: compute_envelope(&region.geometry),
            })
            .collect();

        Self {
            regions,
            index: RTree::bulk_load(entries),
        }
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` if no boundary survived loading.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// All regions, in input order.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Region centroids, in input order.
    #[must_use]
    pub fn centroids(&self) -> Vec<Point<f64>> {
        self.regions.iter().map(|r| r.centroid).collect()
    }

    /// Indices of every region a projected point intersects. A point on a
    /// shared edge belongs to both regions.
    pub fn regions_at(&self, point: Point<f64>) -> impl Iterator<Item = usize> + '_ {
        let query = AABB::from_point([point.x(), point.y()]);
        self.index
            .locate_in_envelope_intersecting(&query)
            .filter(move |entry| self.regions[entry.index].geometry.intersects(&point))
            .map(|entry| entry.index)
    }
}

fn display_name(feature: &Feature, index: usize) -> String {
    [NAME_PROPERTY, ALTERNATE_NAME_PROPERTY]
        .iter()
        .find_map(|key| match feature.property(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .unwrap_or_else(|| index.to_string())
}

fn feature_multipolygon(feature: Feature) -> Option<MultiPolygon<f64>> {
    let geometry: geo::Geometry<f64> = feature.geometry?.try_into().ok()?;
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Rejects empty, degenerate or non-finite polygons.
fn is_usable(geometry: &MultiPolygon<f64>) -> bool {
    !geometry.0.is_empty()
        && geometry.0.iter().all(|polygon| {
            let exterior = polygon.exterior();
            exterior.0.len() >= 4
                && polygon
                    .interiors()
                    .iter()
                    .chain(std::iter::once(exterior))
                    .all(|ring| ring.0.iter().all(|c| c.x.is_finite() && c.y.is_finite()))
        })
        && geometry.unsigned_area() > 0.0
}

fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
