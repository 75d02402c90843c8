//! Binary distance-band spatial weights.

use geo::Point;
use rstar::RTree;
use rstar::primitives::GeomWithData;

type IndexedCentroid = GeomWithData<[f64; 2], usize>;

/// Neighbour lists where two regions are neighbours when their centroids
/// are at most `threshold` metres apart. A region is never its own
/// neighbour.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceBandWeights {
    threshold: f64,
    neighbors: Vec<Vec<usize>>,
}

impl DistanceBandWeights {
    /// Builds the weights for projected `centroids`.
    #[must_use]
    pub fn new(centroids: &[Point<f64>], threshold: f64) -> Self {
        let tree = RTree::bulk_load(
            centroids
                .iter()
                .enumerate()
                .map(|(i, c)| IndexedCentroid::new([c.x(), c.y()], i))
                .collect(),
        );

        let neighbors = centroids
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut found: Vec<usize> = tree
                    .locate_within_distance([c.x(), c.y()], threshold * threshold)
                    .map(|entry| entry.data)
                    .filter(|&j| j != i)
                    .collect();
                found.sort_unstable();
                found
            })
            .collect();

        Self {
            threshold,
            neighbors,
        }
    }

    /// Distance band in metres.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// Returns `true` if there are no regions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Neighbours of region `i`, ascending.
    #[must_use]
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    /// Number of neighbours of every region.
    #[must_use]
    pub fn cardinalities(&self) -> Vec<usize> {
        self.neighbors.iter().map(Vec::len).collect()
    }

    /// Regions without neighbours.
    #[must_use]
    pub fn islands(&self) -> Vec<usize> {
        self.neighbors
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Row-standardised weights of region `i` with itself included:
    /// `i` and each neighbour get `1 / (cardinality + 1)`.
    #[must_use]
    pub fn star_row(&self, i: usize) -> Vec<(usize, f64)> {
        let members = &self.neighbors[i];
        #[allow(clippy::cast_precision_loss)]
        let weight = 1.0 / (members.len() + 1) as f64;
        std::iter::once(i)
            .chain(members.iter().copied())
            .map(|j| (j, weight))
            .collect()
    }
}
