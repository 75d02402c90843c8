//! Point-in-polygon counting of incidents per neighborhood.

use geo::Point;

use crate::neighborhoods::NeighborhoodSet;
use crate::projection::to_web_mercator;

/// Counts the longitude/latitude `points` falling in each region of `set`.
///
/// The result is aligned with [`NeighborhoodSet::regions`]. Points outside
/// every region are ignored; a point on a shared edge counts for each
/// region it touches.
#[must_use]
pub fn count_incidents(set: &NeighborhoodSet, points: &[Point<f64>]) -> Vec<u64> {
    let mut counts = vec![0u64; set.len()];
    let mut unmatched = 0usize;

    for point in points {
        if !(point.x().is_finite() && point.y().is_finite()) {
            unmatched += 1;
            continue;
        }
        let projected: Point<f64> = to_web_mercator(point);
        let mut matched = false;
        for index in set.regions_at(projected) {
            counts[index] += 1;
            matched = true;
        }
        if !matched {
            unmatched += 1;
        }
    }

    log::info!(
        "Spatial join: {} of {} points fell inside a region ({} total assignments)",
        points.len() - unmatched,
        points.len(),
        counts.iter().sum::<u64>()
    );

    counts
}
