//! C5: ShapeGenerator. the upstream backend calls out to an HTTP
//! map-matching service (Valhalla trace-attributes) for this step; that
//! collaborator is out of scope here, so this module is specified purely as
//! a `ShapeDistanceSource` trait — a segment-in, distance-out seam — with a
//! geodetic `HaversineShapeDistance` implementation that measures a
//! pattern's already-spliced polyline directly, rather than issuing a
//! network request. grounded on the `geo::{Haversine, Distance}` usage in
//! `bambam_gtfs::schedule::bundle_ops`'s `compute_haversine` path.

use std::collections::HashMap;
use std::sync::Arc;

use geo::{Distance, Haversine, Point};

use crate::error::RoveError;
use crate::gtfs::Segment;

/// per-pattern, per-segment geodetic distance, in kilometers — the shape of
/// the table §4.4 calls out: `(pattern, stop_pair, distance)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDistanceRow {
    pub pattern: Arc<str>,
    pub stop_pair: (Arc<str>, Arc<str>),
    pub distance_km: f64,
}

/// the seam between pattern synthesis and metric calculation: anything that
/// can turn a pattern's segment list into per-segment distances satisfies
/// this, whether that's a local geodetic measurement or (as in the original
/// backend) a call out to a map-matching service.
pub trait ShapeDistanceSource {
    fn distances(
        &self,
        pattern_segments: &HashMap<Arc<str>, Vec<Segment>>,
    ) -> Result<Vec<ShapeDistanceRow>, RoveError>;
}

/// measures the cumulative Haversine length of each segment's spliced
/// polyline directly, without an external routing call.
pub struct HaversineShapeDistance;

impl ShapeDistanceSource for HaversineShapeDistance {
    fn distances(
        &self,
        pattern_segments: &HashMap<Arc<str>, Vec<Segment>>,
    ) -> Result<Vec<ShapeDistanceRow>, RoveError> {
        let mut rows = Vec::new();
        for (pattern, segments) in pattern_segments {
            for segment in segments {
                let distance_km = polyline_length_km(&segment.polyline);
                rows.push(ShapeDistanceRow {
                    pattern: pattern.clone(),
                    stop_pair: segment.stop_pair.clone(),
                    distance_km,
                });
            }
        }
        Ok(rows)
    }
}

fn polyline_length_km(polyline: &[(f64, f64)]) -> f64 {
    polyline
        .windows(2)
        .map(|pair| {
            let (lat_a, lon_a) = pair[0];
            let (lat_b, lon_b) = pair[1];
            Haversine.distance(Point::new(lon_a, lat_a), Point::new(lon_b, lat_b)) / 1000.0
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polyline_length_km_two_points() {
        // roughly 1 degree of longitude at the equator is ~111 km.
        let polyline = vec![(0.0, 0.0), (0.0, 1.0)];
        let km = polyline_length_km(&polyline);
        assert!((km - 111.0).abs() < 2.0);
    }

    #[test]
    fn test_haversine_shape_distance_one_row_per_segment() {
        let mut pattern_segments = HashMap::new();
        pattern_segments.insert(
            Arc::from("R1-0-1") as Arc<str>,
            vec![Segment {
                stop_pair: (Arc::from("A"), Arc::from("B")),
                polyline: vec![(42.0, -71.0), (42.01, -71.0)],
            }],
        );
        let rows = HaversineShapeDistance.distances(&pattern_segments).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].distance_km > 0.0);
    }
}
