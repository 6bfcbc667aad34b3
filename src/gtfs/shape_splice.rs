//! segment coordinate synthesis: the last step of C3. builds each pattern's
//! ordered segment list from stop coordinates, then (optionally) enriches
//! it with intermediate points from a GTFS shape polyline, following the
//! monotone nearest-point matching algorithm in
//! `original_source/backend/data_class/gtfs.py::improve_pattern_with_shapes`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RoveError;

/// a (lat, lon) coordinate pair, matching the order GTFS stores them in.
pub type Coord = (f64, f64);

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub stop_pair: (Arc<str>, Arc<str>),
    pub polyline: Vec<Coord>,
}

/// builds the initial two-point-per-segment polyline for every pattern,
/// straight from stop coordinates, per §4.2's "the initial polyline is
/// `[coord(s_i), coord(s_i+1)]`".
pub fn build_base_segments(
    pattern_stops: &HashMap<Arc<str>, Vec<Arc<str>>>,
    stop_coords: &HashMap<Arc<str>, Coord>,
) -> Result<HashMap<Arc<str>, Vec<Segment>>, RoveError> {
    let mut patterns = HashMap::with_capacity(pattern_stops.len());
    for (pattern, stop_ids) in pattern_stops {
        let mut segments = Vec::with_capacity(stop_ids.len().saturating_sub(1));
        for window in stop_ids.windows(2) {
            let (a, b) = (window[0].clone(), window[1].clone());
            let coord_a = *stop_coords
                .get(&a)
                .ok_or_else(|| RoveError::InvalidData(format!("no coordinates for stop '{a}'")))?;
            let coord_b = *stop_coords
                .get(&b)
                .ok_or_else(|| RoveError::InvalidData(format!("no coordinates for stop '{b}'")))?;
            segments.push(Segment {
                stop_pair: (a, b),
                polyline: vec![coord_a, coord_b],
            });
        }
        patterns.insert(pattern.clone(), segments);
    }
    Ok(patterns)
}

/// index of the point in `coords` nearest `target` in plain Euclidean
/// degree space, matching `scipy.spatial.distance.cdist(..., 'euclidean')`
/// followed by `argmin` in the original source. degree-space distance is
/// adequate here: it is only used to locate the closest vertex along an
/// already-matched shape polyline, not to measure real-world distance.
fn find_nearest_point(coords: &[Coord], target: Coord) -> usize {
    coords
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let da = squared_distance(**a, target);
            let db = squared_distance(**b, target);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

fn squared_distance(a: Coord, b: Coord) -> f64 {
    let (dlat, dlon) = (a.0 - b.0, a.1 - b.1);
    dlat * dlat + dlon * dlon
}

/// replaces a pattern's segment polylines with shape-derived ones where the
/// match yields more than two points, advancing the search window after
/// each segment so later segments cannot match earlier shape indices — the
/// "no backtracking on loop routes" invariant in §4.2 and §8.
pub fn enrich_with_shape(segments: &mut [Segment], shape_coords: &[Coord]) {
    if shape_coords.is_empty() {
        return;
    }
    let mut window = shape_coords;
    let mut window_offset = 0usize;
    for segment in segments.iter_mut() {
        let start = segment.polyline[0];
        let end = *segment.polyline.last().unwrap();
        let first_idx = find_nearest_point(window, start);
        let last_idx = find_nearest_point(window, end);
        // mirrors `shape_coords[first_stop_match_index:last_stop_match_index+1]`:
        // when the match order is reversed the literal slice is empty, which
        // correctly falls through to the two-point stop-coordinate fallback
        // below rather than substituting a spurious shape-derived polyline.
        let intermediate: Vec<Coord> = if first_idx <= last_idx {
            window[first_idx..=last_idx].to_vec()
        } else {
            Vec::new()
        };
        if intermediate.len() > 2 {
            segment.polyline = intermediate;
        }
        let advance = last_idx;
        window = &shape_coords[window_offset + advance..];
        window_offset += advance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_base_segments_two_point_polyline() {
        let mut pattern_stops = HashMap::new();
        pattern_stops.insert(Arc::from("R1-0-1"), vec![Arc::from("A"), Arc::from("B"), Arc::from("C")]);
        let mut coords = HashMap::new();
        coords.insert(Arc::from("A") as Arc<str>, (42.0, -71.0));
        coords.insert(Arc::from("B") as Arc<str>, (42.1, -71.1));
        coords.insert(Arc::from("C") as Arc<str>, (42.2, -71.2));

        let patterns = build_base_segments(&pattern_stops, &coords).unwrap();
        let segments = &patterns[&(Arc::from("R1-0-1") as Arc<str>)];
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].polyline, vec![(42.0, -71.0), (42.1, -71.1)]);
    }

    #[test]
    fn test_build_base_segments_missing_coord_errs() {
        let mut pattern_stops = HashMap::new();
        pattern_stops.insert(Arc::from("R1-0-1"), vec![Arc::from("A"), Arc::from("B")]);
        let coords = HashMap::new();
        let result = build_base_segments(&pattern_stops, &coords);
        assert!(result.is_err());
    }

    #[test]
    fn test_enrich_with_shape_is_monotone_and_improves_segments() {
        // 100-point shape spanning A(0,0) -> B(1,0) -> C(2,0) in a straight line.
        let shape: Vec<Coord> = (0..=100).map(|i| (i as f64 / 50.0, 0.0)).collect();
        let mut segments = vec![
            Segment {
                stop_pair: (Arc::from("A"), Arc::from("B")),
                polyline: vec![(0.0, 0.0), (1.0, 0.0)],
            },
            Segment {
                stop_pair: (Arc::from("B"), Arc::from("C")),
                polyline: vec![(1.0, 0.0), (2.0, 0.0)],
            },
        ];
        enrich_with_shape(&mut segments, &shape);

        assert!(segments[0].polyline.len() > 2);
        assert!(segments[1].polyline.len() > 2);
        // first segment's polyline must end at or before the shape index that
        // the second segment's polyline starts at (no backtracking).
        let seg0_last = segments[0].polyline.last().copied().unwrap();
        let seg1_first = segments[1].polyline.first().copied().unwrap();
        assert!(seg0_last.0 <= seg1_first.0 + 1e-9);
    }

    #[test]
    fn test_enrich_with_shape_keeps_stop_coords_when_match_is_thin() {
        let shape = vec![(0.0, 0.0), (2.0, 0.0)];
        let mut segments = vec![Segment {
            stop_pair: (Arc::from("A"), Arc::from("B")),
            polyline: vec![(0.0, 0.0), (2.0, 0.0)],
        }];
        enrich_with_shape(&mut segments, &shape);
        assert_eq!(segments[0].polyline.len(), 2);
    }
}
