//! canonical record types produced by C2/C3, independent of
//! `gtfs_structures`'s archive-shaped types. these are the tables the rest of
//! the pipeline (AVL loading, metric calculation, aggregation) is written
//! against.

use std::sync::Arc;

/// a physical boarding location. `parent_station` mirrors
/// `gtfs_structures::Stop::parent_station`; resolving a stop's effective
/// coordinate through it follows the teacher's `get_stop_location` fallback
/// in `bundle_ops.rs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub stop_id: String,
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
    pub municipality: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub route_type: i32,
}

/// a single stop visit within a trip, after C3's left-join of `stop_times`
/// with `trips`, sort, and dedup. `timepoint`/`branchpoint`/`tp_bp` start
/// unset (`None`) and are filled in by the pattern synthesizer stages that
/// follow record construction.
#[derive(Debug, Clone, PartialEq)]
pub struct GtfsStopEvent {
    pub trip_id: Arc<str>,
    pub route_id: Arc<str>,
    pub direction_id: u8,
    pub stop_sequence: u16,
    pub stop_id: Arc<str>,
    pub arrival_time: i64,
    pub departure_time: i64,
    pub trip_start_time: i64,
    pub trip_end_time: i64,
    pub timepoint: u8,
    pub branchpoint: u8,
    pub tp_bp: u8,
    pub pattern: Option<Arc<str>>,
    pub next_stop: Option<Arc<str>>,
    pub next_stop_arrival_time: Option<i64>,
}

impl GtfsStopEvent {
    pub fn stop_pair(&self) -> Option<(Arc<str>, Arc<str>)> {
        self.next_stop.clone().map(|next| (self.stop_id.clone(), next))
    }
}
