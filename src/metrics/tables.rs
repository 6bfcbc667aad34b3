//! row shapes of the three tables C6 produces: `stop_metrics` and
//! `tpbp_metrics` share a segment-keyed shape (one row per stop pair within
//! a trip); `route_metrics` is keyed one row per trip.

use std::sync::Arc;

/// a stop- or tpbp-grain metrics row: one stop pair within one trip.
#[derive(Debug, Clone)]
pub struct SegmentMetricRow {
    pub pattern: Arc<str>,
    pub route_id: Arc<str>,
    pub direction_id: u8,
    pub trip_id: Arc<str>,
    pub stop_pair: (Arc<str>, Arc<str>),
    pub stop_sequence: u16,
    pub arrival_time: i64,
    pub departure_time: i64,
    pub trip_start_time: i64,
    pub trip_end_time: i64,

    pub stop_spacing: Option<f64>,
    pub scheduled_headway: Option<f64>,
    pub scheduled_running_time: Option<f64>,
    pub scheduled_speed: Option<f64>,
    pub observed_headway: Option<f64>,
    pub observed_running_time: Option<f64>,
    pub observed_speed_without_dwell: Option<f64>,
    pub observed_running_time_with_dwell: Option<f64>,
    pub observed_speed_with_dwell: Option<f64>,
    pub boardings: Option<f64>,
    pub on_time_performance: Option<f64>,
    pub passenger_load: Option<f64>,
    pub crowding: Option<f64>,
    pub vehicle_congestion_delay: Option<f64>,
    pub passenger_congestion_delay: Option<f64>,
}

impl SegmentMetricRow {
    pub fn blank(
        pattern: Arc<str>,
        route_id: Arc<str>,
        direction_id: u8,
        trip_id: Arc<str>,
        stop_pair: (Arc<str>, Arc<str>),
        stop_sequence: u16,
        arrival_time: i64,
        departure_time: i64,
        trip_start_time: i64,
        trip_end_time: i64,
    ) -> Self {
        SegmentMetricRow {
            pattern,
            route_id,
            direction_id,
            trip_id,
            stop_pair,
            stop_sequence,
            arrival_time,
            departure_time,
            trip_start_time,
            trip_end_time,
            stop_spacing: None,
            scheduled_headway: None,
            scheduled_running_time: None,
            scheduled_speed: None,
            observed_headway: None,
            observed_running_time: None,
            observed_speed_without_dwell: None,
            observed_running_time_with_dwell: None,
            observed_speed_with_dwell: None,
            boardings: None,
            on_time_performance: None,
            passenger_load: None,
            crowding: None,
            vehicle_congestion_delay: None,
            passenger_congestion_delay: None,
        }
    }
}

/// a route-grain metrics row: one row per trip.
#[derive(Debug, Clone)]
pub struct RouteMetricRow {
    pub pattern: Arc<str>,
    pub route_id: Arc<str>,
    pub direction_id: u8,
    pub trip_id: Arc<str>,
    pub trip_start_time: i64,
    pub trip_end_time: i64,

    pub stop_spacing: Option<f64>,
    pub scheduled_running_time: Option<f64>,
    pub scheduled_speed: Option<f64>,
    pub observed_running_time: Option<f64>,
    pub observed_speed_without_dwell: Option<f64>,
    pub observed_running_time_with_dwell: Option<f64>,
    pub observed_speed_with_dwell: Option<f64>,
    pub boardings: Option<f64>,
    pub on_time_performance: Option<f64>,
    pub passenger_load: Option<f64>,
    pub crowding: Option<f64>,
}

impl RouteMetricRow {
    pub fn blank(
        pattern: Arc<str>,
        route_id: Arc<str>,
        direction_id: u8,
        trip_id: Arc<str>,
        trip_start_time: i64,
        trip_end_time: i64,
    ) -> Self {
        RouteMetricRow {
            pattern,
            route_id,
            direction_id,
            trip_id,
            trip_start_time,
            trip_end_time,
            stop_spacing: None,
            scheduled_running_time: None,
            scheduled_speed: None,
            observed_running_time: None,
            observed_speed_without_dwell: None,
            observed_running_time_with_dwell: None,
            observed_speed_with_dwell: None,
            boardings: None,
            on_time_performance: None,
            passenger_load: None,
            crowding: None,
        }
    }
}

/// the three tables C6 produces, handed as a unit to C7.
pub struct MetricTables {
    pub stop_metrics: Vec<SegmentMetricRow>,
    pub tpbp_metrics: Vec<SegmentMetricRow>,
    pub route_metrics: Vec<RouteMetricRow>,
}
