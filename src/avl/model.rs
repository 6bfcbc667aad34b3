//! canonical AVL stop-event schema (§3 StopEvent (AVL)), independent of the
//! source CSV column names any particular agency loader emits.

use std::sync::Arc;

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct AvlStopEvent {
    pub svc_date: NaiveDate,
    pub trip_id: Arc<str>,
    pub route_id: Arc<str>,
    pub stop_id: Arc<str>,
    pub stop_sequence: u16,
    pub stop_time: i64,
    pub dwell_time: f64,
    pub passenger_load: i64,
    pub passenger_on: i64,
    pub passenger_off: i64,
    pub seat_capacity: i64,
    pub next_stop: Option<Arc<str>>,
    pub next_stop_arrival_time: Option<i64>,
}

impl AvlStopEvent {
    pub fn stop_pair(&self) -> Option<(Arc<str>, Arc<str>)> {
        self.next_stop.clone().map(|next| (self.stop_id.clone(), next))
    }
}
