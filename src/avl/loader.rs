//! C4: AVLLoader. reads a per-agency AVL export (one row per observed stop
//! visit) and normalizes it into the canonical [`AvlStopEvent`] schema.
//! grounded on `bambam_gtfs::schedule::app::operation::manifest_into_rows`'s
//! `csv::ReaderBuilder` + `into_deserialize` idiom.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Deserializer};

use crate::avl::model::AvlStopEvent;
use crate::error::RoveError;

/// the raw CSV row shape shared across CTA/MBTA/WMATA exports: the only
/// agency-specific quirk the contract in §4.3 calls out is the `route`
/// column, which every known agency export names differently from our
/// canonical `route_id`. `svc_date` and `stop_sequence` are read as
/// optional so a malformed value in either column degrades to a per-row
/// skip (see `load`) rather than failing `csv`/`serde` deserialization for
/// the whole file.
#[derive(Debug, Deserialize)]
struct RawAvlRow {
    #[serde(deserialize_with = "deserialize_opt_date")]
    svc_date: Option<NaiveDate>,
    trip_id: String,
    route: String,
    stop_id: String,
    #[serde(deserialize_with = "deserialize_opt_u16")]
    stop_sequence: Option<u16>,
    stop_time: i64,
    dwell_time: f64,
    passenger_load: i64,
    passenger_on: i64,
    passenger_off: i64,
    seat_capacity: i64,
}

fn deserialize_opt_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().parse().ok())
}

fn deserialize_opt_u16<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().parse().ok())
}

/// reads `path`, normalizes `route` -> `route_id`, drops rows missing any of
/// (svc_date, trip_id, stop_id, stop_sequence), sorts each
/// (svc_date, trip_id) group by stop_sequence, and fills `next_stop` /
/// `next_stop_arrival_time` via a within-group shift, dropping each group's
/// trailing record — the AVL analogue of `gtfs::with_next_stop`.
pub fn load(path: &str) -> Result<Vec<AvlStopEvent>, RoveError> {
    info!("reading AVL records from {path}");
    let mut reader = csv::ReaderBuilder::new().from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<RawAvlRow>() {
        let row = row?;
        let (Some(svc_date), Some(stop_sequence)) = (row.svc_date, row.stop_sequence) else {
            warn!("skipping AVL row with missing/malformed svc_date or stop_sequence");
            continue;
        };
        if row.trip_id.is_empty() || row.stop_id.is_empty() {
            continue;
        }
        rows.push(AvlStopEvent {
            svc_date,
            trip_id: Arc::from(row.trip_id.as_str()),
            route_id: Arc::from(row.route.as_str()),
            stop_id: Arc::from(row.stop_id.as_str()),
            stop_sequence,
            stop_time: row.stop_time,
            dwell_time: row.dwell_time,
            passenger_load: row.passenger_load,
            passenger_on: row.passenger_on,
            passenger_off: row.passenger_off,
            seat_capacity: row.seat_capacity,
            next_stop: None,
            next_stop_arrival_time: None,
        });
    }

    rows.sort_by(|a, b| {
        (a.svc_date, a.trip_id.as_ref(), a.stop_sequence)
            .cmp(&(b.svc_date, b.trip_id.as_ref(), b.stop_sequence))
    });

    Ok(with_next_stop(rows))
}

fn with_next_stop(rows: Vec<AvlStopEvent>) -> Vec<AvlStopEvent> {
    let mut bounds: HashMap<(NaiveDate, Arc<str>), (usize, usize)> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        let key = (row.svc_date, row.trip_id.clone());
        let entry = bounds.entry(key).or_insert((i, i + 1));
        entry.1 = i + 1;
    }
    let mut group_bounds: Vec<(usize, usize)> = bounds.into_values().collect();
    group_bounds.sort();

    let mut out = Vec::with_capacity(rows.len());
    for (start, end) in group_bounds {
        for i in start..end.saturating_sub(1) {
            let mut row = rows[i].clone();
            row.next_stop = Some(rows[i + 1].stop_id.clone());
            row.next_stop_arrival_time = Some(rows[i + 1].stop_time);
            out.push(row);
        }
    }
    out.sort_by(|a, b| {
        (a.svc_date, a.trip_id.as_ref(), a.stop_sequence)
            .cmp(&(b.svc_date, b.trip_id.as_ref(), b.stop_sequence))
    });
    out
}
