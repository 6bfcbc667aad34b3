//! C6: MetricCalculator. the ~12 trip-level metric definitions of §4.5,
//! computed over key-sorted iterator passes instead of a dataframe groupby
//! — the project's chosen Rust analogue of the original's pandas
//! `groupby().diff()/.transform()/.shift()` idioms. grounded on
//! `original_source/backend/metrics/metric_calculation.py`.

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use log::info;

use crate::avl::AvlStopEvent;
use crate::config::OtpBounds;
use crate::error::RoveError;
use crate::gtfs::{with_next_stop, GtfsStopEvent};
use crate::metrics::groupby::{group_indices, mean, round_to};
use crate::metrics::tables::{MetricTables, RouteMetricRow, SegmentMetricRow};
use crate::shapes::ShapeDistanceRow;

const KILOMETER_TO_FT: f64 = 3280.84;
const FT_PER_MIN_TO_MPH: f64 = 0.0113636;
const FEET_TO_MILES: f64 = 0.000189394;
const MAX_SPEED_MPH: f64 = 65.0;
const MEAN_SPEED_MPH: f64 = 30.0;

/// computes all three metric tables for one run. `avl_records` is `None`
/// when the configured data_option doesn't request `AVL`; every AVL-derived
/// column is left `None` in that case, per §4.5's "absence of AVL... skips
/// the metric and leaves the column absent."
pub fn calculate(
    base_records: &[GtfsStopEvent],
    shape_distances: &[ShapeDistanceRow],
    avl_records: Option<&[AvlStopEvent]>,
    otp_bounds: &OtpBounds,
) -> Result<MetricTables, RoveError> {
    otp_bounds.validate()?;
    info!("calculating metrics");

    let mut stop_metrics = build_stop_rows(base_records);
    let (mut tpbp_metrics, tpbp_end_seq) = build_tpbp_rows(base_records);
    let mut route_metrics = build_route_rows(base_records);

    assign_stop_spacing(&mut stop_metrics, &mut tpbp_metrics, &mut route_metrics, &tpbp_end_seq, shape_distances);
    assign_scheduled_headway(&mut stop_metrics);
    assign_scheduled_running_time(&mut stop_metrics, &mut tpbp_metrics, &mut route_metrics, &tpbp_end_seq);
    assign_scheduled_speed(&mut stop_metrics);
    assign_scheduled_speed(&mut tpbp_metrics);
    assign_route_scheduled_speed(&mut route_metrics);

    if let Some(avl) = avl_records {
        assign_observed_headway(&mut stop_metrics, avl);
        assign_observed_running_time(&mut stop_metrics, &mut tpbp_metrics, &mut route_metrics, &tpbp_end_seq, avl);
        assign_observed_speed(&mut stop_metrics, ObservedSpeedKind::WithoutDwell);
        assign_observed_speed(&mut tpbp_metrics, ObservedSpeedKind::WithoutDwell);
        assign_route_observed_speed(&mut route_metrics, ObservedSpeedKind::WithoutDwell);
        assign_observed_running_time_with_dwell(&mut stop_metrics, &mut tpbp_metrics, &mut route_metrics, &tpbp_end_seq, avl);
        assign_observed_speed(&mut stop_metrics, ObservedSpeedKind::WithDwell);
        assign_observed_speed(&mut tpbp_metrics, ObservedSpeedKind::WithDwell);
        assign_route_observed_speed(&mut route_metrics, ObservedSpeedKind::WithDwell);
        assign_boardings(&mut stop_metrics, &mut tpbp_metrics, &mut route_metrics, &tpbp_end_seq, avl);
        assign_on_time_performance(&mut stop_metrics, &mut route_metrics, avl, otp_bounds);
        assign_passenger_load(&mut stop_metrics, &mut route_metrics, avl);
        assign_crowding(&mut stop_metrics, &mut route_metrics, avl);
        assign_congestion_delay(&mut stop_metrics);
    }

    Ok(MetricTables { stop_metrics, tpbp_metrics, route_metrics })
}

fn build_stop_rows(base_records: &[GtfsStopEvent]) -> Vec<SegmentMetricRow> {
    with_next_stop(base_records.to_vec())
        .into_iter()
        .map(|r| {
            let mut row = SegmentMetricRow::blank(
                r.pattern.clone().unwrap_or_else(|| Arc::from("")),
                r.route_id.clone(),
                r.direction_id,
                r.trip_id.clone(),
                (r.stop_id.clone(), r.next_stop.clone().unwrap()),
                r.stop_sequence,
                r.arrival_time,
                r.departure_time,
                r.trip_start_time,
                r.trip_end_time,
            );
            if let Some(next_arrival) = r.next_stop_arrival_time {
                row.scheduled_running_time = Some(round_to((next_arrival - r.departure_time) as f64 / 60.0, 2));
            }
            row
        })
        .collect()
}

/// tpbp rows are built directly (not via [`with_next_stop`]) because the
/// shift here is over the tp_bp==1 subsequence of a trip, not its literal
/// next stop — two different "next" relations the original source
/// expresses via two different calls to the same helper on two different
/// input frames.
fn build_tpbp_rows(base_records: &[GtfsStopEvent]) -> (Vec<SegmentMetricRow>, Vec<u16>) {
    let filtered: Vec<&GtfsStopEvent> = base_records.iter().filter(|r| r.tp_bp == 1).collect();
    let mut rows = Vec::new();
    let mut end_sequences = Vec::new();
    let mut i = 0;
    while i < filtered.len() {
        let mut j = i;
        while j + 1 < filtered.len() && filtered[j + 1].trip_id == filtered[i].trip_id {
            j += 1;
        }
        for k in i..j {
            let here = filtered[k];
            let next = filtered[k + 1];
            rows.push(SegmentMetricRow::blank(
                here.pattern.clone().unwrap_or_else(|| Arc::from("")),
                here.route_id.clone(),
                here.direction_id,
                here.trip_id.clone(),
                (here.stop_id.clone(), next.stop_id.clone()),
                here.stop_sequence,
                here.arrival_time,
                here.departure_time,
                here.trip_start_time,
                here.trip_end_time,
            ));
            end_sequences.push(next.stop_sequence);
        }
        i = j + 1;
    }
    (rows, end_sequences)
}

fn build_route_rows(base_records: &[GtfsStopEvent]) -> Vec<RouteMetricRow> {
    let mut seen = HashMap::new();
    let mut rows = Vec::new();
    for r in base_records {
        seen.entry(r.trip_id.clone()).or_insert_with(|| {
            rows.push(RouteMetricRow::blank(
                r.pattern.clone().unwrap_or_else(|| Arc::from("")),
                r.route_id.clone(),
                r.direction_id,
                r.trip_id.clone(),
                r.trip_start_time,
                r.trip_end_time,
            ));
            rows.len() - 1
        });
    }
    rows
}

/// sums a stop-grain field over the stop_sequence half-open range
/// `[start, end)` within the same trip, the Rust equivalent of the
/// original's cumulative-sum-then-diff-by-tpbp-group idiom.
fn sum_over_tpbp_range(
    stop_metrics: &[SegmentMetricRow],
    by_trip: &HashMap<Arc<str>, Vec<usize>>,
    tpbp_rows: &mut [SegmentMetricRow],
    tpbp_end_seq: &[u16],
    extract: impl Fn(&SegmentMetricRow) -> Option<f64>,
    assign: impl Fn(&mut SegmentMetricRow, Option<f64>),
) {
    for (row, &end_seq) in tpbp_rows.iter_mut().zip(tpbp_end_seq.iter()) {
        let start_seq = row.stop_sequence;
        let sum: f64 = by_trip
            .get(&row.trip_id)
            .map(|idxs| {
                idxs.iter()
                    .filter_map(|&i| {
                        let r = &stop_metrics[i];
                        (r.stop_sequence >= start_seq && r.stop_sequence < end_seq)
                            .then(|| extract(r))
                            .flatten()
                    })
                    .sum()
            })
            .unwrap_or(0.0);
        assign(row, Some(round_to(sum, 2)));
    }
}

fn assign_stop_spacing(
    stop_metrics: &mut [SegmentMetricRow],
    tpbp_metrics: &mut [SegmentMetricRow],
    route_metrics: &mut [RouteMetricRow],
    tpbp_end_seq: &[u16],
    shape_distances: &[ShapeDistanceRow],
) {
    let mut distance_km: HashMap<(Arc<str>, (Arc<str>, Arc<str>)), f64> = HashMap::new();
    for row in shape_distances {
        distance_km.entry((row.pattern.clone(), row.stop_pair.clone())).or_insert(row.distance_km);
    }

    for row in stop_metrics.iter_mut() {
        let key = (row.pattern.clone(), row.stop_pair.clone());
        row.stop_spacing = distance_km.get(&key).map(|km| round_to(km * KILOMETER_TO_FT, 2));
    }

    let by_trip = group_indices(stop_metrics, |r| r.trip_id.clone());
    for route_row in route_metrics.iter_mut() {
        if let Some(idxs) = by_trip.get(&route_row.trip_id) {
            let sum: f64 = idxs.iter().filter_map(|&i| stop_metrics[i].stop_spacing).sum();
            route_row.stop_spacing = Some(round_to(sum, 2));
        }
    }

    sum_over_tpbp_range(
        stop_metrics,
        &by_trip,
        tpbp_metrics,
        tpbp_end_seq,
        |r| r.stop_spacing,
        |r, v| r.stop_spacing = v,
    );
}

fn assign_scheduled_headway(stop_metrics: &mut [SegmentMetricRow]) {
    let groups = group_indices(stop_metrics, |r| {
        (r.route_id.clone(), r.direction_id, r.pattern.clone(), r.stop_pair.clone())
    });
    for (_, mut idxs) in groups {
        idxs.sort_by_key(|&i| stop_metrics[i].arrival_time);
        if let Some(&first) = idxs.first() {
            stop_metrics[first].scheduled_headway = None;
        }
        for (&prev, &cur) in idxs.iter().tuple_windows() {
            let diff = stop_metrics[cur].arrival_time - stop_metrics[prev].arrival_time;
            stop_metrics[cur].scheduled_headway = Some(diff as f64 / 60.0);
        }
    }
}

fn assign_scheduled_running_time(
    stop_metrics: &mut [SegmentMetricRow],
    tpbp_metrics: &mut [SegmentMetricRow],
    route_metrics: &mut [RouteMetricRow],
    tpbp_end_seq: &[u16],
) {
    // per-row scheduled_running_time is already set at row construction
    // time (from `with_next_stop`'s resolved next arrival); this pass only
    // reduces it up to the route and tpbp grains.
    let by_trip = group_indices(stop_metrics, |r| r.trip_id.clone());
    for route_row in route_metrics.iter_mut() {
        if let Some(idxs) = by_trip.get(&route_row.trip_id) {
            let sum: f64 = idxs.iter().filter_map(|&i| stop_metrics[i].scheduled_running_time).sum();
            route_row.scheduled_running_time = Some(round_to(sum, 2));
        }
    }

    sum_over_tpbp_range(
        stop_metrics,
        &by_trip,
        tpbp_metrics,
        tpbp_end_seq,
        |r| r.scheduled_running_time,
        |r, v| r.scheduled_running_time = v,
    );
}

fn assign_scheduled_speed(rows: &mut [SegmentMetricRow]) {
    for row in rows.iter_mut() {
        row.scheduled_speed = speed_from(row.stop_spacing, row.scheduled_running_time);
    }
}

fn assign_route_scheduled_speed(rows: &mut [RouteMetricRow]) {
    for row in rows.iter_mut() {
        row.scheduled_speed = speed_from(row.stop_spacing, row.scheduled_running_time);
    }
}

fn speed_from(spacing_ft: Option<f64>, running_time_min: Option<f64>) -> Option<f64> {
    match (spacing_ft, running_time_min) {
        (Some(spacing), Some(rt)) if rt != 0.0 => Some(round_to(spacing / rt * FT_PER_MIN_TO_MPH, 2)),
        _ => None,
    }
}

#[derive(Clone, Copy)]
enum ObservedSpeedKind {
    WithoutDwell,
    WithDwell,
}

fn assign_observed_speed(rows: &mut [SegmentMetricRow], kind: ObservedSpeedKind) {
    for row in rows.iter_mut() {
        let running_time = match kind {
            ObservedSpeedKind::WithoutDwell => row.observed_running_time,
            ObservedSpeedKind::WithDwell => row.observed_running_time_with_dwell,
        };
        let speed = speed_from(row.stop_spacing, running_time);
        match kind {
            ObservedSpeedKind::WithoutDwell => row.observed_speed_without_dwell = speed,
            ObservedSpeedKind::WithDwell => row.observed_speed_with_dwell = speed,
        }
    }
}

fn assign_route_observed_speed(rows: &mut [RouteMetricRow], kind: ObservedSpeedKind) {
    for row in rows.iter_mut() {
        let running_time = match kind {
            ObservedSpeedKind::WithoutDwell => row.observed_running_time,
            ObservedSpeedKind::WithDwell => row.observed_running_time_with_dwell,
        };
        let speed = speed_from(row.stop_spacing, running_time);
        match kind {
            ObservedSpeedKind::WithoutDwell => row.observed_speed_without_dwell = speed,
            ObservedSpeedKind::WithDwell => row.observed_speed_with_dwell = speed,
        }
    }
}

fn assign_observed_headway(stop_metrics: &mut [SegmentMetricRow], avl: &[AvlStopEvent]) {
    let groups = group_indices(avl, |r| (r.svc_date, r.route_id.clone(), r.stop_pair()));
    let mut per_date_headway: HashMap<(Arc<str>, (Arc<str>, Arc<str>)), Vec<f64>> = HashMap::new();
    for (_, mut idxs) in groups {
        idxs.sort_by_key(|&i| avl[i].stop_time);
        for (&prev, &cur) in idxs.iter().tuple_windows() {
            let diff = (avl[cur].stop_time - avl[prev].stop_time) as f64 / 60.0;
            if let Some(pair) = avl[cur].stop_pair() {
                per_date_headway.entry((avl[cur].route_id.clone(), pair)).or_default().push(diff);
            }
        }
    }
    let mut observed_headway: HashMap<(Arc<str>, (Arc<str>, Arc<str>)), f64> = HashMap::new();
    for (key, values) in per_date_headway {
        if let Some(m) = mean(values.into_iter()) {
            observed_headway.insert(key, round_to(m, 2));
        }
    }
    for row in stop_metrics.iter_mut() {
        row.observed_headway = observed_headway.get(&(row.route_id.clone(), row.stop_pair.clone())).copied();
    }
}

fn assign_observed_running_time(
    stop_metrics: &mut [SegmentMetricRow],
    tpbp_metrics: &mut [SegmentMetricRow],
    route_metrics: &mut [RouteMetricRow],
    tpbp_end_seq: &[u16],
    avl: &[AvlStopEvent],
) {
    let mut per_row = HashMap::new();
    for row in avl {
        if let (Some(pair), Some(next_arrival)) = (row.stop_pair(), row.next_stop_arrival_time) {
            let value = ((next_arrival - row.stop_time) as f64 - row.dwell_time).max(0.0) / 60.0;
            per_row
                .entry((row.route_id.clone(), row.trip_id.clone(), pair))
                .or_insert_with(Vec::new)
                .push((row.svc_date, round_to(value, 2)));
        }
    }
    assign_avl_stop_route(
        stop_metrics,
        route_metrics,
        &per_row,
        |r, v| r.observed_running_time = v,
        |r, v| r.observed_running_time = v,
        AggKind::MeanThenSum,
        2,
        2,
    );

    let by_trip = group_indices(stop_metrics, |r| r.trip_id.clone());
    sum_over_tpbp_range(
        stop_metrics,
        &by_trip,
        tpbp_metrics,
        tpbp_end_seq,
        |r| r.observed_running_time,
        |r, v| r.observed_running_time = v,
    );
}

fn assign_observed_running_time_with_dwell(
    stop_metrics: &mut [SegmentMetricRow],
    tpbp_metrics: &mut [SegmentMetricRow],
    route_metrics: &mut [RouteMetricRow],
    tpbp_end_seq: &[u16],
    avl: &[AvlStopEvent],
) {
    let mut per_row = HashMap::new();
    for row in avl {
        if let (Some(pair), Some(next_arrival)) = (row.stop_pair(), row.next_stop_arrival_time) {
            let value = (next_arrival - row.stop_time).max(0) as f64 / 60.0;
            per_row
                .entry((row.route_id.clone(), row.trip_id.clone(), pair))
                .or_insert_with(Vec::new)
                .push((row.svc_date, round_to(value, 2)));
        }
    }
    assign_avl_stop_route(
        stop_metrics,
        route_metrics,
        &per_row,
        |r, v| r.observed_running_time_with_dwell = v,
        |r, v| r.observed_running_time_with_dwell = v,
        AggKind::MeanThenSum,
        2,
        2,
    );

    let by_trip = group_indices(stop_metrics, |r| r.trip_id.clone());
    sum_over_tpbp_range(
        stop_metrics,
        &by_trip,
        tpbp_metrics,
        tpbp_end_seq,
        |r| r.observed_running_time_with_dwell,
        |r, v| r.observed_running_time_with_dwell = v,
    );
}

fn assign_boardings(
    stop_metrics: &mut [SegmentMetricRow],
    tpbp_metrics: &mut [SegmentMetricRow],
    route_metrics: &mut [RouteMetricRow],
    tpbp_end_seq: &[u16],
    avl: &[AvlStopEvent],
) {
    let mut per_row = HashMap::new();
    for row in avl {
        if let Some(pair) = row.stop_pair() {
            per_row
                .entry((row.route_id.clone(), row.trip_id.clone(), pair))
                .or_insert_with(Vec::new)
                .push((row.svc_date, row.passenger_on as f64));
        }
    }
    assign_avl_stop_route(
        stop_metrics,
        route_metrics,
        &per_row,
        |r, v| r.boardings = v,
        |r, v| r.boardings = v,
        AggKind::MeanThenSum,
        0,
        2,
    );

    let by_trip = group_indices(stop_metrics, |r| r.trip_id.clone());
    sum_over_tpbp_range(
        stop_metrics,
        &by_trip,
        tpbp_metrics,
        tpbp_end_seq,
        |r| r.boardings,
        |r, v| r.boardings = v,
    );
}

fn assign_on_time_performance(
    stop_metrics: &mut [SegmentMetricRow],
    route_metrics: &mut [RouteMetricRow],
    avl: &[AvlStopEvent],
    otp_bounds: &OtpBounds,
) {
    let mut scheduled_arrival: HashMap<(Arc<str>, Arc<str>, (Arc<str>, Arc<str>)), i64> = HashMap::new();
    for row in stop_metrics.iter() {
        scheduled_arrival.insert(
            (row.route_id.clone(), row.trip_id.clone(), row.stop_pair.clone()),
            row.arrival_time,
        );
    }

    let mut per_stop_otp: HashMap<(Arc<str>, Arc<str>, (Arc<str>, Arc<str>)), Vec<f64>> = HashMap::new();
    let mut per_date_trip: HashMap<(Arc<str>, Arc<str>, chrono::NaiveDate), (i64, i64)> = HashMap::new();
    for row in avl {
        let Some(pair) = row.stop_pair() else { continue };
        let key = (row.route_id.clone(), row.trip_id.clone(), pair);
        let Some(&scheduled) = scheduled_arrival.get(&key) else { continue };
        let otp = (row.stop_time - scheduled) as f64;
        per_stop_otp.entry(key).or_default().push(otp);

        let is_on_time = otp > otp_bounds.no_earlier_than * 60.0 && otp < otp_bounds.no_later_than * 60.0;
        let entry = per_date_trip
            .entry((row.route_id.clone(), row.trip_id.clone(), row.svc_date))
            .or_insert((0, 0));
        entry.0 += is_on_time as i64;
        entry.1 += 1;
    }

    let mut stop_otp: HashMap<(Arc<str>, Arc<str>, (Arc<str>, Arc<str>)), f64> = HashMap::new();
    for (key, values) in per_stop_otp {
        if let Some(m) = mean(values.into_iter()) {
            stop_otp.insert(key, m.round());
        }
    }
    for row in stop_metrics.iter_mut() {
        row.on_time_performance = stop_otp
            .get(&(row.route_id.clone(), row.trip_id.clone(), row.stop_pair.clone()))
            .copied();
    }

    let mut per_trip_pct: HashMap<(Arc<str>, Arc<str>), Vec<f64>> = HashMap::new();
    for ((route_id, trip_id, _date), (on_time, total)) in per_date_trip {
        if total > 0 {
            per_trip_pct
                .entry((route_id, trip_id))
                .or_default()
                .push(on_time as f64 / total as f64 * 100.0);
        }
    }
    let mut route_otp: HashMap<(Arc<str>, Arc<str>), f64> = HashMap::new();
    for (key, values) in per_trip_pct {
        if let Some(m) = mean(values.into_iter()) {
            route_otp.insert(key, m.round());
        }
    }
    for row in route_metrics.iter_mut() {
        row.on_time_performance = route_otp.get(&(row.route_id.clone(), row.trip_id.clone())).copied();
    }
}

fn assign_passenger_load(
    stop_metrics: &mut [SegmentMetricRow],
    route_metrics: &mut [RouteMetricRow],
    avl: &[AvlStopEvent],
) {
    let mut per_row = HashMap::new();
    for row in avl {
        if let Some(pair) = row.stop_pair() {
            per_row
                .entry((row.route_id.clone(), row.trip_id.clone(), pair))
                .or_insert_with(Vec::new)
                .push((row.svc_date, row.passenger_load as f64));
        }
    }
    assign_avl_stop_route(
        stop_metrics,
        route_metrics,
        &per_row,
        |r, v| r.passenger_load = v,
        |r, v| r.passenger_load = v,
        AggKind::MeanThenMax,
        0,
        0,
    );
}

fn assign_crowding(stop_metrics: &mut [SegmentMetricRow], route_metrics: &mut [RouteMetricRow], avl: &[AvlStopEvent]) {
    let mut per_row = HashMap::new();
    for row in avl {
        if row.seat_capacity == 0 {
            continue;
        }
        if let Some(pair) = row.stop_pair() {
            let crowding = row.passenger_load as f64 / row.seat_capacity as f64 * 100.0;
            per_row
                .entry((row.route_id.clone(), row.trip_id.clone(), pair))
                .or_insert_with(Vec::new)
                .push((row.svc_date, crowding));
        }
    }
    assign_avl_stop_route(
        stop_metrics,
        route_metrics,
        &per_row,
        |r, v| r.crowding = v,
        |r, v| r.crowding = v,
        AggKind::MeanThenMax,
        0,
        0,
    );
}

fn assign_congestion_delay(stop_metrics: &mut [SegmentMetricRow]) {
    let mut free_flow_by_pair: HashMap<(Arc<str>, Arc<str>), f64> = HashMap::new();
    for row in stop_metrics.iter() {
        if let Some(speed) = row.observed_speed_without_dwell {
            let entry = free_flow_by_pair.entry(row.stop_pair.clone()).or_insert(f64::MIN);
            *entry = entry.max(speed);
        }
    }
    for row in stop_metrics.iter_mut() {
        let free_flow_speed = free_flow_by_pair
            .get(&row.stop_pair)
            .map(|&v| v.min(MAX_SPEED_MPH))
            .unwrap_or(MEAN_SPEED_MPH);
        let (Some(spacing), Some(observed_speed)) = (row.stop_spacing, row.observed_speed_without_dwell) else {
            continue;
        };
        if observed_speed == 0.0 {
            continue;
        }
        let free_flow_travel_time = spacing / (free_flow_speed / FT_PER_MIN_TO_MPH);
        let observed_travel_time = spacing / (observed_speed / FT_PER_MIN_TO_MPH);
        if spacing == 0.0 {
            continue;
        }
        let vehicle_congestion_delay = (observed_travel_time - free_flow_travel_time) / (spacing * FEET_TO_MILES);
        row.vehicle_congestion_delay = Some(vehicle_congestion_delay);
        row.passenger_congestion_delay = row.passenger_load.map(|load| vehicle_congestion_delay * load);
    }
}

#[derive(Clone, Copy)]
enum AggKind {
    /// stop grain: mean across svc_date. route grain: sum per (svc_date,
    /// route, trip), then mean across svc_date.
    MeanThenSum,
    /// stop grain: mean across svc_date. route grain: max per (svc_date,
    /// route, trip), then mean across svc_date.
    MeanThenMax,
}

/// joins a (route_id, trip_id, stop_pair) -> `[(svc_date, value)]` map onto
/// the stop table (as a per-svc_date mean, rounded to `stop_decimals`) and
/// onto the route table (as a per-trip aggregate of the per-date route
/// total, per `kind`, rounded to `route_decimals`) — each metric rounds to
/// its own precision, not a shared one.
fn assign_avl_stop_route(
    stop_metrics: &mut [SegmentMetricRow],
    route_metrics: &mut [RouteMetricRow],
    per_row: &HashMap<(Arc<str>, Arc<str>, (Arc<str>, Arc<str>)), Vec<(chrono::NaiveDate, f64)>>,
    assign_stop: impl Fn(&mut SegmentMetricRow, Option<f64>),
    assign_route: impl Fn(&mut RouteMetricRow, Option<f64>),
    kind: AggKind,
    stop_decimals: i32,
    route_decimals: i32,
) {
    let mut stop_value: HashMap<(Arc<str>, Arc<str>, (Arc<str>, Arc<str>)), f64> = HashMap::new();
    let mut route_daily: HashMap<(Arc<str>, Arc<str>, chrono::NaiveDate), Vec<f64>> = HashMap::new();
    for (key, values) in per_row {
        let (route_id, trip_id, _pair) = key.clone();
        if let Some(m) = mean(values.iter().map(|(_, v)| *v)) {
            stop_value.insert(key.clone(), round_to(m, stop_decimals));
        }
        for (date, value) in values {
            route_daily.entry((route_id.clone(), trip_id.clone(), *date)).or_default().push(*value);
        }
    }
    for row in stop_metrics.iter_mut() {
        let key = (row.route_id.clone(), row.trip_id.clone(), row.stop_pair.clone());
        assign_stop(row, stop_value.get(&key).copied());
    }

    let mut per_date_total: HashMap<(Arc<str>, Arc<str>), Vec<f64>> = HashMap::new();
    for ((route_id, trip_id, _date), values) in route_daily {
        let total = match kind {
            AggKind::MeanThenSum => values.iter().sum::<f64>(),
            AggKind::MeanThenMax => values.iter().cloned().fold(f64::MIN, f64::max),
        };
        per_date_total.entry((route_id, trip_id)).or_default().push(total);
    }
    let mut route_value: HashMap<(Arc<str>, Arc<str>), f64> = HashMap::new();
    for (key, totals) in per_date_total {
        if let Some(m) = mean(totals.into_iter()) {
            route_value.insert(key, round_to(m, route_decimals));
        }
    }
    for row in route_metrics.iter_mut() {
        assign_route(row, route_value.get(&(row.route_id.clone(), row.trip_id.clone())).copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(trip: &str, route: &str, seq: u16, stop: &str, arr: i64, tp_bp: u8, pattern: &str) -> GtfsStopEvent {
        GtfsStopEvent {
            trip_id: Arc::from(trip),
            route_id: Arc::from(route),
            direction_id: 0,
            stop_sequence: seq,
            stop_id: Arc::from(stop),
            arrival_time: arr,
            departure_time: arr,
            trip_start_time: arr,
            trip_end_time: arr,
            timepoint: 1,
            branchpoint: 0,
            tp_bp,
            pattern: Some(Arc::from(pattern)),
            next_stop: None,
            next_stop_arrival_time: None,
        }
    }

    #[test]
    fn test_stop_spacing_and_speed_from_shape_distances() {
        let base_records = vec![
            record("T1", "R1", 1, "A", 0, 1, "R1-0-1"),
            record("T1", "R1", 2, "B", 300, 1, "R1-0-1"),
        ];
        let shape_distances = vec![ShapeDistanceRow {
            pattern: Arc::from("R1-0-1"),
            stop_pair: (Arc::from("A"), Arc::from("B")),
            distance_km: 1.0,
        }];
        let otp = OtpBounds::default();
        let tables = calculate(&base_records, &shape_distances, None, &otp).unwrap();
        assert_eq!(tables.stop_metrics.len(), 1);
        let row = &tables.stop_metrics[0];
        assert_eq!(row.stop_spacing, Some(round_to(1.0 * KILOMETER_TO_FT, 2)));
        assert_eq!(row.scheduled_running_time, Some(5.0));
        assert!(row.scheduled_speed.is_some());
    }

    #[test]
    fn test_route_metrics_one_row_per_trip() {
        let base_records = vec![
            record("T1", "R1", 1, "A", 0, 1, "R1-0-1"),
            record("T1", "R1", 2, "B", 300, 0, "R1-0-1"),
            record("T1", "R1", 3, "C", 600, 1, "R1-0-1"),
        ];
        let otp = OtpBounds::default();
        let tables = calculate(&base_records, &[], None, &otp).unwrap();
        assert_eq!(tables.route_metrics.len(), 1);
        assert_eq!(tables.tpbp_metrics.len(), 1);
    }

    #[test]
    fn test_avl_metrics_absent_without_avl_records() {
        let base_records = vec![
            record("T1", "R1", 1, "A", 0, 1, "R1-0-1"),
            record("T1", "R1", 2, "B", 300, 1, "R1-0-1"),
        ];
        let otp = OtpBounds::default();
        let tables = calculate(&base_records, &[], None, &otp).unwrap();
        assert!(tables.stop_metrics[0].observed_running_time.is_none());
    }
}
