//! C7: MetricAggregator. projects the per-trip metric tables onto the five
//! output grains (segment, corridor, route, tpbp-segment, tpbp-corridor)
//! within a time window, reducing each metric column by percentile.
//! grounded on `original_source/backend/metrics/metric_aggregation.py`'s
//! groupby-then-quantile passes, generalized here over a single reduction
//! helper shared by all five grains instead of one function per grain.

use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use rayon::prelude::*;

use crate::aggregation::percentile::percentile;
use crate::config::TimePeriod;
use crate::metrics::{MetricTables, RouteMetricRow, SegmentMetricRow};

pub type StopPair = (Arc<str>, Arc<str>);

/// one reduced row at a grain: the grain key plus its percentile-reduced
/// metric columns (a column absent from every contributing row is simply
/// absent from the map, not a zero).
#[derive(Debug, Clone)]
pub struct AggregatedRow<K> {
    pub key: K,
    pub metrics: HashMap<String, f64>,
}

/// the five grains produced for one (time window, percentile) pair.
#[derive(Debug, Clone, Default)]
pub struct WindowAggregate {
    pub segment: Vec<AggregatedRow<(Arc<str>, StopPair)>>,
    pub corridor: Vec<AggregatedRow<StopPair>>,
    pub route: Vec<AggregatedRow<(Arc<str>, u8)>>,
    pub tpbp_segment: Vec<AggregatedRow<(Arc<str>, StopPair)>>,
    pub tpbp_corridor: Vec<AggregatedRow<StopPair>>,
}

/// the result of a full run: named time periods as `(period_name,
/// method_name, aggregate)` triples, and, when requested, the
/// 10-minute-interval sweep as `(interval_start_seconds, method_name,
/// aggregate)` triples. the output writer is what turns these into the
/// `{period}-{grain}-{method}` / `(interval, method)` key strings of the
/// serialized artifact.
#[derive(Debug, Clone, Default)]
pub struct AggregationOutput {
    pub named_periods: Vec<(String, String, WindowAggregate)>,
    pub intervals: Vec<(i64, String, WindowAggregate)>,
}

fn segment_metric_fields(row: &SegmentMetricRow) -> [(&'static str, Option<f64>); 15] {
    [
        ("stop_spacing", row.stop_spacing),
        ("scheduled_headway", row.scheduled_headway),
        ("scheduled_running_time", row.scheduled_running_time),
        ("scheduled_speed", row.scheduled_speed),
        ("observed_headway", row.observed_headway),
        ("observed_running_time", row.observed_running_time),
        ("observed_speed_without_dwell", row.observed_speed_without_dwell),
        ("observed_running_time_with_dwell", row.observed_running_time_with_dwell),
        ("observed_speed_with_dwell", row.observed_speed_with_dwell),
        ("boardings", row.boardings),
        ("on_time_performance", row.on_time_performance),
        ("passenger_load", row.passenger_load),
        ("crowding", row.crowding),
        ("vehicle_congestion_delay", row.vehicle_congestion_delay),
        ("passenger_congestion_delay", row.passenger_congestion_delay),
    ]
}

fn route_metric_fields(row: &RouteMetricRow) -> [(&'static str, Option<f64>); 11] {
    [
        ("stop_spacing", row.stop_spacing),
        ("scheduled_running_time", row.scheduled_running_time),
        ("scheduled_speed", row.scheduled_speed),
        ("observed_running_time", row.observed_running_time),
        ("observed_speed_without_dwell", row.observed_speed_without_dwell),
        ("observed_running_time_with_dwell", row.observed_running_time_with_dwell),
        ("observed_speed_with_dwell", row.observed_speed_with_dwell),
        ("boardings", row.boardings),
        ("on_time_performance", row.on_time_performance),
        ("passenger_load", row.passenger_load),
        ("crowding", row.crowding),
    ]
}

/// groups `(key, fields)` pairs by key and reduces each present metric
/// column by `p`. the one reduction routine every grain calls.
fn reduce_by_key<K, const N: usize>(rows: &[(K, [(&'static str, Option<f64>); N])], p: f64) -> Vec<AggregatedRow<K>>
where
    K: Eq + std::hash::Hash + Clone,
{
    let mut groups: HashMap<K, HashMap<&'static str, Vec<f64>>> = HashMap::new();
    for (key, fields) in rows {
        let entry = groups.entry(key.clone()).or_default();
        for (name, value) in fields {
            if let Some(v) = value {
                entry.entry(name).or_default().push(*v);
            }
        }
    }
    groups
        .into_iter()
        .map(|(key, mut columns)| {
            let metrics = columns
                .iter_mut()
                .filter_map(|(name, values)| percentile(values, p).map(|v| (name.to_string(), v)))
                .collect();
            AggregatedRow { key, metrics }
        })
        .collect()
}

/// reduces all five grains for trips whose `trip_start_time` falls in
/// `[start, end)` seconds, at percentile `p`.
pub fn aggregate_window(tables: &MetricTables, start: i64, end: i64, p: f64) -> WindowAggregate {
    let in_window = |t: i64| t >= start && t < end;

    let stop_rows: Vec<&SegmentMetricRow> = tables.stop_metrics.iter().filter(|r| in_window(r.trip_start_time)).collect();
    let tpbp_rows: Vec<&SegmentMetricRow> = tables.tpbp_metrics.iter().filter(|r| in_window(r.trip_start_time)).collect();
    let route_rows: Vec<&RouteMetricRow> = tables.route_metrics.iter().filter(|r| in_window(r.trip_start_time)).collect();

    let segment_input: Vec<_> = stop_rows
        .iter()
        .map(|r| ((r.route_id.clone(), r.stop_pair.clone()), segment_metric_fields(r)))
        .collect();
    let corridor_input: Vec<_> = stop_rows.iter().map(|r| (r.stop_pair.clone(), segment_metric_fields(r))).collect();
    let route_input: Vec<_> = route_rows
        .iter()
        .map(|r| ((r.route_id.clone(), r.direction_id), route_metric_fields(r)))
        .collect();
    let tpbp_segment_input: Vec<_> = tpbp_rows
        .iter()
        .map(|r| ((r.route_id.clone(), r.stop_pair.clone()), segment_metric_fields(r)))
        .collect();
    let tpbp_corridor_input: Vec<_> = tpbp_rows.iter().map(|r| (r.stop_pair.clone(), segment_metric_fields(r))).collect();

    WindowAggregate {
        segment: reduce_by_key(&segment_input, p),
        corridor: reduce_by_key(&corridor_input, p),
        route: reduce_by_key(&route_input, p),
        tpbp_segment: reduce_by_key(&tpbp_segment_input, p),
        tpbp_corridor: reduce_by_key(&tpbp_corridor_input, p),
    }
}

/// aggregates over every configured named time period, for every requested
/// (method_name, percentile) pair.
pub fn aggregate_named_periods(
    tables: &MetricTables,
    periods: &HashMap<String, TimePeriod>,
    methods: &[(&str, f64)],
) -> Vec<(String, String, WindowAggregate)> {
    info!("aggregating {} named period(s)", periods.len());
    let mut out = Vec::new();
    for (period_name, period) in periods {
        let start = period.start.to_seconds();
        let end = period.end.to_seconds();
        for (method_name, p) in methods {
            let aggregate = aggregate_window(tables, start, end, *p);
            out.push((period_name.clone(), method_name.to_string(), aggregate));
        }
    }
    out
}

/// sweeps 600-second buckets across `[day_start, day_end)`, for every
/// requested (method_name, percentile) pair. buckets are independent, so the
/// sweep is split across threads with `rayon`.
pub fn aggregate_intervals(
    tables: &MetricTables,
    day_start: i64,
    day_end: i64,
    methods: &[(&str, f64)],
) -> Vec<(i64, String, WindowAggregate)> {
    const INTERVAL_SECONDS: i64 = 600;
    info!("aggregating 10-minute intervals from {day_start} to {day_end}");

    let mut starts = Vec::new();
    let mut start = day_start;
    while start < day_end {
        starts.push(start);
        start += INTERVAL_SECONDS;
    }

    let mut out: Vec<(i64, String, WindowAggregate)> = starts
        .into_par_iter()
        .flat_map_iter(|start| {
            let end = (start + INTERVAL_SECONDS).min(day_end);
            methods
                .iter()
                .map(move |(method_name, p)| (start, method_name.to_string(), aggregate_window(tables, start, end, *p)))
                .collect::<Vec<_>>()
        })
        .collect();
    out.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::tables::RouteMetricRow as RRow;

    fn stop_row(route: &str, pair: (&str, &str), trip_start: i64, value: f64) -> SegmentMetricRow {
        let mut row = SegmentMetricRow::blank(
            Arc::from("pattern"),
            Arc::from(route),
            0,
            Arc::from("trip"),
            (Arc::from(pair.0), Arc::from(pair.1)),
            1,
            trip_start,
            trip_start,
            trip_start,
            trip_start,
        );
        row.scheduled_running_time = Some(value);
        row
    }

    #[test]
    fn test_window_filters_by_trip_start_time() {
        let mut tables = MetricTables {
            stop_metrics: vec![
                stop_row("R1", ("A", "B"), 25200, 2.0),
                stop_row("R1", ("A", "B"), 28800, 4.0),
                stop_row("R1", ("A", "B"), 36000, 6.0),
            ],
            tpbp_metrics: vec![],
            route_metrics: vec![],
        };
        tables.stop_metrics[0].scheduled_running_time = Some(2.0);
        let aggregate = aggregate_window(&tables, 25200, 32400, 50.0);
        assert_eq!(aggregate.segment.len(), 1);
        assert_eq!(aggregate.segment[0].metrics["scheduled_running_time"], 3.0);
    }

    #[test]
    fn test_p90_matches_spec_example_across_window() {
        let tables = MetricTables {
            stop_metrics: vec![
                stop_row("R1", ("A", "B"), 25200, 2.0),
                stop_row("R1", ("A", "B"), 28800, 4.0),
                stop_row("R1", ("A", "B"), 36000, 6.0),
            ],
            tpbp_metrics: vec![],
            route_metrics: vec![],
        };
        let aggregate = aggregate_window(&tables, 25200, 32400, 90.0);
        assert_eq!(aggregate.segment[0].metrics["scheduled_running_time"], 3.8);
    }

    #[test]
    fn test_route_grain_groups_by_route_and_direction() {
        let mut row_a = RRow::blank(Arc::from("p"), Arc::from("R1"), 0, Arc::from("T1"), 25200, 25800);
        row_a.boardings = Some(10.0);
        let mut row_b = RRow::blank(Arc::from("p"), Arc::from("R1"), 1, Arc::from("T2"), 25200, 25800);
        row_b.boardings = Some(20.0);
        let tables = MetricTables {
            stop_metrics: vec![],
            tpbp_metrics: vec![],
            route_metrics: vec![row_a, row_b],
        };
        let aggregate = aggregate_window(&tables, 25200, 32400, 50.0);
        assert_eq!(aggregate.route.len(), 2);
    }

    #[test]
    fn test_empty_window_produces_no_rows() {
        let tables = MetricTables {
            stop_metrics: vec![stop_row("R1", ("A", "B"), 25200, 2.0)],
            tpbp_metrics: vec![],
            route_metrics: vec![],
        };
        let aggregate = aggregate_window(&tables, 0, 100, 50.0);
        assert!(aggregate.segment.is_empty());
    }
}
