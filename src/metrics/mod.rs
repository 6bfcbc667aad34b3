//! C6: MetricCalculator — turns pattern-enriched GTFS records, optional AVL
//! telemetry, and per-segment shape distances into the three metric tables
//! (`stop_metrics`, `tpbp_metrics`, `route_metrics`) C7 aggregates.

pub mod calculator;
pub mod groupby;
pub mod tables;

pub use calculator::calculate;
pub use tables::{MetricTables, RouteMetricRow, SegmentMetricRow};
