//! C7: MetricAggregator — reduces trip-level metric tables onto the
//! segment/corridor/route grids within time windows.

pub mod aggregator;
pub mod percentile;

pub use aggregator::{
    aggregate_intervals, aggregate_named_periods, aggregate_window, AggregatedRow, AggregationOutput, StopPair, WindowAggregate,
};
