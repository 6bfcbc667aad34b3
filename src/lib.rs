//! ROVE: a transit performance-metrics batch pipeline. ingests a GTFS
//! static feed plus optional AVL telemetry for an agency/month/year/
//! date-type selection and produces stop/timepoint/route/corridor-grain
//! performance metrics, aggregated over configured time windows.
//!
//! the pipeline is seven stages, run to completion in order by the binary
//! in `main.rs`: C1 [`params`] resolves run configuration, C2/C3 [`gtfs`]
//! load the GTFS archive and synthesize patterns/timepoints/branchpoints,
//! C4 [`avl`] normalizes optional AVL telemetry, C5 [`shapes`] measures
//! per-segment distances, C6 [`metrics`] computes trip-level metrics, and
//! C7 [`aggregation`] reduces them onto the output grains. [`output`]
//! serializes the resulting artifacts.

pub mod aggregation;
pub mod avl;
pub mod config;
pub mod error;
pub mod gtfs;
pub mod metrics;
pub mod output;
pub mod params;
pub mod shapes;

pub use error::RoveError;
