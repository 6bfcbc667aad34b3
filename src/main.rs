//! C8: the pipeline driver. wires C1 (ParamsResolver) through C7
//! (MetricAggregator) into a single staged batch run, per §5's
//! single-threaded, non-suspending stage model. the subcommand shape
//! (one subcommand per pipeline stage) mirrors
//! `bambam_gtfs::schedule::app::operation::GtfsOperation`; the top-level
//! `env_logger::init()` + error-logged-then-exit shape mirrors `bambam`'s
//! own `main.rs`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kdam::tqdm;
use log::info;

use rove_backend::aggregation::{self, AggregationOutput};
use rove_backend::avl;
use rove_backend::config::{CliOverrides, RunConfig};
use rove_backend::gtfs;
use rove_backend::metrics;
use rove_backend::output;
use rove_backend::params::ResolvedParams;
use rove_backend::shapes::{HaversineShapeDistance, ShapeDistanceSource};
use rove_backend::RoveError;

/// reduction methods applied at every grain for every window: median (p50)
/// and the 90th percentile, per §4.6's "aggregation methods, typically
/// median and 90th percentile."
const METHODS: [(&str, f64); 2] = [("median", 50.0), ("p90", 90.0)];

#[derive(Parser, Debug)]
#[command(name = "rove-backend", about = "computes transit stop/timepoint/route/corridor performance metrics from GTFS and AVL data")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// loads and validates a run configuration without running the
    /// pipeline — resolves the agency, date list, and input/output paths
    /// and reports them, so a config can be checked before a long run.
    ResolveParams {
        #[arg(long, default_value = "rove.toml")]
        config: String,
        #[command(flatten)]
        overrides: CliOverrides,
    },
    /// runs the full pipeline: GTFS ingestion, pattern synthesis, optional
    /// AVL normalization, metric calculation, aggregation, and artifact
    /// output.
    RunPipeline {
        #[arg(long, default_value = "rove.toml")]
        config: String,
        #[command(flatten)]
        overrides: CliOverrides,
        /// also compute the 10-minute rolling-interval aggregation sweep
        /// across the full day, in addition to the configured named periods.
        #[arg(long)]
        intervals: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let result = match &cli.command {
        Command::ResolveParams { config, overrides } => resolve_params(config, overrides),
        Command::RunPipeline { config, overrides, intervals } => run_pipeline(config, overrides, *intervals),
    };
    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn load_config(path: &str, overrides: &CliOverrides) -> Result<RunConfig, RoveError> {
    let mut config = RunConfig::from_file(path)?;
    config.apply_overrides(overrides);
    Ok(config)
}

fn resolve_params(config_path: &str, overrides: &CliOverrides) -> Result<(), RoveError> {
    info!("loading run configuration from {config_path}");
    let config = load_config(config_path, overrides)?;
    let params = ResolvedParams::resolve(&config)?;
    info!(
        "resolved params: agency={:?}, {} date(s), route_types={:?}, data_option={:?}, avl_wanted={}",
        params.agency,
        params.dates.len(),
        params.route_types,
        params.data_option,
        params.wants_avl()
    );
    Ok(())
}

fn run_pipeline(config_path: &str, overrides: &CliOverrides, intervals: bool) -> Result<(), RoveError> {
    info!("loading run configuration from {config_path}");
    let config = load_config(config_path, overrides)?;
    let params = ResolvedParams::resolve(&config)?;

    info!("loading GTFS archive {}", params.io.gtfs_archive);
    let mut load_result = gtfs::load(&params.io.gtfs_archive, &params.dates, &params.route_types)?;

    gtfs::assign_branchpoints_and_tp_bp(&mut load_result.records);
    let pattern_assignment = gtfs::synthesize_patterns(&mut load_result.records)?;

    let stop_coords: HashMap<Arc<str>, gtfs::Coord> = load_result
        .stops
        .iter()
        .map(|(id, stop)| (id.clone(), (stop.stop_lat, stop.stop_lon)))
        .collect();
    let mut pattern_segments = gtfs::build_base_segments(&pattern_assignment.pattern_stops, &stop_coords)?;
    splice_shapes(&mut pattern_segments, &load_result);

    let avl_records = if params.wants_avl() {
        let path = params.io.avl_records.as_ref().ok_or(RoveError::AvlRequiredButMissing)?;
        info!("loading AVL records from {path}");
        Some(avl::load(path)?)
    } else {
        None
    };

    let shape_distances = HaversineShapeDistance.distances(&pattern_segments)?;

    let tables = metrics::calculate(&load_result.records, &shape_distances, avl_records.as_deref(), &params.otp_bounds)?;

    let mut aggregation_output = AggregationOutput::default();
    aggregation_output.named_periods = aggregation::aggregate_named_periods(&tables, &params.time_periods, &METHODS);
    if intervals {
        aggregation_output.intervals = aggregation::aggregate_intervals(&tables, 0, 24 * 3600, &METHODS);
    }

    let output_dir = Path::new(&params.io.output_directory);
    std::fs::create_dir_all(output_dir)?;
    output::write_shapes(&output_dir.join("shapes.json"), &pattern_segments, &shape_distances)?;
    output::write_timepoints(&output_dir.join("timepoints.json"), &load_result.records, &pattern_assignment.pattern_stops)?;
    output::write_stop_name_lookup(&output_dir.join("stop_name_lookup.json"), &load_result.stops)?;
    output::write_aggregated_metrics(&output_dir.join("aggregated_metrics.json"), &aggregation_output)?;

    info!("run complete, artifacts written to {}", output_dir.display());
    Ok(())
}

/// replaces each pattern's straight-line segments with shape-derived
/// polylines, using the representative trip (first trip encountered for
/// that pattern) to look up which shape applies.
fn splice_shapes(pattern_segments: &mut HashMap<Arc<str>, Vec<gtfs::Segment>>, load_result: &gtfs::GtfsLoadResult) {
    let mut representative_trip: HashMap<Arc<str>, Arc<str>> = HashMap::new();
    for record in &load_result.records {
        if let Some(pattern) = &record.pattern {
            representative_trip.entry(pattern.clone()).or_insert_with(|| record.trip_id.clone());
        }
    }
    let total = pattern_segments.len();
    for (pattern, segments) in tqdm!(pattern_segments.iter_mut(), total = total, desc = "splicing shapes onto patterns") {
        let Some(trip_id) = representative_trip.get(pattern) else { continue };
        let Some(shape_id) = load_result.trip_shape.get(trip_id) else { continue };
        let Some(shape_coords) = load_result.shapes.get(shape_id) else { continue };
        gtfs::enrich_with_shape(segments, shape_coords);
    }
}
