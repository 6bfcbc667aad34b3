//! C2 (GTFSLoader) + C3 (PatternSynthesizer): everything needed to turn a
//! raw GTFS static archive plus a resolved date list into stop-level
//! records annotated with timepoint/branchpoint flags, synthesized
//! patterns, and segment polylines.

pub mod loader;
pub mod model;
pub mod pattern;
pub mod schema;
pub mod shape_splice;

pub use loader::{load, GtfsLoadResult};
pub use model::{GtfsStopEvent, Route, Stop};
pub use pattern::{assign_branchpoints_and_tp_bp, synthesize_patterns, with_next_stop, PatternAssignment};
pub use shape_splice::{build_base_segments, enrich_with_shape, Coord, Segment};
