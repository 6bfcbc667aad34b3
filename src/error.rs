use thiserror::Error;

/// crate-wide error type for the ROVE metrics pipeline.
///
/// variants follow the fatal/non-fatal split of the error handling design:
/// fatal kinds terminate the run and name the offending table/column/pattern;
/// non-fatal conditions (missing optional shapes table, an unmatchable shape
/// for a single pattern) are logged as warnings by the caller and do not
/// construct a `RoveError` at all.
#[derive(Error, Debug)]
pub enum RoveError {
    #[error("agency '{0}' is not a supported agency")]
    InvalidAgency(String),

    #[error("required input file not found: {0}")]
    MissingInputFile(String),

    #[error("no service_ids are active for the requested date list")]
    MissingServiceDates,

    #[error("required GTFS table is missing from the archive: {0}")]
    MissingRequiredTable(String),

    #[error("table '{table}' is missing required column '{column}'")]
    MissingRequiredColumn { table: String, column: String },

    #[error("required GTFS table '{0}' is present but empty")]
    EmptyRequiredTable(String),

    #[error("pattern hash collision: {0} distinct stop sequences produced {1} distinct hashes")]
    PatternHashCollision(usize, usize),

    #[error("invalid on-time-performance bounds: no_earlier_than must be <= 0 ({no_earlier_than} given), no_later_than must be >= 0 ({no_later_than} given)")]
    InvalidOtpBounds {
        no_earlier_than: f64,
        no_later_than: f64,
    },

    #[error("data_option requests AVL-derived metrics but no AVL records were loaded")]
    AvlRequiredButMissing,

    #[error("shape match failed for pattern '{0}': {1}")]
    ShapeMatchFailed(String, String),

    #[error("GTFS archive is malformed: {0}")]
    MalformedGtfs(String),

    #[error("error due to dataset contents: {0}")]
    InvalidData(String),

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("failure reading GTFS archive: {0}")]
    Gtfs(#[from] gtfs_structures::Error),

    #[error("failure reading CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("failure reading configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failure (de)serializing JSON: {0}")]
    Json(#[from] serde_json::Error),
}
