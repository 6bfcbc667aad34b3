//! post-parse table presence and non-emptiness checks.
//!
//! `gtfs_structures::Gtfs` already parses and type-checks the columns it
//! knows about; what it does not guarantee is that a *required* table was
//! present in the archive at all, or that it was non-empty after optional
//! narrowing. this module is the Rust analogue of the original source's
//! `__get_non_empty_gtfs_table` column-spec check in `gtfs.py`.

use gtfs_structures::Gtfs;

use crate::error::RoveError;

/// required tables per §6: stops, routes, trips, stop_times. `shapes` is
/// optional and checked separately by the caller (a missing or empty shapes
/// table is a warning, not a failure).
pub fn validate_required_tables(gtfs: &Gtfs) -> Result<(), RoveError> {
    if gtfs.stops.is_empty() {
        return Err(RoveError::EmptyRequiredTable("stops".to_string()));
    }
    if gtfs.routes.is_empty() {
        return Err(RoveError::EmptyRequiredTable("routes".to_string()));
    }
    if gtfs.trips.is_empty() {
        return Err(RoveError::EmptyRequiredTable("trips".to_string()));
    }
    let has_stop_times = gtfs.trips.values().any(|trip| !trip.stop_times.is_empty());
    if !has_stop_times {
        return Err(RoveError::EmptyRequiredTable("stop_times".to_string()));
    }
    Ok(())
}

/// true when the archive carries a usable shapes table; false (not an
/// error) when it's absent or empty, per §4.2's "if the shapes table is
/// available" branch.
pub fn has_shapes_table(gtfs: &Gtfs) -> bool {
    gtfs.shapes.values().any(|points| !points.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_required_tables_rejects_empty_stops() {
        let gtfs = Gtfs::default();
        let result = validate_required_tables(&gtfs);
        assert!(matches!(result, Err(RoveError::EmptyRequiredTable(table)) if table == "stops"));
    }

    #[test]
    fn test_has_shapes_table_false_when_absent() {
        let gtfs = Gtfs::default();
        assert!(!has_shapes_table(&gtfs));
    }
}
