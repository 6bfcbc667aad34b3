//! C1: ParamsResolver. resolves agency/date/data-option inputs into a
//! validated run configuration, following the style of
//! `bambam_gtfs::schedule::app::operation`'s CLI-argument-to-config
//! translation (validate, then build an immutable config struct consumed by
//! downstream stages).

use chrono::NaiveDate;

use crate::config::{Agency, DataOption, IoPaths, OtpBounds, RunConfig, TimePeriod};
use crate::error::RoveError;
use crate::params::calendar::resolve_date_list;
use std::collections::HashMap;

/// the validated, ready-to-run configuration handed to the rest of the
/// pipeline. unlike `RunConfig` (raw deserialized options), every field here
/// has already passed validation.
#[derive(Debug, Clone)]
pub struct ResolvedParams {
    pub agency: Agency,
    pub dates: Vec<NaiveDate>,
    pub route_types: Vec<i32>,
    pub data_option: Vec<DataOption>,
    pub time_periods: HashMap<String, TimePeriod>,
    pub red_values: HashMap<String, bool>,
    pub otp_bounds: OtpBounds,
    pub io: IoPaths,
}

impl ResolvedParams {
    pub fn resolve(config: &RunConfig) -> Result<ResolvedParams, RoveError> {
        let agency = Agency::parse(&config.agency)?;
        let dates = resolve_date_list(&config.month, &config.year, config.date_type)?;
        let route_types = config.route_types_for_mode()?.to_vec();
        config.otp_bounds.validate()?;

        if !std::path::Path::new(&config.io.gtfs_archive).exists() {
            return Err(RoveError::MissingInputFile(config.io.gtfs_archive.clone()));
        }
        if config.wants(DataOption::Avl) {
            match &config.io.avl_records {
                Some(path) if std::path::Path::new(path).exists() => {}
                Some(path) => return Err(RoveError::MissingInputFile(path.clone())),
                None => return Err(RoveError::AvlRequiredButMissing),
            }
        }

        Ok(ResolvedParams {
            agency,
            dates,
            route_types,
            data_option: config.data_option.clone(),
            time_periods: config.time_periods.clone(),
            red_values: config.red_values.clone(),
            otp_bounds: config.otp_bounds,
            io: config.io.clone(),
        })
    }

    pub fn wants_avl(&self) -> bool {
        self.data_option.contains(&DataOption::Avl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClockTime, DateType};
    use std::collections::HashMap;

    fn base_config(gtfs_path: &str) -> RunConfig {
        let mut route_type = HashMap::new();
        route_type.insert("bus".to_string(), vec![3]);
        let mut time_periods = HashMap::new();
        time_periods.insert(
            "full".to_string(),
            TimePeriod {
                start: ClockTime { hour: 0, minute: 0 },
                end: ClockTime { hour: 24, minute: 0 },
            },
        );
        RunConfig {
            agency: "MBTA".to_string(),
            month: "03".to_string(),
            year: "2022".to_string(),
            date_type: DateType::Workday,
            data_option: vec![DataOption::Gtfs],
            route_type,
            mode: "bus".to_string(),
            time_periods,
            red_values: HashMap::new(),
            otp_bounds: OtpBounds::default(),
            io: IoPaths {
                gtfs_archive: gtfs_path.to_string(),
                avl_records: None,
                output_directory: "/tmp/rove-test-out".to_string(),
            },
        }
    }

    #[test]
    fn test_resolve_fails_on_missing_gtfs_archive() {
        let config = base_config("/nonexistent/gtfs.zip");
        let result = ResolvedParams::resolve(&config);
        assert!(matches!(result, Err(RoveError::MissingInputFile(_))));
    }

    #[test]
    fn test_resolve_fails_when_avl_requested_without_path() {
        let tmp = std::env::temp_dir().join("rove_test_gtfs_exists.zip");
        std::fs::write(&tmp, b"not a real zip, existence is all that matters").unwrap();
        let mut config = base_config(tmp.to_str().unwrap());
        config.data_option = vec![DataOption::Gtfs, DataOption::Avl];
        let result = ResolvedParams::resolve(&config);
        assert!(matches!(result, Err(RoveError::AvlRequiredButMissing)));
        let _ = std::fs::remove_file(&tmp);
    }

    #[test]
    fn test_resolve_fails_on_invalid_agency() {
        let tmp = std::env::temp_dir().join("rove_test_gtfs_exists2.zip");
        std::fs::write(&tmp, b"placeholder").unwrap();
        let mut config = base_config(tmp.to_str().unwrap());
        config.agency = "NJT".to_string();
        let result = ResolvedParams::resolve(&config);
        assert!(matches!(result, Err(RoveError::InvalidAgency(_))));
        let _ = std::fs::remove_file(&tmp);
    }
}
