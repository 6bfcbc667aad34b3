//! run configuration: the recognized options of the external interface,
//! loaded from a TOML file via the `config` crate and deserialized with serde.

use std::collections::HashMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::RoveError;

/// transit agencies whose AVL loaders this backend knows how to normalize.
/// mirrors `SUPPORTED_AGENCIES` in the original backend entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Agency {
    Cta,
    Mbta,
    Wmata,
}

impl Agency {
    pub fn parse(raw: &str) -> Result<Agency, RoveError> {
        match raw.to_ascii_uppercase().as_str() {
            "CTA" => Ok(Agency::Cta),
            "MBTA" => Ok(Agency::Mbta),
            "WMATA" => Ok(Agency::Wmata),
            other => Err(RoveError::InvalidAgency(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum DateType {
    Workday,
    Saturday,
    Sunday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataOption {
    Gtfs,
    Avl,
    Odx,
}

/// an (hour, minute) clock time used to bound a named time period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
}

impl ClockTime {
    pub fn to_seconds(self) -> i64 {
        self.hour as i64 * 3600 + self.minute as i64 * 60
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriod {
    pub start: ClockTime,
    pub end: ClockTime,
}

/// on-time-performance tolerance, in minutes. defaults match the original
/// backend's `on_time_performance(no_earlier_than=-1, no_later_than=5)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OtpBounds {
    pub no_earlier_than: f64,
    pub no_later_than: f64,
}

impl Default for OtpBounds {
    fn default() -> Self {
        OtpBounds {
            no_earlier_than: -1.0,
            no_later_than: 5.0,
        }
    }
}

impl OtpBounds {
    pub fn validate(&self) -> Result<(), RoveError> {
        if self.no_earlier_than > 0.0 || self.no_later_than < 0.0 {
            return Err(RoveError::InvalidOtpBounds {
                no_earlier_than: self.no_earlier_than,
                no_later_than: self.no_later_than,
            });
        }
        Ok(())
    }
}

/// paths to pipeline inputs and outputs, resolved by the params resolver
/// from the agency/month/year/date_type/data_option tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoPaths {
    pub gtfs_archive: String,
    pub avl_records: Option<String>,
    pub output_directory: String,
}

/// the full recognized configuration surface of §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub agency: String,
    pub month: String,
    pub year: String,
    pub date_type: DateType,
    pub data_option: Vec<DataOption>,
    /// mode name (e.g. "bus") -> list of GTFS route_type integers.
    pub route_type: HashMap<String, Vec<i32>>,
    pub mode: String,
    pub time_periods: HashMap<String, TimePeriod>,
    /// per-metric flag: true if higher values are "worse" for that metric.
    /// preserved and passed through to aggregation output, not interpreted.
    #[serde(default)]
    pub red_values: HashMap<String, bool>,
    #[serde(default)]
    pub otp_bounds: OtpBounds,
    pub io: IoPaths,
}

impl RunConfig {
    /// loads configuration from a TOML file at `path`.
    pub fn from_file(path: &str) -> Result<RunConfig, RoveError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;
        let cfg: RunConfig = settings.try_deserialize()?;
        cfg.otp_bounds.validate()?;
        Ok(cfg)
    }

    pub fn route_types_for_mode(&self) -> Result<&[i32], RoveError> {
        self.route_type.get(&self.mode).map(|v| v.as_slice()).ok_or_else(|| {
            RoveError::InvalidConfig(format!(
                "mode '{}' has no entry in the route_type configuration map",
                self.mode
            ))
        })
    }

    pub fn wants(&self, option: DataOption) -> bool {
        self.data_option.contains(&option)
    }

    /// applies the CLI's `--agency`/`--month`/`--year`/`--date-type`/
    /// `--data-option` overrides onto a file-loaded config, each independent
    /// and optional — an absent flag leaves the file's value untouched.
    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(agency) = &overrides.agency {
            self.agency = agency.clone();
        }
        if let Some(month) = &overrides.month {
            self.month = month.clone();
        }
        if let Some(year) = &overrides.year {
            self.year = year.clone();
        }
        if let Some(date_type) = overrides.date_type {
            self.date_type = date_type;
        }
        if !overrides.data_option.is_empty() {
            self.data_option = overrides.data_option.clone();
        }
    }
}

/// the `--agency`/`--month`/`--year`/`--date-type`/`--data-option` flags
/// shared by every subcommand of §6's CLI, each overriding the matching
/// field of the file-loaded `RunConfig` when present.
#[derive(Debug, Clone, clap::Args)]
pub struct CliOverrides {
    #[arg(long)]
    pub agency: Option<String>,
    #[arg(long)]
    pub month: Option<String>,
    #[arg(long)]
    pub year: Option<String>,
    #[arg(long, value_enum)]
    pub date_type: Option<DateType>,
    #[arg(long, value_enum)]
    pub data_option: Vec<DataOption>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agency_parse_case_insensitive() {
        assert_eq!(Agency::parse("mbta").unwrap(), Agency::Mbta);
        assert_eq!(Agency::parse("CTA").unwrap(), Agency::Cta);
    }

    #[test]
    fn test_agency_parse_rejects_unknown() {
        let result = Agency::parse("NJT");
        assert!(matches!(result, Err(RoveError::InvalidAgency(_))));
    }

    #[test]
    fn test_otp_bounds_rejects_positive_no_earlier_than() {
        let bounds = OtpBounds {
            no_earlier_than: 2.0,
            no_later_than: 5.0,
        };
        assert!(bounds.validate().is_err());
    }

    #[test]
    fn test_otp_bounds_rejects_negative_no_later_than() {
        let bounds = OtpBounds {
            no_earlier_than: -1.0,
            no_later_than: -5.0,
        };
        assert!(bounds.validate().is_err());
    }

    #[test]
    fn test_otp_bounds_default_is_valid() {
        assert!(OtpBounds::default().validate().is_ok());
    }

    #[test]
    fn test_clock_time_to_seconds() {
        let t = ClockTime { hour: 7, minute: 30 };
        assert_eq!(t.to_seconds(), 7 * 3600 + 30 * 60);
    }

    fn base_run_config() -> RunConfig {
        RunConfig {
            agency: "MBTA".to_string(),
            month: "03".to_string(),
            year: "2022".to_string(),
            date_type: DateType::Workday,
            data_option: vec![DataOption::Gtfs],
            route_type: HashMap::new(),
            mode: "bus".to_string(),
            time_periods: HashMap::new(),
            red_values: HashMap::new(),
            otp_bounds: OtpBounds::default(),
            io: IoPaths {
                gtfs_archive: "gtfs.zip".to_string(),
                avl_records: None,
                output_directory: "out".to_string(),
            },
        }
    }

    #[test]
    fn test_apply_overrides_only_touches_present_fields() {
        let mut config = base_run_config();
        let overrides = CliOverrides {
            agency: Some("CTA".to_string()),
            month: None,
            year: None,
            date_type: Some(DateType::Saturday),
            data_option: vec![],
        };
        config.apply_overrides(&overrides);
        assert_eq!(config.agency, "CTA");
        assert_eq!(config.month, "03");
        assert_eq!(config.date_type, DateType::Saturday);
        assert_eq!(config.data_option, vec![DataOption::Gtfs]);
    }

    #[test]
    fn test_apply_overrides_replaces_data_option_when_present() {
        let mut config = base_run_config();
        let overrides = CliOverrides {
            agency: None,
            month: None,
            year: None,
            date_type: None,
            data_option: vec![DataOption::Gtfs, DataOption::Avl],
        };
        config.apply_overrides(&overrides);
        assert_eq!(config.data_option, vec![DataOption::Gtfs, DataOption::Avl]);
    }
}
