use std::path::PathBuf;

use chrono::Weekday;

use crate::calendar::{CadenceRule, DEFAULT_OPENING_FLOOR};
use crate::limits::CADENCE_LOOKAHEAD;
use crate::model::{Day, PermanentAllocation};

pub const DEFAULT_PERMANENT_TABLE: &str = "L13";
pub const DEFAULT_PERMANENT_HOLDER: &str = "Club Library";
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;

#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String, reason: &'static str },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value, reason } => write!(f, "{var}={value:?}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub cadence: CadenceRule,
    /// `None` when CLUBNIGHT_PERMANENT_TABLE is set to an empty string.
    pub permanent: Option<PermanentAllocation>,
    pub strict_slots: bool,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub seed_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let weekday = match lookup("CLUBNIGHT_CADENCE_WEEKDAY") {
            Some(v) => parse_weekday(&v).ok_or(ConfigError::Invalid {
                var: "CLUBNIGHT_CADENCE_WEEKDAY",
                value: v,
                reason: "expected a weekday name such as tue",
            })?,
            None => Weekday::Tue,
        };
        let floor = match lookup("CLUBNIGHT_OPENING_FLOOR") {
            Some(v) => v.parse::<Day>().map_err(|_| ConfigError::Invalid {
                var: "CLUBNIGHT_OPENING_FLOOR",
                value: v,
                reason: "expected YYYY-MM-DD",
            })?,
            None => DEFAULT_OPENING_FLOOR,
        };
        let count = match lookup("CLUBNIGHT_CADENCE_COUNT") {
            Some(v) => match v.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "CLUBNIGHT_CADENCE_COUNT",
                        value: v,
                        reason: "expected a positive integer",
                    });
                }
            },
            None => CADENCE_LOOKAHEAD,
        };

        let table = lookup("CLUBNIGHT_PERMANENT_TABLE").unwrap_or_else(|| DEFAULT_PERMANENT_TABLE.into());
        let holder = lookup("CLUBNIGHT_PERMANENT_HOLDER").unwrap_or_else(|| DEFAULT_PERMANENT_HOLDER.into());
        let permanent = (!table.trim().is_empty()).then(|| PermanentAllocation {
            table_id: table.trim().to_string(),
            holder_name: holder,
        });

        let strict_slots = match lookup("CLUBNIGHT_STRICT_SLOTS") {
            Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid {
                var: "CLUBNIGHT_STRICT_SLOTS",
                value: v,
                reason: "expected true or false",
            })?,
            None => false,
        };
        let compact_threshold = match lookup("CLUBNIGHT_COMPACT_THRESHOLD") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                var: "CLUBNIGHT_COMPACT_THRESHOLD",
                value: v,
                reason: "expected an integer",
            })?,
            None => DEFAULT_COMPACT_THRESHOLD,
        };
        let metrics_port = match lookup("CLUBNIGHT_METRICS_PORT") {
            Some(v) => Some(v.parse().map_err(|_| ConfigError::Invalid {
                var: "CLUBNIGHT_METRICS_PORT",
                value: v,
                reason: "expected a port number",
            })?),
            None => None,
        };

        Ok(Self {
            data_dir: lookup("CLUBNIGHT_DATA_DIR").unwrap_or_else(|| "./data".into()).into(),
            cadence: CadenceRule { weekday, floor, count },
            permanent,
            strict_slots,
            compact_threshold,
            metrics_port,
            seed_file: lookup("CLUBNIGHT_SEED_FILE").map(PathBuf::from),
        })
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("clubnight.journal")
    }
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    s.trim().parse().ok()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
