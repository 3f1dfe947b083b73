//! End-to-end run metrics.
//!
//! The receiver records the first-fragment and last-completion instants and
//! appends one CSV row per run: `run_id,scheme_int,total_us,first_us,
//! last_us,note`. Output path and tags come from the environment; without a
//! path only the console `METRIC` line is emitted.

use std::env;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::types::SignatureScheme;

pub const METRICS_FILE_ENV: &str = "V2X_METRICS_FILE";
pub const METRICS_RUN_ENV: &str = "V2X_METRICS_RUN";
pub const METRICS_NOTE_ENV: &str = "V2X_METRICS_NOTE";

/// Where and under which tags metrics are recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    pub path: Option<PathBuf>,
    pub run_id: String,
    pub note: String,
}

impl MetricsConfig {
    pub fn from_env() -> Self {
        Self {
            path: env::var(METRICS_FILE_ENV).ok().map(PathBuf::from),
            run_id: env::var(METRICS_RUN_ENV).unwrap_or_else(|_| "0".to_string()),
            note: env::var(METRICS_NOTE_ENV).unwrap_or_default(),
        }
    }
}

/// Wall-clock measurements of one receiver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunMetrics {
    pub scheme: SignatureScheme,
    pub first_fragment_at: DateTime<Utc>,
    pub last_completion_at: DateTime<Utc>,
}

impl RunMetrics {
    pub fn total_us(&self) -> i64 {
        self.last_completion_at
            .signed_duration_since(self.first_fragment_at)
            .num_microseconds()
            .unwrap_or(i64::MAX)
    }

    pub fn csv_row(&self, config: &MetricsConfig) -> String {
        format!(
            "{},{},{},{},{},{}",
            config.run_id,
            self.scheme.as_u8(),
            self.total_us(),
            self.first_fragment_at.timestamp_micros(),
            self.last_completion_at.timestamp_micros(),
            config.note,
        )
    }

    /// Append the CSV row when a metrics file is configured.
    pub fn record(&self, config: &MetricsConfig) -> io::Result<()> {
        if let Some(path) = &config.path {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}", self.csv_row(config))?;
        }
        Ok(())
    }

    pub fn print_summary(&self, config: &MetricsConfig) {
        println!(
            "METRIC run={} scheme={} total_us={} first_us={} last_us={}",
            config.run_id,
            self.scheme.as_u8(),
            self.total_us(),
            self.first_fragment_at.timestamp_micros(),
            self.last_completion_at.timestamp_micros(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> RunMetrics {
        let first = DateTime::from_timestamp_micros(1_700_000_000_000_000).unwrap();
        RunMetrics {
            scheme: SignatureScheme::Falcon,
            first_fragment_at: first,
            last_completion_at: first + Duration::microseconds(250_000),
        }
    }

    #[test]
    fn csv_row_has_the_expected_shape() {
        let config = MetricsConfig {
            path: None,
            run_id: "17".to_string(),
            note: "loopback".to_string(),
        };
        let row = sample().csv_row(&config);
        assert_eq!(
            row,
            "17,1,250000,1700000000000000,1700000250000000,loopback"
        );
    }

    #[test]
    fn record_appends_one_row_per_run() {
        let path = std::env::temp_dir().join("v2verifier-metrics-test.csv");
        std::fs::remove_file(&path).ok();
        let config = MetricsConfig {
            path: Some(path.clone()),
            run_id: "1".to_string(),
            note: String::new(),
        };
        sample().record(&config).unwrap();
        sample().record(&config).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn no_path_means_no_file_io() {
        let config = MetricsConfig {
            path: None,
            run_id: "0".to_string(),
            note: String::new(),
        };
        assert!(sample().record(&config).is_ok());
    }
}
