//! Cleaning and alignment of the raw sensor streams onto a 1-minute grid.
//!
//! Each stream is cleaned independently (invalid timestamps, unparseable and
//! negative values dropped; same-minute duplicates averaged), then every
//! stream is reindexed onto the minute grid spanned by the reference stream
//! and interior gaps are interpolated. Rows where any key stream is still
//! null after interpolation are dropped entirely.

use log::{debug, info};
use thiserror::Error;

use crate::config::SensorConfig;
use crate::core::loaders::{RawStream, RawStreamLog};
use crate::core::timeseries::{minute_range, AlignedFrame, MinuteSeries};

/// Errors that can occur during sensor alignment.
#[derive(Error, Debug)]
pub enum AlignmentError {
    #[error("reference stream '{column}' is not among the configured measurements")]
    MissingReferenceStream { column: String },

    #[error("reference stream '{column}' has no valid readings; cannot derive the time grid")]
    EmptyReferenceStream { column: String },
}

/// Result type for alignment operations.
pub type Result<T> = std::result::Result<T, AlignmentError>;

/// Readings dropped from one stream during cleaning, by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDropCounts {
    pub column: String,
    /// Rows whose timestamp failed to parse
    pub invalid_timestamps: usize,
    /// Rows with a valid timestamp but an unparseable value
    pub unparseable_values: usize,
    /// Rows with a negative value
    pub negative_values: usize,
    /// Readings merged into an earlier reading of the same minute
    pub duplicate_minutes: usize,
}

impl StreamDropCounts {
    /// Total readings removed from this stream.
    pub fn total_dropped(&self) -> usize {
        self.invalid_timestamps + self.unparseable_values + self.negative_values
    }
}

/// What the normalizer filtered out, surfaced to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentReport {
    pub streams: Vec<StreamDropCounts>,
    /// Aligned rows dropped because a key stream was null
    pub rows_dropped_missing_key: usize,
}

/// Clean one raw stream into a minute-resolution series.
fn clean_stream(stream: &RawStream) -> (MinuteSeries, StreamDropCounts) {
    let mut counts = StreamDropCounts {
        column: stream.value_column.clone(),
        ..StreamDropCounts::default()
    };

    let mut observations = Vec::with_capacity(stream.rows.len());
    for row in &stream.rows {
        let timestamp = match row.timestamp {
            Some(t) => t,
            None => {
                counts.invalid_timestamps += 1;
                continue;
            }
        };
        let value = match row.value {
            Some(v) => v,
            None => {
                counts.unparseable_values += 1;
                continue;
            }
        };
        if value < 0.0 {
            counts.negative_values += 1;
            continue;
        }
        observations.push((timestamp, value));
    }

    let kept = observations.len();
    let series = MinuteSeries::from_observations(observations);
    counts.duplicate_minutes = kept - series.len();

    (series, counts)
}

/// Align all sensor streams onto the reference stream's 1-minute grid.
///
/// Implements the normalizer contract: per-stream cleaning, grid derivation
/// from the reference stream's [min, max] domain, time interpolation without
/// extrapolation, and whole-row drops where a key stream stays null.
///
/// # Errors
///
/// Fails if the reference stream is not configured or has no valid readings.
pub fn align_sensor_streams(
    log: &RawStreamLog,
    config: &SensorConfig,
) -> Result<(AlignedFrame, AlignmentReport)> {
    let mut cleaned = Vec::with_capacity(log.streams.len());
    let mut report = AlignmentReport::default();

    for stream in &log.streams {
        let (series, counts) = clean_stream(stream);
        debug!(
            "stream {}: kept {} readings, dropped {}",
            counts.column,
            series.len(),
            counts.total_dropped()
        );
        report.streams.push(counts);
        cleaned.push((stream.value_column.clone(), series));
    }

    let reference = cleaned
        .iter()
        .find(|(column, _)| column == &config.reference_column)
        .map(|(_, series)| series)
        .ok_or_else(|| AlignmentError::MissingReferenceStream {
            column: config.reference_column.clone(),
        })?;

    let (grid_start, grid_end) = match (reference.first_timestamp(), reference.last_timestamp()) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            return Err(AlignmentError::EmptyReferenceStream {
                column: config.reference_column.clone(),
            })
        }
    };

    let grid = minute_range(grid_start, grid_end);
    let mut frame = AlignedFrame::new(grid.clone());
    for (column, series) in &cleaned {
        frame.push_column(column.clone(), series.sample_on_grid(&grid));
    }

    report.rows_dropped_missing_key = frame.drop_rows_with_null(&config.key_columns);
    info!(
        "aligned {} streams onto {} grid rows ({} rows dropped for missing key sensors)",
        cleaned.len(),
        frame.num_rows(),
        report.rows_dropped_missing_key
    );

    Ok((frame, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeasurementColumns;
    use crate::core::loaders::RawReading;
    use chrono::{NaiveDate, NaiveDateTime};

    fn minute(m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, m, 0)
            .unwrap()
    }

    fn reading(m: u32, value: f64) -> RawReading {
        RawReading {
            timestamp: Some(minute(m)),
            value: Some(value),
        }
    }

    fn config(reference: &str, keys: &[&str]) -> SensorConfig {
        SensorConfig {
            measurements: vec![
                MeasurementColumns {
                    time_column: "rpm_t".into(),
                    value_column: "rpm".into(),
                },
                MeasurementColumns {
                    time_column: "torque_t".into(),
                    value_column: "torque".into(),
                },
            ],
            reference_column: reference.to_string(),
            key_columns: keys.iter().map(|s| s.to_string()).collect(),
            feed_column: "rpm".into(),
            drum_speed_column: "rpm".into(),
            diff_speed_column: "rpm".into(),
            torque_column: "torque".into(),
        }
    }

    fn log(rpm: Vec<RawReading>, torque: Vec<RawReading>) -> RawStreamLog {
        RawStreamLog {
            streams: vec![
                RawStream {
                    value_column: "rpm".into(),
                    rows: rpm,
                },
                RawStream {
                    value_column: "torque".into(),
                    rows: torque,
                },
            ],
        }
    }

    #[test]
    fn test_grid_spans_reference_domain() {
        let log = log(
            vec![reading(0, 60.0), reading(4, 64.0)],
            // Torque extends beyond the reference on both sides.
            vec![reading(0, 10.0), reading(8, 18.0)],
        );

        let (frame, _) = align_sensor_streams(&log, &config("rpm", &[])).unwrap();

        assert_eq!(frame.num_rows(), 5);
        assert_eq!(frame.index().first(), Some(&minute(0)));
        assert_eq!(frame.index().last(), Some(&minute(4)));
        // Contiguous 1-minute index.
        for w in frame.index().windows(2) {
            assert_eq!((w[1] - w[0]).num_minutes(), 1);
        }
    }

    #[test]
    fn test_interpolation_fills_interior_gaps() {
        let log = log(
            vec![reading(0, 0.0), reading(4, 4.0)],
            vec![reading(0, 100.0), reading(2, 200.0)],
        );

        let (frame, _) = align_sensor_streams(&log, &config("rpm", &[])).unwrap();

        let rpm = frame.column("rpm").unwrap();
        assert_eq!(rpm[2], Some(2.0));
        // Torque has no data past minute 2; never extrapolated.
        let torque = frame.column("torque").unwrap();
        assert_eq!(torque[1], Some(150.0));
        assert_eq!(torque[3], None);
        assert_eq!(torque[4], None);
    }

    #[test]
    fn test_cleaning_drops_and_counts() {
        let log = log(
            vec![
                reading(0, 60.0),
                RawReading {
                    timestamp: None,
                    value: Some(61.0),
                },
                RawReading {
                    timestamp: Some(minute(1)),
                    value: None,
                },
                RawReading {
                    timestamp: Some(minute(2)),
                    value: Some(-5.0),
                },
                reading(3, 63.0),
            ],
            vec![reading(0, 1.0), reading(3, 2.0)],
        );

        let (_, report) = align_sensor_streams(&log, &config("rpm", &[])).unwrap();

        let rpm_counts = &report.streams[0];
        assert_eq!(rpm_counts.invalid_timestamps, 1);
        assert_eq!(rpm_counts.unparseable_values, 1);
        assert_eq!(rpm_counts.negative_values, 1);
        assert_eq!(rpm_counts.total_dropped(), 3);
    }

    #[test]
    fn test_duplicate_minutes_averaged_and_counted() {
        let log = log(
            vec![reading(0, 10.0), reading(0, 20.0), reading(2, 30.0)],
            vec![reading(0, 1.0), reading(2, 2.0)],
        );

        let (frame, report) = align_sensor_streams(&log, &config("rpm", &[])).unwrap();

        assert_eq!(frame.column("rpm").unwrap()[0], Some(15.0));
        assert_eq!(report.streams[0].duplicate_minutes, 1);
    }

    #[test]
    fn test_key_rows_dropped() {
        let log = log(
            vec![reading(0, 60.0), reading(4, 64.0)],
            // Key stream only covers minutes 2..=4.
            vec![reading(2, 1.0), reading(4, 2.0)],
        );

        let (frame, report) = align_sensor_streams(&log, &config("rpm", &["torque"])).unwrap();

        assert_eq!(report.rows_dropped_missing_key, 2);
        assert_eq!(frame.num_rows(), 3);
        // No null key cells remain.
        assert!(frame.column("torque").unwrap().iter().all(|v| v.is_some()));
    }

    #[test]
    fn test_empty_reference_is_fatal() {
        let log = log(
            vec![RawReading {
                timestamp: None,
                value: Some(1.0),
            }],
            vec![reading(0, 1.0)],
        );

        let err = align_sensor_streams(&log, &config("rpm", &[])).unwrap_err();
        assert!(matches!(err, AlignmentError::EmptyReferenceStream { .. }));
    }

    #[test]
    fn test_missing_reference_is_fatal() {
        let log = log(vec![reading(0, 1.0)], vec![reading(0, 1.0)]);
        let err = align_sensor_streams(&log, &config("nonexistent", &[])).unwrap_err();
        assert!(matches!(err, AlignmentError::MissingReferenceStream { .. }));
    }

    #[test]
    fn test_non_key_stream_may_stay_null() {
        let log = log(
            vec![reading(0, 60.0), reading(4, 64.0)],
            vec![reading(2, 1.0), reading(3, 2.0)],
        );

        // torque is not a key column, so edge rows survive with nulls.
        let (frame, _) = align_sensor_streams(&log, &config("rpm", &[])).unwrap();

        assert_eq!(frame.num_rows(), 5);
        assert_eq!(frame.column("torque").unwrap()[0], None);
    }
}
