//! Mass balance and per-run feature assembly.
//!
//! Joins centrifuge runs to drying events by ordinal position, attaches the
//! nearest solids feed concentration, computes the mass balance, and
//! aggregates windowed sensor statistics per run. The ordinal join requires
//! equal run and drying-event counts; a mismatch signals an upstream
//! pipeline-stage inconsistency and is fatal.

use std::ops::Range;

use log::{debug, info};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::core::loaders::SolidsRow;
use crate::core::timeseries::{AlignedFrame, MinuteSeries};
use crate::processors::drying::DryingEvent;
use crate::processors::runs::{feed_liters, CentrifugeRun};

/// Errors that can occur during feature assembly.
#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("{runs} centrifuge runs vs {drying_events} drying events; counts must match for the ordinal join")]
    CountMismatch { runs: usize, drying_events: usize },

    #[error("aligned frame is missing sensor column '{column}'")]
    MissingColumn { column: String },

    #[error("solids concentration series has no valid readings")]
    EmptySolidsSeries,
}

/// Result type for feature assembly.
pub type Result<T> = std::result::Result<T, FeatureError>;

/// Mean and sample standard deviation of one sensor over a run window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowAggregate {
    pub mean: f64,
    pub std: f64,
}

/// One fully assembled feature/target row, run i joined with drying event i.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunFeatureRow {
    pub run: CentrifugeRun,
    pub drying: DryingEvent,

    /// Solids feed concentration nearest to the run start (g/l)
    pub solids_g_per_l: f64,

    pub solids_in_g: f64,
    pub water_in_g: f64,
    pub solids_out_g: f64,
    pub water_out_g: f64,
    pub moisture_lost_g: f64,
    pub water_removed_g: f64,
    pub adjusted_water_removed_g: f64,

    pub feed_rate: WindowAggregate,
    pub drum_speed: WindowAggregate,
    pub diff_speed: WindowAggregate,
    pub torque: WindowAggregate,

    /// Target: water removed per liter fed. Non-finite when feed is zero.
    pub water_efficiency: f64,
    /// Target: solids recovered vs solids fed. Non-finite when solids_in is zero.
    pub solids_loss_ratio: f64,
}

impl RunFeatureRow {
    /// Target: mean torque over the run window.
    #[inline]
    pub fn torque_mean(&self) -> f64 {
        self.torque.mean
    }
}

/// What the feature engine filtered, surfaced to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureReport {
    /// Solids log rows dropped for an invalid timestamp or value
    pub solids_rows_dropped: usize,
    /// Run rows excluded because their window captured no aligned samples
    pub rows_without_window_samples: usize,
}

/// Mean of the non-null cells in a window; NaN when the window holds none.
fn window_mean(cells: &[Option<f64>], window: Range<usize>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for cell in &cells[window] {
        if let Some(v) = cell {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Sample standard deviation (ddof = 1) of the non-null cells in a window;
/// NaN when fewer than two values are present.
fn window_std(cells: &[Option<f64>], window: Range<usize>) -> f64 {
    let mean = window_mean(cells, window.clone());
    if mean.is_nan() {
        return f64::NAN;
    }

    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for cell in &cells[window] {
        if let Some(v) = cell {
            sum_sq += (v - mean) * (v - mean);
            count += 1;
        }
    }
    if count < 2 {
        f64::NAN
    } else {
        (sum_sq / (count - 1) as f64).sqrt()
    }
}

fn aggregate(cells: &[Option<f64>], window: Range<usize>) -> WindowAggregate {
    WindowAggregate {
        mean: window_mean(cells, window.clone()),
        std: window_std(cells, window),
    }
}

/// Build the solids concentration lookup series: drop invalid rows, resample
/// to a 1-minute grid, interpolate interior gaps.
fn solids_series(rows: &[SolidsRow]) -> (MinuteSeries, usize) {
    let mut observations = Vec::with_capacity(rows.len());
    let mut dropped = 0;
    for row in rows {
        match (row.timestamp, row.concentration) {
            (Some(t), Some(v)) => observations.push((t, v)),
            _ => dropped += 1,
        }
    }
    (
        MinuteSeries::from_observations(observations).to_uniform_grid(),
        dropped,
    )
}

/// Assemble the per-run feature/target rows.
///
/// Precondition: `runs.len() == drying.len()` (the ordinal join pairs run i
/// with drying event i). Rows whose window captures no aligned samples are
/// excluded from the output, mirroring an inner join on the run start time.
///
/// # Errors
///
/// Fails on a run/drying count mismatch, a missing aggregate sensor column,
/// or a wholly invalid solids series.
pub fn build_feature_rows(
    runs: &[CentrifugeRun],
    drying: &[DryingEvent],
    solids: &[SolidsRow],
    frame: &AlignedFrame,
    config: &PipelineConfig,
) -> Result<(Vec<RunFeatureRow>, FeatureReport)> {
    if runs.len() != drying.len() {
        return Err(FeatureError::CountMismatch {
            runs: runs.len(),
            drying_events: drying.len(),
        });
    }

    let (solids, solids_rows_dropped) = solids_series(solids);
    if solids.is_empty() {
        return Err(FeatureError::EmptySolidsSeries);
    }

    let resolve = |column: &str| {
        frame.column(column).ok_or_else(|| FeatureError::MissingColumn {
            column: column.to_string(),
        })
    };
    let feed_cells = resolve(&config.sensors.feed_column)?;
    let drum_cells = resolve(&config.sensors.drum_speed_column)?;
    let diff_cells = resolve(&config.sensors.diff_speed_column)?;
    let torque_cells = resolve(&config.sensors.torque_column)?;

    let residual = config.mass_balance.residual_moisture_fraction;
    let mut report = FeatureReport {
        solids_rows_dropped,
        ..FeatureReport::default()
    };
    let mut rows = Vec::with_capacity(runs.len());

    for (run, event) in runs.iter().zip(drying) {
        let window = frame.window(run.start_time, run.end_time);
        if window.is_empty() {
            debug!(
                "run starting {} captured no aligned samples; excluded",
                run.start_time
            );
            report.rows_without_window_samples += 1;
            continue;
        }

        // Recompute the feed volume from the level drop so the row stays
        // consistent even when the runs table was hand-edited on disk.
        let mut run = *run;
        run.feed_liters = feed_liters(
            run.start_fill_pct,
            run.end_fill_pct,
            config.tank.capacity_liters,
        );

        let solids_g_per_l = solids.nearest_value(run.start_time).unwrap_or(f64::NAN);

        let solids_in_g = run.feed_liters * solids_g_per_l;
        let water_in_g = run.feed_liters * 1000.0 - solids_in_g;
        let solids_out_g = event.dry_weight * (1.0 - residual);
        let water_out_g = event.wet_weight - solids_out_g;
        let moisture_lost_g = event.wet_weight - event.dry_weight;
        let water_removed_g = water_in_g - water_out_g;
        let adjusted_water_removed_g = water_removed_g - moisture_lost_g;

        let torque = aggregate(torque_cells, window.clone());

        rows.push(RunFeatureRow {
            run,
            drying: *event,
            solids_g_per_l,
            solids_in_g,
            water_in_g,
            solids_out_g,
            water_out_g,
            moisture_lost_g,
            water_removed_g,
            adjusted_water_removed_g,
            feed_rate: aggregate(feed_cells, window.clone()),
            drum_speed: aggregate(drum_cells, window.clone()),
            diff_speed: aggregate(diff_cells, window),
            torque,
            water_efficiency: (water_in_g - moisture_lost_g) / run.feed_liters,
            solids_loss_ratio: solids_out_g / solids_in_g,
        });
    }

    info!(
        "assembled {} feature rows ({} excluded for empty windows)",
        rows.len(),
        report.rows_without_window_samples
    );

    Ok((rows, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MeasurementColumns, PipelineConfig, SensorConfig};
    use crate::core::timeseries::minute_range;
    use chrono::{NaiveDate, NaiveDateTime};

    fn minute(m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, m, 0)
            .unwrap()
    }

    fn test_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.sensors = SensorConfig {
            measurements: vec![
                MeasurementColumns {
                    time_column: "t".into(),
                    value_column: "feed".into(),
                },
            ],
            reference_column: "drum".into(),
            key_columns: vec![],
            feed_column: "feed".into(),
            drum_speed_column: "drum".into(),
            diff_speed_column: "diff".into(),
            torque_column: "torque".into(),
        };
        config
    }

    fn test_frame(rows: usize) -> AlignedFrame {
        let grid = minute_range(minute(0), minute(rows as u32 - 1));
        let mut frame = AlignedFrame::new(grid);
        frame.push_column("feed", (0..rows).map(|i| Some(2.0 + i as f64)).collect());
        frame.push_column("drum", (0..rows).map(|_| Some(3000.0)).collect());
        frame.push_column("diff", (0..rows).map(|i| Some(10.0 + i as f64)).collect());
        frame.push_column("torque", (0..rows).map(|i| Some(40.0 + i as f64)).collect());
        frame
    }

    fn run(start: u32, end: u32, start_pct: f64, end_pct: f64) -> CentrifugeRun {
        CentrifugeRun {
            start_time: minute(start),
            end_time: minute(end),
            start_fill_pct: start_pct,
            end_fill_pct: end_pct,
            feed_liters: 0.0, // recomputed by the engine
        }
    }

    fn drying_event(wet: u32, dry: u32, wet_weight: f64, dry_weight: f64) -> DryingEvent {
        DryingEvent {
            wet_time: minute(wet),
            dry_time: minute(dry),
            mid_time: minute((wet + dry) / 2),
            wet_weight,
            dry_weight,
            moisture_lost: wet_weight - dry_weight,
        }
    }

    fn solids_rows() -> Vec<SolidsRow> {
        vec![
            SolidsRow {
                timestamp: Some(minute(0)),
                concentration: Some(200.0),
            },
            SolidsRow {
                timestamp: Some(minute(10)),
                concentration: Some(220.0),
            },
        ]
    }

    #[test]
    fn test_count_mismatch_is_fatal() {
        let runs = vec![run(0, 5, 80.0, 50.0), run(6, 9, 80.0, 50.0), run(10, 11, 80.0, 50.0)];
        let drying = vec![drying_event(0, 5, 100.0, 40.0), drying_event(6, 9, 100.0, 40.0)];

        let err = build_feature_rows(&runs, &drying, &solids_rows(), &test_frame(12), &test_config())
            .unwrap_err();

        assert!(matches!(
            err,
            FeatureError::CountMismatch {
                runs: 3,
                drying_events: 2
            }
        ));
    }

    #[test]
    fn test_mass_balance_consistency() {
        let runs = vec![run(0, 5, 80.0, 50.0)];
        let drying = vec![drying_event(0, 5, 100.0, 40.0)];

        let (rows, _) =
            build_feature_rows(&runs, &drying, &solids_rows(), &test_frame(12), &test_config())
                .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        // solids_in + water_in must equal feed_liters x 1000.
        assert!((row.solids_in_g + row.water_in_g - row.run.feed_liters * 1000.0).abs() < 1e-6);
        assert!((row.run.feed_liters - 9_000.0).abs() < 1e-9);
        assert!((row.solids_out_g - 40.0 * 0.92).abs() < 1e-9);
        assert_eq!(row.moisture_lost_g, 60.0);
    }

    #[test]
    fn test_window_aggregates_inclusive_bounds() {
        let runs = vec![run(2, 4, 80.0, 50.0)];
        let drying = vec![drying_event(2, 4, 100.0, 40.0)];

        let (rows, _) =
            build_feature_rows(&runs, &drying, &solids_rows(), &test_frame(12), &test_config())
                .unwrap();

        // feed over minutes 2..=4 is [4, 5, 6].
        assert!((rows[0].feed_rate.mean - 5.0).abs() < 1e-9);
        assert!((rows[0].feed_rate.std - 1.0).abs() < 1e-9);
        assert!((rows[0].torque.mean - 43.0).abs() < 1e-9);
        assert_eq!(rows[0].torque_mean(), rows[0].torque.mean);
    }

    #[test]
    fn test_empty_window_row_excluded() {
        // Second run lies entirely outside the aligned frame.
        let runs = vec![run(0, 3, 80.0, 50.0), run(30, 35, 70.0, 40.0)];
        let drying = vec![drying_event(0, 3, 100.0, 40.0), drying_event(30, 35, 90.0, 30.0)];

        let (rows, report) =
            build_feature_rows(&runs, &drying, &solids_rows(), &test_frame(12), &test_config())
                .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(report.rows_without_window_samples, 1);
    }

    #[test]
    fn test_nearest_solids_at_run_start() {
        let runs = vec![run(9, 11, 80.0, 50.0)];
        let drying = vec![drying_event(9, 11, 100.0, 40.0)];

        let (rows, _) =
            build_feature_rows(&runs, &drying, &solids_rows(), &test_frame(12), &test_config())
                .unwrap();

        // Interpolated solids series at minute 9 is 218 g/l.
        assert!((rows[0].solids_g_per_l - 218.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_feed_yields_non_finite_targets() {
        let runs = vec![run(0, 3, 50.0, 50.0)];
        let drying = vec![drying_event(0, 3, 100.0, 40.0)];

        let (rows, _) =
            build_feature_rows(&runs, &drying, &solids_rows(), &test_frame(12), &test_config())
                .unwrap();

        assert_eq!(rows[0].run.feed_liters, 0.0);
        assert!(!rows[0].water_efficiency.is_finite());
        assert!(!rows[0].solids_loss_ratio.is_finite());
    }

    #[test]
    fn test_empty_solids_series_is_fatal() {
        let runs = vec![run(0, 3, 80.0, 50.0)];
        let drying = vec![drying_event(0, 3, 100.0, 40.0)];
        let solids = vec![SolidsRow {
            timestamp: None,
            concentration: None,
        }];

        let err =
            build_feature_rows(&runs, &drying, &solids, &test_frame(12), &test_config()).unwrap_err();
        assert!(matches!(err, FeatureError::EmptySolidsSeries));
    }

    #[test]
    fn test_missing_aggregate_column_is_fatal() {
        let runs = vec![run(0, 3, 80.0, 50.0)];
        let drying = vec![drying_event(0, 3, 100.0, 40.0)];
        let grid = minute_range(minute(0), minute(3));
        let mut frame = AlignedFrame::new(grid);
        frame.push_column("feed", vec![Some(1.0); 4]);

        let err = build_feature_rows(&runs, &drying, &solids_rows(), &frame, &test_config())
            .unwrap_err();
        assert!(matches!(err, FeatureError::MissingColumn { .. }));
    }

    #[test]
    fn test_single_sample_window_std_is_nan() {
        let runs = vec![run(3, 3, 80.0, 50.0)];
        let drying = vec![drying_event(3, 3, 100.0, 40.0)];

        let (rows, _) =
            build_feature_rows(&runs, &drying, &solids_rows(), &test_frame(12), &test_config())
                .unwrap();

        assert_eq!(rows.len(), 1);
        assert!((rows[0].feed_rate.mean - 5.0).abs() < 1e-9);
        assert!(rows[0].feed_rate.std.is_nan());
    }
}
