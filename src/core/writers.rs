//! Writers for the processed pipeline tables.
//!
//! All outputs are comma-delimited, dot-decimal tables with timestamps
//! formatted as `YYYY-MM-DD HH:MM:SS`, so the downstream model-training
//! consumer reads one uniform format regardless of the locale conventions of
//! the raw inputs.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use chrono::NaiveDateTime;
use thiserror::Error;

use super::timeseries::AlignedFrame;
use crate::processors::drying::DryingEvent;
use crate::processors::features::RunFeatureRow;
use crate::processors::runs::CentrifugeRun;

/// Timestamp format used in every emitted table.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Header of the aligned grid's index column.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Feature table (X) column headers, in emission order.
pub const FEATURE_COLUMNS: &[&str] = &[
    "feed_rate_mean",
    "feed_rate_std",
    "drum_speed_mean",
    "drum_speed_std",
    "diff_speed_mean",
    "diff_speed_std",
    "solids_g_per_l",
    "torque_pct_mean",
    "torque_pct_std",
];

/// Target table (y) column headers, in emission order.
pub const TARGET_COLUMNS: &[&str] = &["water_efficiency", "solids_loss_ratio", "torque_mean"];

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a CSV writer over a buffered file.
fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::Writer::from_writer(BufWriter::new(file)))
}

fn csv_error(path: &Path, source: csv::Error) -> WriteError {
    WriteError::CsvError {
        path: path.display().to_string(),
        source,
    }
}

fn format_timestamp(t: NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Format a float; NaN becomes an empty cell, infinities keep their sign.
fn format_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

/// Write the aligned sensor grid, timestamp-indexed.
///
/// Null cells (streams without data to interpolate from) are written as
/// empty fields.
pub fn write_aligned_csv(path: &Path, frame: &AlignedFrame) -> Result<()> {
    let mut writer = create_csv_writer(path)?;

    let mut header = Vec::with_capacity(frame.column_names().len() + 1);
    header.push(TIMESTAMP_COLUMN.to_string());
    header.extend(frame.column_names().iter().cloned());
    writer
        .write_record(&header)
        .map_err(|e| csv_error(path, e))?;

    let columns: Vec<&[Option<f64>]> = frame
        .column_names()
        .iter()
        .filter_map(|name| frame.column(name))
        .collect();

    for (row, &t) in frame.index().iter().enumerate() {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(format_timestamp(t));
        for cells in &columns {
            record.push(match cells[row] {
                Some(v) => format_value(v),
                None => String::new(),
            });
        }
        writer
            .write_record(&record)
            .map_err(|e| csv_error(path, e))?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

/// Write the centrifuge runs table.
pub fn write_runs_csv(path: &Path, runs: &[CentrifugeRun]) -> Result<()> {
    let mut writer = create_csv_writer(path)?;

    writer
        .write_record([
            "start_time",
            "end_time",
            "start_fill_pct",
            "end_fill_pct",
            "feed_liters",
        ])
        .map_err(|e| csv_error(path, e))?;

    for run in runs {
        writer
            .write_record(&[
                format_timestamp(run.start_time),
                format_timestamp(run.end_time),
                format_value(run.start_fill_pct),
                format_value(run.end_fill_pct),
                format_value(run.feed_liters),
            ])
            .map_err(|e| csv_error(path, e))?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

/// Write the drying events table.
pub fn write_drying_csv(path: &Path, events: &[DryingEvent]) -> Result<()> {
    let mut writer = create_csv_writer(path)?;

    writer
        .write_record([
            "wet_time",
            "dry_time",
            "mid_time",
            "wet_weight",
            "dry_weight",
            "moisture_lost",
        ])
        .map_err(|e| csv_error(path, e))?;

    for event in events {
        writer
            .write_record(&[
                format_timestamp(event.wet_time),
                format_timestamp(event.dry_time),
                format_timestamp(event.mid_time),
                format_value(event.wet_weight),
                format_value(event.dry_weight),
                format_value(event.moisture_lost),
            ])
            .map_err(|e| csv_error(path, e))?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

fn full_table_record(row: &RunFeatureRow) -> Vec<String> {
    vec![
        format_timestamp(row.drying.wet_time),
        format_timestamp(row.drying.dry_time),
        format_timestamp(row.drying.mid_time),
        format_value(row.drying.wet_weight),
        format_value(row.drying.dry_weight),
        format_value(row.drying.moisture_lost),
        format_timestamp(row.run.start_time),
        format_timestamp(row.run.end_time),
        format_value(row.run.start_fill_pct),
        format_value(row.run.end_fill_pct),
        format_value(row.run.feed_liters),
        format_value(row.solids_g_per_l),
        format_value(row.solids_in_g),
        format_value(row.water_in_g),
        format_value(row.solids_out_g),
        format_value(row.water_out_g),
        format_value(row.moisture_lost_g),
        format_value(row.water_removed_g),
        format_value(row.adjusted_water_removed_g),
        format_value(row.feed_rate.mean),
        format_value(row.feed_rate.std),
        format_value(row.drum_speed.mean),
        format_value(row.drum_speed.std),
        format_value(row.diff_speed.mean),
        format_value(row.diff_speed.std),
        format_value(row.torque.mean),
        format_value(row.torque.std),
        format_value(row.water_efficiency),
        format_value(row.solids_loss_ratio),
        format_value(row.torque_mean()),
    ]
}

const FULL_TABLE_HEADER: &[&str] = &[
    "wet_time",
    "dry_time",
    "mid_time",
    "wet_weight",
    "dry_weight",
    "moisture_lost",
    "start_time",
    "end_time",
    "start_fill_pct",
    "end_fill_pct",
    "feed_liters",
    "solids_g_per_l",
    "solids_in_g",
    "water_in_g",
    "solids_out_g",
    "water_out_g",
    "moisture_lost_g",
    "water_removed_g",
    "adjusted_water_removed_g",
    "feed_rate_mean",
    "feed_rate_std",
    "drum_speed_mean",
    "drum_speed_std",
    "diff_speed_mean",
    "diff_speed_std",
    "torque_pct_mean",
    "torque_pct_std",
    "water_efficiency",
    "solids_loss_ratio",
    "torque_mean",
];

/// Write the full joined feature+target table.
pub fn write_full_table(path: &Path, rows: &[RunFeatureRow]) -> Result<()> {
    let mut writer = create_csv_writer(path)?;

    writer
        .write_record(FULL_TABLE_HEADER)
        .map_err(|e| csv_error(path, e))?;
    for row in rows {
        writer
            .write_record(&full_table_record(row))
            .map_err(|e| csv_error(path, e))?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

/// Write the 9-column feature (X) table.
pub fn write_feature_table(path: &Path, rows: &[RunFeatureRow]) -> Result<()> {
    let mut writer = create_csv_writer(path)?;

    writer
        .write_record(FEATURE_COLUMNS)
        .map_err(|e| csv_error(path, e))?;
    for row in rows {
        writer
            .write_record(&[
                format_value(row.feed_rate.mean),
                format_value(row.feed_rate.std),
                format_value(row.drum_speed.mean),
                format_value(row.drum_speed.std),
                format_value(row.diff_speed.mean),
                format_value(row.diff_speed.std),
                format_value(row.solids_g_per_l),
                format_value(row.torque.mean),
                format_value(row.torque.std),
            ])
            .map_err(|e| csv_error(path, e))?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

/// Write the 3-column target (y) table.
pub fn write_target_table(path: &Path, rows: &[RunFeatureRow]) -> Result<()> {
    let mut writer = create_csv_writer(path)?;

    writer
        .write_record(TARGET_COLUMNS)
        .map_err(|e| csv_error(path, e))?;
    for row in rows {
        writer
            .write_record(&[
                format_value(row.water_efficiency),
                format_value(row.solids_loss_ratio),
                format_value(row.torque_mean()),
            ])
            .map_err(|e| csv_error(path, e))?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}
