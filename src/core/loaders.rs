//! Loaders for the raw, locale-formatted process logs.
//!
//! This module provides parsers for:
//! - The multi-stream sensor log (semicolon-delimited, comma decimals)
//! - The wash tank level log with start/end markers
//! - The drying scale log (delimiter auto-detected)
//! - The solids feed concentration log
//!
//! All timestamps are day-first local instants; all numerics may use a comma
//! as the decimal separator. Unparseable cells are surfaced as `None` so the
//! pipeline stages can filter and count them.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use thiserror::Error;

use crate::config::{SensorConfig, SolidsConfig, TankConfig};
use crate::core::timeseries::AlignedFrame;
use crate::processors::drying::DryingEvent;
use crate::processors::runs::CentrifugeRun;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Timestamp formats accepted for day-first parsing, tried in order.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Date-only formats; parsed as midnight.
const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// Parse a day-first local timestamp, or `None` if no known format matches.
pub fn parse_day_first_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in TIMESTAMP_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(t);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, format) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parse a numeric cell that may use a comma as the decimal separator.
pub fn parse_locale_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.replace(',', ".").parse().ok()
}

/// Strip a UTF-8 BOM and surrounding whitespace from a header cell.
fn clean_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_string()
}

/// Map cleaned header names to their column indices.
fn header_index(headers: &csv::StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, name)| (clean_header(name), i))
        .collect()
}

/// Detect the field delimiter of a delimited text file.
///
/// Counts candidate delimiters in the first line, preferring semicolon and
/// tab over comma since the comma doubles as the decimal separator in these
/// logs. Falls back to comma.
pub fn detect_delimiter<P: AsRef<Path>>(path: P) -> Result<u8> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    let mut first_line = String::new();
    reader.read_line(&mut first_line)?;

    if first_line.is_empty() {
        return Err(LoaderError::EmptyFile(path.as_ref().to_path_buf()));
    }

    for delimiter in [b';', b'\t'] {
        if first_line.bytes().any(|b| b == delimiter) {
            return Ok(delimiter);
        }
    }
    Ok(b',')
}

/// One raw reading of a single stream; `None` marks an unparseable cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub timestamp: Option<NaiveDateTime>,
    pub value: Option<f64>,
}

/// All raw readings of one sensor stream, in file order.
#[derive(Debug, Clone)]
pub struct RawStream {
    /// Value column header this stream was read from.
    pub value_column: String,
    pub rows: Vec<RawReading>,
}

/// The raw sensor log: one `RawStream` per configured measurement pair.
#[derive(Debug, Clone)]
pub struct RawStreamLog {
    pub streams: Vec<RawStream>,
}

/// Load the multi-stream sensor log.
///
/// The file is semicolon-delimited with one independent (timestamp, value)
/// column pair per stream, as listed in `config.measurements`. Cells that
/// fail to parse are kept as `None`; filtering happens during alignment.
///
/// # Errors
///
/// Returns an error if the file cannot be read or any configured column is
/// missing from the header.
pub fn load_sensor_log<P: AsRef<Path>>(path: P, config: &SensorConfig) -> Result<RawStreamLog> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = header_index(reader.headers()?);

    // Resolve every configured column pair up front.
    let mut column_pairs = Vec::with_capacity(config.measurements.len());
    let mut missing = Vec::new();
    for measurement in &config.measurements {
        let time_idx = headers.get(&measurement.time_column).copied();
        let value_idx = headers.get(&measurement.value_column).copied();
        match (time_idx, value_idx) {
            (Some(t), Some(v)) => column_pairs.push((t, v)),
            _ => {
                if time_idx.is_none() {
                    missing.push(measurement.time_column.clone());
                }
                if value_idx.is_none() {
                    missing.push(measurement.value_column.clone());
                }
            }
        }
    }
    if !missing.is_empty() {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    }

    let mut streams: Vec<RawStream> = config
        .measurements
        .iter()
        .map(|m| RawStream {
            value_column: m.value_column.clone(),
            rows: Vec::new(),
        })
        .collect();

    for result in reader.records() {
        let record = result?;
        for (stream, &(time_idx, value_idx)) in streams.iter_mut().zip(&column_pairs) {
            let timestamp = record.get(time_idx).and_then(parse_day_first_timestamp);
            let value = record.get(value_idx).and_then(parse_locale_number);
            stream.rows.push(RawReading { timestamp, value });
        }
    }

    if streams.iter().all(|s| s.rows.is_empty()) {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(RawStreamLog { streams })
}

/// One row of the wash tank level log.
#[derive(Debug, Clone, PartialEq)]
pub struct TankRow {
    pub timestamp: Option<NaiveDateTime>,
    pub fill_pct: Option<f64>,
    pub marker: String,
}

/// Load the wash tank level log (semicolon-delimited).
///
/// # Errors
///
/// Returns an error if the file cannot be read or a configured column is
/// missing from the header.
pub fn load_tank_log<P: AsRef<Path>>(path: P, config: &TankConfig) -> Result<Vec<TankRow>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = header_index(reader.headers()?);
    let time_idx = resolve_column(&headers, &config.time_column)?;
    let level_idx = resolve_column(&headers, &config.level_column)?;
    let marker_idx = resolve_column(&headers, &config.marker_column)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(TankRow {
            timestamp: record.get(time_idx).and_then(parse_day_first_timestamp),
            fill_pct: record.get(level_idx).and_then(parse_locale_number),
            marker: record.get(marker_idx).unwrap_or_default().trim().to_string(),
        });
    }

    if rows.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(rows)
}

/// One row of the drying scale log.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleRow {
    pub timestamp: Option<NaiveDateTime>,
    pub weight: Option<f64>,
    pub quality: String,
    pub marker: String,
}

/// Load the drying scale log.
///
/// The delimiter is auto-detected. Columns are positional: timestamp,
/// weight, quality flag, drying marker phrase. A UTF-8 BOM on the first
/// header is tolerated.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is empty, or has fewer than
/// four columns.
pub fn load_scale_log<P: AsRef<Path>>(path: P) -> Result<Vec<ScaleRow>> {
    let path = path.as_ref();
    let delimiter = detect_delimiter(path)?;

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    if reader.headers()?.len() < 4 {
        return Err(LoaderError::MissingColumns(
            "expected 4 columns: timestamp, weight, quality, marker".to_string(),
        ));
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.len() < 4 {
            continue;
        }
        rows.push(ScaleRow {
            timestamp: record.get(0).and_then(parse_day_first_timestamp),
            weight: record.get(1).and_then(parse_locale_number),
            quality: record.get(2).unwrap_or_default().trim().to_string(),
            marker: record.get(3).unwrap_or_default().trim().to_string(),
        });
    }

    if rows.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(rows)
}

/// One row of the solids feed concentration log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolidsRow {
    pub timestamp: Option<NaiveDateTime>,
    pub concentration: Option<f64>,
}

/// Load the solids feed concentration log (semicolon-delimited).
///
/// # Errors
///
/// Returns an error if the file cannot be read or a configured column is
/// missing from the header.
pub fn load_solids_log<P: AsRef<Path>>(path: P, config: &SolidsConfig) -> Result<Vec<SolidsRow>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = header_index(reader.headers()?);
    let time_idx = resolve_column(&headers, &config.time_column)?;
    let value_idx = resolve_column(&headers, &config.value_column)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(SolidsRow {
            timestamp: record.get(time_idx).and_then(parse_day_first_timestamp),
            concentration: record.get(value_idx).and_then(parse_locale_number),
        });
    }

    if rows.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(rows)
}

/// Read one numeric column from a comma-delimited processed table.
///
/// Unparseable cells are skipped. Used by the visualization command.
pub fn read_numeric_column<P: AsRef<Path>>(path: P, column: &str) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = header_index(reader.headers()?);
    let idx = resolve_column(&headers, column)?;

    let mut values = Vec::new();
    for result in reader.records() {
        let record = result?;
        if let Some(v) = record.get(idx).and_then(parse_locale_number) {
            if v.is_finite() {
                values.push(v);
            }
        }
    }

    Ok(values)
}

fn resolve_column(headers: &HashMap<String, usize>, name: &str) -> Result<usize> {
    headers
        .get(name)
        .copied()
        .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
}

/// Read back an aligned grid written by `writers::write_aligned_csv`.
///
/// Rows with an unparseable timestamp are skipped; empty cells become nulls.
pub fn read_aligned_csv<P: AsRef<Path>>(path: P) -> Result<AlignedFrame> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader.headers()?.iter().map(clean_header).collect();
    if headers.first().map(String::as_str) != Some("timestamp") {
        return Err(LoaderError::MissingColumns("timestamp".to_string()));
    }
    let column_names: Vec<String> = headers[1..].to_vec();

    let mut index = Vec::new();
    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::new(); column_names.len()];
    for result in reader.records() {
        let record = result?;
        let timestamp = match record.get(0).and_then(parse_day_first_timestamp) {
            Some(t) => t,
            None => continue,
        };
        index.push(timestamp);
        for (i, column) in columns.iter_mut().enumerate() {
            column.push(record.get(i + 1).and_then(parse_locale_number));
        }
    }

    let mut frame = AlignedFrame::new(index);
    for (name, cells) in column_names.into_iter().zip(columns) {
        frame.push_column(name, cells);
    }
    Ok(frame)
}

/// Read back a runs table written by `writers::write_runs_csv`.
pub fn read_runs_csv<P: AsRef<Path>>(path: P) -> Result<Vec<CentrifugeRun>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = header_index(reader.headers()?);
    let start_idx = resolve_column(&headers, "start_time")?;
    let end_idx = resolve_column(&headers, "end_time")?;
    let start_pct_idx = resolve_column(&headers, "start_fill_pct")?;
    let end_pct_idx = resolve_column(&headers, "end_fill_pct")?;
    let feed_idx = resolve_column(&headers, "feed_liters")?;

    let mut runs = Vec::new();
    for result in reader.records() {
        let record = result?;
        let fields = (
            record.get(start_idx).and_then(parse_day_first_timestamp),
            record.get(end_idx).and_then(parse_day_first_timestamp),
            record.get(start_pct_idx).and_then(parse_locale_number),
            record.get(end_pct_idx).and_then(parse_locale_number),
            record.get(feed_idx).and_then(parse_locale_number),
        );
        if let (Some(start_time), Some(end_time), Some(start_fill_pct), Some(end_fill_pct), Some(feed_liters)) =
            fields
        {
            runs.push(CentrifugeRun {
                start_time,
                end_time,
                start_fill_pct,
                end_fill_pct,
                feed_liters,
            });
        }
    }

    Ok(runs)
}

/// Read back a drying events table written by `writers::write_drying_csv`.
pub fn read_drying_csv<P: AsRef<Path>>(path: P) -> Result<Vec<DryingEvent>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = header_index(reader.headers()?);
    let wet_idx = resolve_column(&headers, "wet_time")?;
    let dry_idx = resolve_column(&headers, "dry_time")?;
    let mid_idx = resolve_column(&headers, "mid_time")?;
    let wet_weight_idx = resolve_column(&headers, "wet_weight")?;
    let dry_weight_idx = resolve_column(&headers, "dry_weight")?;
    let lost_idx = resolve_column(&headers, "moisture_lost")?;

    let mut events = Vec::new();
    for result in reader.records() {
        let record = result?;
        let fields = (
            record.get(wet_idx).and_then(parse_day_first_timestamp),
            record.get(dry_idx).and_then(parse_day_first_timestamp),
            record.get(mid_idx).and_then(parse_day_first_timestamp),
            record.get(wet_weight_idx).and_then(parse_locale_number),
            record.get(dry_weight_idx).and_then(parse_locale_number),
            record.get(lost_idx).and_then(parse_locale_number),
        );
        if let (Some(wet_time), Some(dry_time), Some(mid_time), Some(wet_weight), Some(dry_weight), Some(moisture_lost)) =
            fields
        {
            events.push(DryingEvent {
                wet_time,
                dry_time,
                mid_time,
                wet_weight,
                dry_weight,
                moisture_lost,
            });
        }
    }

    Ok(events)
}
