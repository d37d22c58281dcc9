//! Minute-resolution time series containers and interpolation.
//!
//! This module provides the two temporal building blocks of the pipeline:
//! - `MinuteSeries`: one cleaned sensor stream, minute-floored with
//!   same-minute duplicates averaged
//! - `AlignedFrame`: several streams sampled on a single shared 1-minute grid

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime, Timelike};

/// Floor a timestamp to the start of its minute.
pub fn floor_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// Build an inclusive 1-minute grid spanning [start, end].
///
/// Both endpoints are floored to the minute first. Returns an empty vector
/// if end precedes start.
pub fn minute_range(start: NaiveDateTime, end: NaiveDateTime) -> Vec<NaiveDateTime> {
    let start = floor_to_minute(start);
    let end = floor_to_minute(end);

    if end < start {
        return Vec::new();
    }

    let minutes = (end - start).num_minutes() as usize;
    let mut grid = Vec::with_capacity(minutes + 1);
    let mut t = start;
    while t <= end {
        grid.push(t);
        t += Duration::minutes(1);
    }
    grid
}

/// One cleaned sensor stream at minute resolution.
///
/// Timestamps are strictly increasing and minute-floored; readings that fell
/// into the same minute have been averaged.
#[derive(Debug, Clone, PartialEq)]
pub struct MinuteSeries {
    timestamps: Vec<NaiveDateTime>,
    values: Vec<f64>,
}

impl MinuteSeries {
    /// Build a series from raw (timestamp, value) observations.
    ///
    /// Timestamps are floored to the minute and duplicate minutes averaged.
    /// The result is sorted chronologically. Validity filtering (dropping
    /// negative or unparseable readings) is the caller's responsibility.
    pub fn from_observations<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDateTime, f64)>,
    {
        let mut buckets: BTreeMap<NaiveDateTime, (f64, usize)> = BTreeMap::new();
        for (t, v) in observations {
            let entry = buckets.entry(floor_to_minute(t)).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }

        let mut timestamps = Vec::with_capacity(buckets.len());
        let mut values = Vec::with_capacity(buckets.len());
        for (t, (sum, count)) in buckets {
            timestamps.push(t);
            values.push(sum / count as f64);
        }

        Self { timestamps, values }
    }

    /// Returns the number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Returns true if the series has no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// First (earliest) timestamp, if any.
    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.first().copied()
    }

    /// Last (latest) timestamp, if any.
    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.last().copied()
    }

    /// Sample timestamps, sorted ascending.
    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// Sample values, parallel to `timestamps()`.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Sample the series at every point of a sorted grid.
    ///
    /// Grid points between two known samples are filled by time-weighted
    /// linear interpolation; points outside the series' own domain are `None`
    /// (never extrapolated). A grid point coinciding with a known sample
    /// yields that sample exactly.
    pub fn sample_on_grid(&self, grid: &[NaiveDateTime]) -> Vec<Option<f64>> {
        let mut out = Vec::with_capacity(grid.len());

        if self.is_empty() {
            out.resize(grid.len(), None);
            return out;
        }

        let first = self.timestamps[0];
        let last = self.timestamps[self.len() - 1];

        // Cursor over the series; grid is sorted so it only moves forward.
        let mut i = 0usize;
        for &t in grid {
            if t < first || t > last {
                out.push(None);
                continue;
            }

            while i + 1 < self.len() && self.timestamps[i + 1] <= t {
                i += 1;
            }

            if self.timestamps[i] == t {
                out.push(Some(self.values[i]));
            } else {
                let t0 = self.timestamps[i];
                let t1 = self.timestamps[i + 1];
                let v0 = self.values[i];
                let v1 = self.values[i + 1];
                let span = (t1 - t0).num_seconds() as f64;
                let elapsed = (t - t0).num_seconds() as f64;
                out.push(Some(v0 + (v1 - v0) * (elapsed / span)));
            }
        }

        out
    }

    /// Resample onto a contiguous 1-minute grid over the series' own domain,
    /// interpolating interior gaps.
    ///
    /// Returns an empty series if this series is empty. Every grid point lies
    /// inside the domain, so the result has no gaps.
    pub fn to_uniform_grid(&self) -> MinuteSeries {
        let (first, last) = match (self.first_timestamp(), self.last_timestamp()) {
            (Some(f), Some(l)) => (f, l),
            _ => return MinuteSeries::from_observations(std::iter::empty()),
        };

        let grid = minute_range(first, last);
        let sampled = self.sample_on_grid(&grid);

        let mut timestamps = Vec::with_capacity(grid.len());
        let mut values = Vec::with_capacity(grid.len());
        for (t, v) in grid.into_iter().zip(sampled) {
            if let Some(v) = v {
                timestamps.push(t);
                values.push(v);
            }
        }

        MinuteSeries { timestamps, values }
    }

    /// Value of the sample nearest in time to `t`.
    ///
    /// Returns `None` only for an empty series. Ties break toward the
    /// earlier sample.
    pub fn nearest_value(&self, t: NaiveDateTime) -> Option<f64> {
        if self.is_empty() {
            return None;
        }

        let idx = self.timestamps.partition_point(|&ts| ts < t);
        if idx == 0 {
            return Some(self.values[0]);
        }
        if idx == self.len() {
            return Some(self.values[self.len() - 1]);
        }

        let before = (t - self.timestamps[idx - 1]).num_seconds();
        let after = (self.timestamps[idx] - t).num_seconds();
        if before <= after {
            Some(self.values[idx - 1])
        } else {
            Some(self.values[idx])
        }
    }
}

/// Several streams sampled on one shared, contiguous 1-minute grid.
///
/// Columns are stored column-major; a `None` cell means the stream had no
/// data to interpolate from at that grid point.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFrame {
    index: Vec<NaiveDateTime>,
    columns: Vec<String>,
    values: Vec<Vec<Option<f64>>>,
}

impl AlignedFrame {
    /// Create an empty frame over the given grid.
    pub fn new(index: Vec<NaiveDateTime>) -> Self {
        Self {
            index,
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Append a named column. Its length must match the grid.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        debug_assert_eq!(
            values.len(),
            self.index.len(),
            "column length must match grid length"
        );
        self.columns.push(name.into());
        self.values.push(values);
    }

    /// Returns the number of rows (grid points).
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    /// Returns true if the frame has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The shared timestamp index.
    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    /// Column names, in insertion order.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Cells of a named column, or `None` if no such column exists.
    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.values[i].as_slice())
    }

    /// Keep only rows where every listed column is non-null.
    ///
    /// Returns the number of rows dropped. Unknown column names are ignored.
    pub fn drop_rows_with_null(&mut self, required_columns: &[String]) -> usize {
        let required: Vec<usize> = required_columns
            .iter()
            .filter_map(|name| self.columns.iter().position(|c| c == name))
            .collect();

        let keep: Vec<bool> = (0..self.num_rows())
            .map(|row| required.iter().all(|&col| self.values[col][row].is_some()))
            .collect();

        let dropped = keep.iter().filter(|&&k| !k).count();
        if dropped == 0 {
            return 0;
        }

        let mut row = 0;
        self.index.retain(|_| {
            let kept = keep[row];
            row += 1;
            kept
        });
        for column in &mut self.values {
            let mut row = 0;
            column.retain(|_| {
                let kept = keep[row];
                row += 1;
                kept
            });
        }

        dropped
    }

    /// Index range of rows with `start <= timestamp <= end` (inclusive).
    pub fn window(&self, start: NaiveDateTime, end: NaiveDateTime) -> std::ops::Range<usize> {
        let lo = self.index.partition_point(|&t| t < start);
        let hi = self.index.partition_point(|&t| t <= end);
        lo..hi.max(lo)
    }
}
