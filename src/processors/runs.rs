//! Extraction of centrifuge run intervals from the wash tank level log.

use chrono::NaiveDateTime;
use log::info;

use crate::config::TankConfig;
use crate::core::loaders::TankRow;
use crate::processors::pairing::{classify_run_marker, pair_events, Event, RunMarker};

/// One centrifuge operating cycle, bounded by start/end tank markers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentrifugeRun {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub start_fill_pct: f64,
    pub end_fill_pct: f64,
    /// Volume fed to the centrifuge, from the level drop. Negative when the
    /// level rose during the run; kept as a data anomaly signal.
    pub feed_liters: f64,
}

/// Run extraction result plus counts of everything filtered on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct RunExtraction {
    pub runs: Vec<CentrifugeRun>,
    /// Rows with an invalid timestamp, an invalid level, or an unknown marker
    pub discarded_rows: usize,
    pub unmatched_starts: usize,
    pub unmatched_ends: usize,
}

/// Compute feed volume from a tank level drop.
pub fn feed_liters(start_fill_pct: f64, end_fill_pct: f64, capacity_liters: f64) -> f64 {
    (start_fill_pct - end_fill_pct) / 100.0 * capacity_liters
}

/// Convert tank level rows into discrete centrifuge runs.
///
/// Rows are classified by marker, split into start/end event sequences,
/// paired, and each pair's feed volume derived from the level drop and the
/// configured tank capacity.
pub fn extract_runs(rows: &[TankRow], config: &TankConfig) -> RunExtraction {
    let mut starts = Vec::new();
    let mut ends = Vec::new();
    let mut discarded_rows = 0;

    for row in rows {
        let (timestamp, fill_pct) = match (row.timestamp, row.fill_pct) {
            (Some(t), Some(v)) => (t, v),
            _ => {
                discarded_rows += 1;
                continue;
            }
        };
        let event = Event {
            timestamp,
            value: fill_pct,
        };
        match classify_run_marker(&row.marker) {
            RunMarker::Start => starts.push(event),
            RunMarker::End => ends.push(event),
            RunMarker::Unmatched => discarded_rows += 1,
        }
    }

    starts.sort_by_key(|e| e.timestamp);
    ends.sort_by_key(|e| e.timestamp);

    let outcome = pair_events(&starts, &ends);
    let runs: Vec<CentrifugeRun> = outcome
        .pairs
        .iter()
        .map(|pair| CentrifugeRun {
            start_time: pair.start.timestamp,
            end_time: pair.end.timestamp,
            start_fill_pct: pair.start.value,
            end_fill_pct: pair.end.value,
            feed_liters: feed_liters(pair.start.value, pair.end.value, config.capacity_liters),
        })
        .collect();

    info!(
        "extracted {} runs ({} rows discarded, {} starts and {} ends unmatched)",
        runs.len(),
        discarded_rows,
        outcome.unmatched_starts,
        outcome.unmatched_ends
    );

    RunExtraction {
        runs,
        discarded_rows,
        unmatched_starts: outcome.unmatched_starts,
        unmatched_ends: outcome.unmatched_ends,
    }
}
