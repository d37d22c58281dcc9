//! Matching of wet/dry weighings into drying events.

use chrono::{Duration, NaiveDateTime};
use log::info;

use crate::core::loaders::ScaleRow;
use crate::processors::pairing::{classify_drying_marker, pair_events, DryingMarker, Event};

/// One drying cycle bracketed by a wet and a dry weighing.
///
/// Invariant: `moisture_lost > 0`; non-positive pairs are filtered out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DryingEvent {
    pub wet_time: NaiveDateTime,
    pub dry_time: NaiveDateTime,
    /// Midpoint of the drying interval
    pub mid_time: NaiveDateTime,
    pub wet_weight: f64,
    pub dry_weight: f64,
    pub moisture_lost: f64,
}

/// Drying extraction result plus counts of everything filtered on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct DryingExtraction {
    pub events: Vec<DryingEvent>,
    /// Rows with an invalid timestamp, an invalid weight, or an unknown marker
    pub discarded_rows: usize,
    pub unmatched_wet: usize,
    pub unmatched_dry: usize,
    /// Matched pairs rejected because no weight was lost
    pub non_positive_losses: usize,
}

/// Midpoint of [wet, dry] at second resolution.
fn midpoint(wet: NaiveDateTime, dry: NaiveDateTime) -> NaiveDateTime {
    wet + Duration::seconds((dry - wet).num_seconds() / 2)
}

/// Convert scale rows into wet -> dry drying events.
///
/// Rows are classified by marker phrase (wet phrases take precedence over
/// the broader dry substring), paired chronologically, and pairs with a
/// non-positive weight loss are filtered out.
pub fn match_drying_pairs(rows: &[ScaleRow]) -> DryingExtraction {
    let mut wet = Vec::new();
    let mut dry = Vec::new();
    let mut discarded_rows = 0;

    for row in rows {
        let (timestamp, weight) = match (row.timestamp, row.weight) {
            (Some(t), Some(w)) => (t, w),
            _ => {
                discarded_rows += 1;
                continue;
            }
        };
        let event = Event {
            timestamp,
            value: weight,
        };
        match classify_drying_marker(&row.marker) {
            DryingMarker::Wet => wet.push(event),
            DryingMarker::Dry => dry.push(event),
            DryingMarker::Unmatched => discarded_rows += 1,
        }
    }

    wet.sort_by_key(|e| e.timestamp);
    dry.sort_by_key(|e| e.timestamp);

    let outcome = pair_events(&wet, &dry);

    let mut events = Vec::with_capacity(outcome.pairs.len());
    let mut non_positive_losses = 0;
    for pair in &outcome.pairs {
        let moisture_lost = pair.start.value - pair.end.value;
        if moisture_lost <= 0.0 {
            non_positive_losses += 1;
            continue;
        }
        events.push(DryingEvent {
            wet_time: pair.start.timestamp,
            dry_time: pair.end.timestamp,
            mid_time: midpoint(pair.start.timestamp, pair.end.timestamp),
            wet_weight: pair.start.value,
            dry_weight: pair.end.value,
            moisture_lost,
        });
    }

    info!(
        "matched {} drying events ({} rows discarded, {} non-positive losses filtered)",
        events.len(),
        discarded_rows,
        non_positive_losses
    );

    DryingExtraction {
        events,
        discarded_rows,
        unmatched_wet: outcome.unmatched_starts,
        unmatched_dry: outcome.unmatched_ends,
        non_positive_losses,
    }
}
