//! Generic pairing of start-class and end-class process events.
//!
//! The matcher walks two chronologically sorted event sequences with a
//! single cursor over the end side: each start claims the earliest
//! not-yet-consumed end that strictly follows it. Starts with no qualifying
//! end are dropped and counted, never an error. When two starts occur with
//! no intervening end, the second claims a later end than intended; that is
//! the established pairing policy for these logs and is preserved as-is.

use chrono::NaiveDateTime;

/// A labeled process event carrying the reading taken at that instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

/// A start event matched to the nearest subsequent end event.
///
/// Invariant: `end.timestamp > start.timestamp`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedPair {
    pub start: Event,
    pub end: Event,
}

/// Pairing result plus counts of events that found no partner.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingOutcome {
    pub pairs: Vec<MatchedPair>,
    pub unmatched_starts: usize,
    pub unmatched_ends: usize,
}

/// Pair each start with the earliest unconsumed end strictly after it.
///
/// Both slices must be sorted chronologically. Each end is consumed by at
/// most one pair, so emitted pairs are non-decreasing in both start and end
/// time.
pub fn pair_events(starts: &[Event], ends: &[Event]) -> PairingOutcome {
    debug_assert!(
        starts.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
        "starts must be sorted chronologically"
    );
    debug_assert!(
        ends.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
        "ends must be sorted chronologically"
    );

    let mut pairs = Vec::with_capacity(starts.len().min(ends.len()));
    let mut unmatched_starts = 0;
    let mut cursor = 0usize;

    for &start in starts {
        while cursor < ends.len() && ends[cursor].timestamp <= start.timestamp {
            cursor += 1;
        }
        match ends.get(cursor) {
            Some(&end) => {
                pairs.push(MatchedPair { start, end });
                cursor += 1;
            }
            None => unmatched_starts += 1,
        }
    }

    let unmatched_ends = ends.len() - pairs.len();
    PairingOutcome {
        pairs,
        unmatched_starts,
        unmatched_ends,
    }
}

/// Classification of a tank level marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMarker {
    /// Centrifuge run start ("aloitus")
    Start,
    /// Centrifuge run end ("lopetus")
    End,
    /// Anything else; discarded by the run extractor
    Unmatched,
}

/// Classify a tank level marker, case-insensitively.
pub fn classify_run_marker(raw: &str) -> RunMarker {
    match raw.trim().to_lowercase().as_str() {
        "aloitus" => RunMarker::Start,
        "lopetus" => RunMarker::End,
        _ => RunMarker::Unmatched,
    }
}

/// Classification of a drying scale marker phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DryingMarker {
    /// Weighing taken before drying
    Wet,
    /// Weighing taken after drying
    Dry,
    /// Anything else; discarded by the drying matcher
    Unmatched,
}

/// Phrases marking a pre-drying weighing. Checked before the dry substring:
/// every wet phrase itself contains "kuiva".
const WET_PHRASES: &[&str] = &["ennen kuivaus", "ennen kuivatus"];

/// Substring marking a post-drying weighing.
const DRY_SUBSTRING: &str = "kuiva";

/// Classify a drying scale marker phrase, case-insensitively.
///
/// Wet phrases take precedence over the broader dry substring.
pub fn classify_drying_marker(raw: &str) -> DryingMarker {
    let lowered = raw.trim().to_lowercase();

    if WET_PHRASES.iter().any(|phrase| lowered.contains(phrase)) {
        return DryingMarker::Wet;
    }
    if lowered.contains(DRY_SUBSTRING) {
        return DryingMarker::Dry;
    }
    DryingMarker::Unmatched
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn minute(m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, m, 0)
            .unwrap()
    }

    fn event(m: u32, value: f64) -> Event {
        Event {
            timestamp: minute(m),
            value,
        }
    }

    #[test]
    fn test_pair_events_alternating() {
        let starts = vec![event(0, 80.0), event(10, 75.0)];
        let ends = vec![event(5, 50.0), event(15, 40.0)];

        let outcome = pair_events(&starts, &ends);

        assert_eq!(outcome.pairs.len(), 2);
        assert_eq!(outcome.pairs[0].end.timestamp, minute(5));
        assert_eq!(outcome.pairs[1].end.timestamp, minute(15));
        assert_eq!(outcome.unmatched_starts, 0);
        assert_eq!(outcome.unmatched_ends, 0);
    }

    #[test]
    fn test_pair_events_end_strictly_after_start() {
        // An end at the same minute as the start does not qualify.
        let starts = vec![event(5, 1.0)];
        let ends = vec![event(5, 2.0), event(6, 3.0)];

        let outcome = pair_events(&starts, &ends);

        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.pairs[0].end.timestamp, minute(6));
        assert_eq!(outcome.unmatched_ends, 1);
    }

    #[test]
    fn test_pair_events_each_end_consumed_once() {
        let starts = vec![event(0, 1.0), event(1, 2.0)];
        let ends = vec![event(5, 3.0)];

        let outcome = pair_events(&starts, &ends);

        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.pairs[0].start.timestamp, minute(0));
        assert_eq!(outcome.unmatched_starts, 1);
    }

    #[test]
    fn test_pair_events_start_without_end_is_dropped() {
        let starts = vec![event(0, 1.0), event(20, 2.0)];
        let ends = vec![event(5, 3.0)];

        let outcome = pair_events(&starts, &ends);

        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.unmatched_starts, 1);
        assert_eq!(outcome.unmatched_ends, 0);
    }

    #[test]
    fn test_pair_events_monotonic_output() {
        let starts = vec![event(0, 0.0), event(2, 0.0), event(8, 0.0)];
        let ends = vec![event(1, 0.0), event(4, 0.0), event(9, 0.0)];

        let outcome = pair_events(&starts, &ends);

        assert_eq!(outcome.pairs.len(), 3);
        for pair in &outcome.pairs {
            assert!(pair.end.timestamp > pair.start.timestamp);
        }
        for w in outcome.pairs.windows(2) {
            assert!(w[0].start.timestamp <= w[1].start.timestamp);
            assert!(w[0].end.timestamp < w[1].end.timestamp);
        }
    }

    #[test]
    fn test_pair_events_empty_inputs() {
        let outcome = pair_events(&[], &[event(1, 0.0)]);
        assert!(outcome.pairs.is_empty());
        assert_eq!(outcome.unmatched_ends, 1);

        let outcome = pair_events(&[event(1, 0.0)], &[]);
        assert!(outcome.pairs.is_empty());
        assert_eq!(outcome.unmatched_starts, 1);
    }

    #[test]
    fn test_classify_run_marker() {
        assert_eq!(classify_run_marker("aloitus"), RunMarker::Start);
        assert_eq!(classify_run_marker("ALOITUS"), RunMarker::Start);
        assert_eq!(classify_run_marker(" Lopetus "), RunMarker::End);
        assert_eq!(classify_run_marker("huolto"), RunMarker::Unmatched);
        assert_eq!(classify_run_marker(""), RunMarker::Unmatched);
    }

    #[test]
    fn test_classify_drying_marker_wet_before_dry() {
        // Wet phrases contain "kuiva"; precedence must keep them wet.
        assert_eq!(classify_drying_marker("ennen kuivausta"), DryingMarker::Wet);
        assert_eq!(classify_drying_marker("Ennen kuivausta"), DryingMarker::Wet);
        assert_eq!(classify_drying_marker("ennen kuivatusta"), DryingMarker::Wet);
        assert_eq!(classify_drying_marker("kuiva"), DryingMarker::Dry);
        assert_eq!(classify_drying_marker("KUIVATTU"), DryingMarker::Dry);
        assert_eq!(classify_drying_marker("punnitus"), DryingMarker::Unmatched);
    }
}
