//! Pipeline stage modules.

pub mod alignment;
pub mod drying;
pub mod features;
pub mod pairing;
pub mod runs;

// Re-export key types for convenience
pub use alignment::{align_sensor_streams, AlignmentError, AlignmentReport};
pub use drying::{match_drying_pairs, DryingEvent, DryingExtraction};
pub use features::{build_feature_rows, FeatureError, FeatureReport, RunFeatureRow};
pub use pairing::{
    classify_drying_marker, classify_run_marker, pair_events, DryingMarker, Event, MatchedPair,
    PairingOutcome, RunMarker,
};
pub use runs::{extract_runs, CentrifugeRun, RunExtraction};
