//! Core data types and I/O operations.

pub mod loaders;
pub mod timeseries;
pub mod writers;

pub use loaders::{LoaderError, RawStreamLog, ScaleRow, SolidsRow, TankRow};
pub use timeseries::{AlignedFrame, MinuteSeries};
pub use writers::{write_aligned_csv, write_drying_csv, write_runs_csv, WriteError};
