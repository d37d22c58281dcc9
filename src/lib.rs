//! Centrifuge process log preprocessing pipeline.
//!
//! This crate provides tools for:
//! - Cleaning and aligning irregularly-sampled sensor logs onto a 1-minute grid
//! - Extracting centrifuge run intervals from tank level markers
//! - Matching wet/dry weighings into drying events
//! - Deriving a mass-balance feature table for downstream regression models
//!
//! # Example
//!
//! ```no_run
//! use centrifuge_pipeline::config::PipelineConfig;
//! use centrifuge_pipeline::core::loaders::load_sensor_log;
//! use centrifuge_pipeline::processors::alignment::align_sensor_streams;
//!
//! let config = PipelineConfig::default();
//! let raw = load_sensor_log("sensors.csv", &config.sensors).unwrap();
//! let (frame, report) = align_sensor_streams(&raw, &config.sensors).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{MassBalanceConfig, PipelineConfig, SensorConfig, SolidsConfig, TankConfig};
pub use core::timeseries::{AlignedFrame, MinuteSeries};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
