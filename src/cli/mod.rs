//! Command-line interface for the centrifuge pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::core::{loaders, writers};
use crate::processors::{alignment, drying, features, runs};
use crate::visualization;

/// Default raw input file names, as produced by the plant historian export.
const SENSOR_LOG_FILE: &str = "Linkous_data_fixed.csv";
const SCALE_LOG_FILE: &str = "Kuivain.csv";
const TANK_LOG_FILE: &str = "pesusailio_pinta.csv";
const SOLIDS_LOG_FILE: &str = "Syote ja tuote.csv";

/// Default processed artifact file names.
const ALIGNED_FILE: &str = "cleaned_centrifuge_data.csv";
const DRYING_FILE: &str = "drying_events.csv";
const RUNS_FILE: &str = "centrifuge_runs.csv";
const EFFICIENCY_FILE: &str = "centrifuge_efficiency_final.csv";
const FEATURES_FILE: &str = "X_features_for_ml.csv";
const TARGETS_FILE: &str = "y_targets_for_ml.csv";
const DATASET_FILE: &str = "ml_ready_full_dataset.csv";

#[derive(Parser)]
#[command(name = "centrifuge-pipeline")]
#[command(about = "Centrifuge sensor log preprocessing pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean and align the sensor log onto a 1-minute grid
    CleanSensors {
        /// Raw sensor log (semicolon-delimited)
        input: PathBuf,
        /// Output CSV for the aligned grid
        output: PathBuf,
    },

    /// Extract centrifuge runs from the tank level log
    ExtractRuns {
        /// Raw tank level log (semicolon-delimited)
        input: PathBuf,
        /// Output CSV for the runs table
        output: PathBuf,
    },

    /// Match wet/dry weighings into drying events
    MatchDrying {
        /// Raw drying scale log (delimiter auto-detected)
        input: PathBuf,
        /// Output CSV for the drying events table
        output: PathBuf,
    },

    /// Assemble the mass-balance feature and target tables
    Features {
        /// Drying events CSV (from match-drying)
        #[arg(long)]
        drying: PathBuf,
        /// Runs CSV (from extract-runs)
        #[arg(long)]
        runs: PathBuf,
        /// Raw solids feed concentration log
        #[arg(long)]
        solids: PathBuf,
        /// Aligned sensor grid CSV (from clean-sensors)
        #[arg(long)]
        sensors: PathBuf,
        /// Output CSV for the full joined table
        #[arg(long)]
        out_full: PathBuf,
        /// Output CSV for the feature (X) table
        #[arg(long)]
        out_features: PathBuf,
        /// Output CSV for the target (y) table
        #[arg(long)]
        out_targets: PathBuf,
        /// Output CSV for the ML-ready dataset copy
        #[arg(long)]
        out_dataset: PathBuf,
    },

    /// Run the whole preprocessing pipeline end-to-end
    Preprocess {
        /// Directory with the raw CSV logs
        #[arg(long, default_value = "data/raw")]
        raw_dir: PathBuf,
        /// Output directory for processed artifacts
        #[arg(long, default_value = "data/processed")]
        out_dir: PathBuf,
    },

    /// Plot a histogram of a numeric column from a processed table (PNG)
    Visualize {
        /// Input CSV table
        csv_file: PathBuf,
        /// Column to plot
        #[arg(short = 'C', long)]
        column: String,
        /// Output PNG file path (defaults to <column>.png next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Number of histogram bins
        #[arg(long, default_value_t = 20)]
        bins: usize,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.len() > 39 {
            format!("{}...", &value[..36])
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::CleanSensors { input, output } => {
            cmd_clean_sensors(&input, &output, &config);
        }
        Commands::ExtractRuns { input, output } => {
            cmd_extract_runs(&input, &output, &config);
        }
        Commands::MatchDrying { input, output } => {
            cmd_match_drying(&input, &output);
        }
        Commands::Features {
            drying,
            runs,
            solids,
            sensors,
            out_full,
            out_features,
            out_targets,
            out_dataset,
        } => {
            cmd_features(
                &drying, &runs, &solids, &sensors, &out_full, &out_features, &out_targets,
                &out_dataset, &config,
            );
        }
        Commands::Preprocess { raw_dir, out_dir } => {
            cmd_preprocess(&raw_dir, &out_dir, &config);
        }
        Commands::Visualize {
            csv_file,
            column,
            output,
            bins,
        } => {
            cmd_visualize(&csv_file, &column, output, bins);
        }
    }
}

/// Clean and align the sensor log; returns the frame and its report.
fn clean_sensors_stage(
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> Result<(crate::core::timeseries::AlignedFrame, alignment::AlignmentReport)> {
    let raw = loaders::load_sensor_log(input, &config.sensors)
        .with_context(|| format!("failed to load sensor log {}", input.display()))?;
    let (frame, report) = alignment::align_sensor_streams(&raw, &config.sensors)?;
    writers::write_aligned_csv(output, &frame)?;
    Ok((frame, report))
}

/// Extract runs from the tank log; returns the extraction.
fn extract_runs_stage(
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> Result<runs::RunExtraction> {
    let rows = loaders::load_tank_log(input, &config.tank)
        .with_context(|| format!("failed to load tank log {}", input.display()))?;
    let extraction = runs::extract_runs(&rows, &config.tank);
    writers::write_runs_csv(output, &extraction.runs)?;
    Ok(extraction)
}

/// Match drying pairs from the scale log; returns the extraction.
fn match_drying_stage(input: &Path, output: &Path) -> Result<drying::DryingExtraction> {
    let rows = loaders::load_scale_log(input)
        .with_context(|| format!("failed to load scale log {}", input.display()))?;
    let extraction = drying::match_drying_pairs(&rows);
    writers::write_drying_csv(output, &extraction.events)?;
    Ok(extraction)
}

/// Assemble and persist the feature/target tables from in-memory inputs.
fn features_stage(
    run_list: &[runs::CentrifugeRun],
    drying_events: &[drying::DryingEvent],
    solids: &[loaders::SolidsRow],
    frame: &crate::core::timeseries::AlignedFrame,
    out_full: &Path,
    out_features: &Path,
    out_targets: &Path,
    out_dataset: &Path,
    config: &PipelineConfig,
) -> Result<(Vec<features::RunFeatureRow>, features::FeatureReport)> {
    let (rows, report) = features::build_feature_rows(run_list, drying_events, solids, frame, config)?;
    writers::write_full_table(out_full, &rows)?;
    writers::write_feature_table(out_features, &rows)?;
    writers::write_target_table(out_targets, &rows)?;
    // Duplicate full table for the downstream model-training consumer.
    writers::write_full_table(out_dataset, &rows)?;
    Ok((rows, report))
}

fn cmd_clean_sensors(input: &Path, output: &Path, config: &PipelineConfig) {
    let start = Instant::now();
    let spinner = create_spinner("Cleaning and aligning sensor streams...");

    match clean_sensors_stage(input, output, config) {
        Ok((frame, report)) => {
            spinner.finish_and_clear();

            let readings_dropped: usize =
                report.streams.iter().map(|s| s.total_dropped()).sum();

            print_summary(
                "Sensor Cleaning Complete",
                &[
                    ("Input file", input.display().to_string()),
                    ("Output file", output.display().to_string()),
                    ("Streams", frame.column_names().len().to_string()),
                    ("Grid rows", frame.num_rows().to_string()),
                    ("Readings dropped", readings_dropped.to_string()),
                    (
                        "Key rows dropped",
                        report.rows_dropped_missing_key.to_string(),
                    ),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Sensor cleaning failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_extract_runs(input: &Path, output: &Path, config: &PipelineConfig) {
    let start = Instant::now();
    let spinner = create_spinner("Extracting centrifuge runs...");

    match extract_runs_stage(input, output, config) {
        Ok(extraction) => {
            spinner.finish_and_clear();

            print_summary(
                "Run Extraction Complete",
                &[
                    ("Input file", input.display().to_string()),
                    ("Output file", output.display().to_string()),
                    ("Runs", extraction.runs.len().to_string()),
                    ("Rows discarded", extraction.discarded_rows.to_string()),
                    ("Unmatched starts", extraction.unmatched_starts.to_string()),
                    ("Unmatched ends", extraction.unmatched_ends.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Run extraction failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_match_drying(input: &Path, output: &Path) {
    let start = Instant::now();
    let spinner = create_spinner("Matching wet/dry weighings...");

    match match_drying_stage(input, output) {
        Ok(extraction) => {
            spinner.finish_and_clear();

            print_summary(
                "Drying Matching Complete",
                &[
                    ("Input file", input.display().to_string()),
                    ("Output file", output.display().to_string()),
                    ("Drying events", extraction.events.len().to_string()),
                    ("Rows discarded", extraction.discarded_rows.to_string()),
                    (
                        "Non-positive losses",
                        extraction.non_positive_losses.to_string(),
                    ),
                    ("Unmatched wet", extraction.unmatched_wet.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Drying matching failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_features(
    drying_path: &Path,
    runs_path: &Path,
    solids_path: &Path,
    sensors_path: &Path,
    out_full: &Path,
    out_features: &Path,
    out_targets: &Path,
    out_dataset: &Path,
    config: &PipelineConfig,
) {
    let start = Instant::now();
    let spinner = create_spinner("Assembling feature tables...");

    let result = (|| -> Result<(Vec<features::RunFeatureRow>, features::FeatureReport)> {
        let drying_events = loaders::read_drying_csv(drying_path)
            .with_context(|| format!("failed to read drying events {}", drying_path.display()))?;
        let run_list = loaders::read_runs_csv(runs_path)
            .with_context(|| format!("failed to read runs table {}", runs_path.display()))?;
        let solids = loaders::load_solids_log(solids_path, &config.solids)
            .with_context(|| format!("failed to load solids log {}", solids_path.display()))?;
        let frame = loaders::read_aligned_csv(sensors_path)
            .with_context(|| format!("failed to read aligned grid {}", sensors_path.display()))?;

        features_stage(
            &run_list,
            &drying_events,
            &solids,
            &frame,
            out_full,
            out_features,
            out_targets,
            out_dataset,
            config,
        )
    })();

    match result {
        Ok((rows, report)) => {
            spinner.finish_and_clear();

            print_summary(
                "Feature Assembly Complete",
                &[
                    ("Feature rows", rows.len().to_string()),
                    (
                        "Empty-window rows",
                        report.rows_without_window_samples.to_string(),
                    ),
                    ("Full table", out_full.display().to_string()),
                    ("Feature table", out_features.display().to_string()),
                    ("Target table", out_targets.display().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Feature assembly failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_preprocess(raw_dir: &Path, out_dir: &Path, config: &PipelineConfig) {
    let start = Instant::now();

    println!("Running preprocessing pipeline end-to-end...");
    println!("Raw directory: {}", raw_dir.display());
    println!("Output directory: {}", out_dir.display());

    let spinner = create_spinner("Cleaning and aligning sensor streams...");

    let result = (|| -> Result<(usize, usize, usize, usize)> {
        let (frame, _) = clean_sensors_stage(
            &raw_dir.join(SENSOR_LOG_FILE),
            &out_dir.join(ALIGNED_FILE),
            config,
        )?;
        spinner.set_message("Matching wet/dry weighings...");
        let drying_extraction =
            match_drying_stage(&raw_dir.join(SCALE_LOG_FILE), &out_dir.join(DRYING_FILE))?;
        spinner.set_message("Extracting centrifuge runs...");
        let run_extraction = extract_runs_stage(
            &raw_dir.join(TANK_LOG_FILE),
            &out_dir.join(RUNS_FILE),
            config,
        )?;
        spinner.set_message("Assembling feature tables...");
        let solids_path = raw_dir.join(SOLIDS_LOG_FILE);
        let solids = loaders::load_solids_log(&solids_path, &config.solids)
            .with_context(|| format!("failed to load solids log {}", solids_path.display()))?;
        let (rows, _) = features_stage(
            &run_extraction.runs,
            &drying_extraction.events,
            &solids,
            &frame,
            &out_dir.join(EFFICIENCY_FILE),
            &out_dir.join(FEATURES_FILE),
            &out_dir.join(TARGETS_FILE),
            &out_dir.join(DATASET_FILE),
            config,
        )?;

        Ok((
            frame.num_rows(),
            run_extraction.runs.len(),
            drying_extraction.events.len(),
            rows.len(),
        ))
    })();

    spinner.finish_and_clear();

    match result {
        Ok((grid_rows, run_count, drying_count, feature_rows)) => {
            print_summary(
                "Preprocessing Complete",
                &[
                    ("Raw directory", raw_dir.display().to_string()),
                    ("Output directory", out_dir.display().to_string()),
                    ("Grid rows", grid_rows.to_string()),
                    ("Runs", run_count.to_string()),
                    ("Drying events", drying_count.to_string()),
                    ("Feature rows", feature_rows.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Preprocessing failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_visualize(csv_file: &Path, column: &str, output: Option<PathBuf>, bins: usize) {
    let start = Instant::now();

    // Default output path: <column>.png next to the input table.
    let output_path = output.unwrap_or_else(|| {
        let stem = column.replace(['/', ' '], "_");
        csv_file.with_file_name(format!("{}.png", stem))
    });

    println!("Plotting histogram...");
    println!("Input: {}", csv_file.display());
    println!("Column: {}", column);
    println!("Output: {}", output_path.display());

    let spinner = create_spinner("Reading column values...");

    let values = match loaders::read_numeric_column(csv_file, column) {
        Ok(v) => v,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Failed to read column: {}", e);
            std::process::exit(1);
        }
    };

    spinner.set_message("Rendering histogram...");

    match visualization::plot_histogram(&output_path, &values, bins, column) {
        Ok(()) => {
            spinner.finish_and_clear();

            print_summary(
                "Visualization Complete",
                &[
                    ("Input file", csv_file.display().to_string()),
                    ("Column", column.to_string()),
                    ("Values plotted", values.len().to_string()),
                    ("Bins", bins.to_string()),
                    ("Output PNG", output_path.display().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Visualization failed: {}", e);
            std::process::exit(1);
        }
    }
}
