//! Visualization tools for the processed tables.
//!
//! Renders a histogram of one numeric table column to a PNG image using the
//! plotters library.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("No finite values to plot")]
    EmptyColumn,

    #[error("Bin count must be at least 1")]
    InvalidBinCount,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1280;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 720;

/// Bar fill color (cornflower blue).
const BAR_COLOR: RGBColor = RGBColor(100, 149, 237);

/// Count values per bin over [min, max].
///
/// Equal-width bins; the maximum value lands in the last bin.
fn histogram_counts(values: &[f64], bins: usize) -> Result<(Vec<usize>, f64, f64)> {
    if bins == 0 {
        return Err(VisualizationError::InvalidBinCount);
    }

    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return Err(VisualizationError::EmptyColumn);
    }

    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    // A constant column still draws as a single full bin.
    let (min, max) = if (max - min).abs() < f64::EPSILON {
        (min - 0.5, max + 0.5)
    } else {
        (min, max)
    };

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in &finite {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    Ok((counts, min, max))
}

/// Render a histogram of the given values and save it as a PNG.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `values` - Values to bin; non-finite entries are ignored
/// * `bins` - Number of equal-width bins
/// * `_title` - Title for the plot (unused - no fonts on headless hosts)
pub fn plot_histogram(
    output_path: &Path,
    values: &[f64],
    bins: usize,
    _title: &str,
) -> Result<()> {
    let (counts, min, max) = histogram_counts(values, bins)?;
    let bin_width = (max - min) / bins as f64;
    let max_count = counts.iter().copied().max().unwrap_or(0);

    let root =
        BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT)).into_drawing_area();

    root.fill(&WHITE)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(min..max, 0usize..(max_count + 1))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(counts.iter().enumerate().map(|(i, &count)| {
            let x0 = min + bin_width * i as f64;
            let x1 = x0 + bin_width;
            Rectangle::new([(x0, 0), (x1, count)], BAR_COLOR.filled())
        }))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}
