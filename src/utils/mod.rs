//! Utilities module for logging, metrics, artifacts and helper functions
//!
//! This module provides:
//! - Structured logging with tracing
//! - Metrics computation (accuracy, macro F1-score, confusion matrix)
//! - Error handling types
//! - Run artifacts: SVG charts, prediction grids, the scalar event log
//! - General helper functions
//!
//! ## Metrics
//!
//! Macro F1 follows scikit-learn's `average='macro'` semantics: the mean runs
//! over every label present in either the ground truth or the predictions.

pub mod charts;
pub mod error;
pub mod events;
pub mod grid;
pub mod logging;
pub mod metrics;

use std::path::{Path, PathBuf};

pub use error::{MaskClassifierError, Result};
pub use logging::init_logging;
pub use metrics::{macro_f1_score, ConfusionMatrix, Metrics};

/// Pick a fresh run directory name next to `path`.
///
/// Returns `path` itself when nothing exists there yet, otherwise appends the
/// next free number: `exp` → `exp2` → `exp3`. The suffix is one more than the
/// largest existing numeric suffix, starting at 2.
pub fn increment_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    let highest = std::fs::read_dir(parent)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| {
                    let name = e.file_name().to_string_lossy().into_owned();
                    let suffix = name.strip_prefix(stem.as_str())?;
                    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
                        return None;
                    }
                    suffix.parse::<usize>().ok()
                })
                .max()
        })
        .ok()
        .flatten();

    let n = highest.map(|h| h + 1).unwrap_or(2);
    parent.join(format!("{}{}", stem, n))
}

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

/// Format a number with thousands separator
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

/// Format a percentage with a progress bar
pub fn format_progress_bar(progress: f64, width: usize) -> String {
    let filled = (progress * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);

    format!(
        "[{}{}] {:.1}%",
        "█".repeat(filled),
        "░".repeat(empty),
        progress * 100.0
    )
}
