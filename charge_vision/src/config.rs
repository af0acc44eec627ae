// THEORY:
// Every number that decides when a cell counts as lit or steady lives here.
// The values are calibration constants for one camera and one lighting setup;
// they are not universal truths about LEDs. They are grouped into a single
// `MonitorConfig` so a session receives them once at construction and every
// component reads the same values.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const BRIGHT_THRESHOLD: u8 = 35;
pub const BRIGHT_PIXEL_RATIO: f64 = 0.001;
pub const CACHE_DURATION_SECS: f64 = 4.0;
pub const ANALYSIS_INTERVAL_SECS: f64 = 4.0;
pub const STABILITY_THRESHOLD: f64 = 0.05;
pub const START_DELAY_SECS: f64 = 5.0;
pub const MIN_WINDOW_SAMPLES: usize = 3;

/// How records are laid out inside one segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentFormat {
    /// A pretty-printed JSON array, rewritten in full on every append.
    #[default]
    JsonArray,
    /// One compact JSON record per line, appended in place.
    JsonLines,
}

impl SegmentFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SegmentFormat::JsonArray => "json",
            SegmentFormat::JsonLines => "jsonl",
        }
    }
}

/// Tunable behavior of a monitor session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Intensity (0-255) a smoothed, dilated pixel must exceed to count as bright.
    pub bright_threshold: u8,
    /// Minimum fraction of a cell's pixels that must be bright before the cell is lit.
    pub bright_pixel_ratio: f64,
    /// Length of the trailing per-cell sample window, in seconds.
    pub cache_duration_secs: f64,
    /// Time between two classification passes, in seconds.
    pub analysis_interval_secs: f64,
    /// Relative standard deviation below which a lit cell is considered steady.
    pub stability_threshold: f64,
    /// Time after session start before the first classification pass.
    pub start_delay_secs: f64,
    /// Windows shorter than this are never classified.
    pub min_window_samples: usize,
    /// Directory under which the per-profile log roots are created.
    pub log_root: PathBuf,
    pub segment_format: SegmentFormat,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            bright_threshold: BRIGHT_THRESHOLD,
            bright_pixel_ratio: BRIGHT_PIXEL_RATIO,
            cache_duration_secs: CACHE_DURATION_SECS,
            analysis_interval_secs: ANALYSIS_INTERVAL_SECS,
            stability_threshold: STABILITY_THRESHOLD,
            start_delay_secs: START_DELAY_SECS,
            min_window_samples: MIN_WINDOW_SAMPLES,
            log_root: PathBuf::from("."),
            segment_format: SegmentFormat::default(),
        }
    }
}

impl MonitorConfig {
    /// Loads a config file. A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("no monitor config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::MalformedConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::MalformedConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
