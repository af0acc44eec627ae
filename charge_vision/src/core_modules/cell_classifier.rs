// THEORY:
// The `CellStateClassifier` turns a window of brightness ratios into one of
// three charge states. It carries no memory of its own: the window is the only
// input, so two calls on the same window always agree, and a cell can move
// between any two states from one analysis tick to the next.
//
// Decision procedure, evaluated in order:
// 1.  **Too Few Samples**: Below the minimum window length the statistics are
//     meaningless. This also covers the first moments after start-up.
// 2.  **Dark**: A mean ratio below the lit threshold means no LED is on.
// 3.  **Steady**: A lit cell whose relative standard deviation (std / mean) is
//     below the stability threshold shows a constant light: charge complete.
// 4.  **Varying**: Anything else is lit but changing: charging. The sign of the
//     least-squares slope over the window is attached as a diagnostic trend.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete per-cell state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellStatus {
    #[serde(rename = "no_status")]
    NoState,
    #[serde(rename = "charging")]
    Charging,
    #[serde(rename = "charged")]
    Charged,
}

impl CellStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CellStatus::NoState => "no_status",
            CellStatus::Charging => "charging",
            CellStatus::Charged => "charged",
        }
    }
}

impl fmt::Display for CellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of brightness change across a charging window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Fluctuating,
}

impl Trend {
    fn from_slope(slope: f64) -> Self {
        if slope > 0.0 {
            Trend::Rising
        } else if slope < 0.0 {
            Trend::Falling
        } else {
            Trend::Fluctuating
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Trend::Rising => "brightness rising",
            Trend::Falling => "brightness falling",
            Trend::Fluctuating => "brightness fluctuating",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub status: CellStatus,
    /// Human-readable justification, written to the status log.
    pub detail: String,
    /// Only set for `Charging`.
    pub trend: Option<Trend>,
}

impl Classification {
    fn new(status: CellStatus, detail: String) -> Self {
        Self {
            status,
            detail,
            trend: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellStateClassifier {
    bright_pixel_ratio: f64,
    stability_threshold: f64,
    min_samples: usize,
}

impl Default for CellStateClassifier {
    fn default() -> Self {
        Self::new(
            crate::config::BRIGHT_PIXEL_RATIO,
            crate::config::STABILITY_THRESHOLD,
            crate::config::MIN_WINDOW_SAMPLES,
        )
    }
}

impl CellStateClassifier {
    pub fn new(bright_pixel_ratio: f64, stability_threshold: f64, min_samples: usize) -> Self {
        Self {
            bright_pixel_ratio,
            stability_threshold,
            min_samples,
        }
    }

    pub fn classify(&self, window: &[f64]) -> Classification {
        if window.len() < self.min_samples {
            return Classification::new(CellStatus::NoState, "insufficient data (startup delay)".to_string());
        }

        let (mean, std_dev) = mean_and_std_dev(window);
        if mean < self.bright_pixel_ratio {
            return Classification::new(
                CellStatus::NoState,
                format!("brightness below threshold (mean {:.4} < {})", mean, self.bright_pixel_ratio),
            );
        }

        let stability = if mean > 0.0 { std_dev / mean } else { 1.0 };
        let threshold_pct = self.stability_threshold * 100.0;
        if stability < self.stability_threshold {
            return Classification::new(
                CellStatus::Charged,
                format!("steady light (fluctuation {:.4} < {}%)", stability, threshold_pct),
            );
        }

        let trend = Trend::from_slope(linear_slope(window));
        Classification {
            status: CellStatus::Charging,
            detail: format!("{} (fluctuation {:.4} >= {}%)", trend.label(), stability, threshold_pct),
            trend: Some(trend),
        }
    }
}

/// Mean and population standard deviation.
fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    let count = values.len() as f64;
    if count < 1.0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    (mean, variance.sqrt())
}

/// Least-squares slope of `values` against their index.
fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;
    let (num, den) = values.iter().enumerate().fold((0.0, 0.0), |(num, den), (i, y)| {
        let dx = i as f64 - x_mean;
        (num + dx * (y - y_mean), den + dx * dx)
    });
    if den == 0.0 { 0.0 } else { num / den }
}
