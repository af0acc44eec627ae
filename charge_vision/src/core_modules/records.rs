//! Persisted log record shapes.
//!
//! These are the JSON documents the segmented logger writes and the log
//! analysis reads back. Field names are part of the on-disk format.

use crate::core_modules::cell_classifier::CellStatus;
use crate::core_modules::device_profile::{DeviceKind, LitField};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Format of the `timestamp` field of every record.
pub const RECORD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Format of restart identities and of `restart_timestamp`.
pub const RESTART_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn format_record_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format(RECORD_TIME_FORMAT).to_string()
}

pub fn parse_record_time(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, RECORD_TIME_FORMAT).ok()
}

/// Restart identity for a session started at `started`.
pub fn restart_id(started: &DateTime<Local>) -> String {
    started.format(RESTART_ID_FORMAT).to_string()
}

/// Lit cell indices, keyed by the name the device's analysis tooling expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LitCells {
    BrightGrids(Vec<usize>),
    AbnormalGrids(Vec<usize>),
}

impl LitCells {
    pub fn new(field: LitField, cells: Vec<usize>) -> Self {
        match field {
            LitField::BrightGrids => LitCells::BrightGrids(cells),
            LitField::AbnormalGrids => LitCells::AbnormalGrids(cells),
        }
    }

    pub fn cells(&self) -> &[usize] {
        match self {
            LitCells::BrightGrids(cells) | LitCells::AbnormalGrids(cells) => cells,
        }
    }
}

/// One frame's brightness, written whenever at least one cell is lit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightnessRecord {
    pub timestamp: String,
    pub monitor_type: DeviceKind,
    #[serde(flatten)]
    pub lit: LitCells,
    pub grid_brightness: Vec<f64>,
    pub total_bright_grids: usize,
    pub restart_timestamp: String,
}

/// One cell's classification at one analysis tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub timestamp: String,
    pub restart_timestamp: String,
    pub grid_id: usize,
    pub status: CellStatus,
    pub detail: String,
}

/// Anything the segmented logger can persist.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    BrightnessSample(BrightnessRecord),
    StatusAnalysis(StatusRecord),
}

impl LogEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LogEvent::BrightnessSample(_) => EventKind::BrightnessSample,
            LogEvent::StatusAnalysis(_) => EventKind::StatusAnalysis,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            LogEvent::BrightnessSample(record) => serde_json::to_value(record),
            LogEvent::StatusAnalysis(record) => serde_json::to_value(record),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BrightnessSample,
    StatusAnalysis,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn brightness(lit: LitCells) -> BrightnessRecord {
        BrightnessRecord {
            timestamp: "2024-05-01 12:00:00".into(),
            monitor_type: DeviceKind::ChargingCase,
            total_bright_grids: lit.cells().len(),
            lit,
            grid_brightness: vec![0.0, 0.25],
            restart_timestamp: "20240501_115500".into(),
        }
    }

    #[test]
    fn lit_cells_flatten_under_device_field_name() {
        let value = serde_json::to_value(brightness(LitCells::BrightGrids(vec![1]))).expect("serialize");
        assert_eq!(value["bright_grids"], serde_json::json!([1]));
        assert_eq!(value["monitor_type"], "charging_case");
        assert_eq!(value["total_bright_grids"], 1);

        let value = serde_json::to_value(brightness(LitCells::AbnormalGrids(vec![0, 1]))).expect("serialize");
        assert_eq!(value["abnormal_grids"], serde_json::json!([0, 1]));
        assert!(value.get("bright_grids").is_none());
    }

    #[test]
    fn brightness_record_reads_back() {
        let record = brightness(LitCells::AbnormalGrids(vec![1]));
        let text = serde_json::to_string(&record).expect("serialize");
        let parsed: BrightnessRecord = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(parsed, record);
    }

    #[test]
    fn status_record_uses_wire_names() {
        let record = StatusRecord {
            timestamp: "2024-05-01 12:00:04".into(),
            restart_timestamp: "20240501_115500".into(),
            grid_id: 7,
            status: CellStatus::Charged,
            detail: "steady light".into(),
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["status"], "charged");
        assert_eq!(value["grid_id"], 7);
    }

    #[test]
    fn record_time_round_trips_through_text() {
        let time = NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(23, 55, 7))
            .expect("valid time");
        let text = time.format(RECORD_TIME_FORMAT).to_string();
        assert_eq!(text, "2024-05-01 23:55:07");
        assert_eq!(parse_record_time(&text), Some(time));
        assert_eq!(parse_record_time("yesterday"), None);
    }
}
