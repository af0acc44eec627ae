// THEORY:
// The `SegmentedLogger` partitions an unbounded stream of records into bounded
// files. Two keys decide where a record lands:
//
// 1.  **Restart identity**: every session gets a directory named after its start
//     time (`YYYYMMDD_HHMMSS`). Records from different process lifetimes never
//     share a file.
// 2.  **Segment key**: inside that directory, one file per 10-minute wall-clock
//     bucket (`YYYYMMDD_HHMM_HHMM`). Files rotate implicitly as the clock
//     crosses a bucket boundary, so no file holds more than ten minutes.
//
// Segment files are created lazily on the first write. Writes are synchronous.
// In the default JSON-array format an append reads the whole segment, pushes
// the record and rewrites the file; the 10-minute bound keeps that affordable.
// The JSON-lines format appends in place under the same segmentation.
//
// Day rollover of the bucket end is approximate: the end day is incremented and
// reset to 1 past 31, without real calendar arithmetic. Only the start date is
// part of the key.

use crate::config::SegmentFormat;
use crate::core_modules::records::{EventKind, LogEvent};
use crate::error::LogIoError;
use chrono::{DateTime, Datelike, Local, NaiveDateTime, Timelike};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SEGMENT_MINUTES: u32 = 10;

/// A 10-minute wall-clock bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub start_hour: u32,
    pub start_minute: u32,
    pub end_hour: u32,
    pub end_minute: u32,
    /// Day on which the bucket ends; approximate past day 31.
    pub end_day: u32,
}

impl SegmentKey {
    pub fn at(time: NaiveDateTime) -> Self {
        let (hour, minute) = (time.hour(), time.minute());
        let start_minute = (minute / SEGMENT_MINUTES) * SEGMENT_MINUTES;
        let mut end_minute = start_minute + SEGMENT_MINUTES;
        let mut end_hour = hour;
        let mut end_day = time.day();

        if end_minute >= 60 {
            end_minute = 0;
            end_hour += 1;
            if end_hour >= 24 {
                end_hour = 0;
                end_day += 1;
                if end_day > 31 {
                    end_day = 1;
                }
            }
        }

        Self {
            year: time.year(),
            month: time.month(),
            day: time.day(),
            start_hour: hour,
            start_minute,
            end_hour,
            end_minute,
            end_day,
        }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}{:02}{:02}_{:02}{:02}_{:02}{:02}",
            self.year, self.month, self.day, self.start_hour, self.start_minute, self.end_hour, self.end_minute
        )
    }
}

/// Writes records into `<root>/<restart_id>/<segment_key>.<ext>`.
#[derive(Debug, Clone)]
pub struct SegmentedLogger {
    restart_id: String,
    brightness_root: PathBuf,
    status_root: Option<PathBuf>,
    format: SegmentFormat,
}

impl SegmentedLogger {
    pub fn new(
        restart_id: impl Into<String>,
        brightness_root: PathBuf,
        status_root: Option<PathBuf>,
        format: SegmentFormat,
    ) -> Self {
        Self {
            restart_id: restart_id.into(),
            brightness_root,
            status_root,
            format,
        }
    }

    pub fn restart_id(&self) -> &str {
        &self.restart_id
    }

    fn root_for(&self, kind: EventKind) -> Option<&Path> {
        match kind {
            EventKind::BrightnessSample => Some(self.brightness_root.as_path()),
            EventKind::StatusAnalysis => self.status_root.as_deref(),
        }
    }

    /// Path of the segment that `kind` records written at `time` go to.
    pub fn segment_path(&self, kind: EventKind, time: NaiveDateTime) -> Option<PathBuf> {
        self.root_for(kind).map(|root| {
            root.join(&self.restart_id)
                .join(format!("{}.{}", SegmentKey::at(time), self.format.extension()))
        })
    }

    /// Appends `event` to the segment for the current local time.
    pub fn append_event(&self, event: &LogEvent) -> Result<Option<PathBuf>, LogIoError> {
        self.append_event_at(event, Local::now())
    }

    /// Appends `event` to the segment for `now`. Returns the written path, or
    /// `None` when this logger has no root for the event's kind.
    pub fn append_event_at(&self, event: &LogEvent, now: DateTime<Local>) -> Result<Option<PathBuf>, LogIoError> {
        let Some(path) = self.segment_path(event.kind(), now.naive_local()) else {
            return Ok(None);
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| LogIoError::CreateDir {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let record = event.to_json().map_err(|e| LogIoError::Write {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        match self.format {
            SegmentFormat::JsonArray => rewrite_array(&path, record)?,
            SegmentFormat::JsonLines => append_line(&path, &record)?,
        }
        Ok(Some(path))
    }
}

fn rewrite_array(path: &Path, record: serde_json::Value) -> Result<(), LogIoError> {
    let mut records = read_segment(path)?;
    records.push(record);
    let text = serde_json::to_string_pretty(&records).map_err(|e| LogIoError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, text).map_err(|e| LogIoError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn append_line(path: &Path, record: &serde_json::Value) -> Result<(), LogIoError> {
    let write_err = |e: std::io::Error| LogIoError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut file = OpenOptions::new().create(true).append(true).open(path).map_err(write_err)?;
    writeln!(file, "{record}").map_err(write_err)
}

/// Reads every record of a segment in either format. A missing file is empty.
pub fn read_segment(path: &Path) -> Result<Vec<serde_json::Value>, LogIoError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).map_err(|e| LogIoError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let decode_err = |e: serde_json::Error| LogIoError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let is_lines = path.extension().is_some_and(|ext| ext == SegmentFormat::JsonLines.extension());
    if is_lines {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(decode_err))
            .collect()
    } else if text.trim().is_empty() {
        Ok(Vec::new())
    } else {
        serde_json::from_str(&text).map_err(decode_err)
    }
}
