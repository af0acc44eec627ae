// THEORY:
// The log analysis reads back what the segmented logger wrote and condenses a
// whole run into one summary per cell. It works on the persisted records only,
// so it can run long after the monitor, across any number of restarts.
//
// Two summaries exist, one per record kind:
// 1.  **Charge summary** (status records): when did each slot start charging,
//     when did it first report complete, how long did that take, was it already
//     full at the start, and did it ever fall back from complete to anything
//     else.
// 2.  **Lit summary** (brightness records): how often each cell was lit, first
//     and last time, and an estimate of the total lit time taken from the gaps
//     between consecutive records.
//
// Unreadable files and records with bad timestamps or cell ids are skipped and
// counted, never fatal.

use crate::config::SegmentFormat;
use crate::core_modules::cell_classifier::CellStatus;
use crate::core_modules::records::{parse_record_time, BrightnessRecord, StatusRecord, RECORD_TIME_FORMAT};
use crate::core_modules::segmented_logger::read_segment;
use crate::error::LogIoError;
use chrono::{Duration, NaiveDateTime};
use serde::de::DeserializeOwned;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Every segment file (either format) below `root`, sorted by path.
pub fn scan_segments(root: &Path) -> Result<Vec<PathBuf>, LogIoError> {
    let escaped = glob::Pattern::escape(&root.to_string_lossy());
    let mut files = Vec::new();
    for format in [SegmentFormat::JsonArray, SegmentFormat::JsonLines] {
        let pattern = format!("{escaped}/**/*.{}", format.extension());
        let paths = glob::glob(&pattern).map_err(|e| LogIoError::Read {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        files.extend(paths.filter_map(Result::ok));
    }
    files.sort();
    Ok(files)
}

/// Records loaded from a log root, with counts of what had to be dropped.
#[derive(Debug, Clone, Default)]
pub struct LoadedRecords<T> {
    pub records: Vec<T>,
    pub files: usize,
    pub unreadable_files: usize,
    pub skipped_records: usize,
}

pub fn load_records<T: DeserializeOwned>(root: &Path) -> Result<LoadedRecords<T>, LogIoError> {
    let files = scan_segments(root)?;
    let mut loaded = LoadedRecords {
        records: Vec::new(),
        files: files.len(),
        unreadable_files: 0,
        skipped_records: 0,
    };
    for file in &files {
        let values = match read_segment(file) {
            Ok(values) => values,
            Err(err) => {
                log::warn!("skipping segment: {err}");
                loaded.unreadable_files += 1;
                continue;
            }
        };
        for value in values {
            match serde_json::from_value(value) {
                Ok(record) => loaded.records.push(record),
                Err(_) => loaded.skipped_records += 1,
            }
        }
    }
    log::info!(
        "loaded {} records from {} segments under {}",
        loaded.records.len(),
        loaded.files,
        root.display()
    );
    Ok(loaded)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridChargeSummary {
    pub grid_id: usize,
    pub records: usize,
    pub initial_status: Option<CellStatus>,
    pub final_status: Option<CellStatus>,
    pub first_charging: Option<NaiveDateTime>,
    pub first_charged: Option<NaiveDateTime>,
    /// `first_charged - first_charging`, when both were observed.
    pub charge_duration: Option<Duration>,
    /// The first record already reported the slot as charged.
    pub initially_charged: bool,
    /// A non-charged record followed a charged one.
    pub regressed: bool,
}

impl GridChargeSummary {
    fn empty(grid_id: usize) -> Self {
        Self {
            grid_id,
            records: 0,
            initial_status: None,
            final_status: None,
            first_charging: None,
            first_charged: None,
            charge_duration: None,
            initially_charged: false,
            regressed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeAnalysis {
    pub grids: Vec<GridChargeSummary>,
    pub skipped_records: usize,
}

/// Condenses status records into one charge summary per cell.
pub fn summarize_charging(records: &[StatusRecord], grid_count: usize) -> ChargeAnalysis {
    let mut per_grid: Vec<Vec<(NaiveDateTime, CellStatus)>> = vec![Vec::new(); grid_count];
    let mut skipped_records = 0;
    for record in records {
        match (parse_record_time(&record.timestamp), per_grid.get_mut(record.grid_id)) {
            (Some(time), Some(timeline)) => timeline.push((time, record.status)),
            _ => skipped_records += 1,
        }
    }

    let grids = per_grid
        .into_iter()
        .enumerate()
        .map(|(grid_id, mut timeline)| {
            timeline.sort_by_key(|(time, _)| *time);
            let mut summary = GridChargeSummary::empty(grid_id);
            summary.records = timeline.len();
            summary.initial_status = timeline.first().map(|(_, status)| *status);
            summary.final_status = timeline.last().map(|(_, status)| *status);
            summary.initially_charged = summary.initial_status == Some(CellStatus::Charged);
            summary.first_charging = timeline
                .iter()
                .find(|(_, status)| *status == CellStatus::Charging)
                .map(|(time, _)| *time);
            summary.first_charged = timeline
                .iter()
                .find(|(_, status)| *status == CellStatus::Charged)
                .map(|(time, _)| *time);
            if let (Some(start), Some(done)) = (summary.first_charging, summary.first_charged) {
                summary.charge_duration = Some(done - start);
            }
            summary.regressed = timeline
                .iter()
                .skip_while(|(_, status)| *status != CellStatus::Charged)
                .any(|(_, status)| *status != CellStatus::Charged);
            summary
        })
        .collect();

    ChargeAnalysis { grids, skipped_records }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridLitSummary {
    pub grid_id: usize,
    pub lit_records: usize,
    pub first_lit: Option<NaiveDateTime>,
    pub last_lit: Option<NaiveDateTime>,
    /// Sum of the gaps preceding each lit record.
    pub lit_duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LitAnalysis {
    pub grids: Vec<GridLitSummary>,
    pub records: usize,
    pub skipped_records: usize,
}

/// Condenses brightness records into one lit summary per cell.
pub fn summarize_lit(records: &[BrightnessRecord], grid_count: usize) -> LitAnalysis {
    let mut timeline: Vec<(NaiveDateTime, &[usize])> = Vec::with_capacity(records.len());
    let mut skipped_records = 0;
    for record in records {
        match parse_record_time(&record.timestamp) {
            Some(time) => timeline.push((time, record.lit.cells())),
            None => skipped_records += 1,
        }
    }
    timeline.sort_by_key(|(time, _)| *time);

    let grids = (0..grid_count)
        .map(|grid_id| {
            let mut summary = GridLitSummary {
                grid_id,
                lit_records: 0,
                first_lit: None,
                last_lit: None,
                lit_duration: Duration::zero(),
            };
            let mut previous: Option<NaiveDateTime> = None;
            for (time, lit) in &timeline {
                if lit.contains(&grid_id) {
                    summary.lit_records += 1;
                    summary.first_lit.get_or_insert(*time);
                    summary.last_lit = Some(*time);
                    if let Some(prev) = previous {
                        summary.lit_duration = summary.lit_duration + (*time - prev);
                    }
                }
                previous = Some(*time);
            }
            summary
        })
        .collect();

    LitAnalysis {
        grids,
        records: timeline.len(),
        skipped_records,
    }
}

fn format_time(time: Option<NaiveDateTime>) -> String {
    time.map(|t| t.format(RECORD_TIME_FORMAT).to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn format_duration(duration: Duration) -> String {
    let millis = duration.num_milliseconds();
    let sign = if millis < 0 { "-" } else { "" };
    let millis = millis.abs();
    format!("{sign}{}m {:.2}s", millis / 60_000, (millis % 60_000) as f64 / 1000.0)
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

pub fn render_charge_report(analysis: &ChargeAnalysis, root: &Path) -> String {
    let rule = "=".repeat(72);
    let mut out = String::new();
    let _ = writeln!(out, "Charging case slot report");
    let _ = writeln!(out, "Log root: {}", root.display());
    let _ = writeln!(out, "Skipped records: {}", analysis.skipped_records);
    let _ = writeln!(out, "{rule}");
    for grid in &analysis.grids {
        let status = |s: Option<CellStatus>| s.map(|s| s.as_str()).unwrap_or("no data");
        let _ = writeln!(out, "Slot {:02} ({} records)", grid.grid_id, grid.records);
        let _ = writeln!(
            out,
            "  initial: {} | final: {}",
            status(grid.initial_status),
            status(grid.final_status)
        );
        let _ = writeln!(out, "  first charging: {}", format_time(grid.first_charging));
        let _ = writeln!(out, "  first charged:  {}", format_time(grid.first_charged));
        let _ = writeln!(
            out,
            "  charge time: {}",
            grid.charge_duration.map(format_duration).unwrap_or_else(|| "none".to_string())
        );
        let _ = writeln!(
            out,
            "  initially charged: {} | regressed: {}",
            yes_no(grid.initially_charged),
            yes_no(grid.regressed)
        );
    }
    out
}

pub fn render_lit_report(analysis: &LitAnalysis, root: &Path) -> String {
    let rule = "=".repeat(72);
    let mut out = String::new();
    let _ = writeln!(out, "Lit cell report");
    let _ = writeln!(out, "Log root: {}", root.display());
    let _ = writeln!(
        out,
        "Records: {} (skipped {})",
        analysis.records, analysis.skipped_records
    );
    let _ = writeln!(out, "{rule}");
    for grid in &analysis.grids {
        let _ = writeln!(
            out,
            "Cell {:02}: lit {} times | first {} | last {} | lit for {} | never lit: {}",
            grid.grid_id,
            grid.lit_records,
            format_time(grid.first_lit),
            format_time(grid.last_lit),
            format_duration(grid.lit_duration),
            yes_no(grid.lit_records == 0)
        );
    }
    out
}
