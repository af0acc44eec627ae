use approx::assert_relative_eq;
use charge_vision::core_modules::cell_classifier::CellStatus;
use charge_vision::core_modules::grid_geometry::BorderRect;
use charge_vision::core_modules::log_analysis::{load_records, summarize_charging, summarize_lit};
use charge_vision::core_modules::records::{BrightnessRecord, EventKind, LitCells, StatusRecord};
use charge_vision::core_modules::segmented_logger::read_segment;
use charge_vision::{DeviceKind, MonitorConfig, MonitorSession, SegmentFormat};
use chrono::{DateTime, Duration, Local, TimeZone};
use image::{Rgb, RgbImage};
use std::path::Path;

fn at(hour: u32, minute: u32, second: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2024, 5, 1, hour, minute, second)
        .earliest()
        .expect("valid local time")
}

fn session(log_root: &Path, format: SegmentFormat, start: DateTime<Local>) -> MonitorSession {
    let config = MonitorConfig {
        log_root: log_root.to_path_buf(),
        segment_format: format,
        ..MonitorConfig::default()
    };
    MonitorSession::new(
        DeviceKind::ChargingCase.profile(),
        config,
        BorderRect::new(0, 0, 100, 80),
        start,
    )
    .expect("valid session")
}

/// Cells are 20x20 pixels. Lights a small spot in the centre of each listed cell.
fn frame_with_lit(cells: &[usize], shade: u8) -> RgbImage {
    RgbImage::from_fn(100, 80, |x, y| {
        let cell = (y / 20) as usize * 5 + (x / 20) as usize;
        let (cx, cy) = (x % 20, y % 20);
        if cells.contains(&cell) && (8..12).contains(&cx) && (8..12).contains(&cy) {
            Rgb([shade, shade, shade])
        } else {
            Rgb([0, 0, 0])
        }
    })
}

#[test]
fn brightness_records_name_the_lit_cells() {
    let dir = tempfile::tempdir().expect("temp dir");
    let start = at(10, 0, 0);
    let mut session = session(dir.path(), SegmentFormat::JsonArray, start);

    session.process_frame(&frame_with_lit(&[2, 7], 255), start);
    session.process_frame(&frame_with_lit(&[], 255), start + Duration::seconds(1));

    let path = session
        .logger()
        .segment_path(EventKind::BrightnessSample, start.naive_local())
        .expect("brightness root");
    assert!(path.ends_with("brightness_logs/20240501_100000/20240501_1000_1010.json"));

    let records = read_segment(&path).expect("readable segment");
    assert_eq!(records.len(), 1, "dark frames are not logged");
    let record: BrightnessRecord = serde_json::from_value(records[0].clone()).expect("brightness record");
    assert_eq!(record.lit, LitCells::BrightGrids(vec![2, 7]));
    assert_eq!(record.total_bright_grids, 2);
    assert_eq!(record.grid_brightness.len(), 20);
    assert_eq!(record.timestamp, "2024-05-01 10:00:00");
    assert_eq!(record.restart_timestamp, "20240501_100000");
    assert_eq!(records[0]["bright_grids"], serde_json::json!([2, 7]));
    assert_eq!(records[0]["monitor_type"], "charging_case");
}

#[test]
fn analysis_writes_one_status_record_per_cell() {
    let dir = tempfile::tempdir().expect("temp dir");
    let start = at(10, 0, 0);
    let mut session = session(dir.path(), SegmentFormat::JsonArray, start);

    let frame = frame_with_lit(&[0], 255);
    let mut tick = None;
    for step in 0..=10 {
        let now = start + Duration::milliseconds(step * 500);
        if session.process_frame(&frame, now).analysis.is_some() {
            tick = Some(now);
        }
    }
    let tick = tick.expect("analysis ran at the start delay");
    assert_eq!(tick, start + Duration::seconds(5));

    let path = session
        .logger()
        .segment_path(EventKind::StatusAnalysis, tick.naive_local())
        .expect("status root");
    assert!(path.starts_with(dir.path().join("charging_log").join("20240501_100000")));

    let records: Vec<StatusRecord> = read_segment(&path)
        .expect("readable segment")
        .into_iter()
        .map(|value| serde_json::from_value(value).expect("status record"))
        .collect();
    assert_eq!(records.len(), 20);
    assert_eq!(records.iter().map(|r| r.grid_id).collect::<Vec<_>>(), (0..20).collect::<Vec<usize>>());
    assert_eq!(records[0].status, CellStatus::Charged);
    assert!(records[0].detail.starts_with("steady light"));
    assert!(records[1..].iter().all(|r| r.status == CellStatus::NoState));
    assert!(records.iter().all(|r| r.timestamp == "2024-05-01 10:00:05"));
}

#[test]
fn restarts_never_share_a_directory() {
    let dir = tempfile::tempdir().expect("temp dir");
    let first_start = at(9, 59, 58);
    let second_start = at(10, 0, 3);
    let mut first = session(dir.path(), SegmentFormat::JsonLines, first_start);
    let mut second = session(dir.path(), SegmentFormat::JsonLines, second_start);
    assert_ne!(first.restart_id(), second.restart_id());

    // Both write during the same ten-minute window.
    let now = at(10, 0, 4);
    first.process_frame(&frame_with_lit(&[1], 255), now);
    second.process_frame(&frame_with_lit(&[3], 255), now);

    for (session, cell) in [(&first, 1usize), (&second, 3usize)] {
        let path = session
            .logger()
            .segment_path(EventKind::BrightnessSample, now.naive_local())
            .expect("brightness root");
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jsonl"));
        let records = read_segment(&path).expect("readable segment");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["restart_timestamp"], session.restart_id());
        assert_eq!(records[0]["bright_grids"], serde_json::json!([cell]));
    }
}

#[test]
fn logged_status_history_summarizes_as_charged_from_the_start() {
    let dir = tempfile::tempdir().expect("temp dir");
    let start = at(10, 0, 0);
    let mut session = session(dir.path(), SegmentFormat::JsonArray, start);

    let frame = frame_with_lit(&[4], 255);
    for step in 0..=40 {
        session.process_frame(&frame, start + Duration::milliseconds(step * 500));
    }

    let loaded = load_records::<StatusRecord>(&dir.path().join("charging_log")).expect("loads");
    // Passes at 5s, 9s, 13s and 17s.
    assert_eq!(loaded.records.len(), 4 * 20);
    let analysis = summarize_charging(&loaded.records, 20);
    let cell = &analysis.grids[4];
    assert!(cell.initially_charged);
    assert!(!cell.regressed);
    assert_eq!(cell.final_status, Some(CellStatus::Charged));
    assert_eq!(analysis.grids[0].final_status, Some(CellStatus::NoState));
}

#[test]
fn hearing_aid_brightness_logs_summarize_lit_time() {
    let dir = tempfile::tempdir().expect("temp dir");
    let start = at(10, 0, 0);
    let config = MonitorConfig {
        log_root: dir.path().to_path_buf(),
        ..MonitorConfig::default()
    };
    let mut session = MonitorSession::new(
        DeviceKind::HearingAid.profile(),
        config,
        BorderRect::new(0, 0, 1400, 400),
        start,
    )
    .expect("valid session");

    // First cell spans x 50..150, y 20..110.
    let frame = RgbImage::from_fn(1400, 400, |x, y| {
        if (95..105).contains(&x) && (60..70).contains(&y) {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    });
    for step in 0..4 {
        session.process_frame(&frame, start + Duration::seconds(step * 2));
    }

    let loaded = load_records::<BrightnessRecord>(&dir.path().join("hearing_aid_logs")).expect("loads");
    assert_eq!(loaded.records.len(), 4);
    assert!(matches!(loaded.records[0].lit, LitCells::AbnormalGrids(_)));

    let analysis = summarize_lit(&loaded.records, 56);
    assert_eq!(analysis.grids[0].lit_records, 4);
    assert_relative_eq!(analysis.grids[0].lit_duration.num_milliseconds() as f64, 6000.0);
    assert_eq!(analysis.grids[1].lit_records, 0);
}
