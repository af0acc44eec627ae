// THEORY:
// The `pipeline` module is the top-level driver of the engine. A
// `MonitorSession` owns every piece of mutable monitoring state for one device:
// the cell regions, one temporal cache per cell, the classifier settings and
// the segmented logger bound to this session's restart identity. Nothing is
// global; a second session is simply a second value.
//
// Per frame, in order:
// 1.  Sample every cell (`BrightnessSampler`).
// 2.  Append each cell's ratio to its cache and prune all caches against now.
// 3.  Log a brightness record when at least one cell is lit.
// 4.  If the start delay has passed and an analysis interval has elapsed since
//     the last pass, classify every cell and log one status record per cell.
//
// Log write failures never stop a session. They are collected into the
// outcome as warnings and the frame is processed to completion.

use crate::config::MonitorConfig;
use crate::core_modules::brightness_sampler::{BrightnessSampler, FrameSampling};
use crate::core_modules::calibration::load_border;
use crate::core_modules::cell_classifier::{CellStateClassifier, CellStatus, Trend};
use crate::core_modules::device_profile::{DeviceKind, DeviceProfile};
use crate::core_modules::grid_geometry::{BorderRect, CellRegion, GridGeometry};
use crate::core_modules::records::{
    format_record_time, restart_id, BrightnessRecord, LitCells, LogEvent, StatusRecord,
};
use crate::core_modules::segmented_logger::SegmentedLogger;
use crate::core_modules::temporal_cache::TemporalCache;
use crate::error::{ConfigError, LogIoError};
use chrono::{DateTime, Local};
use image::RgbImage;
use std::path::Path;

/// Classification of one cell at one analysis tick.
#[derive(Debug, Clone, PartialEq)]
pub struct CellReport {
    pub grid_id: usize,
    pub status: CellStatus,
    pub detail: String,
    pub trend: Option<Trend>,
}

/// Everything a single frame produced.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub sampling: FrameSampling,
    /// Present only on frames that triggered an analysis pass.
    pub analysis: Option<Vec<CellReport>>,
    /// Recovered log write failures.
    pub warnings: Vec<LogIoError>,
}

pub struct MonitorSession {
    profile: DeviceProfile,
    config: MonitorConfig,
    geometry: GridGeometry,
    sampler: BrightnessSampler,
    classifier: CellStateClassifier,
    caches: Vec<TemporalCache>,
    logger: SegmentedLogger,
    started_at: DateTime<Local>,
    /// Seconds since `started_at` of the last analysis pass.
    last_analysis: f64,
}

impl MonitorSession {
    /// Builds a session from an already-loaded border rectangle.
    pub fn new(
        profile: DeviceProfile,
        config: MonitorConfig,
        border: BorderRect,
        started_at: DateTime<Local>,
    ) -> Result<Self, ConfigError> {
        let geometry = GridGeometry::new(border, profile.layout)?;
        let sampler = BrightnessSampler::new(config.bright_threshold, config.bright_pixel_ratio);
        let classifier = CellStateClassifier::new(
            config.bright_pixel_ratio,
            config.stability_threshold,
            config.min_window_samples,
        );
        let caches = if profile.classifies_cells() {
            (0..geometry.cell_count())
                .map(|_| TemporalCache::new(config.cache_duration_secs))
                .collect()
        } else {
            Vec::new()
        };
        let logger = SegmentedLogger::new(
            restart_id(&started_at),
            profile.brightness_root(&config.log_root),
            profile.status_root(&config.log_root),
            config.segment_format,
        );
        log::info!(
            "{} session started: {} cells, restart id {}",
            profile.kind,
            geometry.cell_count(),
            logger.restart_id()
        );

        Ok(Self {
            profile,
            config,
            geometry,
            sampler,
            classifier,
            caches,
            logger,
            last_analysis: 0.0,
            started_at,
        })
    }

    /// Loads the device's border file from `calibration_dir` and builds a session.
    pub fn open(
        kind: DeviceKind,
        config: MonitorConfig,
        calibration_dir: &Path,
        started_at: DateTime<Local>,
    ) -> Result<Self, ConfigError> {
        let profile = kind.profile();
        let border = load_border(&calibration_dir.join(&profile.border_file))?;
        Self::new(profile, config, border, started_at)
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn regions(&self) -> &[CellRegion] {
        self.geometry.regions()
    }

    pub fn restart_id(&self) -> &str {
        self.logger.restart_id()
    }

    pub fn logger(&self) -> &SegmentedLogger {
        &self.logger
    }

    /// Cached ratios of one cell, oldest first.
    pub fn window(&self, grid_id: usize) -> Option<Vec<f64>> {
        self.caches.get(grid_id).map(TemporalCache::snapshot)
    }

    /// Replaces the calibrated border. Cached samples belong to the old
    /// regions and are discarded.
    pub fn recalibrate(&mut self, border: BorderRect) -> Result<(), ConfigError> {
        self.geometry.recalibrate(border)?;
        self.caches.iter_mut().for_each(TemporalCache::clear);
        log::info!("recalibrated border to {}x{} at ({}, {})", border.w, border.h, border.x, border.y);
        Ok(())
    }

    /// Seconds from session start to `now`. Cache timestamps use this clock.
    pub fn elapsed_secs(&self, now: DateTime<Local>) -> f64 {
        (now - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn process_frame(&mut self, frame: &RgbImage, now: DateTime<Local>) -> FrameOutcome {
        let now_secs = self.elapsed_secs(now);
        let sampling = self.sampler.sample(frame, self.geometry.regions());
        let mut warnings = Vec::new();

        for (cache, ratio) in self.caches.iter_mut().zip(&sampling.ratios) {
            cache.append(now_secs, *ratio);
        }
        self.prune(now_secs);

        if !sampling.bright_cells.is_empty() {
            let record = BrightnessRecord {
                timestamp: format_record_time(&now),
                monitor_type: self.profile.kind,
                lit: LitCells::new(self.profile.lit_field, sampling.bright_cells.clone()),
                grid_brightness: sampling.ratios.clone(),
                total_bright_grids: sampling.bright_cells.len(),
                restart_timestamp: self.restart_id().to_string(),
            };
            self.record(&LogEvent::BrightnessSample(record), now, &mut warnings);
        }
        log::debug!("frame sampled: lit cells {:?}", sampling.bright_cells);

        let analysis = if self.analysis_due(now_secs) {
            self.last_analysis = now_secs;
            Some(self.analyze_cells(now, &mut warnings))
        } else {
            None
        };

        FrameOutcome {
            sampling,
            analysis,
            warnings,
        }
    }

    /// Whether a classification pass should run `now_secs` after session start.
    pub fn analysis_due(&self, now_secs: f64) -> bool {
        self.profile.classifies_cells()
            && now_secs >= self.config.start_delay_secs
            && now_secs - self.last_analysis >= self.config.analysis_interval_secs
    }

    /// Classifies every cell from its current window and logs one status record per cell.
    pub fn analyze_cells(&mut self, now: DateTime<Local>, warnings: &mut Vec<LogIoError>) -> Vec<CellReport> {
        self.prune(self.elapsed_secs(now));
        let timestamp = format_record_time(&now);
        log::info!("cell status analysis [{}] restart {}", timestamp, self.restart_id());

        let reports: Vec<CellReport> = self
            .caches
            .iter()
            .enumerate()
            .map(|(grid_id, cache)| {
                let result = self.classifier.classify(&cache.snapshot());
                log::info!("cell {:02}: {} - {}", grid_id, result.status, result.detail);
                CellReport {
                    grid_id,
                    status: result.status,
                    detail: result.detail,
                    trend: result.trend,
                }
            })
            .collect();

        for report in &reports {
            let record = StatusRecord {
                timestamp: timestamp.clone(),
                restart_timestamp: self.restart_id().to_string(),
                grid_id: report.grid_id,
                status: report.status,
                detail: report.detail.clone(),
            };
            self.record(&LogEvent::StatusAnalysis(record), now, warnings);
        }
        reports
    }

    fn prune(&mut self, now_secs: f64) {
        for cache in &mut self.caches {
            cache.prune(now_secs);
        }
    }

    fn record(&self, event: &LogEvent, now: DateTime<Local>, warnings: &mut Vec<LogIoError>) {
        if let Err(err) = self.logger.append_event_at(event, now) {
            log::warn!("log write failed, monitoring continues: {err}");
            warnings.push(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use image::Rgb;

    const WIDTH: u32 = 100;
    const HEIGHT: u32 = 80;

    fn config(log_root: &Path) -> MonitorConfig {
        MonitorConfig {
            log_root: log_root.to_path_buf(),
            ..MonitorConfig::default()
        }
    }

    fn session(log_root: &Path, kind: DeviceKind, start: DateTime<Local>) -> MonitorSession {
        MonitorSession::new(
            kind.profile(),
            config(log_root),
            BorderRect::new(0, 0, WIDTH as i64, HEIGHT as i64),
            start,
        )
        .expect("valid session")
    }

    /// A dark frame with a lit square in the centre of the first cell (20x20 cells).
    fn frame_with_first_cell_lit(shade: u8) -> RgbImage {
        RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
            if (8..12).contains(&x) && (8..12).contains(&y) {
                Rgb([shade, shade, shade])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn no_analysis_before_start_delay() {
        let dir = tempfile::tempdir().expect("temp dir");
        let start = Local::now();
        let mut session = session(dir.path(), DeviceKind::ChargingCase, start);

        for ms in (0..4_900).step_by(250) {
            let outcome = session.process_frame(&frame_with_first_cell_lit(255), start + Duration::milliseconds(ms));
            assert!(outcome.analysis.is_none(), "analysis ran at {ms}ms");
        }
    }

    #[test]
    fn steady_lit_cell_is_charged_and_dark_cells_have_no_state() {
        let dir = tempfile::tempdir().expect("temp dir");
        let start = Local::now();
        let mut session = session(dir.path(), DeviceKind::ChargingCase, start);

        let mut analyses = Vec::new();
        for ms in (0..=9_000).step_by(250) {
            let outcome = session.process_frame(&frame_with_first_cell_lit(255), start + Duration::milliseconds(ms));
            assert_eq!(outcome.sampling.bright_cells, vec![0]);
            assert!(outcome.warnings.is_empty());
            if let Some(reports) = outcome.analysis {
                analyses.push((ms, reports));
            }
        }

        // First pass at the start delay, the next one an interval later.
        let ticks: Vec<i64> = analyses.iter().map(|(ms, _)| *ms).collect();
        assert_eq!(ticks, vec![5_000, 9_000]);

        let (_, reports) = &analyses[0];
        assert_eq!(reports.len(), 20);
        assert_eq!(reports[0].status, CellStatus::Charged);
        assert!(reports[1..].iter().all(|r| r.status == CellStatus::NoState));
    }

    #[test]
    fn window_only_holds_cache_duration() {
        let dir = tempfile::tempdir().expect("temp dir");
        let start = Local::now();
        let mut session = session(dir.path(), DeviceKind::ChargingCase, start);
        for ms in (0..=10_000).step_by(500) {
            session.process_frame(&frame_with_first_cell_lit(255), start + Duration::milliseconds(ms));
        }
        // Samples at 6.0s ..= 10.0s survive a 4 second window.
        assert_eq!(session.window(0).map(|w| w.len()), Some(9));
    }

    #[test]
    fn hearing_aid_logs_abnormal_grids_without_classifying() {
        let dir = tempfile::tempdir().expect("temp dir");
        let start = Local::now();
        let mut session = MonitorSession::new(
            DeviceKind::HearingAid.profile(),
            config(dir.path()),
            BorderRect::new(0, 0, 1400, 400),
            start,
        )
        .expect("valid session");

        let frame = RgbImage::from_fn(1400, 400, |x, y| {
            if (95..105).contains(&x) && (60..70).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        for ms in (0..=10_000).step_by(1_000) {
            let outcome = session.process_frame(&frame, start + Duration::milliseconds(ms));
            assert!(outcome.analysis.is_none());
            assert_eq!(outcome.sampling.bright_cells, vec![0]);
        }
        assert_eq!(session.window(0), None);

        let brightness_dir = dir.path().join("hearing_aid_logs").join(session.restart_id());
        assert!(brightness_dir.is_dir());
        assert!(!dir.path().join("charging_log").exists());
    }

    #[test]
    fn dark_frames_write_no_brightness_records() {
        let dir = tempfile::tempdir().expect("temp dir");
        let start = Local::now();
        let mut session = session(dir.path(), DeviceKind::ChargingCase, start);
        let dark = RgbImage::new(WIDTH, HEIGHT);
        for ms in (0..3_000).step_by(500) {
            session.process_frame(&dark, start + Duration::milliseconds(ms));
        }
        assert!(!dir.path().join("brightness_logs").exists());
    }

    #[test]
    fn recalibration_discards_cached_samples() {
        let dir = tempfile::tempdir().expect("temp dir");
        let start = Local::now();
        let mut session = session(dir.path(), DeviceKind::ChargingCase, start);
        session.process_frame(&frame_with_first_cell_lit(255), start);
        assert_eq!(session.window(0).map(|w| w.len()), Some(1));

        session.recalibrate(BorderRect::new(10, 10, 50, 40)).expect("valid border");
        assert_eq!(session.window(0).map(|w| w.len()), Some(0));
        assert_eq!(session.regions()[0].x1, 10);
    }

    #[test]
    fn log_failures_become_warnings() {
        let dir = tempfile::tempdir().expect("temp dir");
        // A regular file where the log root directory should be.
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, "not a directory").expect("write");
        let start = Local::now();
        let mut session = session(&blocked, DeviceKind::ChargingCase, start);

        let outcome = session.process_frame(&frame_with_first_cell_lit(255), start);
        assert_eq!(outcome.sampling.bright_cells, vec![0]);
        assert_eq!(outcome.warnings.len(), 1);
    }
}
