//! `charge_monitor`: runs the LED grid monitor and summarizes its logs.
//!
//! Subcommands:
//! - `monitor`: watch a device and write segmented brightness and status logs
//! - `analyze-charging`: summarize per-cell charging progress from status logs
//! - `analyze-lit`: summarize per-cell lit time from brightness logs

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use charge_vision::core_modules::calibration::load_border;
use charge_vision::core_modules::cell_classifier::CellStatus;
use charge_vision::core_modules::frame_source::{open_with_fallback, FrameSource, ImageSequenceSource};
use charge_vision::core_modules::log_analysis::{
    load_records, render_charge_report, render_lit_report, summarize_charging, summarize_lit,
};
use charge_vision::core_modules::records::{BrightnessRecord, StatusRecord};
use charge_vision::{DeviceKind, MonitorConfig, MonitorEvent, MonitorSession, MonitorWorker};

/// LED grid charging monitor
#[derive(Parser, Debug)]
#[command(name = "charge_monitor")]
#[command(about = "Watches an LED indicator grid and logs per-cell charge state")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Device {
    ChargingCase,
    HearingAid,
}

impl From<Device> for DeviceKind {
    fn from(device: Device) -> Self {
        match device {
            Device::ChargingCase => DeviceKind::ChargingCase,
            Device::HearingAid => DeviceKind::HearingAid,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor a device until stopped or until the frame source ends
    Monitor {
        /// Device type being monitored
        #[arg(short, long, value_enum, default_value = "charging-case")]
        device: Device,

        /// Directory holding the per-device border files
        #[arg(long, default_value = ".")]
        calibration_dir: PathBuf,

        /// Border file to use instead of the device's default one
        #[arg(long)]
        border_file: Option<PathBuf>,

        /// Replay the images of this directory as the frame source
        #[arg(long, conflicts_with = "device_root")]
        frames: Option<PathBuf>,

        /// Directory with `video1/` and `video0/` frame directories standing in for capture devices
        #[arg(
            long,
            help = "Capture root with video<N>/ directories",
            long_help = "Directory whose video1/ and video0/ subdirectories stand in for capture \
                         devices 1 and 0. Device 1 is tried first, device 0 once as a fallback."
        )]
        device_root: Option<PathBuf>,

        /// Monitor settings file (JSON). Defaults are used when it does not exist.
        #[arg(short, long, default_value = "monitor_config.json")]
        config: PathBuf,

        /// Overrides the log root from the settings file
        #[arg(long)]
        log_root: Option<PathBuf>,

        /// Minimum time between replayed frames in milliseconds
        #[arg(long, default_value = "100")]
        frame_interval_ms: u64,
    },

    /// Summarize charging progress per cell from status logs
    AnalyzeCharging {
        /// Status log root, e.g. `charging_log` or one restart directory below it
        #[arg(short, long)]
        root: PathBuf,

        /// Number of cells on the device
        #[arg(short, long, default_value = "20")]
        grids: usize,

        /// Write the report here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize lit time per cell from brightness logs
    AnalyzeLit {
        /// Brightness log root, e.g. `hearing_aid_logs`
        #[arg(short, long)]
        root: PathBuf,

        /// Number of cells on the device
        #[arg(short, long, default_value = "56")]
        grids: usize,

        /// Write the report here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match args.command {
        Command::Monitor {
            device,
            calibration_dir,
            border_file,
            frames,
            device_root,
            config,
            log_root,
            frame_interval_ms,
        } => {
            let mut config = MonitorConfig::load(&config)?;
            if let Some(log_root) = log_root {
                config.log_root = log_root;
            }
            let session = open_session(device.into(), config, &calibration_dir, border_file.as_deref())?;
            let interval = Duration::from_millis(frame_interval_ms);
            run_monitor(session, frames, device_root, interval).await
        }
        Command::AnalyzeCharging { root, grids, output } => {
            let loaded = load_records::<StatusRecord>(&root)?;
            log::info!(
                "loaded {} status records from {} files ({} unreadable)",
                loaded.records.len(),
                loaded.files,
                loaded.unreadable_files
            );
            let mut analysis = summarize_charging(&loaded.records, grids);
            analysis.skipped_records += loaded.skipped_records;
            emit_report(&render_charge_report(&analysis, &root), output.as_deref())
        }
        Command::AnalyzeLit { root, grids, output } => {
            let loaded = load_records::<BrightnessRecord>(&root)?;
            log::info!(
                "loaded {} brightness records from {} files ({} unreadable)",
                loaded.records.len(),
                loaded.files,
                loaded.unreadable_files
            );
            let mut analysis = summarize_lit(&loaded.records, grids);
            analysis.skipped_records += loaded.skipped_records;
            emit_report(&render_lit_report(&analysis, &root), output.as_deref())
        }
    }
}

fn open_session(
    kind: DeviceKind,
    config: MonitorConfig,
    calibration_dir: &Path,
    border_file: Option<&Path>,
) -> Result<MonitorSession> {
    let session = match border_file {
        Some(path) => MonitorSession::new(kind.profile(), config, load_border(path)?, Local::now())?,
        None => MonitorSession::open(kind, config, calibration_dir, Local::now())?,
    };
    Ok(session)
}

async fn run_monitor(
    session: MonitorSession,
    frames: Option<PathBuf>,
    device_root: Option<PathBuf>,
    interval: Duration,
) -> Result<()> {
    let mut handle = match (frames, device_root) {
        (Some(dir), _) => MonitorWorker::spawn(session, move || {
            let source: Box<dyn FrameSource> = Box::new(ImageSequenceSource::open(&dir)?.with_frame_interval(interval));
            Ok((0, source))
        }),
        (None, Some(root)) => MonitorWorker::spawn(session, move || {
            open_with_fallback(|index| {
                ImageSequenceSource::open_device(&root, index)
                    .map(|source| Box::new(source.with_frame_interval(interval)) as Box<dyn FrameSource>)
            })
        }),
        (None, None) => bail!("no frame source given, use --frames or --device-root"),
    };

    let stop = handle.stop_signal();
    loop {
        tokio::select! {
            event = handle.recv() => match event {
                Some(MonitorEvent::Started { device_index, restart_id }) => {
                    log::info!("capture device {device_index} opened, restart id {restart_id}");
                }
                Some(MonitorEvent::Frame(report)) => {
                    log::debug!("frame {} at {}: lit {:?}", report.frame_index, report.timestamp, report.bright_cells);
                }
                Some(MonitorEvent::Analysis(reports)) => {
                    let charged = reports.iter().filter(|r| r.status == CellStatus::Charged).count();
                    log::info!("analysis pass: {charged}/{} cells charged", reports.len());
                }
                Some(MonitorEvent::Warning(message)) => log::warn!("{message}"),
                Some(MonitorEvent::Fatal(err)) => log::error!("monitor stopping: {err}"),
                Some(MonitorEvent::Stopped { frames }) => {
                    log::info!("monitor finished after {frames} frames");
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupt received, stopping monitor");
                stop.request();
            }
        }
    }
    handle.join().await.context("monitoring ended with an error")?;
    Ok(())
}

fn emit_report(report: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, report).with_context(|| format!("writing report to {}", path.display()))?;
            log::info!("report written to {}", path.display());
        }
        None => print!("{report}"),
    }
    Ok(())
}
