// THEORY:
// The monitor loop runs on its own blocking worker so a slow camera read never
// stalls the caller. The worker owns the `MonitorSession` and the frame source
// outright; the only things shared with the caller are the event channel, the
// latest-frame slot and the stop flag.
//
// Key architectural principles:
// 1.  **One Owner Per Device**: The source is opened, read and released on the
//     worker thread. The caller never touches it.
// 2.  **Events, Not Shared State**: Every frame result, analysis pass and
//     failure is posted as a `MonitorEvent` on an unbounded channel. A UI can
//     `drain()` whatever is queued on each refresh, or `recv()` them in order.
//     Events are small; the frame image itself is not queued. Only the most
//     recent frame is kept, in a `watch` slot the UI reads when it redraws, so
//     a caller that falls behind never accumulates images.
// 3.  **Guarded Shutdown**: The stop flag lives behind a mutex, and the worker
//     holds that mutex while releasing the device. A `stop()` that races with
//     shutdown waits for the release to finish instead of interleaving with it.
// 4.  **Failure Classes**: An open failure on both device indices, or any frame
//     read failure, ends the loop with `Fatal` and makes `join()` return that
//     error. Log write failures are posted as `Warning` and the loop keeps
//     going. End of stream is a normal stop.

use crate::core_modules::frame_source::FrameSource;
use crate::core_modules::records::format_record_time;
use crate::error::{CaptureError, MonitorError};
use crate::pipeline::{CellReport, MonitorSession};
use chrono::{DateTime, Local};
use image::RgbImage;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// What the UI gets for every processed frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Zero-based position of the frame in this run.
    pub frame_index: u64,
    pub timestamp: String,
    pub bright_cells: Vec<usize>,
    pub ratios: Vec<f64>,
}

#[derive(Debug)]
pub enum MonitorEvent {
    Started { device_index: u32, restart_id: String },
    Frame(FrameReport),
    Analysis(Vec<CellReport>),
    /// A recovered problem, such as a failed log write.
    Warning(String),
    /// The loop cannot continue. Always followed by `Stopped`.
    Fatal(MonitorError),
    Stopped { frames: u64 },
}

/// Cooperative stop flag shared by the caller and the worker.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<Mutex<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the worker to stop. Blocks while the worker is releasing the device.
    pub fn request(&self) {
        *self.lock() = true;
    }

    pub fn is_requested(&self) -> bool {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        // A panicking holder cannot leave the flag half-written.
        self.requested.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Caller side of a running monitor.
pub struct MonitorHandle {
    events: mpsc::UnboundedReceiver<MonitorEvent>,
    latest_frame: watch::Receiver<Option<Arc<RgbImage>>>,
    stop: StopSignal,
    worker: JoinHandle<Result<u64, MonitorError>>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        self.stop.request();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Takes every event queued so far without waiting.
    pub fn drain(&mut self) -> Vec<MonitorEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Waits for the next event. `None` once the worker has exited and the queue is empty.
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        self.events.recv().await
    }

    /// The most recently processed frame, if any. Stays readable after the worker exits.
    pub fn latest_frame(&self) -> Option<Arc<RgbImage>> {
        self.latest_frame.borrow().clone()
    }

    /// Waits for the worker to exit. Returns how many frames it processed, or
    /// the fatal error that ended the loop.
    pub async fn join(self) -> Result<u64, MonitorError> {
        match self.worker.await {
            Ok(result) => result,
            Err(err) => Err(MonitorError::Worker(err.to_string())),
        }
    }
}

pub struct MonitorWorker;

impl MonitorWorker {
    /// Starts the monitor loop on a blocking worker, stamping frames with the local clock.
    pub fn spawn<S, F>(session: MonitorSession, open: F) -> MonitorHandle
    where
        S: FrameSource + 'static,
        F: FnOnce() -> Result<(u32, S), CaptureError> + Send + 'static,
    {
        Self::spawn_with_clock(session, open, Local::now)
    }

    /// Like `spawn`, with frame timestamps taken from `clock`.
    pub fn spawn_with_clock<S, F, C>(session: MonitorSession, open: F, clock: C) -> MonitorHandle
    where
        S: FrameSource + 'static,
        F: FnOnce() -> Result<(u32, S), CaptureError> + Send + 'static,
        C: FnMut() -> DateTime<Local> + Send + 'static,
    {
        let (event_sender, events) = mpsc::unbounded_channel();
        let (frame_sender, latest_frame) = watch::channel(None);
        let stop = StopSignal::new();
        let worker_stop = stop.clone();
        let outputs = WorkerOutputs {
            events: event_sender,
            latest_frame: frame_sender,
        };
        let worker = tokio::task::spawn_blocking(move || run_monitor(session, open, clock, worker_stop, outputs));

        MonitorHandle {
            events,
            latest_frame,
            stop,
            worker,
        }
    }
}

struct WorkerOutputs {
    events: mpsc::UnboundedSender<MonitorEvent>,
    latest_frame: watch::Sender<Option<Arc<RgbImage>>>,
}

fn run_monitor<S, F, C>(
    mut session: MonitorSession,
    open: F,
    mut clock: C,
    stop: StopSignal,
    outputs: WorkerOutputs,
) -> Result<u64, MonitorError>
where
    S: FrameSource,
    F: FnOnce() -> Result<(u32, S), CaptureError>,
    C: FnMut() -> DateTime<Local>,
{
    let events = &outputs.events;
    let (device_index, mut source) = match open() {
        Ok(opened) => opened,
        Err(err) => {
            log::error!("cannot open capture device: {err}");
            let err = MonitorError::from(err);
            let _ = events.send(MonitorEvent::Fatal(err.clone()));
            let _ = events.send(MonitorEvent::Stopped { frames: 0 });
            return Err(err);
        }
    };
    log::info!("monitoring {} on device {}", session.profile().kind, device_index);
    let _ = events.send(MonitorEvent::Started {
        device_index,
        restart_id: session.restart_id().to_string(),
    });

    let mut frames = 0u64;
    let mut fatal = None;
    while !stop.is_requested() {
        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("frame source exhausted after {frames} frames");
                break;
            }
            Err(err) => {
                log::error!("frame read failed: {err}");
                let err = MonitorError::from(err);
                let _ = events.send(MonitorEvent::Fatal(err.clone()));
                fatal = Some(err);
                break;
            }
        };

        let now = clock();
        let outcome = session.process_frame(&frame, now);
        let mut delivered = true;
        for warning in outcome.warnings {
            delivered &= events.send(MonitorEvent::Warning(warning.to_string())).is_ok();
        }
        delivered &= events
            .send(MonitorEvent::Frame(FrameReport {
                frame_index: frames,
                timestamp: format_record_time(&now),
                bright_cells: outcome.sampling.bright_cells,
                ratios: outcome.sampling.ratios,
            }))
            .is_ok();
        if let Some(reports) = outcome.analysis {
            delivered &= events.send(MonitorEvent::Analysis(reports)).is_ok();
        }
        outputs.latest_frame.send_replace(Some(Arc::new(frame)));
        frames += 1;

        if !delivered {
            log::info!("event receiver dropped, stopping monitor");
            break;
        }
    }

    {
        let _held = stop.lock();
        source.release();
    }
    log::info!("monitor stopped after {frames} frames");
    let _ = events.send(MonitorEvent::Stopped { frames });
    match fatal {
        Some(err) => Err(err),
        None => Ok(frames),
    }
}
