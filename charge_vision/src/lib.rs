// THEORY:
// This file is the main entry point for the `charge_vision` library crate. It
// exposes the monitor as two layers:
//
// 1.  `MonitorSession` (in `pipeline`), a synchronous per-frame driver that
//     can be fed frames directly, and
// 2.  `MonitorWorker` (in `monitor_worker`), which runs a session against a
//     `FrameSource` on a dedicated worker and reports back over a channel.
//
// The building blocks in `core_modules` stay public so tools such as the
// visual tester and the log analyzers can use them on their own.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod monitor_worker;
pub mod pipeline;

pub use config::{MonitorConfig, SegmentFormat};
pub use core_modules::device_profile::{DeviceKind, DeviceProfile};
pub use error::{CaptureError, ConfigError, LogIoError, MonitorError, Result};
pub use monitor_worker::{MonitorEvent, MonitorHandle, MonitorWorker, StopSignal};
pub use pipeline::{CellReport, FrameOutcome, MonitorSession};
