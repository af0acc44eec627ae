//! Per-device settings, resolved once when a session is built.
//!
//! Each supported device type is a variant of `DeviceKind`; its `DeviceProfile`
//! carries everything that used to differ between device types: the grid
//! layout, where its calibration and logs live, how lit cells are named in the
//! brightness records, and whether per-cell charge classification runs at all.

use crate::core_modules::grid_geometry::GridLayout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// 4x5 charging case, one status LED per slot.
    ChargingCase,
    /// 4x14 hearing-aid tray.
    HearingAid,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::ChargingCase => "charging_case",
            DeviceKind::HearingAid => "hearing_aid",
        }
    }

    pub fn profile(self) -> DeviceProfile {
        match self {
            DeviceKind::ChargingCase => DeviceProfile {
                kind: self,
                layout: GridLayout::new(4, 5),
                border_file: PathBuf::from("charging_case_border.json"),
                logs: LogPaths {
                    brightness_root: PathBuf::from("brightness_logs"),
                    status_root: Some(PathBuf::from("charging_log")),
                },
                lit_field: LitField::BrightGrids,
            },
            DeviceKind::HearingAid => DeviceProfile {
                kind: self,
                layout: GridLayout {
                    rows: 4,
                    cols: 14,
                    vertical_inset: 0.05,
                    column_shift: 0.5,
                },
                border_file: PathBuf::from("hearing_aid_border.json"),
                logs: LogPaths {
                    brightness_root: PathBuf::from("hearing_aid_logs"),
                    status_root: None,
                },
                lit_field: LitField::AbnormalGrids,
            },
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The name under which lit cell indices are written in brightness records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LitField {
    BrightGrids,
    AbnormalGrids,
}

/// Log roots, relative to the configured log directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    pub brightness_root: PathBuf,
    /// `None` for devices without per-cell status analysis.
    pub status_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub kind: DeviceKind,
    pub layout: GridLayout,
    pub border_file: PathBuf,
    pub logs: LogPaths,
    pub lit_field: LitField,
}

impl DeviceProfile {
    pub fn cell_count(&self) -> usize {
        self.layout.cell_count()
    }

    /// Whether the session classifies each cell into a charge state.
    pub fn classifies_cells(&self) -> bool {
        self.logs.status_root.is_some()
    }

    pub fn brightness_root(&self, base: &Path) -> PathBuf {
        base.join(&self.logs.brightness_root)
    }

    pub fn status_root(&self, base: &Path) -> Option<PathBuf> {
        self.logs.status_root.as_ref().map(|root| base.join(root))
    }
}
