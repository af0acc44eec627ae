// THEORY:
// `core_modules` holds the building blocks of the monitor, ordered from the
// pixels up: geometry maps a calibrated border to cell regions, the sampler
// turns a frame into per-cell ratios, the cache and classifier turn ratios
// over time into a charge state, and the logger and analysis modules persist
// and summarize the results. None of them know about threads or channels.

pub mod brightness_sampler;
pub mod calibration;
pub mod cell_classifier;
pub mod device_profile;
pub mod frame_source;
pub mod grid_geometry;
pub mod log_analysis;
pub mod records;
pub mod segmented_logger;
pub mod temporal_cache;
pub mod utils;
