use anyhow::{Context, Result};
use charge_vision::core_modules::brightness_sampler::BrightnessSampler;
use charge_vision::core_modules::calibration::load_border;
use charge_vision::core_modules::frame_source::{FrameSource, ImageSequenceSource};
use charge_vision::core_modules::grid_geometry::GridGeometry;
use charge_vision::core_modules::utils::image_helper::image_helper;
use charge_vision::{DeviceKind, MonitorConfig};
use clap::{Parser, ValueEnum};
use image::DynamicImage;
use std::path::PathBuf;

/// Replays a directory of frames through the brightness sampler and writes
/// annotated copies: cell outlines on every frame, lit cells tinted red.
#[derive(Parser, Debug)]
#[command(name = "visual_tester")]
#[command(version)]
struct Args {
    /// Directory of input frames (png, jpg, bmp), processed in file-name order
    input_dir: PathBuf,

    /// Directory the annotated frames are written to
    output_dir: PathBuf,

    /// Border file of the device in the frames
    #[arg(short, long)]
    border_file: PathBuf,

    #[arg(short, long, value_enum, default_value = "charging-case")]
    device: Device,

    /// Monitor settings file (JSON) for thresholds. Defaults are used when it does not exist.
    #[arg(short, long, default_value = "monitor_config.json")]
    config: PathBuf,

    /// Also write the binarized bright mask of each frame
    #[arg(long)]
    masks: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Device {
    ChargingCase,
    HearingAid,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --- 1. Argument Parsing & Setup ---
    let args = Args::parse();
    let kind = match args.device {
        Device::ChargingCase => DeviceKind::ChargingCase,
        Device::HearingAid => DeviceKind::HearingAid,
    };
    let config = MonitorConfig::load(&args.config)?;
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    // --- 2. Geometry & Sampler Initialization ---
    let border = load_border(&args.border_file)?;
    let geometry = GridGeometry::new(border, kind.profile().layout)?;
    let sampler = BrightnessSampler::new(config.bright_threshold, config.bright_pixel_ratio);
    let mut source = ImageSequenceSource::open(&args.input_dir)?;
    log::info!("{} frames, {} cells", source.len(), geometry.cell_count());

    // --- 3. Main Processing Loop ---
    let mut index = 0usize;
    let mut lit_frames = 0usize;
    while let Some(frame) = source.read_frame()? {
        let sampling = sampler.sample(&frame, geometry.regions());
        if !sampling.bright_cells.is_empty() {
            lit_frames += 1;
        }
        log::info!("frame {index:05}: lit cells {:?}", sampling.bright_cells);

        // --- 4. Visualization ---
        let overlay = image_helper::draw_overlay(&frame, geometry.regions(), &sampling.bright_cells);
        image_helper::save(&args.output_dir.join(format!("frame_{index:05}.png")), &overlay)?;

        if args.masks {
            let mask = DynamicImage::ImageLuma8(sampling.mask).to_rgb8();
            image_helper::save(&args.output_dir.join(format!("mask_{index:05}.png")), &mask)?;
        }
        index += 1;
    }
    source.release();

    println!(
        "Processing complete. {index} frames ({lit_frames} with lit cells) written to {}",
        args.output_dir.display()
    );
    Ok(())
}
