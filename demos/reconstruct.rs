// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;
use std::time::Instant;

use clap::{ArgAction, Parser};
use holofft::pipeline::load_intensity;
use holofft::{PipelineContext, ReconstructionConfig, Region};
use image::GrayImage;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Reconstruct the phase of an off-axis hologram",
    long_about = None
)]
struct Args {
    /// Hologram image, single channel, N×N
    image: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Left column of the sideband region
    #[arg(short = 'x', long, allow_hyphen_values = true)]
    rect_x: Option<i64>,

    /// Top row of the sideband region
    #[arg(short = 'y', long, allow_hyphen_values = true)]
    rect_y: Option<i64>,

    /// Side of the sideband region
    #[arg(short = 'w', long)]
    rect_w: Option<usize>,

    /// Side N of the holograms, the image must be N×N
    /// (defaults to the configuration file, or to the image width without one)
    #[arg(short, long)]
    size: Option<usize>,

    /// Number of frames to run on the same image
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    frames: u64,

    /// Where to save the phase map
    #[arg(short, long, default_value = "phase.png")]
    output: PathBuf,

    /// Also save the magnitude spectrum there
    #[arg(long)]
    spectrum: Option<PathBuf>,

    /// Also save the unwrapped phase there, stretched to the full gray range
    #[arg(long)]
    unwrapped: Option<PathBuf>,

    /// Verbosity level (-v=info, -vv=debug, -vvv=trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Field size from the command line, then the configuration file, then the image.
fn field_size(args: &Args, config: &ReconstructionConfig, image_width: usize) -> usize {
    match (args.size, &args.config) {
        (Some(size), _) => size,
        (None, Some(_)) => config.size,
        (None, None) => image_width,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .try_init();

    let mut config = match &args.config {
        Some(path) => ReconstructionConfig::from_path(path)?,
        None => ReconstructionConfig::default(),
    };
    let region = config.region;
    config.region = Region::new(
        args.rect_x.unwrap_or(region.x),
        args.rect_y.unwrap_or(region.y),
        args.rect_w.unwrap_or(region.width),
    );

    // Open image from disk.
    let img = image::open(&args.image)?.into_luma8();
    let (width, height) = img.dimensions();
    config.size = field_size(&args, &config, width as usize);
    config.validate()?;
    let intensity = load_intensity(width as usize, height as usize, img.as_raw(), config.size)?;

    let mut pipeline = PipelineContext::from_config(&config)?;
    let now = Instant::now();
    for _ in 1..args.frames {
        pipeline.process(&intensity, &config.region)?;
    }
    let result = pipeline.process(&intensity, &config.region)?;
    let secs = now.elapsed().as_secs_f64();
    info!(
        frames = result.frame,
        ms = secs * 1000.0,
        fps = result.frame as f64 / secs,
        "reconstruction done"
    );

    let phase_u8: Vec<u8> = result.phase.iter().map(|p| (p * 255.0) as u8).collect();
    GrayImage::from_raw(width, height, phase_u8)
        .ok_or("phase map does not fit the image")?
        .save(&args.output)?;

    if let Some(path) = &args.spectrum {
        let spectrum_u8: Vec<u8> = result
            .spectrum_magnitude(config.display_scale)
            .iter()
            .map(|m| (m.min(1.0) * 255.0) as u8)
            .collect();
        GrayImage::from_raw(width, height, spectrum_u8)
            .ok_or("spectrum does not fit the image")?
            .save(path)?;
    }

    if let Some(path) = &args.unwrapped {
        let unwrapped = result.unwrapped_phase()?;
        let (lo, hi) = unwrapped
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &p| (lo.min(p), hi.max(p)));
        let range = if hi > lo { hi - lo } else { 1.0 };
        let pixels: Vec<u8> = unwrapped
            .iter()
            .map(|p| ((p - lo) / range * 255.0) as u8)
            .collect();
        GrayImage::from_raw(width, height, pixels)
            .ok_or("unwrapped phase does not fit the image")?
            .save(path)?;
    }
    Ok(())
}
