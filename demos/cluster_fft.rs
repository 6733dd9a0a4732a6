// SPDX-License-Identifier: MPL-2.0

use std::f64::consts::PI;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use holofft::distributed::{Communicator, DistributedFft, LocalGroup};
use holofft::pipeline::load_intensity;
use holofft::phase::magnitude_spectrum;
use holofft::slice::fftshift;
use holofft::{Error, ReconstructionConfig};
use image::GrayImage;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Forward transform of a hologram split by rows over worker threads",
    long_about = None
)]
struct Args {
    /// Hologram image, single channel, N×N (a synthetic one is used otherwise)
    image: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of workers, coordinator included
    #[arg(short = 'n', long)]
    workers: Option<usize>,

    /// Side N of the holograms, a loaded image must be N×N
    /// (defaults to the configuration file, or to the image width without one)
    #[arg(short, long)]
    size: Option<usize>,

    /// Number of frames to run on the same image
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    frames: Option<u64>,

    /// Give up on a collective after that many milliseconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Save the centered magnitude spectrum of the last frame there
    #[arg(long)]
    spectrum: Option<PathBuf>,

    /// Verbosity level (-v=info, -vv=debug, -vvv=trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Fringes with a carrier of N/8 cycles along both axes.
fn synthetic_hologram(size: usize) -> Vec<f64> {
    let n = size as f64;
    let carrier = (size / 8) as f64;
    (0..size * size)
        .map(|i| {
            let (y, x) = ((i / size) as f64, (i % size) as f64);
            let r2 = (x - n / 2.0).powi(2) + (y - n / 2.0).powi(2);
            let object = 4.0 * PI * (-r2 / (n * n / 16.0)).exp();
            0.5 + 0.5 * (2.0 * PI * carrier * (x + y) / n + object).cos()
        })
        .collect()
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
    config.workers = args.workers.unwrap_or(config.workers);
    config.frames = args.frames.unwrap_or(config.frames);
    if args.timeout.is_some() {
        config.collective_timeout_ms = args.timeout;
    }

    let source = match &args.image {
        Some(path) => {
            let img = image::open(path)?.into_luma8();
            let (width, height) = img.dimensions();
            config.size = field_size(&args, &config, width as usize);
            load_intensity(width as usize, height as usize, img.as_raw(), config.size)?
        }
        None => {
            config.size = args.size.unwrap_or(config.size);
            synthetic_hologram(config.size)
        }
    };
    config.validate()?;
    let (size, frames) = (config.size, config.frames);
    info!(size, workers = config.workers, frames, "starting");

    let group = LocalGroup::new().with_timeout(config.collective_timeout());
    let results = group.run(config.workers, |comm| {
        let rank = comm.rank();
        let is_coordinator = comm.is_coordinator();
        let mut fft = DistributedFft::new(comm, size)?;
        let input = if is_coordinator { Some(&source[..]) } else { None };
        let mut last = None;
        fft.run(input, frames, |frame, spectrum| {
            if frame == frames {
                last = Some(spectrum.clone());
            }
        })
        .map_err(|err| {
            warn!(rank, %err, "worker failed");
            err
        })?;
        Ok::<_, Error>(last)
    });

    let mut spectrum = None;
    for result in results {
        if let Some(last) = result? {
            spectrum = Some(last);
        }
    }

    if let (Some(path), Some(mut spectrum)) = (&args.spectrum, spectrum) {
        fftshift(size, spectrum.as_mut_slice());
        let pixels: Vec<u8> = magnitude_spectrum(spectrum.as_slice(), config.display_scale)
            .iter()
            .map(|m| (m.min(1.0) * 255.0) as u8)
            .collect();
        GrayImage::from_raw(size as u32, size as u32, pixels)
            .ok_or("spectrum does not fit the image")?
            .save(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_frames_are_rejected() {
        assert!(Args::try_parse_from(["cluster_fft", "--frames", "0"]).is_err());
        let args = Args::try_parse_from(["cluster_fft", "--frames", "2"]).unwrap();
        assert_eq!(args.frames, Some(2));
    }

    #[test]
    fn configured_size_wins_over_the_image() {
        let config = ReconstructionConfig {
            size: 64,
            ..ReconstructionConfig::default()
        };
        let args = Args::try_parse_from(["cluster_fft", "holo.png", "-c", "run.toml"]).unwrap();
        assert_eq!(field_size(&args, &config, 128), 64);
        let args = Args::try_parse_from(["cluster_fft", "holo.png"]).unwrap();
        assert_eq!(field_size(&args, &config, 128), 128);
    }
}
