// SPDX-License-Identifier: MPL-2.0

//! Single process reconstruction pipeline.
//!
//! One call to [`PipelineContext::process`] runs a full pass:
//!
//! ```text
//! intensity -> FFT -> fftshift -> sideband crop -> ifftshift -> IFFT -> phase
//! ```
//!
//! All buffers live in the context and are reused from one frame to the next,
//! no state is carried over between frames besides their allocations.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::ReconstructionConfig;
use crate::error::{Error, Result};
use crate::field::ComplexField;
use crate::phase;
use crate::sideband::{self, Region};
use crate::slice::{fftshift, ifftshift, TransformPlan};
use crate::unwrap;

/// Provides the sideband region, polled once per frame.
pub trait RegionSource {
    /// The region to extract for the next frame.
    fn current_region(&self) -> Region;
}

impl RegionSource for Region {
    fn current_region(&self) -> Region {
        *self
    }
}

impl<F: Fn() -> Region> RegionSource for F {
    fn current_region(&self) -> Region {
        self()
    }
}

/// A region that can be updated from another thread while frames are processed.
#[derive(Debug, Clone, Default)]
pub struct SharedRegion(Arc<Mutex<Region>>);

impl SharedRegion {
    /// Shared handle starting at `region`.
    pub fn new(region: Region) -> Self {
        Self(Arc::new(Mutex::new(region)))
    }

    /// Replace the region used from the next frame on.
    pub fn set(&self, region: Region) {
        let mut guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = region;
    }
}

impl RegionSource for SharedRegion {
    fn current_region(&self) -> Region {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Counts completed frames for throughput measurements.
#[derive(Debug, Clone)]
pub struct FrameCounter {
    frames: u64,
    started: Instant,
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCounter {
    /// Start counting now.
    pub fn new() -> Self {
        Self {
            frames: 0,
            started: Instant::now(),
        }
    }

    /// Record one completed frame and return the new count.
    pub fn increment(&mut self) -> u64 {
        self.frames += 1;
        self.frames
    }

    /// Number of completed frames.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Time since the counter was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Frames per second since the counter was created.
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

/// Normalize 8 bit intensity samples of a `width × height` image to [0, 1].
///
/// The image must be `size × size`.
pub fn load_intensity(width: usize, height: usize, pixels: &[u8], size: usize) -> Result<Vec<f64>> {
    if width != size || height != size {
        return Err(Error::ImageSize {
            width,
            height,
            expected: size,
        });
    }
    if pixels.len() != size * size {
        return Err(Error::SizeMismatch {
            expected: size * size,
            actual: pixels.len(),
        });
    }
    Ok(pixels.iter().map(|&p| p as f64 / 255.0).collect())
}

/// Buffers and plans of the reconstruction of N×N holograms.
#[derive(Debug)]
pub struct PipelineContext {
    size: usize,
    flip_vertical: bool,
    forward: TransformPlan,
    inverse: TransformPlan,
    spectrum: ComplexField,
    sideband: ComplexField,
    wavefront: ComplexField,
    phase: Vec<f64>,
    counter: FrameCounter,
}

/// Borrowed results of one frame.
#[derive(Debug, Clone, Copy)]
pub struct Reconstruction<'a> {
    /// Frame index, starting at 1.
    pub frame: u64,
    /// Region used for this frame.
    pub region: Region,
    /// Spectrum of the hologram with the zero frequency at the center.
    pub spectrum: &'a ComplexField,
    /// The isolated sideband, centered.
    pub sideband: &'a ComplexField,
    /// Reconstructed complex wavefront, not normalized.
    pub wavefront: &'a ComplexField,
    /// Phase of the wavefront mapped onto [0, 1].
    pub phase: &'a [f64],
}

impl Reconstruction<'_> {
    /// Displayable magnitude of the centered spectrum.
    pub fn spectrum_magnitude(&self, factor: f64) -> Vec<f64> {
        phase::magnitude_spectrum(self.spectrum.as_slice(), factor)
    }

    /// Displayable magnitude of the isolated sideband.
    pub fn sideband_magnitude(&self, factor: f64) -> Vec<f64> {
        phase::magnitude_spectrum(self.sideband.as_slice(), factor)
    }

    /// Unwrapped phase of the wavefront in radians, in the orientation of the input.
    pub fn unwrapped_phase(&self) -> Result<Vec<f64>> {
        let size = self.wavefront.size();
        let mut wrapped = vec![0.0; size * size];
        phase::phase_angle(self.wavefront.as_slice(), &mut wrapped)?;
        unwrap::unwrap_phase(size, &wrapped)
    }
}

impl PipelineContext {
    /// Plan the transforms and allocate the buffers for N×N holograms.
    pub fn new(size: usize) -> Result<Self> {
        let forward = TransformPlan::forward(size)?;
        let inverse = TransformPlan::inverse(size)?;
        debug!(size, "reconstruction pipeline ready");
        Ok(Self {
            size,
            flip_vertical: false,
            forward,
            inverse,
            spectrum: ComplexField::zeros(size),
            sideband: ComplexField::zeros(size),
            wavefront: ComplexField::zeros(size),
            phase: vec![0.0; size * size],
            counter: FrameCounter::new(),
        })
    }

    /// Pipeline configured from a validated configuration.
    pub fn from_config(config: &ReconstructionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.size)?.with_flip_vertical(config.flip_vertical))
    }

    /// Output the phase map upside down.
    pub fn with_flip_vertical(mut self, flip: bool) -> Self {
        self.flip_vertical = flip;
        self
    }

    /// Side length N.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Frame counter of this pipeline.
    pub fn counter(&self) -> &FrameCounter {
        &self.counter
    }

    /// Reconstruct the phase of one N×N hologram of intensities in [0, 1].
    pub fn process<R: RegionSource + ?Sized>(
        &mut self,
        intensity: &[f64],
        regions: &R,
    ) -> Result<Reconstruction<'_>> {
        let region = regions.current_region();

        self.spectrum.load_real(intensity)?;
        self.forward.execute(&mut self.spectrum)?;
        fftshift(self.size, self.spectrum.as_mut_slice());

        sideband::extract_into(&self.spectrum, region, &mut self.sideband)?;

        self.wavefront.copy_from(&self.sideband)?;
        ifftshift(self.size, self.wavefront.as_mut_slice());
        self.inverse.execute(&mut self.wavefront)?;

        phase::demodulate_phase(self.wavefront.as_slice(), &mut self.phase)?;
        if self.flip_vertical {
            phase::flip_vertical(self.size, &mut self.phase);
        }

        let frame = self.counter.increment();
        trace!(frame, ?region, "frame reconstructed");
        Ok(Reconstruction {
            frame,
            region,
            spectrum: &self.spectrum,
            sideband: &self.sideband,
            wavefront: &self.wavefront,
            phase: &self.phase,
        })
    }
}
