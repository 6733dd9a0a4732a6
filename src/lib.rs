// SPDX-License-Identifier: MPL-2.0

//! Phase reconstruction of off-axis holograms with 2D Fourier transforms.
//!
//! The spectrum of an off-axis hologram holds a zero order term at its center
//! and two conjugate sidebands. Cropping one sideband, moving it to the center
//! and transforming back gives the complex wavefront, whose phase is the
//! information of interest.
//!
//! ```
//! use holofft::{PipelineContext, Region};
//!
//! let size = 64;
//! let hologram = vec![0.5; size * size];
//! let mut pipeline = PipelineContext::new(size)?;
//! let result = pipeline.process(&hologram, &Region::centered_at(48, 48, 16))?;
//! assert_eq!(result.phase.len(), size * size);
//! # Ok::<(), holofft::Error>(())
//! ```
//!
//! The forward transform can also be split by rows over a group of workers,
//! see the [`distributed`] module.

#![warn(missing_docs)]

pub mod config;
pub mod distributed;
pub mod error;
pub mod field;
pub mod phase;
pub mod pipeline;
pub mod sideband;
// default implementation on mutable slices
pub mod slice;
pub mod unwrap;

pub use config::ReconstructionConfig;
pub use error::{Error, Result};
pub use field::ComplexField;
pub use pipeline::{PipelineContext, Reconstruction, RegionSource, SharedRegion};
pub use rustfft::num_complex::Complex;
pub use sideband::Region;
pub use slice::TransformPlan;
