// SPDX-License-Identifier: MPL-2.0

//! Phase demodulation and spectrum visualization helpers.

use std::f64::consts::PI;

use rayon::prelude::*;
use rustfft::num_complex::Complex;

use crate::error::{Error, Result};

/// Display factor applied to spectrum magnitudes, 1 / 300.
pub const DEFAULT_DISPLAY_SCALE: f64 = 1.0 / 300.0;

/// Phase of `z` mapped linearly from (-π, π] onto [0, 1].
///
/// An angle of 0 gives 0.5, -π gives 0 and π gives 1.
#[inline]
pub fn normalized_phase(z: Complex<f64>) -> f64 {
    (z.im.atan2(z.re) + PI) / (2.0 * PI)
}

/// Write the normalized phase of every sample of `field` into `out`.
pub fn demodulate_phase(field: &[Complex<f64>], out: &mut [f64]) -> Result<()> {
    check_len(field.len(), out.len())?;
    out.par_iter_mut()
        .zip(field.par_iter())
        .for_each(|(p, &z)| *p = normalized_phase(z));
    Ok(())
}

/// Write the phase of every sample of `field` into `out`, in radians.
pub fn phase_angle(field: &[Complex<f64>], out: &mut [f64]) -> Result<()> {
    check_len(field.len(), out.len())?;
    out.par_iter_mut()
        .zip(field.par_iter())
        .for_each(|(p, z)| *p = z.arg());
    Ok(())
}

/// Magnitude of every sample multiplied by `factor`, for display.
pub fn magnitude_spectrum(field: &[Complex<f64>], factor: f64) -> Vec<f64> {
    field.par_iter().map(|z| z.norm() * factor).collect()
}

/// Reverse the order of the rows of a row major buffer.
///
/// This is only a display convention (the phase images are shown upside down),
/// the values themselves are untouched.
pub fn flip_vertical<T>(width: usize, data: &mut [T]) {
    if width == 0 {
        return;
    }
    let height = data.len() / width;
    let (top, bottom) = data.split_at_mut((height / 2) * width);
    let bottom_start = bottom.len() - (height / 2) * width;
    let bottom = &mut bottom[bottom_start..];
    for (top_row, bottom_row) in top
        .chunks_exact_mut(width)
        .zip(bottom.chunks_exact_mut(width).rev())
    {
        top_row.swap_with_slice(bottom_row);
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::SizeMismatch { expected, actual });
    }
    Ok(())
}
