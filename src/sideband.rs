// SPDX-License-Identifier: MPL-2.0

//! Isolation of one sideband (satellite) of a centered spectrum.
//!
//! The region of interest is cropped out of the spectrum and moved so that
//! its center lands on the center of a zero filled field. Everything else,
//! the zero order term and the conjugate sideband, is suppressed.

use rayon::prelude::*;
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::ComplexField;

/// Square window `[y, y + width) × [x, x + width)` in centered spectrum coordinates.
///
/// The window may extend past the field, or lie completely outside of it.
/// Parts outside of the field contribute zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Region {
    /// Left column of the window.
    pub x: i64,
    /// Top row of the window.
    pub y: i64,
    /// Side length of the window.
    pub width: usize,
}

impl Region {
    /// Window with top left corner at `(x, y)`.
    pub fn new(x: i64, y: i64, width: usize) -> Self {
        Self { x, y, width }
    }

    /// Window of side `width` whose center is at `(cx, cy)`.
    pub fn centered_at(cx: i64, cy: i64, width: usize) -> Self {
        let half = i64::try_from(width / 2).unwrap_or(i64::MAX);
        Self::new(cx.saturating_sub(half), cy.saturating_sub(half), width)
    }

    /// The whole N×N field.
    pub fn full(size: usize) -> Self {
        Self::new(0, 0, size)
    }

    /// The window that an extracted sideband occupies in a field of side `size`.
    pub fn recentered(&self, size: usize) -> Self {
        Self::centered_at((size / 2) as i64, (size / 2) as i64, self.width)
    }
}

/// Crop `region` out of `spectrum` into a new field, centered.
pub fn extract(spectrum: &ComplexField, region: Region) -> ComplexField {
    let mut out = ComplexField::zeros(spectrum.size());
    extract_rows(spectrum, region, out.as_mut_slice());
    out
}

/// Crop `region` out of `spectrum` into `out`, centered.
///
/// The source sample `(y, x)` goes to
/// `(N/2 + y - region.y - width/2, N/2 + x - region.x - width/2)`.
/// Sources outside of the spectrum are skipped, as are targets outside of `out`.
/// All other samples of `out` are zero.
pub fn extract_into(spectrum: &ComplexField, region: Region, out: &mut ComplexField) -> Result<()> {
    if out.size() != spectrum.size() {
        return Err(Error::SizeMismatch {
            expected: spectrum.len(),
            actual: out.len(),
        });
    }
    extract_rows(spectrum, region, out.as_mut_slice());
    Ok(())
}

fn extract_rows(spectrum: &ComplexField, region: Region, out: &mut [Complex<f64>]) {
    let size = spectrum.size();
    if size == 0 {
        return;
    }
    // Bounds are computed in i128 so that no i64 region overflows.
    let n = size as i128;
    let width = region.width as i128;
    let (rx, ry) = (i128::from(region.x), i128::from(region.y));
    // Translation from source to target coordinates, same on both axes.
    let shift = n / 2 - width / 2;

    // Source columns kept: inside the region, inside the spectrum,
    // and landing inside the target row.
    let x_lo = rx.max(0).max(rx - shift);
    let x_hi = (rx + width).min(n).min(rx - shift + n);

    out.par_chunks_exact_mut(size)
        .enumerate()
        .for_each(|(new_y, out_row)| {
            out_row.fill(Complex::default());
            let y = new_y as i128 - shift + ry;
            let inside_region = y >= ry && y < ry + width;
            if !inside_region || y < 0 || y >= n || x_lo >= x_hi {
                return;
            }
            // All of these are in 0..=n now.
            let src_row = spectrum.row(y as usize);
            let new_x_lo = (x_lo + shift - rx) as usize;
            let new_x_hi = (x_hi + shift - rx) as usize;
            out_row[new_x_lo..new_x_hi].copy_from_slice(&src_row[x_lo as usize..x_hi as usize]);
        });
}
