// SPDX-License-Identifier: MPL-2.0

//! Phase unwrapping with a Fourier Poisson solver.
//!
//! The wrapped phase φ is mirrored into a 2N×2N field so that it becomes
//! periodic, then the unwrapped phase ψ is estimated from
//!
//! ```text
//! ∇²ψ = cos φ ∇² sin φ - sin φ ∇² cos φ
//! ```
//!
//! with the Laplacian applied as a multiplication by `r² = kx² + ky²` in the
//! Fourier domain (the constant factors cancel between the two directions).
//! The estimate is finally snapped to the closest φ + 2πk.

use std::f64::consts::PI;

use rayon::prelude::*;
use rustfft::num_complex::Complex;

use crate::error::{Error, Result};
use crate::field::ComplexField;
use crate::slice::TransformPlan;

/// Unwrap an N×N phase map given in radians.
pub fn unwrap_phase(size: usize, wrapped: &[f64]) -> Result<Vec<f64>> {
    if wrapped.len() != size * size {
        return Err(Error::SizeMismatch {
            expected: size * size,
            actual: wrapped.len(),
        });
    }
    let m = 2 * size;
    let forward = TransformPlan::forward(m)?;
    let inverse = TransformPlan::inverse(m)?;
    let r2 = squared_frequencies(m);

    let mirrored = mirror(size, wrapped);
    let cos = ComplexField::from_real(m, &mirrored.iter().map(|p| p.cos()).collect::<Vec<_>>())?;
    let sin = ComplexField::from_real(m, &mirrored.iter().map(|p| p.sin()).collect::<Vec<_>>())?;

    // cos ∇² sin - sin ∇² cos
    let lap_sin = laplacian(&forward, &inverse, &r2, &sin)?;
    let lap_cos = laplacian(&forward, &inverse, &r2, &cos)?;
    let mut rhs = ComplexField::zeros(m);
    rhs.as_mut_slice()
        .par_iter_mut()
        .zip(cos.as_slice().par_iter().zip(sin.as_slice().par_iter()))
        .zip(lap_sin.as_slice().par_iter().zip(lap_cos.as_slice().par_iter()))
        .for_each(|((out, (c, s)), (ls, lc))| *out = c * ls - s * lc);

    // Inverse Laplacian, the undetermined mean is set to zero.
    forward.execute(&mut rhs)?;
    rhs.as_mut_slice()
        .par_iter_mut()
        .zip(r2.par_iter())
        .for_each(|(z, &r)| *z = if r > 0.0 { *z / r } else { Complex::default() });
    inverse.execute(&mut rhs)?;
    let factor = rhs.round_trip_factor();

    let mut unwrapped = Vec::with_capacity(size * size);
    for (estimate_row, wrapped_row) in rhs.rows().take(size).zip(wrapped.chunks_exact(size)) {
        unwrapped.extend(estimate_row[..size].iter().zip(wrapped_row).map(|(e, &p)| {
            let estimate = e.re * factor;
            p + 2.0 * PI * ((estimate - p) / (2.0 * PI)).round()
        }));
    }
    Ok(unwrapped)
}

/// `IFFT(r² FFT(field))`, normalized.
fn laplacian(
    forward: &TransformPlan,
    inverse: &TransformPlan,
    r2: &[f64],
    field: &ComplexField,
) -> Result<ComplexField> {
    let mut out = field.clone();
    forward.execute(&mut out)?;
    out.as_mut_slice()
        .par_iter_mut()
        .zip(r2.par_iter())
        .for_each(|(z, &r)| *z *= r);
    inverse.execute(&mut out)?;
    let factor = out.round_trip_factor();
    out.scale(factor);
    Ok(out)
}

/// `kx² + ky²` with frequencies in natural transform order, zero at (0, 0).
fn squared_frequencies(m: usize) -> Vec<f64> {
    let k2: Vec<f64> = (0..m)
        .map(|i| {
            let k = if i < m / 2 { i as f64 } else { i as f64 - m as f64 };
            k * k
        })
        .collect();
    let mut r2 = Vec::with_capacity(m * m);
    for &ky in &k2 {
        r2.extend(k2.iter().map(|&kx| ky + kx));
    }
    r2
}

/// Mirror an N×N map into the four quadrants of a 2N×2N map.
fn mirror(size: usize, values: &[f64]) -> Vec<f64> {
    let m = 2 * size;
    let mut out = vec![0.0; m * m];
    for (y, row) in values.chunks_exact(size).enumerate() {
        for (x, &v) in row.iter().enumerate() {
            let (my, mx) = (m - 1 - y, m - 1 - x);
            out[y * m + x] = v;
            out[y * m + mx] = v;
            out[my * m + x] = v;
            out[my * m + mx] = v;
        }
    }
    out
}
