// SPDX-License-Identifier: MPL-2.0

//! Square complex fields stored in row major order.

use rayon::prelude::*;
use rustfft::num_complex::Complex;

use crate::error::{Error, Result};

// Transform buffers are handed around as interleaved (re, im) pairs of f64.
const _: () = {
    assert!(std::mem::size_of::<Complex<f64>>() == 2 * std::mem::size_of::<f64>());
    assert!(std::mem::align_of::<Complex<f64>>() == std::mem::align_of::<f64>());
};

/// An N×N array of complex samples, row major.
///
/// The length of the underlying buffer is always `size * size`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexField {
    size: usize,
    data: Vec<Complex<f64>>,
}

impl ComplexField {
    /// Allocate a field of side `size` filled with zeros.
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            data: vec![Complex::default(); size * size],
        }
    }

    /// Wrap an existing row major buffer.
    pub fn from_vec(size: usize, data: Vec<Complex<f64>>) -> Result<Self> {
        if data.len() != size * size {
            return Err(Error::SizeMismatch {
                expected: size * size,
                actual: data.len(),
            });
        }
        Ok(Self { size, data })
    }

    /// Build a field from real samples, imaginary parts set to zero.
    pub fn from_real<T: Copy + Into<f64> + Sync>(size: usize, samples: &[T]) -> Result<Self> {
        let mut field = Self::zeros(size);
        field.load_real(samples)?;
        Ok(field)
    }

    /// Overwrite the field with real samples, explicitly zeroing the imaginary parts.
    pub fn load_real<T: Copy + Into<f64> + Sync>(&mut self, samples: &[T]) -> Result<()> {
        if samples.len() != self.data.len() {
            return Err(Error::SizeMismatch {
                expected: self.data.len(),
                actual: samples.len(),
            });
        }
        self.data
            .par_iter_mut()
            .zip(samples.par_iter())
            .for_each(|(z, &s)| *z = Complex::new(s.into(), 0.0));
        Ok(())
    }

    /// Overwrite the field with a copy of another field of the same size.
    pub fn copy_from(&mut self, other: &ComplexField) -> Result<()> {
        if other.size != self.size {
            return Err(Error::SizeMismatch {
                expected: self.data.len(),
                actual: other.data.len(),
            });
        }
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    /// Side length N.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of samples, N².
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for the degenerate 0×0 field.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sample at `(row, col)`, or `None` outside the field.
    pub fn get(&self, row: usize, col: usize) -> Option<Complex<f64>> {
        if row < self.size && col < self.size {
            Some(self.data[row * self.size + col])
        } else {
            None
        }
    }

    /// Mutable sample at `(row, col)`, or `None` outside the field.
    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut Complex<f64>> {
        if row < self.size && col < self.size {
            Some(&mut self.data[row * self.size + col])
        } else {
            None
        }
    }

    /// One row of the field.
    pub fn row(&self, row: usize) -> &[Complex<f64>] {
        &self.data[row * self.size..(row + 1) * self.size]
    }

    /// Iterator over the rows of the field.
    pub fn rows(&self) -> std::slice::ChunksExact<'_, Complex<f64>> {
        self.data.chunks_exact(self.size.max(1))
    }

    /// Row major samples.
    pub fn as_slice(&self) -> &[Complex<f64>] {
        &self.data
    }

    /// Mutable row major samples.
    pub fn as_mut_slice(&mut self) -> &mut [Complex<f64>] {
        &mut self.data
    }

    /// View the samples as interleaved `re, im` pairs, `2 * N²` values.
    ///
    /// This is the binary layout expected by FFT libraries working on raw
    /// `[f64; 2]` complex numbers.
    pub fn as_interleaved(&self) -> &[f64] {
        bytemuck::cast_slice::<Complex<f64>, f64>(&self.data)
    }

    /// Consume the field and return its buffer.
    pub fn into_vec(self) -> Vec<Complex<f64>> {
        self.data
    }

    /// Reset every sample to zero.
    pub fn fill_zero(&mut self) {
        self.data
            .par_iter_mut()
            .for_each(|z| *z = Complex::default());
    }

    /// Multiply every sample by `factor`.
    ///
    /// Use `1 / N²` after a forward and inverse transform pair.
    pub fn scale(&mut self, factor: f64) {
        self.data.par_iter_mut().for_each(|z| *z *= factor);
    }

    /// The normalization factor `1 / N²` of a transform round trip.
    pub fn round_trip_factor(&self) -> f64 {
        1.0 / self.data.len() as f64
    }
}
