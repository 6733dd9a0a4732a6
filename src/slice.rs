// SPDX-License-Identifier: MPL-2.0

//! Fourier transform and quadrant shifts for 2D data stored in row major slices.

use std::sync::Arc;

use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftDirection, FftPlanner};

use crate::error::{Error, Result};
use crate::field::ComplexField;

/// A reusable forward or inverse 2D transform of an N×N complex field.
///
/// Planning is done once, executing only runs the transform on the field
/// passed in, in place.
/// The transformation is not normalized.
/// After a forward and inverse pair, multiply by 1 / N² to get back the input.
#[derive(Clone)]
pub struct TransformPlan {
    size: usize,
    direction: FftDirection,
    fft: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for TransformPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPlan")
            .field("size", &self.size)
            .field("direction", &self.direction)
            .finish()
    }
}

impl TransformPlan {
    /// Plan a transform of an N×N field in the given direction.
    pub fn new(size: usize, direction: FftDirection) -> Result<Self> {
        if size == 0 {
            return Err(Error::Plan { size });
        }
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft(size, direction);
        Ok(Self {
            size,
            direction,
            fft,
        })
    }

    /// Plan a forward transform.
    pub fn forward(size: usize) -> Result<Self> {
        Self::new(size, FftDirection::Forward)
    }

    /// Plan an inverse transform.
    pub fn inverse(size: usize) -> Result<Self> {
        Self::new(size, FftDirection::Inverse)
    }

    /// Side length of the fields this plan accepts.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Direction of the transform.
    pub fn direction(&self) -> FftDirection {
        self.direction
    }

    /// Transform the field in place.
    ///
    /// The result is in natural order, the zero frequency at (0, 0).
    pub fn execute(&self, field: &mut ComplexField) -> Result<()> {
        if field.size() != self.size {
            return Err(Error::SizeMismatch {
                expected: self.size * self.size,
                actual: field.len(),
            });
        }
        let size = self.size;
        let buffer = field.as_mut_slice();
        process_rows(self.fft.as_ref(), size, buffer);
        transpose_square(size, buffer);
        process_rows(self.fft.as_ref(), size, buffer);
        transpose_square(size, buffer);
        Ok(())
    }

    /// Transform each row of a row major buffer with the 1D plan.
    ///
    /// This is the local half of a row distributed 2D transform.
    pub fn execute_rows(&self, rows: &mut [Complex<f64>]) -> Result<()> {
        if rows.len() % self.size != 0 {
            return Err(Error::SizeMismatch {
                expected: (rows.len() / self.size + 1) * self.size,
                actual: rows.len(),
            });
        }
        process_rows(self.fft.as_ref(), self.size, rows);
        Ok(())
    }
}

/// Compute the 2D Fourier transform of an image buffer.
///
/// The image buffer is considered to be stored in row major order.
/// The buffer contains the Fourier transform in the same row major order
/// once the function returns.
///
/// The transformation is not normalized.
/// If the transformed buffer is intended to be processed
/// and then converted back into an image with an inverse Fourier transform,
/// multiply at the end by 1 / (width * height).
///
/// Remark: an allocation the size of the image buffer is performed for the transposition.
pub fn fft_2d(width: usize, height: usize, img_buffer: &mut [Complex<f64>]) {
    fft_2d_with_direction(width, height, img_buffer, FftDirection::Forward)
}

/// Compute the inverse 2D Fourier transform to get back an image buffer.
///
/// The transformation is not normalized.
/// If this is used as a pair of FFT followed by inverse FFT,
/// normalize only once by 1 / (width * height) at the end.
pub fn ifft_2d(width: usize, height: usize, img_buffer: &mut [Complex<f64>]) {
    fft_2d_with_direction(width, height, img_buffer, FftDirection::Inverse)
}

fn fft_2d_with_direction(
    width: usize,
    height: usize,
    img_buffer: &mut [Complex<f64>],
    direction: FftDirection,
) {
    let mut planner = FftPlanner::new();

    // FFT of each row of the image.
    let fft_width = planner.plan_fft(width, direction);
    process_rows(fft_width.as_ref(), width, img_buffer);

    // Transpose so that columns become rows, then transpose back.
    let mut transposed = transpose(width, height, img_buffer);
    let fft_height = planner.plan_fft(height, direction);
    process_rows(fft_height.as_ref(), height, &mut transposed);
    transpose_into(height, width, &transposed, img_buffer);
}

fn process_rows(fft: &dyn Fft<f64>, width: usize, buffer: &mut [Complex<f64>]) {
    buffer.par_chunks_exact_mut(width).for_each_init(
        || vec![Complex::default(); fft.get_inplace_scratch_len()],
        |scratch, row| fft.process_with_scratch(row, scratch),
    );
}

fn transpose<T: Copy + Default>(width: usize, height: usize, matrix: &[T]) -> Vec<T> {
    let mut transposed = vec![T::default(); matrix.len()];
    transpose_into(width, height, matrix, &mut transposed);
    transposed
}

fn transpose_into<T: Copy>(width: usize, height: usize, matrix: &[T], transposed: &mut [T]) {
    let mut ind = 0;
    let mut ind_tr;
    for row in 0..height {
        ind_tr = row;
        for _ in 0..width {
            transposed[ind_tr] = matrix[ind];
            ind += 1;
            ind_tr += height;
        }
    }
}

/// Transpose a square row major matrix in place.
pub fn transpose_square<T>(size: usize, matrix: &mut [T]) {
    for row in 0..size {
        for col in row + 1..size {
            matrix.swap(row * size + col, col * size + row);
        }
    }
}

/// Shift the 4 quadrants of a square Fourier transform to have
/// the zero frequency at the center of the field.
///
/// With h = N / 2, the top left h×h block is swapped with the block at (h, h),
/// then rows h..N swap their first h columns with columns h..2h of row - h.
/// For an odd N the quadrants have different sizes and the middle row and column
/// are left where the swap order puts them, so this is not a rotation by N / 2.
pub fn fftshift<T>(size: usize, matrix: &mut [T]) {
    let half = size / 2;

    // Swap top left and bottom right.
    for y in 0..half {
        for x in 0..half {
            matrix.swap(y * size + x, (y + half) * size + x + half);
        }
    }

    // Swap bottom left and top right.
    for y in half..size {
        for x in 0..half {
            matrix.swap(y * size + x, (y - half) * size + x + half);
        }
    }
}

/// Inverse operation of the quadrants shift performed by fftshift,
/// moving the zero frequency back to (0, 0) before an inverse transform.
///
/// This is the same swap as fftshift,
/// exactly its inverse only when N is even.
pub fn ifftshift<T>(size: usize, matrix: &mut [T]) {
    fftshift(size, matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp(size: usize) -> Vec<Complex<f64>> {
        (0..size * size)
            .map(|i| Complex::new(i as f64, (i % 3) as f64))
            .collect()
    }

    #[test]
    fn fftshift_even_is_an_involution() {
        let original = ramp(6);
        let mut data = original.clone();
        fftshift(6, &mut data);
        assert_ne!(data, original);
        fftshift(6, &mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn fftshift_moves_zero_frequency_to_center() {
        let mut data: Vec<u32> = (0..16).collect();
        fftshift(4, &mut data);
        assert_eq!(data[2 * 4 + 2], 0);
        #[rustfmt::skip]
        let expected = vec![
            10, 11, 8, 9,
            14, 15, 12, 13,
            2, 3, 0, 1,
            6, 7, 4, 5,
        ];
        assert_eq!(data, expected);
    }

    #[test]
    fn fftshift_odd_keeps_swap_order() {
        let mut data: Vec<u32> = (0..9).collect();
        fftshift(3, &mut data);
        // h = 1: (0,0)<->(1,1), then (1,0)<->(0,1) and (2,0)<->(1,1).
        assert_eq!(data, vec![4, 3, 2, 1, 6, 5, 0, 7, 8]);
        fftshift(3, &mut data);
        assert_ne!(data, (0..9).collect::<Vec<u32>>());
    }

    #[test]
    fn plan_rejects_empty_size() {
        assert!(matches!(
            TransformPlan::forward(0),
            Err(Error::Plan { size: 0 })
        ));
    }

    #[test]
    fn plan_rejects_wrong_field_size() {
        let plan = TransformPlan::forward(8).unwrap();
        let mut field = ComplexField::zeros(4);
        assert!(matches!(
            plan.execute(&mut field),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn plan_round_trip_recovers_input() {
        let size = 16;
        let original = ComplexField::from_vec(size, ramp(size)).unwrap();
        let mut field = original.clone();
        TransformPlan::forward(size).unwrap().execute(&mut field).unwrap();
        TransformPlan::inverse(size).unwrap().execute(&mut field).unwrap();
        let factor = field.round_trip_factor();
        field.scale(factor);
        for (a, b) in field.as_slice().iter().zip(original.as_slice()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-9);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn plan_output_is_not_transposed() {
        // A pure horizontal frequency must end up on row 0.
        let size = 8;
        let samples: Vec<Complex<f64>> = (0..size * size)
            .map(|i| {
                let x = (i % size) as f64;
                Complex::from_polar(1.0, 2.0 * std::f64::consts::PI * 2.0 * x / size as f64)
            })
            .collect();
        let mut field = ComplexField::from_vec(size, samples).unwrap();
        TransformPlan::forward(size).unwrap().execute(&mut field).unwrap();
        let peak = field.get(0, 2).unwrap();
        assert_abs_diff_eq!(peak.norm(), (size * size) as f64, epsilon = 1e-9);
        assert_abs_diff_eq!(field.get(2, 0).unwrap().norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn slice_fft_matches_plan_on_square_input() {
        let size = 8;
        let mut a = ramp(size);
        let mut b = ComplexField::from_vec(size, ramp(size)).unwrap();
        fft_2d(size, size, &mut a);
        TransformPlan::forward(size).unwrap().execute(&mut b).unwrap();
        for (x, y) in a.iter().zip(b.as_slice()) {
            assert_abs_diff_eq!(x.re, y.re, epsilon = 1e-9);
            assert_abs_diff_eq!(x.im, y.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn slice_fft_round_trip_rectangular() {
        let (width, height) = (6, 4);
        let original: Vec<Complex<f64>> = (0..width * height)
            .map(|i| Complex::new((i * 7 % 5) as f64, 0.0))
            .collect();
        let mut buffer = original.clone();
        fft_2d(width, height, &mut buffer);
        ifft_2d(width, height, &mut buffer);
        let coef = 1.0 / (width * height) as f64;
        for (a, b) in buffer.iter().zip(&original) {
            assert_abs_diff_eq!(a.re * coef, b.re, epsilon = 1e-9);
            assert_abs_diff_eq!(a.im * coef, b.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn transpose_square_twice_is_identity() {
        let mut data: Vec<u8> = (0..25).collect();
        transpose_square(5, &mut data);
        assert_eq!(data[1], 5);
        transpose_square(5, &mut data);
        assert_eq!(data, (0..25).collect::<Vec<u8>>());
    }
}
