// SPDX-License-Identifier: MPL-2.0

use std::f64::consts::PI;

use approx::assert_abs_diff_eq;
use holofft::slice::{fftshift, ifftshift};
use holofft::{
    sideband, Complex, ComplexField, PipelineContext, Region, SharedRegion, TransformPlan,
};

/// Intensity of an off-axis hologram with a carrier of (kx, ky) cycles per field
/// and a constant object phase.
fn hologram(size: usize, kx: f64, ky: f64, phase: f64) -> Vec<f64> {
    let n = size as f64;
    (0..size * size)
        .map(|i| {
            let (y, x) = ((i / size) as f64, (i % size) as f64);
            0.5 + 0.25 * (2.0 * PI * (kx * x + ky * y) / n + phase).cos()
        })
        .collect()
}

#[test]
fn impulse_goes_through_the_spectral_chain() {
    let size = 8;
    let mut field = ComplexField::zeros(size);
    *field.get_mut(0, 0).unwrap() = Complex::new(1.0, 0.0);
    let impulse = field.clone();

    TransformPlan::forward(size).unwrap().execute(&mut field).unwrap();
    for z in field.as_slice() {
        assert_abs_diff_eq!(z.norm(), 1.0, epsilon = 1e-12);
    }

    fftshift(size, field.as_mut_slice());
    for z in field.as_slice() {
        assert_abs_diff_eq!(z.re, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z.im, 0.0, epsilon = 1e-12);
    }

    let cropped = sideband::extract(&field, Region::full(size));
    assert_eq!(cropped, field);

    let mut back = cropped;
    ifftshift(size, back.as_mut_slice());
    TransformPlan::inverse(size).unwrap().execute(&mut back).unwrap();
    let factor = back.round_trip_factor();
    back.scale(factor);
    for (a, b) in back.as_slice().iter().zip(impulse.as_slice()) {
        assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-12);
        assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-12);
    }
}

#[test]
fn constant_phase_is_recovered_from_the_sideband() {
    let size = 64;
    let object_phase = 0.7;
    let samples = hologram(size, 16.0, 16.0, object_phase);
    let mut pipeline = PipelineContext::new(size).unwrap();

    // The sideband sits at (32 + 16, 32 + 16) in the centered spectrum.
    let result = pipeline
        .process(&samples, &Region::centered_at(48, 48, 16))
        .unwrap();

    let expected = (object_phase + PI) / (2.0 * PI);
    for &p in result.phase {
        assert_abs_diff_eq!(p, expected, epsilon = 1e-9);
    }
    assert_eq!(result.frame, 1);

    // Only the sideband peak survives the crop.
    let magnitude = result.sideband_magnitude(1.0);
    let peak = magnitude
        .iter()
        .enumerate()
        .fold((0, 0.0), |best, (i, &m)| if m > best.1 { (i, m) } else { best });
    assert_eq!(peak.0, 32 * size + 32);
    assert_abs_diff_eq!(peak.1, 0.125 * (size * size) as f64, epsilon = 1e-6);
}

#[test]
fn conjugate_sideband_gives_opposite_phase() {
    let size = 64;
    let samples = hologram(size, 16.0, 16.0, 0.7);
    let mut pipeline = PipelineContext::new(size).unwrap();
    let result = pipeline
        .process(&samples, &Region::centered_at(16, 16, 16))
        .unwrap();
    let expected = (-0.7 + PI) / (2.0 * PI);
    for &p in result.phase {
        assert_abs_diff_eq!(p, expected, epsilon = 1e-9);
    }
}

#[test]
fn zero_width_region_gives_zero_fields() {
    let size = 16;
    let samples = hologram(size, 4.0, 0.0, 0.0);
    let mut pipeline = PipelineContext::new(size).unwrap();
    let result = pipeline.process(&samples, &Region::new(3, 5, 0)).unwrap();
    assert!(result.sideband.as_slice().iter().all(|z| z.norm() == 0.0));
    assert!(result.wavefront.as_slice().iter().all(|z| z.norm() == 0.0));
}

#[test]
fn region_outside_the_field_gives_zero_fields() {
    let size = 16;
    let samples = hologram(size, 4.0, 0.0, 0.0);
    let mut pipeline = PipelineContext::new(size).unwrap();
    for region in [Region::new(16, 16, 4), Region::new(-40, 2, 8), Region::new(2, 500, 8)] {
        let result = pipeline.process(&samples, &region).unwrap();
        assert!(result.sideband.as_slice().iter().all(|z| z.norm() == 0.0));
    }
    assert_eq!(pipeline.counter().frames(), 3);
}

#[test]
fn region_can_change_between_frames() {
    let size = 32;
    let samples = hologram(size, 8.0, 8.0, 1.1);
    let mut pipeline = PipelineContext::new(size).unwrap().with_flip_vertical(true);
    let shared = SharedRegion::new(Region::centered_at(24, 24, 8));

    let first = pipeline.process(&samples, &shared).unwrap().phase[0];
    assert_abs_diff_eq!(first, (1.1 + PI) / (2.0 * PI), epsilon = 1e-9);

    shared.set(Region::centered_at(8, 8, 8));
    let second = pipeline.process(&samples, &shared).unwrap();
    assert_eq!(second.region, Region::new(4, 4, 8));
    assert_abs_diff_eq!(second.phase[0], (-1.1 + PI) / (2.0 * PI), epsilon = 1e-9);
}

#[test]
fn spectrum_magnitude_is_centered() {
    let size = 16;
    let samples = vec![1.0; size * size];
    let mut pipeline = PipelineContext::new(size).unwrap();
    let result = pipeline.process(&samples, &Region::full(size)).unwrap();
    let magnitude = result.spectrum_magnitude(holofft::phase::DEFAULT_DISPLAY_SCALE);
    assert_abs_diff_eq!(magnitude[8 * size + 8], 256.0 / 300.0, epsilon = 1e-9);
    assert_abs_diff_eq!(magnitude[0], 0.0, epsilon = 1e-9);
}

#[test]
fn steep_object_phase_is_unwrapped() {
    let size = 32;
    let n = size as f64;
    let c = n / 2.0;
    let object: Vec<f64> = (0..size * size)
        .map(|i| {
            let (y, x) = ((i / size) as f64 - c, (i % size) as f64 - c);
            2.5 * PI * (-(x * x + y * y) / (n * n / 18.0)).exp()
        })
        .collect();
    // Carrier of 8 cycles along x.
    let samples: Vec<f64> = object
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let x = (i % size) as f64;
            0.5 + 0.25 * (2.0 * PI * 8.0 * x / n + p).cos()
        })
        .collect();
    let mut pipeline = PipelineContext::new(size).unwrap();
    let result = pipeline
        .process(&samples, &Region::centered_at(24, 16, 12))
        .unwrap();
    let unwrapped = result.unwrapped_phase().unwrap();
    assert_eq!(unwrapped.len(), size * size);

    // The wrapped phase jumps, the unwrapped one does not.
    let max_step = |values: &[f64]| {
        values
            .chunks_exact(size)
            .flat_map(|row| row.windows(2).map(|w| (w[1] - w[0]).abs()))
            .fold(0.0, f64::max)
    };
    let wrapped: Vec<f64> = result
        .wavefront
        .as_slice()
        .iter()
        .map(|z| z.arg())
        .collect();
    assert!(max_step(&wrapped) > PI);
    assert!(max_step(&unwrapped) < PI);
}
