//! Host-side reference oracle.
//!
//! A scalar implementation of the same valid convolution the device kernels
//! compute, used only for verification.  It is deterministic and has no
//! device dependency, so it also runs in CI without an adapter.

use crate::error::{GeometryError, MismatchError};
use crate::geometry::output_shape;
use crate::image::{Filter, Image};

/// Scalar valid convolution, one channel at a time.
pub fn reference(image: &Image, filter: &Filter, stride: usize) -> Result<Image, GeometryError> {
    let (out_h, out_w) = output_shape(image.height, image.width, filter.size, stride)?;
    let mut out = Image::filled(out_h, out_w, image.channels, 0.0);
    for c in 0..image.channels {
        for i in 0..out_h {
            for j in 0..out_w {
                let mut sum = 0.0f32;
                for m in 0..filter.size {
                    for n in 0..filter.size {
                        sum += image.at(i * stride + m, j * stride + n, c) * filter.at(m, n);
                    }
                }
                out.data[(i * out_w + j) * image.channels + c] = sum;
            }
        }
    }
    Ok(out)
}

/// Scalar reference for the batched channel-reduction forward pass.
///
/// `input` has shape `(batch, in_channels, height, width)`, `filters`
/// `(out_maps, in_channels, k, k)`; the result has shape
/// `(batch, out_maps, out_h, out_w)` with stride fixed at 1, matching the
/// device kernel in [`crate::forward`].
#[allow(clippy::too_many_arguments)]
pub fn reference_forward(
    input: &[f32],
    filters: &[f32],
    batch: usize,
    in_channels: usize,
    out_maps: usize,
    height: usize,
    width: usize,
    kernel_size: usize,
) -> Result<Vec<f32>, GeometryError> {
    let (out_h, out_w) = output_shape(height, width, kernel_size, 1)?;
    let mut out = vec![0.0f32; batch * out_maps * out_h * out_w];
    for b in 0..batch {
        for m in 0..out_maps {
            for i in 0..out_h {
                for j in 0..out_w {
                    let mut sum = 0.0f32;
                    for c in 0..in_channels {
                        for p in 0..kernel_size {
                            for q in 0..kernel_size {
                                let x = input
                                    [((b * in_channels + c) * height + i + p) * width + j + q];
                                let k = filters[((m * in_channels + c) * kernel_size + p)
                                    * kernel_size
                                    + q];
                                sum += x * k;
                            }
                        }
                    }
                    out[((b * out_maps + m) * out_h + i) * out_w + j] = sum;
                }
            }
        }
    }
    Ok(out)
}

/// Pass/fail policy for [`compare`].
///
/// `Exact` suits integer-valued data where the device result must be
/// bit-for-bit; `Relative` is the float default, with a 1e-4 factor and an
/// equal absolute floor for values near zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tolerance {
    Exact,
    Relative(f32),
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Relative(1e-4)
    }
}

impl Tolerance {
    fn allows(&self, expected: f32, actual: f32) -> bool {
        match *self {
            Tolerance::Exact => expected == actual,
            Tolerance::Relative(tol) => {
                (expected - actual).abs() <= tol * expected.abs().max(actual.abs()).max(1.0)
            }
        }
    }
}

/// Compare a device result against the oracle.
///
/// Reports the first failing flat index together with the maximum absolute
/// difference over the whole buffer.  A mismatch is a test assertion, never
/// a fatal runtime condition; callers decide whether to abort.
pub fn compare(expected: &[f32], actual: &[f32], tolerance: Tolerance) -> Result<(), MismatchError> {
    debug_assert_eq!(expected.len(), actual.len(), "buffer length mismatch");
    let mut max_abs_diff = 0.0f32;
    let mut first_bad: Option<usize> = None;
    for (i, (&e, &a)) in expected.iter().zip(actual.iter()).enumerate() {
        max_abs_diff = max_abs_diff.max((e - a).abs());
        if first_bad.is_none() && !tolerance.allows(e, a) {
            first_bad = Some(i);
        }
    }
    match first_bad {
        None => Ok(()),
        Some(index) => Err(MismatchError {
            index,
            expected: expected[index],
            actual: actual[index],
            max_abs_diff,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_ones_image_times_constant_mask() {
        // 18x18 all-ones input, 3x3 all-2 mask: every output is 2 * 9 = 18
        // and the output shrinks to 16x16.
        let image = Image::filled(18, 18, 1, 1.0);
        let filter = Filter::filled(3, 2.0);
        let out = reference(&image, &filter, 1).unwrap();
        assert_eq!((out.height, out.width), (16, 16));
        assert!(out.data.iter().all(|&v| v == 18.0));
    }

    #[test]
    fn identity_mask_is_a_crop() {
        let mut image = Image::filled(4, 4, 1, 0.0);
        for (i, v) in image.data.iter_mut().enumerate() {
            *v = i as f32;
        }
        // 1x1 unit mask: output equals the input.
        let filter = Filter::filled(1, 1.0);
        let out = reference(&image, &filter, 1).unwrap();
        assert_eq!(out.data, image.data);
    }

    #[test]
    fn stride_two_subsamples_the_windows() {
        let image = Image::filled(7, 7, 1, 1.0);
        let filter = Filter::filled(3, 1.0);
        let out = reference(&image, &filter, 2).unwrap();
        assert_eq!((out.height, out.width), (3, 3));
        assert!(out.data.iter().all(|&v| v == 9.0));
    }

    #[test]
    fn channels_convolve_independently() {
        let mut image = Image::filled(3, 3, 2, 1.0);
        // Channel 1 is all 10s.
        for v in image.data.iter_mut().skip(1).step_by(2) {
            *v = 10.0;
        }
        let filter = Filter::filled(3, 1.0);
        let out = reference(&image, &filter, 1).unwrap();
        assert_eq!(out.data, vec![9.0, 90.0]);
    }

    #[test]
    fn forward_unit_filter_counts_the_window() {
        let input = vec![1.0f32; 18 * 18];
        let filters = vec![1.0f32; 9];
        let out = reference_forward(&input, &filters, 1, 1, 1, 18, 18, 3).unwrap();
        assert_eq!(out.len(), 16 * 16);
        assert!(out.iter().all(|&v| v == 9.0));
    }

    #[test]
    fn forward_reduces_over_input_channels() {
        // Two input channels of 1s and 2s, unit 1x1 filters: 1 + 2 = 3.
        let mut input = vec![1.0f32; 2 * 2 * 2];
        for v in input.iter_mut().skip(4) {
            *v = 2.0;
        }
        let filters = vec![1.0f32; 2];
        let out = reference_forward(&input, &filters, 1, 2, 1, 2, 2, 1).unwrap();
        assert_eq!(out, vec![3.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn compare_exact_flags_any_difference() {
        let a = [1.0, 2.0, 3.0];
        let b = [1.0, 2.5, 3.0];
        let err = compare(&a, &b, Tolerance::Exact).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.max_abs_diff, 0.5);
        assert!(compare(&a, &a, Tolerance::Exact).is_ok());
    }

    #[test]
    fn compare_relative_scales_with_magnitude() {
        let a = [10_000.0f32];
        let b = [10_000.5f32];
        assert!(compare(&a, &b, Tolerance::Relative(1e-4)).is_ok());
        assert!(compare(&a, &b, Tolerance::Relative(1e-6)).is_err());
        // Near zero the tolerance acts as an absolute floor.
        assert!(compare(&[0.0], &[5e-5], Tolerance::Relative(1e-4)).is_ok());
    }
}
