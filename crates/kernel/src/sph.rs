//! Smoothing kernels and the pairwise kernel stage.
//!
//! Implements the 2D PBF kernel family: poly6 for density, the spiky
//! gradient for constraint gradients and its second derivative for the
//! vorticity location vector. All kernels have compact support `h` and are
//! zero at and beyond it.
//!
//! The pairwise stage evaluates `W` and `grad W` once per stored pair; the
//! reversed contribution is recovered by the consumers with a sign flip.

use std::f32::consts::PI;

use crate::packing::NeighbourPair;

/// Offset added to `r` when normalising the pair displacement, so that
/// coincident particles get a zero gradient instead of NaN.
pub const EPS: f32 = 1.0e-5;

/// Poly6 density kernel.
///
/// ```text
/// W(r, h) = 315 / (64 pi h^9) * (h^2 - r^2)^3    for r < h
/// W(r, h) = 0                                    otherwise
/// ```
pub fn poly6(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    let d = h * h - r * r;
    315.0 / (64.0 * PI * h.powi(9)) * d * d * d
}

/// Radial derivative of the spiky kernel.
///
/// ```text
/// dW(r, h) = -45 / (pi h^6) * (h - r)^2    for r < h
/// ```
///
/// Non-positive on `[0, h)`, zero beyond.
pub fn spiky_derivative(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    let d = h - r;
    -45.0 / (PI * h.powi(6)) * d * d
}

/// Second radial derivative of the spiky kernel.
///
/// ```text
/// ddW(r, h) = 90 / (pi h^6) * (h - r)    for r < h
/// ```
pub fn spiky_second_derivative(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    90.0 / (PI * h.powi(6)) * (h - r)
}

/// Kernel gradient for the displacement `(px, py) = x*_i - x*_j`.
///
/// ```text
/// grad W = (p / (r + EPS)) * dW(r, h)
/// ```
///
/// # Returns
/// `(gx, gy)`; exactly zero when `p` is zero.
#[inline]
pub fn spiky_gradient(px: f32, py: f32, h: f32) -> (f32, f32) {
    let r = (px * px + py * py).sqrt();
    let scale = spiky_derivative(r, h) / (r + EPS);
    (px * scale, py * scale)
}

// ---------------------------------------------------------------------------
// Pairwise kernel stage
// ---------------------------------------------------------------------------

/// Read-only inputs of the pairwise kernel stage.
#[derive(Debug, Clone, Copy)]
pub struct PairKernelInputs<'a> {
    /// Stored pairs of the current frame.
    pub pairs: &'a [NeighbourPair],
    /// Predicted state buffer; positions live at `2n + 2i + axis`.
    pub predicted: &'a [f32],
    /// Particle count.
    pub particle_count: usize,
    /// Pair capacity (channel stride of the output).
    pub pair_capacity: usize,
    /// Kernel support radius.
    pub kernel_width: f32,
}

/// Evaluate one lane of the pairwise kernel stage.
///
/// The domain is `3 * pair_capacity` lanes: `channel = idx / capacity`
/// selects `W`, `grad W . x` or `grad W . y` for pair slot `idx % capacity`.
/// Unused slots and padding lanes yield 0.
pub fn evaluate_pair_kernel(idx: usize, inputs: &PairKernelInputs<'_>) -> f32 {
    let cap = inputs.pair_capacity;
    if cap == 0 || idx >= 3 * cap {
        return 0.0;
    }
    let channel = idx / cap;
    let slot = idx % cap;
    let Some(pair) = inputs.pairs.get(slot) else {
        return 0.0;
    };

    let base = 2 * inputs.particle_count;
    let (i, j) = (pair.i as usize, pair.j as usize);
    let px = inputs.predicted[base + 2 * i] - inputs.predicted[base + 2 * j];
    let py = inputs.predicted[base + 2 * i + 1] - inputs.predicted[base + 2 * j + 1];
    let h = inputs.kernel_width;

    match channel {
        0 => poly6((px * px + py * py).sqrt(), h),
        1 => spiky_gradient(px, py, h).0,
        _ => spiky_gradient(px, py, h).1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernels_vanish_at_support_radius() {
        let h = 3.14;
        assert_eq!(poly6(h, h), 0.0);
        assert_eq!(poly6(5.0, h), 0.0);
        assert_eq!(spiky_derivative(h, h), 0.0);
        assert_eq!(spiky_second_derivative(h + 1.0, h), 0.0);
    }

    #[test]
    fn poly6_peak_at_origin() {
        let h = 1.32_f32;
        let expected = 315.0 / (64.0 * PI * h.powi(3));
        assert!((poly6(0.0, h) - expected).abs() < 1.0e-5);
        assert!(poly6(0.0, h) > poly6(0.3, h));
        assert!(poly6(0.3, h) > poly6(0.42, h));
    }

    #[test]
    fn poly6_decreases_monotonically() {
        let h = 1.0;
        let mut prev = poly6(0.0, h);
        for k in 1..=20 {
            let w = poly6(k as f32 * 0.05, h);
            assert!(w <= prev, "W rose at r={}", k as f32 * 0.05);
            prev = w;
        }
    }

    #[test]
    fn gradient_is_zero_for_coincident_particles() {
        assert_eq!(spiky_gradient(0.0, 0.0, 1.32), (0.0, 0.0));
    }

    #[test]
    fn gradient_points_from_j_towards_i_negated() {
        // x*_i - x*_j = (1, 1): W grows as i moves towards j, so grad W is negative
        let (gx, gy) = spiky_gradient(1.0, 1.0, 3.14);
        assert!(gx < 0.0 && gy < 0.0);
        assert!((gx - gy).abs() < 1.0e-7);
        let (gx, gy) = spiky_gradient(0.0, -2.0_f32.sqrt(), 3.14);
        assert_eq!(gx, 0.0);
        assert!(gy > 0.0);
    }

    #[test]
    fn stage_writes_three_channels() {
        // Two particles at (0, 0) and (0.5, 0)
        let n = 2;
        let predicted = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5, 0.0];
        let pairs = [NeighbourPair { i: 0, j: 1 }];
        let inputs = PairKernelInputs {
            pairs: &pairs,
            predicted: &predicted,
            particle_count: n,
            pair_capacity: 2,
            kernel_width: 1.0,
        };
        let out: Vec<f32> = (0..6).map(|idx| evaluate_pair_kernel(idx, &inputs)).collect();
        assert!((out[0] - poly6(0.5, 1.0)).abs() < 1.0e-6);
        assert!(out[2] > 0.0, "x*_0 - x*_1 is negative, spiky derivative negative");
        assert_eq!(out[4], 0.0);
        // Slot 1 unused
        assert_eq!(out[1], 0.0);
        assert_eq!(out[3], 0.0);
        assert_eq!(out[5], 0.0);
        assert_eq!(evaluate_pair_kernel(6, &inputs), 0.0);
    }

    #[test]
    fn zero_capacity_yields_zero() {
        let inputs = PairKernelInputs {
            pairs: &[],
            predicted: &[],
            particle_count: 0,
            pair_capacity: 0,
            kernel_width: 1.0,
        };
        assert_eq!(evaluate_pair_kernel(0, &inputs), 0.0);
    }
}
