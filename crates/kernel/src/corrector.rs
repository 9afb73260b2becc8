//! Position correction.
//!
//! Runs over the doubled layout: the first `2n` lanes carry the predicted
//! velocity through unchanged, the remaining `2n` lanes apply
//!
//! ```text
//! dp_i = (1 / rho_0) * (sum_j (lambda_i + lambda_j) * (+-grad W) + sum sCorr * (+-grad W))
//! ```
//!
//! and clamp the trajectory from the committed position against the
//! obstacle field.

use crate::boundary::ObstacleField;
use crate::packing::RecordBuffer;
use crate::solver::PairKernelView;

/// Read-only inputs of the correction stage.
#[derive(Clone, Copy)]
pub struct CorrectionInputs<'a> {
    /// Committed positions, interleaved.
    pub positions: &'a [f32],
    /// Predicted state: velocity half, then position half.
    pub predicted: &'a [f32],
    /// Pair kernel outputs.
    pub kernel: PairKernelView<'a>,
    /// Constraint outputs `lambda | sCorr x | sCorr y`.
    pub constraint: &'a [f32],
    /// Doubled-layout records.
    pub records: &'a RecordBuffer,
    /// Pair slot per record entry.
    pub entries: &'a [u32],
    /// Partner particle per record entry.
    pub partners: &'a [u32],
    /// Obstacles the trajectory is clamped against.
    pub obstacles: &'a dyn ObstacleField,
    /// Particle count.
    pub particle_count: usize,
    /// `1 / rho_0`.
    pub inverse_rest_density: f32,
    /// Distance kept from obstacles.
    pub margin: f32,
}

/// Position displacement of particle `i` along `axis`.
pub fn displacement(i: usize, axis: usize, inputs: &CorrectionInputs<'_>) -> f32 {
    let n = inputs.particle_count;
    let record = inputs.records.record(2 * n + 2 * i + axis);
    let lambda_i = inputs.constraint[i];

    let mut sum = 0.0;
    for (k, e) in record.entries().enumerate() {
        let slot = inputs.entries[e] as usize;
        let lambda_j = inputs.constraint[inputs.partners[e] as usize];
        sum += (lambda_i + lambda_j) * record.gradient_sign(k as u32) * inputs.kernel.gradient(slot, axis);
    }
    inputs.inverse_rest_density * (sum + inputs.constraint[(1 + axis) * n + i])
}

/// Evaluate one lane of the correction stage over `4n` lanes.
pub fn evaluate_correction(idx: usize, inputs: &CorrectionInputs<'_>) -> f32 {
    let n = inputs.particle_count;
    if idx < 2 * n {
        return inputs.predicted[idx];
    }
    if idx >= 4 * n {
        return 0.0;
    }
    let k = idx - 2 * n;
    let (i, axis) = (k / 2, k % 2);

    let predicted = [inputs.predicted[2 * n + 2 * i], inputs.predicted[2 * n + 2 * i + 1]];
    let corrected = [
        predicted[0] + displacement(i, 0, inputs),
        predicted[1] + displacement(i, 1, inputs),
    ];
    let from = [inputs.positions[2 * i], inputs.positions[2 * i + 1]];
    inputs.obstacles.clamp(from, corrected, inputs.margin)[axis]
}
