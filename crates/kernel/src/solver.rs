//! Density constraint solve.
//!
//! For every particle the stage produces three values in the scalar record
//! layout: the Lagrange multiplier `lambda` and the two components of the
//! artificial pressure term `sum sCorr * grad W`.

use crate::packing::{NeighbourRecord, RecordBuffer};
use crate::sph::poly6;

/// Pair kernel outputs for one frame, split into its three channels.
#[derive(Debug, Clone, Copy)]
pub struct PairKernelView<'a> {
    values: &'a [f32],
    pair_capacity: usize,
}

impl<'a> PairKernelView<'a> {
    /// Wrap a pair kernel buffer laid out as `W | grad x | grad y`.
    pub fn new(values: &'a [f32], pair_capacity: usize) -> Self {
        Self {
            values,
            pair_capacity,
        }
    }

    /// `W` of a pair slot.
    #[inline]
    pub fn w(&self, slot: usize) -> f32 {
        self.values[slot]
    }

    /// Gradient component `axis` of a pair slot, as stored (lower index first).
    #[inline]
    pub fn gradient(&self, slot: usize, axis: usize) -> f32 {
        self.values[(1 + axis) * self.pair_capacity + slot]
    }
}

/// Constants of the constraint stage derived from the solver parameters.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintConstants {
    /// `1 / rho_0`.
    pub inverse_rest_density: f32,
    /// Relaxation `epsilon`.
    pub relaxation: f32,
    /// Artificial pressure scale `k`.
    pub pressure_scale: f32,
    /// Artificial pressure exponent `n`.
    pub pressure_power: i32,
    /// `W(delta_q, h)`.
    pub reference_kernel: f32,
}

impl ConstraintConstants {
    /// Derive the constants from solver parameters.
    pub fn from_params(params: &crate::params::SolverParams) -> Self {
        Self {
            inverse_rest_density: 1.0 / params.rest_density,
            relaxation: params.constraint_relaxation,
            pressure_scale: params.artificial_pressure_scale,
            pressure_power: params.artificial_pressure_power,
            reference_kernel: poly6(params.delta_q(), params.kernel_width),
        }
    }
}

/// Read-only inputs of the constraint stage.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintInputs<'a> {
    /// Pair kernel outputs.
    pub kernel: PairKernelView<'a>,
    /// Scalar-layout records.
    pub records: &'a RecordBuffer,
    /// Pair slot per record entry.
    pub entries: &'a [u32],
    /// Particle count.
    pub particle_count: usize,
    /// Stage constants.
    pub constants: ConstraintConstants,
}

/// Lagrange multiplier of the density constraint.
///
/// ```text
/// C_i      = rd * sum W - 1
/// lambda_i = -C_i / (|rd * sum +-grad W|^2 + sum |rd * grad W|^2 + epsilon)
/// ```
///
/// Isolated particles get `1 / epsilon`.
pub fn lambda(
    record: NeighbourRecord,
    entries: &[u32],
    kernel: &PairKernelView<'_>,
    constants: &ConstraintConstants,
) -> f32 {
    let rd = constants.inverse_rest_density;
    let mut density = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_sq = 0.0;

    for (k, e) in record.entries().enumerate() {
        let slot = entries[e] as usize;
        let sign = record.gradient_sign(k as u32);
        let gx = rd * kernel.gradient(slot, 0);
        let gy = rd * kernel.gradient(slot, 1);
        density += kernel.w(slot);
        sum_x += sign * gx;
        sum_y += sign * gy;
        sum_sq += gx * gx + gy * gy;
    }

    let constraint = rd * density - 1.0;
    -constraint / (sum_x * sum_x + sum_y * sum_y + sum_sq + constants.relaxation)
}

/// Artificial pressure sum `sum -k (W / W(delta_q))^n * (+-grad W)` along `axis`.
pub fn artificial_pressure(
    record: NeighbourRecord,
    entries: &[u32],
    kernel: &PairKernelView<'_>,
    constants: &ConstraintConstants,
    axis: usize,
) -> f32 {
    let mut sum = 0.0;
    for (k, e) in record.entries().enumerate() {
        let slot = entries[e] as usize;
        let ratio = kernel.w(slot) / constants.reference_kernel;
        let s_corr = -constants.pressure_scale * ratio.powi(constants.pressure_power);
        sum += s_corr * record.gradient_sign(k as u32) * kernel.gradient(slot, axis);
    }
    sum
}

/// Evaluate one lane of the constraint stage over `3n` lanes.
///
/// Channel 0 is `lambda`; channels 1 and 2 the artificial pressure sums.
pub fn evaluate_constraint(idx: usize, inputs: &ConstraintInputs<'_>) -> f32 {
    let n = inputs.particle_count;
    if idx >= 3 * n {
        return 0.0;
    }
    let record = inputs.records.record(idx);
    match idx / n {
        0 => lambda(record, inputs.entries, &inputs.kernel, &inputs.constants),
        channel => artificial_pressure(
            record,
            inputs.entries,
            &inputs.kernel,
            &inputs.constants,
            channel - 1,
        ),
    }
}
