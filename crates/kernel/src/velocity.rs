//! Velocity reconstruction with vorticity confinement and XSPH viscosity.
//!
//! ```text
//! v_i  = (x*_i - x_i) / dt
//! v'_i = v_i + c_visc * sum_j (v_j - v_i) W(r) + dt * c_vort * f_vort
//! ```
//!
//! Velocities of neighbours are rebuilt from their own displacements, so the
//! stage only reads committed and predicted positions.

use crate::packing::RecordBuffer;
use crate::sph::{poly6, spiky_derivative, spiky_second_derivative};

/// Offset added to distances and norms in the vorticity terms.
pub const TOL: f32 = 1.0e-5;

/// Read-only inputs of the velocity stage.
#[derive(Debug, Clone, Copy)]
pub struct VelocityInputs<'a> {
    /// Committed positions, interleaved.
    pub positions: &'a [f32],
    /// Predicted state: velocity half, then position half.
    pub predicted: &'a [f32],
    /// Interleaved-layout records.
    pub records: &'a RecordBuffer,
    /// Partner particle per record entry.
    pub partners: &'a [u32],
    /// Particle count.
    pub particle_count: usize,
    /// Kernel support radius.
    pub kernel_width: f32,
    /// XSPH viscosity strength.
    pub viscosity: f32,
    /// Vorticity confinement strength.
    pub vorticity: f32,
    /// Time step; must be non-zero.
    pub dt: f32,
}

impl VelocityInputs<'_> {
    #[inline]
    fn predicted_position(&self, i: usize) -> [f32; 2] {
        let base = 2 * self.particle_count;
        [self.predicted[base + 2 * i], self.predicted[base + 2 * i + 1]]
    }

    #[inline]
    fn displacement_velocity(&self, i: usize) -> [f32; 2] {
        let p = self.predicted_position(i);
        [
            (p[0] - self.positions[2 * i]) / self.dt,
            (p[1] - self.positions[2 * i + 1]) / self.dt,
        ]
    }
}

/// Evaluate one lane of the velocity stage over `2n` lanes.
pub fn evaluate_velocity(idx: usize, inputs: &VelocityInputs<'_>) -> f32 {
    if idx >= 2 * inputs.particle_count {
        return 0.0;
    }
    let (i, axis) = (idx / 2, idx % 2);
    let h = inputs.kernel_width;
    let record = inputs.records.record(idx);

    let xi = inputs.predicted_position(i);
    let vi = inputs.displacement_velocity(i);

    let mut viscosity = [0.0f32; 2];
    let mut omega = 0.0f32;
    let mut eta = [0.0f32; 2];

    for e in record.entries() {
        let j = inputs.partners[e] as usize;
        let xj = inputs.predicted_position(j);
        let vj = inputs.displacement_velocity(j);
        let p = [xi[0] - xj[0], xi[1] - xj[1]];
        let r = (p[0] * p[0] + p[1] * p[1]).sqrt();
        let vij = [vj[0] - vi[0], vj[1] - vi[1]];

        let w = poly6(r, h);
        viscosity[0] += vij[0] * w;
        viscosity[1] += vij[1] * w;

        // grad_j W = -p / (r + TOL) * dW
        let dw = spiky_derivative(r, h);
        let grad_j = [-p[0] / (r + TOL) * dw, -p[1] / (r + TOL) * dw];
        omega += vij[0] * grad_j[1] - vij[1] * grad_j[0];

        let ddw = spiky_second_derivative(r, h);
        let nx = p[0] / (r + TOL);
        let ny = p[1] / (r + TOL);
        eta[0] += vij[1] * nx * nx * ddw;
        eta[1] += -vij[0] * ny * ny * ddw;
    }

    let eta_norm = (eta[0] * eta[0] + eta[1] * eta[1]).sqrt();
    let confinement = omega * eta[axis] / (eta_norm + TOL);

    vi[axis] + inputs.viscosity * viscosity[axis] + inputs.dt * inputs.vorticity * confinement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor::SpatialHash;
    use crate::packing::PackedNeighbours;

    fn packed(x: &[f32], y: &[f32]) -> PackedNeighbours {
        let mut hash = SpatialHash::new(1.0);
        hash.build(x, y, 1.0);
        let mut packed = PackedNeighbours::new(x.len(), 4);
        packed.pack(&hash);
        packed
    }

    #[test]
    fn displacement_over_unit_dt_without_coefficients() {
        let packed = packed(&[0.3, 0.6], &[0.0, 0.1]);
        let positions = [0.0, 0.0, 0.5, 0.5];
        let predicted = [0.0, 0.0, 0.0, 0.0, 0.3, 0.0, 0.6, 0.1];
        let inputs = VelocityInputs {
            positions: &positions,
            predicted: &predicted,
            records: packed.interleaved_records(),
            partners: packed.partners(),
            particle_count: 2,
            kernel_width: 1.32,
            viscosity: 0.0,
            vorticity: 0.0,
            dt: 1.0,
        };
        let out: Vec<f32> = (0..4).map(|i| evaluate_velocity(i, &inputs)).collect();
        let expected = [0.3, 0.0, 0.1, -0.4];
        for (a, b) in out.iter().zip(expected) {
            assert!((a - b).abs() < 1.0e-6, "{:?}", out);
        }
    }

    #[test]
    fn viscosity_pulls_towards_neighbour_velocity() {
        let packed = packed(&[0.0, 0.5], &[0.0, 0.0]);
        // Particle 0 at rest, particle 1 moving +x by 1 over dt = 1
        let positions = [0.0, 0.0, -0.5, 0.0];
        let predicted = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5, 0.0];
        let inputs = VelocityInputs {
            positions: &positions,
            predicted: &predicted,
            records: packed.interleaved_records(),
            partners: packed.partners(),
            particle_count: 2,
            kernel_width: 1.0,
            viscosity: 0.1,
            vorticity: 0.0,
            dt: 1.0,
        };
        let v0 = evaluate_velocity(0, &inputs);
        let v1 = evaluate_velocity(2, &inputs);
        let w = poly6(0.5, 1.0);
        assert!((v0 - 0.1 * w).abs() < 1.0e-6);
        assert!((v1 - (1.0 - 0.1 * w)).abs() < 1.0e-6);
    }

    #[test]
    fn padding_lanes_are_zero() {
        let packed = packed(&[0.0], &[0.0]);
        let inputs = VelocityInputs {
            positions: &[0.0, 0.0],
            predicted: &[0.0; 4],
            records: packed.interleaved_records(),
            partners: packed.partners(),
            particle_count: 1,
            kernel_width: 1.0,
            viscosity: 0.1,
            vorticity: 0.3,
            dt: 0.1,
        };
        assert_eq!(evaluate_velocity(2, &inputs), 0.0);
        assert_eq!(evaluate_velocity(0, &inputs), 0.0);
    }
}
