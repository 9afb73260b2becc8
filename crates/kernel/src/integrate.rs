//! External force integration.
//!
//! Produces the predicted state buffer: the velocity half holds
//! `v' = v + g * dt`, the position half `x* = x + v' * dt`.

/// Read-only inputs of the force integration stage.
#[derive(Debug, Clone, Copy)]
pub struct IntegrateInputs<'a> {
    /// Committed positions, interleaved.
    pub positions: &'a [f32],
    /// Committed velocities, interleaved.
    pub velocities: &'a [f32],
    /// Particle count.
    pub particle_count: usize,
    /// Downward acceleration.
    pub gravity: f32,
    /// Time step.
    pub dt: f32,
}

impl IntegrateInputs<'_> {
    /// Velocity after applying gravity, for interleaved lane `k`.
    #[inline]
    fn kicked_velocity(&self, k: usize) -> f32 {
        let acceleration = if k % 2 == 1 { -self.gravity } else { 0.0 };
        self.velocities[k] + acceleration * self.dt
    }
}

/// Evaluate one lane of the integration stage over `4n` lanes.
pub fn evaluate_integration(idx: usize, inputs: &IntegrateInputs<'_>) -> f32 {
    let half = 2 * inputs.particle_count;
    if idx < half {
        inputs.kicked_velocity(idx)
    } else if idx < 2 * half {
        let k = idx - half;
        inputs.positions[k] + inputs.kicked_velocity(k) * inputs.dt
    } else {
        0.0
    }
}
