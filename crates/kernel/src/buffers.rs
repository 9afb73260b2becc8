//! Stage buffer management.
//!
//! Stage inputs and outputs are addressed by an enumerated [`BufferKey`]
//! rather than by name. Each key has a fixed lane count derived from the
//! particle count and pair capacity; [`BufferSet::validate`] checks every
//! stage's declared inputs and outputs once, when the pipeline is built.

use crate::error::{Result, SimulationError};
use crate::executor::DomainLayout;

/// Identifies one `f32` stage buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKey {
    /// Committed positions, interleaved `[x0, y0, x1, y1, ..]` (2n lanes).
    Position,
    /// Committed velocities, interleaved (2n lanes).
    Velocity,
    /// Predicted velocity half followed by predicted position half (4n lanes).
    PredictedState,
    /// Pair kernel outputs: `W | dW_x | dW_y`, one block per channel
    /// (3 x pair capacity lanes).
    PairKernel,
    /// Constraint outputs: `lambda | sCorr x | sCorr y` (3n lanes).
    Constraint,
    /// Finalized velocities, interleaved (2n lanes).
    FinalVelocity,
}

impl BufferKey {
    /// Every key, in storage order.
    pub const ALL: [BufferKey; 6] = [
        BufferKey::Position,
        BufferKey::Velocity,
        BufferKey::PredictedState,
        BufferKey::PairKernel,
        BufferKey::Constraint,
        BufferKey::FinalVelocity,
    ];

    /// Human-readable name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            BufferKey::Position => "position",
            BufferKey::Velocity => "velocity",
            BufferKey::PredictedState => "predicted_state",
            BufferKey::PairKernel => "pair_kernel",
            BufferKey::Constraint => "constraint",
            BufferKey::FinalVelocity => "final_velocity",
        }
    }

    /// Meaningful lanes for `n` particles and `pair_capacity` pair slots.
    pub fn lanes(self, n: usize, pair_capacity: usize) -> usize {
        match self {
            BufferKey::Position | BufferKey::Velocity | BufferKey::FinalVelocity => 2 * n,
            BufferKey::PredictedState => 4 * n,
            BufferKey::PairKernel => 3 * pair_capacity,
            BufferKey::Constraint => 3 * n,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// A pipeline stage and the buffers it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Apply gravity, predict positions.
    IntegrateForces,
    /// Evaluate `W` and `grad W` for every packed pair.
    EvaluateKernel,
    /// Compute lambda and the artificial pressure sums.
    SolveConstraints,
    /// Apply the position correction and clamp against obstacles.
    CorrectPositions,
    /// Reconstruct velocities with vorticity and viscosity.
    FinalizeVelocity,
}

impl Stage {
    /// Stages in execution order.
    pub const PIPELINE: [Stage; 5] = [
        Stage::IntegrateForces,
        Stage::EvaluateKernel,
        Stage::SolveConstraints,
        Stage::CorrectPositions,
        Stage::FinalizeVelocity,
    ];

    /// Buffers read by this stage.
    pub fn inputs(self) -> &'static [BufferKey] {
        match self {
            Stage::IntegrateForces => &[BufferKey::Position, BufferKey::Velocity],
            Stage::EvaluateKernel => &[BufferKey::PredictedState],
            Stage::SolveConstraints => &[BufferKey::PairKernel],
            Stage::CorrectPositions => &[
                BufferKey::Position,
                BufferKey::PredictedState,
                BufferKey::PairKernel,
                BufferKey::Constraint,
            ],
            Stage::FinalizeVelocity => &[BufferKey::Position, BufferKey::PredictedState],
        }
    }

    /// Buffer written by this stage.
    pub fn output(self) -> BufferKey {
        match self {
            Stage::IntegrateForces => BufferKey::PredictedState,
            Stage::EvaluateKernel => BufferKey::PairKernel,
            Stage::SolveConstraints => BufferKey::Constraint,
            Stage::CorrectPositions => BufferKey::PredictedState,
            Stage::FinalizeVelocity => BufferKey::FinalVelocity,
        }
    }
}

/// Typed storage for every [`BufferKey`], sized to padded stage layouts.
#[derive(Debug, Clone)]
pub struct BufferSet {
    particle_count: usize,
    pair_capacity: usize,
    buffers: Vec<Vec<f32>>,
}

impl BufferSet {
    /// Allocate zeroed buffers for `n` particles and `pair_capacity` pairs.
    pub fn new(n: usize, pair_capacity: usize) -> Self {
        let buffers = BufferKey::ALL
            .iter()
            .map(|key| vec![0.0; DomainLayout::padded(key.lanes(n, pair_capacity)).len()])
            .collect();
        Self {
            particle_count: n,
            pair_capacity,
            buffers,
        }
    }

    /// Execution layout for the stage writing `key`.
    pub fn layout(&self, key: BufferKey) -> DomainLayout {
        DomainLayout::padded(key.lanes(self.particle_count, self.pair_capacity))
    }

    /// Meaningful lanes of `key` (excluding padding).
    pub fn lanes(&self, key: BufferKey) -> usize {
        key.lanes(self.particle_count, self.pair_capacity)
    }

    /// Check that every buffer a stage reads or writes has its layout size.
    pub fn validate(&self, stages: &[Stage]) -> Result<()> {
        for stage in stages {
            let output = stage.output();
            for &key in stage.inputs().iter().chain(std::iter::once(&output)) {
                let expected = self.layout(key).len();
                let actual = self.buffers[key.slot()].len();
                if expected != actual {
                    return Err(SimulationError::BufferSize {
                        key: key.name(),
                        expected,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }

    /// Read access to a buffer.
    pub fn get(&self, key: BufferKey) -> &[f32] {
        &self.buffers[key.slot()]
    }

    /// Mutable access to a buffer.
    pub fn get_mut(&mut self, key: BufferKey) -> &mut [f32] {
        &mut self.buffers[key.slot()]
    }

    /// Install a stage's output, returning the previous contents.
    pub fn replace(&mut self, key: BufferKey, data: Vec<f32>) -> Vec<f32> {
        debug_assert_eq!(data.len(), self.buffers[key.slot()].len(), "{}", key.name());
        std::mem::replace(&mut self.buffers[key.slot()], data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_padded_to_even_rows() {
        // 5 particles: constraint has 15 lanes, which lays out as 3x5
        let set = BufferSet::new(5, 10);
        let layout = set.layout(BufferKey::Constraint);
        assert!(layout.len() >= 15);
        assert_eq!(layout.rows() % 2, 0);
        assert_eq!(set.get(BufferKey::Constraint).len(), layout.len());
        assert_eq!(set.lanes(BufferKey::Constraint), 15);
    }

    #[test]
    fn fresh_set_validates() {
        let set = BufferSet::new(30, 150);
        assert!(set.validate(&Stage::PIPELINE).is_ok());
    }

    #[test]
    fn wrong_size_is_reported() {
        let mut set = BufferSet::new(4, 8);
        set.buffers[BufferKey::PairKernel.slot()] = vec![0.0; 3];
        let err = set.validate(&Stage::PIPELINE).unwrap_err();
        assert!(matches!(err, SimulationError::BufferSize { key: "pair_kernel", .. }));
    }

    #[test]
    fn stage_outputs_feed_later_inputs() {
        // Every input except the committed state is produced by an earlier stage.
        let mut produced = vec![BufferKey::Position, BufferKey::Velocity];
        for stage in Stage::PIPELINE {
            for key in stage.inputs() {
                assert!(produced.contains(key), "{:?} reads {:?} before it exists", stage, key);
            }
            produced.push(stage.output());
        }
    }
}
