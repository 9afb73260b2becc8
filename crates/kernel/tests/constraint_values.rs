//! Constraint stage outputs read back from the stage buffers.
//!
//! An isolated particle has no density contribution and no gradient, so its
//! multiplier is exactly `1 / epsilon` and its correction is zero.

use pbf_kernel::buffers::BufferKey;
use pbf_kernel::{Lifecycle, SerialExecutor, Simulation, SolverParams};

#[test]
fn isolated_particles_lambda_is_inverse_relaxation() {
    let params = SolverParams::default();
    let epsilon = params.constraint_relaxation;
    let mut sim = Simulation::new(params, SerialExecutor);
    // Far apart: no shared or adjacent cells
    let positions = vec![[0.0, 0.0], [10.0, 0.0], [20.0, 0.0], [30.0, 0.0]];
    sim.initialize(4, 8, &[], &positions).unwrap();
    sim.step(Some(0.01)).unwrap();

    let Lifecycle::Ready(state) = sim.lifecycle() else {
        panic!("expected ready state");
    };
    assert!(state.neighbours().pairs().is_empty());
    let constraint = state.buffers().get(BufferKey::Constraint);
    for i in 0..4 {
        assert_eq!(constraint[i], 1.0 / epsilon, "lambda of particle {i}");
        assert_eq!(constraint[4 + i], 0.0);
        assert_eq!(constraint[8 + i], 0.0);
    }

    // Only gravity moved them
    let g = SolverParams::default().gravity;
    for (i, p) in sim.positions().unwrap().iter().enumerate() {
        assert_eq!(p[0], positions[i][0]);
        assert!((p[1] - -g * 1.0e-4).abs() < 1.0e-6);
    }
}

#[test]
fn compressed_cluster_expands() {
    let mut sim = Simulation::new(
        SolverParams {
            gravity: 0.0,
            ..SolverParams::default()
        },
        SerialExecutor,
    );
    // Four particles far denser than rest density
    let positions = vec![[0.0, 0.0], [0.05, 0.0], [0.0, 0.05], [0.05, 0.05]];
    sim.initialize(4, 4, &[], &positions).unwrap();
    sim.step(Some(0.01)).unwrap();

    let centre = [0.025, 0.025];
    let radius = |p: [f32; 2]| ((p[0] - centre[0]).powi(2) + (p[1] - centre[1]).powi(2)).sqrt();
    for (before, after) in positions.iter().zip(sim.positions().unwrap()) {
        assert!(
            radius(after) > radius(*before),
            "particle at {:?} moved inwards to {:?}",
            before,
            after
        );
    }
}

#[test]
fn stage_buffers_are_padded_layouts() {
    let mut sim = Simulation::new(SolverParams::default(), SerialExecutor);
    sim.initialize(5, 4, &[], &vec![[0.0, 0.0]; 5]).unwrap();
    let Lifecycle::Ready(state) = sim.lifecycle() else {
        panic!("expected ready state");
    };
    for key in BufferKey::ALL {
        let layout = state.buffers().layout(key);
        assert_eq!(layout.rows() % 2, 0, "{} has odd rows", key.name());
        assert!(layout.len() >= state.buffers().lanes(key));
        assert_eq!(state.buffers().get(key).len(), layout.len());
    }
}
