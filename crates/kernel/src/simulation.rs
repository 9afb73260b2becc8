//! Solver loop and simulation lifecycle.
//!
//! A [`Simulation`] starts [`Lifecycle::Uninitialized`]. `initialize` builds
//! the owned [`SimulationState`] (particles, spatial hash, packed neighbours,
//! stage buffers, obstacle field) and moves it to [`Lifecycle::Ready`].
//!
//! Each step runs
//!
//! ```text
//! IntegrateForces -> build hash -> pack neighbours
//!   -> { EvaluateKernel -> SolveConstraints -> CorrectPositions } x iterations
//!   -> FinalizeVelocity -> commit
//! ```
//!
//! Every stage writes a scratch buffer; particle state is only overwritten
//! in the commit. Boundary updates submitted between steps are applied
//! after the commit.

use std::time::Instant;

use crate::boundary::{BoundaryPolygon, ObstacleField, SegmentObstacles};
use crate::buffers::{BufferKey, BufferSet, Stage};
use crate::corrector::{evaluate_correction, CorrectionInputs};
use crate::error::{Result, SimulationError};
use crate::executor::{KernelExecutor, RayonExecutor};
use crate::integrate::{evaluate_integration, IntegrateInputs};
use crate::neighbor::SpatialHash;
use crate::packing::{PackWarning, PackedNeighbours};
use crate::params::SolverParams;
use crate::particle::{ParticleArrays, PositionSource};
use crate::solver::{evaluate_constraint, ConstraintConstants, ConstraintInputs, PairKernelView};
use crate::sph::{evaluate_pair_kernel, PairKernelInputs};
use crate::velocity::{evaluate_velocity, VelocityInputs};

/// Time step assumed for the first wall-clock step.
pub const FIRST_FRAME_DT: f32 = 0.0166;

/// Upper bound on a wall-clock time step.
pub const MAX_FRAME_DT: f32 = 1.0;

/// Wall-clock time step source.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    last: Option<Instant>,
}

impl FrameClock {
    /// Seconds since the previous call, capped at [`MAX_FRAME_DT`].
    ///
    /// The first call after construction or [`FrameClock::reset`] returns
    /// [`FIRST_FRAME_DT`].
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = match self.last {
            Some(last) => now.duration_since(last).as_secs_f32().min(MAX_FRAME_DT),
            None => FIRST_FRAME_DT,
        };
        self.last = Some(now);
        dt
    }

    /// Forget the previous tick.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Coarse lifecycle phase, without the state payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationPhase {
    /// `initialize` has not been called.
    Uninitialized,
    /// State is built; steps may run.
    Ready,
}

/// Everything the solver owns between frames.
pub struct SimulationState {
    particles: ParticleArrays,
    hash: SpatialHash,
    neighbours: PackedNeighbours,
    buffers: BufferSet,
    obstacles: Box<dyn ObstacleField>,
    pending_boundaries: Option<Vec<BoundaryPolygon>>,
    warnings: Vec<PackWarning>,
    frame: u64,
}

impl std::fmt::Debug for SimulationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationState")
            .field("particles", &self.particles.len())
            .field("pair_capacity", &self.neighbours.pair_capacity())
            .field("polygons", &self.obstacles.polygon_count())
            .field("pending_boundaries", &self.pending_boundaries.is_some())
            .field("frame", &self.frame)
            .finish()
    }
}

impl SimulationState {
    /// Particle arrays as of the last commit.
    pub fn particles(&self) -> &ParticleArrays {
        &self.particles
    }

    /// Packed neighbour graph of the last step.
    pub fn neighbours(&self) -> &PackedNeighbours {
        &self.neighbours
    }

    /// Stage buffers of the last step.
    pub fn buffers(&self) -> &BufferSet {
        &self.buffers
    }

    /// Obstacle field currently in effect.
    pub fn obstacles(&self) -> &dyn ObstacleField {
        self.obstacles.as_ref()
    }

    /// Committed frames.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Copy committed particle state into the interleaved stage inputs.
    fn load_committed(&mut self) {
        let position = self.buffers.get_mut(BufferKey::Position);
        for (i, (&x, &y)) in self.particles.x.iter().zip(&self.particles.y).enumerate() {
            position[2 * i] = x;
            position[2 * i + 1] = y;
        }
        let velocity = self.buffers.get_mut(BufferKey::Velocity);
        for (i, (&vx, &vy)) in self.particles.vx.iter().zip(&self.particles.vy).enumerate() {
            velocity[2 * i] = vx;
            velocity[2 * i + 1] = vy;
        }
    }

    /// Copy predicted positions into the particle arrays and rebuild the
    /// neighbour graph from them.
    fn index_predicted(&mut self, grid_size: f32) {
        let n = self.particles.len();
        let predicted = &self.buffers.get(BufferKey::PredictedState)[2 * n..4 * n];
        for i in 0..n {
            self.particles.x_star[i] = predicted[2 * i];
            self.particles.y_star[i] = predicted[2 * i + 1];
        }
        self.hash
            .build(&self.particles.x_star, &self.particles.y_star, grid_size);
        let warnings = self.neighbours.pack(&self.hash);
        self.warnings.extend(warnings);
    }

    /// Overwrite committed state with the corrected prediction.
    ///
    /// Velocities come from the finalized velocity buffer, or are zeroed when
    /// `finalized` is false.
    fn commit(&mut self, finalized: bool) {
        let n = self.particles.len();
        let predicted = &self.buffers.get(BufferKey::PredictedState)[2 * n..4 * n];
        for i in 0..n {
            self.particles.x[i] = predicted[2 * i];
            self.particles.y[i] = predicted[2 * i + 1];
            self.particles.x_star[i] = predicted[2 * i];
            self.particles.y_star[i] = predicted[2 * i + 1];
        }
        if finalized {
            let velocity = self.buffers.get(BufferKey::FinalVelocity);
            for i in 0..n {
                self.particles.vx[i] = velocity[2 * i];
                self.particles.vy[i] = velocity[2 * i + 1];
            }
        } else {
            self.particles.clear_velocities();
        }
    }

    /// Check a buffered boundary update against the current field.
    fn check_pending_boundaries(&self) -> Result<()> {
        match &self.pending_boundaries {
            Some(polygons) if polygons.len() != self.obstacles.polygon_count() => {
                Err(SimulationError::InvalidBoundsChange {
                    expected: self.obstacles.polygon_count(),
                    actual: polygons.len(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Apply a buffered boundary update, if any.
    ///
    /// Runs after the commit, so a failing rebuild keeps the previous field
    /// and is logged instead of failing the committed frame.
    fn apply_pending_boundaries(&mut self) {
        if let Some(polygons) = self.pending_boundaries.take() {
            match self.obstacles.rebuild(&polygons) {
                Ok(()) => {
                    tracing::debug!("Applied boundary update ({} polygons)", polygons.len())
                }
                Err(e) => tracing::warn!("Boundary update dropped: {}", e),
            }
        }
    }
}

/// Explicit lifecycle of a [`Simulation`].
#[derive(Debug)]
pub enum Lifecycle {
    /// No state yet.
    Uninitialized,
    /// State built by `initialize`.
    Ready(Box<SimulationState>),
}

/// A 2D position-based fluid simulation.
///
/// Generic over the backend evaluating stage kernels; defaults to the
/// rayon backend.
#[derive(Debug)]
pub struct Simulation<E: KernelExecutor = RayonExecutor> {
    params: SolverParams,
    executor: E,
    clock: FrameClock,
    last_delta_t: f32,
    lifecycle: Lifecycle,
}

/// Evaluate `stage` over its output layout.
fn run_stage<E, F>(executor: &E, buffers: &BufferSet, stage: Stage, kernel: F) -> (BufferKey, Vec<f32>)
where
    E: KernelExecutor,
    F: Fn(usize) -> f32 + Sync + Send,
{
    let key = stage.output();
    (key, executor.dispatch(buffers.layout(key), kernel))
}

impl<E: KernelExecutor> Simulation<E> {
    /// Create an uninitialized simulation.
    pub fn new(params: SolverParams, executor: E) -> Self {
        Self {
            params,
            executor,
            clock: FrameClock::default(),
            last_delta_t: 0.0,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    /// Build the simulation state with segment obstacles from `polygons`.
    ///
    /// Re-initializing discards any previous state.
    pub fn initialize(
        &mut self,
        particle_count: usize,
        max_neighbours: usize,
        polygons: &[BoundaryPolygon],
        source: &dyn PositionSource,
    ) -> Result<()> {
        self.initialize_with_field(
            particle_count,
            max_neighbours,
            Box::new(SegmentObstacles::new(polygons)),
            source,
        )
    }

    /// Build the simulation state with a caller-provided obstacle field.
    pub fn initialize_with_field(
        &mut self,
        particle_count: usize,
        max_neighbours: usize,
        obstacles: Box<dyn ObstacleField>,
        source: &dyn PositionSource,
    ) -> Result<()> {
        self.params.validate()?;
        if particle_count == 0 {
            return Err(SimulationError::InvalidParameter(
                "particle_count must be positive".to_string(),
            ));
        }
        if max_neighbours == 0 {
            return Err(SimulationError::InvalidParameter(
                "max_neighbours must be positive".to_string(),
            ));
        }
        let positions = source.positions(particle_count);
        if positions.len() != particle_count {
            return Err(SimulationError::PositionCount {
                expected: particle_count,
                actual: positions.len(),
            });
        }

        let neighbours = PackedNeighbours::new(particle_count, max_neighbours);
        let buffers = BufferSet::new(particle_count, neighbours.pair_capacity());
        buffers.validate(&Stage::PIPELINE)?;

        tracing::info!(
            "Initialized PBF simulation: {} particles, pair capacity {}, {} boundary polygons, backend {}",
            particle_count,
            neighbours.pair_capacity(),
            obstacles.polygon_count(),
            self.executor.name()
        );

        self.clock.reset();
        self.last_delta_t = 0.0;
        self.lifecycle = Lifecycle::Ready(Box::new(SimulationState {
            particles: ParticleArrays::from_positions(&positions),
            hash: SpatialHash::new(self.params.grid_size),
            neighbours,
            buffers,
            obstacles,
            pending_boundaries: None,
            warnings: Vec::new(),
            frame: 0,
        }));
        Ok(())
    }

    /// Advance one frame and return the committed particle state.
    ///
    /// `None` derives the time step from the wall clock. `Some(0.0)` commits
    /// without moving anything; pending boundary updates are still applied.
    pub fn step(&mut self, fixed_delta_t: Option<f32>) -> Result<&ParticleArrays> {
        let Lifecycle::Ready(state) = &mut self.lifecycle else {
            return Err(SimulationError::NotInitialized);
        };
        state.check_pending_boundaries()?;
        let dt = match fixed_delta_t {
            Some(dt) if dt < 0.0 || !dt.is_finite() => {
                return Err(SimulationError::InvalidParameter(format!(
                    "time step {dt} must be finite and non-negative"
                )));
            }
            Some(dt) => dt,
            None => self.clock.tick(),
        };

        if dt > 0.0 {
            solve_frame(state, &self.params, &self.executor, dt);
            let (key, velocities) = {
                let n = state.particles.len();
                let inputs = VelocityInputs {
                    positions: state.buffers.get(BufferKey::Position),
                    predicted: state.buffers.get(BufferKey::PredictedState),
                    records: state.neighbours.interleaved_records(),
                    partners: state.neighbours.partners(),
                    particle_count: n,
                    kernel_width: self.params.kernel_width,
                    viscosity: self.params.viscosity_coefficient,
                    vorticity: self.params.vorticity_coefficient,
                    dt,
                };
                run_stage(&self.executor, &state.buffers, Stage::FinalizeVelocity, |idx| {
                    evaluate_velocity(idx, &inputs)
                })
            };
            state.buffers.replace(key, velocities);
            state.commit(true);
        }

        state.frame += 1;
        state.apply_pending_boundaries();
        self.last_delta_t = dt;
        tracing::trace!("Committed frame {} (dt={:.4})", state.frame, dt);
        Ok(&state.particles)
    }

    /// Project the initial configuration onto the density constraint.
    ///
    /// Runs the constraint iterations with zero elapsed time, commits the
    /// corrected positions and zeroes velocities. Does not count as a frame.
    pub fn relax_initial_positions(&mut self) -> Result<&ParticleArrays> {
        let Lifecycle::Ready(state) = &mut self.lifecycle else {
            return Err(SimulationError::NotInitialized);
        };
        solve_frame(state, &self.params, &self.executor, 0.0);
        state.commit(false);
        tracing::info!(
            "Relaxed initial positions of {} particles",
            state.particles.len()
        );
        Ok(&state.particles)
    }

    /// Reset the wall clock so the next `step(None)` ignores the pause.
    pub fn pause(&mut self) {
        self.clock.reset();
    }

    /// Buffer a boundary update; it takes effect after the next commit.
    pub fn update_boundaries(&mut self, polygons: Vec<BoundaryPolygon>) -> Result<()> {
        let Lifecycle::Ready(state) = &mut self.lifecycle else {
            return Err(SimulationError::NotInitialized);
        };
        let expected = state.obstacles.polygon_count();
        if polygons.len() != expected {
            return Err(SimulationError::InvalidBoundsChange {
                expected,
                actual: polygons.len(),
            });
        }
        state.pending_boundaries = Some(polygons);
        Ok(())
    }

    /// Current lifecycle phase.
    pub fn state(&self) -> SimulationPhase {
        match self.lifecycle {
            Lifecycle::Uninitialized => SimulationPhase::Uninitialized,
            Lifecycle::Ready(_) => SimulationPhase::Ready,
        }
    }

    /// Full lifecycle, including the state when ready.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn ready(&self) -> Result<&SimulationState> {
        match &self.lifecycle {
            Lifecycle::Ready(state) => Ok(state),
            Lifecycle::Uninitialized => Err(SimulationError::NotInitialized),
        }
    }

    /// Committed particle arrays.
    pub fn particles(&self) -> Result<&ParticleArrays> {
        Ok(&self.ready()?.particles)
    }

    /// Committed positions as `[x, y]` pairs.
    pub fn positions(&self) -> Result<Vec<[f32; 2]>> {
        Ok(self.ready()?.particles.positions())
    }

    /// Committed velocities as `[vx, vy]` pairs.
    pub fn velocities(&self) -> Result<Vec<[f32; 2]>> {
        Ok(self.ready()?.particles.velocities())
    }

    /// Number of particles; 0 before `initialize`.
    pub fn particle_count(&self) -> usize {
        self.ready().map(|s| s.particles.len()).unwrap_or(0)
    }

    /// Committed frames; 0 before `initialize`.
    pub fn frame(&self) -> u64 {
        self.ready().map(|s| s.frame).unwrap_or(0)
    }

    /// Time step integrated by the most recent `step`; 0 before the first.
    ///
    /// For wall-clock steps this is the clock's value after the first-frame
    /// default and the cap were applied.
    pub fn last_delta_t(&self) -> f32 {
        self.last_delta_t
    }

    /// Drain warnings recorded since the last call.
    pub fn take_warnings(&mut self) -> Vec<PackWarning> {
        match &mut self.lifecycle {
            Lifecycle::Ready(state) => std::mem::take(&mut state.warnings),
            Lifecycle::Uninitialized => Vec::new(),
        }
    }

    /// Solver parameters.
    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Backend evaluating the stages.
    pub fn executor(&self) -> &E {
        &self.executor
    }
}

/// Integrate, index and run the constraint iterations. Leaves the corrected
/// prediction in the predicted state buffer.
fn solve_frame<E: KernelExecutor>(
    state: &mut SimulationState,
    params: &SolverParams,
    executor: &E,
    dt: f32,
) {
    let n = state.particles.len();
    let cap = state.neighbours.pair_capacity();
    state.load_committed();

    // --- 1. External forces ---
    let (key, predicted) = {
        let inputs = IntegrateInputs {
            positions: state.buffers.get(BufferKey::Position),
            velocities: state.buffers.get(BufferKey::Velocity),
            particle_count: n,
            gravity: params.gravity,
            dt,
        };
        run_stage(executor, &state.buffers, Stage::IntegrateForces, |idx| {
            evaluate_integration(idx, &inputs)
        })
    };
    state.buffers.replace(key, predicted);

    // --- 2. Neighbour discovery on x* ---
    state.index_predicted(params.grid_size);

    // --- 3. Constraint iterations ---
    let constants = ConstraintConstants::from_params(params);
    for _ in 0..params.solver_iterations {
        let (key, kernel) = {
            let inputs = PairKernelInputs {
                pairs: state.neighbours.pairs(),
                predicted: state.buffers.get(BufferKey::PredictedState),
                particle_count: n,
                pair_capacity: cap,
                kernel_width: params.kernel_width,
            };
            run_stage(executor, &state.buffers, Stage::EvaluateKernel, |idx| {
                evaluate_pair_kernel(idx, &inputs)
            })
        };
        state.buffers.replace(key, kernel);

        let (key, constraint) = {
            let inputs = ConstraintInputs {
                kernel: PairKernelView::new(state.buffers.get(BufferKey::PairKernel), cap),
                records: state.neighbours.scalar_records(),
                entries: state.neighbours.entries(),
                particle_count: n,
                constants,
            };
            run_stage(executor, &state.buffers, Stage::SolveConstraints, |idx| {
                evaluate_constraint(idx, &inputs)
            })
        };
        state.buffers.replace(key, constraint);

        let (key, corrected) = {
            let inputs = CorrectionInputs {
                positions: state.buffers.get(BufferKey::Position),
                predicted: state.buffers.get(BufferKey::PredictedState),
                kernel: PairKernelView::new(state.buffers.get(BufferKey::PairKernel), cap),
                constraint: state.buffers.get(BufferKey::Constraint),
                records: state.neighbours.doubled_records(),
                entries: state.neighbours.entries(),
                partners: state.neighbours.partners(),
                obstacles: state.obstacles.as_ref(),
                particle_count: n,
                inverse_rest_density: constants.inverse_rest_density,
                margin: params.boundary_margin,
            };
            run_stage(executor, &state.buffers, Stage::CorrectPositions, |idx| {
                evaluate_correction(idx, &inputs)
            })
        };
        state.buffers.replace(key, corrected);
    }
}
