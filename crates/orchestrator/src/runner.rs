//! Simulation runner with lifecycle management
//!
//! This module provides the `SimulationRunner` which owns a [`Simulation`]
//! on a background thread and exposes start, pause, resume, boundary updates
//! and position snapshots to the controlling thread.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use pbf_kernel::{BoundaryPolygon, KernelExecutor, Lifecycle, Simulation, SimulationError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the orchestration layer
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The kernel rejected an operation
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// The configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The simulation thread panicked
    #[error("simulation thread panicked")]
    ThreadPanicked,

    /// The simulation loop stopped on an error
    #[error("simulation failed: {0}")]
    Failed(String),
}

/// Runner state enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerState {
    /// Simulation created but not yet started
    Created,
    /// Simulation actively running
    Running,
    /// Simulation paused
    Paused,
    /// Simulation finished (reached stopping condition)
    Finished,
    /// Simulation encountered an error
    Error,
}

/// Final state reported by [`SimulationRunner::join`]
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Frames committed
    pub frame: u64,
    /// Sum of the time steps taken (seconds)
    pub sim_time: f64,
    /// Committed positions after the last frame
    pub positions: Vec<[f32; 2]>,
}

/// Shared state between the runner thread and control interface
struct SharedState {
    state: RunnerState,
    sim_time: f64,
    frame: u64,
    positions: Vec<[f32; 2]>,
    /// Boundary polygons waiting to be handed to the simulation
    pending_boundaries: Option<Vec<BoundaryPolygon>>,
    error_message: Option<String>,
}

/// Handle for controlling and querying a running simulation
pub struct SimulationRunner {
    shared: Arc<Mutex<SharedState>>,
    /// Polygon count fixed at initialization
    boundary_count: usize,
    thread_handle: Option<thread::JoinHandle<()>>,
}

fn lock(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    // A panicking loop thread leaves plain data behind; keep reading it
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulationRunner {
    /// Create a new runner around an initialized simulation
    ///
    /// # Arguments
    /// * `simulation` - A simulation in the ready state
    /// * `fixed_delta_t` - Step size; `None` steps on the wall clock
    /// * `max_steps` - Optional number of frames after which the runner finishes
    pub fn new<E: KernelExecutor + 'static>(
        simulation: Simulation<E>,
        fixed_delta_t: Option<f32>,
        max_steps: Option<u64>,
    ) -> Result<Self, RunnerError> {
        let boundary_count = match simulation.lifecycle() {
            Lifecycle::Ready(state) => state.obstacles().polygon_count(),
            Lifecycle::Uninitialized => return Err(SimulationError::NotInitialized.into()),
        };

        let shared = Arc::new(Mutex::new(SharedState {
            state: RunnerState::Created,
            sim_time: 0.0,
            frame: simulation.frame(),
            positions: simulation.positions()?,
            pending_boundaries: None,
            error_message: None,
        }));

        let shared_clone = Arc::clone(&shared);
        let thread_handle = thread::spawn(move || {
            run_simulation_loop(simulation, shared_clone, fixed_delta_t, max_steps);
        });

        Ok(Self {
            shared,
            boundary_count,
            thread_handle: Some(thread_handle),
        })
    }

    /// Get current runner state
    pub fn state(&self) -> RunnerState {
        lock(&self.shared).state.clone()
    }

    /// Get current simulation time (seconds)
    pub fn sim_time(&self) -> f64 {
        lock(&self.shared).sim_time
    }

    /// Get number of committed frames
    pub fn frame(&self) -> u64 {
        lock(&self.shared).frame
    }

    /// Get error message if state is Error
    pub fn error_message(&self) -> Option<String> {
        lock(&self.shared).error_message.clone()
    }

    /// Snapshot of the committed positions after the latest frame
    pub fn positions(&self) -> Vec<[f32; 2]> {
        lock(&self.shared).positions.clone()
    }

    /// Queue new boundary polygons for the next frame boundary
    ///
    /// The polygon count must match the count given at initialization.
    pub fn update_boundaries(&self, polygons: Vec<BoundaryPolygon>) -> Result<(), RunnerError> {
        if polygons.len() != self.boundary_count {
            return Err(SimulationError::InvalidBoundsChange {
                expected: self.boundary_count,
                actual: polygons.len(),
            }
            .into());
        }
        lock(&self.shared).pending_boundaries = Some(polygons);
        Ok(())
    }

    /// Pause the simulation
    pub fn pause(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Running {
            state.state = RunnerState::Paused;
        }
    }

    /// Resume the simulation
    pub fn resume(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Paused {
            state.state = RunnerState::Running;
        }
    }

    /// Start the simulation (transition from Created to Running)
    pub fn start(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Created {
            state.state = RunnerState::Running;
        }
    }

    /// Ask the loop to finish after the current frame
    pub fn stop(&self) {
        let mut state = lock(&self.shared);
        if state.state != RunnerState::Error {
            state.state = RunnerState::Finished;
        }
    }

    /// Wait for the simulation thread to complete
    pub fn join(mut self) -> Result<RunSummary, RunnerError> {
        if let Some(handle) = self.thread_handle.take() {
            handle.join().map_err(|_| RunnerError::ThreadPanicked)?;
        }
        let guard = lock(&self.shared);
        if guard.state == RunnerState::Error {
            return Err(RunnerError::Failed(
                guard.error_message.clone().unwrap_or_default(),
            ));
        }
        Ok(RunSummary {
            frame: guard.frame,
            sim_time: guard.sim_time,
            positions: guard.positions.clone(),
        })
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        // Signal the thread to exit
        let mut state = lock(&self.shared);
        if matches!(
            state.state,
            RunnerState::Created | RunnerState::Running | RunnerState::Paused
        ) {
            state.state = RunnerState::Finished;
        }
    }
}

/// Main simulation loop executed in background thread
fn run_simulation_loop<E: KernelExecutor>(
    mut simulation: Simulation<E>,
    shared: Arc<Mutex<SharedState>>,
    fixed_delta_t: Option<f32>,
    max_steps: Option<u64>,
) {
    // Wait for start signal
    loop {
        let state = lock(&shared).state.clone();
        match state {
            RunnerState::Created => thread::sleep(Duration::from_millis(10)),
            RunnerState::Running => break,
            _ => return,
        }
    }

    let start_wall_time = Instant::now();
    let mut sim_time = 0.0_f64;
    let mut steps = 0_u64;
    let mut was_paused = false;

    loop {
        let (current_state, pending) = {
            let mut guard = lock(&shared);
            (guard.state.clone(), guard.pending_boundaries.take())
        };

        if let Some(polygons) = pending {
            if let Err(e) = simulation.update_boundaries(polygons) {
                fail(&shared, e);
                break;
            }
        }

        match current_state {
            RunnerState::Running => {
                if was_paused {
                    // Restart the wall clock so the pause is not integrated
                    simulation.pause();
                    was_paused = false;
                }

                let positions = match simulation.step(fixed_delta_t) {
                    Ok(particles) => particles.positions(),
                    Err(e) => {
                        fail(&shared, e);
                        break;
                    }
                };
                for warning in simulation.take_warnings() {
                    tracing::debug!("Frame {}: {}", simulation.frame(), warning);
                }

                // The step integrated on its own clock in wall-clock mode
                let dt = simulation.last_delta_t();
                sim_time += dt as f64;
                steps += 1;

                {
                    let mut guard = lock(&shared);
                    guard.sim_time = sim_time;
                    guard.frame = simulation.frame();
                    guard.positions = positions;
                }

                if let Some(max) = max_steps {
                    if steps >= max {
                        tracing::info!("Simulation finished: reached max_steps = {}", max);
                        lock(&shared).state = RunnerState::Finished;
                        break;
                    }
                }

                if steps % 100 == 0 {
                    tracing::debug!(
                        "Frame {}: sim_time={:.4}s, dt={:.6}s, wall_time={:.2}s",
                        simulation.frame(),
                        sim_time,
                        dt,
                        start_wall_time.elapsed().as_secs_f64(),
                    );
                }
            }
            RunnerState::Paused => {
                was_paused = true;
                thread::sleep(Duration::from_millis(50));
            }
            RunnerState::Finished | RunnerState::Error | RunnerState::Created => break,
        }
    }

    tracing::info!(
        "Simulation thread exiting: {} frames, {:.4}s simulated",
        steps,
        sim_time
    );
}

fn fail(shared: &Mutex<SharedState>, error: SimulationError) {
    tracing::error!("Simulation step failed: {}", error);
    let mut guard = lock(shared);
    guard.state = RunnerState::Error;
    guard.error_message = Some(error.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbf_kernel::simulation::FIRST_FRAME_DT;
    use pbf_kernel::{GridSource, SerialExecutor, SolverParams};

    fn floor_box() -> Vec<BoundaryPolygon> {
        vec![vec![[-10.0, -1.0], [10.0, -1.0], [10.0, 30.0], [-10.0, 30.0]]]
    }

    fn small_simulation() -> Simulation<SerialExecutor> {
        let mut sim = Simulation::new(SolverParams::default(), SerialExecutor);
        sim.initialize(30, 16, &floor_box(), &GridSource::default())
            .unwrap();
        sim
    }

    #[test]
    fn test_runner_requires_initialized_simulation() {
        let sim = Simulation::new(SolverParams::default(), SerialExecutor);
        let err = SimulationRunner::new(sim, Some(0.01), Some(1)).err().unwrap();
        assert!(matches!(
            err,
            RunnerError::Simulation(SimulationError::NotInitialized)
        ));
    }

    #[test]
    fn test_runner_lifecycle() {
        let runner = SimulationRunner::new(small_simulation(), Some(1.0 / 60.0), Some(10)).unwrap();

        // Initially Created
        assert_eq!(runner.state(), RunnerState::Created);
        assert_eq!(runner.positions().len(), 30);

        runner.start();
        assert!(matches!(
            runner.state(),
            RunnerState::Running | RunnerState::Finished
        ));

        let summary = runner.join().unwrap();
        assert_eq!(summary.frame, 10);
        assert!((summary.sim_time - 10.0 / 60.0).abs() < 1.0e-6);
        assert_eq!(summary.positions.len(), 30);
    }

    #[test]
    fn test_runner_pause_resume() {
        let runner = SimulationRunner::new(small_simulation(), Some(1.0 / 60.0), Some(100_000)).unwrap();

        runner.start();
        thread::sleep(Duration::from_millis(50));

        runner.pause();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(runner.state(), RunnerState::Paused);

        let frames_paused = runner.frame();
        thread::sleep(Duration::from_millis(100));

        // Allow for one in-flight frame when the pause lands
        let frames_after_pause = runner.frame();
        assert!(
            frames_after_pause <= frames_paused + 1,
            "Frames should not advance while paused: before={}, after={}",
            frames_paused,
            frames_after_pause
        );

        runner.resume();
        assert_eq!(runner.state(), RunnerState::Running);

        runner.stop();
        runner.join().unwrap();
    }

    #[test]
    fn test_wall_clock_first_frame_time() {
        let runner = SimulationRunner::new(small_simulation(), None, Some(1)).unwrap();
        runner.start();
        let summary = runner.join().unwrap();
        assert_eq!(summary.frame, 1);
        assert_eq!(summary.sim_time, FIRST_FRAME_DT as f64);
    }

    #[test]
    fn test_wall_clock_pause_is_not_counted() {
        let runner = SimulationRunner::new(small_simulation(), None, None).unwrap();

        runner.start();
        thread::sleep(Duration::from_millis(50));
        runner.pause();
        thread::sleep(Duration::from_millis(100));
        let before_pause = runner.sim_time();
        let frames_before = runner.frame();
        assert!(before_pause >= FIRST_FRAME_DT as f64);

        // Long pause relative to the running intervals
        thread::sleep(Duration::from_millis(800));
        runner.resume();
        thread::sleep(Duration::from_millis(50));
        runner.stop();
        let summary = runner.join().unwrap();

        assert!(summary.frame > frames_before);
        let after_resume = summary.sim_time - before_pause;
        // Resuming restarts the clock: one first-frame step plus running time
        assert!(
            after_resume < 0.5,
            "pause leaked into sim_time: {:.3}s after resume",
            after_resume
        );
    }

    #[test]
    fn test_boundary_update_count_is_checked() {
        let runner = SimulationRunner::new(small_simulation(), Some(0.01), Some(5)).unwrap();
        let err = runner.update_boundaries(Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Simulation(SimulationError::InvalidBoundsChange {
                expected: 1,
                actual: 0
            })
        ));

        let mut moved = floor_box();
        moved[0][0][1] = -2.0;
        runner.update_boundaries(moved).unwrap();
        runner.start();
        assert_eq!(runner.join().unwrap().frame, 5);
    }
}
