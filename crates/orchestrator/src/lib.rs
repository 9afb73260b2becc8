//! Orchestration Layer
//!
//! This crate drives the PBF kernel from a JSON configuration:
//! - Configuration parsing and validation
//! - Simulation setup with backend selection
//! - Simulation runner with lifecycle management

#![warn(missing_docs)]

pub mod config;
pub mod runner;

pub use config::{Backend, ConfigError, InitialPositions, SimulationConfig};
pub use runner::{RunSummary, RunnerError, RunnerState, SimulationRunner};

use pbf_kernel::{KernelExecutor, RayonExecutor, SerialExecutor, Simulation};

/// Build and initialize a simulation from a validated configuration
///
/// Runs the initial relaxation when the configuration asks for it.
pub fn create_simulation<E: KernelExecutor>(
    config: &SimulationConfig,
    executor: E,
) -> Result<Simulation<E>, RunnerError> {
    let mut simulation = Simulation::new(config.params.clone(), executor);
    simulation.initialize(
        config.particle_count,
        config.max_neighbours,
        &config.boundaries,
        &config.initial_positions,
    )?;
    tracing::info!(
        "Initialized {} particles with {} boundary polygons",
        config.particle_count,
        config.boundaries.len()
    );

    if config.relax_initial_positions {
        simulation.relax_initial_positions()?;
        tracing::info!("Initial positions relaxed");
    }

    Ok(simulation)
}

/// Create a runner from a configuration, on the configured backend
///
/// # Example
/// ```no_run
/// use pbf_orchestrator::{create_runner, SimulationConfig};
///
/// let config = SimulationConfig::load("configs/dam_break.json")?;
/// let runner = create_runner(&config)?;
/// runner.start();
/// let summary = runner.join()?;
/// println!("{} frames", summary.frame);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_runner(config: &SimulationConfig) -> Result<SimulationRunner, RunnerError> {
    tracing::info!("Creating simulation '{}' on {:?} backend", config.name, config.backend);
    match config.backend {
        Backend::Serial => SimulationRunner::new(
            create_simulation(config, SerialExecutor)?,
            config.fixed_delta_t,
            config.max_steps,
        ),
        Backend::Rayon => SimulationRunner::new(
            create_simulation(config, RayonExecutor)?,
            config.fixed_delta_t,
            config.max_steps,
        ),
    }
}

/// Load a configuration file and create its runner
pub fn create_runner_from_file(config_path: &str) -> Result<SimulationRunner, RunnerError> {
    tracing::info!("Loading config: {}", config_path);
    let config = SimulationConfig::load(config_path)?;
    create_runner(&config)
}
