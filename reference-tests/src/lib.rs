//! Reference test framework for PBF fluid simulation validation
//!
//! Each reference test runs a configured scene for a fixed number of frames
//! and validates the final particle state against scene-level criteria.

#[cfg(test)]
mod tests;

use pbf_kernel::{KernelExecutor, ParticleArrays, RayonExecutor, SerialExecutor, Simulation};
use pbf_orchestrator::{create_simulation, Backend, SimulationConfig};

/// Expected result criteria for a reference test
#[derive(Debug, Clone, Default)]
pub struct ExpectedResult {
    /// Particle position bounds validation
    pub position_bounds: Option<PositionBoundsCheck>,
    /// Every position and velocity component is finite
    pub finite_state: bool,
    /// Mean height after the run compared to the start
    pub settling: Option<SettlingCheck>,
    /// A zero-length step leaves the state untouched
    pub zero_step: bool,
}

/// Check that particles remain within specified bounds
#[derive(Debug, Clone)]
pub struct PositionBoundsCheck {
    /// Minimum allowed position [x, y]
    pub min: [f32; 2],
    /// Maximum allowed position [x, y]
    pub max: [f32; 2],
}

/// Check that the fluid has come down under gravity
#[derive(Debug, Clone)]
pub struct SettlingCheck {
    /// Largest allowed rise of the mean height above its initial value
    pub max_mean_rise: f32,
}

/// Result of running a reference test
#[derive(Debug)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Whether test passed
    pub passed: bool,
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Number of frames executed
    pub frames: u64,
    /// Simulated time (seconds)
    pub sim_time: f64,
}

/// Result of an individual validation check
#[derive(Debug)]
pub struct CheckResult {
    /// Check name
    pub name: String,
    /// Whether check passed
    pub passed: bool,
    /// Error message if failed
    pub message: Option<String>,
}

/// A reference test case
pub struct ReferenceTest {
    /// Test name
    pub name: String,
    /// Path to configuration file
    pub config_path: String,
    /// Number of frames to run
    pub frames: u64,
    /// Expected results to validate
    pub expected: ExpectedResult,
}

impl ReferenceTest {
    /// Run the reference test and return results
    pub fn run(&self) -> Result<TestResult, String> {
        tracing::info!("Running reference test: {}", self.name);

        let config = SimulationConfig::load(&self.config_path).map_err(|e| e.to_string())?;
        match config.backend {
            Backend::Serial => self.run_on(&config, SerialExecutor),
            Backend::Rayon => self.run_on(&config, RayonExecutor),
        }
    }

    fn run_on<E: KernelExecutor>(
        &self,
        config: &SimulationConfig,
        executor: E,
    ) -> Result<TestResult, String> {
        let dt = config
            .fixed_delta_t
            .filter(|dt| *dt > 0.0)
            .ok_or("reference scenes need a positive fixed_delta_t")?;

        let mut simulation = create_simulation(config, executor).map_err(|e| e.to_string())?;
        let initial_mean_height = mean_height(simulation.particles().map_err(|e| e.to_string())?);

        tracing::info!("Running {} frames...", self.frames);
        let mut sim_time = 0.0_f64;
        for frame in 0..self.frames {
            simulation.step(Some(dt)).map_err(|e| e.to_string())?;
            sim_time += dt as f64;

            // Log progress every 10% of frames
            if (frame + 1) % (self.frames / 10).max(1) == 0 {
                let progress = ((frame + 1) as f32 / self.frames as f32) * 100.0;
                tracing::info!("Progress: {:.0}% ({}/{})", progress, frame + 1, self.frames);
            }
        }
        for warning in simulation.take_warnings() {
            tracing::warn!("{}", warning);
        }
        tracing::info!("Simulation complete: {} frames, {:.4}s simulated", self.frames, sim_time);

        let mut checks = Vec::new();

        {
            let particles = simulation.particles().map_err(|e| e.to_string())?;

            if let Some(ref bounds) = self.expected.position_bounds {
                checks.push(validate_position_bounds(particles, bounds));
            }
            if self.expected.finite_state {
                checks.push(validate_finite_state(particles));
            }
            if let Some(ref settling) = self.expected.settling {
                checks.push(validate_settling(particles, initial_mean_height, settling));
            }
        }

        if self.expected.zero_step {
            checks.push(validate_zero_step(&mut simulation)?);
        }

        Ok(TestResult {
            name: self.name.clone(),
            passed: checks.iter().all(|c| c.passed),
            checks,
            frames: self.frames,
            sim_time,
        })
    }
}

fn mean_height(particles: &ParticleArrays) -> f32 {
    if particles.is_empty() {
        return 0.0;
    }
    particles.y.iter().sum::<f32>() / particles.len() as f32
}

/// Validate that particles remain within specified bounds
fn validate_position_bounds(
    particles: &ParticleArrays,
    bounds: &PositionBoundsCheck,
) -> CheckResult {
    let mut violations = 0;
    let mut max_violation = 0.0_f32;

    for (x, y) in particles.x.iter().zip(&particles.y) {
        let pos = [*x, *y];
        for axis in 0..2 {
            if pos[axis] < bounds.min[axis] {
                violations += 1;
                max_violation = max_violation.max(bounds.min[axis] - pos[axis]);
            }
            if pos[axis] > bounds.max[axis] {
                violations += 1;
                max_violation = max_violation.max(pos[axis] - bounds.max[axis]);
            }
        }
    }

    if violations == 0 {
        CheckResult {
            name: "Position Bounds".to_string(),
            passed: true,
            message: None,
        }
    } else {
        CheckResult {
            name: "Position Bounds".to_string(),
            passed: false,
            message: Some(format!(
                "{} coordinates out of bounds (max violation: {:.4})",
                violations, max_violation
            )),
        }
    }
}

/// Validate that no position or velocity blew up
fn validate_finite_state(particles: &ParticleArrays) -> CheckResult {
    let bad = particles
        .x
        .iter()
        .chain(&particles.y)
        .chain(&particles.vx)
        .chain(&particles.vy)
        .filter(|v| !v.is_finite())
        .count();
    let max_speed = particles
        .vx
        .iter()
        .zip(&particles.vy)
        .map(|(vx, vy)| (vx * vx + vy * vy).sqrt())
        .fold(0.0_f32, f32::max);

    CheckResult {
        name: "Finite State".to_string(),
        passed: bad == 0,
        message: Some(if bad == 0 {
            format!("Max speed: {:.3}", max_speed)
        } else {
            format!("{} non-finite components", bad)
        }),
    }
}

/// Validate that the fluid did not climb
fn validate_settling(
    particles: &ParticleArrays,
    initial_mean_height: f32,
    check: &SettlingCheck,
) -> CheckResult {
    let final_mean_height = mean_height(particles);
    let rise = final_mean_height - initial_mean_height;
    CheckResult {
        name: "Settling".to_string(),
        passed: rise <= check.max_mean_rise,
        message: Some(format!(
            "Mean height {:.3} -> {:.3} (limit rise: {:.3})",
            initial_mean_height, final_mean_height, check.max_mean_rise
        )),
    }
}

/// Validate that a zero-length frame commits the state unchanged
fn validate_zero_step<E: KernelExecutor>(
    simulation: &mut Simulation<E>,
) -> Result<CheckResult, String> {
    let before = simulation.particles().map_err(|e| e.to_string())?.clone();
    let frame = simulation.frame();
    let after = simulation.step(Some(0.0)).map_err(|e| e.to_string())?;

    let unchanged = before.positions() == after.positions() && before.velocities() == after.velocities();
    let advanced = simulation.frame() == frame + 1;
    Ok(CheckResult {
        name: "Zero Step".to_string(),
        passed: unchanged && advanced,
        message: if unchanged && advanced {
            None
        } else {
            Some(format!(
                "state unchanged: {}, frame advanced: {}",
                unchanged, advanced
            ))
        },
    })
}

impl TestResult {
    /// Print a summary of the test result
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(80));
        println!("Test: {}", self.name);
        println!("{}", "=".repeat(80));
        println!("Status: {}", if self.passed { "PASSED" } else { "FAILED" });
        println!("Frames: {}", self.frames);
        println!("Simulated time: {:.4} s", self.sim_time);
        println!("\nValidation Checks:");
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            print!("  [{}] {}", status, check.name);
            if let Some(ref msg) = check.message {
                print!(" - {}", msg);
            }
            println!();
        }
        println!("{}", "=".repeat(80));
    }
}
