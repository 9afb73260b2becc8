//! Headless driver
//!
//! Runs a configured simulation to completion and prints a summary of the
//! final particle state.
//!
//! Usage: `pbf-run <config.json> [frames]`

use pbf_orchestrator::{create_runner, SimulationConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pbf_kernel=info,pbf_orchestrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().ok_or("usage: pbf-run <config.json> [frames]")?;
    let mut config = SimulationConfig::load(&config_path)?;
    if let Some(frames) = args.next() {
        config.max_steps = Some(frames.parse::<u64>()?);
    }
    if config.max_steps.is_none() {
        return Err("config has no max_steps; pass a frame count".into());
    }

    let runner = create_runner(&config)?;
    runner.start();
    let summary = runner.join()?;

    let n = summary.positions.len().max(1) as f32;
    let mut min = [f32::INFINITY; 2];
    let mut max = [f32::NEG_INFINITY; 2];
    let mut mean_height = 0.0;
    for p in &summary.positions {
        for axis in 0..2 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
        mean_height += p[1] / n;
    }

    tracing::info!(
        "'{}' done: {} frames, {:.3}s simulated",
        config.name,
        summary.frame,
        summary.sim_time
    );
    println!("particles:   {}", summary.positions.len());
    println!("frames:      {}", summary.frame);
    println!("sim time:    {:.3}s", summary.sim_time);
    println!(
        "bounds:      ({:.3}, {:.3}) .. ({:.3}, {:.3})",
        min[0], min[1], max[0], max[1]
    );
    println!("mean height: {:.3}", mean_height);

    Ok(())
}
