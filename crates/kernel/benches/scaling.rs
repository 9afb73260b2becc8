//! Backend scaling test -- serial vs rayon at increasing particle counts.
//!
//! Run with: cargo bench -p pbf-kernel --bench scaling

use std::time::Instant;

use pbf_kernel::{
    GridSource, KernelExecutor, RayonExecutor, SerialExecutor, Simulation, SolverParams,
};

const MAX_NEIGHBOURS: usize = 24;

fn time_steps<E: KernelExecutor>(executor: E, n: usize, steps: usize) -> f64 {
    let mut sim = Simulation::new(SolverParams::default(), executor);
    let source = GridSource {
        columns: (n as f32).sqrt().ceil() as usize,
        spacing: 0.8,
        origin: [0.0, 0.0],
    };
    let floor = vec![[-1.0e4, -1.0], [1.0e4, -1.0]];
    sim.initialize(n, MAX_NEIGHBOURS, &[floor], &source)
        .expect("valid setup");

    let dt = 1.0 / 120.0;
    // Warmup
    for _ in 0..2 {
        sim.step(Some(dt)).expect("step");
    }

    let start = Instant::now();
    for _ in 0..steps {
        sim.step(Some(dt)).expect("step");
    }
    start.elapsed().as_secs_f64()
}

fn main() {
    println!("=== Backend Scaling Test ===\n");

    // (particles, steps) -- fewer steps at larger counts
    let configs = [(1_000, 20), (4_000, 10), (16_000, 5), (64_000, 2)];

    println!(
        "{:>10} {:>8} {:>12} {:>12} {:>9}",
        "Particles", "Steps", "serial ms", "rayon ms", "speedup"
    );

    for &(n, steps) in &configs {
        let serial = time_steps(SerialExecutor, n, steps);
        let rayon = time_steps(RayonExecutor, n, steps);
        let per_step = |t: f64| t * 1000.0 / steps as f64;
        println!(
            "{:>10} {:>8} {:>12.2} {:>12.2} {:>8.2}x",
            n,
            steps,
            per_step(serial),
            per_step(rayon),
            serial / rayon
        );
    }
}
