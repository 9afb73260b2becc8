//! Reference test binary entry point
//!
//! Runs all reference scenes and exits non-zero when any check fails.

use reference_tests::{
    ExpectedResult, PositionBoundsCheck, ReferenceTest, SettlingCheck, TestResult,
};

/// Small block dropped into a closed box
///
/// Particles must stay inside the walls, come down under gravity and keep a
/// finite state.
fn settling_box_test() -> ReferenceTest {
    ReferenceTest {
        name: "Settling Box".to_string(),
        config_path: "configs/settling_box.json".to_string(),
        frames: 200,
        expected: ExpectedResult {
            position_bounds: Some(PositionBoundsCheck {
                min: [-10.001, -1.001],
                max: [10.001, 40.001],
            }),
            finite_state: true,
            settling: Some(SettlingCheck { max_mean_rise: 1.0 }),
            zero_step: true,
        },
    }
}

/// Full dam break scene
fn dam_break_test() -> ReferenceTest {
    ReferenceTest {
        name: "Dam Break".to_string(),
        config_path: "configs/dam_break.json".to_string(),
        frames: 600,
        expected: ExpectedResult {
            position_bounds: Some(PositionBoundsCheck {
                min: [-20.001, -1.001],
                max: [20.001, 60.001],
            }),
            finite_state: true,
            settling: Some(SettlingCheck { max_mean_rise: 1.0 }),
            zero_step: false,
        },
    }
}

/// Get all reference tests
fn all_tests() -> Vec<ReferenceTest> {
    vec![settling_box_test(), dam_break_test()]
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    tracing::info!("PBF Reference Test Suite");
    tracing::info!("========================");

    let tests = all_tests();
    tracing::info!("Found {} reference tests", tests.len());

    let mut results: Vec<TestResult> = Vec::new();
    let mut passed_count = 0;
    let mut failed_count = 0;

    for test in tests {
        match test.run() {
            Ok(result) => {
                if result.passed {
                    passed_count += 1;
                } else {
                    failed_count += 1;
                }
                result.print_summary();
                results.push(result);
            }
            Err(e) => {
                eprintln!("\nERROR running test {}: {}", test.name, e);
                failed_count += 1;
            }
        }
    }

    println!("\n{}", "=".repeat(80));
    println!("OVERALL SUMMARY");
    println!("{}", "=".repeat(80));
    println!("Total tests: {}", results.len());
    println!("Passed: {}", passed_count);
    println!("Failed: {}", failed_count);
    println!("{}", "=".repeat(80));

    if failed_count > 0 {
        std::process::exit(1);
    }
}
