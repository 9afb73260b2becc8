//! Reference test integration tests
//!
//! These tests run the reference scenes via cargo test.

use crate::{ExpectedResult, PositionBoundsCheck, ReferenceTest, SettlingCheck};

/// Resolve a path relative to the workspace root (one level up from this crate)
fn project_path(relative: &str) -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let project_root = std::path::Path::new(manifest_dir)
        .parent()
        .expect("Could not find workspace root");
    project_root.join(relative).to_string_lossy().to_string()
}

fn settling_box_test(frames: u64) -> ReferenceTest {
    ReferenceTest {
        name: "Settling Box".to_string(),
        config_path: project_path("configs/settling_box.json"),
        frames,
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

#[test]
fn test_settling_box() {
    let result = settling_box_test(200).run().expect("Test execution failed");
    result.print_summary();
    assert!(result.passed, "Settling box test failed");
    assert_eq!(result.checks.len(), 4);
}

#[test]
fn test_short_run_keeps_frame_count() {
    let result = settling_box_test(5).run().expect("Test execution failed");
    assert_eq!(result.frames, 5);
    assert!((result.sim_time - 5.0 * 0.0166).abs() < 1.0e-6);
    assert!(result.passed);
}

#[test]
fn test_missing_config_is_an_error() {
    let test = ReferenceTest {
        name: "Missing".to_string(),
        config_path: project_path("configs/does-not-exist.json"),
        frames: 1,
        expected: ExpectedResult::default(),
    };
    assert!(test.run().is_err());
}
