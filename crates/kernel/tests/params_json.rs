//! Solver parameters round through JSON with per-field defaults.

use pbf_kernel::SolverParams;

#[test]
fn empty_object_gives_defaults() {
    let params: SolverParams = serde_json::from_str("{}").unwrap();
    assert_eq!(params, SolverParams::default());
}

#[test]
fn partial_object_overrides_fields() {
    let params: SolverParams = serde_json::from_str(
        r#"{ "solver_iterations": 5, "gravity": 9.81, "artificial_pressure_fixed_kernel_distance": 0.2 }"#,
    )
    .unwrap();
    assert_eq!(params.solver_iterations, 5);
    assert_eq!(params.gravity, 9.81);
    assert_eq!(params.delta_q(), 0.2);
    assert_eq!(params.kernel_width, 1.32);
    assert!(params.validate().is_ok());
}

#[test]
fn serialized_params_parse_back() {
    let params = SolverParams {
        viscosity_coefficient: 0.0,
        vorticity_coefficient: 0.5,
        ..SolverParams::default()
    };
    let json = serde_json::to_string(&params).unwrap();
    let back: SolverParams = serde_json::from_str(&json).unwrap();
    assert_eq!(back, params);
}
