mod util;

use std::sync::Arc;

use mesh_afc::prelude::*;
use util::{assert_close, random_field, run_ranks};

#[test]
fn config_parses_from_json_with_defaults() {
    let cfg: FluxCalculatorConfig = serde_json::from_str(
        r#"{ "name": "tracer", "flux_limiter_type": "superbee", "execute_on": ["linear", "timestep_end"] }"#,
    )
    .unwrap();
    assert_eq!(cfg.flux_limiter_type, FluxLimiterType::Superbee);
    assert_eq!(cfg.allowable_mb_wastage, 5.0);
    assert!(cfg.blocks.is_none());
    let calc = AdvectiveFluxCalculator::new(cfg).unwrap();
    assert_eq!(calc.name(), "tracer");
    assert!(calc.executes_on(ExecuteOn::Linear));
    assert!(calc.executes_on(ExecuteOn::TimestepEnd));
    assert!(!calc.executes_on(ExecuteOn::Nonlinear));
}

#[test]
fn config_without_linear_recompute_is_rejected() {
    let cfg: FluxCalculatorConfig =
        serde_json::from_str(r#"{ "name": "tracer", "execute_on": ["timestep_end"] }"#).unwrap();
    assert!(matches!(
        AdvectiveFluxCalculator::new(cfg),
        Err(AfcError::ExecuteOnMissingLinear { name }) if name == "tracer"
    ));
}

#[test]
fn unknown_limiter_name_fails_to_parse() {
    let parsed: Result<FluxCalculatorConfig, _> =
        serde_json::from_str(r#"{ "flux_limiter_type": "Koren" }"#);
    assert!(parsed.is_err());
}

#[test]
fn two_fields_share_one_topology() {
    let mesh = quad_mesh(4, 4, 1.0, 1.0).unwrap();
    let local = mesh.serial();
    let temperature = ConstantVelocity::new([1.0, 0.5, 0.0], random_field(&mesh, 1));
    let salinity = ConstantVelocity::new([1.0, 0.5, 0.0], random_field(&mesh, 2));

    let mut first = AdvectiveFluxCalculator::new(FluxCalculatorConfig::default()).unwrap();
    first.setup(&local, &NoComm).unwrap();
    let shared = first.topology().unwrap().clone();

    let mut second = AdvectiveFluxCalculator::new(FluxCalculatorConfig {
        name: "salinity".into(),
        ..Default::default()
    })
    .unwrap();
    second.setup_with(shared.clone()).unwrap();
    // an existing topology is reused
    second.setup(&local, &NoComm).unwrap();
    assert!(Arc::ptr_eq(second.topology().unwrap(), &shared));

    first.compute(&local, &temperature, &NoComm).unwrap();
    second.compute(&local, &salinity, &NoComm).unwrap();

    let mut independent = AdvectiveFluxCalculator::new(FluxCalculatorConfig::default()).unwrap();
    independent.setup(&local, &NoComm).unwrap();
    independent.compute(&local, &salinity, &NoComm).unwrap();
    for n in mesh.node_ids() {
        assert_eq!(second.flux_out(n).unwrap(), independent.flux_out(n).unwrap());
        assert_eq!(first.kij(n, n).unwrap(), second.kij(n, n).unwrap());
    }
    assert_ne!(first.nodal_value(5).unwrap(), second.nodal_value(5).unwrap());
}

#[test]
fn mesh_change_forces_a_rebuild() {
    let coarse = line_mesh(4, 1.0).unwrap().serial();
    let fine = line_mesh(8, 1.0).unwrap().serial();
    let provider = ConstantVelocity::new([1.0, 0.0, 0.0], |n: u64| (n as f64).cos());
    let mut calc = AdvectiveFluxCalculator::new(FluxCalculatorConfig::default()).unwrap();
    calc.setup(&coarse, &NoComm).unwrap();
    calc.compute(&coarse, &provider, &NoComm).unwrap();
    assert_eq!(calc.flux_out(8), Err(AfcError::UnknownGlobalNode(8)));

    calc.mesh_changed();
    calc.setup(&fine, &NoComm).unwrap();
    calc.compute(&fine, &provider, &NoComm).unwrap();
    assert!(calc.flux_out(8).is_ok());
    assert_eq!(calc.topology().unwrap().connections().num_nodes(), 9);
}

#[test]
fn block_restriction_limits_the_registry() {
    // 4x2 cells; the left two columns form block 0, the right two block 1
    let mesh = quad_mesh(4, 2, 4.0, 2.0)
        .unwrap()
        .with_subdomains(|c| if c.id % 4 < 2 { 0 } else { 1 });
    let local = mesh.serial();
    let provider = ConstantVelocity::new([1.0, 0.2, 0.0], random_field(&mesh, 9));
    let mut calc =
        AdvectiveFluxCalculator::new(FluxCalculatorConfig::default().with_blocks([0])).unwrap();
    calc.setup(&local, &NoComm).unwrap();
    calc.compute(&local, &provider, &NoComm).unwrap();

    // nodes with ix <= 2 only
    assert_eq!(calc.topology().unwrap().connections().num_nodes(), 9);
    assert!(calc.flux_out(2).is_ok());
    assert_eq!(calc.flux_out(3), Err(AfcError::UnknownGlobalNode(3)));
    // node 2 sits on the block interface and sees only its block-0 cell
    assert_eq!(calc.valence(2, 2).unwrap(), 1);
    assert_eq!(calc.valence(7, 7).unwrap(), 2);
    assert!(calc.kij(2, 3).is_err());

    let total: f64 = calc.correction().unwrap().flux_out_slice().iter().sum();
    assert!(total.abs() < 1e-12);
}

#[test]
fn sparse_ids_still_compute() {
    let mesh = line_mesh(3, 3.0).unwrap().renumber_nodes(|n| n * 1_000_000 + 17);
    let local = mesh.serial();
    let provider = ConstantVelocity::new([1.0, 0.0, 0.0], random_field(&mesh, 4));
    let mut calc = AdvectiveFluxCalculator::new(FluxCalculatorConfig::default()).unwrap();
    calc.setup(&local, &NoComm).unwrap();
    let wasted = calc.topology().unwrap().connections().wasted_megabytes();
    assert!(wasted > 5.0, "wasted {wasted} MB");
    calc.compute(&local, &provider, &NoComm).unwrap();
    assert_close(calc.kij(1_000_017, 2_000_017).unwrap(), -0.5, 1e-13, "K[1][2]");
}

#[test]
fn multi_rank_valence_counts_every_cell_once() {
    let mesh = line_mesh(9, 1.0).unwrap();
    let parts = mesh.partition(3, 1).unwrap();
    let results = run_ranks(3, |comm| {
        let local = &parts[comm.rank()];
        let mut calc = AdvectiveFluxCalculator::new(FluxCalculatorConfig::default()).unwrap();
        calc.setup(local, comm).unwrap();
        local
            .owned_cells(None)
            .flat_map(|c| c.nodes.clone())
            .map(|n| (n, calc.valence(n, n).unwrap()))
            .collect::<Vec<_>>()
    });
    for (n, v) in results.into_iter().flatten() {
        let expected = if n == 0 || n == 9 { 1 } else { 2 };
        assert_eq!(v, expected, "valence({n}, {n})");
    }
}

#[test]
fn unaddressable_id_span_fails_setup() {
    let mesh = line_mesh(1, 1.0)
        .unwrap()
        .renumber_nodes(|n| if n == 0 { 0 } else { u64::MAX });
    let mut calc = AdvectiveFluxCalculator::new(FluxCalculatorConfig::default()).unwrap();
    assert_eq!(
        calc.setup(&mesh.serial(), &NoComm),
        Err(AfcError::RegistrySpanTooLarge {
            min: 0,
            max: u64::MAX
        })
    );
    assert!(calc.topology().is_err());
}
