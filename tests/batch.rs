use std::io::Write;

use gridbatch::prelude::*;
use num_complex::Complex64;
use tempfile::NamedTempFile;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Two DC grids plus a stray bus:
/// grid A meshes a slack, two loads and a droop converter, grid B is radial.
fn network() -> NetworkModel {
    let mut net = NetworkModel::new(100.0);
    net.add_bus(Bus::slack("a-slack", 1.0));
    net.add_bus(Bus::fixed("a-load-1", Complex64::new(-0.2, 0.0)));
    net.add_bus(Bus::droop(
        "a-conv",
        0.05,
        DroopControl {
            gain: 0.05,
            v_set: 1.0,
            deadband: 0.005,
        },
    ));
    net.add_bus(Bus::fixed("a-load-2", Complex64::new(-0.15, 0.0)));
    net.add_bus(Bus::slack("b-slack", 1.01));
    net.add_bus(Bus::fixed("b-load", Complex64::new(-0.1, 0.0)));
    net.add_bus(Bus::fixed("stray", Complex64::new(0.0, 0.0)));
    net.add_branch(Branch::from_impedance("a01", 0, 1, 0.02, 0.0).with_rating(0.5));
    net.add_branch(Branch::from_impedance("a12", 1, 2, 0.03, 0.0).with_rating(0.3));
    net.add_branch(Branch::from_impedance("a23", 2, 3, 0.02, 0.0).with_rating(0.3));
    net.add_branch(Branch::from_impedance("a03", 0, 3, 0.04, 0.0).with_rating(0.3));
    net.add_branch(Branch::from_impedance("b45", 4, 5, 0.05, 0.0).with_rating(0.05));
    net
}

fn profile_csv(steps: usize) -> String {
    let mut text = String::from("time,1_p,2_p,3_p,5_p\n");
    for t in 0..steps {
        let x = t as f64 / steps as f64;
        text.push_str(&format!(
            "{t}.0,{:.4},{:.4},{:.4},{:.4}\n",
            -0.1 - 0.2 * x,
            0.05 + 0.1 * x,
            -0.15 + 0.05 * x,
            -0.05 - 0.1 * x
        ));
    }
    text
}

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn options() -> PowerFlowOptions {
    PowerFlowOptions {
        ignore_single_node_islands: true,
        ..Default::default()
    }
}

fn run_replay(mode: ExecutionMode) -> BatchOutcome {
    let net = network();
    let file = write_temp(&profile_csv(12));
    let profile = TimeSeriesProfile::from_csv_path(file.path(), net.n_bus()).unwrap();
    let islands = IslandPartitioner::new(true).partition(&net).unwrap();
    let orch = ExecutionOrchestrator::new(&net, islands, std::sync::Arc::new(PowerFlowSolver), options());
    let mut source = ReplaySource::from_profile(&net, &profile).unwrap();
    orch.run(&mut source, mode, &mut |_| {}, &|| false).unwrap()
}

#[test]
fn sequential_and_parallel_runs_are_identical() {
    init_tracing();
    let sequential = run_replay(ExecutionMode::Sequential);
    let parallel = run_replay(ExecutionMode::Parallel { threads: 3 });
    assert_eq!(sequential.status, RunStatus::Completed);
    assert!(sequential.results.converged.iter().all(|&c| c));
    assert_eq!(sequential, parallel);
}

#[test]
fn replayed_batch_balances_every_island() {
    init_tracing();
    let outcome = run_replay(ExecutionMode::Sequential);
    let results = &outcome.results;
    assert_eq!(results.voltage.shape(), (12, 7));
    assert_eq!(results.s_branch.shape(), (12, 5));
    // stray bus was dropped and keeps its defaults
    assert!(results.voltage.column(6).iter().all(|v| *v == Complex64::new(0.0, 0.0)));
    for t in 0..12 {
        let injected: f64 = (0..4).map(|b| results.s_bus[(t, b)].re).sum();
        let lost: f64 = (0..4).map(|k| results.losses[(t, k)].re).sum();
        assert!((injected - lost).abs() < 1e-7, "grid A imbalance at step {t}");
        let injected_b = results.s_bus[(t, 4)].re + results.s_bus[(t, 5)].re;
        assert!((injected_b - results.losses[(t, 4)].re).abs() < 1e-7);
    }
    let summary = results.summary();
    assert_eq!(summary.converged, 24);
    assert_eq!(summary.pending, 0);
}

#[test]
fn parallel_cancel_stops_early() {
    init_tracing();
    let net = network();
    let islands = IslandPartitioner::new(true).partition(&net).unwrap();
    let orch = ExecutionOrchestrator::new(&net, islands, std::sync::Arc::new(PowerFlowSolver), options());
    let dists = InjectionDistribution::from_network(&net, 0.1);
    let mut source =
        SampledSource::new(&net, orch.islands(), dists, 200, SamplingMethod::MonteCarlo, 5).unwrap();
    let outcome = orch
        .run(&mut source, ExecutionMode::Parallel { threads: 2 }, &mut |_| {}, &|| true)
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Canceled);
    let summary = outcome.results.summary();
    assert!(summary.converged <= 1);
    assert!(summary.pending >= 399);
}

#[test]
fn latin_hypercube_batch_from_config_file() {
    init_tracing();
    let net = network();
    let config_file = write_temp(
        r#"{
            "options": { "ignore_single_node_islands": true },
            "mode": { "mode": "parallel", "threads": 0 },
            "scenarios": { "type": "sampled", "points": 40, "method": "latin-hypercube", "seed": 11, "spread": 0.2 }
        }"#,
    );
    let config = BatchConfig::from_path(config_file.path()).unwrap();
    let mut last = 0.0;
    let (orch, outcome) = config.run(&net, None, &mut |p| last = p, &|| false).unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(last, 1.0);
    assert!(outcome.results.converged.iter().all(|&c| c));

    // every sampled load covers the ±20 % band evenly
    let mut strata: Vec<usize> = (0..40)
        .map(|t| {
            let u = (outcome.results.s_bus[(t, 1)].re / -0.2 - 0.8) / 0.4;
            ((u * 40.0).floor() as usize).min(39)
        })
        .collect();
    strata.sort();
    strata.dedup();
    assert!(strata.len() >= 38);

    let avg = orch.average(&outcome.results);
    assert!(avg.voltage[1].re < 1.0 && avg.voltage[1].re > 0.9);
    assert!(avg.losses[0].re > 0.0);
    assert_eq!(avg.voltage[6], Complex64::new(0.0, 0.0));
}

#[test]
fn replay_window_from_config() {
    let net = network();
    let file = write_temp(&profile_csv(10));
    let profile = TimeSeriesProfile::from_csv_path(file.path(), net.n_bus()).unwrap();
    let config = BatchConfig::from_json_str(
        r#"{ "options": { "ignore_single_node_islands": true }, "scenarios": { "type": "replay", "start": 4, "end": 7 } }"#,
    )
    .unwrap();
    let (_, outcome) = config.run(&net, Some(&profile), &mut |_| {}, &|| false).unwrap();
    assert_eq!(outcome.results.n_scenarios(), 3);
    // first windowed row replays step 4
    assert!((outcome.results.s_bus[(0, 1)].re - profile.p[(4, 1)]).abs() < 1e-12);
}

#[test]
fn stray_bus_without_slack_is_reported_singular() {
    let net = network();
    let islands = IslandPartitioner::default().partition(&net).unwrap();
    assert_eq!(islands.len(), 3);
    let orch = ExecutionOrchestrator::new(&net, islands, std::sync::Arc::new(PowerFlowSolver), Default::default());
    let mut source = ReplaySource::new(vec![Scenario::base(&net)]);
    let outcome = orch
        .run(&mut source, ExecutionMode::Sequential, &mut |_| {}, &|| false)
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.results.converged, vec![false]);
    let summary = outcome.results.summary();
    assert_eq!(summary.singular, 1);
    assert_eq!(summary.converged, 2);
}
