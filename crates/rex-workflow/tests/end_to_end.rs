use std::fs;
use std::sync::Arc;

use rex_core::{BinaryQuadraticModel, RexError, RngHandle, Sample, SampleSet};
use rex_workflow::{
    merge_samples, run, run_with, CancelToken, Propagator, ReplicaState, RunManifest, RunSummary,
    StopReason, WorkflowConfig,
};
use tempfile::tempdir;

/// Returns a fixed sample per temperature: hot slots land on energy -1, cold
/// slots on -3.
struct FixedEnergy;

impl Propagator for FixedEnergy {
    fn propagate(
        &self,
        _problem: &BinaryQuadraticModel,
        _seed: &SampleSet,
        beta: f64,
        _num_sweeps: usize,
        _rng: &mut RngHandle,
    ) -> Result<SampleSet, RexError> {
        let sample = if beta < 1.0 {
            Sample::new(vec![0, 1], -1.0)
        } else {
            Sample::new(vec![1, 1], -3.0)
        };
        Ok(SampleSet::single(sample))
    }
}

fn two_variable_problem() -> Arc<BinaryQuadraticModel> {
    Arc::new(BinaryQuadraticModel::from_coo_str("0 0 -1\n1 1 -1\n0 1 -1\n").unwrap())
}

fn ring(n: usize) -> Arc<BinaryQuadraticModel> {
    let mut text = String::new();
    for v in 0..n {
        text.push_str(&format!("{v} {v} {}\n", if v % 2 == 0 { -1.0 } else { 0.5 }));
        text.push_str(&format!("{v} {} 1.5\n", (v + 1) % n));
    }
    Arc::new(BinaryQuadraticModel::from_coo_str(&text).unwrap())
}

#[test]
fn two_variable_run_returns_minimum_post_propagation_energy() {
    let config = WorkflowConfig::default()
        .with_num_replicas(2)
        .with_num_iterations(1)
        .with_beta_range(0.5, 2.0);
    let summary = run_with(
        &config,
        two_variable_problem(),
        Arc::new(FixedEnergy),
        CancelToken::new(),
    )
    .unwrap();
    assert_eq!(summary.best.energy, -3.0);
    assert_eq!(summary.best.assignment, vec![1, 1]);
    assert_eq!(summary.merged.len(), 2);
    assert_eq!(summary.stop_reason, StopReason::Completed);
    assert_eq!(summary.rounds_completed, 1);
}

#[test]
fn merging_a_single_replica_keeps_its_best_entry() {
    let problem = two_variable_problem();
    let samples = SampleSet::new(vec![
        Sample::new(vec![0, 0], 0.0),
        Sample::new(vec![1, 1], -3.0),
        Sample::new(vec![1, 0], -1.0),
    ])
    .unwrap();
    let expected = samples.first().clone();
    let merged = merge_samples(&[ReplicaState::new(problem, samples)]).unwrap();
    assert_eq!(merged.best, expected);
    assert_eq!(merged.samples.len(), 3);
}

#[test]
fn annealer_finds_ring_ground_state() {
    let problem = ring(6);
    let config = WorkflowConfig::default()
        .with_num_replicas(4)
        .with_num_iterations(5)
        .with_num_sweeps(50)
        .with_seed(31);
    let summary = run(&config, Arc::clone(&problem)).unwrap();

    let brute = (0u32..1 << 6)
        .map(|bits| {
            let assignment: Vec<i8> = (0..6).map(|v| ((bits >> v) & 1) as i8).collect();
            problem.energy(&assignment).unwrap()
        })
        .fold(f64::INFINITY, f64::min);
    assert_eq!(summary.best.energy, brute);
    assert_eq!(problem.energy(&summary.best.assignment).unwrap(), summary.best.energy);
}

#[test]
fn invalid_ladder_fails_before_any_propagation() {
    let problem = two_variable_problem();
    let zero = WorkflowConfig::default().with_num_replicas(0);
    assert!(matches!(run(&zero, Arc::clone(&problem)), Err(RexError::InvalidRange(_))));
    let inverted = WorkflowConfig::default().with_beta_range(3.0, 1.0);
    assert!(matches!(run(&inverted, Arc::clone(&problem)), Err(RexError::InvalidRange(_))));
    let non_positive = WorkflowConfig::default().with_beta_range(0.0, 1.0);
    assert!(matches!(run(&non_positive, problem), Err(RexError::InvalidRange(_))));
}

#[test]
fn artefacts_are_written_when_a_run_directory_is_set() {
    let dir = tempdir().unwrap();
    let run_dir = dir.path().join("runs").join("first");
    let problem = ring(4);
    let mut config = WorkflowConfig::default()
        .with_num_replicas(3)
        .with_num_iterations(4)
        .with_num_sweeps(5)
        .with_run_directory(&run_dir);
    config.seed_policy.label = Some("ring-4".into());
    let summary = run(&config, Arc::clone(&problem)).unwrap();

    let summary_path = summary.summary_path.clone().unwrap();
    let manifest_path = summary.manifest_path.clone().unwrap();
    let trace_path = summary.trace_path.clone().unwrap();
    assert_eq!(summary_path, run_dir.join("summary.json"));

    let stored: RunSummary =
        serde_json::from_str(&fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert_eq!(stored.best, summary.best);
    assert_eq!(stored.merged, summary.merged);
    assert_eq!(stored.counters, summary.counters);
    assert_eq!(stored.ladder, summary.ladder);

    let manifest = RunManifest::load(&manifest_path).unwrap();
    assert_eq!(manifest.master_seed, config.seed_policy.master_seed);
    assert_eq!(manifest.seed_label.as_deref(), Some("ring-4"));
    assert_eq!(manifest.problem_fingerprint, problem.fingerprint().unwrap());
    assert_eq!(manifest.rounds_completed, 4);
    assert_eq!(manifest.config, config);

    let trace = fs::read_to_string(&trace_path).unwrap();
    assert_eq!(trace.lines().count(), 1 + 4 * 3);
}

#[test]
fn no_artefacts_without_a_run_directory() {
    let config = WorkflowConfig::default()
        .with_num_replicas(2)
        .with_num_iterations(1)
        .with_num_sweeps(1);
    let summary = run(&config, ring(3)).unwrap();
    assert!(summary.summary_path.is_none());
    assert!(summary.manifest_path.is_none());
    assert!(summary.trace_path.is_none());
    assert_eq!(summary.trace.len(), 2);
}
