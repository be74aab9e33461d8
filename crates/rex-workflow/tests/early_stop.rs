use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rex_core::{BinaryQuadraticModel, ErrorInfo, RexError, RngHandle, Sample, SampleSet};
use rex_workflow::counters::PROPAGATE_CALLS;
use rex_workflow::{run_with, CancelToken, Propagator, StopReason, WorkflowConfig};
use tempfile::tempdir;

/// Drops the energy by one per call and cancels the run after `limit` calls.
struct CancelAfter {
    token: CancelToken,
    calls: AtomicUsize,
    limit: usize,
}

impl Propagator for CancelAfter {
    fn propagate(
        &self,
        _problem: &BinaryQuadraticModel,
        seed: &SampleSet,
        _beta: f64,
        _num_sweeps: usize,
        _rng: &mut RngHandle,
    ) -> Result<SampleSet, RexError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.limit {
            self.token.cancel();
        }
        let best = seed.first();
        Ok(SampleSet::single(Sample::new(
            best.assignment.clone(),
            best.energy - 1.0,
        )))
    }
}

/// Fails for every replica colder than `beta_limit`.
struct FailCold {
    beta_limit: f64,
}

impl Propagator for FailCold {
    fn propagate(
        &self,
        _problem: &BinaryQuadraticModel,
        seed: &SampleSet,
        beta: f64,
        _num_sweeps: usize,
        _rng: &mut RngHandle,
    ) -> Result<SampleSet, RexError> {
        if beta > self.beta_limit {
            return Err(RexError::Propagation(ErrorInfo::new(
                "stub-failure",
                "refusing to sample cold replicas",
            )));
        }
        Ok(seed.clone())
    }
}

/// Returns an assignment of the wrong length.
struct Truncating;

impl Propagator for Truncating {
    fn propagate(
        &self,
        _problem: &BinaryQuadraticModel,
        _seed: &SampleSet,
        _beta: f64,
        _num_sweeps: usize,
        _rng: &mut RngHandle,
    ) -> Result<SampleSet, RexError> {
        Ok(SampleSet::single(Sample::new(vec![0], 0.0)))
    }
}

fn problem() -> Arc<BinaryQuadraticModel> {
    Arc::new(BinaryQuadraticModel::from_coo_str("0 0 1\n1 1 1\n0 1 -2\n").unwrap())
}

fn config() -> WorkflowConfig {
    WorkflowConfig::default()
        .with_num_replicas(3)
        .with_num_iterations(10)
        .with_beta_range(0.1, 2.0)
}

#[test]
fn cancelled_token_skips_every_round() {
    let token = CancelToken::new();
    token.cancel();
    let propagator = Arc::new(CancelAfter {
        token: token.clone(),
        calls: AtomicUsize::new(0),
        limit: usize::MAX,
    });
    let summary = run_with(&config(), problem(), propagator, token).unwrap();
    assert_eq!(summary.rounds_completed, 0);
    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert!(!summary.counters.contains_key(PROPAGATE_CALLS));
    // initial states are still merged
    assert_eq!(summary.merged.len(), 1);
}

#[test]
fn cancellation_is_observed_at_the_next_round_boundary() {
    let token = CancelToken::new();
    let propagator = Arc::new(CancelAfter {
        token: token.clone(),
        calls: AtomicUsize::new(0),
        limit: 6,
    });
    let summary = run_with(&config(), problem(), propagator, token).unwrap();
    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert_eq!(summary.rounds_completed, 2);
    assert_eq!(summary.counters[PROPAGATE_CALLS], 6);
    // two completed rounds lowered every replica's energy by two
    let initial = SampleSet::lowest(&problem()).best_energy();
    assert_eq!(summary.best.energy, initial - 2.0);
}

#[test]
fn zero_time_limit_times_out_gracefully() {
    let config = config().with_time_limit(0.0);
    let propagator = Arc::new(FailCold { beta_limit: 0.0 });
    let summary = run_with(&config, problem(), propagator, CancelToken::new()).unwrap();
    assert_eq!(summary.stop_reason, StopReason::TimedOut);
    assert_eq!(summary.rounds_completed, 0);
}

#[test]
fn propagation_failure_aborts_the_run() {
    let dir = tempdir().unwrap();
    let config = config().with_run_directory(dir.path().join("run"));
    let propagator = Arc::new(FailCold { beta_limit: 1.0 });
    let err = run_with(&config, problem(), propagator, CancelToken::new()).unwrap_err();
    match err {
        RexError::Propagation(info) => {
            assert_eq!(info.code, "stub-failure");
            assert_eq!(info.context.get("round").map(String::as_str), Some("0"));
            assert!(info.context.contains_key("slot"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!dir.path().join("run").join("summary.json").exists());
}

#[test]
fn malformed_propagation_output_is_a_propagation_error() {
    let err =
        run_with(&config(), problem(), Arc::new(Truncating), CancelToken::new()).unwrap_err();
    assert!(matches!(err, RexError::Propagation(_)));
    assert_eq!(err.info().code, "assignment-length");
}
