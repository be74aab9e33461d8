use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use rayon::ThreadPool;
use rex_core::{
    BinaryQuadraticModel, ErrorInfo, ProblemStats, RexError, RngHandle, Sample, SampleSet,
};
use serde::{Deserialize, Serialize};

use crate::config::WorkflowConfig;
use crate::determinism;
use crate::ladder::TemperatureLadder;
use crate::manifest::{self, RunManifest};
use crate::merge::Workflow;
use crate::metrics::{Record, TraceRecorder, TraceRow};
use crate::propagate::{
    default_beta_range, FixedTemperatureAnnealer, PropagationStage, Propagator,
};
use crate::replica::{seed_replicas, TemperatureBinding};
use crate::stage::{CancelToken, Loop, ParallelMap, Sequence, StageContext, StopReason};
use crate::swap::{swap_stage, ExchangeLedger, PairExchangeStats, SwapEvaluator};

/// Result of a replica-exchange run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Ladder the run used, hottest first.
    pub ladder: TemperatureLadder,
    /// Temperature binding implied by the swap policy.
    pub binding: TemperatureBinding,
    /// Swap policy name.
    pub swap_policy: String,
    /// Rounds that fully completed.
    pub rounds_completed: usize,
    /// Why the round loop ended.
    pub stop_reason: StopReason,
    /// Lowest-energy sample over all replicas.
    pub best: Sample,
    /// Merged, deduplicated samples, lowest energy first.
    pub merged: SampleSet,
    /// Invocation counters by name.
    pub counters: BTreeMap<String, u64>,
    /// Exchange statistics per adjacent pair.
    pub exchange: Vec<PairExchangeStats>,
    /// Size and density of the input problem.
    pub problem_stats: ProblemStats,
    /// Per-round slot snapshots.
    #[serde(skip)]
    pub trace: Vec<TraceRow>,
    /// Summary file, if artefacts were written.
    pub summary_path: Option<PathBuf>,
    /// Manifest file, if artefacts were written.
    pub manifest_path: Option<PathBuf>,
    /// Trace CSV, if artefacts were written.
    pub trace_path: Option<PathBuf>,
}

/// Runs the workflow with the built-in annealer and no external cancellation.
pub fn run(
    config: &WorkflowConfig,
    problem: Arc<BinaryQuadraticModel>,
) -> Result<RunSummary, RexError> {
    run_with(
        config,
        problem,
        Arc::new(FixedTemperatureAnnealer),
        CancelToken::new(),
    )
}

/// Runs `Loop(Sequence(Sequence(ParallelMap(propagate), swap), record))`
/// followed by a merge.
///
/// Configuration and ladder errors surface before any replica is created. A
/// propagation failure aborts the run; cancellation and the time limit end it
/// early with the result of the last completed round.
pub fn run_with(
    config: &WorkflowConfig,
    problem: Arc<BinaryQuadraticModel>,
    propagator: Arc<dyn Propagator>,
    cancel: CancelToken,
) -> Result<RunSummary, RexError> {
    config.validate()?;
    let range = config
        .beta_range
        .unwrap_or_else(|| default_beta_range(&problem));
    let ladder = TemperatureLadder::geometric(range.hot, range.cold, config.num_replicas)?;
    let binding = config.swap_policy.binding();
    let master_seed = config.seed_policy.master_seed;
    let problem_stats = problem.stats();
    info!(
        "replica exchange: {} replicas, beta {:.4}..{:.4}, {} rounds x {} sweeps, {} ({:?})",
        ladder.len(),
        ladder.hot(),
        ladder.cold(),
        config.num_iterations,
        config.num_sweeps,
        config.swap_policy.as_str(),
        binding
    );

    let replicas = seed_replicas(
        &problem,
        &ladder,
        binding,
        config.initial_state,
        master_seed,
    );

    let mut ctx = StageContext::new(cancel);
    if let Some(limit) = config
        .time_limit_secs
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    {
        ctx = ctx.with_time_limit(limit);
    }

    let mut propagate = ParallelMap::new(PropagationStage::new(
        propagator,
        ladder.clone(),
        config.num_sweeps,
        master_seed,
    ));
    if let Some(pool) = build_pool(config.threads)? {
        propagate = propagate.with_pool(pool);
    }
    let ledger = ExchangeLedger::new(ladder.len());
    let evaluator = SwapEvaluator::new(RngHandle::from_seed(determinism::swap_seed(master_seed)));
    let swap = swap_stage(config.swap_policy, evaluator, ladder.clone(), ledger.clone());
    let recorder = TraceRecorder::new();
    let record = Record::new(recorder.clone(), ladder.clone());

    let round = Sequence::new(Sequence::new(propagate, swap), record);
    let mut workflow = Workflow::new(Box::new(Loop::rounds(round, config.num_iterations)));
    let output = workflow.run(&ctx, replicas)?;

    let mut summary = RunSummary {
        ladder,
        binding,
        swap_policy: config.swap_policy.as_str().to_string(),
        rounds_completed: ctx.rounds_completed(),
        stop_reason: ctx.stop_reason(),
        best: output.merged.best,
        merged: output.merged.samples,
        counters: ctx.counters().snapshot(),
        exchange: ledger.stats(),
        problem_stats,
        trace: recorder.rows(),
        summary_path: None,
        manifest_path: None,
        trace_path: None,
    };
    info!(
        "finished after {} rounds ({:?}): best energy {}",
        summary.rounds_completed, summary.stop_reason, summary.best.energy
    );

    if let Some(run_dir) = config.output.run_directory.as_ref() {
        let trace_path = run_dir.join(&config.output.trace_file);
        let summary_path = run_dir.join(&config.output.summary_file);
        let manifest_path = run_dir.join(&config.output.manifest_file);
        recorder.write_csv(&trace_path)?;
        summary.trace_path = Some(trace_path);
        summary.summary_path = Some(summary_path.clone());
        summary.manifest_path = Some(manifest_path.clone());
        manifest::write_json(&summary_path, &summary, "summary")?;

        let run_manifest = RunManifest {
            config: config.clone(),
            master_seed,
            seed_label: config.seed_policy.label.clone(),
            problem_fingerprint: problem.fingerprint()?,
            rounds_completed: summary.rounds_completed,
            stop_reason: summary.stop_reason,
            summary_file: config.output.summary_file.clone(),
            trace_file: config.output.trace_file.clone(),
        };
        run_manifest.write(&manifest_path)?;
        info!("artefacts written to {}", run_dir.display());
    }

    Ok(summary)
}

fn build_pool(threads: Option<usize>) -> Result<Option<Arc<ThreadPool>>, RexError> {
    let Some(threads) = threads else {
        return Ok(None);
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map(|pool| Some(Arc::new(pool)))
        .map_err(|err| {
            RexError::Config(
                ErrorInfo::new("thread-pool", err.to_string()).with_context("threads", threads),
            )
        })
}
