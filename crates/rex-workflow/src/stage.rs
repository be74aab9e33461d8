use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, warn};
use rayon::prelude::*;
use rayon::ThreadPool;
use rex_core::RexError;
use serde::{Deserialize, Serialize};

use crate::counters::{self, Counters};
use crate::replica::ReplicaState;

/// Cooperative cancellation flag, observed at round boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the run stop before its next round.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether [`CancelToken::cancel`] has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Why the round loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// Every configured round ran.
    #[default]
    Completed,
    /// The cancel token was triggered.
    Cancelled,
    /// The wall-clock deadline passed.
    TimedOut,
}

#[derive(Debug, Default)]
struct Progress {
    rounds_completed: usize,
    stop_reason: StopReason,
}

/// Run-wide handles shared by every stage invocation.
#[derive(Debug, Clone)]
pub struct StageContext {
    counters: Arc<Counters>,
    cancel: CancelToken,
    deadline: Option<Instant>,
    progress: Arc<Mutex<Progress>>,
    round: usize,
}

impl StageContext {
    /// Context with fresh counters and no deadline.
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            counters: Arc::new(Counters::new()),
            cancel,
            deadline: None,
            progress: Arc::new(Mutex::new(Progress::default())),
            round: 0,
        }
    }

    /// Stops the round loop once `limit` has elapsed from now.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.deadline = Some(Instant::now() + limit);
        self
    }

    /// Invocation counters.
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Index of the round being executed.
    pub fn round(&self) -> usize {
        self.round
    }

    /// Copy of the context positioned at `round`.
    pub fn at_round(&self, round: usize) -> Self {
        Self {
            round,
            ..self.clone()
        }
    }

    /// Reason to stop before starting another round, if any.
    pub fn should_stop(&self) -> Option<StopReason> {
        if self.cancel.is_cancelled() {
            return Some(StopReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(StopReason::TimedOut),
            _ => None,
        }
    }

    /// Rounds fully completed so far.
    pub fn rounds_completed(&self) -> usize {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rounds_completed
    }

    /// Reason the round loop ended, `Completed` until it stops early.
    pub fn stop_reason(&self) -> StopReason {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop_reason
    }

    fn finish_round(&self) {
        self.counters.increment(counters::ROUND_COUNT);
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rounds_completed += 1;
    }

    fn stop(&self, reason: StopReason) {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop_reason = reason;
    }
}

/// Maps the whole replica sequence to a new sequence.
pub trait Stage {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Runs the stage.
    fn run(
        &mut self,
        ctx: &StageContext,
        replicas: Vec<ReplicaState>,
    ) -> Result<Vec<ReplicaState>, RexError>;
}

impl Stage for Box<dyn Stage> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run(
        &mut self,
        ctx: &StageContext,
        replicas: Vec<ReplicaState>,
    ) -> Result<Vec<ReplicaState>, RexError> {
        (**self).run(ctx, replicas)
    }
}

/// Maps a single replica; applied to every slot by [`ParallelMap`].
///
/// Implementations only read shared data, so distinct slots may run on
/// different threads at once.
pub trait ReplicaStage: Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Updates the replica occupying `slot`.
    fn apply(
        &self,
        ctx: &StageContext,
        slot: usize,
        state: ReplicaState,
    ) -> Result<ReplicaState, RexError>;
}

/// Applies a [`ReplicaStage`] to every replica concurrently and waits for all
/// of them. The first failure is returned and no partial sequence survives.
pub struct ParallelMap<S> {
    stage: S,
    pool: Option<Arc<ThreadPool>>,
}

impl<S: ReplicaStage> ParallelMap<S> {
    /// Runs on the global rayon pool.
    pub fn new(stage: S) -> Self {
        Self { stage, pool: None }
    }

    /// Runs inside `pool`.
    pub fn with_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }
}

impl<S: ReplicaStage> Stage for ParallelMap<S> {
    fn name(&self) -> &str {
        "parallel-map"
    }

    fn run(
        &mut self,
        ctx: &StageContext,
        replicas: Vec<ReplicaState>,
    ) -> Result<Vec<ReplicaState>, RexError> {
        ctx.counters().increment(counters::PARALLEL_MAP_CALLS);
        debug!(
            "round {}: {} over {} replicas",
            ctx.round(),
            self.stage.name(),
            replicas.len()
        );
        let stage = &self.stage;
        let work = move || {
            replicas
                .into_par_iter()
                .enumerate()
                .map(|(slot, state)| stage.apply(ctx, slot, state))
                .collect::<Result<Vec<_>, RexError>>()
        };
        match &self.pool {
            Some(pool) => pool.install(work),
            None => work(),
        }
    }
}

/// Runs `first`, then feeds its output to `second`.
pub struct Sequence<A, B> {
    first: A,
    second: B,
}

impl<A: Stage, B: Stage> Sequence<A, B> {
    /// Chains two stages.
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Stage, B: Stage> Stage for Sequence<A, B> {
    fn name(&self) -> &str {
        "sequence"
    }

    fn run(
        &mut self,
        ctx: &StageContext,
        replicas: Vec<ReplicaState>,
    ) -> Result<Vec<ReplicaState>, RexError> {
        ctx.counters().increment(counters::SEQUENCE_CALLS);
        debug!("{} then {}", self.first.name(), self.second.name());
        let intermediate = self.first.run(ctx, replicas)?;
        self.second.run(ctx, intermediate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopKind {
    Rounds,
    Repeat,
}

/// Repeats a stage a fixed number of times, threading the sequence through.
pub struct Loop<S> {
    stage: S,
    iterations: usize,
    kind: LoopKind,
}

impl<S: Stage> Loop<S> {
    /// Outer round loop. Checks cancellation and the deadline before each
    /// round, tags the context with the round index and counts completed
    /// rounds.
    pub fn rounds(stage: S, iterations: usize) -> Self {
        Self {
            stage,
            iterations,
            kind: LoopKind::Rounds,
        }
    }

    /// Plain repetition inside a round; never stops early.
    pub fn repeat(stage: S, iterations: usize) -> Self {
        Self {
            stage,
            iterations,
            kind: LoopKind::Repeat,
        }
    }
}

impl<S: Stage> Stage for Loop<S> {
    fn name(&self) -> &str {
        match self.kind {
            LoopKind::Rounds => "rounds",
            LoopKind::Repeat => "repeat",
        }
    }

    fn run(
        &mut self,
        ctx: &StageContext,
        mut replicas: Vec<ReplicaState>,
    ) -> Result<Vec<ReplicaState>, RexError> {
        ctx.counters().increment(counters::LOOP_CALLS);
        for iteration in 0..self.iterations {
            match self.kind {
                LoopKind::Rounds => {
                    if let Some(reason) = ctx.should_stop() {
                        warn!(
                            "stopping {} before round {iteration} of {}: {reason:?}",
                            self.stage.name(),
                            self.iterations
                        );
                        ctx.stop(reason);
                        break;
                    }
                    let round_ctx = ctx.at_round(iteration);
                    replicas = self.stage.run(&round_ctx, replicas)?;
                    ctx.finish_round();
                    debug!("round {iteration} of {} complete", self.stage.name());
                }
                LoopKind::Repeat => {
                    replicas = self.stage.run(ctx, replicas)?;
                }
            }
        }
        Ok(replicas)
    }
}

/// Adapts a closure into a [`Stage`].
pub struct StageFn<F> {
    name: String,
    f: F,
}

/// Wraps `f` as a named [`Stage`].
pub fn stage_fn<F>(name: impl Into<String>, f: F) -> StageFn<F>
where
    F: FnMut(&StageContext, Vec<ReplicaState>) -> Result<Vec<ReplicaState>, RexError>,
{
    StageFn {
        name: name.into(),
        f,
    }
}

impl<F> Stage for StageFn<F>
where
    F: FnMut(&StageContext, Vec<ReplicaState>) -> Result<Vec<ReplicaState>, RexError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &mut self,
        ctx: &StageContext,
        replicas: Vec<ReplicaState>,
    ) -> Result<Vec<ReplicaState>, RexError> {
        (self.f)(ctx, replicas)
    }
}

/// Adapts a closure into a [`ReplicaStage`].
pub struct ReplicaFn<F> {
    name: String,
    f: F,
}

/// Wraps `f` as a named [`ReplicaStage`].
pub fn replica_fn<F>(name: impl Into<String>, f: F) -> ReplicaFn<F>
where
    F: Fn(&StageContext, usize, ReplicaState) -> Result<ReplicaState, RexError> + Sync,
{
    ReplicaFn {
        name: name.into(),
        f,
    }
}

impl<F> ReplicaStage for ReplicaFn<F>
where
    F: Fn(&StageContext, usize, ReplicaState) -> Result<ReplicaState, RexError> + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &self,
        ctx: &StageContext,
        slot: usize,
        state: ReplicaState,
    ) -> Result<ReplicaState, RexError> {
        (self.f)(ctx, slot, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rex_core::{BinaryQuadraticModel, ErrorInfo, Sample, SampleSet};

    fn replicas(n: usize) -> Vec<ReplicaState> {
        let problem = Arc::new(BinaryQuadraticModel::from_coo_str("0 0 1\n1 1 1\n").unwrap());
        (0..n)
            .map(|_| ReplicaState::new(Arc::clone(&problem), SampleSet::lowest(&problem)))
            .collect()
    }

    fn tag_energy(
        energy: f64,
    ) -> impl Fn(&StageContext, usize, ReplicaState) -> Result<ReplicaState, RexError> + Sync {
        move |_: &StageContext, slot: usize, state: ReplicaState| {
            let sample = Sample::new(vec![0, 0], energy + slot as f64);
            Ok(state.updated(SampleSet::single(sample)))
        }
    }

    #[test]
    fn parallel_map_preserves_slot_order() {
        let ctx = StageContext::new(CancelToken::new());
        let mut stage = ParallelMap::new(replica_fn("tag", tag_energy(10.0)));
        let out = stage.run(&ctx, replicas(8)).unwrap();
        let energies: Vec<f64> = out.iter().map(ReplicaState::best_energy).collect();
        assert_eq!(energies, (0..8).map(|k| 10.0 + k as f64).collect::<Vec<_>>());
    }

    #[test]
    fn parallel_map_fails_as_a_whole() {
        let ctx = StageContext::new(CancelToken::new());
        let mut stage = ParallelMap::new(replica_fn("fail-on-2", |_, slot, state| {
            if slot == 2 {
                Err(RexError::Propagation(ErrorInfo::new("boom", "slot 2 failed")))
            } else {
                Ok(state)
            }
        }));
        let err = stage.run(&ctx, replicas(4)).unwrap_err();
        assert!(matches!(err, RexError::Propagation(_)));
    }

    #[test]
    fn rounds_tag_context_and_count() {
        let ctx = StageContext::new(CancelToken::new());
        let mut seen = Vec::new();
        {
            let body = stage_fn("observe", |ctx: &StageContext, replicas| {
                seen.push(ctx.round());
                Ok(replicas)
            });
            let mut looped = Loop::rounds(body, 3);
            looped.run(&ctx, replicas(2)).unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(ctx.rounds_completed(), 3);
        assert_eq!(ctx.counters().get(counters::ROUND_COUNT), 3);
        assert_eq!(ctx.stop_reason(), StopReason::Completed);
    }

    #[test]
    fn cancellation_stops_at_the_next_boundary() {
        let cancel = CancelToken::new();
        let ctx = StageContext::new(cancel.clone());
        let body = stage_fn("cancel-after-first", move |ctx: &StageContext, replicas| {
            if ctx.round() == 1 {
                cancel.cancel();
            }
            Ok(replicas)
        });
        Loop::rounds(body, 10).run(&ctx, replicas(2)).unwrap();
        // round 1 still finishes; round 2 never starts
        assert_eq!(ctx.rounds_completed(), 2);
        assert_eq!(ctx.stop_reason(), StopReason::Cancelled);
    }

    #[test]
    fn zero_time_limit_runs_no_rounds() {
        let ctx = StageContext::new(CancelToken::new()).with_time_limit(Duration::ZERO);
        let body = stage_fn("noop", |_: &StageContext, replicas| Ok(replicas));
        let out = Loop::rounds(body, 5).run(&ctx, replicas(3)).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(ctx.rounds_completed(), 0);
        assert_eq!(ctx.stop_reason(), StopReason::TimedOut);
    }

    #[test]
    fn sequence_feeds_output_forward() {
        let ctx = StageContext::new(CancelToken::new());
        let first = ParallelMap::new(replica_fn("tag", tag_energy(1.0)));
        let second = stage_fn("reverse", |_: &StageContext, mut replicas: Vec<ReplicaState>| {
            replicas.reverse();
            Ok(replicas)
        });
        let out = Sequence::new(first, second).run(&ctx, replicas(3)).unwrap();
        assert_eq!(out[0].best_energy(), 3.0);
        assert_eq!(ctx.counters().get(counters::SEQUENCE_CALLS), 1);
    }

    #[test]
    fn operators_report_their_names() {
        let leaf = replica_fn("tag", tag_energy(0.0));
        assert_eq!(ReplicaStage::name(&leaf), "tag");
        let map = ParallelMap::new(leaf);
        assert_eq!(map.name(), "parallel-map");
        let boxed: Box<dyn Stage> = Box::new(Loop::repeat(map, 2));
        assert_eq!(boxed.name(), "repeat");
        let noop = stage_fn("noop", |_: &StageContext, replicas| Ok(replicas));
        let rounds = Loop::rounds(Sequence::new(boxed, noop), 1);
        assert_eq!(rounds.name(), "rounds");
        assert_eq!(rounds.stage.name(), "sequence");
    }
}
