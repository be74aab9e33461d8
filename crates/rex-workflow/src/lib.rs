#![deny(missing_docs)]

//! Parallel-tempering (replica-exchange) workflow engine.
//!
//! A run builds a [`TemperatureLadder`], seeds one [`ReplicaState`] per rung
//! and executes
//!
//! ```text
//! Loop(Sequence(Sequence(ParallelMap(propagate), swap), record), num_iterations)
//! ```
//!
//! followed by a terminal [`Merge`]. The swap policy fixes the temperature
//! binding: the deterministic sweep keeps betas on slots, the randomized
//! single-pair policy carries them on replica states.

/// YAML configuration schema and defaults.
pub mod config;
/// Named invocation counters.
pub mod counters;
/// Deterministic seed derivation helpers.
pub mod determinism;
/// Public `run` entry points and the run summary.
pub mod kernel;
/// Inverse-temperature ladder construction.
pub mod ladder;
/// Run manifest serialization helpers.
pub mod manifest;
/// Terminal merge of replica sample sets.
pub mod merge;
/// Per-round trace recording and CSV export.
pub mod metrics;
/// Propagator contract and the fixed-temperature annealer.
pub mod propagate;
/// Replica state and temperature binding.
pub mod replica;
/// Stage trait and composite operators.
pub mod stage;
/// Replica-exchange acceptance and swap policies.
pub mod swap;

pub use config::{BetaRange, InitialState, OutputConfig, SeedPolicy, SwapPolicy, WorkflowConfig};
pub use counters::Counters;
pub use kernel::{run, run_with, RunSummary};
pub use ladder::TemperatureLadder;
pub use manifest::RunManifest;
pub use merge::{merge_samples, Merge, MergedSamples, Workflow, WorkflowOutput};
pub use metrics::{Record, TraceRecorder, TraceRow};
pub use propagate::{default_beta_range, FixedTemperatureAnnealer, PropagationStage, Propagator};
pub use replica::{seed_replicas, ReplicaState, TemperatureBinding};
pub use stage::{
    replica_fn, stage_fn, CancelToken, Loop, ParallelMap, ReplicaStage, Sequence, Stage,
    StageContext, StopReason,
};
pub use swap::{
    acceptance_weight, swap_stage, ExchangeLedger, PairExchangeStats, SweepDown, SwapEvaluator,
    SwapOutcome, SwapRandomPair,
};
