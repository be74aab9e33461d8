use std::sync::Arc;

use log::debug;
use rex_core::{BinaryQuadraticModel, RexError, RngHandle, Sample, SampleSet};

use crate::config::BetaRange;
use crate::counters;
use crate::determinism;
use crate::ladder::TemperatureLadder;
use crate::replica::ReplicaState;
use crate::stage::{ReplicaStage, StageContext};

/// Fixed-temperature search capability driven by the workflow.
///
/// Calls for distinct replicas may run concurrently; an implementation may
/// only read `problem` and `seed`, and must draw all randomness from `rng`.
pub trait Propagator: Send + Sync {
    /// Returns a new sample collection obtained from `seed` at inverse
    /// temperature `beta`.
    fn propagate(
        &self,
        problem: &BinaryQuadraticModel,
        seed: &SampleSet,
        beta: f64,
        num_sweeps: usize,
        rng: &mut RngHandle,
    ) -> Result<SampleSet, RexError>;
}

/// Single-flip Metropolis sampler at a fixed beta.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedTemperatureAnnealer;

impl Propagator for FixedTemperatureAnnealer {
    fn propagate(
        &self,
        problem: &BinaryQuadraticModel,
        seed: &SampleSet,
        beta: f64,
        num_sweeps: usize,
        rng: &mut RngHandle,
    ) -> Result<SampleSet, RexError> {
        let vartype = problem.vartype();
        let mut out = Vec::with_capacity(seed.len());
        for start in seed {
            let mut state = start.assignment.clone();
            for _ in 0..num_sweeps {
                for v in 0..state.len() {
                    let delta = problem.flip_delta(&state, v);
                    if delta <= 0.0 || rng.uniform() < (-beta * delta).exp() {
                        state[v] = vartype.flip(state[v]);
                    }
                }
            }
            let energy = problem.energy_unchecked(&state);
            out.push(Sample::new(state, energy));
        }
        Ok(SampleSet::new(out)?.aggregate())
    }
}

/// Ladder bounds derived from the problem's bias magnitudes.
///
/// The hot bound makes the largest single-flip uphill move accepted with
/// probability 1/2, the cold bound makes the smallest one accepted with
/// probability 1/100. Falls back to `0.1 .. 10.0` when the problem has no
/// non-zero bias.
pub fn default_beta_range(problem: &BinaryQuadraticModel) -> BetaRange {
    const FALLBACK: BetaRange = BetaRange {
        hot: 0.1,
        cold: 10.0,
    };

    let (h, j) = problem.spin_biases();
    let mut sum_abs: Vec<f64> = h.iter().map(|bias| bias.abs()).collect();
    for &(u, v, bias) in &j {
        sum_abs[u] += bias.abs();
        sum_abs[v] += bias.abs();
    }
    let max_delta = 2.0 * sum_abs.iter().copied().fold(0.0_f64, f64::max);
    let min_delta = 2.0
        * h.iter()
            .copied()
            .chain(j.iter().map(|&(_, _, bias)| bias))
            .map(f64::abs)
            .filter(|bias| *bias > 0.0)
            .fold(f64::INFINITY, f64::min);

    if !(max_delta > 0.0 && min_delta.is_finite()) {
        return FALLBACK;
    }
    let hot = std::f64::consts::LN_2 / max_delta;
    let cold = 100f64.ln() / min_delta;
    if hot < cold {
        BetaRange { hot, cold }
    } else {
        FALLBACK
    }
}

/// Propagation stage applied to each slot by `ParallelMap`.
///
/// Each call gets its own generator keyed by slot and round.
pub struct PropagationStage {
    propagator: Arc<dyn Propagator>,
    ladder: TemperatureLadder,
    num_sweeps: usize,
    master_seed: u64,
}

impl PropagationStage {
    /// Creates the stage.
    pub fn new(
        propagator: Arc<dyn Propagator>,
        ladder: TemperatureLadder,
        num_sweeps: usize,
        master_seed: u64,
    ) -> Self {
        Self {
            propagator,
            ladder,
            num_sweeps,
            master_seed,
        }
    }
}

impl ReplicaStage for PropagationStage {
    fn name(&self) -> &str {
        "propagate"
    }

    fn apply(
        &self,
        ctx: &StageContext,
        slot: usize,
        state: ReplicaState,
    ) -> Result<ReplicaState, RexError> {
        ctx.counters().increment(counters::PROPAGATE_CALLS);
        let round = ctx.round();
        let beta = state.beta_at(&self.ladder, slot);
        let mut rng =
            RngHandle::from_seed(determinism::propagate_seed(self.master_seed, slot, round));
        let failed = |err: RexError| {
            RexError::Propagation(
                err.info()
                    .clone()
                    .with_context("slot", slot)
                    .with_context("round", round)
                    .with_context("beta", beta),
            )
        };

        let samples = self
            .propagator
            .propagate(state.problem(), state.samples(), beta, self.num_sweeps, &mut rng)
            .map_err(failed)?;
        samples.check_against(state.problem()).map_err(failed)?;
        debug!(
            "propagated slot {slot} at beta {beta:.4} in round {round}: best {}",
            samples.best_energy()
        );
        Ok(state.updated(samples))
    }
}
