use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use rex_core::{RexError, RngHandle};
use serde::{Deserialize, Serialize};

use crate::config::SwapPolicy;
use crate::counters;
use crate::ladder::TemperatureLadder;
use crate::replica::ReplicaState;
use crate::stage::{Loop, Stage, StageContext};

/// Metropolis weight for exchanging the samples of two replicas.
///
/// The exponent is clamped to `<= 0` before exponentiation, so the result is
/// in `(0, 1]` for every finite or infinite input and never `NaN`.
pub fn acceptance_weight(beta_a: f64, energy_a: f64, beta_b: f64, energy_b: f64) -> f64 {
    let exponent = ((beta_a - beta_b) * (energy_a - energy_b)).min(0.0);
    exponent.exp().max(f64::MIN_POSITIVE)
}

/// Result of one swap evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwapOutcome {
    /// Adjacent slots `(i, i + 1)` that were evaluated.
    pub pair: (usize, usize),
    /// Acceptance weight.
    pub weight: f64,
    /// Uniform draw compared against the weight.
    pub draw: f64,
    /// Whether the samples were exchanged.
    pub accepted: bool,
}

/// Pairwise acceptance test driven by one injected generator.
///
/// The same generator supplies every uniform draw and, under the randomized
/// policy, every pair index.
#[derive(Debug, Clone)]
pub struct SwapEvaluator {
    rng: RngHandle,
}

impl SwapEvaluator {
    /// Wraps `rng`.
    pub fn new(rng: RngHandle) -> Self {
        Self { rng }
    }

    /// Decides one exchange; returns `(accepted, weight, draw)`.
    pub fn evaluate(
        &mut self,
        beta_a: f64,
        energy_a: f64,
        beta_b: f64,
        energy_b: f64,
    ) -> (bool, f64, f64) {
        let weight = acceptance_weight(beta_a, energy_a, beta_b, energy_b);
        let draw = self.rng.uniform();
        (weight > draw, weight, draw)
    }

    /// Uniform index in `0..=num_replicas - 2`. Requires two or more replicas.
    pub fn pick_pair(&mut self, num_replicas: usize) -> usize {
        self.rng.index(num_replicas - 1)
    }

    /// Evaluates pair `(i, i + 1)` and exchanges their samples on acceptance.
    pub fn swap_pair(
        &mut self,
        replicas: &mut [ReplicaState],
        ladder: &TemperatureLadder,
        i: usize,
    ) -> SwapOutcome {
        let (left, right) = replicas.split_at_mut(i + 1);
        let (a, b) = (&mut left[i], &mut right[0]);
        let (accepted, weight, draw) = self.evaluate(
            a.beta_at(ladder, i),
            a.best_energy(),
            b.beta_at(ladder, i + 1),
            b.best_energy(),
        );
        if accepted {
            ReplicaState::exchange_samples(a, b);
        }
        SwapOutcome {
            pair: (i, i + 1),
            weight,
            draw,
            accepted,
        }
    }
}

/// Acceptance statistics for one adjacent pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairExchangeStats {
    /// Slots `(i, i + 1)`.
    pub pair: (usize, usize),
    /// Evaluations.
    pub attempts: u64,
    /// Accepted evaluations.
    pub accepts: u64,
    /// Mean acceptance weight over all attempts, 0 when never attempted.
    pub mean_weight: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct PairTally {
    attempts: u64,
    accepts: u64,
    weight_sum: f64,
}

/// Shared per-pair tallies, readable after the swap stage is consumed.
#[derive(Debug, Clone)]
pub struct ExchangeLedger {
    tallies: Arc<Mutex<Vec<PairTally>>>,
}

impl ExchangeLedger {
    /// Ledger for a ladder of `num_replicas`.
    pub fn new(num_replicas: usize) -> Self {
        Self {
            tallies: Arc::new(Mutex::new(vec![
                PairTally::default();
                num_replicas.saturating_sub(1)
            ])),
        }
    }

    /// Adds one outcome.
    pub fn record(&self, outcome: &SwapOutcome) {
        let mut tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tally) = tallies.get_mut(outcome.pair.0) {
            tally.attempts += 1;
            tally.weight_sum += outcome.weight;
            if outcome.accepted {
                tally.accepts += 1;
            }
        }
    }

    /// Statistics per pair, in ladder order.
    pub fn stats(&self) -> Vec<PairExchangeStats> {
        let tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        tallies
            .iter()
            .enumerate()
            .map(|(i, tally)| PairExchangeStats {
                pair: (i, i + 1),
                attempts: tally.attempts,
                accepts: tally.accepts,
                mean_weight: if tally.attempts == 0 {
                    0.0
                } else {
                    tally.weight_sum / tally.attempts as f64
                },
            })
            .collect()
    }
}

fn apply_swap(
    ctx: &StageContext,
    evaluator: &mut SwapEvaluator,
    ledger: &ExchangeLedger,
    ladder: &TemperatureLadder,
    replicas: &mut [ReplicaState],
    i: usize,
) {
    let outcome = evaluator.swap_pair(replicas, ladder, i);
    ctx.counters().increment(counters::SWAP_CALLS);
    if outcome.accepted {
        ctx.counters().increment(counters::SWAP_ACCEPTS);
    }
    ledger.record(&outcome);
    debug!(
        "round {} swap {:?}: weight {:.4} draw {:.4} accepted {}",
        ctx.round(),
        outcome.pair,
        outcome.weight,
        outcome.draw,
        outcome.accepted
    );
}

/// Evaluates `(0,1), (1,2), .., (N-2,N-1)` in order, once per invocation.
pub struct SweepDown {
    evaluator: SwapEvaluator,
    ladder: TemperatureLadder,
    ledger: ExchangeLedger,
}

impl SweepDown {
    /// Creates the stage.
    pub fn new(
        evaluator: SwapEvaluator,
        ladder: TemperatureLadder,
        ledger: ExchangeLedger,
    ) -> Self {
        Self {
            evaluator,
            ladder,
            ledger,
        }
    }
}

impl Stage for SweepDown {
    fn name(&self) -> &str {
        "swap-sweep-down"
    }

    fn run(
        &mut self,
        ctx: &StageContext,
        mut replicas: Vec<ReplicaState>,
    ) -> Result<Vec<ReplicaState>, RexError> {
        for i in 0..replicas.len().saturating_sub(1) {
            apply_swap(
                ctx,
                &mut self.evaluator,
                &self.ledger,
                &self.ladder,
                &mut replicas,
                i,
            );
        }
        Ok(replicas)
    }
}

/// Evaluates one uniformly chosen adjacent pair per invocation.
pub struct SwapRandomPair {
    evaluator: SwapEvaluator,
    ladder: TemperatureLadder,
    ledger: ExchangeLedger,
}

impl SwapRandomPair {
    /// Creates the stage.
    pub fn new(
        evaluator: SwapEvaluator,
        ladder: TemperatureLadder,
        ledger: ExchangeLedger,
    ) -> Self {
        Self {
            evaluator,
            ladder,
            ledger,
        }
    }
}

impl Stage for SwapRandomPair {
    fn name(&self) -> &str {
        "swap-random-pair"
    }

    fn run(
        &mut self,
        ctx: &StageContext,
        mut replicas: Vec<ReplicaState>,
    ) -> Result<Vec<ReplicaState>, RexError> {
        if replicas.len() < 2 {
            return Ok(replicas);
        }
        let i = self.evaluator.pick_pair(replicas.len());
        apply_swap(
            ctx,
            &mut self.evaluator,
            &self.ledger,
            &self.ladder,
            &mut replicas,
            i,
        );
        Ok(replicas)
    }
}

/// Swap phase of one round for `policy`.
pub fn swap_stage(
    policy: SwapPolicy,
    evaluator: SwapEvaluator,
    ladder: TemperatureLadder,
    ledger: ExchangeLedger,
) -> Box<dyn Stage> {
    match policy {
        SwapPolicy::DeterministicSweep => Box::new(SweepDown::new(evaluator, ladder, ledger)),
        SwapPolicy::RandomizedSinglePair { .. } => {
            let repetitions = policy.swaps_per_round(ladder.len());
            Box::new(Loop::repeat(
                SwapRandomPair::new(evaluator, ladder, ledger),
                repetitions,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_is_one_when_exponent_is_positive() {
        assert_eq!(acceptance_weight(0.1, -5.0, 1.0, -3.0), 1.0);
    }

    #[test]
    fn weight_is_exponential_when_exponent_is_negative() {
        let w = acceptance_weight(1.0, -5.0, 0.1, -3.0);
        assert!((w - (-1.8f64).exp()).abs() < 1e-15);
    }

    #[test]
    fn weight_survives_extreme_products() {
        let w = acceptance_weight(1e6, 1e6, 0.0, -1e6);
        assert_eq!(w, 1.0);
        let w = acceptance_weight(0.0, 1e6, 1e6, -1e6);
        assert!(w > 0.0 && w <= 1.0);
        let w = acceptance_weight(f64::INFINITY, 0.0, 1.0, 0.0);
        assert!(w > 0.0 && w <= 1.0 && !w.is_nan());
    }

    #[test]
    fn ledger_tracks_means() {
        let ledger = ExchangeLedger::new(3);
        for (weight, accepted) in [(1.0, true), (0.5, false)] {
            ledger.record(&SwapOutcome {
                pair: (1, 2),
                weight,
                draw: 0.7,
                accepted,
            });
        }
        let stats = ledger.stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].attempts, 0);
        assert_eq!(stats[1].attempts, 2);
        assert_eq!(stats[1].accepts, 1);
        assert!((stats[1].mean_weight - 0.75).abs() < 1e-12);
    }
}
