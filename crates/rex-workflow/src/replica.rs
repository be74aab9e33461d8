use std::sync::Arc;

use rex_core::{BinaryQuadraticModel, RngHandle, SampleSet};
use serde::{Deserialize, Serialize};

use crate::config::InitialState;
use crate::determinism;
use crate::ladder::TemperatureLadder;

/// Where the inverse temperature of a replica lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemperatureBinding {
    /// Beta belongs to the position in the replica sequence; slot `k`
    /// always samples `ladder[k]`.
    Slot,
    /// Beta is a field of the replica state and stays with it while
    /// samples migrate between replicas.
    Replica,
}

/// Per-replica data carried through the workflow.
#[derive(Debug, Clone)]
pub struct ReplicaState {
    problem: Arc<BinaryQuadraticModel>,
    samples: SampleSet,
    beta: Option<f64>,
}

impl ReplicaState {
    /// Creates a state without a carried beta (slot-bound).
    pub fn new(problem: Arc<BinaryQuadraticModel>, samples: SampleSet) -> Self {
        Self {
            problem,
            samples,
            beta: None,
        }
    }

    /// Attaches a carried beta (replica-bound).
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = Some(beta);
        self
    }

    /// Shared read-only problem.
    pub fn problem(&self) -> &BinaryQuadraticModel {
        &self.problem
    }

    /// Current sample collection.
    pub fn samples(&self) -> &SampleSet {
        &self.samples
    }

    /// Carried beta, `None` for slot-bound states.
    pub fn carried_beta(&self) -> Option<f64> {
        self.beta
    }

    /// Beta this state is sampled at when it occupies `slot`.
    pub fn beta_at(&self, ladder: &TemperatureLadder, slot: usize) -> f64 {
        self.beta.unwrap_or_else(|| ladder.beta(slot))
    }

    /// Energy of the best sample.
    pub fn best_energy(&self) -> f64 {
        self.samples.best_energy()
    }

    /// Replaces the sample collection, keeping problem and beta.
    pub fn updated(self, samples: SampleSet) -> Self {
        Self { samples, ..self }
    }

    /// Exchanges the sample collections of two states. Betas never move.
    pub fn exchange_samples(a: &mut ReplicaState, b: &mut ReplicaState) {
        std::mem::swap(&mut a.samples, &mut b.samples);
    }
}

/// Seeds one state per ladder rung, in ladder order.
pub fn seed_replicas(
    problem: &Arc<BinaryQuadraticModel>,
    ladder: &TemperatureLadder,
    binding: TemperatureBinding,
    initial: InitialState,
    master_seed: u64,
) -> Vec<ReplicaState> {
    ladder
        .betas()
        .iter()
        .enumerate()
        .map(|(slot, &beta)| {
            let samples = match initial {
                InitialState::Random => {
                    let mut rng = RngHandle::from_seed(determinism::init_seed(master_seed, slot));
                    SampleSet::random(problem, &mut rng)
                }
                InitialState::Lowest => SampleSet::lowest(problem),
            };
            let state = ReplicaState::new(Arc::clone(problem), samples);
            match binding {
                TemperatureBinding::Slot => state,
                TemperatureBinding::Replica => state.with_beta(beta),
            }
        })
        .collect()
}
