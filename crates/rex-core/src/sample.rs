//! Samples and sample collections produced by propagation calls.

use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, RexError};
use crate::problem::BinaryQuadraticModel;
use crate::rng::RngHandle;

/// One candidate assignment together with its energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Value of every variable, indexed by variable.
    pub assignment: Vec<i8>,
    /// Energy of the assignment under the problem it was drawn for.
    pub energy: f64,
    /// How many times this assignment was observed.
    pub num_occurrences: usize,
}

impl Sample {
    /// Creates a sample observed once.
    pub fn new(assignment: Vec<i8>, energy: f64) -> Self {
        Self {
            assignment,
            energy,
            num_occurrences: 1,
        }
    }

    /// Evaluates `assignment` against `problem`.
    pub fn evaluate(problem: &BinaryQuadraticModel, assignment: Vec<i8>) -> Result<Self, RexError> {
        let energy = problem.energy(&assignment)?;
        Ok(Self::new(assignment, energy))
    }
}

/// Non-empty collection of samples.
///
/// The "best" member is the minimum-energy entry; ties go to the entry that
/// appears first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Sample>", into = "Vec<Sample>")]
pub struct SampleSet {
    samples: Vec<Sample>,
}

impl SampleSet {
    /// Wraps `samples`, rejecting an empty collection.
    pub fn new(samples: Vec<Sample>) -> Result<Self, RexError> {
        if samples.is_empty() {
            return Err(RexError::EmptyInput(ErrorInfo::new(
                "empty-sample-set",
                "a sample set needs at least one sample",
            )));
        }
        Ok(Self { samples })
    }

    /// A set holding exactly one sample.
    pub fn single(sample: Sample) -> Self {
        Self {
            samples: vec![sample],
        }
    }

    /// Initial set with one uniformly random assignment.
    pub fn random(problem: &BinaryQuadraticModel, rng: &mut RngHandle) -> Self {
        let vartype = problem.vartype();
        let assignment: Vec<i8> = (0..problem.num_variables())
            .map(|_| {
                if rng.index(2) == 0 {
                    vartype.lowest()
                } else {
                    vartype.highest()
                }
            })
            .collect();
        let energy = problem.energy_unchecked(&assignment);
        Self::single(Sample::new(assignment, energy))
    }

    /// Initial set with every variable at the lowest domain value.
    pub fn lowest(problem: &BinaryQuadraticModel) -> Self {
        let assignment = vec![problem.vartype().lowest(); problem.num_variables()];
        let energy = problem.energy_unchecked(&assignment);
        Self::single(Sample::new(assignment, energy))
    }

    /// Best (minimum-energy) sample, first-seen on ties.
    pub fn first(&self) -> &Sample {
        let mut best = &self.samples[0];
        for sample in &self.samples[1..] {
            if sample.energy < best.energy {
                best = sample;
            }
        }
        best
    }

    /// Energy of [`SampleSet::first`].
    pub fn best_energy(&self) -> f64 {
        self.first().energy
    }

    /// Number of distinct entries.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false for a constructed set.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterates the samples in stored order.
    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Merges identical assignments, summing occurrences. First-seen order.
    pub fn aggregate(self) -> Self {
        let mut merged = IndexMap::<Vec<i8>, Sample>::new();
        for sample in self.samples {
            match merged.entry(sample.assignment.clone()) {
                Entry::Occupied(mut entry) => {
                    let existing = entry.get_mut();
                    existing.num_occurrences += sample.num_occurrences;
                    if sample.energy < existing.energy {
                        existing.energy = sample.energy;
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(sample);
                }
            }
        }
        Self {
            samples: merged.into_values().collect(),
        }
    }

    /// Samples sorted by ascending energy; equal energies keep stored order.
    pub fn ranked(mut self) -> Self {
        self.samples.sort_by(|a, b| a.energy.total_cmp(&b.energy));
        self
    }

    /// Consumes the set, returning the samples.
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    /// Domain check for every assignment against `vartype` and `num_variables`.
    pub fn check_against(&self, problem: &BinaryQuadraticModel) -> Result<(), RexError> {
        for sample in &self.samples {
            problem.check_assignment(&sample.assignment)?;
        }
        Ok(())
    }
}

impl TryFrom<Vec<Sample>> for SampleSet {
    type Error = RexError;

    fn try_from(samples: Vec<Sample>) -> Result<Self, Self::Error> {
        SampleSet::new(samples)
    }
}

impl From<SampleSet> for Vec<Sample> {
    fn from(set: SampleSet) -> Self {
        set.samples
    }
}

impl<'a> IntoIterator for &'a SampleSet {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// Formats an assignment compactly, e.g. `{0: 1, 1: 0}`.
pub fn format_assignment(assignment: &[i8]) -> String {
    let body = assignment
        .iter()
        .enumerate()
        .map(|(var, value)| format!("{var}: {value}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{body}}}")
}
