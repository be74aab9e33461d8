use rex_core::{ErrorInfo, RexError, Sample, SampleSet};
use serde::{Deserialize, Serialize};

use crate::counters;
use crate::replica::ReplicaState;
use crate::stage::{Stage, StageContext};

/// Union of every replica's samples, deduplicated and ranked by energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedSamples {
    /// Distinct assignments, lowest energy first.
    pub samples: SampleSet,
    /// Lowest-energy entry.
    pub best: Sample,
}

/// Merges the sample sets of `replicas`.
///
/// Identical assignments collapse into one entry that keeps the lower energy
/// and the summed occurrence count. Fails only on an empty replica slice.
pub fn merge_samples(replicas: &[ReplicaState]) -> Result<MergedSamples, RexError> {
    if replicas.is_empty() {
        return Err(RexError::EmptyInput(ErrorInfo::new(
            "merge-empty",
            "cannot merge zero replicas",
        )));
    }
    let union: Vec<Sample> = replicas
        .iter()
        .flat_map(|replica| replica.samples().iter().cloned())
        .collect();
    let samples = SampleSet::new(union)?.aggregate().ranked();
    let best = samples.first().clone();
    Ok(MergedSamples { samples, best })
}

/// Terminal stage of a workflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct Merge;

impl Merge {
    /// Merges `replicas`, counting the invocation.
    pub fn run(
        &self,
        ctx: &StageContext,
        replicas: &[ReplicaState],
    ) -> Result<MergedSamples, RexError> {
        ctx.counters().increment(counters::MERGE_CALLS);
        merge_samples(replicas)
    }
}

/// Final replicas plus their merged samples.
#[derive(Debug, Clone)]
pub struct WorkflowOutput {
    /// Replica sequence after the last completed round.
    pub replicas: Vec<ReplicaState>,
    /// Merge of `replicas`.
    pub merged: MergedSamples,
}

/// A stage pipeline followed by a terminal [`Merge`].
pub struct Workflow {
    body: Box<dyn Stage>,
    merge: Merge,
}

impl Workflow {
    /// Wraps `body`.
    pub fn new(body: Box<dyn Stage>) -> Self {
        Self { body, merge: Merge }
    }

    /// Runs the body then merges. A body failure aborts before merging.
    pub fn run(
        &mut self,
        ctx: &StageContext,
        replicas: Vec<ReplicaState>,
    ) -> Result<WorkflowOutput, RexError> {
        let replicas = self.body.run(ctx, replicas)?;
        let merged = self.merge.run(ctx, &replicas)?;
        Ok(WorkflowOutput { replicas, merged })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rex_core::BinaryQuadraticModel;

    use super::*;

    fn state(samples: Vec<Sample>) -> ReplicaState {
        let problem = Arc::new(BinaryQuadraticModel::from_coo_str("0 1 1\n").unwrap());
        ReplicaState::new(problem, SampleSet::new(samples).unwrap())
    }

    #[test]
    fn zero_replicas_is_an_empty_input_error() {
        let err = merge_samples(&[]).unwrap_err();
        assert!(matches!(err, RexError::EmptyInput(_)));
    }

    #[test]
    fn duplicates_across_replicas_collapse() {
        let a = state(vec![Sample::new(vec![1, 1], 1.0), Sample::new(vec![0, 0], 0.0)]);
        let b = state(vec![Sample::new(vec![1, 1], 1.0)]);
        let merged = merge_samples(&[a, b]).unwrap();
        assert_eq!(merged.samples.len(), 2);
        assert_eq!(merged.best.assignment, vec![0, 0]);
        let ones = merged.samples.iter().find(|s| s.assignment == vec![1, 1]).unwrap();
        assert_eq!(ones.num_occurrences, 2);
    }
}
