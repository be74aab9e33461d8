use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use rex_core::{ErrorInfo, RexError};
use serde::{Deserialize, Serialize};

use crate::ladder::TemperatureLadder;
use crate::replica::ReplicaState;
use crate::stage::{Stage, StageContext};

/// Snapshot of one slot at the end of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRow {
    /// Round index.
    pub round: usize,
    /// Slot within the ladder.
    pub slot: usize,
    /// Beta the slot's replica is sampled at.
    pub beta: f64,
    /// Best energy held by the slot.
    pub best_energy: f64,
    /// Distinct samples held by the slot.
    pub num_samples: usize,
}

/// Collects per-round trace rows for CSV export.
#[derive(Debug, Clone, Default)]
pub struct TraceRecorder {
    rows: Arc<Mutex<Vec<TraceRow>>>,
}

impl TraceRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row.
    pub fn push(&self, row: TraceRow) {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(row);
    }

    /// Copy of the recorded rows.
    pub fn rows(&self) -> Vec<TraceRow> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Writes `round,slot,beta,best_energy,num_samples` rows to `path`.
    pub fn write_csv(&self, path: &Path) -> Result<(), RexError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| trace_error("trace-mkdir", path, err))?;
        }
        let mut writer =
            csv::Writer::from_path(path).map_err(|err| trace_error("trace-open", path, err))?;
        for row in self.rows() {
            writer
                .serialize(&row)
                .map_err(|err| trace_error("trace-write", path, err))?;
        }
        writer
            .flush()
            .map_err(|err| trace_error("trace-flush", path, err))
    }
}

fn trace_error(code: &str, path: &Path, err: impl ToString) -> RexError {
    RexError::Serde(ErrorInfo::new(code, err.to_string()).with_context("path", path.display()))
}

/// Appends one row per slot to a [`TraceRecorder`]; passes replicas through.
pub struct Record {
    recorder: TraceRecorder,
    ladder: TemperatureLadder,
}

impl Record {
    /// Creates the stage.
    pub fn new(recorder: TraceRecorder, ladder: TemperatureLadder) -> Self {
        Self { recorder, ladder }
    }
}

impl Stage for Record {
    fn name(&self) -> &str {
        "record"
    }

    fn run(
        &mut self,
        ctx: &StageContext,
        replicas: Vec<ReplicaState>,
    ) -> Result<Vec<ReplicaState>, RexError> {
        for (slot, replica) in replicas.iter().enumerate() {
            self.recorder.push(TraceRow {
                round: ctx.round(),
                slot,
                beta: replica.beta_at(&self.ladder, slot),
                best_energy: replica.best_energy(),
                num_samples: replica.samples().len(),
            });
        }
        Ok(replicas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rex_core::{BinaryQuadraticModel, SampleSet};
    use tempfile::tempdir;

    use crate::stage::CancelToken;

    #[test]
    fn record_stage_writes_one_row_per_slot() {
        let problem = Arc::new(BinaryQuadraticModel::from_coo_str("0 0 1\n").unwrap());
        let ladder = TemperatureLadder::geometric(0.5, 2.0, 3).unwrap();
        let replicas: Vec<_> = (0..3)
            .map(|_| ReplicaState::new(Arc::clone(&problem), SampleSet::lowest(&problem)))
            .collect();
        let recorder = TraceRecorder::new();
        let mut stage = Record::new(recorder.clone(), ladder.clone());
        let ctx = StageContext::new(CancelToken::new()).at_round(4);
        stage.run(&ctx, replicas).unwrap();

        let rows = recorder.rows();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.round == 4));
        assert_eq!(rows[2].beta, 2.0);

        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("trace.csv");
        recorder.write_csv(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("round,slot,beta,best_energy,num_samples"));
        assert_eq!(lines.count(), 3);
    }
}
