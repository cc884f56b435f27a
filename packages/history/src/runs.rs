//! Run log: one entry per execute or save event

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{HistoryError, HistoryResult};
use crate::node::{Name, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunKind {
    Execute,
    Save,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub kind: RunKind,
    pub timestamp: DateTime<Utc>,
    /// Cell versions committed (or observed unchanged) by this run
    #[serde(default)]
    pub cells: Vec<Name>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunLog {
    runs: Vec<Run>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted runs; ids must match positions
    pub fn from_runs(runs: Vec<Run>) -> HistoryResult<Self> {
        if let Some((index, run)) = runs
            .iter()
            .enumerate()
            .find(|(index, run)| run.id as usize != *index)
        {
            return Err(HistoryError::Corrupt(format!(
                "run {} stored at position {index}",
                run.id
            )));
        }
        Ok(Self { runs })
    }

    pub fn begin(&mut self, kind: RunKind) -> RunId {
        let id = self.runs.len() as RunId;
        self.runs.push(Run {
            id,
            kind,
            timestamp: Utc::now(),
            cells: Vec::new(),
        });
        id
    }

    /// Remove `run` if it is the newest run and committed nothing
    pub(crate) fn abandon(&mut self, run: RunId) -> bool {
        let removable = self
            .runs
            .last()
            .is_some_and(|last| last.id == run && last.cells.is_empty());
        if removable {
            self.runs.pop();
        }
        removable
    }

    pub(crate) fn record_cell(&mut self, run: RunId, cell: Name) {
        match self.runs.get_mut(run as usize) {
            Some(entry) => {
                if !entry.cells.contains(&cell) {
                    entry.cells.push(cell);
                }
            }
            None => tracing::warn!("commit under unknown run {}", run),
        }
    }

    pub fn get(&self, run: RunId) -> Option<&Run> {
        self.runs.get(run as usize)
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Identity, NodeKind};

    #[test]
    fn test_run_ids_are_dense() {
        let mut log = RunLog::new();
        assert_eq!(log.begin(RunKind::Execute), 0);
        assert_eq!(log.begin(RunKind::Save), 1);
        assert_eq!(log.get(1).unwrap().kind, RunKind::Save);
    }

    #[test]
    fn test_record_cell_once() {
        let mut log = RunLog::new();
        let run = log.begin(RunKind::Execute);
        let cell = Identity::new(NodeKind::CodeCell, 0).at(1);
        log.record_cell(run, cell);
        log.record_cell(run, cell);
        assert_eq!(log.get(run).unwrap().cells, vec![cell]);
    }

    #[test]
    fn test_from_runs_rejects_gaps() {
        let mut log = RunLog::new();
        log.begin(RunKind::Execute);
        let mut runs = log.runs().to_vec();
        runs[0].id = 3;
        assert!(matches!(
            RunLog::from_runs(runs),
            Err(HistoryError::Corrupt(_))
        ));
    }

    #[test]
    fn test_abandon_only_empty_newest_run() {
        let mut log = RunLog::new();
        let first = log.begin(RunKind::Execute);
        let second = log.begin(RunKind::Execute);
        assert!(!log.abandon(first));

        log.record_cell(second, Identity::new(NodeKind::CodeCell, 0).at(0));
        assert!(!log.abandon(second));

        let third = log.begin(RunKind::Save);
        assert!(log.abandon(third));
        assert_eq!(log.len(), 2);
        assert_eq!(log.begin(RunKind::Save), third);
    }
}
