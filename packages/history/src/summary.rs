//! Read-only queries over a history: per-cell summaries and labels

use serde::Serialize;

use crate::errors::HistoryResult;
use crate::history::History;
use crate::node::{Identity, Name, NodeBody, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSummary {
    pub cell: Identity,
    pub latest: Name,
    pub versions: usize,
    /// Versions of the bound output, for code cells that have one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_versions: Option<usize>,
    pub staged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookSummary {
    pub notebook_versions: usize,
    pub runs: usize,
    pub cells: Vec<CellSummary>,
    pub deleted: Vec<CellSummary>,
}

impl History {
    pub fn cell_summary(&self, cell: Identity) -> HistoryResult<CellSummary> {
        let chain = self.store.chain(cell)?;
        let latest = self.store.latest(cell)?;
        let output_versions = match latest.code().and_then(|data| data.output) {
            Some(output) => Some(self.store.chain(output.identity)?.len()),
            None => None,
        };
        Ok(CellSummary {
            cell,
            latest: latest.name,
            versions: chain.len(),
            output_versions,
            staged: chain.is_staged(),
        })
    }

    pub fn summary(&self) -> HistoryResult<NotebookSummary> {
        let summarize = |cells: &[Identity]| -> HistoryResult<Vec<CellSummary>> {
            cells.iter().map(|cell| self.cell_summary(*cell)).collect()
        };
        Ok(NotebookSummary {
            notebook_versions: self.store.chain(self.notebook)?.len(),
            runs: self.runs.len(),
            cells: summarize(&self.cells)?,
            deleted: summarize(&self.deleted_cells)?,
        })
    }

    /// Short human-readable description of a node
    pub fn label(&self, name: &Name) -> HistoryResult<String> {
        let node = self.store.get(name)?;
        let id = name.identity.id;
        Ok(match (&node.body, name.kind()) {
            (NodeBody::Notebook { cells }, _) => format!("notebook ({} cells)", cells.len()),
            (NodeBody::Code(_), NodeKind::CodeCell) => format!("cell {id}"),
            (NodeBody::Code(data), _) => match &data.literal {
                Some(literal) => format!("{} `{literal}`", data.node_type),
                None => format!("{} {id}", data.node_type),
            },
            (NodeBody::Markdown { .. }, _) => format!("markdown {id}"),
            (NodeBody::Output { .. }, _) => format!("output {id}"),
        })
    }
}
