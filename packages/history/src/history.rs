//! # History
//!
//! The per-notebook history: node store, the ordered cell list, the run log
//! and the staging bookkeeping. Editing, committing and persistence live in
//! their own modules as further `impl History` blocks.

use std::collections::HashMap;

use nbhist_parser::ParseTree;

use crate::commit::OutputRecord;
use crate::errors::{HistoryError, HistoryResult};
use crate::node::{Identity, Name, Node, NodeBody, NodeKind, RunId};
use crate::repair::RepairToken;
use crate::runs::{RunKind, RunLog};
use crate::stage::StagingArea;
use crate::store::NodeStore;

#[derive(Debug, Clone)]
pub struct History {
    pub(crate) store: NodeStore,
    pub(crate) notebook: Identity,
    pub(crate) cells: Vec<Identity>,
    pub(crate) deleted_cells: Vec<Identity>,
    pub(crate) runs: RunLog,
    pub(crate) staging: StagingArea,
    /// Latest outstanding repair per cell
    pub(crate) repairs: HashMap<Identity, RepairToken>,
    pub(crate) next_token: RepairToken,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

/// Committed state only; staging and pending repairs are session-local.
impl PartialEq for History {
    fn eq(&self, other: &Self) -> bool {
        self.store == other.store
            && self.notebook == other.notebook
            && self.cells == other.cells
            && self.deleted_cells == other.deleted_cells
            && self.runs == other.runs
    }
}

impl History {
    /// Empty history. The notebook root gets its first version on the
    /// first [`History::snapshot_notebook`].
    pub fn new() -> Self {
        let mut store = NodeStore::new();
        let notebook = store.allocate(NodeKind::Notebook);
        Self::from_parts(store, notebook, Vec::new(), Vec::new(), RunLog::new())
    }

    pub(crate) fn from_parts(
        store: NodeStore,
        notebook: Identity,
        cells: Vec<Identity>,
        deleted_cells: Vec<Identity>,
        runs: RunLog,
    ) -> Self {
        Self {
            store,
            notebook,
            cells,
            deleted_cells,
            runs,
            staging: StagingArea::default(),
            repairs: HashMap::new(),
            next_token: 0,
        }
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn notebook(&self) -> Identity {
        self.notebook
    }

    /// Live cells in notebook order
    pub fn cells(&self) -> &[Identity] {
        &self.cells
    }

    pub fn deleted_cells(&self) -> &[Identity] {
        &self.deleted_cells
    }

    pub fn runs(&self) -> &RunLog {
        &self.runs
    }

    pub fn get(&self, name: &Name) -> HistoryResult<&Node> {
        self.store.get(name)
    }

    pub fn get_str(&self, name: &str) -> HistoryResult<&Node> {
        self.store.get_str(name)
    }

    /// Latest snapshot, staged if one exists
    pub fn latest(&self, identity: Identity) -> HistoryResult<&Node> {
        self.store.latest(identity)
    }

    pub fn versions_of(&self, identity: Identity) -> HistoryResult<&[Node]> {
        self.store.versions_of(identity)
    }

    /// Identities holding a staged snapshot on behalf of `cell`
    pub fn staged_in(&self, cell: Identity) -> &[Identity] {
        self.staging.staged_in(cell)
    }

    pub fn has_staged(&self) -> bool {
        !self.staging.is_empty()
    }

    pub fn begin_run(&mut self, kind: RunKind) -> RunId {
        let run = self.runs.begin(kind);
        tracing::debug!("run {} started ({:?})", run, kind);
        run
    }

    /// Drop a run that failed before committing anything. Returns whether
    /// it was removed.
    pub fn abandon_run(&mut self, run: RunId) -> bool {
        let removed = self.runs.abandon(run);
        if removed {
            tracing::debug!("run {} abandoned", run);
        }
        removed
    }

    /// Cell position in the live list
    pub fn index_of(&self, cell: Identity) -> Option<usize> {
        self.cells.iter().position(|c| *c == cell)
    }

    fn check_insert_index(&self, index: usize) -> HistoryResult<()> {
        if index > self.cells.len() {
            return Err(HistoryError::InvalidIndex {
                index,
                len: self.cells.len(),
            });
        }
        Ok(())
    }

    /// Ingest a parsed code cell as version 0 and place it at `index`
    pub fn insert_code_cell(
        &mut self,
        index: usize,
        tree: &ParseTree,
        output: Option<&OutputRecord>,
    ) -> HistoryResult<Identity> {
        self.check_insert_index(index)?;
        let cell = self.build_code_cell(tree, output)?;
        self.cells.insert(index, cell);
        tracing::debug!("inserted code cell {} at {}", cell, index);
        Ok(cell)
    }

    pub fn insert_markdown_cell(&mut self, index: usize, text: &str) -> HistoryResult<Identity> {
        self.check_insert_index(index)?;
        let cell = self.build_markdown_cell(text)?;
        self.cells.insert(index, cell);
        tracing::debug!("inserted markdown cell {} at {}", cell, index);
        Ok(cell)
    }

    /// Move a cell to the deleted list. Its staged state and any pending
    /// repair are dropped; committed versions stay queryable.
    pub fn delete_cell(&mut self, cell: Identity) -> HistoryResult<()> {
        let index = self
            .index_of(cell)
            .ok_or_else(|| HistoryError::not_found(cell))?;
        self.cells.remove(index);
        self.deleted_cells.push(cell);
        self.discard_staged(cell)?;
        self.repairs.remove(&cell);
        tracing::debug!("deleted cell {}", cell);
        Ok(())
    }

    pub fn move_cell(&mut self, from: usize, to: usize) -> HistoryResult<()> {
        let len = self.cells.len();
        for index in [from, to] {
            if index >= len {
                return Err(HistoryError::InvalidIndex { index, len });
            }
        }
        let cell = self.cells.remove(from);
        self.cells.insert(to, cell);
        Ok(())
    }

    /// Latest committed name of every live cell
    pub fn committed_cell_names(&self) -> HistoryResult<Vec<Name>> {
        self.cells
            .iter()
            .map(|cell| self.store.latest_committed(*cell).map(|node| node.name))
            .collect()
    }

    /// Commit every cell that holds staged snapshots under `run`
    pub fn commit_all(&mut self, run: RunId) -> HistoryResult<Vec<Name>> {
        let staged: Vec<Identity> = self
            .staging
            .cells()
            .filter(|cell| self.cells.contains(cell))
            .collect();
        staged
            .into_iter()
            .map(|cell| self.commit(cell, run, None))
            .collect()
    }

    /// Record the current cell list as a notebook version.
    ///
    /// A new version is created only when the committed cell names differ
    /// from the latest notebook version; otherwise `run` is added to it.
    pub fn snapshot_notebook(&mut self, run: Option<RunId>) -> HistoryResult<Name> {
        let cells = self.committed_cell_names()?;
        let notebook = self.notebook;
        let chain = self.store.chain(notebook)?;

        let Some(latest) = chain.latest_committed() else {
            let mut node = Node::new(notebook.at(0), NodeBody::Notebook { cells });
            node.run.extend(run);
            node.created = Some(chrono::Utc::now());
            return self.store.register_version(node);
        };

        let latest_name = latest.name;
        if matches!(&latest.body, NodeBody::Notebook { cells: current } if *current == cells) {
            if let Some(run) = run {
                self.store.record_run(&latest_name, run)?;
            }
            return Ok(latest_name);
        }

        let staged = self.mark_edited(&latest_name)?;
        match &mut self.store.staged_mut(notebook)?.body {
            NodeBody::Notebook { cells: current } => *current = cells,
            _ => {
                return Err(HistoryError::Inconsistent(format!(
                    "{staged} does not hold a cell list"
                )))
            }
        }
        let staged_node = self
            .store
            .take_staged(notebook)?
            .ok_or_else(|| HistoryError::not_found(staged))?;
        self.staging.take_cell(notebook);

        let version = self.store.chain(notebook)?.next_version();
        let mut node = staged_node.destaged(version, 0);
        node.run = run.into_iter().collect();
        let name = self.store.register_version(node)?;
        tracing::debug!("notebook snapshot {}", name);
        Ok(name)
    }

    /// The snapshot immediately before `name` in its chain; for a staged
    /// name, the latest committed snapshot
    pub fn prior_version(&self, name: &Name) -> HistoryResult<Option<&Node>> {
        let chain = self.store.chain(name.identity)?;
        match name.committed_version() {
            Some(0) => Ok(None),
            Some(version) => {
                self.store.get(name)?;
                Ok(chain.versions().get(version as usize - 1))
            }
            None => {
                if !chain.is_staged() {
                    return Err(HistoryError::not_found(name));
                }
                Ok(chain.latest_committed())
            }
        }
    }
}
