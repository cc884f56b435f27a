//! # Notebook Session
//!
//! Async front end over a [`History`]. Editor events (edits, runs, saves,
//! structural cell changes) arrive here; the history lock is never held
//! while a parse is in flight, so a slow parse cannot block other cells.

use std::future::Future;

use nbhist_parser::{ParseError, ParseTree};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::commit::OutputRecord;
use crate::errors::{HistoryError, HistoryResult};
use crate::history::History;
use crate::node::{Identity, Name, NodeKind, RunId};
use crate::repair::RepairOutcome;
use crate::runs::RunKind;

/// Produces parse trees for cell source
pub trait ParseService: Send + Sync {
    fn parse(&self, source: String)
        -> impl Future<Output = Result<ParseTree, ParseError>> + Send;
}

/// Parses in-process with `nbhist_parser`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalParser;

impl ParseService for LocalParser {
    fn parse(&self, source: String) -> impl Future<Output = Result<ParseTree, ParseError>> + Send {
        async move { nbhist_parser::parse(&source) }
    }
}

/// Initial contents of a cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CellSource {
    Code {
        source: String,
        #[serde(default)]
        output: Option<OutputRecord>,
    },
    Markdown {
        source: String,
    },
}

impl CellSource {
    pub fn code(source: impl Into<String>) -> Self {
        CellSource::Code {
            source: source.into(),
            output: None,
        }
    }

    pub fn markdown(source: impl Into<String>) -> Self {
        CellSource::Markdown {
            source: source.into(),
        }
    }
}

enum ParsedCell {
    Code(ParseTree, Option<OutputRecord>),
    Markdown(String),
}

pub struct NotebookSession<P> {
    history: Mutex<History>,
    parser: P,
}

impl<P: ParseService> NotebookSession<P> {
    /// Ingest `cells` as version 0 of each cell and record the first
    /// notebook version
    pub async fn open(parser: P, cells: Vec<CellSource>) -> HistoryResult<Self> {
        let mut history = History::new();
        for (index, cell) in cells.into_iter().enumerate() {
            match Self::prepare(&parser, cell).await? {
                ParsedCell::Code(tree, output) => {
                    history.insert_code_cell(index, &tree, output.as_ref())?;
                }
                ParsedCell::Markdown(text) => {
                    history.insert_markdown_cell(index, &text)?;
                }
            }
        }
        history.snapshot_notebook(None)?;
        tracing::info!("opened notebook with {} cells", history.cells().len());
        Ok(Self::from_history(parser, history))
    }

    pub fn from_history(parser: P, history: History) -> Self {
        Self {
            history: Mutex::new(history),
            parser,
        }
    }

    async fn prepare(parser: &P, cell: CellSource) -> HistoryResult<ParsedCell> {
        Ok(match cell {
            CellSource::Code { source, output } => {
                ParsedCell::Code(parser.parse(source).await?, output)
            }
            CellSource::Markdown { source } => ParsedCell::Markdown(source),
        })
    }

    /// The cell's text changed in the editor
    pub async fn on_cell_edited(&self, cell: Identity, text: String) -> HistoryResult<RepairOutcome> {
        match cell.kind {
            NodeKind::Markdown => self.history.lock().await.repair_markdown(cell, &text),
            NodeKind::CodeCell => {
                let pending = self.history.lock().await.begin_code_repair(cell, &text)?;
                let Some(pending) = pending else {
                    return Ok(RepairOutcome::Unchanged);
                };
                let result = self.parser.parse(pending.text.clone()).await;
                self.history
                    .lock()
                    .await
                    .complete_code_repair(&pending, result)
            }
            NodeKind::Notebook => Err(HistoryError::RootRepairUnsupported),
            _ => Err(HistoryError::NotACell(cell)),
        }
    }

    /// The cell was executed, optionally producing output
    pub async fn on_cell_run(
        &self,
        cell: Identity,
        output: Option<OutputRecord>,
    ) -> HistoryResult<(RunId, Name)> {
        let mut history = self.history.lock().await;
        let run = history.begin_run(RunKind::Execute);
        match history.commit(cell, run, output.as_ref()) {
            Ok(name) => Ok((run, name)),
            Err(err) => {
                history.abandon_run(run);
                Err(err)
            }
        }
    }

    /// Commit every edited cell and record the notebook's cell list
    pub async fn on_document_save(&self) -> HistoryResult<RunId> {
        let mut history = self.history.lock().await;
        let run = history.begin_run(RunKind::Save);
        if let Err(err) = history.commit_all(run) {
            history.abandon_run(run);
            return Err(err);
        }
        let notebook = history.snapshot_notebook(Some(run))?;
        tracing::info!("saved notebook as {} (run {})", notebook, run);
        Ok(run)
    }

    pub async fn insert_cell(&self, index: usize, cell: CellSource) -> HistoryResult<Identity> {
        let parsed = Self::prepare(&self.parser, cell).await?;
        let mut history = self.history.lock().await;
        match parsed {
            ParsedCell::Code(tree, output) => history.insert_code_cell(index, &tree, output.as_ref()),
            ParsedCell::Markdown(text) => history.insert_markdown_cell(index, &text),
        }
    }

    pub async fn delete_cell(&self, cell: Identity) -> HistoryResult<()> {
        self.history.lock().await.delete_cell(cell)
    }

    pub async fn move_cell(&self, from: usize, to: usize) -> HistoryResult<()> {
        self.history.lock().await.move_cell(from, to)
    }

    /// Replace the cell at `index` with a new cell of another type. The old
    /// cell moves to the deleted list.
    pub async fn switch_cell_type(&self, index: usize, cell: CellSource) -> HistoryResult<Identity> {
        let parsed = Self::prepare(&self.parser, cell).await?;
        let mut history = self.history.lock().await;
        let len = history.cells().len();
        let old = *history
            .cells()
            .get(index)
            .ok_or(HistoryError::InvalidIndex { index, len })?;
        history.delete_cell(old)?;
        match parsed {
            ParsedCell::Code(tree, output) => history.insert_code_cell(index, &tree, output.as_ref()),
            ParsedCell::Markdown(text) => history.insert_markdown_cell(index, &text),
        }
    }

    /// Exclusive access to the history
    pub async fn history(&self) -> MutexGuard<'_, History> {
        self.history.lock().await
    }

    pub fn into_history(self) -> History {
        self.history.into_inner()
    }
}
