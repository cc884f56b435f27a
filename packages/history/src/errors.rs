//! Error types for the history engine

use crate::node::{Identity, Name};
use nbhist_parser::ParseError;
use thiserror::Error;

pub type HistoryResult<T> = Result<T, HistoryError>;

#[derive(Error, Debug)]
pub enum HistoryError {
    /// A name that is malformed or resolves to no stored node
    #[error("Node not found: {0}")]
    NotFound(String),

    /// A parent walk reached a name with no stored node
    #[error("Orphaned node {node}: parent {parent} does not exist")]
    Orphaned { node: Name, parent: Name },

    #[error("Could not update: {0}")]
    Parse(#[from] ParseError),

    /// Staging or linking invariants do not hold
    #[error("Inconsistent history: {0}")]
    Inconsistent(String),

    #[error("Node {0} cannot be edited")]
    NotEditable(Name),

    #[error("{0} is not a cell")]
    NotACell(Identity),

    #[error("Notebook-level repair is not supported")]
    RootRepairUnsupported,

    #[error("Cell index {index} out of range for {len} cells")]
    InvalidIndex { index: usize, len: usize },

    #[error("Corrupt history data: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HistoryError {
    pub(crate) fn not_found(name: impl ToString) -> Self {
        Self::NotFound(name.to_string())
    }
}
