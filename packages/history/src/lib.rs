//! # nbhist History
//!
//! Versioned node history for notebooks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ parser: cell source → ParseTree             │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ history: identities + version chains        │
//! │  - Repair: merge re-parses into staging     │
//! │  - Staging: copy-on-write uncommitted view  │
//! │  - Commit: staged snapshots → versions      │
//! │  - Persist: committed history as JSON       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ session: async editor events                │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Committed payloads are immutable**: edits go through a staged copy
//! 2. **Identity survives edits**: re-parses are merged, not rebuilt
//! 3. **Staging is upward-closed**: a staged node's ancestors are staged
//! 4. **Children commit first**: committed parents never see staged names
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nbhist_history::{CellSource, LocalParser, NotebookSession};
//!
//! let session = NotebookSession::open(LocalParser, vec![CellSource::code("x = 1")]).await?;
//! let cell = session.history().await.cells()[0];
//!
//! session.on_cell_edited(cell, "x = 2".into()).await?;
//! let (run, name) = session.on_cell_run(cell, None).await?;
//!
//! session.history().await.save("notebook.history.json", true)?;
//! ```

mod builder;
pub mod chain;
pub mod commit;
pub mod errors;
pub mod history;
pub mod node;
pub mod persist;
mod render;
pub mod repair;
pub mod runs;
pub mod session;
pub mod stage;
pub mod store;
pub mod summary;

pub use chain::VersionChain;
pub use commit::OutputRecord;
pub use errors::{HistoryError, HistoryResult};
pub use history::History;
pub use node::{
    CodeData, Content, Identity, Name, Node, NodeBody, NodeKind, RunId, SyntaxToken, Version,
};
pub use persist::{SavedChain, SavedHistory, SavedNode};
pub use render::render;
pub use repair::{text_distance, PendingRepair, RepairOutcome, RepairToken};
pub use runs::{Run, RunKind, RunLog};
pub use session::{CellSource, LocalParser, NotebookSession, ParseService};
pub use stage::StagingArea;
pub use store::NodeStore;
pub use summary::{CellSummary, NotebookSummary};
