//! JSON persistence of committed history.
//!
//! Only committed versions are written. Version indices are implied by array
//! position and identities must be dense per kind, so loading rebuilds the
//! store exactly. Staging and pending repairs start empty after a load.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::VersionChain;
use crate::errors::{HistoryError, HistoryResult};
use crate::history::History;
use crate::node::{Content, Identity, Name, Node, NodeBody, NodeKind, RunId};
use crate::runs::{Run, RunLog};
use crate::store::NodeStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedHistory {
    pub cells: Vec<Identity>,
    #[serde(default)]
    pub deleted_cells: Vec<Identity>,
    /// Notebook, cell and code chains
    pub nodey: Vec<SavedChain>,
    #[serde(default)]
    pub output: Vec<SavedChain>,
    #[serde(default)]
    pub runs: Vec<Run>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedChain {
    pub identity: Identity,
    pub versions: Vec<SavedNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Name>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Name>,
    #[serde(default)]
    pub run: Vec<RunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub body: NodeBody,
}

impl From<&Node> for SavedNode {
    fn from(node: &Node) -> Self {
        Self {
            parent: node.parent,
            right: node.right,
            run: node.run.clone(),
            created: node.created,
            body: node.body.clone(),
        }
    }
}

fn corrupt(message: impl Into<String>) -> HistoryError {
    HistoryError::Corrupt(message.into())
}

fn check_committed(owner: &Name, reference: &Name) -> HistoryResult<()> {
    if reference.is_staged() {
        return Err(corrupt(format!("{owner} refers to staged {reference}")));
    }
    Ok(())
}

fn load_node(identity: Identity, version: usize, saved: SavedNode) -> HistoryResult<Node> {
    let name = identity.at(version as u32);
    if !saved.body.fits(identity.kind) {
        return Err(corrupt(format!("{name} has a payload of the wrong kind")));
    }

    let mut references: Vec<&Name> = saved.parent.iter().chain(saved.right.iter()).collect();
    match &saved.body {
        NodeBody::Notebook { cells } => references.extend(cells),
        NodeBody::Code(data) => {
            references.extend(data.content.iter().filter_map(Content::as_node));
            references.extend(data.output.iter());
        }
        NodeBody::Output { depends_on, .. } => references.extend(depends_on),
        NodeBody::Markdown { .. } => {}
    }
    for reference in references {
        check_committed(&name, reference)?;
    }

    Ok(Node {
        name,
        parent: saved.parent,
        right: saved.right,
        run: saved.run,
        created: saved.created,
        body: saved.body,
    })
}

impl History {
    pub fn to_saved(&self) -> SavedHistory {
        let chains = |kind: NodeKind| -> Vec<SavedChain> {
            self.store
                .identities(kind)
                .filter_map(|identity| {
                    let chain = self.store.chain(identity).ok()?;
                    Some(SavedChain {
                        identity,
                        versions: chain.versions().iter().map(SavedNode::from).collect(),
                    })
                })
                .collect()
        };

        let nodey = [
            NodeKind::Notebook,
            NodeKind::CodeCell,
            NodeKind::Code,
            NodeKind::Markdown,
        ]
        .into_iter()
        .flat_map(chains)
        .collect();

        SavedHistory {
            cells: self.cells.clone(),
            deleted_cells: self.deleted_cells.clone(),
            nodey,
            output: chains(NodeKind::Output),
            runs: self.runs.runs().to_vec(),
        }
    }

    pub fn from_saved(saved: SavedHistory) -> HistoryResult<Self> {
        let mut chains: Vec<SavedChain> = saved.nodey;
        if let Some(chain) = chains.iter().find(|c| c.identity.kind == NodeKind::Output) {
            return Err(corrupt(format!("output {} stored with nodey", chain.identity)));
        }
        if let Some(chain) = saved.output.iter().find(|c| c.identity.kind != NodeKind::Output) {
            return Err(corrupt(format!("{} stored with outputs", chain.identity)));
        }
        chains.extend(saved.output);
        chains.sort_by_key(|chain| chain.identity);

        let mut store = NodeStore::new();
        for saved_chain in chains {
            let identity = saved_chain.identity;
            let mut chain = VersionChain::new();
            for (version, node) in saved_chain.versions.into_iter().enumerate() {
                chain.push(load_node(identity, version, node)?);
            }
            store.push_chain(identity, chain)?;
        }

        let first = store.identities(NodeKind::Notebook).next();
        let notebook = match first {
            Some(notebook) => notebook,
            None => store.allocate(NodeKind::Notebook),
        };

        for cell in saved.cells.iter().chain(&saved.deleted_cells) {
            if !cell.kind.is_cell() {
                return Err(HistoryError::NotACell(*cell));
            }
            if store.chain(*cell)?.is_empty() {
                return Err(corrupt(format!("cell {cell} has no versions")));
            }
        }

        let runs = RunLog::from_runs(saved.runs)?;
        tracing::debug!(
            "loaded history with {} cells and {} runs",
            saved.cells.len(),
            runs.len()
        );
        Ok(History::from_parts(
            store,
            notebook,
            saved.cells,
            saved.deleted_cells,
            runs,
        ))
    }

    pub fn to_json(&self, pretty: bool) -> HistoryResult<String> {
        let saved = self.to_saved();
        let json = if pretty {
            serde_json::to_string_pretty(&saved)?
        } else {
            serde_json::to_string(&saved)?
        };
        Ok(json)
    }

    pub fn from_json(json: &str) -> HistoryResult<Self> {
        Self::from_saved(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>, pretty: bool) -> HistoryResult<()> {
        fs::write(path, self.to_json(pretty)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> HistoryResult<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}
