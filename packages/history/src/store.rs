//! # Node Store
//!
//! Registry from identity to [`VersionChain`]. Each kind has its own
//! append-only table indexed by identity id, so ids are dense per kind.

use crate::chain::VersionChain;
use crate::errors::{HistoryError, HistoryResult};
use crate::node::{Identity, Name, Node, NodeKind, RunId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeStore {
    tables: [Vec<VersionChain>; 5],
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh identity with an empty chain
    pub fn allocate(&mut self, kind: NodeKind) -> Identity {
        let table = &mut self.tables[kind.index()];
        table.push(VersionChain::new());
        Identity::new(kind, (table.len() - 1) as u32)
    }

    /// Append `node` as the next committed version of its identity.
    /// The node's name is rewritten to the assigned version.
    pub fn register_version(&mut self, mut node: Node) -> HistoryResult<Name> {
        let identity = node.identity();
        if !node.body.fits(identity.kind) {
            return Err(HistoryError::Inconsistent(format!(
                "payload does not belong to a {:?} node ({identity})",
                identity.kind
            )));
        }
        let chain = self.chain_mut(identity)?;
        let name = identity.at(chain.next_version());
        node.name = name;
        chain.push(node);
        Ok(name)
    }

    pub fn chain(&self, identity: Identity) -> HistoryResult<&VersionChain> {
        self.tables[identity.kind.index()]
            .get(identity.id as usize)
            .ok_or_else(|| HistoryError::not_found(identity))
    }

    pub(crate) fn chain_mut(&mut self, identity: Identity) -> HistoryResult<&mut VersionChain> {
        self.tables[identity.kind.index()]
            .get_mut(identity.id as usize)
            .ok_or_else(|| HistoryError::not_found(identity))
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.get(name).is_ok()
    }

    pub fn get(&self, name: &Name) -> HistoryResult<&Node> {
        self.chain(name.identity)?
            .get(name.version)
            .ok_or_else(|| HistoryError::not_found(name))
    }

    /// Resolve a name given in its string form
    pub fn get_str(&self, name: &str) -> HistoryResult<&Node> {
        self.get(&name.parse()?)
    }

    pub(crate) fn get_mut(&mut self, name: &Name) -> HistoryResult<&mut Node> {
        self.chain_mut(name.identity)?
            .get_mut(name.version)
            .ok_or_else(|| HistoryError::not_found(name))
    }

    /// The staged snapshot if one is pending, else the newest version.
    /// An allocated identity with neither is `NotFound`: there is no
    /// snapshot to return.
    pub fn latest(&self, identity: Identity) -> HistoryResult<&Node> {
        self.chain(identity)?
            .latest()
            .ok_or_else(|| HistoryError::not_found(identity))
    }

    pub fn latest_committed(&self, identity: Identity) -> HistoryResult<&Node> {
        self.chain(identity)?
            .latest_committed()
            .ok_or_else(|| HistoryError::not_found(identity))
    }

    pub fn versions_of(&self, identity: Identity) -> HistoryResult<&[Node]> {
        Ok(self.chain(identity)?.versions())
    }

    /// Number of identities allocated for `kind`
    pub fn len(&self, kind: NodeKind) -> usize {
        self.tables[kind.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(Vec::is_empty)
    }

    pub fn identities(&self, kind: NodeKind) -> impl Iterator<Item = Identity> + '_ {
        (0..self.len(kind)).map(move |id| Identity::new(kind, id as u32))
    }

    /// Walk parent pointers from `name` up to the cell that owns it.
    ///
    /// Bounded by the number of code identities, so a corrupted parent
    /// cycle is reported rather than looped on.
    pub fn owning_cell(&self, name: &Name) -> HistoryResult<Identity> {
        let mut current = *name;
        self.get(&current)?;

        for _ in 0..=self.len(NodeKind::Code) {
            if current.kind().is_cell() {
                return Ok(current.identity);
            }
            let node = self.get(&current)?;
            match node.parent {
                Some(parent) if self.contains(&parent) => current = parent,
                Some(parent) => {
                    return Err(HistoryError::Orphaned {
                        node: current,
                        parent,
                    })
                }
                None => {
                    return Err(HistoryError::Inconsistent(format!(
                        "{current} is not inside a cell"
                    )))
                }
            }
        }

        Err(HistoryError::Inconsistent(format!(
            "parent pointers above {name} form a cycle"
        )))
    }

    pub(crate) fn set_staged(&mut self, node: Node) -> HistoryResult<()> {
        self.chain_mut(node.identity())?.set_staged(node);
        Ok(())
    }

    pub(crate) fn take_staged(&mut self, identity: Identity) -> HistoryResult<Option<Node>> {
        Ok(self.chain_mut(identity)?.take_staged())
    }

    pub(crate) fn staged_mut(&mut self, identity: Identity) -> HistoryResult<&mut Node> {
        self.chain_mut(identity)?
            .staged_mut()
            .ok_or_else(|| HistoryError::not_found(identity.staged()))
    }

    /// Point `name` at a new parent. Links are navigation data and may be
    /// refreshed on committed snapshots; payloads may not.
    pub(crate) fn set_parent(&mut self, name: &Name, parent: Option<Name>) -> HistoryResult<()> {
        self.get_mut(name)?.parent = parent;
        Ok(())
    }

    pub(crate) fn set_right(&mut self, name: &Name, right: Option<Name>) -> HistoryResult<()> {
        self.get_mut(name)?.right = right;
        Ok(())
    }

    /// Run sets are append-only
    pub(crate) fn record_run(&mut self, name: &Name, run: RunId) -> HistoryResult<()> {
        self.get_mut(name)?.record_run(run);
        Ok(())
    }

    /// Install a loaded chain at the next identity of its kind
    pub(crate) fn push_chain(&mut self, identity: Identity, chain: VersionChain) -> HistoryResult<()> {
        let table = &mut self.tables[identity.kind.index()];
        if identity.id as usize != table.len() {
            return Err(HistoryError::Corrupt(format!(
                "identity {identity} is out of order (expected id {})",
                table.len()
            )));
        }
        table.push(chain);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{CodeData, NodeBody};
    use nbhist_parser::Position;

    fn code(name: Name, parent: Option<Name>) -> Node {
        let mut node = Node::new(
            name,
            NodeBody::Code(CodeData {
                node_type: "Name".to_string(),
                content: Vec::new(),
                start: Position::default(),
                end: Position::default(),
                literal: Some("x".to_string()),
                output: None,
            }),
        );
        node.parent = parent;
        node
    }

    #[test]
    fn test_allocate_is_dense_per_kind() {
        let mut store = NodeStore::new();
        assert_eq!(store.allocate(NodeKind::Code).id, 0);
        assert_eq!(store.allocate(NodeKind::Code).id, 1);
        assert_eq!(store.allocate(NodeKind::Markdown).id, 0);
        assert_eq!(store.len(NodeKind::Code), 2);
    }

    #[test]
    fn test_unversioned_identity_has_no_latest() {
        let mut store = NodeStore::new();
        let id = store.allocate(NodeKind::Code);
        assert!(matches!(store.latest(id), Err(HistoryError::NotFound(_))));
        assert!(store.versions_of(id).unwrap().is_empty());

        store.register_version(code(id.staged(), None)).unwrap();
        assert_eq!(store.latest(id).unwrap().name, id.at(0));
    }

    #[test]
    fn test_register_assigns_next_version() {
        let mut store = NodeStore::new();
        let id = store.allocate(NodeKind::Code);
        let first = store.register_version(code(id.staged(), None)).unwrap();
        let second = store.register_version(code(id.staged(), None)).unwrap();
        assert_eq!(first, id.at(0));
        assert_eq!(second, id.at(1));
        assert_eq!(store.get(&second).unwrap().name, second);
        assert_eq!(store.versions_of(id).unwrap().len(), 2);
    }

    #[test]
    fn test_register_rejects_wrong_payload() {
        let mut store = NodeStore::new();
        let id = store.allocate(NodeKind::Markdown);
        let err = store.register_version(code(id.at(0), None)).unwrap_err();
        assert!(matches!(err, HistoryError::Inconsistent(_)));
    }

    #[test]
    fn test_get_unknown_or_malformed() {
        let mut store = NodeStore::new();
        let id = store.allocate(NodeKind::Code);
        store.register_version(code(id.at(0), None)).unwrap();

        assert!(matches!(store.get(&id.at(1)), Err(HistoryError::NotFound(_))));
        assert!(matches!(store.get(&id.staged()), Err(HistoryError::NotFound(_))));
        assert!(matches!(store.get_str("s.9.0"), Err(HistoryError::NotFound(_))));
        assert!(matches!(store.get_str("garbage"), Err(HistoryError::NotFound(_))));
        assert!(store.get_str("s.0.0").is_ok());
    }

    #[test]
    fn test_owning_cell_walks_parents() {
        let mut store = NodeStore::new();
        let cell = store.allocate(NodeKind::CodeCell);
        let mut root = code(cell.at(0), None);
        root.body.code_mut().unwrap().node_type = "Module".to_string();
        store.register_version(root).unwrap();

        let stmt = store.allocate(NodeKind::Code);
        store.register_version(code(stmt.at(0), Some(cell.at(0)))).unwrap();
        let leaf = store.allocate(NodeKind::Code);
        store.register_version(code(leaf.at(0), Some(stmt.at(0)))).unwrap();

        assert_eq!(store.owning_cell(&leaf.at(0)).unwrap(), cell);
        assert_eq!(store.owning_cell(&cell.at(0)).unwrap(), cell);
    }

    #[test]
    fn test_owning_cell_reports_orphans() {
        let mut store = NodeStore::new();
        let leaf = store.allocate(NodeKind::Code);
        let missing = Identity::new(NodeKind::Code, 42).at(0);
        store.register_version(code(leaf.at(0), Some(missing))).unwrap();

        let err = store.owning_cell(&leaf.at(0)).unwrap_err();
        assert!(matches!(
            err,
            HistoryError::Orphaned { node, parent } if node == leaf.at(0) && parent == missing
        ));
    }

    #[test]
    fn test_owning_cell_detects_cycles() {
        let mut store = NodeStore::new();
        let a = store.allocate(NodeKind::Code);
        let b = store.allocate(NodeKind::Code);
        store.register_version(code(a.at(0), Some(b.at(0)))).unwrap();
        store.register_version(code(b.at(0), Some(a.at(0)))).unwrap();

        let err = store.owning_cell(&a.at(0)).unwrap_err();
        assert!(matches!(err, HistoryError::Inconsistent(_)));
    }
}
