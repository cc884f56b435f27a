//! # Version Chain
//!
//! Ordered committed snapshots of one identity plus at most one pending
//! staged snapshot. Committed versions are only ever appended.

use crate::node::{Name, Node, Version};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionChain {
    versions: Vec<Node>,
    staged: Option<Node>,
}

impl VersionChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn versions(&self) -> &[Node] {
        &self.versions
    }

    pub fn staged(&self) -> Option<&Node> {
        self.staged.as_ref()
    }

    pub fn is_staged(&self) -> bool {
        self.staged.is_some()
    }

    /// The pending staged snapshot if there is one, else the newest version
    pub fn latest(&self) -> Option<&Node> {
        self.staged.as_ref().or_else(|| self.versions.last())
    }

    pub fn latest_committed(&self) -> Option<&Node> {
        self.versions.last()
    }

    pub fn get(&self, version: Version) -> Option<&Node> {
        match version {
            Version::Committed(v) => self.versions.get(v as usize),
            Version::Staged => self.staged.as_ref(),
        }
    }

    pub(crate) fn get_mut(&mut self, version: Version) -> Option<&mut Node> {
        match version {
            Version::Committed(v) => self.versions.get_mut(v as usize),
            Version::Staged => self.staged.as_mut(),
        }
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn next_version(&self) -> u32 {
        self.versions.len() as u32
    }

    /// Append a committed snapshot. Its version must be the next one.
    pub(crate) fn push(&mut self, node: Node) -> u32 {
        let version = self.next_version();
        debug_assert_eq!(node.name.version, Version::Committed(version));
        self.versions.push(node);
        version
    }

    pub(crate) fn set_staged(&mut self, node: Node) {
        debug_assert!(node.name.is_staged());
        self.staged = Some(node);
    }

    pub(crate) fn take_staged(&mut self) -> Option<Node> {
        self.staged.take()
    }

    pub(crate) fn staged_mut(&mut self) -> Option<&mut Node> {
        self.staged.as_mut()
    }

    pub fn latest_name(&self) -> Option<Name> {
        self.latest().map(|node| node.name)
    }
}
