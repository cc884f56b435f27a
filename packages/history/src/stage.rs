//! # Staging Layer
//!
//! Produces staged ("uncommitted") snapshots. Staging a node stages every
//! ancestor up to its cell and rewrites each staged parent's content to
//! point at the staged child, so a cell always has one coherent staged view.

use std::collections::BTreeMap;

use crate::errors::{HistoryError, HistoryResult};
use crate::history::History;
use crate::node::{Content, Identity, Name, NodeKind};

/// Which identities hold a staged snapshot, grouped by owning cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagingArea {
    by_cell: BTreeMap<Identity, Vec<Identity>>,
}

impl StagingArea {
    pub(crate) fn record(&mut self, cell: Identity, identity: Identity) {
        let staged = self.by_cell.entry(cell).or_default();
        if !staged.contains(&identity) {
            staged.push(identity);
        }
    }

    pub(crate) fn take_cell(&mut self, cell: Identity) -> Vec<Identity> {
        self.by_cell.remove(&cell).unwrap_or_default()
    }

    pub fn staged_in(&self, cell: Identity) -> &[Identity] {
        self.by_cell.get(&cell).map_or(&[], Vec::as_slice)
    }

    /// Cells with at least one staged snapshot
    pub fn cells(&self) -> impl Iterator<Item = Identity> + '_ {
        self.by_cell.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_cell.is_empty()
    }
}

impl History {
    /// Stage `name` for editing and return the staged name.
    ///
    /// Idempotent: an identity that already has a staged snapshot returns it
    /// unchanged.
    pub fn mark_edited(&mut self, name: &Name) -> HistoryResult<Name> {
        self.stage(name).map(|(staged, _)| staged)
    }

    /// Returns the staged name together with the owning cell
    fn stage(&mut self, name: &Name) -> HistoryResult<(Name, Identity)> {
        let identity = name.identity;
        if identity.kind == NodeKind::Output {
            return Err(HistoryError::NotEditable(*name));
        }

        let chain = self.store.chain(identity)?;
        if chain.is_staged() {
            let staged = identity.staged();
            let cell = match identity.kind {
                NodeKind::Notebook => identity,
                _ => self.store.owning_cell(&staged)?,
            };
            return Ok((staged, cell));
        }
        if name.is_staged() {
            return Err(HistoryError::not_found(name));
        }

        let current = chain
            .latest_committed()
            .ok_or_else(|| HistoryError::not_found(name))?;
        let mut staged = current.to_staged();
        let current_name = current.name;
        let parent = current.parent;

        let cell = match parent {
            Some(parent) => {
                self.check_placement(&current_name, &parent)?;
                let (staged_parent, cell) = self.stage(&parent).map_err(|err| match err {
                    HistoryError::NotFound(_) => HistoryError::Orphaned {
                        node: current_name,
                        parent,
                    },
                    other => other,
                })?;
                self.replace_child(&staged_parent, &current_name, &staged.name)?;
                staged.parent = Some(staged_parent);
                cell
            }
            None => identity,
        };

        tracing::debug!("staged {} (cell {})", current_name, cell);
        self.store.set_staged(staged)?;
        self.staging.record(cell, identity);
        Ok((identity.staged(), cell))
    }

    /// Stage `child` directly under an already staged parent without
    /// touching the parent's content. Used while merging a re-parse.
    pub(crate) fn stage_under(
        &mut self,
        child: &Name,
        staged_parent: Name,
        cell: Identity,
    ) -> HistoryResult<Name> {
        let identity = child.identity;
        let chain = self.store.chain(identity)?;
        let staged_name = identity.staged();

        if chain.is_staged() {
            self.store.set_parent(&staged_name, Some(staged_parent))?;
            self.staging.record(cell, identity);
            return Ok(staged_name);
        }

        let mut staged = chain
            .latest_committed()
            .ok_or_else(|| HistoryError::not_found(child))?
            .to_staged();
        staged.parent = Some(staged_parent);
        self.store.set_staged(staged)?;
        self.staging.record(cell, identity);
        Ok(staged_name)
    }

    /// The current snapshot of `parent` must still list `child`; checked
    /// before anything is staged so a failure leaves no trace.
    fn check_placement(&self, child: &Name, parent: &Name) -> HistoryResult<()> {
        let holder = self
            .store
            .latest(parent.identity)
            .map_err(|_| HistoryError::Orphaned {
                node: *child,
                parent: *parent,
            })?;
        if holder.code().is_some_and(|data| data.children().any(|c| c == child)) {
            Ok(())
        } else {
            Err(HistoryError::Inconsistent(format!(
                "{} does not contain {child}",
                holder.name
            )))
        }
    }

    fn replace_child(&mut self, parent: &Name, old: &Name, new: &Name) -> HistoryResult<()> {
        let node = self.store.staged_mut(parent.identity)?;
        let data = node.body.code_mut().ok_or_else(|| {
            HistoryError::Inconsistent(format!("{parent} has no code content"))
        })?;
        let slot = data
            .content
            .iter_mut()
            .find(|item| item.as_node() == Some(old))
            .ok_or_else(|| {
                HistoryError::Inconsistent(format!("{parent} does not contain {old}"))
            })?;
        *slot = Content::Node(*new);
        Ok(())
    }

    /// Drop every staged snapshot recorded for `cell`
    pub(crate) fn discard_staged(&mut self, cell: Identity) -> HistoryResult<()> {
        for identity in self.staging.take_cell(cell) {
            if let Some(node) = self.store.take_staged(identity)? {
                tracing::debug!("discarding stray staged snapshot {}", node.name);
            }
        }
        Ok(())
    }
}
