//! # Repair Engine
//!
//! Brings the history in line with edited cell text. Markdown is compared
//! directly; code is re-parsed and the new tree merged into the cell's
//! staged view so unchanged nodes keep their identities.
//!
//! Code repair is two-phase so the parse can run without holding the
//! history: [`History::begin_code_repair`] hands out a token, and
//! [`History::complete_code_repair`] applies the parse only if that token
//! is still the latest one for the cell.

use nbhist_parser::{ParseError, ParseItem, ParseTree};
use similar::{ChangeTag, TextDiff};
use std::ops::Range;

use crate::builder::BuildMode;
use crate::errors::{HistoryError, HistoryResult};
use crate::history::History;
use crate::node::{Content, Identity, Name, NodeBody, NodeKind, SyntaxToken};

pub type RepairToken = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Text matches the latest snapshot; nothing staged
    Unchanged,
    /// The cell's staged root
    Staged(Name),
    /// A newer edit superseded this repair
    Discarded,
}

/// A code repair waiting for its parse result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRepair {
    pub cell: Identity,
    pub token: RepairToken,
    pub text: String,
}

/// Character-level edit distance (insertions plus deletions)
pub fn text_distance(old: &str, new: &str) -> usize {
    if old == new {
        return 0;
    }
    TextDiff::from_chars(old, new)
        .iter_all_changes()
        .filter(|change| change.tag() != ChangeTag::Equal)
        .count()
}

impl History {
    pub fn repair_markdown(&mut self, cell: Identity, text: &str) -> HistoryResult<RepairOutcome> {
        let latest = self.store.latest(cell)?;
        let NodeBody::Markdown { markdown } = &latest.body else {
            return Err(HistoryError::NotACell(cell));
        };
        if text_distance(markdown, text) == 0 {
            return Ok(RepairOutcome::Unchanged);
        }

        let latest = latest.name;
        let staged = self.mark_edited(&latest)?;
        if let NodeBody::Markdown { markdown } = &mut self.store.staged_mut(cell)?.body {
            *markdown = text.to_string();
        }
        Ok(RepairOutcome::Staged(staged))
    }

    /// Start a code repair. Returns `None` when `text` already matches the
    /// latest snapshot, which also invalidates any repair still in flight.
    pub fn begin_code_repair(
        &mut self,
        cell: Identity,
        text: &str,
    ) -> HistoryResult<Option<PendingRepair>> {
        if cell.kind != NodeKind::CodeCell {
            return Err(HistoryError::NotACell(cell));
        }
        let latest = self.store.latest(cell)?.name;
        if self.render(&latest)? == text {
            if self.repairs.remove(&cell).is_some() {
                tracing::debug!("edit to {} reverted; pending repair superseded", cell);
            }
            return Ok(None);
        }

        self.next_token += 1;
        let token = self.next_token;
        self.repairs.insert(cell, token);
        Ok(Some(PendingRepair {
            cell,
            token,
            text: text.to_string(),
        }))
    }

    /// Apply a parse result for a pending repair.
    ///
    /// A parse error leaves the history untouched and is returned as
    /// [`HistoryError::Parse`].
    pub fn complete_code_repair(
        &mut self,
        pending: &PendingRepair,
        result: Result<ParseTree, ParseError>,
    ) -> HistoryResult<RepairOutcome> {
        let cell = pending.cell;
        if self.repairs.get(&cell) != Some(&pending.token) {
            tracing::debug!("discarding stale repair {} for {}", pending.token, cell);
            return Ok(RepairOutcome::Discarded);
        }
        self.repairs.remove(&cell);

        let tree = result.map_err(|err| {
            tracing::warn!("could not parse {}: {}", cell, err);
            err
        })?;

        let latest = self.store.latest(cell)?.name;
        let root = self.mark_edited(&latest)?;
        self.merge_tree(cell, root, &tree)?;
        tracing::debug!("repaired {}", cell);
        Ok(RepairOutcome::Staged(root))
    }

    /// Whole-notebook repair is an extension point
    pub fn repair_notebook(&mut self) -> HistoryResult<RepairOutcome> {
        Err(HistoryError::RootRepairUnsupported)
    }

    pub fn is_repair_pending(&self, cell: Identity) -> bool {
        self.repairs.contains_key(&cell)
    }

    /// Whether `name` matches `tree` in type, literal, tokens and structure.
    /// With `exact` the positions must agree too.
    fn matches_tree(&self, name: &Name, tree: &ParseTree, exact: bool) -> bool {
        let Some(data) = self.store.get(name).ok().and_then(|node| node.code()) else {
            return false;
        };
        data.node_type == tree.node_type
            && (!exact || (data.start == tree.start && data.end == tree.end))
            && data.literal == tree.literal
            && data.content.len() == tree.content.len()
            && data
                .content
                .iter()
                .zip(&tree.content)
                .all(|pair| match pair {
                    (Content::Token(old), ParseItem::Token(new)) => old.syntok == new.syntok,
                    (Content::Node(old), ParseItem::Tree(new)) => self.matches_tree(old, new, exact),
                    _ => false,
                })
    }

    /// Same type, and both sides have content to merge
    fn pairs_with(&self, name: &Name, tree: &ParseTree) -> bool {
        let Some(data) = self.store.get(name).ok().and_then(|node| node.code()) else {
            return false;
        };
        data.node_type == tree.node_type && !data.content.is_empty() && !tree.content.is_empty()
    }

    /// Rewrite the staged node `target` to match `tree`.
    ///
    /// Old children are first matched exactly, in order. Remaining new
    /// children are then matched between the neighbouring matches: first by
    /// structure ignoring positions, so moved statements keep their
    /// identity, then with an unused old child of the same type. Both kinds
    /// of pairing are merged recursively. Anything left is built fresh;
    /// unmatched old children are dropped.
    pub(crate) fn merge_tree(
        &mut self,
        cell: Identity,
        target: Name,
        tree: &ParseTree,
    ) -> HistoryResult<()> {
        let old: Vec<Name> = self
            .store
            .get(&target)?
            .code()
            .ok_or_else(|| HistoryError::Inconsistent(format!("{target} is not a code node")))?
            .children()
            .copied()
            .collect();
        let new: Vec<&ParseTree> = tree.children().collect();

        // (old index, exact)
        let mut assigned: Vec<Option<(usize, bool)>> = vec![None; new.len()];
        let mut used = vec![false; old.len()];

        let mut from = 0;
        for (j, child) in new.iter().enumerate() {
            if let Some(k) = (from..old.len()).find(|&k| self.matches_tree(&old[k], child, true)) {
                used[k] = true;
                assigned[j] = Some((k, true));
                from = k + 1;
            }
        }

        for moved in [true, false] {
            for j in 0..new.len() {
                if assigned[j].is_some() {
                    continue;
                }
                let found = between_matches(&assigned, j, old.len()).find(|&k| {
                    !used[k]
                        && if moved {
                            self.matches_tree(&old[k], new[j], false)
                        } else {
                            self.pairs_with(&old[k], new[j])
                        }
                });
                if let Some(k) = found {
                    used[k] = true;
                    assigned[j] = Some((k, false));
                }
            }
        }

        let mut content = Vec::with_capacity(tree.content.len());
        let mut j = 0;
        for item in &tree.content {
            match item {
                ParseItem::Token(token) => content.push(Content::Token(SyntaxToken {
                    syntok: token.syntok.clone(),
                })),
                ParseItem::Tree(child) => {
                    let name = match assigned[j] {
                        Some((k, true)) => old[k],
                        Some((k, false)) => {
                            let staged = self.stage_under(&old[k], target, cell)?;
                            self.merge_tree(cell, staged, child)?;
                            staged
                        }
                        None => {
                            let identity = self.store.allocate(NodeKind::Code);
                            self.build_node(
                                identity,
                                child,
                                Some(target),
                                BuildMode::Staged { cell },
                                None,
                            )?
                        }
                    };
                    content.push(Content::Node(name));
                    j += 1;
                }
            }
        }

        let children: Vec<Name> = content.iter().filter_map(Content::as_node).copied().collect();
        for (index, child) in children.iter().enumerate() {
            if child.is_staged() {
                self.store.set_right(child, children.get(index + 1).copied())?;
            }
        }

        let node = self.store.staged_mut(target.identity)?;
        let data = node
            .body
            .code_mut()
            .ok_or_else(|| HistoryError::Inconsistent(format!("{target} is not a code node")))?;
        data.node_type = tree.node_type.clone();
        data.start = tree.start;
        data.end = tree.end;
        data.literal = tree.literal.clone();
        data.content = content;
        Ok(())
    }
}

/// Old indices lying between the matches nearest to new child `j`
fn between_matches(assigned: &[Option<(usize, bool)>], j: usize, len: usize) -> Range<usize> {
    let lo = assigned[..j]
        .iter()
        .rev()
        .find_map(|a| a.map(|(k, _)| k + 1))
        .unwrap_or(0);
    let hi = assigned[j + 1..]
        .iter()
        .find_map(|a| a.map(|(k, _)| k))
        .unwrap_or(len);
    lo..hi.max(lo)
}
