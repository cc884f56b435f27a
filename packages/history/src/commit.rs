//! # Commit Engine
//!
//! Converts a cell's staged snapshots into new committed versions when the
//! cell is run (or the document saved). Children are committed before
//! parents so every committed parent refers only to committed children.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{HistoryError, HistoryResult};
use crate::history::History;
use crate::node::{Content, Identity, Name, Node, NodeBody, NodeKind, RunId};
use crate::repair::text_distance;

/// Output observed when a code cell was executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub raw: serde_json::Value,
    /// Cells whose latest outputs this output was computed from
    #[serde(default)]
    pub depends_on: Vec<Identity>,
}

impl OutputRecord {
    pub fn new(raw: serde_json::Value) -> Self {
        Self {
            raw,
            depends_on: Vec::new(),
        }
    }
}

impl History {
    /// Commit the staged state of `cell` under `run` and return the cell's
    /// latest committed name. A cell with nothing staged (and no new output)
    /// records the run on its current version.
    pub fn commit(
        &mut self,
        cell: Identity,
        run: RunId,
        output: Option<&OutputRecord>,
    ) -> HistoryResult<Name> {
        let name = match cell.kind {
            NodeKind::CodeCell => self.commit_code_cell(cell, run, output)?,
            NodeKind::Markdown => self.commit_markdown(cell, run)?,
            _ => return Err(HistoryError::NotACell(cell)),
        };
        self.discard_staged(cell)?;
        self.runs.record_cell(run, name);
        tracing::debug!("committed {} in run {}", name, run);
        Ok(name)
    }

    fn commit_code_cell(
        &mut self,
        cell: Identity,
        run: RunId,
        output: Option<&OutputRecord>,
    ) -> HistoryResult<Name> {
        let root = self
            .store
            .chain(cell)?
            .latest_name()
            .ok_or_else(|| HistoryError::not_found(cell))?;
        if !self.staging.staged_in(cell).is_empty() {
            self.check_staged_closure(cell, &root)?;
        }

        let output = match output {
            Some(record) => self.commit_output(cell, record, run)?,
            None => None,
        };
        let root = match output {
            Some(_) => self.mark_edited(&root)?,
            None => root,
        };

        let committed = self.commit_code(&root, run, output)?;
        if let Some(output) = output {
            self.store.set_parent(&output, Some(committed))?;
        }
        self.store.record_run(&committed, run)?;
        Ok(committed)
    }

    /// Staged snapshots of `cell` must form an upward-closed tree rooted at
    /// the cell: every staged child is referenced by a staged parent.
    fn check_staged_closure(&self, cell: Identity, root: &Name) -> HistoryResult<()> {
        for identity in self.staging.staged_in(cell) {
            let Some(node) = self.store.chain(*identity)?.staged() else {
                continue;
            };
            match node.parent {
                None if *identity == cell => {}
                None => {
                    return Err(HistoryError::Inconsistent(format!(
                        "staged {} has no parent",
                        node.name
                    )))
                }
                Some(parent) if !parent.is_staged() => {
                    return Err(HistoryError::Inconsistent(format!(
                        "staged {} sits under committed {parent}",
                        node.name
                    )))
                }
                Some(parent) if !self.store.contains(&parent) => {
                    return Err(HistoryError::Inconsistent(format!(
                        "staged {} points at missing {parent}",
                        node.name
                    )))
                }
                Some(_) => {}
            }
        }

        let mut pending = vec![*root];
        while let Some(name) = pending.pop() {
            let node = self.store.get(&name)?;
            let Some(data) = node.code() else { continue };
            for child in data.children().filter(|child| child.is_staged()) {
                let child_node = self.store.get(child).map_err(|_| {
                    HistoryError::Inconsistent(format!("{name} refers to missing {child}"))
                })?;
                if child_node.parent != Some(name) {
                    return Err(HistoryError::Inconsistent(format!(
                        "{child} is not linked back to {name}"
                    )));
                }
                pending.push(*child);
            }
        }
        Ok(())
    }

    /// Latest output name for each referenced cell that has one
    pub(crate) fn resolve_dependencies(&self, cells: &[Identity]) -> HistoryResult<Vec<Name>> {
        let mut resolved = Vec::new();
        for cell in cells {
            let node = self.store.latest_committed(*cell)?;
            if let Some(output) = node.code().and_then(|data| data.output) {
                resolved.push(output);
            }
        }
        Ok(resolved)
    }

    /// Returns the new output version, or `None` when the bound output is
    /// unchanged (the run is then recorded on it).
    fn commit_output(
        &mut self,
        cell: Identity,
        record: &OutputRecord,
        run: RunId,
    ) -> HistoryResult<Option<Name>> {
        let depends_on = self.resolve_dependencies(&record.depends_on)?;
        let latest = self.store.latest(cell)?;
        let parent = latest.name;
        let bound = latest.code().and_then(|data| data.output);

        if let Some(bound) = bound {
            let unchanged = matches!(
                &self.store.get(&bound)?.body,
                NodeBody::Output { raw, depends_on: deps }
                    if *raw == record.raw && *deps == depends_on
            );
            if unchanged {
                self.store.record_run(&bound, run)?;
                return Ok(None);
            }
        }

        let identity = match bound {
            Some(bound) => bound.identity,
            None => self.store.allocate(NodeKind::Output),
        };
        let mut node = Node::new(
            identity.staged(),
            NodeBody::Output {
                raw: record.raw.clone(),
                depends_on,
            },
        );
        node.parent = Some(parent);
        node.run = vec![run];
        node.created = Some(Utc::now());
        let name = self.store.register_version(node)?;
        tracing::debug!("new output {} for {}", name, cell);
        Ok(Some(name))
    }

    /// Post-order commit of a staged code subtree. Committed names pass
    /// through; a staged node whose payload matches its latest committed
    /// version is dropped in favour of that version.
    fn commit_code(&mut self, name: &Name, run: RunId, output: Option<Name>) -> HistoryResult<Name> {
        if !name.is_staged() {
            return Ok(*name);
        }
        let identity = name.identity;
        let staged = self
            .store
            .take_staged(identity)?
            .ok_or_else(|| HistoryError::not_found(name))?;
        let mut data = staged
            .code()
            .cloned()
            .ok_or_else(|| HistoryError::Inconsistent(format!("{name} is not a code node")))?;

        for item in data.content.iter_mut() {
            if let Content::Node(child) = item {
                *child = self.commit_code(child, run, None)?;
            }
        }
        if output.is_some() {
            data.output = output;
        }
        let body = NodeBody::Code(data);

        let chain = self.store.chain(identity)?;
        let unchanged = chain
            .latest_committed()
            .filter(|latest| latest.body == body)
            .map(|latest| latest.name);
        let version = chain.next_version();

        let target = match unchanged {
            Some(latest) => {
                tracing::debug!("{} unchanged, keeping {}", name, latest);
                latest
            }
            None => {
                let mut node = staged.destaged(version, run);
                node.body = body;
                self.store.register_version(node)?
            }
        };

        self.relink_children(&target)?;
        Ok(target)
    }

    /// Point every child of `parent` back at it and rebuild the sibling chain
    fn relink_children(&mut self, parent: &Name) -> HistoryResult<()> {
        let children: Vec<Name> = match self.store.get(parent)?.code() {
            Some(data) => data.children().copied().collect(),
            None => return Ok(()),
        };
        for (index, child) in children.iter().enumerate() {
            self.store.set_parent(child, Some(*parent))?;
            self.store.set_right(child, children.get(index + 1).copied())?;
        }
        Ok(())
    }

    fn commit_markdown(&mut self, cell: Identity, run: RunId) -> HistoryResult<Name> {
        let chain = self.store.chain(cell)?;
        let latest = chain.latest_committed().map(|node| node.name);

        let Some(staged) = self.store.take_staged(cell)? else {
            let latest = latest.ok_or_else(|| HistoryError::not_found(cell))?;
            self.store.record_run(&latest, run)?;
            return Ok(latest);
        };

        if let Some(latest) = latest {
            let changed = match (&self.store.get(&latest)?.body, &staged.body) {
                (NodeBody::Markdown { markdown: old }, NodeBody::Markdown { markdown: new }) => {
                    text_distance(old, new) > 0
                }
                _ => true,
            };
            if !changed {
                tracing::debug!("markdown {} unchanged", cell);
                self.store.record_run(&latest, run)?;
                return Ok(latest);
            }
        }

        let version = self.store.chain(cell)?.next_version();
        self.store.register_version(staged.destaged(version, run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runs::RunKind;
    use nbhist_parser::parse;
    use serde_json::json;

    fn code_cell(history: &mut History, source: &str) -> Identity {
        let tree = parse(source).unwrap();
        let index = history.cells().len();
        history.insert_code_cell(index, &tree, None).unwrap()
    }

    fn child(history: &History, name: &Name, index: usize) -> Name {
        *history
            .get(name)
            .unwrap()
            .code()
            .unwrap()
            .children()
            .nth(index)
            .unwrap()
    }

    #[test]
    fn test_commit_without_changes_records_run() {
        let mut history = History::new();
        let cell = code_cell(&mut history, "x = 1");
        let run = history.begin_run(RunKind::Execute);

        let name = history.commit(cell, run, None).unwrap();
        assert_eq!(name, cell.at(0));
        assert_eq!(history.get(&name).unwrap().run, vec![run]);
        assert_eq!(history.runs().get(run).unwrap().cells, vec![name]);
    }

    #[test]
    fn test_unchanged_staging_is_elided() {
        let mut history = History::new();
        let cell = code_cell(&mut history, "x = 1\ny = 2");
        let stmt = child(&history, &cell.at(0), 1);
        history.mark_edited(&stmt).unwrap();

        let run = history.begin_run(RunKind::Execute);
        let name = history.commit(cell, run, None).unwrap();
        assert_eq!(name, cell.at(0));
        assert_eq!(history.versions_of(cell).unwrap().len(), 1);
        assert_eq!(history.versions_of(stmt.identity).unwrap().len(), 1);
        assert!(history.staged_in(cell).is_empty());
    }

    #[test]
    fn test_commit_is_post_order_and_relinks() {
        let mut history = History::new();
        let cell = code_cell(&mut history, "x = 1\ny = 2");
        let first = child(&history, &cell.at(0), 0);
        let second = child(&history, &cell.at(0), 1);

        let staged = history.mark_edited(&second).unwrap();
        let number = child(&history, &staged, 1);
        let staged_number = history.mark_edited(&number).unwrap();
        let mut body = history.get(&staged_number).unwrap().body.clone();
        body.code_mut().unwrap().literal = Some("3".into());
        history.store.staged_mut(staged_number.identity).unwrap().body = body;

        let run = history.begin_run(RunKind::Execute);
        let root = history.commit(cell, run, None).unwrap();
        assert_eq!(root, cell.at(1));

        let children: Vec<Name> = history
            .get(&root)
            .unwrap()
            .code()
            .unwrap()
            .children()
            .copied()
            .collect();
        assert_eq!(children, vec![first, second.identity.at(1)]);
        assert_eq!(history.get(&first).unwrap().parent, Some(root));
        assert_eq!(history.get(&first).unwrap().right, Some(children[1]));

        let committed = history.get(&children[1]).unwrap();
        assert_eq!(committed.run, vec![run]);
        assert!(committed.created.is_some());
        assert_eq!(
            history.get(&child(&history, &children[1], 1)).unwrap().parent,
            Some(children[1])
        );
        assert_eq!(history.render(&root).unwrap(), "x = 1\ny = 3");
    }

    #[test]
    fn test_output_versions() {
        let mut history = History::new();
        let cell = code_cell(&mut history, "print(1)");

        let first_run = history.begin_run(RunKind::Execute);
        let record = OutputRecord::new(json!({"text": "1"}));
        let root = history.commit(cell, first_run, Some(&record)).unwrap();
        assert_eq!(root, cell.at(1));
        let output = history.get(&root).unwrap().code().unwrap().output.unwrap();
        assert_eq!(output.committed_version(), Some(0));
        assert_eq!(history.get(&output).unwrap().parent, Some(root));

        let second_run = history.begin_run(RunKind::Execute);
        let same = history.commit(cell, second_run, Some(&record)).unwrap();
        assert_eq!(same, root);
        assert_eq!(history.get(&output).unwrap().run, vec![first_run, second_run]);

        let third_run = history.begin_run(RunKind::Execute);
        let changed = OutputRecord::new(json!({"text": "2"}));
        let root = history.commit(cell, third_run, Some(&changed)).unwrap();
        assert_eq!(root, cell.at(2));
        let output = history.get(&root).unwrap().code().unwrap().output.unwrap();
        assert_eq!(output, output.identity.at(1));
    }

    #[test]
    fn test_output_dependencies_resolve_to_latest_outputs() {
        let mut history = History::new();
        let a = code_cell(&mut history, "x = 1");
        let b = code_cell(&mut history, "print(x)");

        let run = history.begin_run(RunKind::Execute);
        history
            .commit(a, run, Some(&OutputRecord::new(json!(1))))
            .unwrap();
        let record = OutputRecord {
            raw: json!("1"),
            depends_on: vec![a],
        };
        let root = history.commit(b, run, Some(&record)).unwrap();
        let output = history.get(&root).unwrap().code().unwrap().output.unwrap();
        let a_output = history.latest(a).unwrap().code().unwrap().output.unwrap();

        match &history.get(&output).unwrap().body {
            NodeBody::Output { depends_on, .. } => assert_eq!(depends_on, &vec![a_output]),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_broken_closure_is_rejected() {
        let mut history = History::new();
        let cell = code_cell(&mut history, "x = 1");
        let stmt = child(&history, &cell.at(0), 0);
        let staged = history.mark_edited(&stmt).unwrap();
        history
            .store
            .set_parent(&staged, Some(cell.at(0)))
            .unwrap();

        let run = history.begin_run(RunKind::Execute);
        let before = history.store().clone();
        let err = history.commit(cell, run, None).unwrap_err();
        assert!(matches!(err, HistoryError::Inconsistent(_)));
        assert_eq!(history.store(), &before);
    }

    #[test]
    fn test_staged_child_under_unstaged_root_is_rejected() {
        let mut history = History::new();
        let cell = code_cell(&mut history, "x = 1\ny = 2");
        let stmt = child(&history, &cell.at(0), 1);
        history.mark_edited(&stmt).unwrap();
        history.store.take_staged(cell).unwrap();

        let run = history.begin_run(RunKind::Execute);
        let before = history.store().clone();
        let err = history.commit(cell, run, None).unwrap_err();
        assert!(matches!(err, HistoryError::Inconsistent(_)));
        assert_eq!(history.store(), &before);
        assert!(!history.staged_in(cell).is_empty());
    }

    #[test]
    fn test_markdown_commit_uses_edit_distance() {
        let mut history = History::new();
        let cell = history.insert_markdown_cell(0, "# Title").unwrap();

        history.mark_edited(&cell.at(0)).unwrap();
        let run = history.begin_run(RunKind::Save);
        assert_eq!(history.commit(cell, run, None).unwrap(), cell.at(0));

        history.repair_markdown(cell, "# Title!").unwrap();
        let run = history.begin_run(RunKind::Save);
        assert_eq!(history.commit(cell, run, None).unwrap(), cell.at(1));
        assert!(history.store().chain(cell).unwrap().staged().is_none());
    }

    #[test]
    fn test_commit_rejects_non_cells() {
        let mut history = History::new();
        let notebook = history.notebook();
        let err = history.commit(notebook, 0, None).unwrap_err();
        assert!(matches!(err, HistoryError::NotACell(_)));
    }
}
