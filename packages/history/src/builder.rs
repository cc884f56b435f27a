//! # Tree Builder
//!
//! Turns a parse result into nodes: one identity per structural node,
//! syntax tokens inlined as content, parent and sibling links wired.

use chrono::Utc;
use nbhist_parser::{ParseItem, ParseTree};

use crate::commit::OutputRecord;
use crate::errors::HistoryResult;
use crate::history::History;
use crate::node::{CodeData, Content, Identity, Name, Node, NodeBody, NodeKind, SyntaxToken};

/// Whether built nodes are registered as version 0 or staged for a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuildMode {
    Committed,
    Staged { cell: Identity },
}

impl BuildMode {
    fn name_for(self, identity: Identity) -> Name {
        match self {
            BuildMode::Committed => identity.at(0),
            BuildMode::Staged { .. } => identity.staged(),
        }
    }
}

impl History {
    /// Build a new code cell as version 0; the parse root becomes the cell root
    pub(crate) fn build_code_cell(
        &mut self,
        tree: &ParseTree,
        output: Option<&OutputRecord>,
    ) -> HistoryResult<Identity> {
        let cell = self.store.allocate(NodeKind::CodeCell);
        let root = cell.at(0);

        let output = match output {
            Some(record) => {
                let identity = self.store.allocate(NodeKind::Output);
                let depends_on = self.resolve_dependencies(&record.depends_on)?;
                let mut node = Node::new(
                    identity.at(0),
                    NodeBody::Output {
                        raw: record.raw.clone(),
                        depends_on,
                    },
                );
                node.parent = Some(root);
                node.created = Some(Utc::now());
                Some(self.store.register_version(node)?)
            }
            None => None,
        };

        self.build_node(cell, tree, None, BuildMode::Committed, output)?;
        Ok(cell)
    }

    pub(crate) fn build_markdown_cell(&mut self, text: &str) -> HistoryResult<Identity> {
        let cell = self.store.allocate(NodeKind::Markdown);
        let mut node = Node::new(
            cell.at(0),
            NodeBody::Markdown {
                markdown: text.to_string(),
            },
        );
        node.created = Some(Utc::now());
        self.store.register_version(node)?;
        Ok(cell)
    }

    /// Build `tree` under `identity`, children first
    pub(crate) fn build_node(
        &mut self,
        identity: Identity,
        tree: &ParseTree,
        parent: Option<Name>,
        mode: BuildMode,
        output: Option<Name>,
    ) -> HistoryResult<Name> {
        let name = mode.name_for(identity);
        let mut content = Vec::with_capacity(tree.content.len());
        let mut prior: Option<Name> = None;

        for item in &tree.content {
            match item {
                ParseItem::Token(token) => content.push(Content::Token(SyntaxToken {
                    syntok: token.syntok.clone(),
                })),
                ParseItem::Tree(child) => {
                    let child_identity = self.store.allocate(NodeKind::Code);
                    let child_name =
                        self.build_node(child_identity, child, Some(name), mode, None)?;
                    if let Some(prior) = prior {
                        self.store.set_right(&prior, Some(child_name))?;
                    }
                    prior = Some(child_name);
                    content.push(Content::Node(child_name));
                }
            }
        }

        let mut node = Node::new(
            name,
            NodeBody::Code(CodeData {
                node_type: tree.node_type.clone(),
                content,
                start: tree.start,
                end: tree.end,
                literal: tree.literal.clone(),
                output,
            }),
        );
        node.parent = parent;

        match mode {
            BuildMode::Committed => {
                node.created = Some(Utc::now());
                self.store.register_version(node)
            }
            BuildMode::Staged { cell } => {
                self.store.set_staged(node)?;
                self.staging.record(cell, identity);
                Ok(name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::history::History;
    use crate::node::{Content, NodeKind};
    use nbhist_parser::parse;

    #[test]
    fn test_builds_one_identity_per_structural_node() {
        let mut history = History::new();
        let tree = parse("x = 1\nprint(x)").unwrap();
        let cell = history.insert_code_cell(0, &tree, None).unwrap();

        assert_eq!(history.store().len(NodeKind::CodeCell), 1);
        assert_eq!(
            history.store().len(NodeKind::Code) + 1,
            tree.node_count()
        );

        let root = history.get(&cell.at(0)).unwrap();
        assert_eq!(root.code().unwrap().node_type, "Module");
        assert!(root.parent.is_none());
        assert!(root.created.is_some());
    }

    #[test]
    fn test_links_parent_and_siblings() {
        let mut history = History::new();
        let tree = parse("a = 1\nb = 2\nc = 3").unwrap();
        let cell = history.insert_code_cell(0, &tree, None).unwrap();
        let root = history.get(&cell.at(0)).unwrap();
        let children: Vec<_> = root.code().unwrap().children().copied().collect();
        assert_eq!(children.len(), 3);

        for pair in children.windows(2) {
            let node = history.get(&pair[0]).unwrap();
            assert_eq!(node.right, Some(pair[1]));
            assert_eq!(node.parent, Some(cell.at(0)));
        }
        assert!(history.get(&children[2]).unwrap().right.is_none());
    }

    #[test]
    fn test_tokens_are_inlined() {
        let mut history = History::new();
        let tree = parse("x = 1").unwrap();
        let cell = history.insert_code_cell(0, &tree, None).unwrap();
        let root = history.get(&cell.at(0)).unwrap();
        let stmt = *root.code().unwrap().children().next().unwrap();
        let stmt = history.get(&stmt).unwrap();

        let tokens: Vec<&str> = stmt
            .code()
            .unwrap()
            .content
            .iter()
            .filter_map(|item| match item {
                Content::Token(token) => Some(token.syntok.as_str()),
                Content::Node(_) => None,
            })
            .collect();
        assert_eq!(tokens, vec![" ="]);
    }
}
