//! Parse tree handed to the history engine.
//!
//! The serialized shape is `{type, start, end, literal?, content?}` with
//! bare terminal symbols encoded as `{"syntok": "..."}`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Zero-based source position. `ch` counts characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub ch: u32,
}

impl Position {
    pub fn new(line: u32, ch: u32) -> Self {
        Self { line, ch }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.ch + 1)
    }
}

/// A terminal symbol with no identity of its own
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenSymbol {
    pub syntok: String,
}

impl TokenSymbol {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            syntok: text.into(),
        }
    }
}

/// One entry of a parse tree's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParseItem {
    Token(TokenSymbol),
    Tree(ParseTree),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseTree {
    #[serde(rename = "type")]
    pub node_type: String,
    pub start: Position,
    pub end: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ParseItem>,
}

impl ParseTree {
    pub fn new(node_type: impl Into<String>, start: Position, end: Position) -> Self {
        Self {
            node_type: node_type.into(),
            start,
            end,
            literal: None,
            content: Vec::new(),
        }
    }

    pub fn leaf(
        node_type: impl Into<String>,
        start: Position,
        end: Position,
        literal: impl Into<String>,
    ) -> Self {
        Self {
            literal: Some(literal.into()),
            ..Self::new(node_type, start, end)
        }
    }

    /// Structural children, skipping syntax tokens
    pub fn children(&self) -> impl Iterator<Item = &ParseTree> {
        self.content.iter().filter_map(|item| match item {
            ParseItem::Tree(tree) => Some(tree),
            ParseItem::Token(_) => None,
        })
    }

    /// Number of structural nodes in this tree, including the root
    pub fn node_count(&self) -> usize {
        1 + self.children().map(ParseTree::node_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let mut tree = ParseTree::new("Assign", Position::new(0, 0), Position::new(0, 5));
        tree.content.push(ParseItem::Tree(ParseTree::leaf(
            "Name",
            Position::new(0, 0),
            Position::new(0, 1),
            "x",
        )));
        tree.content.push(ParseItem::Token(TokenSymbol::new(" =")));

        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["type"], "Assign");
        assert_eq!(json["content"][0]["literal"], "x");
        assert_eq!(json["content"][1]["syntok"], " =");
        assert!(json.get("literal").is_none());

        let back: ParseTree = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
        assert_eq!(back.node_count(), 2);
    }
}
