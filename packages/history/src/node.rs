//! # Node Model
//!
//! Identities, versions, names and the node snapshots stored in the
//! history.
//!
//! A [`Name`] is the universal cross-reference key: `kind.id.version`,
//! e.g. `s.4.2`, or `s.4.*` for the staged snapshot of identity `s.4`.
//! Nodes never own each other; every link is a `Name` resolved through the
//! [`NodeStore`](crate::NodeStore).

use chrono::{DateTime, Utc};
use nbhist_parser::Position;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::HistoryError;

/// Identifier of one run or save event
pub type RunId = u32;

/// What a node is. Each kind has its own identity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Notebook,
    CodeCell,
    Code,
    Markdown,
    Output,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Notebook,
        NodeKind::CodeCell,
        NodeKind::Code,
        NodeKind::Markdown,
        NodeKind::Output,
    ];

    pub fn as_char(self) -> char {
        match self {
            NodeKind::Notebook => 'n',
            NodeKind::CodeCell => 'c',
            NodeKind::Code => 's',
            NodeKind::Markdown => 'm',
            NodeKind::Output => 'o',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_char() == c)
    }

    /// Cells are the roots of staging: every staged node belongs to one
    pub fn is_cell(self) -> bool {
        matches!(self, NodeKind::CodeCell | NodeKind::Markdown)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Stable `(kind, id)` pair naming a node across all of its versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub kind: NodeKind,
    pub id: u32,
}

impl Identity {
    pub fn new(kind: NodeKind, id: u32) -> Self {
        Self { kind, id }
    }

    pub fn at(self, version: u32) -> Name {
        Name {
            identity: self,
            version: Version::Committed(version),
        }
    }

    pub fn staged(self) -> Name {
        Name {
            identity: self,
            version: Version::Staged,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.as_char(), self.id)
    }
}

impl FromStr for Identity {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let not_found = || HistoryError::NotFound(s.to_string());
        let (kind, id) = s.split_once('.').ok_or_else(not_found)?;
        let mut chars = kind.chars();
        let kind = match (chars.next(), chars.next()) {
            (Some(c), None) => NodeKind::from_char(c).ok_or_else(not_found)?,
            _ => return Err(not_found()),
        };
        let id = id.parse().map_err(|_| not_found())?;
        Ok(Identity::new(kind, id))
    }
}

/// Position in an identity's commit history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Version {
    Committed(u32),
    Staged,
}

/// `(kind, id, version)`: the key every cross-reference uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name {
    pub identity: Identity,
    pub version: Version,
}

impl Name {
    pub fn kind(&self) -> NodeKind {
        self.identity.kind
    }

    pub fn is_staged(&self) -> bool {
        self.version == Version::Staged
    }

    pub fn committed_version(&self) -> Option<u32> {
        match self.version {
            Version::Committed(v) => Some(v),
            Version::Staged => None,
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Version::Committed(v) => write!(f, "{}.{}", self.identity, v),
            Version::Staged => write!(f, "{}.*", self.identity),
        }
    }
}

impl FromStr for Name {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (identity, version) = s
            .rsplit_once('.')
            .ok_or_else(|| HistoryError::NotFound(s.to_string()))?;
        let identity: Identity = identity
            .parse()
            .map_err(|_| HistoryError::NotFound(s.to_string()))?;
        let version = match version {
            "*" => Version::Staged,
            v => Version::Committed(
                v.parse()
                    .map_err(|_| HistoryError::NotFound(s.to_string()))?,
            ),
        };
        Ok(Name { identity, version })
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(Identity);
string_serde!(Name);

/// Inline terminal symbol in code content. Has no identity or version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyntaxToken {
    pub syntok: String,
}

/// One entry of a code node's ordered content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Node(Name),
    Token(SyntaxToken),
}

impl Content {
    pub fn as_node(&self) -> Option<&Name> {
        match self {
            Content::Node(name) => Some(name),
            Content::Token(_) => None,
        }
    }
}

/// Payload of a code-subtree node (code cell roots included)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeData {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Content>,
    pub start: Position,
    pub end: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
    /// Bound output, code cell roots only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Name>,
}

impl CodeData {
    pub fn children(&self) -> impl Iterator<Item = &Name> {
        self.content.iter().filter_map(Content::as_node)
    }
}

/// Kind-specific payload. Matching on this is exhaustive everywhere the
/// engine needs per-kind behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeBody {
    Notebook {
        cells: Vec<Name>,
    },
    Code(CodeData),
    Markdown {
        markdown: String,
    },
    #[serde(rename_all = "camelCase")]
    Output {
        raw: serde_json::Value,
        #[serde(default)]
        depends_on: Vec<Name>,
    },
}

impl NodeBody {
    pub fn code(&self) -> Option<&CodeData> {
        match self {
            NodeBody::Code(data) => Some(data),
            _ => None,
        }
    }

    pub fn code_mut(&mut self) -> Option<&mut CodeData> {
        match self {
            NodeBody::Code(data) => Some(data),
            _ => None,
        }
    }

    /// Whether this payload may be stored under an identity of `kind`
    pub fn fits(&self, kind: NodeKind) -> bool {
        matches!(
            (self, kind),
            (NodeBody::Notebook { .. }, NodeKind::Notebook)
                | (NodeBody::Code(_), NodeKind::CodeCell | NodeKind::Code)
                | (NodeBody::Markdown { .. }, NodeKind::Markdown)
                | (NodeBody::Output { .. }, NodeKind::Output)
        )
    }
}

/// One snapshot of a node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: Name,
    /// Containing node; absent for cells and the notebook
    pub parent: Option<Name>,
    /// Next structural sibling, code nodes only
    pub right: Option<Name>,
    /// Runs in which this exact snapshot was observed
    pub run: Vec<RunId>,
    pub created: Option<DateTime<Utc>>,
    pub body: NodeBody,
}

impl Node {
    pub fn new(name: Name, body: NodeBody) -> Self {
        Self {
            name,
            parent: None,
            right: None,
            run: Vec::new(),
            created: None,
            body,
        }
    }

    pub fn identity(&self) -> Identity {
        self.name.identity
    }

    pub fn code(&self) -> Option<&CodeData> {
        self.body.code()
    }

    /// Copy-on-write: a fresh staged snapshot carrying this node's payload
    pub fn to_staged(&self) -> Node {
        Node {
            name: self.identity().staged(),
            parent: self.parent,
            right: self.right,
            run: Vec::new(),
            created: None,
            body: self.body.clone(),
        }
    }

    /// A committed snapshot built from a staged one
    pub(crate) fn destaged(&self, version: u32, run: RunId) -> Node {
        Node {
            name: self.identity().at(version),
            parent: self.parent,
            right: self.right,
            run: vec![run],
            created: Some(Utc::now()),
            body: self.body.clone(),
        }
    }

    pub(crate) fn record_run(&mut self, run: RunId) {
        if !self.run.contains(&run) {
            self.run.push(run);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        let name: Name = "s.4.2".parse().unwrap();
        assert_eq!(name, Identity::new(NodeKind::Code, 4).at(2));
        assert_eq!(name.to_string(), "s.4.2");

        let staged: Name = "c.0.*".parse().unwrap();
        assert!(staged.is_staged());
        assert_eq!(staged.to_string(), "c.0.*");
    }

    #[test]
    fn test_malformed_names_are_not_found() {
        for bad in ["", "s", "s.1", "x.1.0", "s.a.0", "s.1.-1", "ss.1.0", "s.1.0.0"] {
            let err = bad.parse::<Name>().unwrap_err();
            assert!(matches!(err, HistoryError::NotFound(_)), "{bad}");
        }
    }

    #[test]
    fn test_content_serializes_untagged() {
        let content = vec![
            Content::Node(Identity::new(NodeKind::Code, 1).at(0)),
            Content::Token(SyntaxToken {
                syntok: " =".to_string(),
            }),
        ];
        let json = serde_json::to_string(&content).unwrap();
        assert_eq!(json, r#"["s.1.0",{"syntok":" ="}]"#);
        let back: Vec<Content> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, content);
    }

    #[test]
    fn test_staged_copy_keeps_payload_and_drops_runs() {
        let mut node = Node::new(
            Identity::new(NodeKind::Markdown, 3).at(1),
            NodeBody::Markdown {
                markdown: "# Title".to_string(),
            },
        );
        node.record_run(7);

        let staged = node.to_staged();
        assert_eq!(staged.name.to_string(), "m.3.*");
        assert_eq!(staged.body, node.body);
        assert!(staged.run.is_empty());
    }

    #[test]
    fn test_body_fits_kind() {
        let body = NodeBody::Markdown {
            markdown: String::new(),
        };
        assert!(body.fits(NodeKind::Markdown));
        assert!(!body.fits(NodeKind::Code));
    }
}
