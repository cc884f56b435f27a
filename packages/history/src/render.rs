//! Source rendering: rebuild cell text from a snapshot.
//!
//! Structural children are padded out to their recorded start position;
//! syntax tokens are emitted verbatim since they carry their own leading
//! whitespace.

use nbhist_parser::Position;

use crate::errors::{HistoryError, HistoryResult};
use crate::history::History;
use crate::node::{Content, Name, NodeBody};
use crate::store::NodeStore;

struct Renderer<'a> {
    store: &'a NodeStore,
    out: String,
    cursor: Position,
}

impl<'a> Renderer<'a> {
    fn new(store: &'a NodeStore, cursor: Position) -> Self {
        Self {
            store,
            out: String::new(),
            cursor,
        }
    }

    fn pad_to(&mut self, target: Position) {
        if target.line > self.cursor.line {
            for _ in self.cursor.line..target.line {
                self.out.push('\n');
            }
            self.cursor = Position::new(target.line, 0);
        }
        if target.line == self.cursor.line && target.ch > self.cursor.ch {
            for _ in self.cursor.ch..target.ch {
                self.out.push(' ');
            }
            self.cursor.ch = target.ch;
        }
    }

    fn emit(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.cursor = Position::new(self.cursor.line + 1, 0);
            } else {
                self.cursor.ch += 1;
            }
        }
        self.out.push_str(text);
    }

    fn code(&mut self, name: &Name) -> HistoryResult<()> {
        let node = self.store.get(name)?;
        let data = node
            .code()
            .ok_or_else(|| HistoryError::Inconsistent(format!("{name} is not a code node")))?;

        self.pad_to(data.start);
        if let Some(literal) = &data.literal {
            self.emit(literal);
        }
        for item in &data.content {
            match item {
                Content::Token(token) => self.emit(&token.syntok),
                Content::Node(child) => self.code(child)?,
            }
        }
        self.pad_to(data.end);
        Ok(())
    }
}

/// Render the source text of any snapshot
pub fn render(store: &NodeStore, name: &Name) -> HistoryResult<String> {
    let node = store.get(name)?;
    match &node.body {
        NodeBody::Code(data) => {
            let mut renderer = Renderer::new(store, data.start);
            renderer.code(name)?;
            Ok(renderer.out)
        }
        NodeBody::Markdown { markdown } => Ok(markdown.clone()),
        NodeBody::Output { raw, .. } => Ok(raw.to_string()),
        NodeBody::Notebook { cells } => {
            let cells = cells
                .iter()
                .map(|cell| render(store, cell))
                .collect::<HistoryResult<Vec<_>>>()?;
            Ok(cells.join("\n\n"))
        }
    }
}

impl History {
    pub fn render(&self, name: &Name) -> HistoryResult<String> {
        render(&self.store, name)
    }
}

#[cfg(test)]
mod tests {
    use crate::history::History;
    use nbhist_parser::parse;

    fn round_trip(source: &str) -> String {
        let mut history = History::new();
        let tree = parse(source).unwrap();
        let cell = history.insert_code_cell(0, &tree, None).unwrap();
        history.render(&cell.at(0)).unwrap()
    }

    #[test]
    fn test_render_simple() {
        assert_eq!(round_trip("x = 1\ny = 2"), "x = 1\ny = 2");
    }

    #[test]
    fn test_render_keeps_layout() {
        let source = "# setup\n\nx  =  f(a,\n    b)   # note\n\nprint(x * (2 + -y))\n";
        assert_eq!(round_trip(source), source);
    }

    #[test]
    fn test_render_indented_start() {
        assert_eq!(round_trip("\n\n   total = 'a' + \"b\""), "\n\n   total = 'a' + \"b\"");
    }

    #[test]
    fn test_render_crlf_and_tabs() {
        for source in ["x = 1\r\ny = 2", "x = 1\r\n\r\ny = f(a,\r\n  b)\r\n", "x =\t1  \n\ty = 2"] {
            assert_eq!(round_trip(source), source);
        }
    }

    #[test]
    fn test_render_subtree() {
        let mut history = History::new();
        let tree = parse("x = 1\ny = g(2)").unwrap();
        let cell = history.insert_code_cell(0, &tree, None).unwrap();
        let root = history.get(&cell.at(0)).unwrap();
        let second = *root.code().unwrap().children().nth(1).unwrap();
        assert_eq!(history.render(&second).unwrap(), "y = g(2)");
    }
}
