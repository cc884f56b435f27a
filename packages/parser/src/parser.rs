//! Recursive descent parser for cell source.
//!
//! Grammar (one statement per line, newlines allowed inside parentheses):
//!
//! ```text
//! module     := (statement? comment? NEWLINE)*
//! statement  := NAME '=' expr | expr
//! expr       := term (('+' | '-') term)*
//! term       := unary (('*' | '/') unary)*
//! unary      := '-' unary | postfix
//! postfix    := atom ('(' (expr (',' expr)*)? ')')?
//! atom       := NAME | NUMBER | STRING | '(' expr ')'
//! ```
//!
//! Whitespace before a structural node is not stored anywhere: the node's
//! `start` position recovers it. Whitespace before a syntax token is folded
//! into the token text.

use crate::error::{ParseError, ParseResult};
use crate::lexer::{tokenize, Lexeme, Token};
use crate::tree::{ParseItem, ParseTree, Position, TokenSymbol};

/// Maps byte offsets to line/character positions
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    pub fn position(&self, source: &str, offset: usize) -> Position {
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let line_start = self.line_starts[line];
        let ch = source[line_start..offset].chars().count();
        Position::new(line as u32, ch as u32)
    }

    /// Byte offset of `pos`; positions past the end clamp to `source.len()`
    pub fn offset(&self, source: &str, pos: Position) -> usize {
        let Some(&line_start) = self.line_starts.get(pos.line as usize) else {
            return source.len();
        };
        source[line_start..]
            .char_indices()
            .nth(pos.ch as usize)
            .map_or(source.len(), |(i, _)| line_start + i)
    }
}

pub struct Parser<'src> {
    source: &'src str,
    lexemes: Vec<Lexeme>,
    index: LineIndex,
    pos: usize,
    /// End offset of the last consumed lexeme (or start of the current node)
    prev_end: usize,
    /// Parenthesis depth; newlines are insignificant while > 0
    depth: usize,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> ParseResult<Self> {
        let index = LineIndex::new(source);
        let lexemes = tokenize(source).map_err(|offset| {
            ParseError::invalid_token(index.position(source, offset), offset)
        })?;

        Ok(Self {
            source,
            lexemes,
            index,
            pos: 0,
            prev_end: 0,
            depth: 0,
        })
    }

    pub fn parse_module(&mut self) -> ParseResult<ParseTree> {
        let mut module = ParseTree::new(
            "Module",
            Position::default(),
            self.position(self.source.len()),
        );

        loop {
            while let Some(lexeme) = self.peek_raw() {
                if lexeme.token != Token::Newline {
                    break;
                }
                self.pos += 1;
            }

            let Some(lexeme) = self.peek_raw() else {
                break;
            };

            if lexeme.token != Token::Comment {
                let statement = self.parse_statement()?;
                module.content.push(ParseItem::Tree(statement));
            }

            if let Some(comment) = self.peek_raw().filter(|l| l.token == Token::Comment) {
                self.pos += 1;
                module.content.push(ParseItem::Tree(self.leaf("Comment", comment)));
            }

            match self.peek_raw() {
                None => break,
                Some(lexeme) if lexeme.token == Token::Newline => self.pos += 1,
                Some(lexeme) => return Err(self.unexpected(lexeme, "end of line")),
            }
        }

        keep_layout(&mut module, self.source, &self.index);
        Ok(module)
    }

    fn parse_statement(&mut self) -> ParseResult<ParseTree> {
        let first = self.expect_any("statement")?;
        self.begin_node(first);

        let is_assign = first.token == Token::Ident
            && self
                .lexemes
                .get(self.pos + 1)
                .is_some_and(|next| next.token == Token::Eq);

        if is_assign {
            self.advance();
            let target = self.leaf("Name", first);
            let eq = self.token(Token::Eq, "'='")?;
            let value = self.parse_expr()?;
            let mut node = ParseTree::new("Assign", target.start, value.end);
            node.content = vec![ParseItem::Tree(target), eq, ParseItem::Tree(value)];
            return Ok(node);
        }

        let value = self.parse_expr()?;
        let mut node = ParseTree::new("Expr", value.start, value.end);
        node.content.push(ParseItem::Tree(value));
        Ok(node)
    }

    fn parse_expr(&mut self) -> ParseResult<ParseTree> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.peek().filter(|l| matches!(l.token, Token::Plus | Token::Minus)) {
            let op = self.token(op.token, op.token.describe())?;
            let right = self.parse_term()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> ParseResult<ParseTree> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek().filter(|l| matches!(l.token, Token::Star | Token::Slash)) {
            let op = self.token(op.token, op.token.describe())?;
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<ParseTree> {
        let first = self.expect_any("expression")?;
        if first.token != Token::Minus {
            return self.parse_postfix();
        }

        self.begin_node(first);
        let start = self.position(first.start);
        let minus = self.token(Token::Minus, "'-'")?;
        let operand = self.parse_unary()?;
        let mut node = ParseTree::new("UnaryOp", start, operand.end);
        node.content = vec![minus, ParseItem::Tree(operand)];
        Ok(node)
    }

    fn parse_postfix(&mut self) -> ParseResult<ParseTree> {
        let atom = self.parse_atom()?;
        let is_call = atom.node_type == "Name"
            && self.peek().is_some_and(|l| l.token == Token::LParen);
        if !is_call {
            return Ok(atom);
        }

        let start = atom.start;
        let mut content = vec![ParseItem::Tree(atom), self.open_paren()?];

        if self.peek().is_some_and(|l| l.token != Token::RParen) {
            content.push(ParseItem::Tree(self.parse_expr()?));
            while self.peek().is_some_and(|l| l.token == Token::Comma) {
                content.push(self.token(Token::Comma, "','")?);
                content.push(ParseItem::Tree(self.parse_expr()?));
            }
        }

        content.push(self.close_paren()?);
        let mut node = ParseTree::new("Call", start, self.position(self.prev_end));
        node.content = content;
        Ok(node)
    }

    fn parse_atom(&mut self) -> ParseResult<ParseTree> {
        let lexeme = self.expect_any("expression")?;
        self.begin_node(lexeme);

        match lexeme.token {
            Token::Ident => {
                self.advance();
                Ok(self.leaf("Name", lexeme))
            }
            Token::Number => {
                self.advance();
                Ok(self.leaf("Number", lexeme))
            }
            Token::Str => {
                self.advance();
                Ok(self.leaf("Str", lexeme))
            }
            Token::LParen => {
                let start = self.position(lexeme.start);
                let open = self.open_paren()?;
                let inner = self.parse_expr()?;
                let close = self.close_paren()?;
                let mut node = ParseTree::new("Paren", start, self.position(self.prev_end));
                node.content = vec![open, ParseItem::Tree(inner), close];
                Ok(node)
            }
            _ => Err(self.unexpected(lexeme, "expression")),
        }
    }

    fn open_paren(&mut self) -> ParseResult<ParseItem> {
        let open = self.token(Token::LParen, "'('")?;
        self.depth += 1;
        Ok(open)
    }

    fn close_paren(&mut self) -> ParseResult<ParseItem> {
        let close = self.token(Token::RParen, "')'")?;
        self.depth -= 1;
        Ok(close)
    }

    /// Consume a syntax token, folding preceding whitespace into its text
    fn token(&mut self, expected: Token, describe: &str) -> ParseResult<ParseItem> {
        let lexeme = self.expect_any(describe)?;
        if lexeme.token != expected {
            return Err(self.unexpected(lexeme, describe));
        }
        let text = &self.source[self.prev_end..lexeme.end];
        self.advance();
        Ok(ParseItem::Token(TokenSymbol::new(text)))
    }

    fn leaf(&self, node_type: &str, lexeme: Lexeme) -> ParseTree {
        ParseTree::leaf(
            node_type,
            self.position(lexeme.start),
            self.position(lexeme.end),
            &self.source[lexeme.start..lexeme.end],
        )
    }

    /// Whitespace before a structural node belongs to its start position
    fn begin_node(&mut self, first: Lexeme) {
        self.prev_end = first.start;
    }

    fn advance(&mut self) {
        if let Some(index) = self.peek_index() {
            self.prev_end = self.lexemes[index].end;
            self.pos = index + 1;
        }
    }

    fn peek_raw(&self) -> Option<Lexeme> {
        self.lexemes.get(self.pos).copied()
    }

    /// Index of the next significant lexeme; newlines are skipped inside parentheses
    fn peek_index(&self) -> Option<usize> {
        self.lexemes[self.pos..]
            .iter()
            .position(|l| self.depth == 0 || l.token != Token::Newline)
            .map(|i| self.pos + i)
    }

    fn peek(&self) -> Option<Lexeme> {
        self.peek_index().map(|i| self.lexemes[i])
    }

    fn expect_any(&self, expected: &str) -> ParseResult<Lexeme> {
        match self.peek() {
            Some(lexeme) if lexeme.token != Token::Newline => Ok(lexeme),
            Some(lexeme) => Err(self.unexpected(lexeme, expected)),
            None => Err(ParseError::unexpected_eof(
                self.position(self.source.len()),
                self.source.len(),
                expected,
            )),
        }
    }

    fn unexpected(&self, lexeme: Lexeme, expected: &str) -> ParseError {
        ParseError::unexpected_token(
            self.position(lexeme.start),
            lexeme.start,
            expected,
            lexeme.token.describe(),
        )
    }

    fn position(&self, offset: usize) -> Position {
        self.index.position(self.source, offset)
    }
}

fn binary(left: ParseTree, op: ParseItem, right: ParseTree) -> ParseTree {
    let mut node = ParseTree::new("BinOp", left.start, right.end);
    node.content = vec![ParseItem::Tree(left), op, ParseItem::Tree(right)];
    node
}

/// Store gaps between items as syntax tokens wherever a renderer padding
/// with newlines and spaces would not reproduce them (`\r`, tabs, trailing
/// spaces before a line break).
fn keep_layout(tree: &mut ParseTree, source: &str, index: &LineIndex) {
    let mut cursor = index.offset(source, tree.start);
    let mut content = Vec::with_capacity(tree.content.len());
    for item in std::mem::take(&mut tree.content) {
        match item {
            ParseItem::Token(token) => {
                cursor += token.syntok.len();
                content.push(ParseItem::Token(token));
            }
            ParseItem::Tree(mut child) => {
                let start = index.offset(source, child.start);
                push_gap(&mut content, source.get(cursor..start));
                keep_layout(&mut child, source, index);
                cursor = index.offset(source, child.end);
                content.push(ParseItem::Tree(child));
            }
        }
    }
    if tree.literal.is_none() {
        let end = index.offset(source, tree.end);
        push_gap(&mut content, source.get(cursor..end));
    }
    tree.content = content;
}

fn push_gap(content: &mut Vec<ParseItem>, gap: Option<&str>) {
    let Some(gap) = gap else {
        return;
    };
    if !gap.trim_start_matches('\n').bytes().all(|b| b == b' ') {
        content.push(ParseItem::Token(TokenSymbol::new(gap)));
    }
}

/// Parse cell source into a `Module` tree
pub fn parse(source: &str) -> ParseResult<ParseTree> {
    Parser::new(source)?.parse_module()
}
