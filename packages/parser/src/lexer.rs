//! Lexer for notebook code cells using logos
//!
//! Spaces, tabs and carriage returns are skipped by the lexer; the parser recovers them from
//! lexeme spans so that syntax tokens stay lossless.

use logos::Logos;

/// Token types for cell source
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r]+")]
pub enum Token {
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    #[regex(r"'([^'\\\n]|\\.)*'")]
    Str,

    #[regex(r"#[^\r\n]*")]
    Comment,

    #[token("=")]
    Eq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,

    #[token("\n")]
    Newline,
}

impl Token {
    pub fn describe(&self) -> &'static str {
        match self {
            Token::Ident => "name",
            Token::Number => "number",
            Token::Str => "string",
            Token::Comment => "comment",
            Token::Eq => "'='",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::Comma => "','",
            Token::Newline => "newline",
        }
    }
}

/// A lexeme with its byte span in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lexeme {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

/// Tokenize source text. Returns the byte offset of the first invalid
/// character on failure.
pub fn tokenize(source: &str) -> Result<Vec<Lexeme>, usize> {
    let mut lexer = Token::lexer(source);
    let mut lexemes = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => lexemes.push(Lexeme {
                token,
                start: span.start,
                end: span.end,
            }),
            Err(()) => return Err(span.start),
        }
    }

    Ok(lexemes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|l| l.token)
            .collect()
    }

    #[test]
    fn test_assignment_tokens() {
        assert_eq!(
            kinds("x = 1"),
            vec![Token::Ident, Token::Eq, Token::Number]
        );
    }

    #[test]
    fn test_newlines_are_kept() {
        assert_eq!(
            kinds("a\nb"),
            vec![Token::Ident, Token::Newline, Token::Ident]
        );
    }

    #[test]
    fn test_comment_runs_to_end_of_line() {
        let lexemes = tokenize("x # note here\ny").unwrap();
        assert_eq!(lexemes[1].token, Token::Comment);
        assert_eq!(lexemes[1].start, 2);
        assert_eq!(lexemes[1].end, 13);
    }

    #[test]
    fn test_comment_stops_before_carriage_return() {
        let lexemes = tokenize("x # c\r\ny").unwrap();
        assert_eq!(lexemes[1].end, 5);
        assert_eq!(lexemes[2].token, Token::Newline);
    }

    #[test]
    fn test_invalid_character_reports_offset() {
        assert_eq!(tokenize("x = $"), Err(4));
    }
}
