use crate::tree::Position;
use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected token at {pos}: expected {expected}, found {found}")]
    UnexpectedToken {
        pos: Position,
        offset: usize,
        expected: String,
        found: String,
    },

    #[error("Unexpected end of input at {pos}: expected {expected}")]
    UnexpectedEof {
        pos: Position,
        offset: usize,
        expected: String,
    },

    #[error("Invalid character at {pos}")]
    InvalidToken { pos: Position, offset: usize },
}

impl ParseError {
    pub fn unexpected_token(
        pos: Position,
        offset: usize,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::UnexpectedToken {
            pos,
            offset,
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unexpected_eof(pos: Position, offset: usize, expected: impl Into<String>) -> Self {
        Self::UnexpectedEof {
            pos,
            offset,
            expected: expected.into(),
        }
    }

    pub fn invalid_token(pos: Position, offset: usize) -> Self {
        Self::InvalidToken { pos, offset }
    }

    /// Byte offset into the parsed source
    pub fn offset(&self) -> usize {
        match self {
            Self::UnexpectedToken { offset, .. }
            | Self::UnexpectedEof { offset, .. }
            | Self::InvalidToken { offset, .. } => *offset,
        }
    }

    /// Render a labelled report against the source that failed to parse
    #[cfg(feature = "pretty-errors")]
    pub fn report(&self, name: &str, source: &str) -> String {
        use ariadne::{Label, Report, ReportKind, Source};

        let offset = self.offset().min(source.len());
        let end = (offset + 1).min(source.len()).max(offset);
        let mut out = Vec::new();
        let written = Report::build(ReportKind::Error, name, offset)
            .with_message(self.to_string())
            .with_label(Label::new((name, offset..end)).with_message("here"))
            .finish()
            .write((name, Source::from(source)), &mut out);

        match written {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}
