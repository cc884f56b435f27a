pub mod error;
pub mod lexer;
pub mod parser;
pub mod tree;

pub use error::{ParseError, ParseResult};
pub use lexer::{tokenize, Lexeme, Token};
pub use parser::{parse, LineIndex, Parser};
pub use tree::{ParseItem, ParseTree, Position, TokenSymbol};
