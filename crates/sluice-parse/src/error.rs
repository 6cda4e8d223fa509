use thiserror::Error;

/// Failure to turn source text into tokens. Aborts the file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("lex error at {line}:{col}: {kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated char literal")]
    UnterminatedChar,
    #[error("char literal must hold exactly one character")]
    BadCharLiteral,
    #[error("malformed number literal `{0}` (digits required on both sides of '.')")]
    MalformedNumber(String),
    #[error("integer literal `{0}` out of range")]
    IntOverflow(String),
}

/// Failure to build the AST from a token stream. Aborts the file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at {line}:{col}: expected {expected}, found {found}")]
pub struct ParseError {
    pub expected: String,
    pub found: String,
    pub line: u32,
    pub col: u32,
}
