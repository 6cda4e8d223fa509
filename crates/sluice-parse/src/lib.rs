#![forbid(unsafe_code)]
#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]

mod error;
mod lexer;
mod parser;
mod token;

pub use error::{LexError, LexErrorKind, ParseError};
pub use lexer::tokenize;
pub use parser::{module_name, parse_str, MAX_NESTING_DEPTH};
pub use token::{Tok, TokKind};
