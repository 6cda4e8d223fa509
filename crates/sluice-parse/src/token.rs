use sluice_ast::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    // trivia / eof
    Eof,
    /// Significant newline (or an explicit `;` is kept as `Semicolon`)
    StmtEnd,
    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    DotDot,
    Arrow,    // -> for function return types
    FatArrow, // => for match arms
    // assignment
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    CaretEq,
    // arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    // equality
    EqEq,
    BangEq,
    // relational
    Lt,
    Le,
    Gt,
    Ge,
    // logical
    AndAnd,
    OrOr,
    // composition
    Pipe,
    // unary
    Bang,
    // keyword operators
    KwAnd,
    KwOr,
    KwXor,
    KwNot,
    KwShiftl,
    KwShiftr,
    // idents / keywords
    Ident(String),
    /// Built-in type names: Bool Char Double Float Int Integer String
    TypeName(String),
    KwBreak,
    KwClass,
    KwConst,
    KwContinue,
    KwDerives,
    KwDo,
    KwElse,
    KwEnum,
    KwFalse,
    KwFor,
    KwFn,
    KwIf,
    KwImport,
    KwImpl,
    KwIn,
    KwMatch,
    KwModule,
    KwNull,
    KwPub,
    KwReturn,
    KwStruct,
    KwTrue,
    KwTypeclass,
    KwWhile,
    // literals
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
}

impl TokKind {
    /// Keyword table; `None` for plain identifiers.
    pub fn keyword(word: &str) -> Option<TokKind> {
        let kind = match word {
            "break" => TokKind::KwBreak,
            "class" => TokKind::KwClass,
            "const" => TokKind::KwConst,
            "continue" => TokKind::KwContinue,
            "derives" => TokKind::KwDerives,
            "do" => TokKind::KwDo,
            "else" => TokKind::KwElse,
            "enum" => TokKind::KwEnum,
            "false" => TokKind::KwFalse,
            "for" => TokKind::KwFor,
            "fn" => TokKind::KwFn,
            "if" => TokKind::KwIf,
            "import" => TokKind::KwImport,
            "impl" => TokKind::KwImpl,
            "in" => TokKind::KwIn,
            "match" => TokKind::KwMatch,
            "module" => TokKind::KwModule,
            "null" => TokKind::KwNull,
            "pub" => TokKind::KwPub,
            "return" => TokKind::KwReturn,
            "struct" => TokKind::KwStruct,
            "true" => TokKind::KwTrue,
            "typeclass" => TokKind::KwTypeclass,
            "while" => TokKind::KwWhile,
            "and" => TokKind::KwAnd,
            "or" => TokKind::KwOr,
            "xor" => TokKind::KwXor,
            "not" => TokKind::KwNot,
            "shiftl" => TokKind::KwShiftl,
            "shiftr" => TokKind::KwShiftr,
            "Bool" | "Char" | "Double" | "Float" | "Int" | "Integer" | "String" => {
                TokKind::TypeName(word.to_string())
            }
            _ => return None,
        };
        Some(kind)
    }

    /// Operators that cannot end an expression; a newline after one of
    /// these continues the statement.
    pub fn expects_operand(&self) -> bool {
        matches!(
            self,
            TokKind::Comma
                | TokKind::Colon
                | TokKind::Dot
                | TokKind::DotDot
                | TokKind::Arrow
                | TokKind::FatArrow
                | TokKind::Eq
                | TokKind::PlusEq
                | TokKind::MinusEq
                | TokKind::StarEq
                | TokKind::SlashEq
                | TokKind::PercentEq
                | TokKind::CaretEq
                | TokKind::Plus
                | TokKind::Minus
                | TokKind::Star
                | TokKind::Slash
                | TokKind::Percent
                | TokKind::Caret
                | TokKind::EqEq
                | TokKind::BangEq
                | TokKind::Lt
                | TokKind::Le
                | TokKind::Gt
                | TokKind::Ge
                | TokKind::AndAnd
                | TokKind::OrOr
                | TokKind::Pipe
                | TokKind::Bang
                | TokKind::KwAnd
                | TokKind::KwOr
                | TokKind::KwXor
                | TokKind::KwNot
                | TokKind::KwShiftl
                | TokKind::KwShiftr
        )
    }
}

#[derive(Debug, Clone)]
pub struct Tok {
    pub kind: TokKind,
    pub span: Span,
}
