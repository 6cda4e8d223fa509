use crate::error::{LexError, LexErrorKind};
use crate::token::{Tok, TokKind};
use sluice_ast::span::Span;

/// Open delimiter kinds; newlines are insignificant directly inside `(` and `[`.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Delim {
    Paren,
    Bracket,
    Brace,
}

pub struct Lexer<'a> {
    text: &'a str,
    src: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
    delims: Vec<Delim>,
    /// True when the last emitted token leaves the statement open.
    continues: bool,
    done: bool,
    /// Open `<` of type arguments such as `List<Int>`
    type_args: u32,
    /// End offset of the last token when it could name a generic type
    type_head_end: Option<u32>,
}

/// Tokenize a whole source unit. The result always ends with `Eof`.
pub fn tokenize(src: &str) -> Result<Vec<Tok>, LexError> {
    let mut lex = Lexer::new(src);
    let mut toks = Vec::new();
    loop {
        let tok = lex.next_tok()?;
        let eof = tok.kind == TokKind::Eof;
        toks.push(tok);
        if eof {
            return Ok(toks);
        }
    }
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            text: src,
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
            delims: Vec::new(),
            continues: true,
            done: false,
            type_args: 0,
            type_head_end: None,
        }
    }

    fn bump(&mut self) -> Option<u8> {
        let b = *self.src.get(self.pos)?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if b & 0xC0 != 0x80 {
            // count chars, not UTF-8 continuation bytes
            self.col += 1;
        }
        Some(b)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }
    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn span(&self, start: usize, line: u32, col: u32) -> Span {
        Span {
            start: start as u32,
            end: self.pos as u32,
            line,
            col,
        }
    }

    fn error(&self, kind: LexErrorKind, line: u32, col: u32) -> LexError {
        LexError { kind, line, col }
    }

    fn newline_is_significant(&self) -> bool {
        if self.continues {
            return false;
        }
        !matches!(self.delims.last(), Some(Delim::Paren | Delim::Bracket))
    }

    /// Skip trivia; returns the span of a significant newline if one was crossed.
    fn skip_ws_and_comments(&mut self) -> Option<Span> {
        loop {
            match self.peek() {
                Some(b'\n') => {
                    let (start, line, col) = (self.pos, self.line, self.col);
                    self.bump();
                    if self.newline_is_significant() {
                        return Some(self.span(start, line, col));
                    }
                }
                Some(b) if (b as char).is_ascii_whitespace() => {
                    self.bump();
                }
                // line comment: //
                Some(b'/') if self.peek2() == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return None,
            }
        }
    }

    pub fn next_tok(&mut self) -> Result<Tok, LexError> {
        let tok = self.scan()?;
        let closes_type_args = tok.kind == TokKind::Gt && self.type_args > 0;
        self.track_type_args(&tok);
        self.continues = matches!(
            tok.kind,
            TokKind::StmtEnd | TokKind::Semicolon | TokKind::LBrace
        ) || (tok.kind.expects_operand() && !closes_type_args);
        Ok(tok)
    }

    /// A `<` glued to a capitalised name opens type arguments; the `>` that
    /// closes them ends a type, so a newline after it still ends the line.
    fn track_type_args(&mut self, tok: &Tok) {
        match &tok.kind {
            TokKind::Lt if self.type_head_end == Some(tok.span.start) => self.type_args += 1,
            TokKind::Gt if self.type_args > 0 => self.type_args -= 1,
            TokKind::StmtEnd | TokKind::Semicolon | TokKind::LBrace | TokKind::RBrace => {
                self.type_args = 0
            }
            _ => {}
        }
        self.type_head_end = match &tok.kind {
            TokKind::TypeName(_) => Some(tok.span.end),
            TokKind::Ident(name) if name.starts_with(|c: char| c.is_ascii_uppercase()) => {
                Some(tok.span.end)
            }
            _ => None,
        };
    }

    fn scan(&mut self) -> Result<Tok, LexError> {
        if let Some(span) = self.skip_ws_and_comments() {
            return Ok(Tok {
                kind: TokKind::StmtEnd,
                span,
            });
        }
        let (start, line, col) = (self.pos, self.line, self.col);
        let Some(b) = self.bump() else {
            // a final statement without trailing newline still gets terminated
            if !self.continues && !self.done {
                self.done = true;
                return Ok(Tok {
                    kind: TokKind::StmtEnd,
                    span: self.span(start, line, col),
                });
            }
            return Ok(Tok {
                kind: TokKind::Eof,
                span: self.span(start, line, col),
            });
        };
        let c = b as char;
        let two = |lex: &mut Self, kind: TokKind| -> Result<Tok, LexError> {
            lex.bump();
            Ok(Tok {
                kind,
                span: lex.span(start, line, col),
            })
        };

        // 2-char operators first
        match (c, self.peek().map(char::from)) {
            ('&', Some('&')) => return two(self, TokKind::AndAnd),
            ('|', Some('|')) => return two(self, TokKind::OrOr),
            ('=', Some('=')) => return two(self, TokKind::EqEq),
            ('=', Some('>')) => return two(self, TokKind::FatArrow),
            ('!', Some('=')) => return two(self, TokKind::BangEq),
            ('<', Some('=')) => return two(self, TokKind::Le),
            ('>', Some('=')) => return two(self, TokKind::Ge),
            ('-', Some('>')) => return two(self, TokKind::Arrow),
            ('+', Some('=')) => return two(self, TokKind::PlusEq),
            ('-', Some('=')) => return two(self, TokKind::MinusEq),
            ('*', Some('=')) => return two(self, TokKind::StarEq),
            ('/', Some('=')) => return two(self, TokKind::SlashEq),
            ('%', Some('=')) => return two(self, TokKind::PercentEq),
            ('^', Some('=')) => return two(self, TokKind::CaretEq),
            ('.', Some('.')) => return two(self, TokKind::DotDot),
            ('.', Some(d)) if d.is_ascii_digit() => {
                return Err(self.error(LexErrorKind::MalformedNumber(format!(".{d}")), line, col))
            }
            _ => {}
        }

        // 1-char punctuation/operators
        let single = match c {
            '(' => {
                self.delims.push(Delim::Paren);
                Some(TokKind::LParen)
            }
            '[' => {
                self.delims.push(Delim::Bracket);
                Some(TokKind::LBracket)
            }
            '{' => {
                self.delims.push(Delim::Brace);
                Some(TokKind::LBrace)
            }
            ')' => {
                self.delims.pop();
                Some(TokKind::RParen)
            }
            ']' => {
                self.delims.pop();
                Some(TokKind::RBracket)
            }
            '}' => {
                self.delims.pop();
                Some(TokKind::RBrace)
            }
            ',' => Some(TokKind::Comma),
            ':' => Some(TokKind::Colon),
            ';' => Some(TokKind::Semicolon),
            '.' => Some(TokKind::Dot),
            '+' => Some(TokKind::Plus),
            '-' => Some(TokKind::Minus),
            '*' => Some(TokKind::Star),
            '/' => Some(TokKind::Slash),
            '%' => Some(TokKind::Percent),
            '^' => Some(TokKind::Caret),
            '=' => Some(TokKind::Eq),
            '<' => Some(TokKind::Lt),
            '>' => Some(TokKind::Gt),
            '!' => Some(TokKind::Bang),
            '|' => Some(TokKind::Pipe),
            _ => None,
        };
        if let Some(k) = single {
            return Ok(Tok {
                kind: k,
                span: self.span(start, line, col),
            });
        }

        if c == '"' {
            let s = self.string_body(line, col)?;
            return Ok(Tok {
                kind: TokKind::Str(s),
                span: self.span(start, line, col),
            });
        }

        if c == '\'' {
            let ch = self.char_body(line, col)?;
            return Ok(Tok {
                kind: TokKind::Char(ch),
                span: self.span(start, line, col),
            });
        }

        // number (int/float)
        if c.is_ascii_digit() {
            let kind = self.number(start, line, col)?;
            return Ok(Tok {
                kind,
                span: self.span(start, line, col),
            });
        }

        // ident / keywords
        if c.is_ascii_alphabetic() || c == '_' {
            while let Some(p) = self.peek() {
                if p.is_ascii_alphanumeric() || p == b'_' {
                    self.bump();
                } else {
                    break;
                }
            }
            let word = &self.text[start..self.pos];
            let kind = TokKind::keyword(word).unwrap_or_else(|| TokKind::Ident(word.to_string()));
            return Ok(Tok {
                kind,
                span: self.span(start, line, col),
            });
        }

        let ch = self.text[start..].chars().next().unwrap_or(c);
        Err(self.error(LexErrorKind::UnexpectedChar(ch), line, col))
    }

    fn escape(&mut self) -> Option<char> {
        let esc = self.bump()? as char;
        Some(match esc {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '"' => '"',
            '\'' => '\'',
            '\\' => '\\',
            _ => esc,
        })
    }

    /// Body of a string literal after the opening quote. UTF-8 is copied through.
    fn string_body(&mut self, line: u32, col: u32) -> Result<String, LexError> {
        let mut s = String::new();
        let mut run_start = self.pos;
        loop {
            match self.peek() {
                None => return Err(self.error(LexErrorKind::UnterminatedString, line, col)),
                Some(b'"') => {
                    s.push_str(&self.text[run_start..self.pos]);
                    self.bump();
                    return Ok(s);
                }
                Some(b'\\') => {
                    s.push_str(&self.text[run_start..self.pos]);
                    self.bump();
                    let Some(real) = self.escape() else {
                        return Err(self.error(LexErrorKind::UnterminatedString, line, col));
                    };
                    s.push(real);
                    run_start = self.pos;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn char_body(&mut self, line: u32, col: u32) -> Result<char, LexError> {
        let ch = match self.peek() {
            None | Some(b'\n') => {
                return Err(self.error(LexErrorKind::UnterminatedChar, line, col))
            }
            Some(b'\'') => return Err(self.error(LexErrorKind::BadCharLiteral, line, col)),
            Some(b'\\') => {
                self.bump();
                self.escape()
                    .ok_or_else(|| self.error(LexErrorKind::UnterminatedChar, line, col))?
            }
            Some(_) => {
                let ch = self.text[self.pos..]
                    .chars()
                    .next()
                    .ok_or_else(|| self.error(LexErrorKind::UnterminatedChar, line, col))?;
                for _ in 0..ch.len_utf8() {
                    self.bump();
                }
                ch
            }
        };
        match self.peek() {
            Some(b'\'') => {
                self.bump();
                Ok(ch)
            }
            None | Some(b'\n') => Err(self.error(LexErrorKind::UnterminatedChar, line, col)),
            Some(_) => Err(self.error(LexErrorKind::BadCharLiteral, line, col)),
        }
    }

    fn number(&mut self, start: usize, line: u32, col: u32) -> Result<TokKind, LexError> {
        while matches!(self.peek(), Some(p) if p.is_ascii_digit()) {
            self.bump();
        }
        // `1..5` is a range, never a float
        let is_float = self.peek() == Some(b'.') && self.peek2() != Some(b'.');
        if is_float {
            self.bump();
            if !matches!(self.peek(), Some(p) if p.is_ascii_digit()) {
                let text = self.text[start..self.pos].to_string();
                return Err(self.error(LexErrorKind::MalformedNumber(text), line, col));
            }
            while matches!(self.peek(), Some(p) if p.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = &self.text[start..self.pos];
        if is_float {
            text.parse()
                .map(TokKind::Float)
                .map_err(|_| self.error(LexErrorKind::MalformedNumber(text.to_string()), line, col))
        } else {
            text.parse()
                .map(TokKind::Int)
                .map_err(|_| self.error(LexErrorKind::IntOverflow(text.to_string()), line, col))
        }
    }
}
