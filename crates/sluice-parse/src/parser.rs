use crate::error::ParseError;
use crate::lexer::tokenize;
use crate::token::{Tok, TokKind};
use anyhow::Result;
use sluice_ast::ast::{
    ArmBody, BinOp, Block, ComposeMode, EnumDef, EnumMember, Expr, FieldDef, FieldPat, FnDecl,
    Ident, ImplDef, Lit, MatchArm, MethodSig, Module, Param, Pat, Stmt, StructDef, TypeExpr,
    TypeclassDef, UnOp,
};
use sluice_ast::span::Span;

/// Maximum nesting of blocks/expressions before the parser gives up.
pub const MAX_NESTING_DEPTH: u32 = 128;

/// Parse one source unit. `file` names the implicit module (its stem).
pub fn parse_str(file: &str, src: &str) -> Result<Module> {
    let toks = tokenize(src)?;
    let mut p = Parser::new(toks);
    p.parse_module(module_name(file))
}

/// `src/app/main.sl` -> `main`
pub fn module_name(file: &str) -> String {
    std::path::Path::new(file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file)
        .to_string()
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
    depth: u32,
}

fn describe(kind: &TokKind) -> String {
    match kind {
        TokKind::Eof => "end of input".to_string(),
        TokKind::StmtEnd => "end of statement".to_string(),
        TokKind::Ident(s) => format!("identifier `{s}`"),
        TokKind::TypeName(s) => format!("type `{s}`"),
        TokKind::Int(v) => format!("integer `{v}`"),
        TokKind::Float(v) => format!("float `{v}`"),
        TokKind::Str(s) => format!("string {s:?}"),
        TokKind::Char(c) => format!("char {c:?}"),
        other => format!("{other:?}"),
    }
}

impl Parser {
    fn new(toks: Vec<Tok>) -> Self {
        Self {
            toks,
            pos: 0,
            depth: 0,
        }
    }

    fn cur(&self) -> &Tok {
        // tokenize() always ends the stream with Eof
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn nxt(&self) -> &TokKind {
        &self.toks[(self.pos + 1).min(self.toks.len() - 1)].kind
    }

    fn kind(&self) -> &TokKind {
        &self.cur().kind
    }

    fn span(&self) -> Span {
        self.cur().span
    }

    fn bump(&mut self) -> Tok {
        let t = self.cur().clone();
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn at(&self, k: &TokKind) -> bool {
        std::mem::discriminant(self.kind()) == std::mem::discriminant(k)
    }

    fn error<T>(&self, expected: impl Into<String>) -> Result<T> {
        let tok = self.cur();
        Err(ParseError {
            expected: expected.into(),
            found: describe(&tok.kind),
            line: tok.span.line,
            col: tok.span.col,
        }
        .into())
    }

    fn error_at<T>(&self, span: Span, expected: impl Into<String>, found: impl Into<String>) -> Result<T> {
        Err(ParseError {
            expected: expected.into(),
            found: found.into(),
            line: span.line,
            col: span.col,
        }
        .into())
    }

    fn expect(&mut self, k: TokKind, what: &str) -> Result<Tok> {
        if self.at(&k) {
            Ok(self.bump())
        } else {
            self.error(what)
        }
    }

    fn eat(&mut self, k: &TokKind) -> bool {
        if self.at(k) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.kind(), TokKind::StmtEnd | TokKind::Semicolon) {
            self.bump();
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return self.error(format!("nesting depth at most {MAX_NESTING_DEPTH}"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ======= module / blocks =======

    fn parse_module(&mut self, name: String) -> Result<Module> {
        let start = self.span();
        let stmts = self.parse_stmts(&TokKind::Eof)?;
        let span = start.to(self.span());
        Ok(Module {
            name,
            body: Block { stmts, span },
            span,
        })
    }

    /// Statements up to (not including) `end`.
    fn parse_stmts(&mut self, end: &TokKind) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.at(end) || self.at(&TokKind::Eof) {
                break;
            }
            stmts.push(self.parse_stmt()?);
            match self.kind() {
                TokKind::StmtEnd | TokKind::Semicolon => {
                    self.bump();
                }
                k if k == end => {}
                _ => return self.error("end of statement"),
            }
        }
        Ok(stmts)
    }

    /// Parse a block: `{ stmt* }`
    fn parse_block(&mut self) -> Result<Block> {
        self.enter()?;
        let start = self.expect(TokKind::LBrace, "`{`")?.span;
        let stmts = self.parse_stmts(&TokKind::RBrace)?;
        let end = self.expect(TokKind::RBrace, "`}`")?.span;
        self.leave();
        Ok(Block {
            stmts,
            span: start.to(end),
        })
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        match self.kind() {
            TokKind::Ident(s) => {
                let id = Ident {
                    text: s.clone(),
                    span: self.span(),
                };
                self.bump();
                Ok(id)
            }
            _ => self.error("identifier"),
        }
    }

    /// Type names may be user identifiers or the built-in type keywords.
    fn parse_type_name(&mut self) -> Result<Ident> {
        match self.kind() {
            TokKind::Ident(s) | TokKind::TypeName(s) => {
                let id = Ident {
                    text: s.clone(),
                    span: self.span(),
                };
                self.bump();
                Ok(id)
            }
            _ => self.error("type name"),
        }
    }

    // ======= statements =======

    fn parse_stmt(&mut self) -> Result<Stmt> {
        match self.kind() {
            TokKind::KwPub => {
                let start = self.bump().span;
                if self.at(&TokKind::KwFn) {
                    let mut decl = self.parse_fn_decl()?;
                    decl.is_pub = true;
                    decl.span = start.to(decl.span);
                    Ok(Stmt::Fn(decl))
                } else {
                    self.parse_var_def(start, true)
                }
            }
            TokKind::KwConst => {
                let start = self.span();
                self.parse_var_def(start, false)
            }
            TokKind::KwFn if matches!(self.nxt(), TokKind::Ident(_)) => {
                Ok(Stmt::Fn(self.parse_fn_decl()?))
            }
            TokKind::KwStruct => Ok(Stmt::Struct(self.parse_struct()?)),
            TokKind::KwEnum => Ok(Stmt::Enum(self.parse_enum()?)),
            TokKind::KwTypeclass => Ok(Stmt::Typeclass(self.parse_typeclass()?)),
            TokKind::KwImpl => Ok(Stmt::Impl(self.parse_impl()?)),
            TokKind::KwFor => self.parse_for(),
            TokKind::KwIf => self.parse_if(),
            TokKind::KwWhile => self.parse_while(),
            TokKind::KwMatch => self.parse_match(),
            TokKind::KwImport => self.parse_import(),
            TokKind::KwModule => self.parse_module_stmt(),
            TokKind::KwReturn => self.parse_return(),
            TokKind::KwBreak => Ok(Stmt::Break(self.bump().span)),
            TokKind::KwContinue => Ok(Stmt::Continue(self.bump().span)),
            TokKind::KwClass | TokKind::KwDo => self.error("statement (keyword is reserved)"),
            TokKind::Ident(_) if matches!(self.nxt(), TokKind::Colon) => {
                let start = self.span();
                self.parse_var_def(start, false)
            }
            _ => self.parse_expr_stmt(),
        }
    }

    /// `[pub] [const] name [: Type] = value`; `pub` is already consumed when `is_pub`.
    fn parse_var_def(&mut self, start: Span, is_pub: bool) -> Result<Stmt> {
        let is_const = self.eat(&TokKind::KwConst);
        let name = self.parse_ident()?;
        let ty = if self.eat(&TokKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokKind::Eq, "`=`")?;
        let value = self.parse_rhs()?;
        Ok(Stmt::Var {
            name,
            ty,
            is_const,
            is_pub,
            span: start.to(value.span()),
            value,
        })
    }

    /// Right-hand side of a binding: a bare `|` chain becomes a reusable function.
    fn parse_rhs(&mut self) -> Result<Expr> {
        let mut value = self.parse_expr_bp(0)?;
        if let Expr::Compose { mode, .. } = &mut value {
            *mode = ComposeMode::Deferred;
        }
        Ok(value)
    }

    fn parse_expr_stmt(&mut self) -> Result<Stmt> {
        let expr = self.parse_expr_bp(0)?;
        let op = match self.kind() {
            TokKind::Eq => Some(None),
            TokKind::PlusEq => Some(Some(BinOp::Add)),
            TokKind::MinusEq => Some(Some(BinOp::Sub)),
            TokKind::StarEq => Some(Some(BinOp::Mul)),
            TokKind::SlashEq => Some(Some(BinOp::Div)),
            TokKind::PercentEq => Some(Some(BinOp::Rem)),
            TokKind::CaretEq => Some(Some(BinOp::Pow)),
            _ => None,
        };
        let Some(op) = op else {
            let span = expr.span();
            return Ok(Stmt::Expr { expr, span });
        };
        if !matches!(expr, Expr::Var(_) | Expr::Index { .. } | Expr::Member { .. }) {
            return self.error_at(
                expr.span(),
                "assignable target (name, element or field)",
                "expression",
            );
        }
        self.bump(); // consume assignment operator
        let value = self.parse_rhs()?;
        Ok(Stmt::Assign {
            span: expr.span().to(value.span()),
            target: expr,
            op,
            value,
        })
    }

    fn parse_fn_decl(&mut self) -> Result<FnDecl> {
        let start = self.expect(TokKind::KwFn, "`fn`")?.span;
        let name = self.parse_ident()?;
        let params = self.parse_params()?;

        // Parse optional return type: -> Type
        let ret_ty = if self.eat(&TokKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = self.parse_block()?;

        Ok(FnDecl {
            name,
            params,
            ret_ty,
            span: start.to(body.span),
            body,
            is_pub: false,
        })
    }

    /// `(a, b: Int, …)`; duplicate names are rejected.
    fn parse_params(&mut self) -> Result<Vec<Param>> {
        self.expect(TokKind::LParen, "`(`")?;
        let mut params: Vec<Param> = Vec::new();
        while !self.at(&TokKind::RParen) {
            let name = self.parse_ident()?;
            if params.iter().any(|p| p.name.text == name.text) {
                return self.error_at(
                    name.span,
                    "distinct parameter names",
                    format!("duplicate parameter `{}`", name.text),
                );
            }
            let ty = if self.eat(&TokKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let span = match &ty {
                Some(t) => name.span.to(type_span(t)),
                None => name.span,
            };
            params.push(Param { name, ty, span });
            if !self.eat(&TokKind::Comma) {
                break;
            }
        }
        self.expect(TokKind::RParen, "`)`")?;
        Ok(params)
    }

    fn parse_type(&mut self) -> Result<TypeExpr> {
        let start = self.span();

        // Function type: fn(T1, T2) -> R
        if self.eat(&TokKind::KwFn) {
            self.expect(TokKind::LParen, "`(`")?;
            let params = self.parse_type_list(&TokKind::RParen)?;
            self.expect(TokKind::RParen, "`)`")?;
            self.expect(TokKind::Arrow, "`->`")?;
            let ret = Box::new(self.parse_type()?);
            return Ok(TypeExpr::Arrow {
                params,
                span: start.to(type_span(&ret)),
                ret,
            });
        }

        if self.eat(&TokKind::LParen) {
            let elems = self.parse_type_list(&TokKind::RParen)?;
            let end = self.expect(TokKind::RParen, "`)`")?.span;
            return Ok(TypeExpr::Tuple(elems, start.to(end)));
        }

        let name = self.parse_type_name()?;
        let mut end = name.span;
        let args = if self.eat(&TokKind::Lt) {
            let args = self.parse_type_list(&TokKind::Gt)?;
            end = self.expect(TokKind::Gt, "`>`")?.span;
            args
        } else {
            Vec::new()
        };
        Ok(TypeExpr::Named {
            name,
            args,
            span: start.to(end),
        })
    }

    fn parse_type_list(&mut self, close: &TokKind) -> Result<Vec<TypeExpr>> {
        let mut tys = Vec::new();
        while !self.at(close) {
            tys.push(self.parse_type()?);
            if !self.eat(&TokKind::Comma) {
                break;
            }
        }
        Ok(tys)
    }

    /// Optional `derives [A, B]` (brackets optional).
    fn parse_derives(&mut self) -> Result<Vec<Ident>> {
        if !self.eat(&TokKind::KwDerives) {
            return Ok(Vec::new());
        }
        let bracketed = self.eat(&TokKind::LBracket);
        let mut names = vec![self.parse_type_name()?];
        while self.eat(&TokKind::Comma) {
            names.push(self.parse_type_name()?);
        }
        if bracketed {
            self.expect(TokKind::RBracket, "`]`")?;
        }
        Ok(names)
    }

    /// Consume an optional separator inside a `{ … }` list.
    fn list_separator(&mut self) {
        while matches!(
            self.kind(),
            TokKind::Comma | TokKind::StmtEnd | TokKind::Semicolon
        ) {
            self.bump();
        }
    }

    fn parse_struct(&mut self) -> Result<StructDef> {
        let start = self.expect(TokKind::KwStruct, "`struct`")?.span;
        let name = self.parse_type_name()?;
        let derives = self.parse_derives()?;
        self.expect(TokKind::LBrace, "`{`")?;
        let mut fields: Vec<FieldDef> = Vec::new();
        self.list_separator();
        while !self.at(&TokKind::RBrace) {
            let fname = self.parse_ident()?;
            if fields.iter().any(|f| f.name.text == fname.text) {
                return self.error_at(
                    fname.span,
                    "distinct field names",
                    format!("duplicate field `{}`", fname.text),
                );
            }
            self.expect(TokKind::Colon, "`:`")?;
            let ty = self.parse_type()?;
            fields.push(FieldDef { name: fname, ty });
            self.list_separator();
        }
        let end = self.expect(TokKind::RBrace, "`}`")?.span;
        Ok(StructDef {
            name,
            fields,
            derives,
            span: start.to(end),
        })
    }

    fn parse_enum(&mut self) -> Result<EnumDef> {
        let start = self.expect(TokKind::KwEnum, "`enum`")?.span;
        let name = self.parse_type_name()?;
        let derives = self.parse_derives()?;
        self.expect(TokKind::LBrace, "`{`")?;
        let mut members: Vec<EnumMember> = Vec::new();
        self.list_separator();
        while !self.at(&TokKind::RBrace) {
            let mname = self.parse_ident()?;
            if members.iter().any(|m| m.name.text == mname.text) {
                return self.error_at(
                    mname.span,
                    "distinct variant names",
                    format!("duplicate variant `{}`", mname.text),
                );
            }
            let payload = if self.eat(&TokKind::LParen) {
                let mut tys = self.parse_type_list(&TokKind::RParen)?;
                let end = self.expect(TokKind::RParen, "`)`")?.span;
                match tys.len() {
                    0 => return self.error_at(end, "payload type", "`)`"),
                    1 => tys.pop(),
                    _ => Some(TypeExpr::Tuple(tys, mname.span.to(end))),
                }
            } else {
                None
            };
            members.push(EnumMember {
                name: mname,
                payload,
            });
            self.list_separator();
        }
        let end = self.expect(TokKind::RBrace, "`}`")?.span;
        Ok(EnumDef {
            name,
            members,
            derives,
            span: start.to(end),
        })
    }

    fn parse_typeclass(&mut self) -> Result<TypeclassDef> {
        let start = self.expect(TokKind::KwTypeclass, "`typeclass`")?.span;
        let name = self.parse_type_name()?;
        let derives = self.parse_derives()?;
        self.expect(TokKind::LBrace, "`{`")?;
        let mut methods: Vec<MethodSig> = Vec::new();
        self.list_separator();
        while !self.at(&TokKind::RBrace) {
            self.expect(TokKind::KwFn, "`fn`")?;
            let mname = self.parse_ident()?;
            let params = self.parse_params()?;
            if params.is_empty() {
                return self.error_at(
                    mname.span,
                    "at least one parameter (the dispatch receiver)",
                    format!("method `{}` with no parameters", mname.text),
                );
            }
            let ret_ty = if self.eat(&TokKind::Arrow) {
                Some(self.parse_type()?)
            } else {
                None
            };
            methods.push(MethodSig {
                name: mname,
                params,
                ret_ty,
            });
            self.list_separator();
        }
        let end = self.expect(TokKind::RBrace, "`}`")?.span;
        Ok(TypeclassDef {
            name,
            methods,
            derives,
            span: start.to(end),
        })
    }

    fn parse_impl(&mut self) -> Result<ImplDef> {
        let start = self.expect(TokKind::KwImpl, "`impl`")?.span;
        let typeclass = self.parse_type_name()?;
        let for_type = if self.eat(&TokKind::KwFor) {
            Some(self.parse_type_name()?)
        } else {
            None
        };
        self.expect(TokKind::LBrace, "`{`")?;
        let mut methods = Vec::new();
        self.list_separator();
        while !self.at(&TokKind::RBrace) {
            methods.push(self.parse_fn_decl()?);
            self.list_separator();
        }
        let end = self.expect(TokKind::RBrace, "`}`")?.span;
        Ok(ImplDef {
            typeclass,
            for_type,
            methods,
            span: start.to(end),
        })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        let start = self.expect(TokKind::KwFor, "`for`")?.span;
        let pat = self.parse_pattern()?;
        self.expect(TokKind::KwIn, "`in`")?;
        let iter = self.parse_expr_bp(0)?;
        let body = self.parse_block()?;
        Ok(Stmt::For {
            pat,
            iter,
            span: start.to(body.span),
            body,
        })
    }

    /// `if cond { } [else if cond2 { }]* [else { }]`
    fn parse_if(&mut self) -> Result<Stmt> {
        let start = self.expect(TokKind::KwIf, "`if`")?.span;
        let mut branches = Vec::new();
        let mut else_ = None;
        let mut end;
        loop {
            let cond = self.parse_expr_bp(0)?;
            let body = self.parse_block()?;
            end = body.span;
            branches.push((cond, body));

            // `else` may sit on the line after the closing brace
            if matches!(self.kind(), TokKind::StmtEnd) && matches!(self.nxt(), TokKind::KwElse) {
                self.bump();
            }
            if !self.eat(&TokKind::KwElse) {
                break;
            }
            if !self.eat(&TokKind::KwIf) {
                let block = self.parse_block()?;
                end = block.span;
                else_ = Some(block);
                break;
            }
        }
        Ok(Stmt::If {
            branches,
            else_,
            span: start.to(end),
        })
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        let start = self.expect(TokKind::KwWhile, "`while`")?.span;
        let cond = self.parse_expr_bp(0)?;
        let body = self.parse_block()?;
        Ok(Stmt::While {
            cond,
            span: start.to(body.span),
            body,
        })
    }

    fn parse_match(&mut self) -> Result<Stmt> {
        let start = self.expect(TokKind::KwMatch, "`match`")?.span;
        let scrutinee = self.parse_expr_bp(0)?;
        self.expect(TokKind::LBrace, "`{`")?;
        let mut arms = Vec::new();
        self.list_separator();
        while !self.at(&TokKind::RBrace) {
            let pat = self.parse_pattern()?;
            self.expect(TokKind::FatArrow, "`=>`")?;
            let body = if self.at(&TokKind::LBrace) {
                ArmBody::Block(self.parse_block()?)
            } else {
                ArmBody::Expr(self.parse_expr_bp(0)?)
            };
            let end = match &body {
                ArmBody::Block(b) => b.span,
                ArmBody::Expr(e) => e.span(),
            };
            arms.push(MatchArm {
                span: pat.span().to(end),
                pat,
                body,
            });
            self.list_separator();
        }
        let end = self.expect(TokKind::RBrace, "`}`")?.span;
        Ok(Stmt::Match {
            scrutinee,
            arms,
            span: start.to(end),
        })
    }

    /// `import name` or `import name {a, b}`
    fn parse_import(&mut self) -> Result<Stmt> {
        let start = self.expect(TokKind::KwImport, "`import`")?.span;
        let module = self.parse_ident()?;
        let mut end = module.span;
        let names = if self.eat(&TokKind::LBrace) {
            let mut names = Vec::new();
            self.list_separator();
            while !self.at(&TokKind::RBrace) {
                names.push(self.parse_type_name()?);
                self.list_separator();
            }
            end = self.expect(TokKind::RBrace, "`}`")?.span;
            Some(names)
        } else {
            None
        };
        Ok(Stmt::Import {
            module,
            names,
            span: start.to(end),
        })
    }

    fn parse_module_stmt(&mut self) -> Result<Stmt> {
        let start = self.expect(TokKind::KwModule, "`module`")?.span;
        let name = self.parse_ident()?;
        let body = self.parse_block()?;
        Ok(Stmt::Module {
            name,
            span: start.to(body.span),
            body,
        })
    }

    /// `return [expr]`
    fn parse_return(&mut self) -> Result<Stmt> {
        let start = self.expect(TokKind::KwReturn, "`return`")?.span;
        let value = if matches!(
            self.kind(),
            TokKind::StmtEnd | TokKind::Semicolon | TokKind::RBrace | TokKind::Eof
        ) {
            None
        } else {
            Some(self.parse_expr_bp(0)?)
        };
        let span = match &value {
            Some(v) => start.to(v.span()),
            None => start,
        };
        Ok(Stmt::Return { value, span })
    }

    // ======= patterns =======

    fn parse_pattern(&mut self) -> Result<Pat> {
        let span = self.span();
        match self.kind().clone() {
            TokKind::Ident(name) if name == "_" => {
                self.bump();
                Ok(Pat::Wildcard(span))
            }
            TokKind::Ident(name) if name == "Nothing" => {
                self.bump();
                Ok(Pat::Nothing(span))
            }
            TokKind::Ident(name) if name == "Just" => {
                self.bump();
                self.expect(TokKind::LParen, "`(`")?;
                let inner = self.parse_pattern()?;
                let end = self.expect(TokKind::RParen, "`)`")?.span;
                Ok(Pat::Just(Box::new(inner), span.to(end)))
            }
            TokKind::Ident(_) => {
                let name = self.parse_ident()?;
                if self.eat(&TokKind::LParen) {
                    let mut fields = Vec::new();
                    while !self.at(&TokKind::RParen) {
                        fields.push(self.parse_pattern()?);
                        if !self.eat(&TokKind::Comma) {
                            break;
                        }
                    }
                    let end = self.expect(TokKind::RParen, "`)`")?.span;
                    Ok(Pat::Variant {
                        name,
                        fields,
                        span: span.to(end),
                    })
                } else if self.eat(&TokKind::LBrace) {
                    let mut fields = Vec::new();
                    self.list_separator();
                    while !self.at(&TokKind::RBrace) {
                        let fname = self.parse_ident()?;
                        let pat = if self.eat(&TokKind::Colon) {
                            self.parse_pattern()?
                        } else {
                            Pat::Ident(fname.clone())
                        };
                        fields.push(FieldPat { name: fname, pat });
                        self.list_separator();
                    }
                    let end = self.expect(TokKind::RBrace, "`}`")?.span;
                    Ok(Pat::Struct {
                        name,
                        fields,
                        span: span.to(end),
                    })
                } else {
                    Ok(Pat::Ident(name))
                }
            }
            TokKind::LParen => {
                self.bump();
                let mut elems = Vec::new();
                let mut trailing_comma = false;
                while !self.at(&TokKind::RParen) {
                    elems.push(self.parse_pattern()?);
                    trailing_comma = self.eat(&TokKind::Comma);
                    if !trailing_comma {
                        break;
                    }
                }
                let end = self.expect(TokKind::RParen, "`)`")?.span;
                match elems.len() {
                    1 if trailing_comma => self.error_at(
                        end,
                        "tuple pattern with 0 or at least 2 elements",
                        "one-element tuple",
                    ),
                    1 => Ok(elems.remove(0)),
                    _ => Ok(Pat::Tuple(elems, span.to(end))),
                }
            }
            TokKind::Minus => {
                self.bump();
                let end = self.span();
                match self.kind().clone() {
                    TokKind::Int(v) => {
                        self.bump();
                        Ok(Pat::Literal(Lit::Int(v.wrapping_neg()), span.to(end)))
                    }
                    TokKind::Float(v) => {
                        self.bump();
                        Ok(Pat::Literal(Lit::Float(-v), span.to(end)))
                    }
                    _ => self.error("number after `-` in pattern"),
                }
            }
            _ => match self.literal() {
                Some(lit) => {
                    self.bump();
                    Ok(Pat::Literal(lit, span))
                }
                None => self.error("pattern"),
            },
        }
    }

    fn literal(&self) -> Option<Lit> {
        Some(match self.kind() {
            TokKind::Int(v) => Lit::Int(*v),
            TokKind::Float(v) => Lit::Float(*v),
            TokKind::Str(s) => Lit::Str(s.clone()),
            TokKind::Char(c) => Lit::Char(*c),
            TokKind::KwTrue => Lit::Bool(true),
            TokKind::KwFalse => Lit::Bool(false),
            TokKind::KwNull => Lit::Null,
            _ => return None,
        })
    }

    // ======= expressions (Pratt parser) =======
    //
    // Precedence (low -> high):
    //   2:  |            composition
    //   4:  ||
    //   6:  &&
    //   8:  == != < <= > >=
    //   10: or
    //   12: xor
    //   14: and
    //   16: shiftl shiftr
    //   18: + -
    //   20: * / %
    //   22: prefix not ! -
    //   24: ^
    // call, index and member access bind tighter than everything.

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        self.enter()?;
        let result = self.parse_expr_inner(min_bp);
        self.leave();
        result
    }

    fn parse_expr_inner(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_prefix()?;

        loop {
            lhs = self.parse_postfix(lhs)?;

            if self.at(&TokKind::Pipe) {
                if 2 < min_bp {
                    break;
                }
                self.bump();
                let stage = self.parse_expr_bp(3)?;
                lhs = match lhs {
                    Expr::Compose {
                        mut stages,
                        mode,
                        span,
                    } => {
                        let span = span.to(stage.span());
                        stages.push(stage);
                        Expr::Compose { stages, mode, span }
                    }
                    first => Expr::Compose {
                        span: first.span().to(stage.span()),
                        stages: vec![first, stage],
                        mode: ComposeMode::Immediate,
                    },
                };
                continue;
            }

            let (op, lbp, rbp) = match self.kind() {
                TokKind::OrOr => (BinOp::Or, 4, 5),
                TokKind::AndAnd => (BinOp::And, 6, 7),
                // equality / relational
                TokKind::EqEq => (BinOp::Eq, 8, 9),
                TokKind::BangEq => (BinOp::Ne, 8, 9),
                TokKind::Lt => (BinOp::Lt, 8, 9),
                TokKind::Le => (BinOp::Le, 8, 9),
                TokKind::Gt => (BinOp::Gt, 8, 9),
                TokKind::Ge => (BinOp::Ge, 8, 9),
                // bitwise keyword operators
                TokKind::KwOr => (BinOp::BitOr, 10, 11),
                TokKind::KwXor => (BinOp::BitXor, 12, 13),
                TokKind::KwAnd => (BinOp::BitAnd, 14, 15),
                TokKind::KwShiftl => (BinOp::Shl, 16, 17),
                TokKind::KwShiftr => (BinOp::Shr, 16, 17),
                // arithmetic
                TokKind::Plus => (BinOp::Add, 18, 19),
                TokKind::Minus => (BinOp::Sub, 18, 19),
                TokKind::Star => (BinOp::Mul, 20, 21),
                TokKind::Slash => (BinOp::Div, 20, 21),
                TokKind::Percent => (BinOp::Rem, 20, 21),
                TokKind::Caret => (BinOp::Pow, 24, 25),
                _ => break,
            };

            if lbp < min_bp {
                break;
            }
            self.bump(); // consume operator
            let rhs = self.parse_expr_bp(rbp)?;
            lhs = Expr::Binary {
                span: lhs.span().to(rhs.span()),
                lhs: Box::new(lhs),
                op,
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    /// Call, index and member access suffixes.
    fn parse_postfix(&mut self, mut lhs: Expr) -> Result<Expr> {
        loop {
            match self.kind() {
                TokKind::LParen => {
                    let args = self.parse_call_args()?;
                    let span = lhs.span().to(self.toks[self.pos - 1].span);
                    lhs = Expr::Call {
                        callee: Box::new(lhs),
                        args,
                        span,
                    };
                }
                TokKind::LBracket => {
                    self.bump();
                    let index = self.parse_expr_bp(0)?;
                    let end = self.expect(TokKind::RBracket, "`]`")?.span;
                    lhs = Expr::Index {
                        span: lhs.span().to(end),
                        base: Box::new(lhs),
                        index: Box::new(index),
                    };
                }
                TokKind::Dot => {
                    self.bump();
                    let name = self.parse_ident()?;
                    lhs = match lhs {
                        Expr::Member {
                            base,
                            mut names,
                            span,
                        } => {
                            let span = span.to(name.span);
                            names.push(name);
                            Expr::Member { base, names, span }
                        }
                        base => Expr::Member {
                            span: base.span().to(name.span),
                            base: Box::new(base),
                            names: vec![name],
                        },
                    };
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        let tok_span = self.span();

        let op = match self.kind() {
            TokKind::Bang => Some(UnOp::Not),
            TokKind::KwNot => Some(UnOp::BitNot),
            TokKind::Minus => Some(UnOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let inner = self.parse_expr_bp(22)?;
            return Ok(Expr::Unary {
                op,
                span: tok_span.to(inner.span()),
                expr: Box::new(inner),
            });
        }

        if let Some(lit) = self.literal() {
            self.bump();
            return Ok(Expr::Lit(lit, tok_span));
        }

        match self.kind() {
            TokKind::Ident(name) if name == "_" => {
                self.bump();
                Ok(Expr::Placeholder(tok_span))
            }
            TokKind::Ident(_) => Ok(Expr::Var(self.parse_ident()?)),
            TokKind::LParen => self.parse_paren(),
            TokKind::LBracket => self.parse_list(),
            TokKind::LBrace => self.parse_map(),
            TokKind::KwFn => {
                self.bump();
                let params = self.parse_params()?;
                let ret_ty = if self.eat(&TokKind::Arrow) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                let body = self.parse_block()?;
                Ok(Expr::Lambda {
                    params,
                    ret_ty,
                    span: tok_span.to(body.span),
                    body,
                })
            }
            _ => self.error("expression"),
        }
    }

    /// `()` and `(a, b, …)` are tuples; `(e)` is a grouping.
    fn parse_paren(&mut self) -> Result<Expr> {
        let start = self.expect(TokKind::LParen, "`(`")?.span;
        let mut elems = Vec::new();
        let mut trailing_comma = false;
        while !self.at(&TokKind::RParen) {
            elems.push(self.parse_expr_bp(0)?);
            trailing_comma = self.eat(&TokKind::Comma);
            if !trailing_comma {
                break;
            }
        }
        let end = self.expect(TokKind::RParen, "`)`")?.span;
        let span = start.to(end);
        match elems.len() {
            1 if trailing_comma => {
                self.error_at(end, "tuple with 0 or at least 2 elements", "one-element tuple")
            }
            1 => Ok(Expr::Paren {
                inner: Box::new(elems.remove(0)),
                span,
            }),
            _ => Ok(Expr::Tuple(elems, span)),
        }
    }

    /// `[a, b, c]` or the half-open range `[lo..hi]`
    fn parse_list(&mut self) -> Result<Expr> {
        let start = self.expect(TokKind::LBracket, "`[`")?.span;
        if self.at(&TokKind::RBracket) {
            let end = self.bump().span;
            return Ok(Expr::List(Vec::new(), start.to(end)));
        }
        let first = self.parse_expr_bp(0)?;
        if self.eat(&TokKind::DotDot) {
            let hi = self.parse_expr_bp(0)?;
            let end = self.expect(TokKind::RBracket, "`]`")?.span;
            return Ok(Expr::Range {
                lo: Box::new(first),
                hi: Box::new(hi),
                span: start.to(end),
            });
        }
        let mut items = vec![first];
        while self.eat(&TokKind::Comma) {
            if self.at(&TokKind::RBracket) {
                break;
            }
            items.push(self.parse_expr_bp(0)?);
        }
        let end = self.expect(TokKind::RBracket, "`]` or `,`")?.span;
        Ok(Expr::List(items, start.to(end)))
    }

    /// `{key: value, …}`
    fn parse_map(&mut self) -> Result<Expr> {
        let start = self.expect(TokKind::LBrace, "`{`")?.span;
        let mut entries = Vec::new();
        self.list_separator();
        while !self.at(&TokKind::RBrace) {
            let key = self.parse_expr_bp(0)?;
            self.expect(TokKind::Colon, "`:`")?;
            let value = self.parse_expr_bp(0)?;
            entries.push((key, value));
            self.list_separator();
        }
        let end = self.expect(TokKind::RBrace, "`}`")?.span;
        Ok(Expr::Map(entries, start.to(end)))
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(TokKind::LParen, "`(`")?; // we are at '('
        let mut args = Vec::new();
        while !self.at(&TokKind::RParen) {
            args.push(self.parse_expr_bp(0)?);
            if !self.eat(&TokKind::Comma) {
                break;
            }
        }
        self.expect(TokKind::RParen, "`)` or `,`")?;
        Ok(args)
    }
}

// ======= span helpers =======

fn type_span(t: &TypeExpr) -> Span {
    match t {
        TypeExpr::Named { span, .. } | TypeExpr::Arrow { span, .. } | TypeExpr::Tuple(_, span) => {
            *span
        }
    }
}
