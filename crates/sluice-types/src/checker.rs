// Static checks run before evaluation: constant immutability.

use std::collections::HashMap;

use sluice_ast::ast::{ArmBody, Block, Expr, FnDecl, Module, Param, Pat, Stmt};
use sluice_ast::span::Span;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    /// Assignment (plain or compound) to a name bound with `const`
    #[error("cannot reassign constant `{name}` at {span}")]
    ConstReassignment { name: String, span: Span },
}

impl CheckError {
    pub fn span(&self) -> Span {
        match self {
            CheckError::ConstReassignment { span, .. } => *span,
        }
    }
}

/// Constants the runtime binds before any program code runs.
const PRELUDE_CONSTS: &[&str] = &["args"];

fn prelude() -> HashMap<String, bool> {
    PRELUDE_CONSTS.iter().map(|n| (n.to_string(), true)).collect()
}

/// Walks a module with a scope stack mirroring the evaluator's block scopes.
/// Each scope maps a name to whether it was bound `const`.
pub struct ConstChecker {
    scopes: Vec<HashMap<String, bool>>,
    errors: Vec<CheckError>,
}

impl Default for ConstChecker {
    fn default() -> Self {
        Self {
            scopes: vec![prelude()],
            errors: Vec::new(),
        }
    }
}

/// Check a parsed module; returns every violation found, in source order.
pub fn check_module(module: &Module) -> Result<(), Vec<CheckError>> {
    let mut checker = ConstChecker::default();
    checker.block(&module.body);
    if checker.errors.is_empty() {
        Ok(())
    } else {
        Err(checker.errors)
    }
}

impl ConstChecker {
    fn with_scope(&mut self, f: impl FnOnce(&mut Self)) {
        self.scopes.push(HashMap::new());
        f(self);
        self.scopes.pop();
    }

    fn bind(&mut self, name: &str, is_const: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), is_const);
        }
    }

    fn lookup(&self, name: &str) -> Option<bool> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    fn block(&mut self, block: &Block) {
        self.with_scope(|c| {
            // declarations are visible to the whole block
            for stmt in &block.stmts {
                if let Stmt::Fn(decl) = stmt {
                    c.bind(&decl.name.text, false);
                }
            }
            for stmt in &block.stmts {
                c.stmt(stmt);
            }
        });
    }

    fn function(&mut self, params: &[Param], body: &Block) {
        self.with_scope(|c| {
            for p in params {
                c.bind(&p.name.text, false);
            }
            c.block(body);
        });
    }

    fn fn_decl(&mut self, decl: &FnDecl) {
        self.function(&decl.params, &decl.body);
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Var {
                name,
                is_const,
                value,
                span,
                ..
            } => {
                self.expr(value);
                let existing = self.scopes.last().and_then(|s| s.get(&name.text)).copied();
                if existing == Some(true) {
                    self.errors.push(CheckError::ConstReassignment {
                        name: name.text.clone(),
                        span: *span,
                    });
                }
                self.bind(&name.text, *is_const);
            }
            Stmt::Assign {
                target,
                value,
                span,
                ..
            } => {
                self.expr(value);
                match target {
                    Expr::Var(id) => match self.lookup(&id.text) {
                        Some(true) => self.errors.push(CheckError::ConstReassignment {
                            name: id.text.clone(),
                            span: *span,
                        }),
                        Some(false) => {}
                        None => self.bind(&id.text, false),
                    },
                    other => self.expr(other),
                }
            }
            Stmt::Fn(decl) => self.fn_decl(decl),
            Stmt::Impl(def) => def.methods.iter().for_each(|m| self.fn_decl(m)),
            Stmt::Struct(_) | Stmt::Enum(_) | Stmt::Typeclass(_) => {}
            Stmt::For {
                pat, iter, body, ..
            } => {
                self.expr(iter);
                self.with_scope(|c| {
                    c.bind_pattern(pat);
                    c.block(body);
                });
            }
            Stmt::If {
                branches, else_, ..
            } => {
                for (cond, body) in branches {
                    self.expr(cond);
                    self.block(body);
                }
                if let Some(b) = else_ {
                    self.block(b);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.expr(cond);
                self.block(body);
            }
            Stmt::Match {
                scrutinee, arms, ..
            } => {
                self.expr(scrutinee);
                for arm in arms {
                    self.with_scope(|c| {
                        c.bind_pattern(&arm.pat);
                        match &arm.body {
                            ArmBody::Expr(e) => c.expr(e),
                            ArmBody::Block(b) => c.block(b),
                        }
                    });
                }
            }
            Stmt::Module { body, .. } => {
                // module bodies see only the prelude, not the enclosing scopes
                let saved = std::mem::replace(&mut self.scopes, vec![prelude()]);
                self.block(body);
                self.scopes = saved;
            }
            Stmt::Import { .. } | Stmt::Break(_) | Stmt::Continue(_) => {}
            Stmt::Return { value, .. } => {
                if let Some(v) = value {
                    self.expr(v);
                }
            }
            Stmt::Expr { expr, .. } => self.expr(expr),
        }
    }

    fn bind_pattern(&mut self, pat: &Pat) {
        match pat {
            Pat::Ident(id) => self.bind(&id.text, false),
            Pat::Just(inner, _) => self.bind_pattern(inner),
            Pat::Variant { fields, .. } | Pat::Tuple(fields, _) => {
                fields.iter().for_each(|p| self.bind_pattern(p))
            }
            Pat::Struct { fields, .. } => fields.iter().for_each(|f| self.bind_pattern(&f.pat)),
            Pat::Wildcard(_) | Pat::Literal(..) | Pat::Nothing(_) => {}
        }
    }

    /// Expressions only matter for the lambda bodies they contain.
    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Lambda { params, body, .. } => self.function(params, body),
            Expr::Lit(..) | Expr::Var(_) | Expr::Placeholder(_) => {}
            Expr::Index { base, index, .. } => {
                self.expr(base);
                self.expr(index);
            }
            Expr::Member { base, .. } => self.expr(base),
            Expr::Unary { expr, .. } => self.expr(expr),
            Expr::Paren { inner, .. } => self.expr(inner),
            Expr::Call { callee, args, .. } => {
                self.expr(callee);
                args.iter().for_each(|a| self.expr(a));
            }
            Expr::Binary { lhs, rhs, .. } | Expr::Range { lo: lhs, hi: rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            Expr::List(items, _) | Expr::Tuple(items, _) => items.iter().for_each(|e| self.expr(e)),
            Expr::Compose { stages, .. } => stages.iter().for_each(|e| self.expr(e)),
            Expr::Map(entries, _) => entries.iter().for_each(|(k, v)| {
                self.expr(k);
                self.expr(v);
            }),
        }
    }
}
