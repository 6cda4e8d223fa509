//! Evaluator for Sluice programs
//!
//! Implements a tree-walking interpreter over an arena of lexical scopes,
//! with closures, composition pipelines, typeclass dispatch and control flow
//! (return, break, continue).

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::rc::Rc;

use anyhow::Result;
use sluice_ast::ast::{
    ArmBody, BinOp, Block, ComposeMode, EnumDef, Expr, FnDecl, Ident, ImplDef, MatchArm, Module,
    Pat, Stmt, StructDef, TypeclassDef, UnOp,
};
use sluice_ast::span::Span;
use sluice_types::{AdtDef, Registry, TypeclassInfo};
use thiserror::Error;
use tracing::{debug, trace};

use crate::env::{Binding, ScopeId, Scopes};
use crate::host::{HostError, HostRegistry, TraceEmitter};
use crate::pattern::{lit_value, match_pattern};
use crate::stack::ensure_sufficient_stack;
use crate::value::{Closure, Constructor, FnBody, Native, Value};

/// Calls deeper than this raise `CallDepthExceeded`
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// Kinds of runtime fault. The name is what diagnostics print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    UndefinedIdentifier,
    ConstReassignment,
    ArityError,
    NonExhaustiveMatch,
    MissingImplementation,
    IndexOutOfBounds,
    KeyNotFound,
    DivisionByZero,
    TypeMismatch,
    CallDepthExceeded,
    ControlOutsideLoop,
    ReturnOutsideFunction,
    /// `derives` or `impl` rejected by the typeclass registry
    Registration,
    /// A host function failed
    Host,
}

impl FaultKind {
    pub fn name(self) -> &'static str {
        match self {
            FaultKind::UndefinedIdentifier => "UndefinedIdentifier",
            FaultKind::ConstReassignment => "ConstReassignment",
            FaultKind::ArityError => "ArityError",
            FaultKind::NonExhaustiveMatch => "NonExhaustiveMatch",
            FaultKind::MissingImplementation => "MissingImplementation",
            FaultKind::IndexOutOfBounds => "IndexOutOfBounds",
            FaultKind::KeyNotFound => "KeyNotFound",
            FaultKind::DivisionByZero => "DivisionByZero",
            FaultKind::TypeMismatch => "TypeMismatch",
            FaultKind::CallDepthExceeded => "CallDepthExceeded",
            FaultKind::ControlOutsideLoop => "ControlOutsideLoop",
            FaultKind::ReturnOutsideFunction => "ReturnOutsideFunction",
            FaultKind::Registration => "Registration",
            FaultKind::Host => "Host",
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Unrecoverable error raised while a program runs.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message} at {span}")]
pub struct RuntimeFault {
    pub kind: FaultKind,
    pub message: String,
    pub span: Span,
}

/// `exit(code)` was called. Travels as an error so every frame unwinds,
/// but it is not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("exit({0})")]
pub struct ExitRequest(pub i32);

macro_rules! fault {
    ($kind:ident, $span:expr, $($arg:tt)*) => {
        anyhow::Error::from(RuntimeFault {
            kind: FaultKind::$kind,
            message: format!($($arg)*),
            span: $span,
        })
    };
}

/// Control flow for statement execution
///
/// Used to propagate returns and loop control to the construct handling them.
#[derive(Debug, Clone)]
pub enum ControlFlow {
    /// Normal completion with the statement's value
    Value(Value),
    /// Return statement - bubbles up to function boundary
    Return(Value, Span),
    Break(Span),
    Continue(Span),
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub max_call_depth: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Everything a run needs from outside the program.
pub struct RunOptions {
    /// Bound to the constant `args`
    pub args: Vec<String>,
    /// Destination of `print` / `printf`
    pub out: Box<dyn Write>,
    pub tracer: TraceEmitter,
    pub config: RunConfig,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            out: Box::new(std::io::stdout()),
            tracer: TraceEmitter::disabled(),
            config: RunConfig::default(),
        }
    }
}

/// Parse and run a source file.
pub fn run_source(file: &str, src: &str, options: RunOptions) -> Result<Value> {
    let module = sluice_parse::parse_str(file, src)?;
    run_module(&module, options)
}

/// Run a parsed module, then its zero-parameter `main` if it declares one.
///
/// Returns `main`'s result, or the value of the module's last statement when
/// there is no `main`. An `exit(code)` call surfaces as an [`ExitRequest`]
/// error.
pub fn run_module(module: &Module, options: RunOptions) -> Result<Value> {
    let mut env = Env::new(options);
    let result = env.run(module);
    let status = match &result {
        Ok(_) => "success",
        Err(e) if e.downcast_ref::<ExitRequest>().is_some() => "exit",
        Err(_) => "error",
    };
    let finalized = env.tracer.finalize(status);
    let value = result?;
    finalized?;
    Ok(value)
}

/// One program run: scope arena, registries and host capabilities.
pub struct Env {
    scopes: Scopes,
    current: ScopeId,
    root: ScopeId,
    registry: Registry<Value>,
    /// module name -> its top-level scope
    modules: HashMap<String, ScopeId>,
    host: HostRegistry,
    out: Box<dyn Write>,
    tracer: TraceEmitter,
    config: RunConfig,
    depth: usize,
}

/// One step of an assignment target below its root variable.
enum Step {
    Index(Value, Span),
    Field(Ident),
}

impl Env {
    pub fn new(options: RunOptions) -> Self {
        let mut scopes = Scopes::new();
        let root = scopes.push(None);

        let host = HostRegistry::new();
        scopes.define(root, "Just", Value::Native(Native::Just), false);
        scopes.define(root, "Nothing", Value::Nothing, false);
        scopes.define(root, "Set", Value::Native(Native::Set), false);
        scopes.define(root, "len", Value::Native(Native::Len), false);
        for name in host.names() {
            scopes.define(root, name, Value::HostFn(name.to_string()), false);
        }
        let args = options.args.into_iter().map(Value::Str).collect();
        scopes.define(root, "args", Value::List(args), true);

        Self {
            scopes,
            current: root,
            root,
            registry: Registry::new(),
            modules: HashMap::new(),
            host,
            out: options.out,
            tracer: options.tracer,
            config: options.config,
            depth: 0,
        }
    }

    fn run(&mut self, module: &Module) -> Result<Value> {
        debug!(module = %module.name, "running module");
        let scope = self.scopes.push(Some(self.root));
        self.modules.insert(module.name.clone(), scope);
        self.current = scope;

        let last = match self.exec_stmts(&module.body.stmts)? {
            ControlFlow::Value(v) => v,
            ControlFlow::Return(_, span) => {
                return Err(fault!(ReturnOutsideFunction, span, "`return` outside of a function"))
            }
            ControlFlow::Break(span) | ControlFlow::Continue(span) => {
                return Err(fault!(ControlOutsideLoop, span, "loop control outside of a loop"))
            }
        };

        let main = match self.scopes.local(scope, "main").map(|b| &b.value) {
            Some(Value::Function(c)) if c.params.is_empty() => Rc::clone(c),
            _ => return Ok(last),
        };
        debug!("calling main");
        self.call_closure(&main, Vec::new(), module.span)
    }

    fn with_scope<T>(
        &mut self,
        parent: ScopeId,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let scope = self.scopes.push(Some(parent));
        let saved = std::mem::replace(&mut self.current, scope);
        let result = f(self);
        self.current = saved;
        self.scopes.release(scope);
        result
    }

    fn exec_block(&mut self, block: &Block) -> Result<ControlFlow> {
        let parent = self.current;
        self.with_scope(parent, |env| env.exec_stmts(&block.stmts))
    }

    /// Run statements in the current scope. Declarations are registered
    /// first; the block's value is that of its last statement.
    fn exec_stmts(&mut self, stmts: &[Stmt]) -> Result<ControlFlow> {
        self.declare(stmts)?;
        let mut last = Value::Unit;
        for stmt in stmts {
            if stmt.is_declaration() {
                last = Value::Unit;
                continue;
            }
            match self.exec_stmt(stmt)? {
                ControlFlow::Value(v) => last = v,
                other => return Ok(other),
            }
        }
        Ok(ControlFlow::Value(last))
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn declare(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            match stmt {
                Stmt::Typeclass(def) => self.declare_typeclass(def)?,
                Stmt::Struct(def) => self.declare_struct(def),
                Stmt::Enum(def) => self.declare_enum(def),
                _ => {}
            }
        }
        for stmt in stmts {
            if let Stmt::Fn(decl) = stmt {
                let closure = self.make_fn(decl);
                self.export(&decl.name.text, closure, decl.is_pub);
            }
        }
        for stmt in stmts {
            if let Stmt::Impl(def) = stmt {
                self.declare_impl(def)?;
            }
        }
        // derives are checked once every impl of the block is in place
        for stmt in stmts {
            let (name, derives, span) = match stmt {
                Stmt::Struct(d) => (&d.name.text, &d.derives, d.span),
                Stmt::Enum(d) => (&d.name.text, &d.derives, d.span),
                _ => continue,
            };
            if derives.is_empty() {
                continue;
            }
            let derives: Vec<String> = match self.registry.adts.get(name) {
                Some(def) => def.derives.clone(),
                None => continue,
            };
            self.registry
                .validate_derives(name, &derives)
                .map_err(|e| fault!(Registration, span, "{e}"))?;
        }
        Ok(())
    }

    fn export(&mut self, name: &str, value: Value, is_pub: bool) {
        self.scopes.define_binding(
            self.current,
            name.to_string(),
            Binding {
                value,
                is_const: false,
                is_pub,
            },
        );
    }

    fn declare_typeclass(&mut self, def: &TypeclassDef) -> Result<()> {
        self.registry
            .define_typeclass(TypeclassInfo::from_def(def))
            .map_err(|e| fault!(Registration, def.span, "{e}"))?;
        debug!(typeclass = %def.name.text, methods = def.methods.len(), "registered typeclass");
        for m in &def.methods {
            self.export(&m.name.text, Value::Method(m.name.text.clone()), true);
        }
        Ok(())
    }

    fn declare_struct(&mut self, def: &StructDef) {
        let adt = AdtDef::from_struct(def);
        let fields = adt
            .fields()
            .unwrap_or_default()
            .iter()
            .map(|f| f.name.clone())
            .collect();
        self.registry.adts.register(adt);
        debug!(name = %def.name.text, "registered struct");
        let ctor = Constructor::Struct {
            name: def.name.text.clone(),
            fields,
        };
        self.export(&def.name.text, Value::Constructor(Rc::new(ctor)), true);
    }

    fn declare_enum(&mut self, def: &EnumDef) {
        let adt = AdtDef::from_enum(def);
        let enum_name = def.name.text.clone();
        for variant in adt.variants().unwrap_or_default() {
            let value = match variant.arity() {
                0 => Value::Enum {
                    enum_name: enum_name.clone(),
                    variant: variant.name.clone(),
                    payload: None,
                },
                arity => Value::Constructor(Rc::new(Constructor::Variant {
                    enum_name: enum_name.clone(),
                    variant: variant.name.clone(),
                    arity,
                })),
            };
            self.export(&variant.name, value, true);
        }
        self.registry.adts.register(adt);
        debug!(name = %enum_name, "registered enum");
    }

    fn declare_impl(&mut self, def: &ImplDef) -> Result<()> {
        let methods = def
            .methods
            .iter()
            .map(|m| (m.name.text.clone(), m.params.len(), self.make_fn(m)))
            .collect();
        let for_type = def.for_type.as_ref().map(|t| t.text.as_str());
        self.registry
            .register_impl(&def.typeclass.text, for_type, methods)
            .map_err(|e| fault!(Registration, def.span, "{e}"))?;
        debug!(
            typeclass = %def.typeclass.text,
            for_type = for_type.unwrap_or("<default>"),
            "registered impl"
        );
        Ok(())
    }

    fn make_fn(&mut self, decl: &FnDecl) -> Value {
        Value::Function(Rc::new(Closure {
            name: Some(decl.name.text.clone()),
            params: decl.params.iter().map(|p| p.name.text.clone()).collect(),
            body: FnBody::Block(decl.body.clone()),
            scope: self.scopes.handle(self.current),
        }))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<ControlFlow> {
        ensure_sufficient_stack(|| self.exec_stmt_inner(stmt))
    }

    fn exec_stmt_inner(&mut self, stmt: &Stmt) -> Result<ControlFlow> {
        match stmt {
            Stmt::Var {
                name,
                is_const,
                is_pub,
                value,
                span,
                ..
            } => {
                if self
                    .scopes
                    .local(self.current, &name.text)
                    .is_some_and(|b| b.is_const)
                {
                    return Err(fault!(
                        ConstReassignment,
                        *span,
                        "cannot redefine constant `{}`",
                        name.text
                    ));
                }
                let value = self.eval_expr(value)?;
                self.scopes.define_binding(
                    self.current,
                    name.text.clone(),
                    Binding {
                        value,
                        is_const: *is_const,
                        is_pub: *is_pub,
                    },
                );
            }
            Stmt::Assign {
                target,
                op,
                value,
                span,
            } => self.assign(target, *op, value, *span)?,
            Stmt::Fn(_) | Stmt::Struct(_) | Stmt::Enum(_) | Stmt::Typeclass(_) | Stmt::Impl(_) => {}
            Stmt::For {
                pat,
                iter,
                body,
                span,
            } => {
                let iterable = self.eval_expr(iter)?;
                for item in iter_items(iterable, iter.span())? {
                    let parent = self.current;
                    let flow = self.with_scope(parent, |env| {
                        env.bind_pattern(pat, &item, *span)?;
                        env.exec_stmts(&body.stmts)
                    })?;
                    match flow {
                        ControlFlow::Break(_) => break,
                        ControlFlow::Value(_) | ControlFlow::Continue(_) => {}
                        ret @ ControlFlow::Return(..) => return Ok(ret),
                    }
                }
            }
            Stmt::If {
                branches, else_, ..
            } => {
                for (cond, body) in branches {
                    if self.eval_cond(cond)? {
                        return self.exec_block(body);
                    }
                }
                if let Some(body) = else_ {
                    return self.exec_block(body);
                }
            }
            Stmt::While { cond, body, .. } => {
                while self.eval_cond(cond)? {
                    match self.exec_block(body)? {
                        ControlFlow::Break(_) => break,
                        ControlFlow::Value(_) | ControlFlow::Continue(_) => {}
                        ret @ ControlFlow::Return(..) => return Ok(ret),
                    }
                }
            }
            Stmt::Match {
                scrutinee,
                arms,
                span,
            } => return self.exec_match(scrutinee, arms, *span),
            Stmt::Import {
                module,
                names,
                span,
            } => self.import(module, names.as_deref(), *span)?,
            Stmt::Module { name, body, .. } => self.exec_module(name, body)?,
            Stmt::Return { value, span } => {
                let v = match value {
                    Some(e) => self.eval_expr(e)?,
                    None => Value::Unit,
                };
                return Ok(ControlFlow::Return(v, *span));
            }
            Stmt::Break(span) => return Ok(ControlFlow::Break(*span)),
            Stmt::Continue(span) => return Ok(ControlFlow::Continue(*span)),
            Stmt::Expr { expr, .. } => return Ok(ControlFlow::Value(self.eval_expr(expr)?)),
        }
        Ok(ControlFlow::Value(Value::Unit))
    }

    fn eval_cond(&mut self, cond: &Expr) -> Result<bool> {
        match self.eval_expr(cond)? {
            Value::Bool(b) => Ok(b),
            other => Err(fault!(
                TypeMismatch,
                cond.span(),
                "condition must be Bool, got {}",
                other.type_tag()
            )),
        }
    }

    fn exec_match(&mut self, scrutinee: &Expr, arms: &[MatchArm], span: Span) -> Result<ControlFlow> {
        let value = self.eval_expr(scrutinee)?;
        for arm in arms {
            let Some(bindings) = match_pattern(&arm.pat, &value, &self.registry.adts) else {
                continue;
            };
            let parent = self.current;
            return self.with_scope(parent, |env| {
                env.define_bindings(bindings, arm.pat.span())?;
                match &arm.body {
                    ArmBody::Expr(e) => Ok(ControlFlow::Value(env.eval_expr(e)?)),
                    ArmBody::Block(b) => env.exec_stmts(&b.stmts),
                }
            });
        }
        Err(fault!(
            NonExhaustiveMatch,
            span,
            "no pattern matched value {}",
            value.repr()
        ))
    }

    fn bind_pattern(&mut self, pat: &Pat, value: &Value, span: Span) -> Result<()> {
        let bindings = match_pattern(pat, value, &self.registry.adts).ok_or_else(|| {
            fault!(
                TypeMismatch,
                span,
                "pattern does not match element {}",
                value.repr()
            )
        })?;
        self.define_bindings(bindings, pat.span())
    }

    fn define_bindings(&mut self, bindings: Vec<(String, Value)>, span: Span) -> Result<()> {
        let mut seen = HashSet::new();
        for (name, value) in bindings {
            if !seen.insert(name.clone()) {
                return Err(fault!(
                    TypeMismatch,
                    span,
                    "`{name}` is bound more than once in the same pattern"
                ));
            }
            self.scopes.define(self.current, name, value, false);
        }
        Ok(())
    }

    fn import(&mut self, module: &Ident, names: Option<&[Ident]>, span: Span) -> Result<()> {
        let scope = self
            .modules
            .get(&module.text)
            .copied()
            .ok_or_else(|| fault!(UndefinedIdentifier, span, "unknown module `{}`", module.text))?;
        let exports = self.scopes.exports(scope);
        let imported: Vec<(String, Value)> = match names {
            None => exports,
            Some(names) => names
                .iter()
                .map(|n| {
                    exports
                        .iter()
                        .find(|(e, _)| *e == n.text)
                        .cloned()
                        .ok_or_else(|| {
                            fault!(
                                UndefinedIdentifier,
                                n.span,
                                "module `{}` does not export `{}`",
                                module.text,
                                n.text
                            )
                        })
                })
                .collect::<Result<_>>()?,
        };
        debug!(module = %module.text, count = imported.len(), "import");
        for (name, value) in imported {
            self.scopes.define(self.current, name, value, false);
        }
        Ok(())
    }

    fn exec_module(&mut self, name: &Ident, body: &Block) -> Result<()> {
        debug!(module = %name.text, "entering module");
        let scope = self.scopes.push(Some(self.root));
        self.modules.insert(name.text.clone(), scope);
        let saved = std::mem::replace(&mut self.current, scope);
        let flow = self.exec_stmts(&body.stmts);
        self.current = saved;
        match flow? {
            ControlFlow::Value(_) => Ok(()),
            ControlFlow::Return(_, span) => Err(fault!(
                ReturnOutsideFunction,
                span,
                "`return` outside of a function"
            )),
            ControlFlow::Break(span) | ControlFlow::Continue(span) => Err(fault!(
                ControlOutsideLoop,
                span,
                "loop control outside of a loop"
            )),
        }
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    fn assign(&mut self, target: &Expr, op: Option<BinOp>, value: &Expr, span: Span) -> Result<()> {
        let (root, steps) = self.place(target)?;
        let current = match self.scopes.find(self.current, &root.text) {
            Some((_, b)) if b.is_const => {
                return Err(fault!(
                    ConstReassignment,
                    span,
                    "cannot reassign constant `{}`",
                    root.text
                ))
            }
            Some((_, b)) => Some(b.value.clone()),
            None if op.is_none() && steps.is_empty() => None,
            None => {
                return Err(fault!(
                    UndefinedIdentifier,
                    root.span,
                    "undefined variable `{}`",
                    root.text
                ))
            }
        };

        let rhs = self.eval_expr(value)?;
        let Some(old) = current else {
            // plain `=` to a fresh name declares it here
            self.scopes.define(self.current, root.text.clone(), rhs, false);
            return Ok(());
        };

        let leaf = match op {
            Some(op) => {
                let prev = get_path(&old, &steps)?;
                binary_op(op, prev, rhs, span)?
            }
            None => rhs,
        };
        let updated = set_path(old, &steps, leaf)?;
        self.scopes
            .assign(self.current, &root.text, updated)
            .map_err(|_| fault!(ConstReassignment, span, "cannot reassign `{}`", root.text))
    }

    /// Split an assignment target into its root variable and the steps below it.
    fn place(&mut self, target: &Expr) -> Result<(Ident, Vec<Step>)> {
        match target {
            Expr::Var(id) => Ok((id.clone(), Vec::new())),
            Expr::Paren { inner, .. } => self.place(inner),
            Expr::Index { base, index, .. } => {
                let (root, mut steps) = self.place(base)?;
                let key = self.eval_expr(index)?;
                steps.push(Step::Index(key, index.span()));
                Ok((root, steps))
            }
            Expr::Member { base, names, .. } => {
                let (root, mut steps) = self.place(base)?;
                steps.extend(names.iter().cloned().map(Step::Field));
                Ok((root, steps))
            }
            other => Err(fault!(
                TypeMismatch,
                other.span(),
                "invalid assignment target"
            )),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn eval_expr(&mut self, expr: &Expr) -> Result<Value> {
        ensure_sufficient_stack(|| self.eval_expr_inner(expr))
    }

    fn eval_expr_inner(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Lit(lit, _) => Ok(lit_value(lit)),
            Expr::Var(id) => self.lookup(id),
            Expr::Placeholder(span) => self
                .scopes
                .lookup(self.current, "_")
                .cloned()
                .ok_or_else(|| fault!(UndefinedIdentifier, *span, "`_` outside a composition stage")),
            Expr::Paren { inner, .. } => self.eval_expr(inner),
            Expr::Index { base, index, span } => {
                let b = self.eval_expr(base)?;
                let i = self.eval_expr(index)?;
                index_value(&b, &i, *span)
            }
            Expr::Member { base, names, .. } => {
                let mut v = self.eval_expr(base)?;
                for name in names {
                    v = self.member(v, name)?;
                }
                Ok(v)
            }
            Expr::Unary { op, expr, span } => {
                let v = self.eval_expr(expr)?;
                unary_op(*op, v, *span)
            }
            Expr::Binary { lhs, op, rhs, span } => self.eval_binary(*op, lhs, rhs, *span),
            Expr::Call { callee, args, span } => self.eval_call(callee, args, *span),
            Expr::List(items, _) => Ok(Value::List(self.eval_all(items)?)),
            Expr::Tuple(items, _) => Ok(Value::Tuple(self.eval_all(items)?)),
            Expr::Range { lo, hi, span } => match (self.eval_expr(lo)?, self.eval_expr(hi)?) {
                (Value::Int(lo), Value::Int(hi)) => Ok(Value::List((lo..hi).map(Value::Int).collect())),
                (lo, hi) => Err(fault!(
                    TypeMismatch,
                    *span,
                    "range bounds must be Int, got {} and {}",
                    lo.type_tag(),
                    hi.type_tag()
                )),
            },
            Expr::Map(entries, _) => {
                let mut map = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = self.eval_expr(k)?;
                    let value = self.eval_expr(v)?;
                    map_insert(&mut map, key, value);
                }
                Ok(Value::Map(map))
            }
            Expr::Lambda { params, body, .. } => {
                Ok(Value::Function(Rc::new(Closure {
                    name: None,
                    params: params.iter().map(|p| p.name.text.clone()).collect(),
                    body: FnBody::Block(body.clone()),
                    scope: self.scopes.handle(self.current),
                })))
            }
            Expr::Compose {
                stages,
                mode: ComposeMode::Deferred,
                ..
            } => {
                Ok(Value::Function(Rc::new(Closure {
                    name: None,
                    params: Vec::new(),
                    body: FnBody::Pipeline(stages.clone()),
                    scope: self.scopes.handle(self.current),
                })))
            }
            Expr::Compose {
                stages,
                mode: ComposeMode::Immediate,
                ..
            } => match stages.split_first() {
                Some((first, rest)) => {
                    let seed = self.eval_expr(first)?;
                    self.run_pipeline(rest, seed)
                }
                None => Ok(Value::Unit),
            },
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>> {
        exprs.iter().map(|e| self.eval_expr(e)).collect()
    }

    fn lookup(&self, id: &Ident) -> Result<Value> {
        if let Some(v) = self.scopes.lookup(self.current, &id.text) {
            return Ok(v.clone());
        }
        if self.modules.contains_key(&id.text) {
            return Ok(Value::Module(id.text.clone()));
        }
        Err(fault!(
            UndefinedIdentifier,
            id.span,
            "undefined variable `{}`",
            id.text
        ))
    }

    fn member(&self, base: Value, name: &Ident) -> Result<Value> {
        match &base {
            Value::Module(m) => self.module_export(m, name),
            Value::Struct { name: sname, .. } => base.field(&name.text).cloned().ok_or_else(|| {
                fault!(
                    UndefinedIdentifier,
                    name.span,
                    "`{sname}` has no field `{}`",
                    name.text
                )
            }),
            other => Err(fault!(
                TypeMismatch,
                name.span,
                "{} has no field `{}`",
                other.type_tag(),
                name.text
            )),
        }
    }

    fn module_export(&self, module: &str, name: &Ident) -> Result<Value> {
        let scope = self.modules.get(module).copied().ok_or_else(|| {
            fault!(UndefinedIdentifier, name.span, "unknown module `{module}`")
        })?;
        match self.scopes.local(scope, &name.text) {
            Some(b) if b.is_pub => Ok(b.value.clone()),
            _ => Err(fault!(
                UndefinedIdentifier,
                name.span,
                "module `{module}` does not export `{}`",
                name.text
            )),
        }
    }

    fn eval_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, span: Span) -> Result<Value> {
        match op {
            BinOp::And | BinOp::Or => {
                let l = match self.eval_expr(lhs)? {
                    Value::Bool(b) => b,
                    other => {
                        return Err(fault!(
                            TypeMismatch,
                            lhs.span(),
                            "`{}` expects Bool, got {}",
                            op.symbol(),
                            other.type_tag()
                        ))
                    }
                };
                if (op == BinOp::And && !l) || (op == BinOp::Or && l) {
                    return Ok(Value::Bool(l));
                }
                match self.eval_expr(rhs)? {
                    Value::Bool(r) => Ok(Value::Bool(r)),
                    other => Err(fault!(
                        TypeMismatch,
                        rhs.span(),
                        "`{}` expects Bool, got {}",
                        op.symbol(),
                        other.type_tag()
                    )),
                }
            }
            _ => {
                let l = self.eval_expr(lhs)?;
                let r = self.eval_expr(rhs)?;
                binary_op(op, l, r, span)
            }
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Result<Value> {
        if let Expr::Member { base, names, .. } = callee {
            if let Some((method, path)) = names.split_last() {
                let mut recv = self.eval_expr(base)?;
                for name in path {
                    recv = self.member(recv, name)?;
                }
                let args = self.eval_all(args)?;
                return self.call_method(recv, method, args, span);
            }
        }
        let f = self.eval_expr(callee)?;
        let args = self.eval_all(args)?;
        self.call_value(f, args, span)
    }

    /// `recv.m(args)`: a module export, a callable field, or `m(recv, args)`.
    fn call_method(
        &mut self,
        recv: Value,
        method: &Ident,
        mut args: Vec<Value>,
        span: Span,
    ) -> Result<Value> {
        if let Value::Module(m) = &recv {
            let f = self.module_export(m, method)?;
            return self.call_value(f, args, span);
        }
        if let Some(f) = recv.field(&method.text) {
            let f = f.clone();
            return self.call_value(f, args, span);
        }
        let f = match self.scopes.lookup(self.current, &method.text) {
            Some(f) => f.clone(),
            None if self.registry.method_owner(&method.text).is_some() => {
                Value::Method(method.text.clone())
            }
            None => {
                return Err(fault!(
                    UndefinedIdentifier,
                    method.span,
                    "no method `{}` for {}",
                    method.text,
                    recv.type_tag()
                ))
            }
        };
        args.insert(0, recv);
        self.call_value(f, args, span)
    }

    pub fn call_value(&mut self, f: Value, args: Vec<Value>, span: Span) -> Result<Value> {
        match f {
            Value::Function(c) => self.call_closure(&c, args, span),
            Value::Native(n) => call_native(n, args, span),
            Value::HostFn(name) => self.call_host(&name, &args, span),
            Value::Constructor(c) => construct(&c, args, span),
            Value::Method(name) => self.dispatch(&name, args, span),
            other => Err(fault!(
                TypeMismatch,
                span,
                "{} is not callable",
                other.repr()
            )),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, args: Vec<Value>, span: Span) -> Result<Value> {
        let name = closure.name.as_deref().unwrap_or("<lambda>");
        if let FnBody::Block(_) = closure.body {
            if args.len() != closure.params.len() {
                return Err(fault!(
                    ArityError,
                    span,
                    "`{name}` expects {} argument(s), got {}",
                    closure.params.len(),
                    args.len()
                ));
            }
        }
        if self.depth >= self.config.max_call_depth {
            return Err(fault!(
                CallDepthExceeded,
                span,
                "maximum call depth of {} exceeded",
                self.config.max_call_depth
            ));
        }
        trace!(callee = name, args = args.len(), depth = self.depth, "call");

        self.depth += 1;
        let result = self.with_scope(closure.scope.id(), |env| match &closure.body {
            FnBody::Block(body) => {
                for (param, arg) in closure.params.iter().zip(args) {
                    env.scopes.define(env.current, param.clone(), arg, false);
                }
                match env.exec_stmts(&body.stmts)? {
                    ControlFlow::Value(v) | ControlFlow::Return(v, _) => Ok(v),
                    ControlFlow::Break(sp) | ControlFlow::Continue(sp) => Err(fault!(
                        ControlOutsideLoop,
                        sp,
                        "loop control outside of a loop"
                    )),
                }
            }
            FnBody::Pipeline(stages) => env.call_pipeline(stages, args, span),
        });
        self.depth -= 1;
        result
    }

    /// A deferred composition: one argument is threaded through every
    /// stage; with none, the first stage supplies the seed.
    fn call_pipeline(&mut self, stages: &[Expr], args: Vec<Value>, span: Span) -> Result<Value> {
        let mut args = args.into_iter();
        match (args.next(), args.next()) {
            (Some(seed), None) => self.run_pipeline(stages, seed),
            (None, _) => match stages.split_first() {
                Some((first, rest)) => {
                    let seed = self.eval_expr(first)?;
                    self.run_pipeline(rest, seed)
                }
                None => Ok(Value::Unit),
            },
            (Some(_), Some(_)) => Err(fault!(
                ArityError,
                span,
                "composed function takes at most 1 argument, got {}",
                args.len() + 2
            )),
        }
    }

    fn run_pipeline(&mut self, stages: &[Expr], seed: Value) -> Result<Value> {
        let mut acc = seed;
        for stage in stages {
            acc = if stage.mentions_placeholder() {
                let parent = self.current;
                self.with_scope(parent, |env| {
                    env.scopes.define(env.current, "_", acc, false);
                    env.eval_expr(stage)
                })?
            } else {
                let f = self.eval_expr(stage)?;
                self.call_value(f, vec![acc], stage.span())?
            };
        }
        Ok(acc)
    }

    fn call_host(&mut self, name: &str, args: &[Value], span: Span) -> Result<Value> {
        trace!(host_fn = name, args = args.len(), "host call");
        self.host
            .dispatch_traced(name, args, &mut *self.out, &mut self.tracer)
            .map_err(|e| match e {
                HostError::Exit(code) => anyhow::Error::from(ExitRequest(code)),
                other => fault!(Host, span, "{name}: {other}"),
            })
    }

    fn dispatch(&mut self, method: &str, args: Vec<Value>, span: Span) -> Result<Value> {
        let Some(recv) = args.first() else {
            return Err(fault!(
                ArityError,
                span,
                "method `{method}` needs a receiver argument"
            ));
        };
        let tag = recv.type_tag().to_string();
        let f = self.registry.resolve(method, &tag).cloned().ok_or_else(|| {
            let typeclass = self
                .registry
                .method_owner(method)
                .map_or("?", |c| c.name.as_str());
            fault!(
                MissingImplementation,
                span,
                "no implementation of `{typeclass}.{method}` for type `{tag}`"
            )
        })?;
        trace!(method, type_tag = %tag, "dispatch");
        self.call_value(f, args, span)
    }
}

fn call_native(native: Native, args: Vec<Value>, span: Span) -> Result<Value> {
    let count = args.len();
    match (native, <[Value; 1]>::try_from(args)) {
        (Native::Just, Ok([v])) => Ok(Value::Just(Box::new(v))),
        // Set([1, 2, 2]) and Set(1, 2, 2) build the same set
        (Native::Set, Ok([Value::List(items)])) => Ok(Value::set_from(items)),
        (Native::Set, Ok([v])) => Ok(Value::set_from(vec![v])),
        (Native::Set, Err(args)) => Ok(Value::set_from(args)),
        (Native::Len, Ok([v])) => match v {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
                Ok(Value::Int(items.len() as i64))
            }
            Value::Map(entries) => Ok(Value::Int(entries.len() as i64)),
            other => Err(fault!(
                TypeMismatch,
                span,
                "len expects a collection or String, got {}",
                other.type_tag()
            )),
        },
        (n, _) => Err(fault!(
            ArityError,
            span,
            "`{}` expects 1 argument, got {count}",
            n.name()
        )),
    }
}

fn construct(ctor: &Constructor, args: Vec<Value>, span: Span) -> Result<Value> {
    match ctor {
        Constructor::Struct { name, fields } => {
            if args.len() != fields.len() {
                return Err(fault!(
                    ArityError,
                    span,
                    "`{name}` has {} field(s), got {} argument(s)",
                    fields.len(),
                    args.len()
                ));
            }
            Ok(Value::Struct {
                name: name.clone(),
                fields: fields.iter().cloned().zip(args).collect(),
            })
        }
        Constructor::Variant {
            enum_name,
            variant,
            arity,
        } => {
            if args.len() != *arity {
                return Err(fault!(
                    ArityError,
                    span,
                    "`{variant}` expects {arity} argument(s), got {}",
                    args.len()
                ));
            }
            let payload = if *arity == 1 {
                args.into_iter().next().unwrap_or(Value::Unit)
            } else {
                Value::Tuple(args)
            };
            Ok(Value::Enum {
                enum_name: enum_name.clone(),
                variant: variant.clone(),
                payload: Some(Box::new(payload)),
            })
        }
    }
}

/// Elements a `for` loop visits.
fn iter_items(v: Value, span: Span) -> Result<Vec<Value>> {
    match v {
        Value::List(items) | Value::Set(items) | Value::Tuple(items) => Ok(items),
        Value::Map(entries) => Ok(entries
            .into_iter()
            .map(|(k, v)| Value::Tuple(vec![k, v]))
            .collect()),
        Value::Str(s) => Ok(s.chars().map(Value::Char).collect()),
        other => Err(fault!(
            TypeMismatch,
            span,
            "cannot iterate over {}",
            other.type_tag()
        )),
    }
}

fn map_insert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => entries.push((key, value)),
    }
}

fn checked_index(i: i64, len: usize, span: Span) -> Result<usize> {
    usize::try_from(i)
        .ok()
        .filter(|&i| i < len)
        .ok_or_else(|| fault!(IndexOutOfBounds, span, "index {i} out of bounds for length {len}"))
}

pub fn index_value(base: &Value, index: &Value, span: Span) -> Result<Value> {
    match (base, index) {
        (Value::List(items) | Value::Tuple(items), Value::Int(i)) => {
            Ok(items[checked_index(*i, items.len(), span)?].clone())
        }
        (Value::Str(s), Value::Int(i)) => {
            let len = s.chars().count();
            let idx = checked_index(*i, len, span)?;
            Ok(s.chars().nth(idx).map_or(Value::Unit, Value::Char))
        }
        (Value::Map(entries), key) => Value::map_get(entries, key)
            .cloned()
            .ok_or_else(|| fault!(KeyNotFound, span, "key {} not found", key.repr())),
        (b, i) => Err(fault!(
            TypeMismatch,
            span,
            "cannot index {} with {}",
            b.type_tag(),
            i.type_tag()
        )),
    }
}

fn get_path(root: &Value, steps: &[Step]) -> Result<Value> {
    let mut cur = root.clone();
    for step in steps {
        cur = match step {
            Step::Index(key, span) => index_value(&cur, key, *span)?,
            Step::Field(name) => cur.field(&name.text).cloned().ok_or_else(|| {
                fault!(
                    UndefinedIdentifier,
                    name.span,
                    "{} has no field `{}`",
                    cur.type_tag(),
                    name.text
                )
            })?,
        };
    }
    Ok(cur)
}

/// Rebuild `container` with `leaf` stored at the end of `steps`.
fn set_path(container: Value, steps: &[Step], leaf: Value) -> Result<Value> {
    let Some((step, rest)) = steps.split_first() else {
        return Ok(leaf);
    };
    match (container, step) {
        (Value::List(mut items), Step::Index(Value::Int(i), span)) => {
            let idx = checked_index(*i, items.len(), *span)?;
            let child = std::mem::replace(&mut items[idx], Value::Unit);
            items[idx] = set_path(child, rest, leaf)?;
            Ok(Value::List(items))
        }
        (Value::Map(mut entries), Step::Index(key, span)) => {
            let child = match Value::map_get(&entries, key) {
                Some(v) => v.clone(),
                None if rest.is_empty() => Value::Unit,
                None => return Err(fault!(KeyNotFound, *span, "key {} not found", key.repr())),
            };
            let updated = set_path(child, rest, leaf)?;
            map_insert(&mut entries, key.clone(), updated);
            Ok(Value::Map(entries))
        }
        (Value::Struct { name, mut fields }, Step::Field(field)) => {
            let Some(slot) = fields.iter_mut().find(|(n, _)| *n == field.text) else {
                return Err(fault!(
                    UndefinedIdentifier,
                    field.span,
                    "`{name}` has no field `{}`",
                    field.text
                ));
            };
            let child = std::mem::replace(&mut slot.1, Value::Unit);
            slot.1 = set_path(child, rest, leaf)?;
            Ok(Value::Struct { name, fields })
        }
        (other, Step::Index(_, span)) => Err(fault!(
            TypeMismatch,
            *span,
            "cannot assign into an element of {}",
            other.type_tag()
        )),
        (other, Step::Field(field)) => Err(fault!(
            TypeMismatch,
            field.span,
            "cannot assign field `{}` of {}",
            field.text,
            other.type_tag()
        )),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

pub fn unary_op(op: UnOp, v: Value, span: Span) -> Result<Value> {
    match (op, v) {
        (UnOp::Not | UnOp::BitNot, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnOp::BitNot, Value::Int(n)) => Ok(Value::Int(!n)),
        (UnOp::Neg, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (op, v) => {
            let symbol = match op {
                UnOp::Not => "!",
                UnOp::BitNot => "not",
                UnOp::Neg => "-",
            };
            Err(fault!(
                TypeMismatch,
                span,
                "`{symbol}` cannot apply to {}",
                v.type_tag()
            ))
        }
    }
}

/// Apply a strict binary operator. `&&` and `||` short-circuit in the
/// evaluator before reaching here.
pub fn binary_op(op: BinOp, lhs: Value, rhs: Value, span: Span) -> Result<Value> {
    use Value::{Bool, Float, Int};
    let v = match (op, lhs, rhs) {
        (BinOp::Eq, l, r) => Bool(l == r),
        (BinOp::Ne, l, r) => Bool(l != r),
        (BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge, l, r) => {
            let ord = l.compare(&r).ok_or_else(|| {
                fault!(
                    TypeMismatch,
                    span,
                    "cannot compare {} with {}",
                    l.type_tag(),
                    r.type_tag()
                )
            })?;
            Bool(match op {
                BinOp::Lt => ord.is_lt(),
                BinOp::Le => ord.is_le(),
                BinOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            })
        }
        (BinOp::And, Bool(a), Bool(b)) => Bool(a && b),
        (BinOp::Or, Bool(a), Bool(b)) => Bool(a || b),
        (BinOp::Add, Int(a), Int(b)) => Int(a.wrapping_add(b)),
        (BinOp::Sub, Int(a), Int(b)) => Int(a.wrapping_sub(b)),
        (BinOp::Mul, Int(a), Int(b)) => Int(a.wrapping_mul(b)),
        (BinOp::Rem, Int(_), Int(0)) => {
            return Err(fault!(DivisionByZero, span, "remainder by zero"))
        }
        (BinOp::Rem, Int(a), Int(b)) => Int(a.wrapping_rem(b)),
        (BinOp::Pow, Int(a), Int(b)) if b >= 0 => match u32::try_from(b) {
            Ok(e) => Int(a.wrapping_pow(e)),
            Err(_) => Float((a as f64).powf(b as f64)),
        },
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Value::Str(a + &b),
        (BinOp::Add, Value::Str(mut a), Value::Char(c)) => {
            a.push(c);
            Value::Str(a)
        }
        (BinOp::Add, Value::Char(c), Value::Str(b)) => Value::Str(format!("{c}{b}")),
        (BinOp::Add, Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Value::List(a)
        }
        (BinOp::BitAnd, Int(a), Int(b)) => Int(a & b),
        (BinOp::BitOr, Int(a), Int(b)) => Int(a | b),
        (BinOp::BitXor, Int(a), Int(b)) => Int(a ^ b),
        (BinOp::BitAnd, Bool(a), Bool(b)) => Bool(a & b),
        (BinOp::BitOr, Bool(a), Bool(b)) => Bool(a | b),
        (BinOp::BitXor, Bool(a), Bool(b)) => Bool(a ^ b),
        (BinOp::Shl | BinOp::Shr, Int(a), Int(b)) => {
            let amount = u32::try_from(b)
                .map_err(|_| fault!(TypeMismatch, span, "negative shift amount {b}"))?;
            Int(if op == BinOp::Shl {
                a.checked_shl(amount).unwrap_or(0)
            } else {
                a.checked_shr(amount).unwrap_or(if a < 0 { -1 } else { 0 })
            })
        }
        (
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem | BinOp::Pow,
            l,
            r,
        ) => match (as_f64(&l), as_f64(&r)) {
            // `/` is always float division; x / 0 follows IEEE 754
            (Some(a), Some(b)) => Float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                BinOp::Rem => a % b,
                _ => a.powf(b),
            }),
            _ => {
                return Err(fault!(
                    TypeMismatch,
                    span,
                    "`{}` cannot apply to {} and {}",
                    op.symbol(),
                    l.type_tag(),
                    r.type_tag()
                ))
            }
        },
        (op, l, r) => {
            return Err(fault!(
                TypeMismatch,
                span,
                "`{}` cannot apply to {} and {}",
                op.symbol(),
                l.type_tag(),
                r.type_tag()
            ))
        }
    };
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::OutputBuffer;

    fn run(src: &str) -> (Result<Value>, String) {
        let out = OutputBuffer::new();
        let options = RunOptions {
            out: Box::new(out.clone()),
            ..RunOptions::default()
        };
        let result = run_source("test.sl", src, options);
        (result, out.contents())
    }

    fn value(src: &str) -> Value {
        run(src).0.unwrap()
    }

    fn fault_kind(src: &str) -> FaultKind {
        let err = run(src).0.unwrap_err();
        err.downcast_ref::<RuntimeFault>()
            .unwrap_or_else(|| panic!("expected runtime fault, got {err:#}"))
            .kind
    }

    #[test]
    fn test_eval_block_tail() {
        assert_eq!(value("x = 1\nx + 41"), Value::Int(42));
    }

    #[test]
    fn test_eval_declaration_resets_block_value() {
        assert_eq!(value("1\nfn f() { 2 }"), Value::Unit);
    }

    #[test]
    fn test_eval_if_is_expression_tail() {
        let src = "fn sign(n) {\n  if n < 0 { -1 } else if n == 0 { 0 } else { 1 }\n}\nsign(-5) + sign(9)";
        assert_eq!(value(src), Value::Int(0));
    }

    #[test]
    fn test_eval_recursive_function() {
        let src = "fn fact(n) {\n  if n <= 1 { return 1 }\n  n * fact(n - 1)\n}\nfact(10)";
        assert_eq!(value(src), Value::Int(3_628_800));
    }

    #[test]
    fn test_eval_while_with_break_and_continue() {
        let src = "i = 0\ntotal = 0\nwhile true {\n  i += 1\n  if i > 10 { break }\n  if i % 2 == 0 { continue }\n  total += i\n}\ntotal";
        assert_eq!(value(src), Value::Int(25));
    }

    #[test]
    fn test_assign_into_nested_containers() {
        let src = "grid = [[0, 0], [0, 0]]\ngrid[1][0] = 7\ngrid[1][0] += 1\ngrid";
        assert_eq!(
            value(src),
            Value::List(vec![
                Value::List(vec![Value::Int(0), Value::Int(0)]),
                Value::List(vec![Value::Int(8), Value::Int(0)]),
            ])
        );
    }

    #[test]
    fn test_assign_map_key_inserts() {
        let src = "m = {\"a\": 1}\nm[\"b\"] = 2\nm[\"a\"] += 10\nm[\"a\"] + m[\"b\"]";
        assert_eq!(value(src), Value::Int(13));
    }

    #[test]
    fn test_struct_field_assignment() {
        let src = "struct P { x: Int, y: Int }\np = P(1, 2)\np.y = 5\np.x + p.y";
        assert_eq!(value(src), Value::Int(6));
    }

    #[test]
    fn test_closures_share_captured_scope() {
        let src = "fn counter() {\n  n = 0\n  inc = fn() { n += 1\n n }\n  get = fn() { n }\n  (inc, get)\n}\npair = counter()\ninc = pair[0]\nget = pair[1]\ninc()\ninc()\nget()";
        assert_eq!(value(src), Value::Int(2));
    }

    #[test]
    fn test_placeholder_is_scoped_to_stage() {
        let (result, _) = run("5 | _ + 1\n_");
        let err = result.unwrap_err();
        let fault = err.downcast_ref::<RuntimeFault>().unwrap();
        assert_eq!(fault.kind, FaultKind::UndefinedIdentifier);
    }

    #[test]
    fn test_deferred_composition_with_and_without_argument() {
        let src = "fn double(n) { n * 2 }\nf = double | double\nx = double(10) | double\n[f(3), x()]";
        assert_eq!(value(src), Value::List(vec![Value::Int(12), Value::Int(40)]));
    }

    #[test]
    fn test_deferred_composition_rejects_two_arguments() {
        let src = "fn double(n) { n * 2 }\nf = double | double\nf(1, 2)";
        assert_eq!(fault_kind(src), FaultKind::ArityError);
    }

    #[test]
    fn test_binary_ops() {
        let sp = Span::default();
        let cases = [
            (BinOp::Div, Value::Int(7), Value::Int(2), Value::Float(3.5)),
            (BinOp::Pow, Value::Int(2), Value::Int(10), Value::Int(1024)),
            (BinOp::Pow, Value::Int(2), Value::Int(-1), Value::Float(0.5)),
            (BinOp::BitXor, Value::Int(6), Value::Int(3), Value::Int(5)),
            (BinOp::Shl, Value::Int(1), Value::Int(4), Value::Int(16)),
            (BinOp::BitAnd, Value::Bool(true), Value::Bool(false), Value::Bool(false)),
            (BinOp::Rem, Value::Int(-7), Value::Int(3), Value::Int(-1)),
            (
                BinOp::Add,
                Value::Str("ab".into()),
                Value::Char('c'),
                Value::Str("abc".into()),
            ),
        ];
        for (op, l, r, expected) in cases {
            assert_eq!(binary_op(op, l, r, sp).unwrap(), expected, "{op:?}");
        }
    }

    #[test]
    fn test_division_by_zero_is_ieee() {
        let v = binary_op(BinOp::Div, Value::Int(1), Value::Int(0), Span::default()).unwrap();
        assert_eq!(v, Value::Float(f64::INFINITY));
        assert_eq!(fault_kind("5 % 0"), FaultKind::DivisionByZero);
    }

    #[test]
    fn test_closure_scopes_are_reclaimed() {
        let live_after = |iterations: usize| {
            let src = format!(
                "fn adder(k) {{\n  fn(x) {{ x + k }}\n}}\ni = 0\nwhile i < {iterations} {{\n  f = adder(i)\n  f(1)\n  i += 1\n}}\n"
            );
            let module = sluice_parse::parse_str("test.sl", &src).unwrap();
            let mut env = Env::new(RunOptions {
                out: Box::new(OutputBuffer::new()),
                ..RunOptions::default()
            });
            env.run(&module).unwrap();
            env.scopes.live()
        };
        let few = live_after(10);
        let many = live_after(5000);
        assert!(many <= few + 64, "{few} scopes after 10 closures, {many} after 5000");
    }

    #[test]
    fn test_wide_shifts_saturate() {
        let sp = Span::default();
        let shift = |op, a, b| binary_op(op, Value::Int(a), Value::Int(b), sp).unwrap();
        assert_eq!(shift(BinOp::Shl, 1, 64), Value::Int(0));
        assert_eq!(shift(BinOp::Shr, -8, 70), Value::Int(-1));
        assert_eq!(shift(BinOp::Shr, 8, 64), Value::Int(0));
        assert_eq!(fault_kind("1 shiftl -1"), FaultKind::TypeMismatch);
    }

    #[test]
    fn test_logical_ops_short_circuit_and_require_bool() {
        // rhs would fault if evaluated
        assert_eq!(value("false && undefined_name"), Value::Bool(false));
        assert_eq!(value("true || undefined_name"), Value::Bool(true));
        assert_eq!(fault_kind("1 && true"), FaultKind::TypeMismatch);
    }

    #[test]
    fn test_unbound_names_fault() {
        assert_eq!(fault_kind("y += 1"), FaultKind::UndefinedIdentifier);
        assert_eq!(fault_kind("print(nope)"), FaultKind::UndefinedIdentifier);
    }

    #[test]
    fn test_control_outside_loop() {
        assert_eq!(fault_kind("break"), FaultKind::ControlOutsideLoop);
        assert_eq!(
            fault_kind("fn f() { continue }\nwhile true { f() }"),
            FaultKind::ControlOutsideLoop
        );
        assert_eq!(fault_kind("return 1"), FaultKind::ReturnOutsideFunction);
    }

    #[test]
    fn test_duplicate_pattern_binding() {
        assert_eq!(
            fault_kind("match (1, 2) { (a, a) => a }"),
            FaultKind::TypeMismatch
        );
    }

    #[test]
    fn test_call_depth_limit() {
        let out = OutputBuffer::new();
        let options = RunOptions {
            out: Box::new(out),
            config: RunConfig { max_call_depth: 20 },
            ..RunOptions::default()
        };
        let err = run_source("t.sl", "fn down(n) { down(n + 1) }\ndown(0)", options).unwrap_err();
        assert_eq!(
            err.downcast_ref::<RuntimeFault>().map(|f| f.kind),
            Some(FaultKind::CallDepthExceeded)
        );
    }

    #[test]
    fn test_exit_request_unwinds() {
        let (result, out) = run("print(\"before\")\nexit(4)\nprint(\"after\")");
        let err = result.unwrap_err();
        assert_eq!(err.downcast_ref::<ExitRequest>(), Some(&ExitRequest(4)));
        assert_eq!(out, "before\n");
    }

    #[test]
    fn test_main_runs_after_top_level() {
        let (result, out) = run("fn main() {\n  print(\"main\")\n  7\n}\nprint(\"top\")");
        assert_eq!(result.unwrap(), Value::Int(7));
        assert_eq!(out, "top\nmain\n");
    }
}
