pub mod span {
    use serde::Serialize;

    /// Byte range plus the 1-based line/column of its first byte.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
    pub struct Span {
        pub start: u32,
        pub end: u32,
        pub line: u32,
        pub col: u32,
    }

    impl Span {
        /// Span covering `self` through `other`.
        pub fn to(self, other: Span) -> Span {
            Span {
                start: self.start,
                end: other.end.max(self.end),
                line: self.line,
                col: self.col,
            }
        }
    }

    impl std::fmt::Display for Span {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}:{}", self.line, self.col)
        }
    }
}

pub mod ast {
    use super::span::Span;
    use serde::Serialize;

    /// One source unit. Files without a `module` statement are an implicit
    /// module named after the file stem.
    #[derive(Debug, Clone, Serialize)]
    pub struct Module {
        pub name: String,
        pub body: Block,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct Block {
        pub stmts: Vec<Stmt>,
        pub span: Span,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct Ident {
        pub text: String,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct Param {
        pub name: Ident,
        pub ty: Option<TypeExpr>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize)]
    pub enum TypeExpr {
        /// `Int`, `List<Int>`, `Option<String>`
        Named {
            name: Ident,
            args: Vec<TypeExpr>,
            span: Span,
        },
        Arrow {
            // fn(A, B, C) -> R
            params: Vec<TypeExpr>,
            ret: Box<TypeExpr>,
            span: Span,
        },
        Tuple(Vec<TypeExpr>, Span),
    }

    impl TypeExpr {
        /// Head name of a named type, e.g. `List` for `List<Int>`.
        pub fn head(&self) -> Option<&str> {
            match self {
                TypeExpr::Named { name, .. } => Some(&name.text),
                _ => None,
            }
        }
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct FnDecl {
        pub name: Ident,
        pub params: Vec<Param>,
        pub ret_ty: Option<TypeExpr>,
        pub body: Block,
        pub is_pub: bool,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct FieldDef {
        pub name: Ident,
        pub ty: TypeExpr,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct StructDef {
        pub name: Ident,
        pub fields: Vec<FieldDef>,
        pub derives: Vec<Ident>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct EnumMember {
        pub name: Ident,
        pub payload: Option<TypeExpr>,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct EnumDef {
        pub name: Ident,
        pub members: Vec<EnumMember>,
        pub derives: Vec<Ident>,
        pub span: Span,
    }

    /// Required method of a typeclass: `fn show(self) -> String`
    #[derive(Debug, Clone, Serialize)]
    pub struct MethodSig {
        pub name: Ident,
        pub params: Vec<Param>,
        pub ret_ty: Option<TypeExpr>,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct TypeclassDef {
        pub name: Ident,
        pub methods: Vec<MethodSig>,
        pub derives: Vec<Ident>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct ImplDef {
        pub typeclass: Ident,
        /// `None` for a default impl that applies to every type.
        pub for_type: Option<Ident>,
        pub methods: Vec<FnDecl>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct MatchArm {
        pub pat: Pat,
        pub body: ArmBody,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize)]
    pub enum ArmBody {
        Expr(Expr),
        Block(Block),
    }

    #[derive(Debug, Clone, Serialize)]
    pub enum Stmt {
        Var {
            name: Ident,
            ty: Option<TypeExpr>,
            is_const: bool,
            is_pub: bool,
            value: Expr,
            span: Span,
        },
        Assign {
            target: Expr,
            /// Operator of a compound assignment (`+=` carries `Add`).
            op: Option<BinOp>,
            value: Expr,
            span: Span,
        },
        Fn(FnDecl),
        Struct(StructDef),
        Enum(EnumDef),
        Typeclass(TypeclassDef),
        Impl(ImplDef),
        For {
            pat: Pat,
            iter: Expr,
            body: Block,
            span: Span,
        },
        If {
            branches: Vec<(Expr, Block)>,
            else_: Option<Block>,
            span: Span,
        },
        While {
            cond: Expr,
            body: Block,
            span: Span,
        },
        Match {
            scrutinee: Expr,
            arms: Vec<MatchArm>,
            span: Span,
        },
        Import {
            module: Ident,
            names: Option<Vec<Ident>>,
            span: Span,
        },
        Module {
            name: Ident,
            body: Block,
            span: Span,
        },
        Return {
            value: Option<Expr>,
            span: Span,
        },
        Break(Span),
        Continue(Span),
        Expr {
            expr: Expr,
            span: Span,
        },
    }

    impl Stmt {
        pub fn span(&self) -> Span {
            match self {
                Stmt::Fn(d) => d.span,
                Stmt::Struct(d) => d.span,
                Stmt::Enum(d) => d.span,
                Stmt::Typeclass(d) => d.span,
                Stmt::Impl(d) => d.span,
                Stmt::Break(span) | Stmt::Continue(span) => *span,
                Stmt::Var { span, .. }
                | Stmt::Assign { span, .. }
                | Stmt::For { span, .. }
                | Stmt::If { span, .. }
                | Stmt::While { span, .. }
                | Stmt::Match { span, .. }
                | Stmt::Import { span, .. }
                | Stmt::Module { span, .. }
                | Stmt::Return { span, .. }
                | Stmt::Expr { span, .. } => *span,
            }
        }

        /// Declarations are registered before the other statements of a block run.
        pub fn is_declaration(&self) -> bool {
            matches!(
                self,
                Stmt::Fn(_) | Stmt::Struct(_) | Stmt::Enum(_) | Stmt::Typeclass(_) | Stmt::Impl(_)
            )
        }
    }

    /// Whether a composition runs where it stands or becomes a function value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub enum ComposeMode {
        Immediate,
        Deferred,
    }

    #[derive(Debug, Clone, Serialize)]
    pub enum Expr {
        Lit(Lit, Span),
        Var(Ident),
        /// `_` inside a composition stage
        Placeholder(Span),
        Index {
            base: Box<Expr>,
            index: Box<Expr>,
            span: Span,
        },
        Member {
            base: Box<Expr>,
            names: Vec<Ident>,
            span: Span,
        },
        Unary {
            op: UnOp,
            expr: Box<Expr>,
            span: Span,
        },
        Call {
            callee: Box<Expr>,
            args: Vec<Expr>,
            span: Span,
        },
        Binary {
            lhs: Box<Expr>,
            op: BinOp,
            rhs: Box<Expr>,
            span: Span,
        },
        List(Vec<Expr>, Span),
        Range {
            lo: Box<Expr>,
            hi: Box<Expr>,
            span: Span,
        },
        Map(Vec<(Expr, Expr)>, Span),
        /// Zero or at least two elements; `(e)` is `Paren`.
        Tuple(Vec<Expr>, Span),
        Lambda {
            params: Vec<Param>,
            ret_ty: Option<TypeExpr>,
            body: Block,
            span: Span,
        },
        Compose {
            stages: Vec<Expr>,
            mode: ComposeMode,
            span: Span,
        },
        Paren {
            inner: Box<Expr>,
            span: Span,
        },
    }

    impl Expr {
        pub fn span(&self) -> Span {
            match self {
                Expr::Lit(_, sp) | Expr::Placeholder(sp) | Expr::List(_, sp) => *sp,
                Expr::Map(_, sp) | Expr::Tuple(_, sp) => *sp,
                Expr::Var(id) => id.span,
                Expr::Index { span, .. }
                | Expr::Member { span, .. }
                | Expr::Unary { span, .. }
                | Expr::Call { span, .. }
                | Expr::Binary { span, .. }
                | Expr::Range { span, .. }
                | Expr::Lambda { span, .. }
                | Expr::Compose { span, .. }
                | Expr::Paren { span, .. } => *span,
            }
        }

        /// True when `_` occurs in this expression outside nested lambdas
        /// and compositions (which scope their own placeholder).
        pub fn mentions_placeholder(&self) -> bool {
            match self {
                Expr::Placeholder(_) => true,
                Expr::Lit(..) | Expr::Var(_) => false,
                Expr::Lambda { .. } | Expr::Compose { .. } => false,
                Expr::Index { base, index, .. } => {
                    base.mentions_placeholder() || index.mentions_placeholder()
                }
                Expr::Member { base, .. } => base.mentions_placeholder(),
                Expr::Unary { expr, .. } => expr.mentions_placeholder(),
                Expr::Call { callee, args, .. } => {
                    callee.mentions_placeholder() || args.iter().any(Expr::mentions_placeholder)
                }
                Expr::Binary { lhs, rhs, .. } => {
                    lhs.mentions_placeholder() || rhs.mentions_placeholder()
                }
                Expr::List(items, _) | Expr::Tuple(items, _) => {
                    items.iter().any(Expr::mentions_placeholder)
                }
                Expr::Range { lo, hi, .. } => lo.mentions_placeholder() || hi.mentions_placeholder(),
                Expr::Map(entries, _) => entries
                    .iter()
                    .any(|(k, v)| k.mentions_placeholder() || v.mentions_placeholder()),
                Expr::Paren { inner, .. } => inner.mentions_placeholder(),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub enum UnOp {
        /// `!`, logical
        Not,
        /// `not`, bitwise on Int, logical on Bool
        BitNot,
        Neg,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub enum Lit {
        Int(i64),
        Float(f64),
        Char(char),
        Str(String),
        Bool(bool),
        Null,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub enum BinOp {
        // logical
        Or,
        And,
        // equality
        Eq,
        Ne,
        // relational
        Lt,
        Le,
        Gt,
        Ge,
        // arithmetic
        Add,
        Sub,
        Mul,
        Div,
        Rem,
        Pow,
        // bitwise keyword operators
        BitAnd,
        BitOr,
        BitXor,
        Shl,
        Shr,
    }

    impl BinOp {
        pub fn symbol(self) -> &'static str {
            match self {
                BinOp::Or => "||",
                BinOp::And => "&&",
                BinOp::Eq => "==",
                BinOp::Ne => "!=",
                BinOp::Lt => "<",
                BinOp::Le => "<=",
                BinOp::Gt => ">",
                BinOp::Ge => ">=",
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "/",
                BinOp::Rem => "%",
                BinOp::Pow => "^",
                BinOp::BitAnd => "and",
                BinOp::BitOr => "or",
                BinOp::BitXor => "xor",
                BinOp::Shl => "shiftl",
                BinOp::Shr => "shiftr",
            }
        }
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct FieldPat {
        pub name: Ident,
        pub pat: Pat,
    }

    #[derive(Debug, Clone, Serialize)]
    pub enum Pat {
        Wildcard(Span),
        /// Binds the whole value, unless the name is a registered unit variant.
        Ident(Ident),
        Literal(Lit, Span),
        Nothing(Span),
        Just(Box<Pat>, Span),
        /// `Circle(r)` / `Rect(w, h)`
        Variant {
            name: Ident,
            fields: Vec<Pat>,
            span: Span,
        },
        /// `Point { x, y: 0 }`
        Struct {
            name: Ident,
            fields: Vec<FieldPat>,
            span: Span,
        },
        Tuple(Vec<Pat>, Span),
    }

    impl Pat {
        pub fn span(&self) -> Span {
            match self {
                Pat::Wildcard(sp) | Pat::Literal(_, sp) | Pat::Nothing(sp) => *sp,
                Pat::Just(_, sp) | Pat::Tuple(_, sp) => *sp,
                Pat::Ident(id) => id.span,
                Pat::Variant { span, .. } | Pat::Struct { span, .. } => *span,
            }
        }
    }
}
