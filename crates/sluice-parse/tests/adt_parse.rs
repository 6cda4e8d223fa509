use sluice_ast::ast::{ArmBody, Lit, Pat, Stmt, TypeExpr};
use sluice_parse::parse_str;

fn stmts(src: &str) -> Vec<Stmt> {
    parse_str("<mem>", src).expect("parse ok").body.stmts
}

#[test]
fn struct_with_derives_and_newline_fields() {
    let s = stmts("struct Point derives [Show, Eq] {\n  x: Int\n  y: Int,\n}\n");
    let Stmt::Struct(def) = &s[0] else {
        panic!("expected struct");
    };
    assert_eq!(def.name.text, "Point");
    let derives: Vec<_> = def.derives.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(derives, ["Show", "Eq"]);
    let fields: Vec<_> = def.fields.iter().map(|f| f.name.text.as_str()).collect();
    assert_eq!(fields, ["x", "y"]);
    assert_eq!(def.fields[0].ty.head(), Some("Int"));
}

#[test]
fn enum_with_unit_and_payload_members() {
    let s = stmts("enum Shape { Empty, Circle(Float), Rect(Float, Float) }");
    let Stmt::Enum(def) = &s[0] else {
        panic!("expected enum");
    };
    assert_eq!(def.members.len(), 3);
    assert!(def.members[0].payload.is_none());
    assert!(matches!(def.members[1].payload, Some(TypeExpr::Named { .. })));
    assert!(matches!(&def.members[2].payload, Some(TypeExpr::Tuple(ts, _)) if ts.len() == 2));
}

#[test]
fn duplicate_variant_is_rejected() {
    let err = parse_str("<mem>", "enum E { A, A }").unwrap_err();
    assert!(err.to_string().contains("duplicate variant `A`"), "{err}");
}

#[test]
fn typeclass_and_impls() {
    let s = stmts(
        r#"
typeclass Show derives [Eq] {
    fn show(self) -> String
}
impl Show for Point {
    fn show(self) { "p" }
}
impl Show {
    fn show(self) { "default" }
}
"#,
    );
    let Stmt::Typeclass(tc) = &s[0] else {
        panic!("expected typeclass");
    };
    assert_eq!(tc.methods[0].name.text, "show");
    assert_eq!(tc.derives[0].text, "Eq");
    let Stmt::Impl(specific) = &s[1] else {
        panic!("expected impl");
    };
    assert_eq!(specific.for_type.as_ref().map(|t| t.text.as_str()), Some("Point"));
    let Stmt::Impl(default) = &s[2] else {
        panic!("expected impl");
    };
    assert!(default.for_type.is_none());
}

#[test]
fn impl_for_builtin_type_name() {
    let s = stmts("impl Show for Int { fn show(self) { \"int\" } }");
    let Stmt::Impl(def) = &s[0] else {
        panic!("expected impl");
    };
    assert_eq!(def.for_type.as_ref().map(|t| t.text.as_str()), Some("Int"));
}

#[test]
fn typeclass_method_needs_receiver() {
    let err = parse_str("<mem>", "typeclass T { fn m() }").unwrap_err();
    assert!(err.to_string().contains("dispatch receiver"), "{err}");
}

#[test]
fn match_arm_patterns() {
    let s = stmts(
        r#"
match v {
    Just(n) => n,
    Nothing => 0
    Circle(r) => { r * r }
    Point { x, y: 0 } => x
    (a, _) => a
    -1 => 1
    "s" => 2
}
"#,
    );
    let Stmt::Match { arms, .. } = &s[0] else {
        panic!("expected match");
    };
    assert_eq!(arms.len(), 7);
    assert!(matches!(&arms[0].pat, Pat::Just(inner, _) if matches!(**inner, Pat::Ident(_))));
    assert!(matches!(arms[1].pat, Pat::Nothing(_)));
    assert!(matches!(&arms[2].pat, Pat::Variant { fields, .. } if fields.len() == 1));
    assert!(matches!(arms[2].body, ArmBody::Block(_)));
    let Pat::Struct { fields, .. } = &arms[3].pat else {
        panic!("expected struct pattern");
    };
    assert!(matches!(&fields[0].pat, Pat::Ident(id) if id.text == "x"));
    assert!(matches!(fields[1].pat, Pat::Literal(Lit::Int(0), _)));
    assert!(matches!(&arms[4].pat, Pat::Tuple(ps, _) if matches!(ps[1], Pat::Wildcard(_))));
    assert!(matches!(arms[5].pat, Pat::Literal(Lit::Int(-1), _)));
    assert!(matches!(&arms[6].pat, Pat::Literal(Lit::Str(s), _) if s == "s"));
}
