use sluice_ast::ast::{Expr, Lit, Stmt};
use sluice_parse::{parse_str, tokenize, TokKind};

#[test]
fn line_comments_and_ws_are_ignored() {
    let src = r#"
// leading comment
a = 1 // inline
b = (  // split
  2
) * 3
// tail
"#;
    let m = parse_str("<mem>", src).unwrap();
    let take = |i: usize| -> &Expr {
        let Stmt::Assign { value, .. } = &m.body.stmts[i] else {
            panic!("expected assignment");
        };
        value
    };
    assert_eq!(m.body.stmts.len(), 2);
    assert!(matches!(take(0), Expr::Lit(Lit::Int(1), _)));
    assert!(matches!(take(1), Expr::Binary { .. }));
}

#[test]
fn comment_only_source_is_empty_module() {
    let m = parse_str("notes.sl", "// nothing here\n// at all").unwrap();
    assert_eq!(m.name, "notes");
    assert!(m.body.stmts.is_empty());
    let toks = tokenize("// nothing").unwrap();
    assert!(matches!(toks.last().map(|t| &t.kind), Some(TokKind::Eof)));
}
