//! Span tracking: statement and declaration spans cover their full text.

use sluice_ast::ast::Stmt;
use sluice_parse::parse_str;

#[test]
fn fn_span_ends_at_closing_brace() {
    let src = "fn foo() { 42 }";
    let module = parse_str("<test>", src).expect("parse failed");
    let Stmt::Fn(decl) = &module.body.stmts[0] else {
        panic!("expected fn");
    };
    assert_eq!(decl.span.start, 0);
    assert_eq!(decl.span.end, 15);
}

#[test]
fn assignment_span_covers_value() {
    let module = parse_str("<test>", "x = 1 + 22\n").expect("parse failed");
    let span = module.body.stmts[0].span();
    assert_eq!((span.start, span.end), (0, 10));
}

#[test]
fn line_and_column_of_later_statement() {
    let module = parse_str("<test>", "a = 1\n\n  b = 2\n").expect("parse failed");
    let span = module.body.stmts[1].span();
    assert_eq!((span.line, span.col), (3, 3));
}

#[test]
fn column_counts_characters_not_bytes() {
    let module = parse_str("<test>", "s = \"äö\"; t = 1").expect("parse failed");
    let span = module.body.stmts[1].span();
    assert_eq!(span.col, 11);
}
