use sluice_ast::ast::{Expr, Lit, Stmt};
use sluice_parse::{parse_str, tokenize, TokKind};

#[test]
fn ints_floats_bools_null_chars_string_escapes() {
    let m = parse_str(
        "<mem>",
        r#"a = 42; b = 3.5; c = true; d = null; e = "hi\n\"there\""; f = 'x'"#,
    )
    .unwrap();
    let take = |i: usize| -> &Expr {
        let Stmt::Assign { value, .. } = &m.body.stmts[i] else {
            panic!("expected assignment");
        };
        value
    };

    assert!(matches!(take(0), Expr::Lit(Lit::Int(42), _)));
    assert!(matches!(take(1), Expr::Lit(Lit::Float(f), _) if (*f - 3.5).abs() < 1e-9));
    assert!(matches!(take(2), Expr::Lit(Lit::Bool(true), _)));
    assert!(matches!(take(3), Expr::Lit(Lit::Null, _)));
    assert!(matches!(take(4), Expr::Lit(Lit::Str(s), _) if s == "hi\n\"there\""));
    assert!(matches!(take(5), Expr::Lit(Lit::Char('x'), _)));
}

#[test]
fn placeholder_is_not_an_identifier() {
    let m = parse_str("<mem>", "f(_, 2)").unwrap();
    let Stmt::Expr { expr: Expr::Call { args, .. }, .. } = &m.body.stmts[0] else {
        panic!("expected call");
    };
    assert!(matches!(args[0], Expr::Placeholder(_)));
}

#[test]
fn relexing_token_text_is_stable() {
    let src = "x = [1..10] | sum\nprint(x.len(), 'c', \"s\")\n";
    let kinds = |s: &str| -> Vec<TokKind> { tokenize(s).unwrap().into_iter().map(|t| t.kind).collect() };
    let first = kinds(src);
    let again = kinds(&format!("{src}\n\n"));
    assert_eq!(first, again);
}

#[test]
fn lexing_concatenated_files_matches_concatenated_token_streams() {
    let kinds = |s: &str| -> Vec<TokKind> { tokenize(s).unwrap().into_iter().map(|t| t.kind).collect() };
    let pairs = [
        ("x = 1\n", "y = 2\n"),
        // no trailing newline on the first file
        ("x = [1..10] | sum", "print(x)"),
        // last statement spans lines inside brackets and ends a block
        ("xs = [1,\n  2]\nfn f(n) {\n  n * 2\n}", "f(3) | print"),
        ("total = 0 // running sum", "typeclass Show {\n  fn show(self) -> String\n}\n"),
        ("m = {\"a\": 1}\n\n", "for (k, v) in m { print(k, v) }"),
        ("", "z = 'c'\n"),
    ];
    for (a, b) in pairs {
        let mut expected = kinds(a);
        assert_eq!(expected.pop(), Some(TokKind::Eof));
        expected.extend(kinds(b));
        assert_eq!(kinds(&format!("{a}\n{b}")), expected, "files {a:?} and {b:?}");
    }
}
