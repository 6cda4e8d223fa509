use sluice_ast::ast::{ComposeMode, Expr, Stmt};
use sluice_parse::parse_str;

fn first_stmt(src: &str) -> Stmt {
    let m = parse_str("<mem>", src).unwrap();
    m.body.stmts.into_iter().next().expect("one statement")
}

#[test]
fn statement_chain_is_immediate_and_flat() {
    let Stmt::Expr { expr, .. } = first_stmt("double(10) | double | add(_, 3) | print\n") else {
        panic!("expected expression statement");
    };
    let Expr::Compose { stages, mode, .. } = expr else {
        panic!("expected composition");
    };
    assert_eq!(mode, ComposeMode::Immediate);
    assert_eq!(stages.len(), 4);
    assert!(stages[2].mentions_placeholder());
    assert!(!stages[1].mentions_placeholder());
}

#[test]
fn binding_rhs_chain_is_deferred() {
    let Stmt::Assign { value, .. } = first_stmt("quad = double | double") else {
        panic!("expected assignment");
    };
    assert!(matches!(value, Expr::Compose { mode: ComposeMode::Deferred, .. }));

    let Stmt::Var { value, is_const, .. } = first_stmt("const quad = double | double") else {
        panic!("expected definition");
    };
    assert!(is_const);
    assert!(matches!(value, Expr::Compose { mode: ComposeMode::Deferred, .. }));
}

#[test]
fn parenthesised_chain_stays_immediate() {
    let Stmt::Assign { value, .. } = first_stmt("y = (3 | double) + 1") else {
        panic!("expected assignment");
    };
    let Expr::Binary { lhs, .. } = value else {
        panic!("expected addition");
    };
    let Expr::Paren { inner, .. } = *lhs else {
        panic!("expected parens");
    };
    assert!(matches!(*inner, Expr::Compose { mode: ComposeMode::Immediate, .. }));
}

#[test]
fn pipe_is_lowest_precedence() {
    let Stmt::Expr { expr, .. } = first_stmt("1 + 2 | inc") else {
        panic!("expected expression statement");
    };
    let Expr::Compose { stages, .. } = expr else {
        panic!("expected composition");
    };
    assert!(matches!(stages[0], Expr::Binary { .. }));
}

#[test]
fn chain_may_continue_on_next_line() {
    let m = parse_str("<mem>", "5 |\n  double |\n  print\nx = 1\n").unwrap();
    assert_eq!(m.body.stmts.len(), 2);
}

#[test]
fn placeholder_inside_lambda_is_not_counted() {
    let Stmt::Expr { expr, .. } = first_stmt("xs | map(fn(v) { _ }, xs)") else {
        panic!("expected expression statement");
    };
    let Expr::Compose { stages, .. } = expr else {
        panic!("expected composition");
    };
    assert!(!stages[1].mentions_placeholder());
}
