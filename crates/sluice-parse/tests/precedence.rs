use sluice_ast::ast::{BinOp, Expr, Stmt, UnOp};
use sluice_parse::parse_str;

fn val(src: &str) -> Expr {
    let module = parse_str("<mem>", &format!("v = {src}")).unwrap();
    let Stmt::Assign { value, .. } = &module.body.stmts[0] else {
        panic!("expected assignment");
    };
    value.clone()
}

fn top_op(e: &Expr) -> BinOp {
    match e {
        Expr::Binary { op, .. } => *op,
        other => panic!("expected binary, got {other:?}"),
    }
}

#[test]
fn arithmetic_relational_equality_logical_layers() {
    let e = val("1 + 2*3 == 7 && 4 < 5 || 0 == 1");
    let Expr::Binary {
        op: BinOp::Or,
        lhs,
        rhs,
        ..
    } = e
    else {
        panic!("top should be Or");
    };
    assert!(matches!(*lhs, Expr::Binary { op: BinOp::And, .. }));
    assert!(matches!(*rhs, Expr::Binary { op: BinOp::Eq, .. }));
}

#[test]
fn power_binds_tighter_than_unary_minus() {
    // -2^2 == -(2^2)
    let e = val("-2^2");
    let Expr::Unary { op: UnOp::Neg, expr, .. } = e else {
        panic!("top should be negation");
    };
    assert_eq!(top_op(&expr), BinOp::Pow);
}

#[test]
fn power_is_left_associative() {
    // 2^3^2 == (2^3)^2
    let e = val("2^3^2");
    let Expr::Binary { lhs, op, .. } = e else {
        panic!("expected binary");
    };
    assert_eq!(op, BinOp::Pow);
    assert_eq!(top_op(&lhs), BinOp::Pow);
}

#[test]
fn bitwise_keywords_order() {
    // a or b xor c and d shiftl 1  ==  a or (b xor (c and (d shiftl 1)))
    let e = val("a or b xor c and d shiftl 1");
    assert_eq!(top_op(&e), BinOp::BitOr);
    let Expr::Binary { rhs, .. } = e else { unreachable!() };
    assert_eq!(top_op(&rhs), BinOp::BitXor);
    let Expr::Binary { rhs, .. } = *rhs else { unreachable!() };
    assert_eq!(top_op(&rhs), BinOp::BitAnd);
    let Expr::Binary { rhs, .. } = *rhs else { unreachable!() };
    assert_eq!(top_op(&rhs), BinOp::Shl);
}

#[test]
fn bitwise_binds_tighter_than_comparison() {
    let e = val("x and 1 == 0");
    assert_eq!(top_op(&e), BinOp::Eq);
}

#[test]
fn subtraction_is_left_associative() {
    let e = val("10 - 3 - 2");
    let Expr::Binary { lhs, op: BinOp::Sub, rhs, .. } = e else {
        panic!("expected Sub");
    };
    assert_eq!(top_op(&lhs), BinOp::Sub);
    assert!(matches!(*rhs, Expr::Lit(..)));
}

#[test]
fn logical_not_applies_to_operand_only() {
    let e = val("!a && b");
    let Expr::Binary { lhs, op: BinOp::And, .. } = e else {
        panic!("expected And");
    };
    assert!(matches!(*lhs, Expr::Unary { op: UnOp::Not, .. }));
}

#[test]
fn operators_continue_across_newlines() {
    let e = val("1 +\n 2 *\n 3");
    assert_eq!(top_op(&e), BinOp::Add);
}
