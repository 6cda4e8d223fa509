//! Parser nesting limits.

use sluice_parse::{parse_str, MAX_NESTING_DEPTH};

#[test]
fn moderate_nesting_works() {
    let src = format!("x = {}1{}", "(".repeat(40), ")".repeat(40));
    assert!(parse_str("<test>", &src).is_ok());
}

#[test]
fn deeply_nested_blocks_work() {
    let mut src = String::new();
    for _ in 0..20 {
        src.push_str("if true {\n");
    }
    src.push_str("1\n");
    for _ in 0..20 {
        src.push_str("}\n");
    }
    assert!(parse_str("<test>", &src).is_ok());
}

#[test]
fn limit_constant_is_reasonable() {
    assert!(MAX_NESTING_DEPTH >= 64);
    assert!(MAX_NESTING_DEPTH <= 512);
}
