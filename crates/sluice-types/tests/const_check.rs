use sluice_parse::parse_str;
use sluice_types::{check_module, CheckError};

fn check(src: &str) -> Result<(), Vec<CheckError>> {
    let module = parse_str("<mem>", src).expect("parse ok");
    check_module(&module)
}

fn names(errs: Vec<CheckError>) -> Vec<String> {
    errs.into_iter()
        .map(|e| match e {
            CheckError::ConstReassignment { name, .. } => name,
        })
        .collect()
}

#[test]
fn reassigning_const_is_rejected() {
    let errs = check("const limit = 10\nlimit = 11\n").unwrap_err();
    assert_eq!(names(errs.clone()), ["limit"]);
    assert_eq!(errs[0].span().line, 2);
}

#[test]
fn compound_assignment_counts() {
    let errs = check("const n = 1\nn += 1\n").unwrap_err();
    assert_eq!(names(errs), ["n"]);
}

#[test]
fn mutable_names_may_change() {
    assert!(check("x = 1\nx = 2\ny: Int = 3\ny += 1\npub z = 0\nz = 5\n").is_ok());
}

#[test]
fn redefining_const_in_same_scope() {
    let errs = check("const a = 1\nconst a = 2\n").unwrap_err();
    assert_eq!(names(errs), ["a"]);
}

#[test]
fn inner_scopes_see_outer_consts() {
    let src = r#"
const max = 3
fn bump() {
    max = 4
}
if true {
    for i in [0..2] { max += i }
}
"#;
    let errs = check(src).unwrap_err();
    assert_eq!(names(errs), ["max", "max"]);
}

#[test]
fn parameters_and_patterns_shadow_consts() {
    let src = r#"
const v = 1
fn f(v) { v = 2 }
for v in [1, 2] { v = 3 }
match Just(1) {
    Just(v) => { v = 4 }
}
"#;
    assert!(check(src).is_ok());
}

#[test]
fn lambda_bodies_are_checked() {
    let errs = check("const k = 1\nf = fn() { k = 2 }\n").unwrap_err();
    assert_eq!(names(errs), ["k"]);
}

#[test]
fn modules_have_their_own_scope() {
    let src = "const name = \"outer\"\nmodule m {\n  name = \"inner\"\n}\n";
    assert!(check(src).is_ok());
}

#[test]
fn program_arguments_are_constant() {
    let errs = check("args = []\nmodule m {\n  args += [\"x\"]\n}\n").unwrap_err();
    assert_eq!(names(errs), ["args", "args"]);
    // a parameter named `args` shadows the constant
    assert!(check("fn f(args) { args = 1 }\n").is_ok());
}
