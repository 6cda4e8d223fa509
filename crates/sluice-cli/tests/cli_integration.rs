//! CLI integration tests for `sluice run` / `parse` / `tokens` / `check`.
//!
//! These tests invoke the compiled binary to verify end-to-end behavior.

use std::path::PathBuf;
use std::process::{Command, Output};

fn sluice_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sluice"))
}

fn write_source(dir: &tempfile::TempDir, name: &str, src: &str) -> PathBuf {
    let file = dir.path().join(name);
    std::fs::write(&file, src).expect("write source");
    file
}

fn run(args: &[&str]) -> Output {
    sluice_bin().args(args).output().expect("run binary")
}

fn stdout(o: &Output) -> String {
    String::from_utf8_lossy(&o.stdout).into_owned()
}

fn stderr(o: &Output) -> String {
    String::from_utf8_lossy(&o.stderr).into_owned()
}

#[test]
fn cli_run_prints_program_output() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(
        &dir,
        "pipeline.sl",
        "fn double(n) { n * 2 }\n\nfn main() {\n    double(10) | double | double | printf(\"%d\\n\", _)\n}\n",
    );

    let output = run(&["run", file.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "80\n");
}

#[test]
fn cli_run_passes_args() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "args.sl", "for a in args { print(a) }\n");

    let output = run(&["run", file.to_str().unwrap(), "--", "one", "two"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "one\ntwo\n");
}

#[test]
fn cli_run_exit_code() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "exit.sl", "print(\"bye\")\nexit(7)\nprint(\"never\")\n");

    let output = run(&["run", file.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(7));
    assert_eq!(stdout(&output), "bye\n");
}

#[test]
fn cli_run_runtime_fault_diagnostic() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "fault.sl", "xs = [1, 2]\nprint(xs[5])\n");

    let output = run(&["run", file.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("error[IndexOutOfBounds]"), "stderr: {err}");
    assert!(err.contains("at 2:"), "stderr: {err}");
}

#[test]
fn cli_run_rejects_const_reassignment_before_running() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "const.sl", "print(\"start\")\nconst x = 10\nx = 12\n");

    let output = run(&["run", file.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    // the static check fails before anything prints
    assert_eq!(stdout(&output), "");
    assert!(
        stderr(&output).contains("error[ConstReassignment]"),
        "stderr: {}",
        stderr(&output)
    );
}

#[test]
fn cli_run_with_trace() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "traced.sl", "print(\"traced\")\n");
    let trace = dir.path().join("trace.jsonl");

    let output = run(&[
        "run",
        file.to_str().unwrap(),
        "--trace",
        trace.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "traced\n");

    let content = std::fs::read_to_string(&trace).expect("read trace file");
    let records: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).expect("valid JSON line"))
        .collect();
    assert_eq!(records.len(), 3, "trace: {content}");
    assert_eq!(records[0]["record"], "header");
    assert_eq!(records[1]["operation"], "print");
    assert_eq!(records[2]["program_status"], "success");
}

#[test]
fn cli_parse_error_diagnostic() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "bad.sl", "x = (1,)\n");

    let output = run(&["parse", file.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.starts_with("error[ParseError]"), "stderr: {err}");
    assert!(err.contains("at 1:"), "stderr: {err}");
}

#[test]
fn cli_lex_error_diagnostic() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "lex.sl", "x = 1 @ 2\n");

    let output = run(&["tokens", file.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr(&output).starts_with("error[LexError]"),
        "stderr: {}",
        stderr(&output)
    );
}

#[test]
fn cli_parse_json_names_module_after_file() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "shapes.sl", "enum Shape { Circle(Float), Empty }\n");

    let output = run(&["parse", file.to_str().unwrap(), "--format", "json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let ast: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("valid JSON");
    assert_eq!(ast["name"], "shapes");
    assert!(ast["body"]["stmts"][0].get("Enum").is_some(), "ast: {ast}");
}

#[test]
fn cli_tokens_lists_statement_ends() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "toks.sl", "x = 1\ny = [1,\n2]\n");

    let output = run(&["tokens", file.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert_eq!(out.matches("StmtEnd").count(), 2, "tokens:\n{out}");
    assert!(out.lines().last().unwrap_or_default().ends_with("Eof"));
}

#[test]
fn cli_check_ok() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "ok.sl", "const x = 1\ny = x + 1\n");

    let output = run(&["check", file.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).ends_with("ok\n"));
}

#[test]
fn cli_rejects_oversized_source() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let big = "x = 1\n".repeat(200_000);
    let file = write_source(&dir, "big.sl", &big);

    let output = run(&["check", file.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("1MB limit"), "stderr: {}", stderr(&output));
}
