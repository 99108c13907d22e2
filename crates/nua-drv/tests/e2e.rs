//! End-to-end CLI tests: each one writes a script to a temp file,
//! runs the `nua` binary against it, and checks stdout/exit code.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn nua_bin() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_nua"))
}

fn script(src: &str) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".nua")
        .tempfile()
        .expect("failed to create temp script");
    std::fs::write(file.path(), src).expect("failed to write temp script");
    file
}

#[test]
fn arithmetic_and_print() {
    let file = script("local x = 1 + 2 * 0 + 3 print(x)");
    Command::new(nua_bin())
        .arg(file.path())
        .assert()
        .success()
        .stdout("4.000000\n");
}

#[test]
fn control_flow_while_loop() {
    let file = script("local i = 0 while i < 3 do i = i + 1 print(i) end");
    Command::new(nua_bin())
        .arg(file.path())
        .assert()
        .success()
        .stdout("1.000000\n2.000000\n3.000000\n");
}

#[test]
fn if_else_nil_is_false() {
    let file = script("if nil then print(1) else print(2) end");
    Command::new(nua_bin())
        .arg(file.path())
        .assert()
        .success()
        .stdout("2.000000\n");
}

#[test]
fn if_else_zero_is_truthy() {
    let file = script("if 0 then print(1) else print(2) end");
    Command::new(nua_bin())
        .arg(file.path())
        .assert()
        .success()
        .stdout("1.000000\n");
}

#[test]
fn functions_and_environment() {
    let file = script("function add(a, b) return a + b end print(add(2, 3))");
    Command::new(nua_bin())
        .arg(file.path())
        .assert()
        .success()
        .stdout("5.000000\n");
}

#[test]
fn table_constructor_sequence_and_hash() {
    let file = script(r#"local t = {10, 20, 30} t["k"] = 99 print(t[2]) print(t["k"])"#);
    Command::new(nua_bin())
        .arg(file.path())
        .assert()
        .success()
        .stdout("20.000000\n99.000000\n");
}

#[test]
fn multi_return_and_multi_assign() {
    let file = script("function pair() return 1, 2 end local a, b = pair() print(a) print(b)");
    Command::new(nua_bin())
        .arg(file.path())
        .assert()
        .success()
        .stdout("1.000000\n2.000000\n");
}

#[test]
fn missing_file_is_a_nonzero_exit() {
    Command::new(nua_bin())
        .arg("/no/such/file.nua")
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not read"));
}

#[test]
fn missing_argument_is_a_nonzero_exit() {
    Command::new(nua_bin()).assert().failure().stderr(predicate::str::contains("usage"));
}

#[test]
fn parse_error_is_a_nonzero_exit() {
    let file = script("local = 1");
    Command::new(nua_bin()).arg(file.path()).assert().failure();
}

#[test]
fn runtime_type_error_is_a_nonzero_exit() {
    let file = script("local x = 1 + nil");
    Command::new(nua_bin())
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("attempt to perform arithmetic"));
}
