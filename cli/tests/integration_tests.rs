//! Integration tests for the driver: compiling fixture programs to assembly
//! and rendering diagnostics.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

/// Unique per-test output path so parallel tests never collide.
fn temp_out(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("callisto_{}_{name}", std::process::id()))
}

#[test]
fn compiles_to_assembly() {
    let out = temp_out("hello.rom");
    let mut cmd = Command::cargo_bin("callisto-cli").unwrap();
    cmd.arg("-S")
        .arg("-o")
        .arg(&out)
        .arg(fixture("hello.cal"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));

    let asm_path = out.with_extension("tal");
    let asm = std::fs::read_to_string(&asm_path).unwrap();
    assert!(asm.contains("@calmain"));
    assert!(asm.contains("@func__main"));
    // the inline word expanded its asm body at both call sites
    assert_eq!(asm.matches("NIP #18 DEO").count(), 2);
    std::fs::remove_file(&asm_path).ok();
}

#[test]
fn resolves_includes_relative_to_the_including_file() {
    let out = temp_out("include.rom");
    let mut cmd = Command::cargo_bin("callisto-cli").unwrap();
    cmd.arg("-S")
        .arg("-o")
        .arg(&out)
        .arg(fixture("include.cal"))
        .assert()
        .success();

    let asm_path = out.with_extension("tal");
    let asm = std::fs::read_to_string(&asm_path).unwrap();
    // ANSWER from lib.cal resolved to an integer push
    assert!(asm.contains("#002a"));
    std::fs::remove_file(&asm_path).ok();
}

#[test]
fn reports_compile_errors_with_an_underline() {
    let mut cmd = Command::cargo_bin("callisto-cli").unwrap();
    let assert = cmd.arg("-S").arg(fixture("bad.cal")).assert();
    assert
        .failure()
        .code(2)
        .stderr(predicate::str::contains("error: undefined identifier 'foo'"))
        .stderr(predicate::str::contains("^~~"));
}

#[test]
fn reports_errors_as_json_when_asked() {
    let mut cmd = Command::cargo_bin("callisto-cli").unwrap();
    let assert = cmd
        .arg("-S")
        .arg("--format")
        .arg("json")
        .arg(fixture("bad.cal"))
        .assert();
    assert
        .failure()
        .code(2)
        .stderr(predicate::str::contains(r#""type":"error""#))
        .stderr(predicate::str::contains(r#""message":"undefined identifier 'foo'""#));
}

#[test]
fn rejects_unknown_backends() {
    let mut cmd = Command::cargo_bin("callisto-cli").unwrap();
    cmd.arg("-b")
        .arg("z80")
        .arg(fixture("hello.cal"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown backend 'z80'"));
}

#[test]
fn rejects_unknown_backend_options() {
    let mut cmd = Command::cargo_bin("callisto-cli").unwrap();
    cmd.arg("--opt")
        .arg("fast-math")
        .arg(fixture("hello.cal"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown option 'fast-math'"));
}

#[test]
fn reports_missing_input_files() {
    let mut cmd = Command::cargo_bin("callisto-cli").unwrap();
    cmd.arg(fixture("no_such.cal"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("cannot read"));
}
