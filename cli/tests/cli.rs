#[path = "../../tests/support/mod.rs"]
mod support;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::{fs, path::Path, process::Command};
use support::{tar_gz, FakeRegistry, Reply};

fn layerjail() -> Command {
    Command::cargo_bin("layerjail").unwrap()
}

fn with_registry(registry: &FakeRegistry) -> Command {
    let mut command = layerjail();
    command
        .arg("--registry")
        .arg(registry.url())
        .arg("--auth-realm")
        .arg(registry.auth_realm())
        .arg("--no-jitter");
    command
}

#[test]
fn cli_no_args() {
    layerjail()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"))
        .stdout(predicate::str::is_empty());
}

#[test]
fn cli_help() {
    layerjail()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--pull-only"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn cli_bad_reference() {
    layerjail()
        .arg("run")
        .arg("Not A Valid Image")
        .arg("/bin/true")
        .assert()
        .code(0xFF)
        .stderr(predicate::str::contains("invalid image reference format"));
}

#[tokio::test(flavor = "multi_thread")]
async fn cli_pull_only() {
    let registry = FakeRegistry::start();
    registry.serve_token("t");
    let layers = registry.serve_layers(
        "library/busybox",
        &[tar_gz(&[("bin/", ""), ("bin/hello", "hello")])],
    );
    registry.serve_manifest("library/busybox", "latest", &layers);
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");

    let mut command = with_registry(&registry);
    command
        .arg("--root")
        .arg(&root)
        .arg("--pull-only")
        .arg("run")
        .arg("busybox")
        .arg("/bin/hello");
    let output = tokio::task::spawn_blocking(move || command.output().unwrap())
        .await
        .unwrap();

    assert!(output.status.success(), "{:?}", output);
    let printed = String::from_utf8(output.stdout).unwrap();
    assert_eq!(Path::new(printed.trim()), fs::canonicalize(&root).unwrap());
    assert_eq!(fs::read(root.join("bin/hello")).unwrap(), b"hello");
}

#[tokio::test(flavor = "multi_thread")]
async fn cli_missing_token() {
    let registry = FakeRegistry::start();
    registry.route("/token", vec![Reply::status(401)]);

    let tmp = tempfile::tempdir().unwrap();

    let mut command = with_registry(&registry);
    command
        .env("TMPDIR", tmp.path())
        .arg("run")
        .arg("busybox")
        .arg("/bin/true");
    let output = tokio::task::spawn_blocking(move || command.output().unwrap())
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(0xFF));
    assert!(output.stdout.is_empty());
    assert_eq!(registry.requests_to("/token").len(), 1);
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn cli_pull_only_keeps_temporary_root() {
    let registry = FakeRegistry::start();
    registry.serve_token("t");
    let layers = registry.serve_layers("library/busybox", &[tar_gz(&[("kept", "yes")])]);
    registry.serve_manifest("library/busybox", "latest", &layers);
    let tmp = tempfile::tempdir().unwrap();

    let mut command = with_registry(&registry);
    command
        .env("TMPDIR", tmp.path())
        .arg("--pull-only")
        .arg("run")
        .arg("busybox")
        .arg("/bin/true");
    let output = tokio::task::spawn_blocking(move || command.output().unwrap())
        .await
        .unwrap();

    assert!(output.status.success(), "{:?}", output);
    let printed = String::from_utf8(output.stdout).unwrap();
    let root = Path::new(printed.trim());
    assert!(root.starts_with(fs::canonicalize(tmp.path()).unwrap()));
    assert_eq!(fs::read(root.join("kept")).unwrap(), b"yes");
}

// Needs network access and root privileges
#[test]
#[ignore]
fn cli_busybox_echo() {
    layerjail()
        .arg("run")
        .arg("busybox")
        .arg("/bin/echo")
        .arg("hello")
        .arg("-n")
        .assert()
        .success()
        .stdout("hello -n\n");
}

#[test]
#[ignore]
fn cli_busybox_exit_code() {
    layerjail()
        .arg("run")
        .arg("busybox")
        .arg("/bin/sh")
        .arg("-c")
        .arg("echo out; echo err >&2; exit 3")
        .assert()
        .code(3)
        .stdout("out\n")
        .stderr(predicate::str::contains("err\n"));
}
