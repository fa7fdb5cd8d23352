//! The `--json` report is the only thing written to stdout

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

fn script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_run_json_stdout_is_a_single_report() {
    let root = tempfile::tempdir().unwrap();
    let bin = root.path().join("bin");
    let workspace = root.path().join("workspace");
    for dir in [&bin, &workspace.join("backend"), &workspace.join("frontend")] {
        fs::create_dir_all(dir).unwrap();
    }
    script(&bin, "mvn", "echo '[INFO] BUILD SUCCESS'");
    script(
        &bin,
        "docker",
        r#"if [ "$1" = inspect ]; then echo healthy; else echo "docker $*"; fi"#,
    );
    script(&bin, "curl", "printf 200");

    let path = format!(
        "{}:{}",
        bin.display(),
        std::env::var("PATH").unwrap_or_default()
    );
    let output = Command::new(env!("CARGO_BIN_EXE_stackci"))
        .args(["run", "--json", "--shell", "posix", "--keep-running", "false"])
        .args(["--build-number", "42", "--revision", "abcdef1234"])
        .arg("--workspace")
        .arg(&workspace)
        .env("PATH", path)
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["status"], "success");
    assert_eq!(report["teardown"]["runs"], 1);
    assert!(!stdout.contains("Stack is ready"));
    assert!(!stdout.contains("BUILD SUCCESS"));
}
