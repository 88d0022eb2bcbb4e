//! CLI contract tests.

use assert_cmd::Command;

fn courier(root: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("courier").expect("binary should build");
    cmd.arg("--root").arg(root).current_dir(root).env_remove("RUST_LOG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("command should run");
    assert!(output.status.success(), "command failed: {output:?}");
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn help_lists_subcommands() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let out = stdout_of(courier(tmp.path()).arg("--help"));
    assert!(out.contains("start"));
    assert!(out.contains("status"));
    assert!(out.contains("backup"));
}

#[test]
fn status_on_fresh_root_reports_nothing_recorded() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let out = stdout_of(courier(tmp.path()).arg("status"));
    assert!(out.contains("no transmissions recorded"));
    assert!(out.contains("logged:       0"));
    assert!(out.contains("health:       no sample yet"));
}

#[test]
fn backup_writes_a_timestamped_directory() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let out = stdout_of(courier(tmp.path()).arg("backup"));
    assert!(out.contains("backup written to"));

    let backups: Vec<_> = std::fs::read_dir(tmp.path().join("backups"))
        .expect("backups dir should exist")
        .collect();
    assert_eq!(backups.len(), 1);
}

#[test]
fn start_without_token_exits_with_error() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    std::fs::write(
        tmp.path().join("config.toml"),
        "[telegram]\nbot_token_env = \"COURIER_TEST_TOKEN_THAT_IS_NOT_SET\"\n",
    )
    .expect("write config");

    let output = courier(tmp.path())
        .arg("start")
        .env_remove("COURIER_TEST_TOKEN_THAT_IS_NOT_SET")
        .output()
        .expect("command should run");
    assert!(!output.status.success());
    assert!(tmp.path().join("logs").exists());
}
