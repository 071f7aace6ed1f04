use predicates::prelude::*;

#[test]
fn test_help_lists_options() {
    let mut cmd = assert_cmd::cargo_bin_cmd!("pspy");
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--procevents"))
        .stdout(predicate::str::contains("--fsevents"))
        .stdout(predicate::str::contains("--recursive_dirs"))
        .stdout(predicate::str::contains("--dirs"))
        .stdout(predicate::str::contains("--color"))
        .stdout(predicate::str::contains("--ppid"))
        .stdout(predicate::str::contains("--interval"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_version_prints_semantic_version() {
    let mut cmd = assert_cmd::cargo_bin_cmd!("pspy");
    cmd.arg("--version");

    cmd.assert()
        .success()
        .stdout(predicate::str::is_match(r"pspy \d+\.\d+\.\d+").unwrap());
}

#[test]
fn test_zero_interval_rejected_before_startup() {
    let mut cmd = assert_cmd::cargo_bin_cmd!("pspy");
    cmd.args(["--interval", "0"]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid scan interval"));
}

#[test]
fn test_unknown_config_key_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pspy.toml");
    std::fs::write(&path, "[scan]\nspeed = 3\n").unwrap();

    let mut cmd = assert_cmd::cargo_bin_cmd!("pspy");
    cmd.arg("--config").arg(&path);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn test_malformed_bool_rejected() {
    let mut cmd = assert_cmd::cargo_bin_cmd!("pspy");
    cmd.arg("--fsevents=maybe");

    cmd.assert().failure();
}
