//! Integration tests for the CLI binary.
//!
//! Drives the `cardid` binary against a temporary home directory.
//!
//! This test is registered as a [[test]] in the card-identity-cli crate
//! so that CARGO_BIN_EXE_cardid is available.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

/// Get a Command pointing to the `cardid` binary.
fn cardid_binary() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cardid"));
    cmd.env_remove("CARDID_HOME").env_remove("RUST_LOG");
    cmd
}

/// Run `cardid --home HOME --identity IDENTITY ARGS...`.
fn cardid(home: &Path, identity: &str, args: &[&str]) -> Output {
    cardid_binary()
        .arg("--home")
        .arg(home)
        .args(["--identity", identity])
        .args(args)
        .output()
        .expect("failed to execute cardid")
}

/// Like [`cardid`], feeding `input` on stdin.
fn cardid_with_input(home: &Path, identity: &str, args: &[&str], input: &str) -> Output {
    let mut child = cardid_binary()
        .arg("--home")
        .arg(home)
        .args(["--identity", identity])
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn cardid");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().expect("failed to wait for cardid")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn cli_responds_to_help() {
    let output = cardid_binary()
        .arg("--help")
        .output()
        .expect("failed to execute cardid --help");

    assert!(
        output.status.success(),
        "cardid --help should exit with success, stderr: {}",
        stderr(&output)
    );
    let out = stdout(&output);
    assert!(out.contains("Usage"), "help should contain usage, got: {out}");
    assert!(out.contains("register"), "help should list commands, got: {out}");
}

#[test]
fn cli_responds_to_version() {
    let output = cardid_binary()
        .arg("--version")
        .output()
        .expect("failed to execute cardid --version");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("0.1"), "version output should contain 0.1, got: {out}");
}

#[test]
fn cli_exits_with_error_on_unknown_flag() {
    let output = cardid_binary()
        .arg("--nonexistent-flag")
        .output()
        .expect("failed to execute cardid");
    assert!(!output.status.success());
}

#[test]
fn cli_rejects_bad_filter() {
    let home = tempfile::tempdir().unwrap();
    let output = cardid(home.path(), "alice", &["find", "bob", "--filter", "laptop"]);
    assert!(!output.status.success());
}

#[test]
fn cli_register_find_unregister() {
    let home = tempfile::tempdir().unwrap();

    let output = cardid(home.path(), "bob", &["register", "--device-id", "phone"]);
    assert!(output.status.success(), "register failed: {}", stderr(&output));
    assert!(stdout(&output).contains("Registered 'bob'"));

    // Registering the same device again needs the local key gone first.
    let output = cardid(home.path(), "bob", &["register", "--device-id", "phone"]);
    assert!(!output.status.success());

    let output = cardid(home.path(), "alice", &["find", "bob", "--filter", "device:phone"]);
    assert!(output.status.success(), "find failed: {}", stderr(&output));
    assert!(stdout(&output).contains("Public Key:"));

    let output = cardid(
        home.path(),
        "alice",
        &["find", "bob", "--filter", "device:laptop", "--allow-missing"],
    );
    assert!(output.status.success());
    assert!(stdout(&output).contains("no card accepted by device:laptop"));

    let output = cardid(home.path(), "alice", &["find", "bob", "--filter", "device:laptop"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("bob"));

    let output = cardid(home.path(), "bob", &["unregister", "--filter", "device:phone"]);
    assert!(output.status.success(), "unregister failed: {}", stderr(&output));
    assert!(stdout(&output).contains("1 card(s) revoked"));

    let output = cardid(home.path(), "alice", &["find", "bob"]);
    assert!(!output.status.success());
}

#[test]
fn cli_rotate_requires_cleanup() {
    let home = tempfile::tempdir().unwrap();

    let output = cardid(home.path(), "carol", &["register", "--account"]);
    assert!(output.status.success(), "register failed: {}", stderr(&output));

    let output = cardid(home.path(), "carol", &["rotate", "--account"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("cleanup"));

    let output = cardid(home.path(), "carol", &["cleanup"]);
    assert!(output.status.success(), "cleanup failed: {}", stderr(&output));

    let output = cardid(home.path(), "carol", &["rotate", "--account"]);
    assert!(output.status.success(), "rotate failed: {}", stderr(&output));
    assert!(stdout(&output).contains("Replaces:"));

    let output = cardid(home.path(), "carol", &["cards", "--filter", "account"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("[current] accept"), "got: {out}");
    assert!(out.contains("[outdated] accept"), "got: {out}");
}

#[test]
fn cli_find_json_output() {
    let home = tempfile::tempdir().unwrap();
    let output = cardid(home.path(), "dave", &["register", "--field", "team=blue"]);
    assert!(output.status.success(), "register failed: {}", stderr(&output));

    let output = cardid(home.path(), "erin", &["find", "dave", "--json"]);
    assert!(output.status.success(), "find failed: {}", stderr(&output));
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["dave"]["identity"], "dave");
    assert_eq!(value["dave"]["signatures"][0]["extra_fields"]["team"], "blue");
}

#[test]
fn cli_whoami() {
    let home = tempfile::tempdir().unwrap();
    let output = cardid(home.path(), "frank", &["whoami"]);
    assert!(output.status.success(), "whoami failed: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Identity: frank"));
    assert!(out.contains("cardid.frank"));
    assert!(out.contains("no local private key"));
}

#[test]
fn cli_rejects_fields_that_clash_with_marker_flags() {
    let home = tempfile::tempdir().unwrap();

    let output = cardid(
        home.path(),
        "gina",
        &["register", "--device-id", "phone", "--field", "identityId=tablet"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("conflicts with --device-id"), "{}", stderr(&output));

    let output = cardid(
        home.path(),
        "gina",
        &["register", "--account", "--field", "accountCard=false"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("conflicts with --account"), "{}", stderr(&output));

    let output = cardid(
        home.path(),
        "gina",
        &["register", "--field", "team=red", "--field", "team=blue"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("more than once"));

    // Nothing was published by the rejected commands.
    let output = cardid(home.path(), "gina", &["whoami"]);
    assert!(stdout(&output).contains("Cards:     0"), "{}", stdout(&output));

    let output = cardid(
        home.path(),
        "gina",
        &["register", "--device-id", "phone", "--field", "team=red"],
    );
    assert!(output.status.success(), "register failed: {}", stderr(&output));
}

#[test]
fn cli_revoke_rejects_malformed_card_id() {
    let home = tempfile::tempdir().unwrap();
    let output = cardid(home.path(), "hank", &["register"]);
    assert!(output.status.success(), "register failed: {}", stderr(&output));

    let output = cardid(home.path(), "hank", &["revoke", "../keys/cardid.hank"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("malformed card id"), "{}", stderr(&output));
    assert!(home.path().join("keys").join("cardid.hank.json").exists());

    let output = cardid(home.path(), "hank", &["revoke", &"0".repeat(64)]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("not found"), "{}", stderr(&output));
}

#[test]
fn cli_backup_and_restore_private_key() {
    let home = tempfile::tempdir().unwrap();
    let output = cardid(home.path(), "ivy", &["register"]);
    assert!(output.status.success(), "register failed: {}", stderr(&output));

    let output = cardid_with_input(home.path(), "ivy", &["backup"], "pw-one\npw-two\n");
    assert!(!output.status.success());
    assert!(stderr(&output).contains("do not match"));

    let output = cardid_with_input(home.path(), "ivy", &["backup"], "pw-one\npw-one\n");
    assert!(output.status.success(), "backup failed: {}", stderr(&output));
    assert!(home.path().join("backups").join("cardid.ivy.json").exists());

    let output = cardid(home.path(), "ivy", &["cleanup"]);
    assert!(output.status.success());

    let output = cardid_with_input(home.path(), "ivy", &["restore"], "wrong\n");
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid password"), "{}", stderr(&output));

    let output = cardid_with_input(home.path(), "ivy", &["restore"], "pw-one\n");
    assert!(output.status.success(), "restore failed: {}", stderr(&output));
    assert!(stdout(&output).contains("Restored private key of 'ivy'"));

    let output = cardid(home.path(), "ivy", &["whoami"]);
    assert!(!stdout(&output).contains("no local private key"));

    let output = cardid(home.path(), "ivy", &["reset-backup"]);
    assert!(output.status.success(), "reset failed: {}", stderr(&output));
    assert!(!home.path().join("backups").join("cardid.ivy.json").exists());

    let output = cardid(home.path(), "ivy", &["reset-backup"]);
    assert!(!output.status.success());
}
