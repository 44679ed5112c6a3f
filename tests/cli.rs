use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::tempdir;

const SEED: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

fn bin() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("lockbox"))
}

fn vault(store: &Path, password: &str) -> Command {
    let mut cmd = bin();
    cmd.env("LOCKBOX_PASSWORD", password)
        .env("LOCKBOX_KDF_ITERATIONS", "1000")
        .env_remove("LOCKBOX_PATH")
        .arg("--store")
        .arg(store);
    cmd
}

fn add(store: &Path, title: &str) {
    vault(store, "pw")
        .args(["add", title, "cmu_student", "--password", "goodpassword"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stored record"));
}

#[test]
fn empty_vault_lists_welcome() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    vault(&store, "anything")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Welcome!"));

    assert!(store.exists());
}

#[test]
fn add_and_list_roundtrip() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    add(&store, "Facebook");

    vault(&store, "pw")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Facebook"))
        .stdout(predicate::str::contains("cmu_student"))
        .stdout(predicate::str::contains("goodpassword").not());
}

#[test]
fn list_json_contains_fields() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    add(&store, "Facebook");

    let output = vault(&store, "pw")
        .args(["list", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["title"], "Facebook");
    assert_eq!(records[0]["password"], "goodpassword");
}

#[test]
fn database_never_contains_plaintext() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    add(&store, "Facebook");

    let raw = std::fs::read(&store).unwrap();
    let haystack = String::from_utf8_lossy(&raw);
    assert!(!haystack.contains("Facebook"));
    assert!(!haystack.contains("goodpassword"));
}

#[test]
fn wrong_password_fails() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    add(&store, "Facebook");

    vault(&store, "wrong_pw")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("incorrect master key"));
}

#[test]
fn show_masks_password_unless_revealed() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    add(&store, "Facebook");

    vault(&store, "pw")
        .args(["show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("************"))
        .stdout(predicate::str::contains("goodpassword").not());

    vault(&store, "pw")
        .args(["show", "1", "--reveal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("goodpassword"));
}

#[test]
fn update_changes_fields() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    add(&store, "Facebook");

    vault(&store, "pw")
        .args(["update", "1", "--username", "new_user"])
        .assert()
        .success()
        .stdout(predicate::str::contains("record 1 updated"));

    vault(&store, "pw")
        .args(["show", "1", "--reveal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("new_user"))
        .stdout(predicate::str::contains("goodpassword"));
}

#[test]
fn remove_deletes_record() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    add(&store, "Facebook");
    add(&store, "GitHub");

    vault(&store, "pw")
        .args(["remove", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("record 1 removed"));

    vault(&store, "pw")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("GitHub"))
        .stdout(predicate::str::contains("Facebook").not());
}

#[test]
fn removing_unknown_record_fails() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    add(&store, "Facebook");

    vault(&store, "pw")
        .args(["remove", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn totp_prints_six_digits() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    vault(&store, "pw")
        .args(["add", "GitHub", "octo", "--password", "x", "--totp", SEED])
        .assert()
        .success();

    vault(&store, "pw")
        .args(["totp", "1"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^\d{6}\n$").unwrap());
}

#[test]
fn malformed_seed_prints_placeholder() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    vault(&store, "pw")
        .args(["add", "GitHub", "octo", "--password", "x", "--totp", "not-base32!!"])
        .assert()
        .success();

    vault(&store, "pw")
        .args(["totp", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unrecognizable seed format"));
}

#[test]
fn add_with_generated_password() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    vault(&store, "pw")
        .args(["add", "Bank", "me", "--generate", "16", "--no-symbols"])
        .assert()
        .success();

    let output = vault(&store, "pw")
        .args(["list", "--json"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let password = json[0]["password"].as_str().unwrap();
    assert_eq!(password.len(), 16);
    assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
}

#[test]
fn add_requires_a_password_source() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    vault(&store, "pw")
        .args(["add", "Bank", "me"])
        .assert()
        .failure();
}

#[test]
fn generate_needs_no_vault() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("never.db");

    bin()
        .env_remove("LOCKBOX_PASSWORD")
        .arg("--store")
        .arg(&store)
        .args(["generate", "12", "--no-upper", "--no-lower", "--no-symbols"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^\d{12}\n$").unwrap());

    assert!(!store.exists());
}

#[test]
fn migrate_on_current_vault_is_a_noop() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    add(&store, "Facebook");

    vault(&store, "pw")
        .arg("migrate")
        .assert()
        .success()
        .stdout(predicate::str::contains("migrated 0 field(s), 4 already current"));
}

#[test]
fn migrate_with_wrong_password_fails() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    add(&store, "Facebook");

    vault(&store, "typo")
        .arg("migrate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("incorrect master key"));
}

#[test]
fn title_only_update_keeps_other_fields() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("test.db");

    add(&store, "Facebook");

    vault(&store, "pw")
        .args(["update", "1", "--title", "Meta"])
        .assert()
        .success();

    vault(&store, "pw")
        .args(["show", "1", "--reveal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Meta"))
        .stdout(predicate::str::contains("cmu_student"))
        .stdout(predicate::str::contains("goodpassword"));
}
