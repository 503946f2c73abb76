//! End-to-end tests against a real `gpg` binary. Each test skips cleanly
//! when gpg is not installed.

use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;

fn gpg_available() -> bool {
    StdCommand::new("gpg")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn passrelay(home: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("passrelay");
    cmd.arg("--home").arg(home);
    cmd
}

/// Run gpg in an isolated homedir, panicking on failure.
fn gpg(gnupg_home: &Path, args: &[&str], stdin: Option<&str>) -> Vec<u8> {
    let mut cmd = StdCommand::new("gpg");
    cmd.arg("--homedir")
        .arg(gnupg_home)
        .args(["--batch", "--no-tty", "--yes"])
        .args(args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    let mut child = cmd.spawn().expect("spawn gpg");
    if let Some(data) = stdin {
        use std::io::Write;
        child
            .stdin
            .take()
            .expect("gpg stdin")
            .write_all(data.as_bytes())
            .expect("write gpg stdin");
    } else {
        drop(child.stdin.take());
    }
    let output = child.wait_with_output().expect("wait for gpg");
    assert!(
        output.status.success(),
        "gpg {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    output.stdout
}

/// Generate a test key (optionally passphrase-protected) and return
/// (key file, secret file) for a secret encrypted to it.
fn make_fixtures_with_passphrase(
    dir: &Path,
    plaintext: &str,
    passphrase: &str,
) -> (PathBuf, PathBuf) {
    let gnupg_home = dir.join("gnupghome");
    std::fs::create_dir_all(&gnupg_home).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&gnupg_home, std::fs::Permissions::from_mode(0o700)).unwrap();
    }

    gpg(
        &gnupg_home,
        &[
            "--pinentry-mode",
            "loopback",
            "--passphrase",
            passphrase,
            "--quick-generate-key",
            "Test User <test@example.com>",
            "default",
            "default",
            "never",
        ],
        None,
    );

    let key = gpg(
        &gnupg_home,
        &[
            "--pinentry-mode",
            "loopback",
            "--passphrase",
            passphrase,
            "--armor",
            "--export-secret-keys",
            "test@example.com",
        ],
        None,
    );
    let key_path = dir.join("key.asc");
    std::fs::write(&key_path, key).unwrap();

    let message = gpg(
        &gnupg_home,
        &[
            "--armor",
            "--encrypt",
            "--recipient",
            "test@example.com",
            "--trust-model",
            "always",
        ],
        Some(plaintext),
    );
    let secret_path = dir.join("example.com.gpg");
    std::fs::write(&secret_path, message).unwrap();

    (key_path, secret_path)
}

fn make_fixtures(dir: &Path, plaintext: &str) -> (PathBuf, PathBuf) {
    make_fixtures_with_passphrase(dir, plaintext, "")
}

#[test]
fn full_round_trip_with_real_gpg() {
    if !gpg_available() {
        eprintln!("skipping: gpg not installed");
        return;
    }

    let dir = assert_fs::TempDir::new().unwrap();
    let home = dir.path().join("store");
    let (key_path, secret_path) = make_fixtures(dir.path(), "hunter2\nsecond line\n");

    passrelay(&home).arg("init").assert().success();

    passrelay(&home)
        .args(["keys", "add"])
        .arg(&key_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Added key"))
        .stdout(predicate::str::contains("Test User"));

    passrelay(&home)
        .args(["secrets", "add"])
        .arg(&secret_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Added secret 'example.com'"));

    passrelay(&home)
        .args(["keys", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test User <test@example.com>"));

    passrelay(&home)
        .args(["secrets", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("example.com"));

    // The secret is encrypted to the encryption sub-key, so this exercises
    // sub-key resolution; the key is unprotected, so no prompt appears.
    passrelay(&home)
        .args(["show", "example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2"))
        .stdout(predicate::str::contains("second line"));

    passrelay(&home)
        .arg("log")
        .assert()
        .success()
        .stdout(predicate::str::contains("example.com"));
}

#[test]
fn rename_and_remove_with_real_gpg() {
    if !gpg_available() {
        eprintln!("skipping: gpg not installed");
        return;
    }

    let dir = assert_fs::TempDir::new().unwrap();
    let home = dir.path().join("store");
    let (key_path, secret_path) = make_fixtures(dir.path(), "hunter2\n");

    passrelay(&home).arg("init").assert().success();
    passrelay(&home)
        .args(["keys", "add"])
        .arg(&key_path)
        .assert()
        .success();
    passrelay(&home)
        .args(["secrets", "add"])
        .arg(&secret_path)
        .assert()
        .success();

    passrelay(&home)
        .args(["secrets", "rename", "example.com", "login.example.com"])
        .assert()
        .success();

    passrelay(&home)
        .args(["secrets", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("login.example.com"));

    passrelay(&home)
        .args(["show", "login.example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2"));

    // Declining the confirmation leaves the secret in place.
    passrelay(&home)
        .args(["secrets", "remove", "login.example.com"])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Aborted"));

    passrelay(&home)
        .args(["secrets", "remove", "login.example.com"])
        .write_stdin("y\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed secret"));

    passrelay(&home)
        .args(["show", "login.example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn protected_key_prompts_for_the_passphrase() {
    if !gpg_available() {
        eprintln!("skipping: gpg not installed");
        return;
    }

    let dir = assert_fs::TempDir::new().unwrap();
    let home = dir.path().join("store");
    let (key_path, secret_path) =
        make_fixtures_with_passphrase(dir.path(), "hunter2\n", "open sesame");

    passrelay(&home).arg("init").assert().success();
    passrelay(&home)
        .args(["keys", "add"])
        .arg(&key_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("passphrase-protected"));
    passrelay(&home)
        .args(["secrets", "add"])
        .arg(&secret_path)
        .assert()
        .success();

    // Correct passphrase on the first try.
    passrelay(&home)
        .args(["show", "example.com"])
        .write_stdin("open sesame\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Password for key Test User"))
        .stdout(predicate::str::contains("hunter2"));

    // Three wrong attempts give up without plaintext.
    passrelay(&home)
        .args(["show", "example.com"])
        .write_stdin("wrong\nwrong\nwrong\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrong password, try again."))
        .stdout(predicate::str::contains("giving up after 3 attempts"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn relay_respond_round_trip() {
    if !gpg_available() {
        eprintln!("skipping: gpg not installed");
        return;
    }

    let dir = assert_fs::TempDir::new().unwrap();
    let home = dir.path().join("store");
    let (key_path, secret_path) = make_fixtures(dir.path(), "hunter2\nsecond line\n");

    passrelay(&home).arg("init").assert().success();
    passrelay(&home)
        .args(["keys", "add"])
        .arg(&key_path)
        .assert()
        .success();
    passrelay(&home)
        .args(["secrets", "add"])
        .arg(&secret_path)
        .assert()
        .success();

    let hash_out = passrelay(&home).args(["relay", "hash"]).assert().success();
    let hash = String::from_utf8(hash_out.get_output().stdout.clone()).unwrap();
    let hash = hash.trim();

    // A valid request delivers only the first line, scoped to the sender.
    let request = format!(
        "{{\"origin\":\"https://example.com\",\"data\":{{\"sourceScript\":\"passrelayInjector\",\"hash\":\"{hash}\"}}}}\n"
    );
    passrelay(&home)
        .args(["relay", "respond"])
        .write_stdin(request)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"password\":\"hunter2\""))
        .stdout(predicate::str::contains("\"origin\":\"https://example.com\""))
        .stdout(predicate::str::contains("second line").not());

    // A stale hash is refused before any store lookup.
    let stale = "{\"origin\":\"https://example.com\",\"data\":{\"sourceScript\":\"passrelayInjector\",\"hash\":\"0000\"}}\n";
    passrelay(&home)
        .args(["relay", "respond"])
        .write_stdin(stale)
        .assert()
        .success()
        .stdout(predicate::str::contains("outdated"))
        .stdout(predicate::str::contains("password").not());

    // An unknown hostname reports not-found and sends nothing.
    let unknown = format!(
        "{{\"origin\":\"https://nowhere.example\",\"data\":{{\"sourceScript\":\"passrelayInjector\",\"hash\":\"{hash}\"}}}}\n"
    );
    passrelay(&home)
        .args(["relay", "respond"])
        .write_stdin(unknown)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "could not find a secret named nowhere.example",
        ));
}
