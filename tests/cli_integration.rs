//! CLI integration tests for monorail.
//!
//! These tests drive the binary against repositories built in temp folders.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

const LOCKFILE: &str = "\
lockfileVersion: '6.0'

importers:

  .: {}

  ../../packages/a: {}
";

/// Get the monorail binary command, isolated from the user's home.
fn monorail(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("monorail").unwrap();
    cmd.env("HOME", home).env_remove("MONORAIL_TEMP_FOLDER");
    cmd
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A one-project repository, optionally pointing at a package manager.
fn repo(package_manager: Option<&str>) -> TempDir {
    let tmp = TempDir::new().unwrap();
    let mut config = String::from(
        "[[projects]]\nname = \"a\"\nfolder = \"packages/a\"\n",
    );
    if let Some(executable) = package_manager {
        config.push_str(&format!("\n[package-manager]\nexecutable = \"{}\"\n", executable));
    }
    write(tmp.path(), "monorail.toml", &config);
    write(
        tmp.path(),
        "packages/a/package.json",
        "{\n  \"name\": \"a\",\n  \"version\": \"1.0.0\"\n}\n",
    );
    tmp
}

// ============================================================================
// monorail --help
// ============================================================================

#[test]
fn test_help_lists_commands() {
    let tmp = TempDir::new().unwrap();
    monorail(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("check"));
}

// ============================================================================
// monorail check
// ============================================================================

#[test]
fn test_check_outside_repository_fails() {
    let tmp = TempDir::new().unwrap();
    monorail(tmp.path())
        .arg("check")
        .current_dir(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not find `monorail.toml`"));
}

#[test]
fn test_check_missing_lockfile_is_stale() {
    let tmp = repo(None);
    monorail(tmp.path())
        .args(["check", "--no-color"])
        .current_dir(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("the lockfile is out of date"))
        .stderr(predicate::str::contains("The lockfile does not exist"));
}

#[test]
fn test_check_matching_lockfile_from_subfolder() {
    let tmp = repo(None);
    write(tmp.path(), "common/config/monorail/pnpm-lock.yaml", LOCKFILE);

    monorail(tmp.path())
        .arg("check")
        .current_dir(tmp.path().join("packages/a"))
        .assert()
        .success()
        .stderr(predicate::str::contains("lockfile is up to date"));
}

#[test]
fn test_check_pending_sibling_rewrite_suggests_full_update() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "monorail.toml",
        "[[projects]]\nname = \"a\"\nfolder = \"packages/a\"\n\n\
         [[projects]]\nname = \"b\"\nfolder = \"packages/b\"\n",
    );
    write(
        tmp.path(),
        "packages/a/package.json",
        "{\n  \"name\": \"a\",\n  \"version\": \"1.0.0\",\n  \"dependencies\": { \"b\": \"^1.0.0\" }\n}\n",
    );
    write(
        tmp.path(),
        "packages/b/package.json",
        "{\n  \"name\": \"b\",\n  \"version\": \"1.2.0\"\n}\n",
    );

    monorail(tmp.path())
        .args(["check", "--no-color"])
        .current_dir(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("must become workspace references"))
        .stderr(predicate::str::contains("monorail update --full"));
}

#[test]
fn test_check_unknown_variant() {
    let tmp = repo(None);
    monorail(tmp.path())
        .args(["check", "--no-color", "--variant", "nightly"])
        .current_dir(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("nightly"));
}

// ============================================================================
// monorail install / update
// ============================================================================

#[test]
fn test_install_stale_lockfile_suggests_update() {
    let tmp = repo(None);
    monorail(tmp.path())
        .args(["install", "--no-color"])
        .current_dir(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("The lockfile does not exist"));
}

#[test]
fn test_install_unknown_target_project() {
    let tmp = repo(None);
    write(tmp.path(), "common/config/monorail/pnpm-lock.yaml", LOCKFILE);
    monorail(tmp.path())
        .args(["install", "--to", "missing"])
        .current_dir(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no project named `missing`"));
}

#[cfg(unix)]
#[test]
fn test_update_then_install_skips() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = repo(Some("tools/pnpm"));
    let script = format!(
        "#!/bin/sh\ncat > pnpm-lock.yaml <<'EOF'\n{}EOF\n",
        LOCKFILE
    );
    write(tmp.path(), "tools/pnpm", &script);
    let pm = tmp.path().join("tools/pnpm");
    fs::set_permissions(&pm, fs::Permissions::from_mode(0o755)).unwrap();

    monorail(tmp.path())
        .arg("update")
        .current_dir(tmp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Finished installing after 1 attempt(s)"));

    let committed =
        fs::read_to_string(tmp.path().join("common/config/monorail/pnpm-lock.yaml")).unwrap();
    assert_eq!(committed, LOCKFILE);
    assert!(tmp
        .path()
        .join("packages/a/.monorail/temp/shrinkwrap-deps.json")
        .exists());

    monorail(tmp.path())
        .arg("install")
        .current_dir(tmp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("already up to date"));

    monorail(tmp.path())
        .arg("check")
        .current_dir(tmp.path())
        .assert()
        .success();
}

#[cfg(unix)]
#[test]
fn test_failing_package_manager_exhausts_attempts() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = repo(Some("tools/pnpm"));
    write(tmp.path(), "tools/pnpm", "#!/bin/sh\nexit 7\n");
    let pm = tmp.path().join("tools/pnpm");
    fs::set_permissions(&pm, fs::Permissions::from_mode(0o755)).unwrap();

    monorail(tmp.path())
        .arg("update")
        .current_dir(tmp.path())
        .assert()
        .failure();
}
