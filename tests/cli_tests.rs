//! Integration tests driving the `atelier` binary.
//!
//! Each test gets its own temp directory with a config pointing the engine
//! at the offline reviewer, so nothing shells out to a model CLI.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn atelier() -> Command {
    cargo_bin_cmd!("atelier")
}

/// Temp workspace with an offline-reviewer config and a fresh database.
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("atelier.toml"),
        "[reviewer]\nmode = \"static\"\n",
    )
    .unwrap();
    dir
}

fn run(dir: &TempDir) -> Command {
    let mut cmd = atelier();
    cmd.arg("--config")
        .arg(dir.path().join("atelier.toml"))
        .arg("--db")
        .arg(dir.path().join("atelier.db"));
    cmd
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        atelier().arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        atelier().arg("--version").assert().success();
    }
}

mod project_flow {
    use super::*;

    #[test]
    fn test_create_shows_six_phases() {
        let dir = workspace();
        run(&dir)
            .args(["project", "create", "--name", "Acme Robotics"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created"))
            .stdout(predicate::str::contains("Discovery & strategy"))
            .stdout(predicate::str::contains("Launch"));
    }

    #[test]
    fn test_list_contains_created_project() {
        let dir = workspace();
        run(&dir)
            .args(["project", "create", "--name", "Acme Robotics"])
            .assert()
            .success();
        run(&dir)
            .args(["project", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Acme Robotics"));
    }

    #[test]
    fn test_status_of_missing_project_fails() {
        let dir = workspace();
        run(&dir)
            .args(["project", "status", "99"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }
}

mod approval_flow {
    use super::*;

    #[test]
    fn test_generate_approve_and_advance() {
        let dir = workspace();
        run(&dir)
            .args(["project", "create", "--name", "Acme Robotics"])
            .assert()
            .success();

        // Deliverable 1 is phase 1's first deliverable.
        run(&dir)
            .args(["deliverable", "generate", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Generated"));

        run(&dir)
            .args(["deliverable", "review", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("approved"));

        run(&dir)
            .args(["deliverable", "approve", "1", "--actor", "owner"])
            .assert()
            .success()
            .stdout(predicate::str::contains("approved"));

        // Phase 1 has a second deliverable, so the phase holds.
        run(&dir)
            .args(["advance", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Not ready"));
    }

    #[test]
    fn test_rejection_is_sticky_in_cli() {
        let dir = workspace();
        run(&dir)
            .args(["project", "create", "--name", "Acme Robotics"])
            .assert()
            .success();
        run(&dir)
            .args(["deliverable", "generate", "1"])
            .assert()
            .success();
        run(&dir)
            .args([
                "deliverable",
                "approve",
                "1",
                "--actor",
                "owner",
                "--reject",
                "--comment",
                "off-brand",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("rejected"));

        // Approving without a regeneration is refused.
        run(&dir)
            .args(["deliverable", "approve", "1", "--actor", "owner"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("regenerated"));
    }
}
