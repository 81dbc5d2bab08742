//! End-to-end CLI tests for the court-monitor binary.

#![allow(deprecated)]

mod support;

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use support::socket_guard::{socket_skip_return, start_mock_server_or_skip};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn monitor(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("court-monitor").unwrap();
    cmd.current_dir(workdir).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let temp_dir = TempDir::new().unwrap();
    monitor(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Monitor the AIFC court website"))
        .stdout(predicate::str::contains("retry-failed"))
        .stdout(predicate::str::contains("reorganize"));
}

#[test]
fn test_binary_version_displays_version() {
    let temp_dir = TempDir::new().unwrap();
    monitor(temp_dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("court-monitor"));
}

#[test]
fn test_binary_requires_subcommand() {
    let temp_dir = TempDir::new().unwrap();
    monitor(temp_dir.path()).assert().failure();
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    let temp_dir = TempDir::new().unwrap();
    monitor(temp_dir.path())
        .args(["report", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_report_on_fresh_state() {
    let temp_dir = TempDir::new().unwrap();
    monitor(temp_dir.path())
        .args(["report"])
        .assert()
        .success()
        .stdout(predicate::str::contains("discovered:       0"))
        .stdout(predicate::str::contains("First run:  pending"));
}

#[test]
fn test_report_json_is_machine_readable() {
    let temp_dir = TempDir::new().unwrap();
    let output = monitor(temp_dir.path())
        .args(["-q", "report", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["discovered"], 0);
    assert_eq!(report["first_run_completed"], false);
    assert!(report["categories"]["Judgments"].is_object());
}

#[test]
fn test_malformed_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("monitor_config.json"), "{ nope").unwrap();
    monitor(temp_dir.path())
        .args(["report"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("monitor_config.json"));
}

#[test]
fn test_out_of_range_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("monitor_config.json"),
        r#"{"max_filename_length": 4}"#,
    )
    .unwrap();
    monitor(temp_dir.path())
        .args(["audit"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_filename_length"));
}

#[test]
fn test_audit_backfills_file_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let url = "https://court.example/uploads/judgments/case_no_1_2019.pdf";
    std::fs::write(
        temp_dir.path().join("discovered_files.json"),
        serde_json::json!({
            "files": {
                url: {
                    "first_seen": "2024-01-01T00:00:00Z",
                    "last_seen": "2024-01-01T00:00:00Z",
                    "downloaded": false,
                    "is_new": true
                }
            },
            "last_full_scan": null
        })
        .to_string(),
    )
    .unwrap();
    let file = temp_dir
        .path()
        .join("aifc_documents/AIFC_Court/Judgments/2019/case_no_1_2019.pdf");
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(&file, vec![1u8; 4096]).unwrap();

    monitor(temp_dir.path())
        .args(["audit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("outdated_record"))
        .stdout(predicate::str::contains("Backfilled 1 record(s)"));

    let downloaded: serde_json::Value = serde_json::from_slice(
        &std::fs::read(temp_dir.path().join("downloaded_files.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(downloaded[url]["method"], "record_fixed");
    assert_eq!(downloaded[url]["size"], 4096);
}

#[test]
fn test_reorganize_dry_run_then_move() {
    let temp_dir = TempDir::new().unwrap();
    let url = "https://court.example/uploads/judgments/case_no_1_2019.pdf";
    let old = temp_dir.path().join("aifc_documents/AIFC_Court/case_no_1_2019.pdf");
    std::fs::create_dir_all(old.parent().unwrap()).unwrap();
    std::fs::write(&old, vec![1u8; 2048]).unwrap();
    std::fs::write(
        temp_dir.path().join("downloaded_files.json"),
        serde_json::json!({
            url: {
                "hash": "abc",
                "path": old,
                "downloaded_at": "2024-01-01T00:00:00Z",
                "size": 2048,
                "method": "basic"
            }
        })
        .to_string(),
    )
    .unwrap();

    monitor(temp_dir.path())
        .args(["reorganize", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 file(s) would move"))
        .stdout(predicate::str::contains("Judgments: 1"));
    assert!(old.is_file());

    monitor(temp_dir.path())
        .args(["reorganize"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Moved 1 file(s)"));

    let moved = temp_dir
        .path()
        .join("aifc_documents/AIFC_Court/Judgments/2019/case_no_1_2019.pdf");
    assert!(moved.is_file());
    assert!(!old.exists());
    let downloaded: serde_json::Value = serde_json::from_slice(
        &std::fs::read(temp_dir.path().join("downloaded_files.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        downloaded[url]["path"],
        "aifc_documents/AIFC_Court/Judgments/2019/case_no_1_2019.pdf"
    );
}

#[tokio::test]
async fn test_forced_run_mirrors_site() -> Result<(), Box<dyn std::error::Error>> {
    let Some(server) = start_mock_server_or_skip().await else {
        return socket_skip_return();
    };
    Mock::given(method("GET"))
        .and(path("/en/judgments"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><body><a href="/uploads/judgments/case_no_7_2023.pdf">7</a></body></html>"#,
            "text/html",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/uploads/judgments/case_no_7_2023.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![5u8; 3000], "application/pdf"))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new()?;
    std::fs::write(
        temp_dir.path().join("monitor_config.json"),
        serde_json::json!({
            "urls": [format!("{}/en/judgments", server.uri())],
            "max_depth": 0,
            "human_behavior": {
                "download_delay_min_secs": 0.0,
                "download_delay_max_secs": 0.0,
                "short_break_probability": 0.0,
                "long_break_probability": 0.0
            }
        })
        .to_string(),
    )?;

    monitor(temp_dir.path())
        .args(["--fetch-mode", "basic", "--state-dir", "state", "run", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 new"))
        .stdout(predicate::str::contains("First run completed."));

    assert!(
        temp_dir
            .path()
            .join("aifc_documents/AIFC_Court/Judgments/2023/case_no_7_2023.pdf")
            .is_file()
    );
    assert!(temp_dir.path().join("state/first_run_completed.json").is_file());

    monitor(temp_dir.path())
        .args(["--state-dir", "state", "report", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"first_run_completed\": true"));
    Ok(())
}
