use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::net::TcpListener;
use tempfile::tempdir;

#[allow(deprecated)]
fn embedload() -> Command {
    let mut cmd = Command::cargo_bin("embedload").expect("binary");
    cmd.env_remove("EMBEDLOAD_HOST")
        .env_remove("EMBEDLOAD_PORT")
        .env_remove("EMBEDLOAD_WORKERS");
    cmd
}

/// A local port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn plan_prints_batches_as_json() {
    let output = embedload()
        .args(["plan", "--rows", "5", "--batch-size", "2", "--workers", "8"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let body: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(body["rows"], 5);
    assert_eq!(body["workers"], 3);
    assert_eq!(
        body["batches"],
        json!([
            {"start": 0, "end": 2},
            {"start": 2, "end": 4},
            {"start": 4, "end": 5}
        ])
    );
}

#[test]
fn plan_reads_worker_count_from_env() {
    let output = embedload()
        .env("EMBEDLOAD_WORKERS", "2")
        .args(["plan", "--rows", "10000"])
        .output()
        .unwrap();
    let body: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(body["batch_size"], 1000);
    assert_eq!(body["workers"], 2);
    assert_eq!(body["batches"].as_array().unwrap().len(), 10);
}

#[test]
fn plan_rejects_zero_batch_size() {
    embedload()
        .args(["plan", "--rows", "5", "--batch-size", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch-size"));
}

#[test]
fn unknown_index_type_is_rejected() {
    embedload()
        .args(["replace-index", "--index-type", "annoy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown index type"));
}

#[test]
fn unreachable_store_exits_with_failure() {
    let port = closed_port().to_string();
    embedload()
        .args([
            "--host",
            "127.0.0.1",
            "--port",
            &port,
            "--retries",
            "2",
            "--retry-delay-secs",
            "0",
            "--timeout-secs",
            "2",
            "replace-index",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to connect as default after 2 attempts"));
}

#[test]
fn missing_query_file_fails_before_connecting() {
    let dir = tempdir().unwrap();
    let parents = dir.path().join("parents.csv");
    fs::write(&parents, "chunk_id,cid\n1,2\n").unwrap();

    embedload()
        .args(["--port", &closed_port().to_string(), "search", "--queries"])
        .arg(dir.path().join("missing.npy"))
        .arg("--parents")
        .arg(&parents)
        .arg("--output")
        .arg(dir.path().join("out.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("input file not found"));
    assert!(!dir.path().join("out.json").exists());
}
