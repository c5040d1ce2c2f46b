//! End-to-end tests of the `casefile` binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

fn casefile() -> Command {
    let mut cmd = Command::cargo_bin("casefile").unwrap();
    cmd.env_remove("CASEFILE_SERVER_URL").env_remove("LOG_LEVEL");
    cmd
}

fn archive() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"hello world").unwrap();
    file
}

#[test]
fn test_help_lists_commands() {
    casefile()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("enqueue"))
        .stdout(predicate::str::contains("dead-letters"));
}

#[test]
fn test_hash_prints_digest_offline() {
    let file = archive();
    casefile()
        .args(["hash", "-o", "json"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(HELLO_SHA256))
        .stdout(predicate::str::contains("job_id"));
}

#[test]
fn test_hash_missing_file_exits_2() {
    casefile()
        .args(["hash", "/no/such/archive.mbox"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn test_enqueue_needs_hash_or_file() {
    casefile()
        .args(["enqueue", "s3://bucket/inbox.mbox"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--hash"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_enqueue_sends_computed_hash() {
    let server = MockServer::start().await;
    let job_id = uuid::Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/api/v1/jobs"))
        .and(body_partial_json(serde_json::json!({
            "source_ref": { "location": "s3://bucket/inbox.mbox", "content_hash": HELLO_SHA256 }
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
            "job_id": job_id,
            "created": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let file = archive();
    let uri = server.uri();
    let path = file.path().to_path_buf();
    let assert = tokio::task::spawn_blocking(move || {
        casefile()
            .args(["--server-url", &uri, "enqueue", "s3://bucket/inbox.mbox", "--file"])
            .arg(&path)
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains(job_id.to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_job_exits_3() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": "not_found",
            "message": "Job not found"
        })))
        .mount(&server)
        .await;

    let uri = server.uri();
    let assert = tokio::task::spawn_blocking(move || {
        casefile()
            .args(["--server-url", &uri, "status", &uuid::Uuid::new_v4().to_string()])
            .assert()
    })
    .await
    .unwrap();

    assert.code(3).stderr(predicate::str::contains("Job not found"));
}
