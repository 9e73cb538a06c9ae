//! CLI integration tests for the graphbridge command-line interface.
//!
//! Every test points `GRAPHBRIDGE_CONFIG_DIR` and the working directory at a
//! fresh temp dir so no user or project config leaks in. Tests that need a
//! content store run a wiremock server on a multi-threaded runtime and drive
//! the binary from a blocking task.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Get a command for the graphbridge binary, isolated in `dir`.
fn graphbridge(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("graphbridge").unwrap();
    cmd.current_dir(dir)
        .env("GRAPHBRIDGE_CONFIG_DIR", dir)
        .env_remove("GRAPHBRIDGE_STORE_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn fed_item() -> Value {
    json!({
        "id": "A",
        "analysis_payload": {
            "summary": "Fed holds rates",
            "detail": "no cuts 2026",
            "relationships": [
                {"target": "USD", "type": "bullish_for", "description": "rate stability"}
            ]
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    let dir = TempDir::new().unwrap();
    graphbridge(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("knowledge graph"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    graphbridge(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("graphbridge"));
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    graphbridge(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_sync_help_shows_flags() {
    let dir = TempDir::new().unwrap();
    graphbridge(dir.path())
        .args(["sync", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--timeout"));
}

#[test]
fn test_unknown_subcommand_rejected() {
    let dir = TempDir::new().unwrap();
    graphbridge(dir.path())
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Extract Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_extract_prints_facts() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("batch.json");
    std::fs::write(&file, json!({"items": [fed_item()]}).to_string()).unwrap();

    graphbridge(dir.path())
        .arg("extract")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "MARKET SIGNAL: Fed holds rates. Detail: no cuts 2026",
        ))
        .stdout(predicate::str::contains(
            "RELATIONSHIP: Fed holds rates bullish_for USD. Context: rate stability",
        ));
}

#[test]
fn test_extract_json_uses_group_override() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("items.json");
    std::fs::write(&file, json!([fed_item()]).to_string()).unwrap();

    let output = graphbridge(dir.path())
        .args(["--json", "extract", "--group-id", "macro"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success());

    let body: Value = serde_json::from_slice(&output.stdout).unwrap();
    let facts = body["items"][0]["facts"].as_array().unwrap();
    assert_eq!(facts.len(), 2);
    assert!(facts.iter().all(|f| f["group_id"] == "macro"));
    assert_eq!(body["rejected"], json!([]));
}

#[test]
fn test_extract_reports_unreadable_items() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("batch.json");
    let batch = json!({"items": [{"id": 9, "analysis_payload": "{not json"}]});
    std::fs::write(&file, batch.to_string()).unwrap();

    graphbridge(dir.path())
        .arg("extract")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("unreadable"));
}

#[test]
fn test_extract_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    graphbridge(dir.path())
        .args(["extract", "no-such-file.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to read"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_defaults() {
    let dir = TempDir::new().unwrap();
    graphbridge(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://localhost:8787"))
        .stdout(predicate::str::contains("(not set)"));
}

#[test]
fn test_config_show_explicit_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("custom.toml");
    std::fs::write(
        &file,
        r#"
[store]
base_url = "http://store.internal:9000"

[graph]
command = "graphiti-mcp"
group_id = "macro"
"#,
    )
    .unwrap();

    graphbridge(dir.path())
        .arg("--config")
        .arg(&file)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://store.internal:9000"))
        .stdout(predicate::str::contains("graphiti-mcp"))
        .stdout(predicate::str::contains("macro"));
}

#[test]
fn test_config_show_json() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("graphbridge.toml"),
        "[sync]\nrun_timeout_secs = 120\n",
    )
    .unwrap();

    let output = graphbridge(dir.path())
        .args(["--json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let body: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["config"]["sync"]["run_timeout_secs"], 120);
    let sources = body["sources"].as_array().unwrap();
    assert!(sources.iter().any(|s| s["loaded"] == true));
}

#[test]
fn test_store_url_flag_overrides_config() {
    let dir = TempDir::new().unwrap();
    graphbridge(dir.path())
        .args(["--store-url", "http://override:1234", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://override:1234"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = TempDir::new().unwrap();
    graphbridge(dir.path())
        .args(["--config", "missing.toml", "config", "show"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("configuration"));
}

#[test]
fn test_invalid_toml_in_explicit_config_fails() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("broken.toml");
    std::fs::write(&file, "[store\nbase_url = ").unwrap();

    graphbridge(dir.path())
        .arg("--config")
        .arg(&file)
        .args(["config", "show"])
        .assert()
        .code(2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Sync and Check Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_sync_requires_graph_command() {
    let dir = TempDir::new().unwrap();
    graphbridge(dir.path())
        .args(["--store-url", "http://127.0.0.1:1", "sync"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("command"));
}

#[test]
fn test_check_requires_graph_command() {
    let dir = TempDir::new().unwrap();
    graphbridge(dir.path())
        .arg("check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("command"));
}

#[test]
fn test_sync_rejects_zero_timeout() {
    let dir = TempDir::new().unwrap();
    graphbridge(dir.path())
        .args(["sync", "--dry-run", "--timeout", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--timeout"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_dry_run_prints_plan() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/knowledge/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [fed_item()]})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/knowledge/mark-synced"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let uri = server.uri();
    let output = tokio::task::spawn_blocking(move || {
        graphbridge(dir.path())
            .args(["--json", "--store-url", &uri, "sync", "--dry-run"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();
    assert!(output.status.success());

    let plan: Value = serde_json::from_slice(&output.stdout).unwrap();
    let facts = plan["items"][0]["facts"].as_array().unwrap();
    assert_eq!(plan["items"][0]["item_id"], "A");
    assert_eq!(facts.len(), 2);
    assert_eq!(
        facts[1]["content"],
        "RELATIONSHIP: Fed holds rates bullish_for USD. Context: rate stability"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_store_unavailable_aborts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/knowledge/sync"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("graphbridge.toml"),
        "[graph]\ncommand = \"graph-server-that-is-never-started\"\n",
    )
    .unwrap();
    let uri = server.uri();
    let output = tokio::task::spawn_blocking(move || {
        graphbridge(dir.path())
            .args(["--json", "--store-url", &uri, "sync"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();
    assert_eq!(output.status.code(), Some(2));

    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["aborted"]["phase"], "fetching");
    assert_eq!(summary["fetched"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_unstartable_graph_server_aborts_without_ack() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/knowledge/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [fed_item()]})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/knowledge/mark-synced"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("graphbridge.toml"),
        "[graph]\ncommand = \"/nonexistent/graphbridge-test-server\"\n",
    )
    .unwrap();
    let uri = server.uri();
    let output = tokio::task::spawn_blocking(move || {
        graphbridge(dir.path())
            .args(["--store-url", &uri, "sync"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("aborted"), "stdout: {stdout}");
}
