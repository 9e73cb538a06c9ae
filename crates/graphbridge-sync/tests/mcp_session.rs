//! Sync runs over a real MCP session.
//!
//! These tests spawn the `sync-mock-graph-server` binary through
//! [`McpConnector`], so submissions cross actual pipes and framing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graphbridge_mcp::McpServerConfig;
use graphbridge_store::{ItemId, SyncBatch};
use graphbridge_sync::{
    AckStatus, AcknowledgeError, ContentSource, FetchError, GraphConnector, GraphSession,
    ItemStatus, McpConnector, RunStatus, SubmitError, SyncConfig, SyncCoordinator,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

fn mock_server() -> String {
    env!("CARGO_BIN_EXE_sync-mock-graph-server").to_string()
}

fn server_config(args: &[&str]) -> McpServerConfig {
    McpServerConfig::new("graphiti-mcp", mock_server())
        .with_args(args.iter().map(|a| a.to_string()).collect())
        .with_handshake_timeout(Duration::from_secs(10))
        .with_request_timeout(Duration::from_secs(10))
}

/// Store that serves a fixed batch and records acknowledgements.
struct StaticStore {
    raw_items: Vec<Value>,
    acked: Mutex<Vec<Vec<ItemId>>>,
}

impl StaticStore {
    fn new(raw_items: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            raw_items,
            acked: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ContentSource for StaticStore {
    async fn fetch_unsynced(&self) -> Result<SyncBatch, FetchError> {
        Ok(SyncBatch::from_raw_items(self.raw_items.clone()))
    }

    async fn mark_synced(&self, ids: &[ItemId]) -> Result<(), AcknowledgeError> {
        self.acked.lock().push(ids.to_vec());
        Ok(())
    }
}

fn fed_item(id: &str) -> Value {
    json!({
        "id": id,
        "analysis_payload": {
            "summary": "Fed holds rates",
            "detail": "no cuts 2026",
            "relationships": [
                {"target": "USD", "type": "bullish_for", "description": "rate stability"}
            ]
        }
    })
}

fn recorded_contents(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| {
            let value: Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["group_id"], "market_signals");
            value["content"].as_str().unwrap().to_string()
        })
        .collect()
}

#[tokio::test]
async fn test_fed_item_reaches_graph_server_and_is_acknowledged() {
    let dir = tempfile::tempdir().unwrap();
    let record = dir.path().join("episodes.jsonl");
    let record_arg = record.to_string_lossy().to_string();

    let store = StaticStore::new(vec![fed_item("A")]);
    let connector = Arc::new(McpConnector::new(server_config(&["--record", &record_arg])));
    let coordinator = SyncCoordinator::new(SyncConfig::default(), store.clone(), connector);

    let summary = coordinator.run(CancellationToken::new()).await;

    assert_eq!(summary.status(), RunStatus::Success);
    assert_eq!(summary.facts_submitted, 2);
    assert_eq!(
        recorded_contents(&record),
        vec![
            "MARKET SIGNAL: Fed holds rates. Detail: no cuts 2026",
            "RELATIONSHIP: Fed holds rates bullish_for USD. Context: rate stability",
        ]
    );
    assert_eq!(*store.acked.lock(), vec![vec![ItemId::from("A")]]);
    assert_eq!(summary.acknowledgement, AckStatus::Acknowledged { count: 1 });
}

#[tokio::test]
async fn test_rejected_episode_leaves_item_unsynced() {
    let dir = tempfile::tempdir().unwrap();
    let record = dir.path().join("episodes.jsonl");
    let record_arg = record.to_string_lossy().to_string();

    let store = StaticStore::new(vec![
        fed_item("A"),
        json!({"id": "B", "analysis_payload": {"summary": "Oil slides"}}),
    ]);
    let connector = Arc::new(McpConnector::new(server_config(&[
        "--reject-containing",
        "RELATIONSHIP",
        "--record",
        &record_arg,
    ])));
    let coordinator = SyncCoordinator::new(SyncConfig::default(), store.clone(), connector);

    let summary = coordinator.run(CancellationToken::new()).await;

    let a = summary.outcome(&ItemId::from("A")).unwrap();
    assert_eq!(a.status, ItemStatus::Failed);
    assert_eq!(a.failed_fact, Some(1));
    assert!(a.error.as_deref().unwrap().contains("rejected episode"));

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(*store.acked.lock(), vec![vec![ItemId::from("B")]]);
    assert_eq!(summary.status(), RunStatus::PartialFailure);
    assert_eq!(
        recorded_contents(&record),
        vec![
            "MARKET SIGNAL: Fed holds rates. Detail: no cuts 2026",
            "MARKET SIGNAL: Oil slides. Detail: ",
        ]
    );
}

#[tokio::test]
async fn test_session_maps_tool_errors_to_rejections() {
    let connector = McpConnector::new(server_config(&["--reject-containing", "bad"]));
    let mut session = connector.open().await.unwrap();

    let ack = session
        .call_tool("add_episode", json!({"content": "fine", "group_id": "g"}))
        .await
        .unwrap();
    assert_eq!(ack, "Episode queued in g");

    let err = session
        .call_tool("add_episode", json!({"content": "bad fact", "group_id": "g"}))
        .await
        .unwrap_err();
    assert_eq!(err, SubmitError::Rejected("rejected episode: bad fact".to_string()));

    // A JSON-RPC error from the server is a rejection too, not a broken channel.
    let err = session
        .call_tool("add_episode", json!({"content": "no group"}))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Rejected(_)));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_session_reports_crashed_server_as_transport_failure() {
    let connector = McpConnector::new(server_config(&["--crash-on", "add_episode"]));
    let mut session = connector.open().await.unwrap();

    let err = session
        .call_tool("add_episode", json!({"content": "x", "group_id": "g"}))
        .await
        .unwrap_err();
    assert!(err.is_transport(), "unexpected error: {err:?}");

    // Closing after the child died still succeeds.
    session.close().await.unwrap();
}
