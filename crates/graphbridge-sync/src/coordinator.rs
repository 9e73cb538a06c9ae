//! The sync run.
//!
//! ```text
//! Idle ─► Fetching ─► SessionOpen ─► PerItemLoop ─► Acknowledging ─► Done
//!            │             │
//!            └─► Aborted ◄─┘
//! ```
//!
//! Items are processed one after another over a single session. An item is
//! acknowledged only if every one of its facts was accepted; a failing item is
//! recorded and the loop moves on. Whatever happens after the session opens,
//! it is closed exactly once before `run` returns.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use graphbridge_store::{ContentItem, ItemId, RejectedItem, SyncBatch};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AcknowledgeError, FetchError, ItemError, SessionError, SubmitError, SyncError};
use crate::extractor::{DEFAULT_GROUP_ID, FactExtractor, KnowledgeFact};
use crate::session::{GraphConnector, GraphSession};
use crate::source::ContentSource;
use crate::summary::{Abort, AckStatus, ItemOutcome, RunSummary};

/// Default tool invoked once per fact.
pub const DEFAULT_TOOL_NAME: &str = "add_episode";

/// Default bound on the fetch and acknowledgement calls.
const DEFAULT_STORE_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Run configuration, passed explicitly so runs are deterministic under test.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Namespace every fact is filed under.
    pub group_id: String,
    /// Tool invoked once per fact.
    pub tool_name: String,
    /// Deadline for the whole run.
    pub run_timeout: Option<Duration>,
    /// Bound on the fetch call.
    pub fetch_timeout: Option<Duration>,
    /// Bound on the acknowledgement call.
    pub acknowledge_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            group_id: DEFAULT_GROUP_ID.to_string(),
            tool_name: DEFAULT_TOOL_NAME.to_string(),
            run_timeout: None,
            fetch_timeout: Some(DEFAULT_STORE_CALL_TIMEOUT),
            acknowledge_timeout: Some(DEFAULT_STORE_CALL_TIMEOUT),
        }
    }
}

impl SyncConfig {
    /// Set the group id.
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    /// Set the tool name.
    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = tool_name.into();
        self
    }

    /// Set the run deadline.
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Set the fetch bound.
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the acknowledgement bound.
    pub fn with_acknowledge_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acknowledge_timeout = timeout;
        self
    }
}

/// Facts a run would submit for one item.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedItem {
    pub item_id: ItemId,
    pub facts: Vec<KnowledgeFact>,
}

/// Result of a dry run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncPlan {
    pub items: Vec<PlannedItem>,
    pub rejected: Vec<RejectedItem>,
}

impl SyncPlan {
    /// Total facts across all items.
    pub fn fact_count(&self) -> usize {
        self.items.iter().map(|i| i.facts.len()).sum()
    }
}

/// Why a guarded wait stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    Deadline,
}

/// Drives fetch, extract, submit and acknowledge for one run at a time.
pub struct SyncCoordinator {
    config: SyncConfig,
    extractor: FactExtractor,
    source: Arc<dyn ContentSource>,
    connector: Arc<dyn GraphConnector>,
}

impl SyncCoordinator {
    /// Create a coordinator.
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn ContentSource>,
        connector: Arc<dyn GraphConnector>,
    ) -> Self {
        let extractor = FactExtractor::new(config.group_id.clone());
        Self {
            config,
            extractor,
            source,
            connector,
        }
    }

    /// Run configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Fetch and extract without opening a session or acknowledging anything.
    pub async fn plan(&self) -> Result<SyncPlan, SyncError> {
        plan(self.source.as_ref(), &self.config).await
    }

    /// Execute one run.
    ///
    /// Cancelling `cancel` (or hitting the configured run deadline) stops the
    /// loop: the item in flight is recorded as failed, untouched items are
    /// skipped, already-delivered items are still acknowledged and the
    /// session is still closed.
    pub async fn run(&self, cancel: CancellationToken) -> RunSummary {
        let mut summary = RunSummary::start();
        let deadline = self.config.run_timeout.map(|t| Instant::now() + t);

        tracing::info!(run_id = %summary.run_id, "sync run started");

        // Fetching
        let batch = match self.fetch(&cancel, deadline).await {
            Ok(batch) => batch,
            Err(err) => return self.abort(summary, err),
        };
        summary.fetched = batch.len();

        if batch.is_empty() {
            tracing::info!(run_id = %summary.run_id, "no unsynced items");
            return self.finish(summary);
        }

        let SyncBatch { items, rejected } = batch;
        for item in rejected {
            tracing::warn!(item_id = %item.id, reason = %item.reason, "item payload unreadable");
            summary.record(ItemOutcome::failed(
                item.id,
                0,
                None,
                format!("unreadable analysis payload: {}", item.reason),
            ));
        }

        if items.is_empty() {
            return self.finish(summary);
        }

        // SessionOpen
        tracing::info!(items = items.len(), "opening graph session");
        let mut session = match guarded(self.connector.open(), &cancel, deadline).await {
            Ok(Ok(session)) => session,
            Ok(Err(err)) => {
                summary.skipped = items.len();
                return self.abort(summary, SyncError::Session(err));
            }
            Err(interrupt) => {
                summary.skipped = items.len();
                summary.cancelled = true;
                let err = match interrupt {
                    Interrupt::Cancelled => SessionError::Cancelled,
                    Interrupt::Deadline => {
                        SessionError::Timeout(self.config.run_timeout.unwrap_or_default())
                    }
                };
                return self.abort(summary, SyncError::Session(err));
            }
        };

        // PerItemLoop
        self.process_items(&mut summary, session.as_mut(), items, &cancel, deadline)
            .await;

        // Acknowledging
        summary.acknowledgement = self.acknowledge(summary.succeeded_ids()).await;

        // Done
        if let Err(err) = session.close().await {
            tracing::warn!(error = %err, "graph session did not close cleanly");
        }
        self.finish(summary)
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<SyncBatch, SyncError> {
        fetch_batch(self.source.as_ref(), &self.config, cancel, deadline).await
    }

    async fn process_items(
        &self,
        summary: &mut RunSummary,
        session: &mut dyn GraphSession,
        items: Vec<ContentItem>,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) {
        let total = items.len();

        for (index, item) in items.into_iter().enumerate() {
            if let Some(interrupt) = interrupted(cancel, deadline) {
                summary.skipped = total - index;
                summary.cancelled = true;
                tracing::warn!(
                    reason = ?interrupt,
                    skipped = summary.skipped,
                    "run interrupted; remaining items left unsynced"
                );
                return;
            }

            let facts = self.extractor.extract(&item.analysis);
            let result = self
                .submit_item(session, &item.id, &facts, cancel, deadline)
                .await;

            match result {
                Ok(()) => {
                    tracing::info!(item_id = %item.id, facts = facts.len(), "item synced");
                    summary.record(ItemOutcome::success(item.id, facts.len()));
                }
                Err(err) => {
                    tracing::warn!(
                        item_id = %err.item_id,
                        fact_index = err.fact_index,
                        fact_count = err.fact_count,
                        error = %err.source,
                        "item failed"
                    );
                    let stop = matches!(err.source, SubmitError::Cancelled)
                        || interrupted(cancel, deadline).is_some();
                    summary.record(ItemOutcome::failed(
                        err.item_id.clone(),
                        err.fact_count,
                        Some(err.fact_index),
                        err.to_string(),
                    ));
                    if stop {
                        summary.skipped = total - index - 1;
                        summary.cancelled = true;
                        tracing::warn!(skipped = summary.skipped, "run interrupted mid-item");
                        return;
                    }
                }
            }
        }
    }

    /// Submit an item's facts in order, stopping at the first failure.
    async fn submit_item(
        &self,
        session: &mut dyn GraphSession,
        item_id: &ItemId,
        facts: &[KnowledgeFact],
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<(), ItemError> {
        let tool = self.config.tool_name.as_str();

        for (fact_index, fact) in facts.iter().enumerate() {
            tracing::debug!(
                item_id = %item_id,
                fact_index,
                content = %fact.content,
                "submitting fact"
            );

            let outcome = guarded(
                session.call_tool(tool, fact.to_arguments()),
                cancel,
                deadline,
            )
            .await;

            let source = match outcome {
                Ok(Ok(ack)) => {
                    tracing::trace!(item_id = %item_id, fact_index, ack = %ack, "fact accepted");
                    continue;
                }
                Ok(Err(err)) => err,
                Err(Interrupt::Cancelled) => SubmitError::Cancelled,
                Err(Interrupt::Deadline) => SubmitError::Timeout,
            };

            return Err(ItemError {
                item_id: item_id.clone(),
                fact_index,
                fact_count: facts.len(),
                source,
            });
        }

        Ok(())
    }

    /// Acknowledge delivered items. Runs even after cancellation.
    async fn acknowledge(&self, ids: Vec<ItemId>) -> AckStatus {
        if ids.is_empty() {
            return AckStatus::NotNeeded;
        }

        tracing::info!(count = ids.len(), "acknowledging synced items");
        let result = match bounded(self.config.acknowledge_timeout, self.source.mark_synced(&ids)).await {
            Some(result) => result,
            None => Err(AcknowledgeError::Timeout(
                self.config.acknowledge_timeout.unwrap_or_default(),
            )),
        };

        match result {
            Ok(()) => AckStatus::Acknowledged { count: ids.len() },
            Err(err) => {
                tracing::error!(
                    error = %err,
                    count = ids.len(),
                    "acknowledgement failed; delivered items stay unsynced and will be resubmitted"
                );
                AckStatus::Failed {
                    ids,
                    error: err.to_string(),
                }
            }
        }
    }

    fn abort(&self, mut summary: RunSummary, err: SyncError) -> RunSummary {
        if err.is_cancelled() {
            summary.cancelled = true;
        }
        tracing::error!(run_id = %summary.run_id, phase = ?err.phase(), error = %err, "sync run aborted");
        summary.aborted = Some(Abort::from(&err));
        summary.finish()
    }

    fn finish(&self, summary: RunSummary) -> RunSummary {
        let summary = summary.finish();
        tracing::info!(
            run_id = %summary.run_id,
            status = ?summary.status(),
            fetched = summary.fetched,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            facts = summary.facts_submitted,
            acknowledgement = ?summary.acknowledgement,
            "sync run finished"
        );
        summary
    }
}

/// Dry run: fetch and extract only.
pub async fn plan(source: &dyn ContentSource, config: &SyncConfig) -> Result<SyncPlan, SyncError> {
    let extractor = FactExtractor::new(config.group_id.clone());
    let batch = fetch_batch(source, config, &CancellationToken::new(), None).await?;
    let items = batch
        .items
        .iter()
        .map(|item| PlannedItem {
            item_id: item.id.clone(),
            facts: extractor.extract(&item.analysis),
        })
        .collect();
    Ok(SyncPlan {
        items,
        rejected: batch.rejected,
    })
}

async fn fetch_batch(
    source: &dyn ContentSource,
    config: &SyncConfig,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> Result<SyncBatch, SyncError> {
    tracing::debug!("fetching unsynced items");
    let fetch = bounded(config.fetch_timeout, source.fetch_unsynced());

    match guarded(fetch, cancel, deadline).await {
        Ok(Some(result)) => Ok(result?),
        Ok(None) => Err(FetchError::Timeout(config.fetch_timeout.unwrap_or_default()).into()),
        Err(Interrupt::Cancelled) => Err(FetchError::Cancelled.into()),
        Err(Interrupt::Deadline) => {
            Err(FetchError::Timeout(config.run_timeout.unwrap_or_default()).into())
        }
    }
}

fn interrupted(cancel: &CancellationToken, deadline: Option<Instant>) -> Option<Interrupt> {
    if cancel.is_cancelled() {
        Some(Interrupt::Cancelled)
    } else if deadline.is_some_and(|d| Instant::now() >= d) {
        Some(Interrupt::Deadline)
    } else {
        None
    }
}

/// Race `fut` against cancellation and the run deadline.
async fn guarded<F: Future>(
    fut: F,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> Result<F::Output, Interrupt> {
    let expired = async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        _ = expired => Err(Interrupt::Deadline),
        out = fut => Ok(out),
    }
}

/// Apply an optional timeout; `None` means it elapsed.
async fn bounded<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}
