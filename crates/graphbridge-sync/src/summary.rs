//! Run summary emitted at the end of every run.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use graphbridge_store::ItemId;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Phase, SyncError};

/// Final state of one item in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Every fact was accepted; the item is queued for acknowledgement.
    Success,
    /// Some fact failed or the payload was unreadable; the item stays unsynced.
    Failed,
}

/// Per-item outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub item_id: ItemId,
    pub status: ItemStatus,
    /// Facts extracted from the item.
    pub facts: usize,
    /// Facts the graph accepted before the item finished.
    pub submitted: usize,
    /// Index of the failing fact, when a submission failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_fact: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    pub(crate) fn success(item_id: ItemId, facts: usize) -> Self {
        Self {
            item_id,
            status: ItemStatus::Success,
            facts,
            submitted: facts,
            failed_fact: None,
            error: None,
        }
    }

    pub(crate) fn failed(
        item_id: ItemId,
        facts: usize,
        failed_fact: Option<usize>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            item_id,
            status: ItemStatus::Failed,
            facts,
            submitted: failed_fact.unwrap_or(0),
            failed_fact,
            error: Some(error.into()),
        }
    }

    /// Whether the item was fully delivered.
    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Success
    }
}

/// What happened to the acknowledgement batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AckStatus {
    /// No item succeeded, so nothing was sent.
    NotNeeded,
    /// The store accepted the batch.
    Acknowledged { count: usize },
    /// Facts were delivered but the store still considers these items unsynced.
    Failed { ids: Vec<ItemId>, error: String },
}

impl AckStatus {
    /// Whether the acknowledgement call failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, AckStatus::Failed { .. })
    }
}

/// Why a run stopped before processing items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Abort {
    pub phase: Phase,
    pub error: String,
}

impl From<&SyncError> for Abort {
    fn from(err: &SyncError) -> Self {
        Self {
            phase: err.phase(),
            error: err.to_string(),
        }
    }
}

/// Overall result of a run, mapped to the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every fetched item was synced (or there was nothing to do).
    Success,
    /// The run finished but some item failed, was skipped, or the
    /// acknowledgement failed.
    PartialFailure,
    /// Fetch or session open failed.
    Aborted,
}

impl RunStatus {
    /// Process exit code for this status.
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::PartialFailure => 1,
            RunStatus::Aborted => 2,
        }
    }
}

/// Structured report of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Items the store returned, readable or not.
    pub fetched: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items never started because the run was cancelled or aborted.
    pub skipped: usize,
    /// Facts the graph accepted across all items.
    pub facts_submitted: usize,
    pub outcomes: Vec<ItemOutcome>,
    pub acknowledgement: AckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<Abort>,
    /// Cancellation or the run deadline cut the run short.
    pub cancelled: bool,
}

impl RunSummary {
    pub(crate) fn start() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            fetched: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            facts_submitted: 0,
            outcomes: Vec::new(),
            acknowledgement: AckStatus::NotNeeded,
            aborted: None,
            cancelled: false,
        }
    }

    pub(crate) fn record(&mut self, outcome: ItemOutcome) {
        self.facts_submitted += outcome.submitted;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    /// Overall status.
    pub fn status(&self) -> RunStatus {
        if self.aborted.is_some() {
            RunStatus::Aborted
        } else if self.failed > 0 || self.skipped > 0 || self.acknowledgement.is_failed() {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        }
    }

    /// Ids of items that were fully delivered, once each.
    ///
    /// An id that also has a failed outcome (the store listed it twice) is
    /// left out.
    pub fn succeeded_ids(&self) -> Vec<ItemId> {
        let failed: HashSet<&ItemId> = self
            .outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| &o.item_id)
            .collect();
        let mut seen = HashSet::new();
        self.outcomes
            .iter()
            .filter(|o| o.is_success() && !failed.contains(&o.item_id))
            .filter(|o| seen.insert(&o.item_id))
            .map(|o| o.item_id.clone())
            .collect()
    }

    /// Outcome for a given item.
    pub fn outcome(&self, id: &ItemId) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|o| &o.item_id == id)
    }

    /// Wall-clock duration of the run.
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
