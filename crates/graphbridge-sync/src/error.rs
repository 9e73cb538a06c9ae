//! Sync error taxonomy.
//!
//! Fetch, session and acknowledgement failures end a run (the first two
//! abort it, the last is reported next to the delivered items). Submission
//! failures never leave the item they belong to.

use std::time::Duration;

use graphbridge_mcp::McpError;
use graphbridge_store::{ItemId, StoreError};
use serde::Serialize;
use thiserror::Error;

/// Fetching unsynced items failed; nothing was synced.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Content store unreachable, erroring or returning garbage.
    #[error("content store fetch failed: {0}")]
    Store(#[from] StoreError),

    /// The fetch did not finish in time.
    #[error("content store fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The run was cancelled while fetching.
    #[error("fetch cancelled")]
    Cancelled,

    /// Source-specific failure.
    #[error("content source unavailable: {0}")]
    Unavailable(String),
}

/// The graph session could not be opened; no item was processed.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Spawn or handshake failed.
    #[error("graph session failed: {0}")]
    Mcp(#[from] McpError),

    /// The run deadline passed while the session was opening.
    #[error("session open timed out at run deadline after {0:?}")]
    Timeout(Duration),

    /// The run was cancelled while the session was opening.
    #[error("session open cancelled")]
    Cancelled,

    /// Connector-specific failure.
    #[error("graph session unavailable: {0}")]
    Unavailable(String),
}

/// One fact could not be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The channel to the graph service broke.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The graph service answered with an error.
    #[error("rejected by graph service: {0}")]
    Rejected(String),

    /// No answer in time (per call or run deadline).
    #[error("submission timed out")]
    Timeout,

    /// The run was cancelled mid-submission.
    #[error("submission cancelled")]
    Cancelled,
}

impl SubmitError {
    /// Whether the session itself is likely unusable afterwards.
    pub fn is_transport(&self) -> bool {
        matches!(self, SubmitError::Transport(_))
    }
}

impl From<McpError> for SubmitError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Timeout => SubmitError::Timeout,
            McpError::ToolError(msg) => SubmitError::Rejected(msg),
            err if err.is_transport() => SubmitError::Transport(err.to_string()),
            err => SubmitError::Rejected(err.to_string()),
        }
    }
}

/// An item failed because one of its facts did.
#[derive(Debug, Clone, Error)]
#[error("item {item_id}: fact {} of {fact_count} failed: {source}", .fact_index + 1)]
pub struct ItemError {
    /// Owning item.
    pub item_id: ItemId,
    /// Zero-based index of the failing fact in extraction order.
    pub fact_index: usize,
    /// Number of facts extracted for the item.
    pub fact_count: usize,
    /// What went wrong.
    #[source]
    pub source: SubmitError,
}

/// Marking delivered items as synced failed.
///
/// The facts are already in the graph; the items stay unsynced and will be
/// resubmitted by the next run.
#[derive(Debug, Error)]
pub enum AcknowledgeError {
    /// Content store rejected or could not be reached.
    #[error("acknowledgement failed: {0}")]
    Store(#[from] StoreError),

    /// The acknowledgement did not finish in time.
    #[error("acknowledgement timed out after {0:?}")]
    Timeout(Duration),

    /// Source-specific failure.
    #[error("acknowledgement failed: {0}")]
    Unavailable(String),
}

/// Run phase an abort happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Fetching unsynced items.
    Fetching,
    /// Opening the graph session.
    SessionOpen,
}

/// Errors that terminate a run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl SyncError {
    /// Phase the run was in when it stopped.
    pub fn phase(&self) -> Phase {
        match self {
            SyncError::Fetch(_) => Phase::Fetching,
            SyncError::Session(_) => Phase::SessionOpen,
        }
    }

    /// Whether the abort came from cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            SyncError::Fetch(FetchError::Cancelled) | SyncError::Session(SessionError::Cancelled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_error_context() {
        let err = ItemError {
            item_id: ItemId::from("A"),
            fact_index: 1,
            fact_count: 2,
            source: SubmitError::Rejected("duplicate episode".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "item A: fact 2 of 2 failed: rejected by graph service: duplicate episode"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_submit_error_from_mcp() {
        assert_eq!(SubmitError::from(McpError::Timeout), SubmitError::Timeout);
        assert!(SubmitError::from(McpError::ConnectionClosed).is_transport());
        let rejected = SubmitError::from(McpError::ServerError {
            code: -32602,
            message: "missing group_id".to_string(),
            data: None,
        });
        assert!(matches!(rejected, SubmitError::Rejected(_)));
        assert_eq!(
            SubmitError::from(McpError::ToolError("duplicate episode".to_string())),
            SubmitError::Rejected("duplicate episode".to_string())
        );
    }

    #[test]
    fn test_sync_error_phase() {
        let err = SyncError::from(FetchError::Cancelled);
        assert_eq!(err.phase(), Phase::Fetching);
        assert!(err.is_cancelled());

        let err = SyncError::from(SessionError::Unavailable("no binary".to_string()));
        assert_eq!(err.phase(), Phase::SessionOpen);
        assert!(!err.is_cancelled());
    }
}
