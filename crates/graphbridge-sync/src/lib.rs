//! Moves content-store analysis into the knowledge graph.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      SyncCoordinator                       │
//! │                                                            │
//! │  ContentSource ──fetch──► FactExtractor ──facts──►         │
//! │        ▲                                  GraphSession     │
//! │        └────────── mark_synced ◄── outcomes ──┘            │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`ContentSource`] and [`GraphConnector`]/[`GraphSession`] are the seams:
//! [`StoreClient`](graphbridge_store::StoreClient) and [`McpConnector`] in
//! production, in-process fakes under test.

pub mod coordinator;
pub mod error;
pub mod extractor;
pub mod session;
pub mod source;
pub mod summary;

pub use coordinator::{DEFAULT_TOOL_NAME, PlannedItem, SyncConfig, SyncCoordinator, SyncPlan};
pub use error::{
    AcknowledgeError, FetchError, ItemError, Phase, SessionError, SubmitError, SyncError,
};
pub use extractor::{DEFAULT_GROUP_ID, FactExtractor, KnowledgeFact};
pub use session::{GraphConnector, GraphSession, McpConnector, McpSession};
pub use source::ContentSource;
pub use summary::{Abort, AckStatus, ItemOutcome, ItemStatus, RunStatus, RunSummary};
