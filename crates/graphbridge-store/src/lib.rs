//! Client for the content store's knowledge sync endpoints.
//!
//! The content store is the system of record for sync state. This crate
//! reads the items it still considers unsynced and flags items as synced
//! once their facts have been delivered:
//!
//! - `GET /knowledge/sync` returns `{items: [{id, analysis_payload}]}`
//! - `POST /knowledge/mark-synced` takes `{ids: [...]}`
//!
//! Analysis payloads are normalized at this boundary (see [`types`]), so
//! downstream code works with a plain sequence of [`AnalysisEntry`] values.

pub mod client;
pub mod error;
pub mod types;

pub use client::{DEFAULT_BASE_URL, MarkSyncedResponse, StoreClient, StoreClientBuilder};
pub use error::{Result, StoreError};
pub use types::{
    AnalysisEntry, ContentItem, DEFAULT_SUMMARY, ItemId, PayloadField, RejectedItem, Relationship,
    SyncBatch, normalize, normalize_payload,
};
