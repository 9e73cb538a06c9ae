//! Content source seam.

use async_trait::async_trait;
use graphbridge_store::{ItemId, StoreClient, SyncBatch};

use crate::error::{AcknowledgeError, FetchError};

/// Where unsynced items come from and where acknowledgements go.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch every item not yet synced.
    async fn fetch_unsynced(&self) -> Result<SyncBatch, FetchError>;

    /// Flag items as synced. Must tolerate ids that are already synced.
    async fn mark_synced(&self, ids: &[ItemId]) -> Result<(), AcknowledgeError>;
}

#[async_trait]
impl ContentSource for StoreClient {
    async fn fetch_unsynced(&self) -> Result<SyncBatch, FetchError> {
        Ok(StoreClient::fetch_unsynced(self).await?)
    }

    async fn mark_synced(&self, ids: &[ItemId]) -> Result<(), AcknowledgeError> {
        let response = StoreClient::mark_synced(self, ids).await?;
        tracing::debug!(updated = ?response.updated, "store acknowledged items");
        Ok(())
    }
}
