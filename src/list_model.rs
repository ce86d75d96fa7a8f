//! The listing shown to the user and the operations that change it
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

use crate::{
    client::{BlobContainerApi, BlobDescriptor, ListBlobsOptions},
    error::WorkflowError,
};

/// Number of blobs fetched per listing call
pub const PAGE_SIZE: u32 = 50;

const EVENT_CAPACITY: usize = 64;

/// One page of blobs exactly as a single listing call returned it
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BlobSnapshot {
    /// Blobs in the order the store listed them
    pub blobs: Vec<BlobDescriptor>,
    /// Cursor for the page after this one, `None` on the last page
    pub continuation: Option<String>,
}

impl BlobSnapshot {
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn has_more_pages(&self) -> bool {
        self.continuation.is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blobs.iter().any(|blob| blob.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.blobs.iter().map(|blob| blob.name.as_str()).collect()
    }
}

/// Changes to the listing, for whoever renders it
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListEvent {
    /// The whole snapshot was replaced
    Reloaded { count: usize },
    /// A single row went away after its blob was deleted
    RowRemoved { index: usize, name: String },
}

/// Something that wants to re-read storage after a change was made
#[async_trait]
pub trait Reload: Send + Sync {
    async fn reload(&self);
}

/// Holds the current page of blobs for a container
///
/// Every operation that replaces or edits the snapshot goes through a
/// single writer lock, so a delete and a refresh issued back to back run
/// one after the other.  Reading the snapshot never waits on storage.
pub struct BlobListModel {
    container: Arc<dyn BlobContainerApi>,
    snapshot: RwLock<BlobSnapshot>,
    writer: Mutex<()>,
    events: broadcast::Sender<ListEvent>,
}

impl BlobListModel {
    /// Creates a model with an empty snapshot.  Nothing is listed until [`BlobListModel::refresh`].
    pub fn new(container: Arc<dyn BlobContainerApi>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            container,
            snapshot: RwLock::new(BlobSnapshot::default()),
            writer: Mutex::new(()),
            events,
        }
    }

    pub fn container(&self) -> Arc<dyn BlobContainerApi> {
        self.container.clone()
    }

    /// Receives every [`ListEvent`] from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ListEvent> {
        self.events.subscribe()
    }

    /// A copy of the current snapshot
    pub async fn snapshot(&self) -> BlobSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn blob_at(&self, index: usize) -> Option<BlobDescriptor> {
        self.snapshot.read().await.blobs.get(index).cloned()
    }

    /// Lists the first page of the container and replaces the snapshot with it
    ///
    /// The listing is flat, unfiltered, without extra details and limited to
    /// [`PAGE_SIZE`] entries.  The continuation cursor is kept but not
    /// followed.  If the listing fails the previous snapshot stays as it was.
    pub async fn refresh(&self) -> Result<BlobSnapshot, WorkflowError> {
        let _writer = self.writer.lock().await;
        self.load_page(None).await
    }

    /// Replaces the snapshot with the page after the current one
    pub async fn next_page(&self) -> Result<BlobSnapshot, WorkflowError> {
        let _writer = self.writer.lock().await;
        let cursor = self
            .snapshot
            .read()
            .await
            .continuation
            .clone()
            .ok_or(WorkflowError::NoMorePages())?;
        self.load_page(Some(cursor)).await
    }

    async fn load_page(&self, marker: Option<String>) -> Result<BlobSnapshot, WorkflowError> {
        let options = ListBlobsOptions {
            prefix: None,
            max_results: Some(PAGE_SIZE),
            marker,
        };
        let page = self.container.list(options).await.map_err(|source| {
            warn!(container = self.container.container_name(), error = %source, "listing failed, keeping previous snapshot");
            WorkflowError::List(source)
        })?;

        let snapshot = BlobSnapshot {
            blobs: page.blobs,
            continuation: page.next_marker,
        };
        *self.snapshot.write().await = snapshot.clone();
        info!(
            container = self.container.container_name(),
            count = snapshot.len(),
            more = snapshot.has_more_pages(),
            "blob list reloaded"
        );
        // Nobody listening is fine
        let _ = self.events.send(ListEvent::Reloaded {
            count: snapshot.len(),
        });
        Ok(snapshot)
    }

    /// Deletes the blob shown at `index` and drops it from the snapshot
    ///
    /// The entry is removed by name once storage confirms the delete, and
    /// the [`ListEvent::RowRemoved`] carries the position it was removed
    /// from.  On failure the snapshot is left untouched.
    ///
    /// `index` is read against the snapshot current when the delete gets its
    /// turn.  Use [`BlobListModel::delete_selected`] when a reload may have
    /// moved rows since the user picked one.
    ///
    /// # Returns
    ///
    /// The descriptor of the deleted blob
    pub async fn delete(&self, index: usize) -> Result<BlobDescriptor, WorkflowError> {
        let _writer = self.writer.lock().await;
        let blob = self
            .blob_at(index)
            .await
            .ok_or(WorkflowError::NoSuchEntry(index))?;
        self.delete_locked(blob).await
    }

    /// Deletes the blob at `index`, provided that row still shows `expected`
    ///
    /// If the snapshot was replaced and the row now holds another blob,
    /// nothing is deleted and [`WorkflowError::SelectionMoved`] is returned.
    pub async fn delete_selected(
        &self,
        index: usize,
        expected: &BlobDescriptor,
    ) -> Result<BlobDescriptor, WorkflowError> {
        let _writer = self.writer.lock().await;
        let blob = self
            .blob_at(index)
            .await
            .ok_or(WorkflowError::NoSuchEntry(index))?;
        if &blob != expected {
            warn!(index, expected = %expected.name, found = %blob.name, "selected row moved, not deleting");
            return Err(WorkflowError::SelectionMoved {
                index,
                expected: expected.name.clone(),
            });
        }
        self.delete_locked(blob).await
    }

    /// Deletes `blob` from storage and the snapshot.  The writer lock must be held.
    async fn delete_locked(&self, blob: BlobDescriptor) -> Result<BlobDescriptor, WorkflowError> {
        if let Err(source) = self.container.delete(&blob.name).await {
            warn!(blob = %blob.name, error = %source, "delete failed");
            return Err(WorkflowError::Delete {
                name: blob.name,
                source,
            });
        }

        let removed_at = {
            let mut snapshot = self.snapshot.write().await;
            let position = snapshot.blobs.iter().position(|b| b.name == blob.name);
            if let Some(position) = position {
                snapshot.blobs.remove(position);
            }
            position
        };
        if let Some(index) = removed_at {
            let _ = self.events.send(ListEvent::RowRemoved {
                index,
                name: blob.name.clone(),
            });
        }
        info!(blob = %blob.name, "blob deleted");
        Ok(blob)
    }
}

#[async_trait]
impl Reload for BlobListModel {
    async fn reload(&self) {
        // Failures are already logged by refresh and the old snapshot stays
        let _ = self.refresh().await;
    }
}
