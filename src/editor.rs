//! Adding text blobs
use std::sync::Arc;

use tracing::{info, warn};

use crate::{client::BlobContainerApi, error::WorkflowError, list_model::Reload};

/// Creates (or overwrites) text blobs in a container
pub struct BlobEditor {
    container: Arc<dyn BlobContainerApi>,
    reload_on_add: Option<Arc<dyn Reload>>,
}

impl BlobEditor {
    pub fn new(container: Arc<dyn BlobContainerApi>) -> Self {
        Self {
            container,
            reload_on_add: None,
        }
    }

    /// Reloads `target` whenever an upload completes
    pub fn with_reload(mut self, target: Arc<dyn Reload>) -> Self {
        self.reload_on_add = Some(target);
        self
    }

    /// Uploads `text` as the blob `name`
    ///
    /// The caller is expected to have checked that `name` is not empty.
    /// Once the upload completes the reload target (if any) is refreshed,
    /// whether or not the upload succeeded, and only then is the upload's
    /// outcome returned.
    pub async fn create(&self, name: &str, text: &str) -> Result<(), WorkflowError> {
        let outcome = self.container.upload_text(name, text).await;
        match &outcome {
            Ok(()) => info!(blob = %name, bytes = text.len(), "blob uploaded"),
            Err(err) => warn!(blob = %name, error = %err, "upload failed"),
        }

        if let Some(target) = &self.reload_on_add {
            target.reload().await;
        }

        outcome.map_err(|source| WorkflowError::Upload {
            name: name.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use all_asserts::assert_true;
    use async_trait::async_trait;

    use super::*;
    use crate::{error::StorageError, memory::InMemoryAccount};

    #[derive(Default)]
    struct CountingReload {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Reload for CountingReload {
        async fn reload(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn create_uploads_and_reloads() {
        let account = InMemoryAccount::new();
        account.create_container("samples");
        let container = Arc::new(account.container("samples"));
        let reload = Arc::new(CountingReload::default());
        let editor = BlobEditor::new(container.clone()).with_reload(reload.clone());

        editor.create("new.txt", "hello").await.unwrap();

        assert_eq!(container.download_text("new.txt").await.unwrap(), "hello");
        assert_eq!(reload.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_upload_still_reloads() {
        // Container was never created, so the upload fails
        let account = InMemoryAccount::new();
        let reload = Arc::new(CountingReload::default());
        let editor =
            BlobEditor::new(Arc::new(account.container("missing"))).with_reload(reload.clone());

        let err = editor.create("new.txt", "hello").await.unwrap_err();

        match err {
            WorkflowError::Upload { name, source } => {
                assert_eq!(name, "new.txt");
                assert_true!(matches!(source, StorageError::ContainerNotFound()));
            }
            other => panic!("Expected an upload error, got {:?}", other),
        }
        assert_eq!(reload.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_without_reload_target() {
        let account = InMemoryAccount::new();
        account.create_container("samples");
        let editor = BlobEditor::new(Arc::new(account.container("samples")));

        editor.create("a.txt", "first").await.unwrap();
        editor.create("a.txt", "second").await.unwrap();

        let text = account.container("samples").download_text("a.txt").await.unwrap();
        assert_eq!(text, "second");
    }
}
