//! An in-process container store
//!
//! Lists, overwrites and pages the way the blob service does, without any
//! network.  Handy for offline use of the workflow and for tests.
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::{
    auth::{ConnectionString, ContainerSasUrl},
    client::{BlobContainerApi, BlobDescriptor, ListBlobsOptions, ListBlobsResult, StorageConnector},
    error::{Result, StorageError},
};

type Containers = HashMap<String, BTreeMap<String, Bytes>>;

/// A shared in-memory account holding any number of containers
///
/// Clones share the same contents.  Containers only exist once they are
/// created, either up front with [`InMemoryAccount::create_container`] or
/// through [`BlobContainerApi::create_if_not_exists`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryAccount {
    containers: Arc<Mutex<Containers>>,
    create_calls: Arc<AtomicUsize>,
}

impl InMemoryAccount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a container directly, bypassing the create call counter
    pub fn create_container(&self, name: &str) {
        self.lock().entry(name.to_string()).or_default();
    }

    pub fn container_exists(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Number of `create_if_not_exists` calls made through containers of this account
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// A handle to the container `name`, which need not exist yet
    pub fn container(&self, name: &str) -> InMemoryContainer {
        InMemoryContainer {
            account: self.clone(),
            name: name.to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Containers> {
        self.containers
            .lock()
            .expect("in-memory container store poisoned")
    }
}

/// Validates the configuration the same way the REST client would, then
/// hands out containers from this account.
impl StorageConnector for InMemoryAccount {
    fn container_from_sas_url(&self, sas_url: &str) -> Result<Arc<dyn BlobContainerApi>> {
        let parsed = ContainerSasUrl::parse(sas_url)?;
        Ok(Arc::new(self.container(&parsed.container_name)))
    }

    fn container_from_connection_string(
        &self,
        connection_string: &str,
        container_name: &str,
    ) -> Result<Arc<dyn BlobContainerApi>> {
        ConnectionString::parse(connection_string)?;
        if container_name.is_empty() {
            return Err(StorageError::invalid_config("container name is required"));
        }
        Ok(Arc::new(self.container(container_name)))
    }
}

/// One container of an [`InMemoryAccount`]
#[derive(Clone, Debug)]
pub struct InMemoryContainer {
    account: InMemoryAccount,
    name: String,
}

impl InMemoryContainer {
    fn with_blobs<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Bytes>) -> Result<T>,
    ) -> Result<T> {
        let mut containers = self.account.lock();
        let blobs = containers
            .get_mut(&self.name)
            .ok_or_else(StorageError::ContainerNotFound)?;
        f(blobs)
    }
}

#[async_trait]
impl BlobContainerApi for InMemoryContainer {
    fn container_name(&self) -> &str {
        &self.name
    }

    async fn create_if_not_exists(&self) -> Result<bool> {
        self.account.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut containers = self.account.lock();
        if containers.contains_key(&self.name) {
            Ok(false)
        } else {
            debug!(container = %self.name, "creating in-memory container");
            containers.insert(self.name.clone(), BTreeMap::new());
            Ok(true)
        }
    }

    async fn list(&self, options: ListBlobsOptions) -> Result<ListBlobsResult> {
        self.with_blobs(|blobs| {
            let prefix = options.prefix.unwrap_or_default();
            let limit = match options.max_results {
                Some(0) => return Err(StorageError::required("a positive max_results")),
                Some(max) => max as usize,
                None => usize::MAX,
            };

            let mut matching = blobs
                .keys()
                .filter(|name| name.starts_with(&prefix))
                .filter(|name| options.marker.as_ref().map_or(true, |m| *name >= m));

            let page = matching
                .by_ref()
                .take(limit)
                .map(|name| BlobDescriptor::new(name.clone()))
                .collect::<Vec<_>>();
            // The marker is the first name of the next page
            let next_marker = matching.next().cloned();

            Ok(ListBlobsResult {
                blobs: page,
                next_marker,
            })
        })
    }

    async fn upload_text(&self, name: &str, text: &str) -> Result<()> {
        if name.is_empty() {
            return Err(StorageError::required("name"));
        }
        self.with_blobs(|blobs| {
            blobs.insert(name.to_string(), Bytes::copy_from_slice(text.as_bytes()));
            Ok(())
        })
    }

    async fn download(&self, name: &str) -> Result<Bytes> {
        self.with_blobs(|blobs| blobs.get(name).cloned().ok_or_else(StorageError::BlobNotFound))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.with_blobs(|blobs| {
            blobs
                .remove(name)
                .map(|_| ())
                .ok_or_else(StorageError::BlobNotFound)
        })
    }
}
