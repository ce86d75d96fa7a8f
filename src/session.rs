//! Opening the one container a session works against
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tracing::{error, info};

use crate::{
    client::{BlobContainerApi, StorageConnector},
    config::ContainerConfig,
    error::WorkflowError,
};

/// What is known about the container once a session is open
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContainerReadiness {
    /// Opened from a SAS URL; existence is not checked
    SignatureUrl,
    /// The container exists.  `created` is true if this session created it.
    Ready { created: bool },
    /// The create call failed.  Later operations may fail individually.
    Unverified(String),
}

/// Holds the container handle shared by every operation of the app
pub struct StorageSession {
    container: Arc<dyn BlobContainerApi>,
    readiness: ContainerReadiness,
}

impl std::fmt::Debug for StorageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSession")
            .field("container", &self.container.container_name())
            .field("readiness", &self.readiness)
            .finish()
    }
}

impl StorageSession {
    /// Opens a session, blocking the calling thread until the container is ready
    ///
    /// With [`ContainerConfig::AccountCredential`] this does not return until
    /// the create-if-not-exists call has completed, whatever its outcome.
    ///
    /// Outside of any async runtime a private single-threaded runtime drives
    /// the call.  Inside a multi-threaded tokio runtime the current worker
    /// blocks in place.  Inside a current-thread runtime the call is driven
    /// on a separate thread with its own runtime while the caller waits.
    pub fn open(
        connector: &dyn StorageConnector,
        config: &ContainerConfig,
    ) -> Result<Self, WorkflowError> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(Self::open_async(connector, config)))
            }
            // A runtime cannot be started on a thread that already drives one
            Ok(_) => std::thread::scope(|scope| {
                scope
                    .spawn(|| Self::open_on_private_runtime(connector, config))
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            }),
            Err(_) => Self::open_on_private_runtime(connector, config),
        }
    }

    fn open_on_private_runtime(
        connector: &dyn StorageConnector,
        config: &ContainerConfig,
    ) -> Result<Self, WorkflowError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        runtime.block_on(Self::open_async(connector, config))
    }

    /// Opens a session, completing once the container is ready
    ///
    /// * `SignatureUrl`: the handle is built straight from the URL and the
    ///   store is never touched.
    /// * `AccountCredential`: the container is looked up by name in the
    ///   account and created if it does not exist yet.  A failed create is
    ///   logged and the session is still returned.
    pub async fn open_async(
        connector: &dyn StorageConnector,
        config: &ContainerConfig,
    ) -> Result<Self, WorkflowError> {
        match config {
            ContainerConfig::SignatureUrl { url } => {
                let container = connector
                    .container_from_sas_url(url)
                    .map_err(WorkflowError::Config)?;
                info!(container = container.container_name(), "opened container from SAS URL");
                Ok(Self {
                    container,
                    readiness: ContainerReadiness::SignatureUrl,
                })
            }
            ContainerConfig::AccountCredential {
                connection_string,
                container_name,
            } => {
                let container = connector
                    .container_from_connection_string(connection_string, container_name)
                    .map_err(WorkflowError::Config)?;
                let readiness = match container.create_if_not_exists().await {
                    Ok(created) => {
                        info!(container = %container_name, created, "container is ready");
                        ContainerReadiness::Ready { created }
                    }
                    Err(source) => {
                        let err = WorkflowError::ContainerCreate {
                            container: container_name.clone(),
                            source,
                        };
                        error!(container = %container_name, "{}", err);
                        ContainerReadiness::Unverified(err.to_string())
                    }
                };
                Ok(Self {
                    container,
                    readiness,
                })
            }
        }
    }

    /// The shared container handle
    pub fn container(&self) -> Arc<dyn BlobContainerApi> {
        self.container.clone()
    }

    pub fn readiness(&self) -> &ContainerReadiness {
        &self.readiness
    }
}
