//! List, add, view and delete text blobs in an
//! [Azure Storage](https://learn.microsoft.com/azure/storage/blobs/) container.
//!
//! This crate supplies the workflow that sits between a user interface and
//! the blob service: open a container, show a page of its blobs, add a text
//! blob, read one back, delete one, and refresh the page after each change.
//!
//! A container can be reached in one of two ways:
//!
//! * with a container URL carrying a shared access signature (SAS), or
//! * with an account connection string and a container name.  In this mode
//!   the container is created if it does not exist yet, before the session
//!   is handed out.
//!
//! ```ignore
//! let config = SampleSettings::from_env().container_config()?;
//! let session = StorageSession::open_async(&AzureConnector, &config).await?;
//!
//! let list = Arc::new(BlobListModel::new(session.container()));
//! list.refresh().await?;
//!
//! let editor = BlobEditor::new(session.container()).with_reload(list.clone());
//! editor.create("new.txt", "hello").await?;
//!
//! for blob in list.snapshot().await.blobs {
//!     println!("{}", blob.name);
//! }
//!
//! let viewer = BlobViewer::new(session.container());
//! let text = viewer.load(&BlobDescriptor::new("new.txt")).await?;
//! ```
//!
//! The blob service is reached through the [`BlobContainerApi`] trait.
//! [`AzureContainerClient`] implements it over the REST API; the
//! [`memory`] module provides an in-process store with the same listing
//! and overwrite behavior for offline use and tests.
//!
//! Failures never disappear silently: every operation returns a
//! [`WorkflowError`] and logs through `tracing`.  A failed listing leaves
//! the previous snapshot in place, a failed delete leaves the row in place,
//! and a failed download moves the viewer into a failed state.
//!
//! [`BlobContainerApi`]: crate::client::BlobContainerApi
//! [`AzureContainerClient`]: crate::client::AzureContainerClient
//! [`WorkflowError`]: crate::error::WorkflowError

pub mod auth;
pub mod client;
pub mod config;
pub mod editor;
pub mod error;
pub mod list_model;
pub mod memory;
pub mod session;
pub mod viewer;

pub use client::{AzureConnector, BlobContainerApi, BlobDescriptor, StorageConnector};
pub use config::{ContainerConfig, SampleSettings};
pub use editor::BlobEditor;
pub use error::{StorageError, WorkflowError};
pub use list_model::{BlobListModel, BlobSnapshot, ListEvent, Reload, PAGE_SIZE};
pub use session::{ContainerReadiness, StorageSession};
pub use viewer::{BlobViewer, ViewState, LOADING_PLACEHOLDER};
