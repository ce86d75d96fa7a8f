//! Error handling utilities for the crate
use thiserror::Error;

use reqwest::Error as ReqwestError;

/// Errors reported by a storage collaborator (the REST client or the in-memory store)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("No credentials available for this request")]
    NotAuthenticated(),
    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Access denied, please check the account key or signature for this container")]
    Forbidden(),
    #[error("The requested container does not exist")]
    ContainerNotFound(),
    #[error("The container already exists")]
    ContainerAlreadyExists(),
    #[error("The requested blob does not exist")]
    BlobNotFound(),
    #[error("Internal HTTP error: {0}")]
    HttpError(#[from] ReqwestError),
    #[error("Unknown storage error ({0}): {1}")]
    UnknownError(u16, String),
    #[error("Invalid response from storage: {0}")]
    InvalidResponse(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    pub fn unknown_error(status_code: reqwest::StatusCode) -> Self {
        StorageError::UnknownError(
            status_code.as_u16(),
            status_code
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
        )
    }

    pub fn required(field_name: &str) -> Self {
        StorageError::InvalidInput(format!("{} is required", field_name))
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        StorageError::InvalidConfig(message.into())
    }
}

/// Errors surfaced by the list / add / view / delete workflow
///
/// Every variant that wraps a [`StorageError`] keeps it as the error source so
/// callers can still tell a missing blob from a rejected signature.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Invalid container configuration: {0}")]
    Config(#[source] StorageError),
    #[error("Could not create container {container}: {source}")]
    ContainerCreate {
        container: String,
        #[source]
        source: StorageError,
    },
    #[error("Could not list blobs: {0}")]
    List(#[source] StorageError),
    #[error("Could not upload blob {name}: {source}")]
    Upload {
        name: String,
        #[source]
        source: StorageError,
    },
    #[error("Could not download blob {name}: {source}")]
    Download {
        name: String,
        #[source]
        source: StorageError,
    },
    #[error("Could not delete blob {name}: {source}")]
    Delete {
        name: String,
        #[source]
        source: StorageError,
    },
    #[error("No blob at position {0} in the current listing")]
    NoSuchEntry(usize),
    #[error("Position {index} in the current listing is no longer blob {expected}")]
    SelectionMoved { index: usize, expected: String },
    #[error("The current listing has no further pages")]
    NoMorePages(),
    #[error("Could not start a runtime to wait for the container: {0}")]
    Runtime(#[from] std::io::Error),
}

impl WorkflowError {
    /// The storage error behind this failure, if there is one
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            WorkflowError::Config(source)
            | WorkflowError::List(source)
            | WorkflowError::ContainerCreate { source, .. }
            | WorkflowError::Upload { source, .. }
            | WorkflowError::Download { source, .. }
            | WorkflowError::Delete { source, .. } => Some(source),
            WorkflowError::NoSuchEntry(_)
            | WorkflowError::SelectionMoved { .. }
            | WorkflowError::NoMorePages()
            | WorkflowError::Runtime(_) => None,
        }
    }
}

pub(crate) type Result<T> = std::result::Result<T, StorageError>;
