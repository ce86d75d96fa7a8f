//! Choosing how to reach the container
use std::env;

use serde::Deserialize;

use crate::error::{StorageError, WorkflowError};

pub const DEFAULT_CONTAINER_NAME: &str = "samplecontainer";

/// How a session authenticates against its container
///
/// Immutable once built.  The variant decides whether the session has to
/// make sure the container exists before handing it out.
#[derive(Clone, PartialEq, Eq)]
pub enum ContainerConfig {
    /// A container URL carrying a shared access signature
    SignatureUrl { url: String },
    /// An account connection string plus the name of a container in that account
    AccountCredential {
        connection_string: String,
        container_name: String,
    },
}

// Custom implementation of Debug to avoid printing signatures and account keys
impl std::fmt::Debug for ContainerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerConfig::SignatureUrl { url } => f
                .debug_struct("SignatureUrl")
                .field("url", &redact_query(url))
                .finish(),
            ContainerConfig::AccountCredential { container_name, .. } => f
                .debug_struct("AccountCredential")
                .field("connection_string", &"**********")
                .field("container_name", container_name)
                .finish(),
        }
    }
}

fn redact_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?**********", base),
        None => url.to_string(),
    }
}

impl ContainerConfig {
    pub fn signature_url(url: impl Into<String>) -> Self {
        ContainerConfig::SignatureUrl { url: url.into() }
    }

    pub fn account_credential(
        connection_string: impl Into<String>,
        container_name: impl Into<String>,
    ) -> Self {
        ContainerConfig::AccountCredential {
            connection_string: connection_string.into(),
            container_name: container_name.into(),
        }
    }
}

/// The user-facing settings: a flag picks one of two credential modes
///
/// * `use_sas == true`: `container_sas_url` is used
/// * `use_sas == false`: `connection_string` and `container_name` are used
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SampleSettings {
    pub use_sas: bool,
    pub container_sas_url: Option<String>,
    pub connection_string: Option<String>,
    pub container_name: Option<String>,
}

impl SampleSettings {
    /// Reads the settings from `BLOB_SAMPLE_USE_SAS`, `BLOB_SAMPLE_CONTAINER_URL`,
    /// `BLOB_SAMPLE_CONNECTION_STRING` and `BLOB_SAMPLE_CONTAINER_NAME`.
    ///
    /// If `BLOB_SAMPLE_USE_SAS` is unset, SAS mode is picked whenever a
    /// container URL is present.
    pub fn from_env() -> Self {
        let container_sas_url = env::var("BLOB_SAMPLE_CONTAINER_URL").ok();
        let use_sas = match env::var("BLOB_SAMPLE_USE_SAS") {
            Ok(flag) => matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
            Err(_) => container_sas_url.is_some(),
        };
        Self {
            use_sas,
            container_sas_url,
            connection_string: env::var("BLOB_SAMPLE_CONNECTION_STRING").ok(),
            container_name: env::var("BLOB_SAMPLE_CONTAINER_NAME").ok(),
        }
    }

    /// The container configuration selected by `use_sas`
    pub fn container_config(&self) -> Result<ContainerConfig, WorkflowError> {
        if self.use_sas {
            let url = non_empty(&self.container_sas_url).ok_or_else(|| missing("container SAS URL"))?;
            Ok(ContainerConfig::signature_url(url))
        } else {
            let connection_string =
                non_empty(&self.connection_string).ok_or_else(|| missing("connection string"))?;
            let container_name =
                non_empty(&self.container_name).unwrap_or(DEFAULT_CONTAINER_NAME);
            Ok(ContainerConfig::account_credential(
                connection_string,
                container_name,
            ))
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn missing(what: &str) -> WorkflowError {
    WorkflowError::Config(StorageError::required(what))
}
