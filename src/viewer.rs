//! Showing the text of a single blob
use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

use crate::{
    client::{BlobContainerApi, BlobDescriptor},
    error::WorkflowError,
};

/// Text shown while a download is in flight
pub const LOADING_PLACEHOLDER: &str = "Blob text loading...";

/// What the viewer currently has to show
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewState {
    /// Nothing requested yet
    Empty,
    /// A download is in flight
    Loading { name: String },
    Loaded { name: String, text: String },
    Failed { name: String, message: String },
}

impl ViewState {
    /// The text to put in front of the user for this state
    pub fn display_text(&self) -> &str {
        match self {
            ViewState::Empty => "",
            ViewState::Loading { .. } => LOADING_PLACEHOLDER,
            ViewState::Loaded { text, .. } => text,
            ViewState::Failed { message, .. } => message,
        }
    }
}

/// Downloads blobs as text for display
pub struct BlobViewer {
    container: Arc<dyn BlobContainerApi>,
    state: watch::Sender<ViewState>,
}

impl BlobViewer {
    pub fn new(container: Arc<dyn BlobContainerApi>) -> Self {
        let (state, _) = watch::channel(ViewState::Empty);
        Self { container, state }
    }

    /// Follows the viewer's state as downloads start and finish
    pub fn state(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    /// Downloads the full text of `blob`
    ///
    /// The state moves to [`ViewState::Loading`] before the download starts
    /// and to `Loaded` or `Failed` when it completes.
    pub async fn load(&self, blob: &BlobDescriptor) -> Result<String, WorkflowError> {
        let name = blob.name.clone();
        self.state.send_replace(ViewState::Loading { name: name.clone() });

        match self.container.download_text(&name).await {
            Ok(text) => {
                self.state.send_replace(ViewState::Loaded {
                    name,
                    text: text.clone(),
                });
                Ok(text)
            }
            Err(source) => {
                warn!(blob = %name, error = %source, "download failed");
                let err = WorkflowError::Download { name, source };
                self.state.send_replace(ViewState::Failed {
                    name: blob.name.clone(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }
}
