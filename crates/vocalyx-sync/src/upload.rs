//! Audio upload form and its submission.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use crate::config::ClientConfig;
use crate::error::{ClientError, NotificationLevel, Result};
use crate::transport::{DashboardApi, UploadRequest};
use crate::view::Notifier;

/// State of the upload dialog.
///
/// `api_key_locked` is set when the key was filled in from configuration and
/// should not be edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadForm {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub project_name: String,
    pub api_key: String,
    pub use_vad: bool,
    pub api_key_locked: bool,
}

// Voice activity detection is on unless the user turns it off.
impl Default for UploadForm {
    fn default() -> Self {
        Self {
            file_name: String::new(),
            bytes: Vec::new(),
            project_name: String::new(),
            api_key: String::new(),
            use_vad: true,
            api_key_locked: false,
        }
    }
}

impl UploadForm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_file(&mut self, file_name: impl Into<String>, bytes: Vec<u8>) {
        self.file_name = file_name.into();
        self.bytes = bytes;
    }

    pub fn clear_file(&mut self) {
        self.file_name.clear();
        self.bytes.clear();
    }

    #[must_use]
    pub fn has_file(&self) -> bool {
        !self.file_name.is_empty()
    }

    /// Pick the target project. The configured default project gets the
    /// configured key filled in and locked; any other project starts blank.
    pub fn select_project(&mut self, project_name: impl Into<String>, config: &ClientConfig) {
        self.project_name = project_name.into();
        let default_key = config
            .default_project_name
            .as_deref()
            .filter(|name| *name == self.project_name)
            .and(config.admin_key.as_deref());

        match default_key {
            Some(key) => {
                self.api_key = key.to_string();
                self.api_key_locked = true;
            }
            None => {
                self.api_key.clear();
                self.api_key_locked = false;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.has_file() {
            return Err(ClientError::validation("select a file to upload"));
        }
        if self.project_name.is_empty() || self.api_key.is_empty() {
            return Err(ClientError::validation("project or API key missing"));
        }
        Ok(())
    }
}

/// Submits upload forms. The new job reaches the list through the stream,
/// so nothing is reloaded here.
pub struct UploadCoordinator {
    api: Arc<dyn DashboardApi>,
    notifier: Arc<dyn Notifier>,
}

impl UploadCoordinator {
    pub fn new(api: Arc<dyn DashboardApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self { api, notifier }
    }

    /// Send `form` as a multipart upload. The selected file is cleared once
    /// the call settles, successful or not.
    pub async fn submit(&self, form: &mut UploadForm) -> Result<Value> {
        if let Err(error) = form.validate() {
            self.notifier.notify_error(&error);
            return Err(error);
        }

        let request = UploadRequest {
            file_name: form.file_name.clone(),
            bytes: std::mem::take(&mut form.bytes),
            project_name: form.project_name.clone(),
            api_key: form.api_key.clone(),
            use_vad: form.use_vad,
        };
        let result = self.api.upload_audio(request).await;
        form.clear_file();

        match &result {
            Ok(_) => {
                info!(project = %form.project_name, "audio uploaded");
                self.notifier.notify(
                    NotificationLevel::Success,
                    &format!("Upload to project '{}' accepted", form.project_name),
                );
            }
            Err(error) => {
                error!(%error, project = %form.project_name, "upload failed");
                self.notifier.notify_error(error);
            }
        }
        result
    }
}
