use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::{first_capture, SiteDescriptor, SiteProtocol, UploadOutcome, UploadTask};
use crate::error::ProtocolError;
use crate::session::UploadSession;
use crate::transport::UploadForm;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_BUDGET: Duration = Duration::from_secs(30 * 60);

/// Entry page → upload action → multipart POST → poll the landing page until
/// the final link appears.
///
/// The POST's resolved url (after redirects) is the page that gets polled.
/// Waiting between polls is a timer await, so other uploads keep running.
#[derive(Debug, Clone)]
pub struct DeferredLinkProtocol {
    /// Page holding the upload form, relative to the site root.
    pub entry_path: String,
    /// Captures the form action, relative to the site root.
    pub action_pattern: Regex,
    /// Captures the final download link on the polled page.
    pub final_link_pattern: Regex,
    /// Extra text fields sent along with the file.
    pub fields: Vec<(String, String)>,
    pub file_field: String,
    pub poll_interval: Duration,
    pub poll_budget: Duration,
}

impl DeferredLinkProtocol {
    pub fn new(
        entry_path: impl Into<String>,
        action_pattern: Regex,
        final_link_pattern: Regex,
        file_field: impl Into<String>,
    ) -> Self {
        Self {
            entry_path: entry_path.into(),
            action_pattern,
            final_link_pattern,
            fields: Vec::new(),
            file_field: file_field.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_budget: DEFAULT_POLL_BUDGET,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn with_polling(mut self, interval: Duration, budget: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_budget = budget;
        self
    }
}

#[async_trait]
impl SiteProtocol for DeferredLinkProtocol {
    async fn upload(
        &self,
        site: &SiteDescriptor,
        session: &UploadSession,
        task: &UploadTask,
    ) -> Result<UploadOutcome, ProtocolError> {
        let name = task.display_name()?;

        let entry = match session.fetch(&site.join(&self.entry_path)).await {
            Ok(page) => page,
            Err(e) => {
                error!(file = %name, error = ?e, "[UPLOAD] {e}");
                return Ok(UploadOutcome::failed(name));
            }
        };
        let Some(action) = first_capture(&self.action_pattern, &entry.body) else {
            error!(file = %name, "[UPLOAD] Can't get the upload url");
            return Ok(UploadOutcome::failed(name));
        };

        let mut form = UploadForm::new(&self.file_field, &task.source_path, &task.assigned_name);
        form.fields = self.fields.clone();
        let (landing, mark) = match session
            .post_upload(&site.join(&action), form, site.max_file_size)
            .await
        {
            Ok(posted) => posted,
            Err(e) => {
                error!(file = %name, error = ?e, "[UPLOAD] {e}");
                return Ok(UploadOutcome::failed(name));
            }
        };

        info!(file = %name, poll = %landing.final_url, "[UPLOAD] Waiting for the download link");
        let deadline = Instant::now() + self.poll_budget;
        while Instant::now() <= deadline {
            // A hung fetch must not outlive the budget.
            let remaining = deadline.saturating_duration_since(Instant::now());
            let fetched =
                match tokio::time::timeout(remaining, session.fetch(&landing.final_url)).await {
                    Ok(fetched) => fetched,
                    Err(_) => break,
                };
            let page = match fetched {
                Ok(page) => page,
                Err(e) => {
                    error!(file = %name, error = ?e, "[UPLOAD] {e}");
                    session.revert_success(&task.source_path);
                    return Ok(UploadOutcome::failed(name));
                }
            };
            if let Some(link) = first_capture(&self.final_link_pattern, &page.body) {
                info!(
                    file = %name,
                    assigned = %task.assigned_name,
                    url = %link,
                    "[UPLOAD] Got link for {name} as {}: {link} {mark}",
                    task.assigned_name
                );
                return Ok(UploadOutcome::uploaded(name, link));
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        warn!(
            file = %name,
            budget_secs = self.poll_budget.as_secs(),
            "[UPLOAD] Uploaded but timed out waiting for the download link"
        );
        session.revert_success(&task.source_path);
        Ok(UploadOutcome::failed(name))
    }
}
