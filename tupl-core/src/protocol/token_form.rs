use async_trait::async_trait;
use regex::Regex;
use tracing::{error, info};

use super::{first_capture, SiteDescriptor, SiteProtocol, UploadOutcome, UploadTask};
use crate::error::ProtocolError;
use crate::session::UploadSession;
use crate::transport::UploadForm;

/// Form page → hidden token → multipart POST → link scraped from the answer.
///
/// Both patterns must have one capture group; the first match wins.
#[derive(Debug, Clone)]
pub struct TokenFormProtocol {
    pub token_pattern: Regex,
    pub link_pattern: Regex,
    pub token_field: String,
    pub file_field: String,
}

impl TokenFormProtocol {
    pub fn new(
        token_pattern: Regex,
        link_pattern: Regex,
        token_field: impl Into<String>,
        file_field: impl Into<String>,
    ) -> Self {
        Self {
            token_pattern,
            link_pattern,
            token_field: token_field.into(),
            file_field: file_field.into(),
        }
    }
}

#[async_trait]
impl SiteProtocol for TokenFormProtocol {
    async fn upload(
        &self,
        site: &SiteDescriptor,
        session: &UploadSession,
        task: &UploadTask,
    ) -> Result<UploadOutcome, ProtocolError> {
        let name = task.display_name()?;

        let page = match session.fetch(&site.base_url).await {
            Ok(page) => page,
            Err(e) => {
                error!(file = %name, error = ?e, "[UPLOAD] {e}");
                return Ok(UploadOutcome::failed(name));
            }
        };

        let Some(token) = first_capture(&self.token_pattern, &page.body) else {
            error!(file = %name, "[UPLOAD] Error before posting: no form token on the page");
            return Ok(UploadOutcome::failed(name));
        };

        let form = UploadForm::new(&self.file_field, &task.source_path, &task.assigned_name)
            .text(&self.token_field, token);
        let (page, mark) = match session
            .post_upload(&site.base_url, form, site.max_file_size)
            .await
        {
            Ok(posted) => posted,
            Err(e) => {
                error!(file = %name, error = ?e, "[UPLOAD] {e}");
                return Ok(UploadOutcome::failed(name));
            }
        };

        let Some(link) = first_capture(&self.link_pattern, &page.body) else {
            error!(file = %name, "[UPLOAD] Can't find the download link on the page");
            session.revert_success(&task.source_path);
            return Ok(UploadOutcome::failed(name));
        };

        info!(
            file = %name,
            assigned = %task.assigned_name,
            url = %link,
            "[UPLOAD] {name} uploaded as {}: {link} {mark}",
            task.assigned_name
        );
        Ok(UploadOutcome::uploaded(name, link))
    }
}
