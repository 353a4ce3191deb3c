//! # Site protocols: one capability per hosting destination
//!
//! A destination is a [`SiteDescriptor`]: its base url, its size limit and the
//! [`SiteProtocol`] that knows which requests to make. Two protocol shapes
//! cover the built-in sites:
//!
//! - [`TokenFormProtocol`]: fetch the form, scrape an anti-forgery token,
//!   POST the file with it, scrape the download link from the response.
//! - [`DeferredLinkProtocol`]: discover the upload action, POST the file, then
//!   poll the page the POST landed on until the download link shows up.
//!
//! ## Contract
//! - Ordinary network or page-format failures are logged and reported as an
//!   [`UploadOutcome`] without a url. They never surface as `Err`.
//! - `Err` is reserved for contract violations ([`ProtocolError`]).
//! - File size is checked before the POST (see
//!   [`UploadSession::post_upload`]), and only the POST holds a gate permit.
//! - A protocol that fails after its POST went through must call
//!   [`UploadSession::revert_success`].

mod deferred_link;
mod token_form;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

pub use deferred_link::DeferredLinkProtocol;
pub use token_form::TokenFormProtocol;

use crate::error::{ProtocolError, SetupError};
use crate::session::UploadSession;

/// One file to upload and the name it goes up under. Built once per batch and
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub source_path: PathBuf,
    pub assigned_name: String,
}

impl UploadTask {
    pub fn new(source_path: impl Into<PathBuf>, assigned_name: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            assigned_name: assigned_name.into(),
        }
    }

    /// Local file name, used in logs and as the ledger key.
    pub fn display_name(&self) -> Result<String, ProtocolError> {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ProtocolError::MalformedTask(self.source_path.clone()))
    }
}

/// What a task produced: its display name and, on success, the download link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub name: String,
    pub url: Option<String>,
}

impl UploadOutcome {
    pub fn uploaded(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
        }
    }

    pub fn failed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.url.is_some()
    }
}

/// First capture group of the first match.
pub(crate) fn first_capture(pattern: &regex::Regex, haystack: &str) -> Option<String> {
    pattern
        .captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Per-destination upload logic.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SiteProtocol: Send + Sync {
    /// Upload one file. See the module docs for the error contract.
    async fn upload(
        &self,
        site: &SiteDescriptor,
        session: &UploadSession,
        task: &UploadTask,
    ) -> Result<UploadOutcome, ProtocolError>;
}

/// A hosting destination, fixed for the whole batch.
#[derive(Clone)]
pub struct SiteDescriptor {
    pub base_url: String,
    pub max_file_size: u64,
    pub protocol: Arc<dyn SiteProtocol>,
}

impl fmt::Debug for SiteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteDescriptor")
            .field("base_url", &self.base_url)
            .field("max_file_size", &self.max_file_size)
            .finish_non_exhaustive()
    }
}

/// Size units accepted by [`SiteDescriptor::size_limit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    B,
    KB,
    MB,
    GB,
    TB,
}

impl SizeUnit {
    fn bytes(self) -> u64 {
        match self {
            SizeUnit::B => 1,
            SizeUnit::KB => 1 << 10,
            SizeUnit::MB => 1 << 20,
            SizeUnit::GB => 1 << 30,
            SizeUnit::TB => 1 << 40,
        }
    }
}

impl SiteDescriptor {
    pub fn new(
        base_url: impl Into<String>,
        max_file_size: u64,
        protocol: Arc<dyn SiteProtocol>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            max_file_size,
            protocol,
        }
    }

    /// `size` in `unit`, rounded up to whole bytes.
    pub fn size_limit(size: f64, unit: SizeUnit) -> u64 {
        (size * unit.bytes() as f64).ceil() as u64
    }

    /// Host of the base url.
    pub fn host(&self) -> Result<String, SetupError> {
        Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| SetupError::InvalidSiteUrl(self.base_url.clone()))
    }

    /// The string ledger lines are attributed by: the host without `www.`
    /// and without its last dot-suffix (`https://www.anonfile.com/` gives
    /// `anonfile`).
    pub fn root_domain(&self) -> Result<String, SetupError> {
        let host = self.host()?;
        let host = host.replace("www.", "");
        let root = match host.rfind('.') {
            Some(dot) if dot > 0 => &host[..dot],
            _ => host.as_str(),
        };
        Ok(root.to_string())
    }

    /// Onion services are only reachable through a proxy.
    pub fn requires_proxy(&self) -> Result<bool, SetupError> {
        Ok(self.host()?.ends_with(".onion"))
    }

    /// Resolve a path relative to the site root.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
