//! Transport: the single network session shared by every upload in a batch.
//!
//! The [`Transport`] trait is the seam between the orchestration logic and the
//! network. [`HttpTransport`] is the real implementation over one
//! `reqwest::Client` (connection pool, headers, optional SOCKS proxy); tests
//! substitute `MockTransport` or an instrumented implementation.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart;
use reqwest::{Client, Proxy};
use tracing::{debug, info};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::config::ProxyConfig;
use crate::error::{SetupError, TransportError};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1; rv:24.0) Gecko/20100101 Firefox/24.0";
const MAX_REDIRECTS: usize = 10;
/// Timeout for page fetches. Upload POSTs carry their own, longer one.
pub const DEFAULT_GET_TIMEOUT: Duration = Duration::from_secs(60);

/// A fetched page: its body and the url it resolved to after redirects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub body: String,
    pub final_url: String,
}

/// A multipart upload: ordered text fields plus one file streamed from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadForm {
    pub fields: Vec<(String, String)>,
    pub file_field: String,
    pub file_path: PathBuf,
    /// Name the server sees for the file part.
    pub file_name: String,
}

impl UploadForm {
    pub fn new(
        file_field: impl Into<String>,
        file_path: impl Into<PathBuf>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            fields: Vec::new(),
            file_field: file_field.into(),
            file_path: file_path.into(),
            file_name: file_name.into(),
        }
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

/// GET and multipart POST, both following redirects.
///
/// Implementations must be safe to call from many concurrent uploads.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Page, TransportError>;

    async fn post_multipart(
        &self,
        url: &str,
        form: UploadForm,
        timeout: Duration,
    ) -> Result<Page, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(proxy: &ProxyConfig) -> Result<Self, SetupError> {
        Self::with_get_timeout(proxy, DEFAULT_GET_TIMEOUT)
    }

    /// Every request times out after `get_timeout` unless it sets its own.
    pub fn with_get_timeout(proxy: &ProxyConfig, get_timeout: Duration) -> Result<Self, SetupError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(get_timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));
        if let Some(proxy_url) = proxy.url() {
            info!(proxy = %proxy_url, "[SETUP] Routing uploads through proxy");
            builder = builder.proxy(Proxy::all(&proxy_url).map_err(SetupError::Client)?);
        } else {
            info!("[SETUP] Uploading without a proxy");
        }
        let client = builder.build().map_err(SetupError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Page, TransportError> {
        debug!(url, "GET");
        let res = self.client.get(url).send().await?;
        let final_url = res.url().to_string();
        let body = res.text().await?;
        Ok(Page { body, final_url })
    }

    async fn post_multipart(
        &self,
        url: &str,
        form: UploadForm,
        timeout: Duration,
    ) -> Result<Page, TransportError> {
        let file = tokio::fs::File::open(&form.file_path).await?;
        let length = file.metadata().await?.len();
        let part = multipart::Part::stream_with_length(file, length).file_name(form.file_name);

        let mut body = multipart::Form::new();
        for (name, value) in form.fields {
            body = body.text(name, value);
        }
        body = body.part(form.file_field, part);

        debug!(url, bytes = length, "POST multipart");
        let res = self
            .client
            .post(url)
            .multipart(body)
            .timeout(timeout)
            .send()
            .await?;
        let final_url = res.url().to_string();
        let body = res.text().await?;
        Ok(Page { body, final_url })
    }
}
