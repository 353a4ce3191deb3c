use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

/// Default SOCKS port of a local Tor service.
pub const DEFAULT_TOR_PORT: i64 = 9050;
pub const DEFAULT_UPLOAD_LIMIT: usize = 3;
pub const DEFAULT_NAME_LENGTH: usize = 12;
pub const DEFAULT_POST_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 2);

/// How the transport reaches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyConfig {
    Direct,
    Socks5 { host: String, port: u16 },
}

impl ProxyConfig {
    /// Ports in `0..=65535` mean a local SOCKS5 proxy, anything else means
    /// going direct.
    pub fn from_tor_port(port: i64) -> Self {
        match u16::try_from(port) {
            Ok(port) => ProxyConfig::Socks5 {
                host: "localhost".to_string(),
                port,
            },
            Err(_) => ProxyConfig::Direct,
        }
    }

    /// Proxy url with DNS resolved on the proxy side.
    pub fn url(&self) -> Option<String> {
        match self {
            ProxyConfig::Direct => None,
            ProxyConfig::Socks5 { host, port } => Some(format!("socks5h://{host}:{port}")),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, ProxyConfig::Direct)
    }
}

/// Everything one batch needs besides the destination itself.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Folder holding the files to upload.
    pub files_path: PathBuf,
    /// Ledger file; see [`crate::ledger::resolve_ledger_path`].
    pub result_filename: String,
    /// Extension/name expressions; `None` uploads every file.
    pub filter: Option<Vec<String>>,
    /// Skip files the ledger already records for this destination.
    pub exclude_uploaded: bool,
    /// Random name length; below 3 keeps original names.
    pub name_length: usize,
    pub proxy: ProxyConfig,
    /// Maximum simultaneous upload POSTs.
    pub upload_limit: usize,
    pub post_timeout: Duration,
    pub sort_results: bool,
    pub write_results: bool,
    /// Directory for relative ledger names. Falls back to `~/TUpl`.
    pub ledger_home: Option<PathBuf>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            files_path: PathBuf::new(),
            result_filename: String::new(),
            filter: None,
            exclude_uploaded: true,
            name_length: DEFAULT_NAME_LENGTH,
            proxy: ProxyConfig::from_tor_port(DEFAULT_TOR_PORT),
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            post_timeout: DEFAULT_POST_TIMEOUT,
            sort_results: true,
            write_results: true,
            ledger_home: None,
        }
    }
}

impl BatchOptions {
    pub fn new(files_path: impl Into<PathBuf>) -> Self {
        Self {
            files_path: files_path.into(),
            ..Self::default()
        }
    }

    /// Ledger home when none is configured.
    pub fn default_ledger_home() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join("TUpl"))
    }

    pub fn trace_loaded(&self) {
        info!(
            files_path = %self.files_path.display(),
            upload_limit = self.upload_limit,
            name_length = self.name_length,
            proxy = ?self.proxy.url(),
            exclude_uploaded = self.exclude_uploaded,
            "Loaded BatchOptions"
        );
        debug!(?self, "BatchOptions loaded (full debug)");
    }
}
