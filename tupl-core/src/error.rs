//! Error taxonomy for the upload pipeline.
//!
//! Only [`SetupError`] ever reaches the caller of a batch. Everything raised
//! while a single file is in flight ([`UploadError`], [`LedgerWriteError`],
//! [`ProtocolError`]) is logged and degraded to an absent result.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal problems detected before any upload starts.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("folder does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("cannot list folder {path}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad extensions: nothing left to filter on")]
    EmptyFilter,

    #[error("can't parse extensions {expression:?}")]
    FilterRegex {
        expression: String,
        #[source]
        source: regex::Error,
    },

    #[error("to upload to onion host {host} you need to specify a proxy port")]
    ProxyRequired { host: String },

    #[error("upload limit must be at least 1")]
    InvalidUploadLimit,

    #[error("site url {0:?} has no usable host")]
    InvalidSiteUrl(String),

    #[error("unknown upload site {0:?}")]
    UnknownSite(String),

    #[error("home directory is not available; pass an absolute result path")]
    HomeUnavailable,

    #[error("cannot read result file {path}")]
    LedgerRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create HTTP client")]
    Client(#[source] reqwest::Error),
}

/// Failure of a single request made through a [`crate::transport::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed")]
    Request(#[from] reqwest::Error),

    #[error("i/o failure")]
    Io(#[from] std::io::Error),
}

/// Raised instead of issuing a POST for a file over the destination's limit.
#[derive(Debug, Error)]
#[error("file exceeds the maximum size: {name} is {size} bytes, limit {limit}")]
pub struct FileTooLargeError {
    pub name: String,
    pub size: u64,
    pub limit: u64,
}

/// Per-file failure inside the shared upload plumbing.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("error getting {url}")]
    Fetch {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("an error occurred while uploading {name}")]
    Post {
        name: String,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    FileTooLarge(#[from] FileTooLargeError),

    #[error("cannot stat {path}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The ledger could not be created or appended to.
#[derive(Debug, Error)]
#[error("error while writing results to {path}")]
pub struct LedgerWriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Contract violations by the caller of a site protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("upload task has no file name: {0}")]
    MalformedTask(PathBuf),
}
