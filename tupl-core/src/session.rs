//! Shared upload plumbing handed to every site protocol.
//!
//! The session owns the concurrency gate, which bounds simultaneous upload
//! POSTs only. Page fetches and link polling go through [`UploadSession::fetch`]
//! and are never throttled.
//!
//! Progress uses an optimistic two-phase count: [`UploadSession::post_upload`]
//! marks the file as succeeded as soon as the POST returns, and a protocol that
//! then fails to extract its link calls [`UploadSession::revert_success`]. The
//! scheduler reverts a unit that panicked the same way. Commits are keyed by
//! source path, so a revert only ever undoes that file's own commit. Once every
//! task has settled the count equals the number of fully completed uploads.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::info;

use crate::error::{FileTooLargeError, UploadError};
use crate::transport::{Page, Transport, UploadForm};

/// `[done/total]` snapshot taken right after a successful POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressMark {
    pub done: usize,
    pub total: usize,
}

impl fmt::Display for ProgressMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}]", self.done, self.total)
    }
}

#[derive(Debug)]
struct Progress {
    committed: Mutex<HashSet<PathBuf>>,
    total: usize,
}

impl Progress {
    fn committed(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.committed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, source: &Path) -> ProgressMark {
        let mut committed = self.committed();
        committed.insert(source.to_path_buf());
        ProgressMark {
            done: committed.len(),
            total: self.total,
        }
    }

    /// No-op for a file that was never committed.
    fn revert(&self, source: &Path) -> bool {
        self.committed().remove(source)
    }
}

pub struct UploadSession {
    transport: Arc<dyn Transport>,
    gate: Semaphore,
    progress: Progress,
    post_timeout: Duration,
}

impl fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSession")
            .field("available_permits", &self.gate.available_permits())
            .field("progress", &self.progress)
            .field("post_timeout", &self.post_timeout)
            .finish_non_exhaustive()
    }
}

impl UploadSession {
    /// `upload_limit` must be at least 1; the pipeline rejects zero up front.
    pub fn new(
        transport: Arc<dyn Transport>,
        upload_limit: usize,
        total: usize,
        post_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            gate: Semaphore::new(upload_limit),
            progress: Progress {
                committed: Mutex::new(HashSet::new()),
                total,
            },
            post_timeout,
        }
    }

    /// Unthrottled GET.
    pub async fn fetch(&self, url: &str) -> Result<Page, UploadError> {
        self.transport
            .get(url)
            .await
            .map_err(|source| UploadError::Fetch {
                url: url.to_string(),
                source,
            })
    }

    /// Size-checked, gated multipart POST. Counts the upload as a success the
    /// moment the server answers.
    pub async fn post_upload(
        &self,
        url: &str,
        form: UploadForm,
        max_file_size: u64,
    ) -> Result<(Page, ProgressMark), UploadError> {
        let name = form
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| form.file_name.clone());

        let size = tokio::fs::metadata(&form.file_path)
            .await
            .map_err(|source| UploadError::Metadata {
                path: form.file_path.clone(),
                source,
            })?
            .len();
        if size > max_file_size {
            return Err(FileTooLargeError {
                name,
                size,
                limit: max_file_size,
            }
            .into());
        }

        let form_path = form.file_path.clone();
        // The gate is never closed, so this cannot fail.
        let _permit = self.gate.acquire().await.ok();
        info!(file = %name, "[UPLOAD] Uploading");
        let page = self
            .transport
            .post_multipart(url, form, self.post_timeout)
            .await
            .map_err(|source| UploadError::Post {
                name: name.clone(),
                source,
            })?;
        Ok((page, self.progress.commit(&form_path)))
    }

    /// Takes back the optimistic success of `source`. Returns whether there
    /// was one to take back.
    pub fn revert_success(&self, source: &Path) -> bool {
        self.progress.revert(source)
    }

    pub fn succeeded(&self) -> usize {
        self.progress.committed().len()
    }

    pub fn total(&self) -> usize {
        self.progress.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[tokio::test]
    async fn revert_only_undoes_that_files_commit() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.rar");
        let b = dir.path().join("b.rar");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let mut transport = MockTransport::new();
        transport
            .expect_post_multipart()
            .times(1)
            .returning(|_, _, _| Ok(Page::default()));
        let session = UploadSession::new(Arc::new(transport), 1, 2, Duration::from_secs(1));

        let (_, mark) = session
            .post_upload("http://x/", UploadForm::new("file", &a, "r.rar"), 10)
            .await
            .unwrap();
        assert_eq!(mark.to_string(), "[1/2]");

        assert!(!session.revert_success(&b), "b was never posted");
        assert_eq!(session.succeeded(), 1);
        assert!(session.revert_success(&a));
        assert!(!session.revert_success(&a));
        assert_eq!(session.succeeded(), 0);
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_before_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.bin");
        std::fs::write(&big, vec![0u8; 32]).unwrap();

        let mut transport = MockTransport::new();
        transport.expect_post_multipart().never();
        let session = UploadSession::new(Arc::new(transport), 1, 1, Duration::from_secs(1));

        let err = session
            .post_upload("http://x/", UploadForm::new("file", &big, "r.bin"), 16)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::FileTooLarge(e) if e.size == 32 && e.limit == 16));
    }
}
