//! Upload scheduler: runs one unit of work per task and fans the results in.
//!
//! All units start together and are multiplexed on the calling task, so the
//! progress counter and ledger appends are driven from one place. Only upload
//! POSTs are bounded, by the session's gate; preparatory fetches and link
//! polling are not. A unit that errors or panics is contained and reported as
//! an absent result, and any success it had already counted is taken back, so
//! its siblings always run to completion and the summary stays exact.

use std::panic::AssertUnwindSafe;

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::ledger::Ledger;
use crate::protocol::{SiteDescriptor, UploadOutcome, UploadTask};
use crate::session::UploadSession;

/// End-of-run counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.attempted.saturating_sub(self.succeeded)
    }

    /// Human-readable outcome line; `None` when nothing was attempted.
    pub fn message(&self) -> Option<String> {
        match (self.attempted, self.failed()) {
            (0, _) => None,
            (_, 0) => Some("All files were uploaded successfully.".to_string()),
            (_, failed) => Some(format!("Failed to upload {failed} files!")),
        }
    }
}

/// What a batch produced, results in task order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<UploadOutcome>,
    pub summary: RunSummary,
    /// Whether the ledger was re-sorted afterwards.
    pub sorted: bool,
}

impl BatchReport {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            summary: RunSummary {
                attempted: 0,
                succeeded: 0,
            },
            sorted: false,
        }
    }

    pub fn uploaded(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results
            .iter()
            .filter_map(|r| r.url.as_deref().map(|url| (r.name.as_str(), url)))
    }
}

fn fallback_name(task: &UploadTask) -> String {
    task.display_name()
        .unwrap_or_else(|_| task.assigned_name.clone())
}

async fn run_unit(
    task: &UploadTask,
    site: &SiteDescriptor,
    session: &UploadSession,
    ledger: Option<&Ledger>,
) -> UploadOutcome {
    let attempt = AssertUnwindSafe(site.protocol.upload(site, session, task))
        .catch_unwind()
        .await;
    let outcome = match attempt {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!(file = %task.source_path.display(), error = ?e, "[BATCH] Upload task rejected");
            session.revert_success(&task.source_path);
            return UploadOutcome::failed(fallback_name(task));
        }
        Err(_) => {
            // May have died after its POST was counted.
            let reverted = session.revert_success(&task.source_path);
            error!(
                file = %task.source_path.display(),
                reverted,
                "[BATCH] Upload task panicked"
            );
            return UploadOutcome::failed(fallback_name(task));
        }
    };

    if let (Some(ledger), Some(url)) = (ledger, outcome.url.as_deref()) {
        if let Err(e) = ledger.append(&outcome.name, url).await {
            error!(file = %outcome.name, error = ?e, "[LEDGER] {e}");
        }
    }
    outcome
}

/// Uploads every task to `site`, appending each success to `ledger` as soon
/// as it completes. Never fails as a whole.
pub async fn run_batch(
    tasks: &[UploadTask],
    site: &SiteDescriptor,
    session: &UploadSession,
    ledger: Option<&Ledger>,
) -> BatchReport {
    info!(
        tasks = tasks.len(),
        site = %site.base_url,
        "[BATCH] Starting uploads"
    );
    let results = join_all(
        tasks
            .iter()
            .map(|task| run_unit(task, site, session, ledger)),
    )
    .await;

    let summary = RunSummary {
        attempted: tasks.len(),
        succeeded: session.succeeded(),
    };
    match summary.message() {
        Some(message) if summary.failed() > 0 => warn!(failed = summary.failed(), "[BATCH] {message}"),
        Some(message) => info!("[BATCH] {message}"),
        None => {}
    }

    BatchReport {
        results,
        summary,
        sorted: false,
    }
}
