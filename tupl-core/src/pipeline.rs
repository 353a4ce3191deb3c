//! Batch pipeline: setup checks → discovery → dedup → naming → uploads →
//! ledger sort.
//!
//! # Error Handling
//! Only [`SetupError`]s leave this module, and only before the first upload
//! starts. After that, failures are per file and show up in the returned
//! [`BatchReport`].
//!
//! # Navigation
//! - [`prepare_tasks`]: everything up to the immutable task list
//! - [`run_pipeline`]: a full batch over any [`Transport`]
//! - [`run_with_http`]: a full batch over the real network

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::BatchOptions;
use crate::discovery::{discover_files, FileFilter};
use crate::error::SetupError;
use crate::ledger::{resolve_ledger_path, Ledger};
use crate::naming::assign_names;
use crate::protocol::{SiteDescriptor, UploadTask};
use crate::scheduler::{run_batch, BatchReport};
use crate::session::UploadSession;
use crate::transport::{HttpTransport, Transport};

/// Where this batch's ledger lives.
pub fn ledger_path(options: &BatchOptions, site: &SiteDescriptor) -> Result<PathBuf, SetupError> {
    let home = options
        .ledger_home
        .clone()
        .or_else(BatchOptions::default_ledger_home)
        .ok_or(SetupError::HomeUnavailable)?;
    Ok(resolve_ledger_path(
        &options.result_filename,
        &options.files_path,
        &site.root_domain()?,
        &home,
    ))
}

/// Checks that must pass before anything touches the network.
pub fn validate(options: &BatchOptions, site: &SiteDescriptor) -> Result<(), SetupError> {
    if site.requires_proxy()? && options.proxy.is_direct() {
        return Err(SetupError::ProxyRequired { host: site.host()? });
    }
    if options.upload_limit == 0 {
        return Err(SetupError::InvalidUploadLimit);
    }
    Ok(())
}

/// Builds the task list: eligible files minus those the ledger already has
/// for this destination, each with its assigned upload name.
pub async fn prepare_tasks(
    options: &BatchOptions,
    site: &SiteDescriptor,
    ledger: &Ledger,
) -> Result<Vec<UploadTask>, SetupError> {
    let files_path = &options.files_path;
    let is_dir = tokio::fs::metadata(files_path)
        .await
        .is_ok_and(|m| m.is_dir());
    if !is_dir {
        return Err(SetupError::MissingDirectory(files_path.clone()));
    }
    let filter = options
        .filter
        .as_deref()
        .filter(|exprs| !exprs.is_empty())
        .map(FileFilter::parse)
        .transpose()?;

    let excluded = if options.exclude_uploaded {
        ledger
            .list_excluded(&site.root_domain()?)
            .await
            .map_err(|source| SetupError::LedgerRead {
                path: ledger.path().to_path_buf(),
                source,
            })?
    } else {
        Default::default()
    };

    let all_files = discover_files(files_path, filter.as_ref(), site.max_file_size).await?;
    if all_files.is_empty() {
        info!(
            folder = %files_path.display(),
            "[SETUP] There are no files in the folder with suitable sizes or extensions"
        );
        return Ok(Vec::new());
    }

    let files: Vec<String> = all_files
        .into_iter()
        .filter(|f| !excluded.contains(f))
        .collect();
    if files.is_empty() {
        info!(
            site = %site.base_url,
            "[SETUP] All files from the folder have already been uploaded to {}",
            site.base_url
        );
        return Ok(Vec::new());
    }

    let tasks = assign_names(&files, options.name_length)
        .into_iter()
        .map(|(original, assigned)| UploadTask::new(files_path.join(original), assigned))
        .collect::<Vec<_>>();
    info!(
        tasks = tasks.len(),
        already_uploaded = excluded.len(),
        "[SETUP] Prepared upload tasks"
    );
    Ok(tasks)
}

/// Runs one whole batch against `site` over `transport`.
pub async fn run_pipeline(
    options: &BatchOptions,
    site: &SiteDescriptor,
    transport: Arc<dyn Transport>,
) -> Result<BatchReport, SetupError> {
    options.trace_loaded();
    validate(options, site)?;

    let ledger = Ledger::new(ledger_path(options, site)?);
    info!(ledger = %ledger.path().display(), "[SETUP] Using result file");
    let tasks = prepare_tasks(options, site, &ledger).await?;

    let mut report = if tasks.is_empty() {
        BatchReport::empty()
    } else {
        let session = UploadSession::new(
            transport,
            options.upload_limit,
            tasks.len(),
            options.post_timeout,
        );
        let ledger = options.write_results.then_some(&ledger);
        run_batch(&tasks, site, &session, ledger).await
    };

    if options.sort_results {
        match ledger.sort_in_place(&site.root_domain()?).await {
            Ok(sorted) => report.sorted = sorted,
            Err(e) => error!(error = ?e, "[LEDGER] {e}"),
        }
    }

    match serde_json::to_string(&report.summary) {
        Ok(json) => debug!(json = %json, "[BATCH] Run summary"),
        Err(e) => error!(error = ?e, "[BATCH] Failed to serialise run summary"),
    }
    Ok(report)
}

/// [`run_pipeline`] over an [`HttpTransport`] built from the configured proxy.
pub async fn run_with_http(
    options: &BatchOptions,
    site: &SiteDescriptor,
) -> Result<BatchReport, SetupError> {
    validate(options, site)?;
    let transport = HttpTransport::new(&options.proxy)?;
    run_pipeline(options, site, Arc::new(transport)).await
}
