//! File discovery: which files in the source folder are candidates at all.

use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::SetupError;

/// Lone quantifiers that would make the joined expression match everything
/// or nothing; they are dropped before compiling.
const REJECTED_EXPRESSIONS: [&str; 3] = ["*", "+", "?"];

/// Name filter built from user expressions such as `.rar` or `.part\d+.rar`.
///
/// Each `.` is a literal dot; the expressions are alternatives and match
/// anywhere in the file name.
#[derive(Debug, Clone)]
pub struct FileFilter {
    pattern: Regex,
}

impl FileFilter {
    pub fn parse<S: AsRef<str>>(expressions: &[S]) -> Result<Self, SetupError> {
        let kept: Vec<&str> = expressions
            .iter()
            .map(AsRef::as_ref)
            .filter(|e| !REJECTED_EXPRESSIONS.contains(e))
            .collect();
        if kept.is_empty() {
            return Err(SetupError::EmptyFilter);
        }
        let expression = kept.join("|").replace('.', r"\.");
        let pattern = Regex::new(&expression).map_err(|source| SetupError::FilterRegex {
            expression: expression.clone(),
            source,
        })?;
        debug!(%expression, "Compiled file filter");
        Ok(Self { pattern })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.pattern.is_match(file_name)
    }
}

/// Regular files directly inside `dir` that are strictly smaller than
/// `max_size` and pass `filter`, sorted by name.
pub async fn discover_files(
    dir: &Path,
    filter: Option<&FileFilter>,
    max_size: u64,
) -> Result<Vec<String>, SetupError> {
    let is_dir = tokio::fs::metadata(dir)
        .await
        .is_ok_and(|m| m.is_dir());
    if !is_dir {
        return Err(SetupError::MissingDirectory(dir.to_path_buf()));
    }
    let read_err = |source| SetupError::DirectoryRead {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let metadata = match tokio::fs::metadata(entry.path()).await {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %entry.path().display(), error = ?e, "Skipping unreadable entry");
                continue;
            }
        };
        if !metadata.is_file() || metadata.len() >= max_size {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %entry.path().display(), "Skipping file with a non UTF-8 name");
            continue;
        };
        if filter.map_or(true, |f| f.matches(&name)) {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}
