//! Ledger: the durable `name:url` record of finished uploads.
//!
//! One line per upload, the first `:` separating the local file name from the
//! download link. A ledger may hold lines for several destinations; a line
//! belongs to a destination when its url contains the destination's root
//! domain. Attribution is never stored, only derived, so two destinations
//! whose root domains are substrings of one another will see each other's
//! lines.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::LedgerWriteError;

/// A single `name:url` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub name: String,
    pub url: String,
}

impl LedgerEntry {
    /// Parses a line, splitting on the first colon. Lines without a colon are
    /// not entries.
    pub fn parse(line: &str) -> Option<Self> {
        let (name, url) = line.trim().split_once(':')?;
        Some(Self {
            name: name.to_string(),
            url: url.to_string(),
        })
    }

    pub fn belongs_to(&self, domain: &str) -> bool {
        self.url.contains(domain)
    }

    pub fn to_line(&self) -> String {
        format!("{}:{}\n", self.name, self.url)
    }
}

fn line_belongs_to(line: &str, domain: &str) -> bool {
    LedgerEntry::parse(line).is_some_and(|e| e.belongs_to(domain))
}

/// Handle on a ledger file. Appends are serialised so concurrent uploads each
/// land as one whole line.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names already uploaded to `domain`. An absent ledger excludes nothing.
    pub async fn list_excluded(&self, domain: &str) -> std::io::Result<HashSet<String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(e),
        };
        let excluded: HashSet<String> = content
            .lines()
            .filter_map(LedgerEntry::parse)
            .filter(|e| e.belongs_to(domain))
            .map(|e| e.name)
            .collect();
        debug!(
            ledger = %self.path.display(),
            domain,
            count = excluded.len(),
            "[LEDGER] Loaded already uploaded names"
        );
        Ok(excluded)
    }

    /// Appends one entry, creating the parent directory if needed. The line is
    /// written in a single call and flushed before the lock is released.
    pub async fn append(&self, name: &str, url: &str) -> Result<(), LedgerWriteError> {
        let line = LedgerEntry {
            name: name.to_string(),
            url: url.to_string(),
        }
        .to_line();
        let wrap = |source| LedgerWriteError {
            path: self.path.clone(),
            source,
        };

        let _guard = self.write_lock.lock().await;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(wrap)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(wrap)?;
        file.write_all(line.as_bytes()).await.map_err(wrap)?;
        file.flush().await.map_err(wrap)?;
        debug!(ledger = %self.path.display(), file = %name, "[LEDGER] Appended entry");
        Ok(())
    }

    /// Moves the lines of `domain` to the end of the file in lexicographic
    /// order, keeping every other line (blank ones included) where it was
    /// relative to its peers. Returns `false` when there was nothing to sort.
    pub async fn sort_in_place(&self, domain: &str) -> Result<bool, LedgerWriteError> {
        let wrap = |source| LedgerWriteError {
            path: self.path.clone(),
            source,
        };
        let _guard = self.write_lock.lock().await;
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(wrap(e)),
        };

        let lines: Vec<&str> = content.lines().map(str::trim).collect();
        if lines.is_empty() {
            return Ok(false);
        }

        let (mut matching, other): (Vec<&str>, Vec<&str>) =
            lines.into_iter().partition(|l| line_belongs_to(l, domain));
        matching.sort_unstable();

        let mut out = String::with_capacity(content.len());
        for line in other.iter().chain(matching.iter()) {
            out.push_str(line);
            out.push('\n');
        }
        tokio::fs::write(&self.path, out).await.map_err(wrap)?;
        info!(
            ledger = %self.path.display(),
            domain,
            sorted = matching.len(),
            kept = other.len(),
            "[LEDGER] Sorted result file"
        );
        Ok(true)
    }
}

/// Works out where the ledger lives.
///
/// An absolute `result_filename` is taken as is and a relative one is placed
/// under `home`. An empty one becomes `<home>/<source folder>_<domain>.txt`.
pub fn resolve_ledger_path(
    result_filename: &str,
    files_path: &Path,
    root_domain: &str,
    home: &Path,
) -> PathBuf {
    let requested = Path::new(result_filename);
    if requested.is_absolute() {
        return requested.to_path_buf();
    }
    if !result_filename.is_empty() {
        return home.join(requested);
    }
    let folder = files_path
        .components()
        .next_back()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_default();
    home.join(format!("{folder}_{root_domain}.txt"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_splits_on_first_colon_only() {
        let e = LedgerEntry::parse("a.rar:https://anonfile.com/x:y").unwrap();
        assert_eq!(e.name, "a.rar");
        assert_eq!(e.url, "https://anonfile.com/x:y");
        assert!(LedgerEntry::parse("no separator").is_none());
    }

    #[test]
    fn default_ledger_name_uses_folder_and_domain() {
        let home = Path::new("/home/u/TUpl");
        assert_eq!(
            resolve_ledger_path("", Path::new("/data/holiday/"), "anonfile", home),
            PathBuf::from("/home/u/TUpl/holiday_anonfile.txt")
        );
        assert_eq!(
            resolve_ledger_path("links.txt", Path::new("/data/holiday"), "anonfile", home),
            PathBuf::from("/home/u/TUpl/links.txt")
        );
        assert_eq!(
            resolve_ledger_path("/tmp/out.txt", Path::new("/data"), "anonfile", home),
            PathBuf::from("/tmp/out.txt")
        );
    }
}
