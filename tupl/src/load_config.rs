/// `load_config` module: reads an optional YAML upload profile.
///
/// A profile holds per-user defaults for every batch option, so a common
/// setup (proxy port, result file, upload limit) doesn't have to be retyped.
/// Flags given on the command line always win over the profile; see
/// [`crate::cli::Cli::batch_options`].
///
/// # Accepted schema
/// ```yaml
/// upload:
///   result: uploads.txt
///   filter: [".rar", ".zip"]
///   exclude: true
///   name_length: 12
///   tor_port: 9050
///   limit: 3
///   timeout_secs: 7200
///   sort: true
///   write: true
///   home: /data/tupl
/// ```
/// Every key is optional; an empty file is a valid profile.
///
/// # Errors
/// Failures surface as `anyhow::Error` at the CLI boundary.
use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Environment variable overriding the ledger home directory.
pub const HOME_ENV: &str = "TUPL_HOME";

#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub upload: UploadSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadSection {
    pub result: Option<String>,
    pub filter: Option<Vec<String>>,
    pub exclude: Option<bool>,
    pub name_length: Option<usize>,
    pub tor_port: Option<i64>,
    pub limit: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub sort: Option<bool>,
    pub write: Option<bool>,
    pub home: Option<PathBuf>,
}

/// Loads an upload profile from `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "[CONFIG] Loading upload profile");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "[CONFIG] Failed to read profile");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    if content.trim().is_empty() {
        return Ok(CliConfig::default());
    }

    match serde_yaml::from_str::<CliConfig>(&content) {
        Ok(config) => {
            info!(config_path = ?path_ref, "[CONFIG] Parsed upload profile");
            Ok(config)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "[CONFIG] Failed to parse profile YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}
