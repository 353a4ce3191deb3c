//! Command-line surface of tupl.
//!
//! Parsing and option merging live here; every upload decision is made in
//! `tupl-core`. Precedence for each option is: flag, then `--config` profile,
//! then the built-in default. The ledger home comes from `TUPL_HOME`, then
//! the profile, then `~/TUpl`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tupl_core::config::{
    BatchOptions, ProxyConfig, DEFAULT_NAME_LENGTH, DEFAULT_TOR_PORT, DEFAULT_UPLOAD_LIMIT,
};
use tupl_core::pipeline::run_with_http;
use tupl_core::sites::SiteRegistry;

use crate::load_config::{load_config, UploadSection, HOME_ENV};

/// Upload every file in a folder to a file-hosting site and record the links.
#[derive(Debug, Parser)]
#[clap(
    name = "tupl",
    version,
    about = "Bulk-upload a folder to a file-hosting site, optionally through Tor"
)]
pub struct Cli {
    /// Destination site identifier (see the list below)
    pub site: String,

    /// Folder with the files to upload
    pub path: PathBuf,

    /// Result file; relative names go to the ledger home [default: <folder>_<site>.txt]
    #[clap(short, long)]
    pub result: Option<String>,

    /// Only upload files matching these extensions or name fragments
    #[clap(short, long, num_args = 1..)]
    pub filter: Option<Vec<String>>,

    /// Upload files even if the result file already has them for this site
    #[clap(long)]
    pub no_exclude: bool,

    /// Random name length; below 3 keeps original names [default: 12]
    #[clap(short = 'n', long = "number")]
    pub name_length: Option<usize>,

    /// Local Tor SOCKS port; out-of-range values connect directly [default: 9050]
    #[clap(short, long, allow_negative_numbers = true)]
    pub port: Option<i64>,

    /// Maximum simultaneous uploads [default: 3]
    #[clap(short, long)]
    pub limit: Option<usize>,

    /// Upload request timeout in seconds [default: 7200]
    #[clap(short, long)]
    pub timeout: Option<u64>,

    /// Leave the result file unsorted
    #[clap(long)]
    pub no_sort: bool,

    /// Don't write links to the result file
    #[clap(long)]
    pub no_write: bool,

    /// YAML profile with defaults for the options above
    #[clap(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Parses the process arguments, listing the built-in sites in `--help`.
    pub fn parse_with_sites(registry: &SiteRegistry) -> Self {
        let matches = Self::command()
            .after_help(format!("Sites: {}", registry.describe()))
            .get_matches();
        <Self as clap::FromArgMatches>::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
    }

    /// Merges flags over `profile` over the defaults.
    pub fn batch_options(
        &self,
        profile: Option<&UploadSection>,
        home_env: Option<PathBuf>,
    ) -> BatchOptions {
        let empty = UploadSection::default();
        let profile = profile.unwrap_or(&empty);
        let defaults = BatchOptions::default();

        BatchOptions {
            files_path: self.path.clone(),
            result_filename: self
                .result
                .clone()
                .or_else(|| profile.result.clone())
                .unwrap_or_default(),
            filter: self.filter.clone().or_else(|| profile.filter.clone()),
            exclude_uploaded: !self.no_exclude
                && profile.exclude.unwrap_or(defaults.exclude_uploaded),
            name_length: self
                .name_length
                .or(profile.name_length)
                .unwrap_or(DEFAULT_NAME_LENGTH),
            proxy: ProxyConfig::from_tor_port(
                self.port.or(profile.tor_port).unwrap_or(DEFAULT_TOR_PORT),
            ),
            upload_limit: self
                .limit
                .or(profile.limit)
                .unwrap_or(DEFAULT_UPLOAD_LIMIT),
            post_timeout: self
                .timeout
                .or(profile.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.post_timeout),
            sort_results: !self.no_sort && profile.sort.unwrap_or(defaults.sort_results),
            write_results: !self.no_write && profile.write.unwrap_or(defaults.write_results),
            ledger_home: home_env.or_else(|| profile.home.clone()),
        }
    }
}

/// CLI entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!(site = %cli.site, path = %cli.path.display(), "[CLI] Starting batch");

    let registry = SiteRegistry::builtin()?;
    let site = registry.get(&cli.site)?;

    let profile = cli.config.as_ref().map(load_config).transpose()?;
    let home_env = std::env::var_os(HOME_ENV).map(PathBuf::from);
    let options = cli.batch_options(profile.as_ref().map(|c| &c.upload), home_env);

    let report = match run_with_http(&options, site).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(site = %cli.site, error = %e, "[CLI] Batch could not start");
            return Err(e.into());
        }
    };
    tracing::info!(summary = ?report.summary, "[CLI] Batch finished");

    if let Some(message) = report.summary.message() {
        println!("{message}");
    }
    if report.sorted {
        println!("Result file were sorted");
    }
    Ok(())
}
