#![doc = "tupl-core: upload orchestration for tupl."]

//! Bulk-uploads a folder to a file-hosting site, renaming files on the way,
//! and records the resulting links in a mergeable, resumable ledger.
//!
//! # Layout
//! - [`naming`]: random upload names that keep multi-part archives joinable
//! - [`ledger`]: the `name:url` result file, exclusion lookups and sorting
//! - [`transport`]: the shared network session ([`transport::Transport`])
//! - [`session`]: concurrency gate and progress counter around the transport
//! - [`protocol`]: the per-site upload capability and its two shapes
//! - [`sites`]: built-in destinations
//! - [`discovery`]: candidate files in the source folder
//! - [`scheduler`]: bounded fan-out over all tasks with isolated failures
//! - [`pipeline`]: the whole batch, from setup checks to the final sort
//!
//! The CLI lives in the `tupl` crate; nothing here parses arguments.

pub mod config;
pub mod discovery;
pub mod error;
pub mod ledger;
pub mod naming;
pub mod pipeline;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod sites;
pub mod transport;
