//! Naming engine: decides the name each file is uploaded under.
//!
//! With a name length below [`MIN_RANDOM_NAME_LEN`] every file keeps its
//! original name. Otherwise the trailing extension segments (at most
//! [`MAX_SUFFIX_SEGMENTS`]) are kept and the stem is replaced by a random hex
//! token. Files sharing a stem share the token, so `movie.part1.rar` and
//! `movie.part2.rar` stay joinable after renaming.
//!
//! Tokens are not checked for collisions: two stems drawing the same token is
//! left to the birthday odds of a UUID v4 prefix.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

/// Shortest token length that triggers renaming.
pub const MIN_RANDOM_NAME_LEN: usize = 3;
/// Longest token a UUID v4 simple string can provide.
pub const MAX_RANDOM_NAME_LEN: usize = 32;
/// How many trailing `.ext` segments survive renaming.
pub const MAX_SUFFIX_SEGMENTS: usize = 2;

/// Splits `name` into `(stem, suffix)`, where the suffix is made of up to
/// two trailing `.segment` parts whose characters are alphanumeric or `_`.
///
/// A leading dot never starts a suffix, so `.bashrc` is all stem.
pub fn split_extension(name: &str) -> (&str, &str) {
    let mut stem_end = name.len();
    for _ in 0..MAX_SUFFIX_SEGMENTS {
        let head = &name[..stem_end];
        let Some(dot) = head.rfind('.') else { break };
        let segment = &head[dot + 1..];
        if dot == 0
            || segment.is_empty()
            || !segment.chars().all(|c| c.is_alphanumeric() || c == '_')
        {
            break;
        }
        stem_end = dot;
    }
    name.split_at(stem_end)
}

fn random_token(len: usize) -> String {
    let len = len.min(MAX_RANDOM_NAME_LEN);
    Uuid::new_v4().simple().to_string()[..len].to_string()
}

/// Assigns an upload name to every file, returned in input order as
/// `(original, assigned)` pairs.
pub fn assign_names<S: AsRef<str>>(files: &[S], name_length: usize) -> Vec<(String, String)> {
    if name_length < MIN_RANDOM_NAME_LEN {
        return files
            .iter()
            .map(|f| (f.as_ref().to_string(), f.as_ref().to_string()))
            .collect();
    }

    let mut tokens: HashMap<&str, String> = HashMap::new();
    files
        .iter()
        .map(|file| {
            let original = file.as_ref();
            let (stem, suffix) = split_extension(original);
            let token = tokens
                .entry(stem)
                .or_insert_with(|| random_token(name_length));
            let assigned = format!("{token}{suffix}");
            debug!(file = %original, assigned = %assigned, "[NAMING] Assigned upload name");
            (original.to_string(), assigned)
        })
        .collect()
}
