//! Account source: which Instagram accounts a run processes.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{thread_rng, SeedableRng};
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<String>,
}

/// Instagram usernames: ASCII letters, digits, `.` and `_`.
///
/// Names are used verbatim as URL path segments and feed file names, so
/// anything else could leave the mirror base or collide on disk.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().any(|b| b != b'.')
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_')
}

// Trim, drop empties, and skip (with a warning) names that are not usernames.
fn clean<'a>(entries: impl Iterator<Item = &'a str>) -> Vec<String> {
    entries
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| {
            let ok = is_valid_name(s);
            if !ok {
                tracing::warn!(account = %s, "skipping invalid account name");
            }
            ok
        })
        .map(str::to_string)
        .collect()
}

/// Split a comma-separated list, trimming entries and dropping empty or
/// invalid ones. Order and duplicates are kept as given.
pub fn parse_list(raw: &str) -> Vec<String> {
    clean(raw.split(','))
}

/// Read the `accounts` array of a JSON accounts file.
pub fn read_file(path: &Path) -> Result<Vec<String>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let parsed: AccountsFile =
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    Ok(clean(parsed.accounts.iter().map(String::as_str)))
}

/// The environment list wins when it names at least one account; otherwise
/// the file is read. A missing file with no environment list is reported as
/// "no accounts" rather than an IO failure.
pub fn load(env_list: Option<&str>, file: &Path) -> Result<Vec<String>, ConfigError> {
    if let Some(raw) = env_list {
        let from_env = parse_list(raw);
        if !from_env.is_empty() {
            tracing::debug!(count = from_env.len(), "accounts from environment");
            return Ok(from_env);
        }
    }

    let from_file = match read_file(file) {
        Ok(list) => list,
        Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e),
    };
    if from_file.is_empty() {
        return Err(ConfigError::NoAccounts(file.to_path_buf()));
    }
    tracing::debug!(count = from_file.len(), file = %file.display(), "accounts from file");
    Ok(from_file)
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub shuffle: bool,
    /// Fixed seed makes the shuffle reproducible.
    pub seed: Option<u64>,
    pub max_accounts: Option<usize>,
}

/// Shuffle (optionally) and truncate to the batch size.
pub fn select(mut accounts: Vec<String>, selection: &Selection) -> Vec<String> {
    if selection.shuffle {
        match selection.seed {
            Some(seed) => accounts.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => accounts.shuffle(&mut thread_rng()),
        }
    }
    if let Some(max) = selection.max_accounts {
        accounts.truncate(max);
    }
    accounts
}
