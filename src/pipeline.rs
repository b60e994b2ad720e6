//! Sequential batch: one account at a time, best effort across the batch.

use std::fs;
use std::path::PathBuf;
use std::thread::sleep;

use chrono::Utc;
use thiserror::Error;

use crate::config::RunConfig;
use crate::error::{FeedError, FetchError, PipelineError};
use crate::feed::{self, FeedMeta};
use crate::normalize::{normalize, NormalizedPost};
use crate::source::{PostSource, SourceGuard};

#[derive(Debug, Error)]
enum AccountError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("no posts found")]
    NoPosts,
    #[error(transparent)]
    Feed(#[from] FeedError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountOutcome {
    pub account: String,
    /// Written feed file; `None` when the account failed.
    pub feed: Option<PathBuf>,
    pub posts: usize,
    pub error: Option<String>,
}

impl AccountOutcome {
    pub fn succeeded(&self) -> bool {
        self.feed.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<AccountOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

/// Process every configured account with `source`, which is closed when the
/// batch ends however it ends. Only configuration problems and
/// authentication challenges abort; other failures are logged per account.
pub fn run_batch(config: &RunConfig, source: Box<dyn PostSource>) -> Result<BatchReport, PipelineError> {
    let mut source = SourceGuard::new(source);
    fs::create_dir_all(&config.feeds_dir)
        .map_err(|e| PipelineError::Io { path: config.feeds_dir.clone(), source: e })?;

    tracing::info!(
        accounts = config.accounts.len(),
        source = source.name(),
        feeds_dir = %config.feeds_dir.display(),
        "generating feeds"
    );

    let mut report = BatchReport::default();
    let total = config.accounts.len();
    for (i, account) in config.accounts.iter().enumerate() {
        let span = tracing::info_span!("account", account = %account);
        let _enter = span.enter();
        tracing::info!("processing @{account}");

        let outcome = match process_account(config, &mut *source, account) {
            Ok((path, posts)) => {
                tracing::info!(posts, path = %path.display(), "generated feed");
                AccountOutcome { account: account.clone(), feed: Some(path), posts, error: None }
            }
            Err(AccountError::Fetch(e)) if e.is_fatal() => {
                tracing::error!(error = %e, "authentication challenge, aborting batch");
                return Err(PipelineError::AuthChallenge { account: account.clone(), message: e.to_string() });
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to generate feed");
                AccountOutcome { account: account.clone(), feed: None, posts: 0, error: Some(e.to_string()) }
            }
        };
        report.outcomes.push(outcome);

        if i + 1 < total && !config.delay.is_zero() {
            tracing::info!(delay = ?config.delay, "waiting before next account");
            sleep(config.delay);
        }
    }

    tracing::info!("complete ({}/{} successful)", report.succeeded(), report.total());
    Ok(report)
}

fn process_account(config: &RunConfig, source: &mut dyn PostSource, account: &str) -> Result<(PathBuf, usize), AccountError> {
    let page = source.fetch(account, config.max_posts)?;
    if page.records.is_empty() {
        return Err(AccountError::NoPosts);
    }

    let now = Utc::now();
    let posts: Vec<NormalizedPost> = page
        .records
        .iter()
        .map(|record| normalize(record, account, now, config.normalize))
        .collect();

    let meta = FeedMeta::for_account(account, &page.profile);
    let document = feed::render(&meta, &posts, config.format, now)?;
    let path = feed::write_feed(&config.feeds_dir, account, &document)?;
    Ok((path, posts.len()))
}
