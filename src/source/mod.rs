//! Post sources: where raw post records come from.

pub mod api;
pub mod mirror;

use std::ops::{Deref, DerefMut};

use crate::error::FetchError;
use crate::record::RawPostRecord;

pub use api::ApiPostSource;
pub use mirror::MirrorPostSource;

/// Feed-level facts about an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileInfo {
    pub full_name: Option<String>,
    pub biography: Option<String>,
}

impl ProfileInfo {
    pub fn display_name<'a>(&'a self, account: &'a str) -> &'a str {
        self.full_name.as_deref().map(str::trim).filter(|s| !s.is_empty()).unwrap_or(account)
    }

    pub fn description(&self, account: &str) -> String {
        match self.biography.as_deref().map(str::trim) {
            Some(bio) if !bio.is_empty() => bio.to_string(),
            _ => format!("Instagram posts from @{account}"),
        }
    }
}

/// Everything one fetch returns for an account.
#[derive(Debug, Clone, Default)]
pub struct AccountPage {
    pub profile: ProfileInfo,
    pub records: Vec<RawPostRecord>,
}

pub trait PostSource {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Recent posts for `account`, at most `limit`.
    fn fetch(&mut self, account: &str, limit: usize) -> Result<AccountPage, FetchError>;

    /// Release the session or browser handle. Called once, by [`SourceGuard`].
    fn close(&mut self) {}
}

/// Owns a source for the length of a batch and closes it on every exit path.
pub struct SourceGuard<S: PostSource + ?Sized> {
    source: Box<S>,
}

impl<S: PostSource + ?Sized> SourceGuard<S> {
    pub fn new(source: Box<S>) -> Self {
        Self { source }
    }
}

impl<S: PostSource + ?Sized> Deref for SourceGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.source
    }
}

impl<S: PostSource + ?Sized> DerefMut for SourceGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: PostSource + ?Sized> Drop for SourceGuard<S> {
    fn drop(&mut self) {
        tracing::debug!(source = self.source.name(), "closing post source");
        self.source.close();
    }
}
