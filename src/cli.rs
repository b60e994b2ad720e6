use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::feed::FeedFormat;
use crate::source::api::DEFAULT_API_URL;
use crate::source::mirror::DEFAULT_MIRROR_URL;

/// ig2rss - generate RSS/Atom feeds from Instagram accounts
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every configured account and write one feed file per account.
    Generate(GenerateArgs),
    /// Print the `accounts` array of a JSON file as a comma-separated list
    /// (suitable for the ACCOUNTS environment variable).
    AccountsEnv(AccountsEnvArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Public mirror site, scraped as HTML.
    Mirror,
    /// Instagram web profile API with a persisted session.
    Api,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Where posts come from.
    #[arg(long, env = "IG2RSS_SOURCE", value_enum, default_value_t = SourceKind::Mirror)]
    pub source: SourceKind,

    /// Comma-separated accounts; takes precedence over the accounts file.
    #[arg(long, env = "ACCOUNTS")]
    pub accounts: Option<String>,

    /// JSON file with an `accounts` array.
    #[arg(long, env = "ACCOUNTS_FILE", default_value = "accounts.json")]
    pub accounts_file: PathBuf,

    /// Output directory for `{account}.xml` files.
    #[arg(long, env = "FEEDS_DIR", default_value = "feeds")]
    pub feeds_dir: PathBuf,

    /// Maximum posts per feed.
    #[arg(long, env = "MAX_POSTS", default_value_t = 20)]
    pub max_posts: usize,

    /// Maximum accounts per run (after shuffling).
    #[arg(long, env = "MAX_ACCOUNTS")]
    pub max_accounts: Option<usize>,

    /// Shuffle the account order before truncating.
    #[arg(long, env = "SHUFFLE_ACCOUNTS")]
    pub shuffle: bool,

    /// Seed for a reproducible shuffle.
    #[arg(long, env = "SHUFFLE_SEED")]
    pub seed: Option<u64>,

    /// Pause between accounts, in seconds.
    #[arg(long, env = "DELAY_BETWEEN_ACCOUNTS", default_value_t = 5)]
    pub delay_secs: u64,

    /// Timeout in milliseconds for network requests.
    #[arg(short = 't', long = "timeout-ms", default_value_t = 10000)]
    pub timeout_ms: u64,

    /// Extra attempts for failed requests.
    #[arg(long, default_value_t = 1)]
    pub retries: u32,

    /// Feed document format.
    #[arg(long, env = "FEED_FORMAT", value_enum, default_value_t = FeedFormat::Rss)]
    pub format: FeedFormat,

    /// Keep captions exactly as fetched (no NFKC folding or control stripping).
    #[arg(long)]
    pub no_text_cleanup: bool,

    /// Skip the short randomized pause before each request.
    #[arg(long, hide = true)]
    pub no_jitter: bool,

    /// Base URL of the mirror site.
    #[arg(long, env = "MIRROR_URL", default_value = DEFAULT_MIRROR_URL)]
    pub mirror_url: String,

    /// Base URL of the Instagram web API.
    #[arg(long, env = "INSTAGRAM_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Session id cookie for the API source.
    #[arg(long, env = "INSTAGRAM_SESSION_ID", hide_env_values = true)]
    pub session_id: Option<String>,

    /// Persisted session settings (JSON) for the API source.
    #[arg(long, env = "INSTAGRAM_SESSION_FILE")]
    pub session_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct AccountsEnvArgs {
    /// JSON file with an `accounts` array.
    #[arg(default_value = "my_accounts.json")]
    pub file: PathBuf,
}
