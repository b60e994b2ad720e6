use std::thread::sleep;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT};
use url::Url;

use crate::error::FetchError;

const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct Page {
    pub status: u16,
    pub body: String,
}

impl Page {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking client with rotating browser headers, a small randomized delay
/// before each request and capped exponential backoff between retries.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retries: u32,
    jitter: bool,
}

impl HttpClient {
    pub fn new(timeout: Duration, retries: u32) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client, retries, jitter: true })
    }

    /// Skip the pre-request pause (local servers, tests).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Fetch with retries. Transport failures, 429 and 5xx are retried;
    /// any other response is returned as-is for the caller to interpret.
    pub fn fetch(&self, url: &Url, headers: &HeaderMap) -> Result<Page, FetchError> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let backoff = backoff_for(attempt);
                tracing::debug!(%url, ?backoff, attempt = attempt.saturating_add(1), total = self.retries.saturating_add(1), "retrying");
                sleep(backoff);
            }

            let retryable = match self.fetch_once(url, headers) {
                Ok(page) if page.status == 429 || page.status >= 500 => {
                    if attempt >= self.retries {
                        return Ok(page);
                    }
                    format!("HTTP status {}", page.status)
                }
                Ok(page) => return Ok(page),
                Err(e) => {
                    if attempt >= self.retries {
                        return Err(e);
                    }
                    e.to_string()
                }
            };
            tracing::warn!(%url, attempt = attempt + 1, error = %retryable, "request failed");
            attempt += 1;
        }
    }

    /// Like [`fetch`](Self::fetch) but non-2xx is an error.
    pub fn get_text(&self, url: &Url, headers: &HeaderMap) -> Result<String, FetchError> {
        let page = self.fetch(url, headers)?;
        if !page.is_success() {
            return Err(FetchError::Status { status: page.status, url: url.to_string() });
        }
        Ok(page.body)
    }

    fn fetch_once(&self, url: &Url, headers: &HeaderMap) -> Result<Page, FetchError> {
        if self.jitter {
            maybe_sleep();
        }

        let resp = self
            .client
            .get(url.as_str())
            .header(USER_AGENT, pick_user_agent())
            .header(ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(CONNECTION, "keep-alive")
            .headers(headers.clone())
            .send()?;

        let status = resp.status().as_u16();
        let body = resp.text()?;
        Ok(Page { status, body })
    }
}

// 1s, 2s, 4s, ... capped; large attempt counts saturate at the cap.
fn backoff_for(attempt: u32) -> Duration {
    2_u64
        .checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| factor.checked_mul(1000))
        .map_or(MAX_BACKOFF, Duration::from_millis)
        .min(MAX_BACKOFF)
}

// Pick a random common browser user-agent string
pub fn pick_user_agent() -> &'static str {
    const AGENTS: [&str; 5] = [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Safari/605.1.15",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
    ];
    AGENTS.choose(&mut thread_rng()).copied().unwrap_or(AGENTS[0])
}

// Sleep a small randomized amount to mimic human browsing (200-600ms)
fn maybe_sleep() {
    let ms = thread_rng().gen_range(200..=600);
    sleep(Duration::from_millis(ms));
}
