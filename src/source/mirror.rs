//! Scrapes a public Instagram mirror (imginn layout): one `.item` block per post.

use once_cell::sync::Lazy;
use reqwest::header::HeaderMap;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use url::Url;

use super::{AccountPage, PostSource, ProfileInfo};
use crate::accounts;
use crate::error::FetchError;
use crate::http::HttpClient;
use crate::record::RawPostRecord;

pub const DEFAULT_MIRROR_URL: &str = "https://imginn.com";

static SEL_ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse(".item").unwrap());
static SEL_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static SEL_IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
static SEL_TIME: Lazy<Selector> = Lazy::new(|| Selector::parse(".time, time").unwrap());
static SEL_OG_IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).unwrap());
static SEL_NAME: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static SEL_BIO: Lazy<Selector> = Lazy::new(|| Selector::parse(".bio").unwrap());

pub struct MirrorPostSource {
    http: HttpClient,
    base: Url,
}

impl MirrorPostSource {
    pub fn new(http: HttpClient, base: &str) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http, base })
    }

    fn account_url(&self, account: &str) -> Result<Url, FetchError> {
        if !accounts::is_valid_name(account) {
            return Err(FetchError::PageStructure(format!("invalid account name {account:?}")));
        }
        self.base
            .join(&format!("{account}/"))
            .map_err(|e| FetchError::PageStructure(format!("bad account url for {account}: {e}")))
    }
}

impl PostSource for MirrorPostSource {
    fn name(&self) -> &'static str {
        "mirror"
    }

    fn fetch(&mut self, account: &str, limit: usize) -> Result<AccountPage, FetchError> {
        let url = self.account_url(account)?;
        let body = self.http.get_text(&url, &HeaderMap::new())?;
        let document = Html::parse_document(&body);
        parse_account_page(&document, &url, limit)
    }

    fn close(&mut self) {
        tracing::debug!(base = %self.base, "mirror session closed");
    }
}

/// Extract the profile and up to `limit` records from an account page.
pub fn parse_account_page(document: &Html, page_url: &Url, limit: usize) -> Result<AccountPage, FetchError> {
    let items: Vec<ElementRef<'_>> = document.select(&SEL_ITEM).collect();
    if items.is_empty() {
        return Err(FetchError::PageStructure("no post items found".into()));
    }

    let og_image = document
        .select(&SEL_OG_IMAGE)
        .next()
        .and_then(|m| m.value().attr("content"))
        .and_then(|c| absolute(page_url, c));

    let records = items
        .into_iter()
        .filter_map(|item| {
            let record = parse_item(item, page_url, og_image.as_deref());
            if record.is_none() {
                tracing::warn!(page = %page_url, "skipping item without a post link");
            }
            record
        })
        .take(limit)
        .collect();

    Ok(AccountPage { profile: parse_profile(document), records })
}

fn parse_item(item: ElementRef<'_>, page_url: &Url, og_image: Option<&str>) -> Option<RawPostRecord> {
    let href = item.select(&SEL_LINK).next()?.value().attr("href")?;
    let link = page_url.join(href).ok()?;
    let code = link.path_segments()?.filter(|s| !s.is_empty()).last()?.to_string();

    let mut record = RawPostRecord::new().with("code", code);

    let img = item.select(&SEL_IMG).next();
    if let Some(alt) = img.and_then(|i| i.value().attr("alt")) {
        record.set("caption", json!({ "text": alt }));
    }
    let image = img
        .and_then(|i| i.value().attr("data-src").or_else(|| i.value().attr("src")))
        .and_then(|src| absolute(page_url, src))
        .or_else(|| og_image.map(str::to_string));
    if let Some(image) = image {
        record.set("thumbnail_url", image);
    }

    if let Some(time) = item.select(&SEL_TIME).next() {
        let stamp = time
            .value()
            .attr("datetime")
            .map(str::to_string)
            .unwrap_or_else(|| text_of(time));
        if !stamp.is_empty() {
            record.set("taken_at", stamp);
        }
    }

    Some(record)
}

fn parse_profile(document: &Html) -> ProfileInfo {
    let first_text = |sel: &Selector| {
        document
            .select(sel)
            .next()
            .map(text_of)
            .filter(|s| !s.is_empty())
    };
    ProfileInfo { full_name: first_text(&SEL_NAME), biography: first_text(&SEL_BIO) }
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

// Resolve src/content attributes; lazy-loading placeholders (data: URIs) are ignored.
fn absolute(base: &Url, s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() || s.starts_with("data:") {
        return None;
    }
    base.join(s).ok().map(String::from)
}
