//! Instagram web profile endpoint, authenticated with a persisted session id.
//!
//! The endpoint's user payload has drifted from what strict decoding expects
//! (missing `pinned_channels_info`, `bio_links` entries without `link_id`).
//! [`patch_user_payload`] repairs those before decoding, so callers only see
//! the plain fetch contract.

use std::fs;
use std::path::Path;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, COOKIE, REFERER, USER_AGENT};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value as JsonValue};
use url::Url;

use super::{AccountPage, PostSource, ProfileInfo};
use crate::error::{ConfigError, FetchError};
use crate::http::HttpClient;
use crate::record::RawPostRecord;

pub const DEFAULT_API_URL: &str = "https://www.instagram.com";

const WEB_APP_ID: &str = "936619743392459";
const ASBD_ID: &str = "129477";
const WEB_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.6261.112 Safari/537.36";
const CHALLENGE_MESSAGES: [&str; 3] = ["challenge_required", "checkpoint_required", "login_required"];

#[derive(Debug, Deserialize)]
struct UserPayload {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    biography: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    bio_links: Vec<BioLink>,
    #[serde(default, deserialize_with = "null_as_default")]
    broadcast_channel: Vec<JsonValue>,
    #[serde(default, deserialize_with = "null_as_default")]
    edge_owner_to_timeline_media: Edges,
}

#[derive(Debug, Deserialize)]
struct BioLink {
    #[allow(dead_code)]
    link_id: JsonValue,
    #[serde(default)]
    url: Option<String>,
}

// Edges stay untyped: an edge without a usable `node` is skipped, not fatal.
#[derive(Debug, Default, Deserialize)]
struct Edges {
    #[serde(default, deserialize_with = "null_as_default")]
    edges: Vec<JsonValue>,
}

// `null` reads as the field's default, same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub struct ApiPostSource {
    http: HttpClient,
    base: Url,
    headers: HeaderMap,
}

impl ApiPostSource {
    pub fn new(http: HttpClient, base: &str, session_id: &str) -> Result<Self, ConfigError> {
        let base = Url::parse(base)
            .map_err(|e| ConfigError::InvalidValue { name: "api-url", message: e.to_string() })?;
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(ConfigError::MissingCredential("INSTAGRAM_SESSION_ID or INSTAGRAM_SESSION_FILE"));
        }
        let headers = web_headers(&base, session_id)?;
        tracing::info!(base = %base, "api session ready");
        Ok(Self { http, base, headers })
    }

    fn profile_url(&self, account: &str) -> Result<Url, FetchError> {
        let mut url = self
            .base
            .join("/api/v1/users/web_profile_info/")
            .map_err(|e| FetchError::PageStructure(format!("bad api url: {e}")))?;
        url.query_pairs_mut().append_pair("username", &account.to_lowercase());
        Ok(url)
    }
}

impl PostSource for ApiPostSource {
    fn name(&self) -> &'static str {
        "api"
    }

    fn fetch(&mut self, account: &str, limit: usize) -> Result<AccountPage, FetchError> {
        let url = self.profile_url(account)?;
        let page = self.http.fetch(&url, &self.headers)?;

        if page.status == 401 {
            return Err(FetchError::AuthChallenge("login_required (HTTP 401)".into()));
        }
        let payload: Option<JsonValue> = serde_json::from_str(&page.body).ok();
        if let Some(message) = payload.as_ref().and_then(challenge_message) {
            return Err(FetchError::AuthChallenge(message));
        }
        if !page.is_success() {
            return Err(FetchError::Status { status: page.status, url: url.to_string() });
        }

        let payload = match payload {
            Some(p) => p,
            None => serde_json::from_str(&page.body)?,
        };
        parse_profile_payload(payload, limit)
    }

    fn close(&mut self) {
        // The persisted session stays valid for the next run; only the handle is dropped.
        tracing::info!(base = %self.base, "api session released");
    }
}

fn web_headers(base: &Url, session_id: &str) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    let fixed: [(&'static str, &'static str); 6] = [
        ("x-ig-app-id", WEB_APP_ID),
        ("x-asbd-id", ASBD_ID),
        ("x-requested-with", "XMLHttpRequest"),
        ("sec-fetch-site", "same-origin"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-dest", "empty"),
    ];
    for (name, value) in fixed {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers.insert(USER_AGENT, HeaderValue::from_static(WEB_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

    let referer = HeaderValue::from_str(base.as_str())
        .map_err(|e| ConfigError::InvalidValue { name: "api-url", message: e.to_string() })?;
    headers.insert(REFERER, referer);

    let cookie = HeaderValue::from_str(&format!("sessionid={session_id}"))
        .map_err(|e| ConfigError::InvalidValue { name: "INSTAGRAM_SESSION_ID", message: e.to_string() })?;
    headers.insert(COOKIE, cookie);
    Ok(headers)
}

/// Read the session id out of a persisted session file
/// (`authorization_data.sessionid` or `cookies.sessionid`).
pub fn load_session_file(path: &Path) -> Result<String, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let settings: JsonValue =
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    ["/authorization_data/sessionid", "/cookies/sessionid"]
        .iter()
        .find_map(|ptr| settings.pointer(ptr).and_then(JsonValue::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::MissingCredential("sessionid in session file"))
}

fn challenge_message(payload: &JsonValue) -> Option<String> {
    if let Some(msg) = payload.get("message").and_then(JsonValue::as_str) {
        if CHALLENGE_MESSAGES.contains(&msg) {
            return Some(msg.to_string());
        }
    }
    if payload.get("require_login").and_then(JsonValue::as_bool) == Some(true) {
        return Some("login_required".into());
    }
    None
}

/// Repair known drift in the user payload so it decodes.
pub fn patch_user_payload(user: &mut JsonValue) {
    let Some(obj) = user.as_object_mut() else { return };

    let channels = obj
        .get("pinned_channels_info")
        .and_then(|info| info.get("pinned_channels_list"))
        .and_then(JsonValue::as_array)
        .cloned()
        .unwrap_or_default();
    obj.insert("broadcast_channel".into(), JsonValue::Array(channels));

    if let Some(JsonValue::Array(links)) = obj.get_mut("bio_links") {
        links.retain(|link| link.get("link_id").is_some());
    }
}

/// Decode `data.user` and adapt up to `limit` timeline nodes.
pub fn parse_profile_payload(mut payload: JsonValue, limit: usize) -> Result<AccountPage, FetchError> {
    let mut user = payload
        .pointer_mut("/data/user")
        .map(JsonValue::take)
        .filter(JsonValue::is_object)
        .ok_or_else(|| FetchError::PageStructure("payload has no data.user".into()))?;
    patch_user_payload(&mut user);
    let user: UserPayload = serde_json::from_value(user)?;

    tracing::debug!(
        bio_links = user.bio_links.len(),
        first_link = user.bio_links.iter().find_map(|l| l.url.as_deref()).unwrap_or(""),
        broadcast_channels = user.broadcast_channel.len(),
        "decoded profile"
    );

    let records = user
        .edge_owner_to_timeline_media
        .edges
        .iter()
        .filter_map(|edge| {
            let record = edge.get("node").and_then(adapt_node);
            if record.is_none() {
                tracing::warn!("skipping timeline edge without an object node");
            }
            record
        })
        .take(limit)
        .collect();

    Ok(AccountPage {
        profile: ProfileInfo { full_name: user.full_name, biography: user.biography },
        records,
    })
}

// `display_resources` (largest first) as an `image_versions2` object.
fn versions_from(resources: Option<&JsonValue>) -> Option<JsonValue> {
    let mut list: Vec<&JsonValue> = resources?.as_array()?.iter().filter(|r| r.get("src").is_some()).collect();
    if list.is_empty() {
        return None;
    }
    list.sort_by_key(|r| std::cmp::Reverse(r.get("config_width").and_then(JsonValue::as_u64).unwrap_or(0)));
    let candidates: Vec<JsonValue> = list
        .into_iter()
        .map(|r| json!({ "url": r["src"], "width": r.get("config_width"), "height": r.get("config_height") }))
        .collect();
    Some(json!({ "candidates": candidates }))
}

/// Map a timeline node onto the record keys the normalizer reads.
fn adapt_node(node: &JsonValue) -> Option<RawPostRecord> {
    if !node.is_object() {
        return None;
    }
    let mut record = RawPostRecord::new();

    let copies = [
        ("shortcode", "code"),
        ("id", "pk"),
        ("thumbnail_src", "thumbnail_url"),
        ("display_url", "display_url"),
        ("taken_at_timestamp", "taken_at"),
    ];
    for (from, to) in copies {
        if let Some(v) = node.get(from).filter(|v| !v.is_null()) {
            record.set(to, v.clone());
        }
    }

    if let Some(text) = node.pointer("/edge_media_to_caption/edges/0/node/text") {
        record.set("caption", json!({ "text": text }));
    }
    if let Some(versions) = versions_from(node.get("display_resources")) {
        record.set("image_versions2", versions);
    }
    if let Some(children) = node.pointer("/edge_sidecar_to_children/edges").and_then(JsonValue::as_array) {
        let carousel: Vec<JsonValue> = children
            .iter()
            .filter_map(|child| child.get("node"))
            .map(|child| {
                let versions = versions_from(child.get("display_resources")).or_else(|| {
                    child.get("display_url").map(|url| json!({ "candidates": [{ "url": url }] }))
                });
                match versions {
                    Some(v) => json!({ "image_versions2": v }),
                    None => json!({}),
                }
            })
            .collect();
        record.set("carousel_media", carousel);
    }

    Some(record)
}
