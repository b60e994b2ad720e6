//! Record normalizer: turns a loose [`RawPostRecord`] into a [`NormalizedPost`].
//!
//! Every lookup is a fallback chain that ends in an empty value, so a record
//! missing every field still yields a usable post.

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde_json::Value as JsonValue;
use unicode_normalization::UnicodeNormalization;

use crate::error::RecordError;
use crate::record::RawPostRecord;
use crate::relative_time;

pub const TITLE_MAX_CHARS: usize = 100;
const PERMALINK_BASE: &str = "https://www.instagram.com/p/";

// Epoch magnitudes above these are read as micro/milliseconds.
const MICROS_THRESHOLD: f64 = 1e14;
const MILLIS_THRESHOLD: f64 = 1e11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPost {
    pub permalink: String,
    pub id: String,
    pub title: String,
    pub description_html: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// NFKC-fold stylized glyphs and drop control characters in captions.
    pub text_cleanup: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self { text_cleanup: true }
    }
}

/// Normalize one record for `account`. `now` is the processing time used
/// when no timestamp can be derived.
pub fn normalize(record: &RawPostRecord, account: &str, now: DateTime<Utc>, options: NormalizeOptions) -> NormalizedPost {
    let caption = resolve_caption(record, options);
    let image_url = resolve_image_url(record);
    let permalink = resolve_permalink(record);
    let id = resolve_id(record, &permalink);

    NormalizedPost {
        title: derive_title(&caption, account),
        description_html: compose_description(image_url.as_deref(), &caption),
        published_at: resolve_timestamp(record, now),
        permalink,
        id,
        image_url,
    }
}

/// Entry point for untyped input; only non-objects fail.
pub fn normalize_value(value: JsonValue, account: &str, now: DateTime<Utc>, options: NormalizeOptions) -> Result<NormalizedPost, RecordError> {
    let record = RawPostRecord::from_value(value)?;
    Ok(normalize(&record, account, now, options))
}

/// Text hygiene for captions. Idempotent: controls go before NFKC so the
/// fold never sees characters a second pass would remove.
pub fn clean_text(input: &str) -> String {
    let unified = input.replace("\r\n", "\n").replace('\r', "\n");
    let filtered: String = unified
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .collect();
    filtered.nfkc().collect::<String>().trim().to_string()
}

fn resolve_caption(record: &RawPostRecord, options: NormalizeOptions) -> String {
    // A bare string or anything else under `caption` counts as absent.
    let Some(JsonValue::Object(caption)) = record.get("caption") else {
        return String::new();
    };
    let Some(text) = caption.get("text").and_then(JsonValue::as_str) else {
        return String::new();
    };
    if options.text_cleanup {
        clean_text(text)
    } else {
        text.trim().to_string()
    }
}

// First `candidates[].url` inside an `image_versions2` object.
fn first_candidate(versions: Option<&JsonValue>) -> Option<String> {
    versions?
        .get("candidates")?
        .as_array()?
        .first()?
        .get("url")?
        .as_str()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

fn resolve_image_url(record: &RawPostRecord) -> Option<String> {
    first_candidate(record.get("image_versions2"))
        .or_else(|| {
            record
                .get("carousel_media")?
                .as_array()?
                .iter()
                .find_map(|item| first_candidate(item.get("image_versions2")))
        })
        .or_else(|| {
            record
                .str_field("thumbnail_url")
                .or_else(|| record.str_field("display_url"))
                .map(str::to_string)
        })
}

fn shortcode(record: &RawPostRecord) -> Option<&str> {
    record.str_field("code").or_else(|| record.str_field("shortcode"))
}

fn resolve_permalink(record: &RawPostRecord) -> String {
    shortcode(record)
        .map(|code| format!("{PERMALINK_BASE}{code}/"))
        .unwrap_or_default()
}

fn resolve_id(record: &RawPostRecord, permalink: &str) -> String {
    if !permalink.is_empty() {
        return permalink.to_string();
    }
    let numeric = ["pk", "id"].iter().find_map(|key| match record.get(key) {
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    });
    numeric
        .or_else(|| shortcode(record).map(str::to_string))
        .unwrap_or_default()
}

fn derive_title(caption: &str, account: &str) -> String {
    if caption.is_empty() {
        return format!("Post by @{account}");
    }
    caption
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(TITLE_MAX_CHARS)
        .collect()
}

fn compose_description(image_url: Option<&str>, caption: &str) -> String {
    let mut html = String::new();
    if let Some(url) = image_url {
        html.push_str(&format!(
            r#"<img src="{}" alt="Instagram post"/><br/><br/>"#,
            encode_double_quoted_attribute(url)
        ));
    }
    if !caption.is_empty() {
        let escaped = encode_text(caption);
        html.push_str(&escaped.replace("\r\n", "\n").replace('\n', "<br/>"));
    }
    html
}

fn resolve_timestamp(record: &RawPostRecord, now: DateTime<Utc>) -> DateTime<Utc> {
    ["taken_at", "device_timestamp"]
        .iter()
        .find_map(|key| record.get(key).and_then(|v| timestamp_from(v, now)))
        .unwrap_or(now)
}

fn timestamp_from(value: &JsonValue, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::Number(n) => n.as_f64().and_then(epoch_to_utc),
        JsonValue::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(n) = s.parse::<f64>() {
                return epoch_to_utc(n);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            relative_time::resolve_at(s, now)
        }
        _ => None,
    }
}

fn epoch_to_utc(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() {
        return None;
    }
    let magnitude = n.abs();
    let per_second: i64 = if magnitude > MICROS_THRESHOLD {
        1_000_000
    } else if magnitude > MILLIS_THRESHOLD {
        1_000
    } else {
        1
    };
    let raw = n as i64;
    let nanos = raw.rem_euclid(per_second) * (1_000_000_000 / per_second);
    DateTime::from_timestamp(raw.div_euclid(per_second), u32::try_from(nanos).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn run(value: JsonValue) -> NormalizedPost {
        normalize_value(value, "acme", now(), NormalizeOptions::default()).unwrap()
    }

    #[test]
    fn empty_record_yields_placeholder_post() {
        let post = run(json!({}));
        assert_eq!(post.permalink, "");
        assert_eq!(post.id, "");
        assert_eq!(post.description_html, "");
        assert_eq!(post.title, "Post by @acme");
        assert_eq!(post.image_url, None);
        assert_eq!(post.published_at, now());
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(normalize_value(json!("nope"), "acme", now(), NormalizeOptions::default()).is_err());
    }

    #[test]
    fn direct_versions_beat_carousel() {
        let post = run(json!({
            "image_versions2": {"candidates": [{"url": "https://cdn/direct.jpg"}, {"url": "https://cdn/small.jpg"}]},
            "carousel_media": [{"image_versions2": {"candidates": [{"url": "https://cdn/carousel.jpg"}]}}],
            "thumbnail_url": "https://cdn/thumb.jpg"
        }));
        assert_eq!(post.image_url.as_deref(), Some("https://cdn/direct.jpg"));
    }

    #[test]
    fn carousel_used_when_no_direct_versions() {
        let post = run(json!({
            "carousel_media": [
                {"media_type": 2},
                {"image_versions2": {"candidates": [{"url": "https://cdn/second.jpg"}]}}
            ],
            "thumbnail_url": "https://cdn/thumb.jpg"
        }));
        assert_eq!(post.image_url.as_deref(), Some("https://cdn/second.jpg"));
    }

    #[test]
    fn thumbnail_then_display_url() {
        let post = run(json!({"thumbnail_url": "https://cdn/thumb.jpg", "display_url": "https://cdn/d.jpg"}));
        assert_eq!(post.image_url.as_deref(), Some("https://cdn/thumb.jpg"));
        let post = run(json!({"image_versions2": {"candidates": []}, "display_url": "https://cdn/d.jpg"}));
        assert_eq!(post.image_url.as_deref(), Some("https://cdn/d.jpg"));
    }

    #[test]
    fn caption_must_be_an_object() {
        let post = run(json!({"caption": "plain string"}));
        assert_eq!(post.title, "Post by @acme");
        let post = run(json!({"caption": {"text": "  hello\nworld  "}}));
        assert_eq!(post.title, "hello world");
        assert_eq!(post.description_html, "hello<br/>world");
    }

    #[test]
    fn clean_text_folds_stylized_glyphs() {
        // mathematical bold "Hello"
        assert_eq!(clean_text("\u{1D407}\u{1D41E}\u{1D425}\u{1D425}\u{1D428}"), "Hello");
        assert_eq!(clean_text("a\u{00A0}b\u{0007}\r\nc"), "a b\nc");
    }

    #[test]
    fn clean_text_is_idempotent() {
        let samples = [
            "",
            "  plain  ",
            "\u{1D407}\u{1D41E}\u{1D425}\u{1D425}\u{1D428} \u{FB01}",
            "e\u{0001}\u{0301}",
            "\u{2460}\r\n\u{00A0}tail\u{000B}",
            "ｆｕｌｌｗｉｄｔｈ ﾊﾝｶｸ",
            " \u{0301}x",
        ];
        for s in samples {
            let once = clean_text(s);
            assert_eq!(clean_text(&once), once, "input {s:?}");
        }
    }

    #[test]
    fn title_is_capped_without_newlines() {
        let caption = "x".repeat(250);
        let post = run(json!({"caption": {"text": caption}}));
        assert_eq!(post.title.chars().count(), TITLE_MAX_CHARS);
        assert!(!post.title.contains('\n'));

        let multiline = format!("{}\n{}", "a".repeat(60), "b".repeat(60));
        let post = run(json!({"caption": {"text": multiline}}));
        assert_eq!(post.title.chars().count(), TITLE_MAX_CHARS);
        assert!(!post.title.contains('\n'));
    }

    #[test]
    fn permalink_and_id() {
        let post = run(json!({"code": "Cx1_ab", "pk": 42}));
        assert_eq!(post.permalink, "https://www.instagram.com/p/Cx1_ab/");
        assert_eq!(post.id, post.permalink);

        let post = run(json!({"pk": 42}));
        assert_eq!(post.permalink, "");
        assert_eq!(post.id, "42");

        let post = run(json!({"id": "3141_99"}));
        assert_eq!(post.id, "3141_99");
    }

    #[test]
    fn description_escapes_caption_and_prefixes_image() {
        let post = run(json!({
            "thumbnail_url": "https://cdn/x.jpg?a=1&b=2",
            "caption": {"text": "<b>bold</b> & co\nline"}
        }));
        assert_eq!(
            post.description_html,
            r#"<img src="https://cdn/x.jpg?a=1&amp;b=2" alt="Instagram post"/><br/><br/>&lt;b&gt;bold&lt;/b&gt; &amp; co<br/>line"#
        );
    }

    #[test]
    fn timestamp_fallback_chain() {
        let post = run(json!({"taken_at": 1_700_000_000, "device_timestamp": 1}));
        assert_eq!(post.published_at, Utc.timestamp_opt(1_700_000_000, 0).unwrap());

        // device timestamps usually arrive in micro- or milliseconds
        let post = run(json!({"device_timestamp": 1_700_000_000_123_456_i64}));
        assert_eq!(post.published_at.timestamp(), 1_700_000_000);
        let post = run(json!({"device_timestamp": 1_700_000_000_123_i64}));
        assert_eq!(post.published_at.timestamp(), 1_700_000_000);

        let post = run(json!({"taken_at": "3 hours ago"}));
        assert_eq!(post.published_at, now() - Duration::hours(3));

        let post = run(json!({"taken_at": "2024-01-02T03:04:05Z"}));
        assert_eq!(post.published_at, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());

        let post = run(json!({"taken_at": "last spring"}));
        assert_eq!(post.published_at, now());
    }

    #[test]
    fn cleanup_can_be_disabled() {
        let styled = "\u{1D407}i";
        let record = RawPostRecord::new().with("caption", json!({"text": styled}));
        let post = normalize(&record, "acme", now(), NormalizeOptions { text_cleanup: false });
        assert_eq!(post.title, styled);
    }
}
