//! Feed emitter: RSS 2.0 or Atom 1.0 documents written with quick-xml.

use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::FeedError;
use crate::normalize::NormalizedPost;
use crate::source::ProfileInfo;

const GENERATOR: &str = concat!("ig2rss ", env!("CARGO_PKG_VERSION"));
const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FeedFormat {
    #[default]
    Rss,
    Atom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMeta {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
}

impl FeedMeta {
    pub fn for_account(account: &str, profile: &ProfileInfo) -> Self {
        Self {
            title: format!("{} (@{account}) - Instagram", profile.display_name(account)),
            link: format!("https://www.instagram.com/{account}/"),
            description: profile.description(account),
            language: "en".to_string(),
        }
    }
}

fn xml_err(e: impl Display) -> FeedError {
    FeedError::Xml(e.to_string())
}

fn emit<W: Write>(w: &mut Writer<W>, event: Event<'_>) -> Result<(), FeedError> {
    w.write_event(event).map_err(xml_err)
}

fn write_text_element<W: Write>(w: &mut Writer<W>, name: &str, text: &str) -> Result<(), FeedError> {
    emit(w, Event::Start(BytesStart::new(name)))?;
    let s = sanitize_text(text);
    emit(w, Event::Text(BytesText::new(&s)))?;
    emit(w, Event::End(BytesEnd::new(name)))
}

// Remove Cc control characters except tab, LF and CR; they are invalid in XML.
fn sanitize_text(input: &str) -> String {
    input
        .chars()
        .filter(|&c| {
            let code = c as u32;
            code == 0x09 || code == 0x0A || code == 0x0D || code >= 0x20
        })
        .collect()
}

/// Render the document; `generated_at` stamps the channel.
pub fn render(meta: &FeedMeta, posts: &[NormalizedPost], format: FeedFormat, generated_at: DateTime<Utc>) -> Result<Vec<u8>, FeedError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    match format {
        FeedFormat::Rss => write_rss(&mut writer, meta, posts, generated_at)?,
        FeedFormat::Atom => write_atom(&mut writer, meta, posts, generated_at)?,
    }
    let mut out = writer.into_inner();
    out.push(b'\n');
    Ok(out)
}

fn write_rss<W: Write>(w: &mut Writer<W>, meta: &FeedMeta, posts: &[NormalizedPost], generated_at: DateTime<Utc>) -> Result<(), FeedError> {
    let mut rss_start = BytesStart::new("rss");
    rss_start.push_attribute(("version", "2.0"));
    emit(w, Event::Start(rss_start))?;
    emit(w, Event::Start(BytesStart::new("channel")))?;
    write_text_element(w, "title", &meta.title)?;
    write_text_element(w, "link", &meta.link)?;
    write_text_element(w, "description", &meta.description)?;
    write_text_element(w, "language", &meta.language)?;
    write_text_element(w, "lastBuildDate", &generated_at.to_rfc2822())?;
    write_text_element(w, "generator", GENERATOR)?;

    for post in posts {
        emit(w, Event::Start(BytesStart::new("item")))?;
        write_text_element(w, "title", &post.title)?;
        if !post.permalink.is_empty() {
            write_text_element(w, "link", &post.permalink)?;
        }
        if !post.id.is_empty() {
            let mut guid = BytesStart::new("guid");
            let is_permalink = if post.id == post.permalink { "true" } else { "false" };
            guid.push_attribute(("isPermaLink", is_permalink));
            emit(w, Event::Start(guid))?;
            emit(w, Event::Text(BytesText::new(&sanitize_text(&post.id))))?;
            emit(w, Event::End(BytesEnd::new("guid")))?;
        }
        write_text_element(w, "description", &post.description_html)?;
        write_text_element(w, "pubDate", &post.published_at.to_rfc2822())?;
        // include image as enclosure when available
        if let Some(img) = &post.image_url {
            let mut enc = BytesStart::new("enclosure");
            enc.push_attribute(("url", img.as_str()));
            emit(w, Event::Empty(enc))?;
        }
        emit(w, Event::End(BytesEnd::new("item")))?;
    }

    emit(w, Event::End(BytesEnd::new("channel")))?;
    emit(w, Event::End(BytesEnd::new("rss")))
}

fn write_atom_link<W: Write>(w: &mut Writer<W>, href: &str) -> Result<(), FeedError> {
    let mut link = BytesStart::new("link");
    link.push_attribute(("rel", "alternate"));
    link.push_attribute(("href", href));
    emit(w, Event::Empty(link))
}

fn write_atom<W: Write>(w: &mut Writer<W>, meta: &FeedMeta, posts: &[NormalizedPost], generated_at: DateTime<Utc>) -> Result<(), FeedError> {
    let mut feed_start = BytesStart::new("feed");
    feed_start.push_attribute(("xmlns", ATOM_NS));
    feed_start.push_attribute(("xml:lang", meta.language.as_str()));
    emit(w, Event::Start(feed_start))?;
    write_text_element(w, "id", &meta.link)?;
    write_text_element(w, "title", &meta.title)?;
    write_text_element(w, "subtitle", &meta.description)?;
    write_atom_link(w, &meta.link)?;
    write_text_element(w, "updated", &rfc3339(generated_at))?;
    write_text_element(w, "generator", GENERATOR)?;

    for (index, post) in posts.iter().enumerate() {
        emit(w, Event::Start(BytesStart::new("entry")))?;
        // Atom requires an id; posts without one get a position-based fallback under the feed link.
        let id = if post.id.is_empty() { format!("{}#{index}", meta.link) } else { post.id.clone() };
        write_text_element(w, "id", &id)?;
        write_text_element(w, "title", &post.title)?;
        if !post.permalink.is_empty() {
            write_atom_link(w, &post.permalink)?;
        }
        write_text_element(w, "published", &rfc3339(post.published_at))?;
        write_text_element(w, "updated", &rfc3339(post.published_at))?;
        let mut content = BytesStart::new("content");
        content.push_attribute(("type", "html"));
        emit(w, Event::Start(content))?;
        emit(w, Event::Text(BytesText::new(&sanitize_text(&post.description_html))))?;
        emit(w, Event::End(BytesEnd::new("content")))?;
        emit(w, Event::End(BytesEnd::new("entry")))?;
    }

    emit(w, Event::End(BytesEnd::new("feed")))
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `{dir}/{account}.xml`; characters outside `[A-Za-z0-9._-]` become `_`.
pub fn feed_path(dir: &Path, account: &str) -> PathBuf {
    let safe: String = account
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    if safe != account {
        tracing::warn!(account, file = %safe, "account name sanitized for feed file");
    }
    dir.join(format!("{safe}.xml"))
}

/// Write through a temp file in `dir` so a failure never leaves a partial feed.
pub fn write_feed(dir: &Path, account: &str, document: &[u8]) -> Result<PathBuf, FeedError> {
    fs::create_dir_all(dir)?;
    let path = feed_path(dir, account);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(document)?;
    tmp.flush()?;
    tmp.persist(&path)
        .map_err(|e| FeedError::Persist { path: path.clone(), source: e.error })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn when() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn posts() -> Vec<NormalizedPost> {
        vec![
            NormalizedPost {
                permalink: "https://www.instagram.com/p/AAA/".into(),
                id: "https://www.instagram.com/p/AAA/".into(),
                title: "Hello & welcome".into(),
                description_html: r#"<img src="https://cdn/a.jpg" alt="Instagram post"/><br/><br/>Hello &amp; welcome"#.into(),
                image_url: Some("https://cdn/a.jpg".into()),
                published_at: when(),
            },
            NormalizedPost {
                permalink: String::new(),
                id: "42".into(),
                title: "Post by @acme\u{0007}".into(),
                description_html: String::new(),
                image_url: None,
                published_at: when(),
            },
        ]
    }

    fn meta() -> FeedMeta {
        FeedMeta::for_account("acme", &ProfileInfo { full_name: Some("Acme Co".into()), biography: None })
    }

    #[test]
    fn channel_metadata() {
        let m = meta();
        assert_eq!(m.title, "Acme Co (@acme) - Instagram");
        assert_eq!(m.link, "https://www.instagram.com/acme/");
        assert_eq!(m.description, "Instagram posts from @acme");
        assert_eq!(m.language, "en");
    }

    #[test]
    fn rss_document() {
        let xml = String::from_utf8(render(&meta(), &posts(), FeedFormat::Rss, when()).unwrap()).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
        assert!(xml.contains(r#"<rss version="2.0">"#));
        assert!(xml.contains("<title>Acme Co (@acme) - Instagram</title>"));
        assert!(xml.contains("<language>en</language>"));
        assert!(xml.contains("<title>Hello &amp; welcome</title>"));
        assert!(xml.contains(r#"<guid isPermaLink="true">https://www.instagram.com/p/AAA/</guid>"#));
        assert!(xml.contains(r#"<guid isPermaLink="false">42</guid>"#));
        assert!(xml.contains("&lt;img src="));
        assert!(xml.contains("Hello &amp;amp; welcome"));
        assert!(xml.contains("<pubDate>Fri, 10 May 2024 12:00:00 +0000</pubDate>"));
        assert!(xml.contains(r#"<enclosure url="https://cdn/a.jpg"/>"#));
        assert_eq!(xml.matches("<item>").count(), 2);
        assert_eq!(xml.matches("<link>").count(), 2);
        assert!(!xml.contains('\u{0007}'));
    }

    #[test]
    fn atom_document() {
        let xml = String::from_utf8(render(&meta(), &posts(), FeedFormat::Atom, when()).unwrap()).unwrap();
        assert!(xml.contains(r#"<feed xmlns="http://www.w3.org/2005/Atom" xml:lang="en">"#));
        assert!(xml.contains("<updated>2024-05-10T12:00:00Z</updated>"));
        assert!(xml.contains(r#"<content type="html">"#));
        assert!(xml.contains("<id>42</id>"));
        assert_eq!(xml.matches("<entry>").count(), 2);
    }

    #[test]
    fn atom_entry_without_id_gets_fallback() {
        let mut p = posts();
        p[1].id.clear();
        let xml = String::from_utf8(render(&meta(), &p, FeedFormat::Atom, when()).unwrap()).unwrap();
        assert!(xml.contains("<id>https://www.instagram.com/acme/#1</id>"));
    }

    #[test]
    fn writes_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("feeds");
        let path = write_feed(&out, "acme", b"<rss/>").unwrap();
        assert_eq!(path, out.join("acme.xml"));
        assert_eq!(fs::read(&path).unwrap(), b"<rss/>");
        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
    }

    #[test]
    fn feed_path_is_sanitized() {
        assert_eq!(feed_path(Path::new("f"), "a.b_c"), Path::new("f").join("a.b_c.xml"));
        assert_eq!(feed_path(Path::new("f"), "../x"), Path::new("f").join(".._x.xml"));
    }
}
