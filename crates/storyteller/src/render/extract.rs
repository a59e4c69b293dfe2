//! Recovers story metadata from a rendered page.
//!
//! Older pages predate the `story-request-id` meta tag, so the id falls back
//! to the audio source path and then to the visible "Story ID" line.

use std::borrow::Cow;
use std::sync::LazyLock;

use chrono::NaiveDate;
use quick_xml::escape::unescape;
use regex::Regex;
use serde::Serialize;

static RE_TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<title>(.*?)</title>").unwrap());
static RE_META_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta name="story-request-id" content="([A-Za-z0-9-]+)">"#).unwrap()
});
static RE_CONTENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<div class="story-content">(.*?)</div>"#).unwrap());
static RE_PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<p>(.*?)</p>").unwrap());
static RE_ABOUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<p class="story-about">(.*?)</p>"#).unwrap());
static RE_AUDIO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<source src="/(.*?)" type="audio/mpeg">"#).unwrap());
static RE_AUDIO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"audio/([a-f0-9-]+)\.mp3").unwrap());
static RE_ATTRIBUTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Created by (.*?) using (.*?)</div>").unwrap());
static RE_AUTHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<span class="author-name">(.*?)</span>"#).unwrap());
static RE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<div class="date">Created on (.*?)</div>"#).unwrap());
static RE_STORY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Story ID: ([A-Za-z0-9-]+)").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtifactMetadata {
    pub request_id: Option<String>,
    pub title: Option<String>,
    /// Paragraphs joined by blank lines.
    pub story: Option<String>,
    pub story_about: Option<String>,
    pub audio_file: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub author: Option<String>,
    pub created: Option<NaiveDate>,
}

fn capture<'h>(re: &Regex, html: &'h str) -> Option<&'h str> {
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn text(raw: &str) -> String {
    unescape(raw)
        .unwrap_or(Cow::Borrowed(raw))
        .trim()
        .to_string()
}

pub fn extract_metadata(html: &str) -> ArtifactMetadata {
    let audio_file = capture(&RE_AUDIO, html).map(text);

    let request_id = capture(&RE_META_ID, html)
        .map(String::from)
        .or_else(|| {
            audio_file
                .as_deref()
                .and_then(|a| capture(&RE_AUDIO_ID, a))
                .map(String::from)
        })
        .or_else(|| capture(&RE_STORY_ID, html).map(String::from));

    let story = capture(&RE_CONTENT, html).map(|body| {
        let paragraphs: Vec<String> = RE_PARAGRAPH
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| text(m.as_str()))
            .collect();
        if paragraphs.is_empty() {
            text(body)
        } else {
            paragraphs.join("\n\n")
        }
    });

    let (provider, model) = match RE_ATTRIBUTION.captures(html) {
        Some(c) => (
            c.get(1).map(|m| text(m.as_str())),
            c.get(2).map(|m| text(m.as_str())),
        ),
        None => (None, None),
    };

    ArtifactMetadata {
        request_id,
        title: capture(&RE_TITLE, html).map(text),
        story,
        story_about: capture(&RE_ABOUT, html).map(text),
        audio_file,
        provider,
        model,
        author: capture(&RE_AUTHOR, html).map(text),
        created: capture(&RE_DATE, html)
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%B %d, %Y").ok()),
    }
}

/// Display title from an artifact file name:
/// `luna-and-the-comet_20260307180509.html` → `Luna And The Comet`.
pub fn title_from_filename(filename: &str) -> String {
    let stem = filename.strip_suffix(".html").unwrap_or(filename);
    let parts: Vec<&str> = stem.split('_').collect();
    let name_parts = if parts.len() > 1 {
        &parts[..parts.len() - 1]
    } else {
        &parts[..]
    };
    name_parts
        .join(" ")
        .replace('-', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
