//! Story page rendering.
//!
//! The page doubles as a record: the listing and view paths recover the job
//! id, title, audio path and attribution by matching the markers written
//! here (see [`super::extract`]). Change both sides together.

use std::fmt::Write as _;

use chrono::NaiveDateTime;
use quick_xml::escape::escape;

/// Everything needed to render one story page.
#[derive(Debug, Clone)]
pub struct StoryArtifact<'a> {
    pub request_id: &'a str,
    pub title: &'a str,
    pub text: &'a str,
    pub story_about: Option<&'a str>,
    pub language: &'a str,
    /// Relative to the stories directory, e.g. `audio/{id}.mp3`.
    pub audio_file: Option<&'a str>,
    pub provider: &'a str,
    pub model: &'a str,
    pub author: Option<&'a str>,
    pub created: NaiveDateTime,
}

/// Splits story text on blank lines, trimming each paragraph and dropping
/// empty ones.
pub fn paragraphs(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

pub fn render_story(artifact: &StoryArtifact<'_>) -> String {
    let title = escape(artifact.title);
    let mut html = String::with_capacity(artifact.text.len() + 2048);

    // writes into a String cannot fail
    let _ = writeln!(html, "<!DOCTYPE html>");
    let _ = writeln!(html, "<html lang=\"{}\">", escape(artifact.language));
    let _ = writeln!(html, "<head>");
    let _ = writeln!(html, "<meta charset=\"UTF-8\">");
    let _ = writeln!(
        html,
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">"
    );
    let _ = writeln!(
        html,
        "<meta name=\"story-request-id\" content=\"{}\">",
        escape(artifact.request_id)
    );
    let _ = writeln!(html, "<title>{}</title>", title);
    let _ = writeln!(html, "<style>{}</style>", STYLE);
    let _ = writeln!(html, "</head>");
    let _ = writeln!(html, "<body>");
    let _ = writeln!(html, "<div class=\"container\">");
    let _ = writeln!(html, "<h1 class=\"story-title\">{}</h1>", title);

    if let Some(about) = artifact.story_about.filter(|a| !a.trim().is_empty()) {
        let _ = writeln!(html, "<p class=\"story-about\">{}</p>", escape(about.trim()));
    }

    if let Some(audio) = artifact.audio_file {
        let _ = writeln!(html, "<div class=\"audio-player\">");
        let _ = writeln!(html, "<audio controls>");
        let _ = writeln!(
            html,
            "<source src=\"/{}\" type=\"audio/mpeg\">",
            escape(audio)
        );
        let _ = writeln!(html, "</audio>");
        let _ = writeln!(html, "</div>");
    }

    let _ = writeln!(html, "<div class=\"story-content\">");
    for paragraph in paragraphs(artifact.text) {
        let _ = writeln!(html, "<p>{}</p>", escape(&paragraph));
    }
    let _ = writeln!(html, "</div>");

    let _ = writeln!(html, "<div class=\"footer\">");
    if let Some(author) = artifact.author.filter(|a| !a.is_empty()) {
        let _ = writeln!(
            html,
            "<p class=\"author\">Requested by <span class=\"author-name\">{}</span></p>",
            escape(author)
        );
    }
    let _ = writeln!(
        html,
        "<div class=\"ai-info\">Created by {} using {}</div>",
        escape(artifact.provider),
        escape(artifact.model)
    );
    let _ = writeln!(
        html,
        "<div class=\"date\">Created on {}</div>",
        artifact.created.format("%B %d, %Y")
    );
    let _ = writeln!(
        html,
        "<p class=\"story-id\">Story ID: {}</p>",
        escape(artifact.request_id)
    );
    let _ = writeln!(html, "</div>");
    let _ = writeln!(html, "</div>");
    let _ = writeln!(html, "</body>");
    let _ = writeln!(html, "</html>");
    html
}

/// `{slug}_{YYYYmmddHHMMSS}` without extension.
pub fn artifact_stem(title: &str, now: NaiveDateTime) -> String {
    format!("{}_{}", slugify(title), now.format("%Y%m%d%H%M%S"))
}

/// Lowercases, turns whitespace into `-` and drops anything that is not
/// alphanumeric, `-` or `_`. Never returns an empty string.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() || c == '_' {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "story".to_string()
    } else {
        slug.to_string()
    }
}

const STYLE: &str = "body{font-family:Georgia,serif;background:#fdf8ef;color:#333;margin:0}\
.container{max-width:760px;margin:0 auto;padding:2rem}\
h1{text-align:center;color:#5a3e8a}\
.story-about{font-style:italic;text-align:center}\
.story-content p{font-size:1.2rem;line-height:1.7}\
.audio-player{margin:1.5rem 0;text-align:center}\
.footer{margin-top:3rem;font-size:.85rem;color:#777;text-align:center}";

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn created() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 7)
            .unwrap()
            .and_hms_opt(18, 5, 9)
            .unwrap()
    }

    fn artifact<'a>(text: &'a str, audio: Option<&'a str>) -> StoryArtifact<'a> {
        StoryArtifact {
            request_id: "6f1c0c4e-8d7e-4b1a-9a57-0d6d1f0b9a11",
            title: "Luna & the Comet",
            text,
            story_about: Some("a fox who wants to touch a comet"),
            language: "en",
            audio_file: audio,
            provider: "openai",
            model: "gpt-4o-mini",
            author: Some("Maria"),
            created: created(),
        }
    }

    #[test]
    fn test_paragraphs_split_on_blank_lines() {
        let parts = paragraphs("One.\n\n\nTwo\nstill two.\r\n\r\n  \n\nThree.");
        assert_eq!(parts, vec!["One.", "Two\nstill two.", "Three."]);
    }

    #[test]
    fn test_render_contains_markers() {
        let html = render_story(&artifact(
            "Once upon a time.\n\nThe end.",
            Some("audio/6f1c0c4e-8d7e-4b1a-9a57-0d6d1f0b9a11.mp3"),
        ));

        assert!(html.contains("<title>Luna &amp; the Comet</title>"));
        assert!(html.contains("<p>Once upon a time.</p>\n<p>The end.</p>"));
        assert!(html.contains(
            "<source src=\"/audio/6f1c0c4e-8d7e-4b1a-9a57-0d6d1f0b9a11.mp3\" type=\"audio/mpeg\">"
        ));
        assert!(html.contains("<div class=\"ai-info\">Created by openai using gpt-4o-mini</div>"));
        assert!(html.contains("<div class=\"date\">Created on March 07, 2026</div>"));
        assert!(html.contains("Story ID: 6f1c0c4e-8d7e-4b1a-9a57-0d6d1f0b9a11"));
    }

    #[test]
    fn test_render_without_audio_has_no_player() {
        let html = render_story(&artifact("Text.", None));
        assert!(!html.contains("<audio"));
        assert!(!html.contains("type=\"audio/mpeg\""));
    }

    #[test]
    fn test_story_text_is_escaped() {
        let html = render_story(&artifact("<script>alert(1)</script>", None));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_artifact_stem() {
        assert_eq!(
            artifact_stem("Luna and the Comet", created()),
            "luna-and-the-comet_20260307180509"
        );
    }

    #[test]
    fn test_slugify_edge_cases() {
        assert_eq!(slugify("  A   História da Lua!  "), "a-história-da-lua");
        assert_eq!(slugify("../../etc/passwd"), "etcpasswd");
        assert_eq!(slugify("???"), "story");
        assert_eq!(slugify("snake_case stays"), "snake_case-stays");
    }
}
