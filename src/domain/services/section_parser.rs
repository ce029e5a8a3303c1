use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::domain::entities::ParsedContent;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Generator output contained no section markers")]
    NoSections,
    #[error("Missing required section: {0}")]
    MissingSection(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    MetaTitle,
    MetaDescription,
    Content,
    Faq,
    Schema,
}

impl Section {
    fn label(&self) -> &'static str {
        match self {
            Section::MetaTitle => "META_TITLE",
            Section::MetaDescription => "META_DESCRIPTION",
            Section::Content => "CONTENT",
            Section::Faq => "FAQ",
            Section::Schema => "SCHEMA",
        }
    }

    fn from_marker(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        match normalized.as_str() {
            "METATITLE" => Some(Section::MetaTitle),
            "METADESCRIPTION" => Some(Section::MetaDescription),
            "CONTENT" | "BODY" => Some(Section::Content),
            "FAQ" => Some(Section::Faq),
            "SCHEMA" => Some(Section::Schema),
            _ => None,
        }
    }
}

/// Marker lines look like `META_TITLE: ...`, optionally wrapped in markdown
/// bold or prefixed with a heading, e.g. `## **CONTENT:**`.
fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^[ \t]*(?:#{1,6}[ \t]*)?(?:\*\*)?[ \t]*(META[ _-]?TITLE|META[ _-]?DESCRIPTION|CONTENT|BODY|FAQ|SCHEMA)[ \t]*(?:\*\*)?[ \t]*:[ \t]*(?:\*\*)?",
        )
        .expect("section marker regex is valid")
    })
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^```[a-zA-Z]*\s*\n?(.*?)\n?```\s*$").expect("fence regex is valid")
    })
}

/// Split generator output into its labelled sections.
///
/// Only the first occurrence of each label counts; later repeats are treated
/// as body text. Meta title, meta description and content are required; FAQ
/// and schema default to empty strings.
pub fn parse(raw: &str) -> Result<ParsedContent, ParseError> {
    let mut markers: Vec<(Section, usize, usize)> = Vec::new();
    for caps in marker_regex().captures_iter(raw) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(section) = Section::from_marker(name.as_str()) else {
            continue;
        };
        if markers.iter().any(|(s, _, _)| *s == section) {
            continue;
        }
        markers.push((section, whole.start(), whole.end()));
    }

    if markers.is_empty() {
        return Err(ParseError::NoSections);
    }
    markers.sort_by_key(|(_, start, _)| *start);

    let mut content = ParsedContent::default();
    for (i, (section, _, body_start)) in markers.iter().enumerate() {
        let body_end = markers
            .get(i + 1)
            .map(|(_, next_start, _)| *next_start)
            .unwrap_or(raw.len());
        let body = raw[*body_start..body_end].trim();
        match section {
            Section::MetaTitle => content.meta_title = clean_single_line(body),
            Section::MetaDescription => content.meta_description = clean_inline(body),
            Section::Content => content.content_markdown = body.to_string(),
            Section::Faq => content.faq_raw = body.to_string(),
            Section::Schema => content.schema_json = unwrap_code_fence(body),
        }
    }

    for (section, value) in [
        (Section::MetaTitle, &content.meta_title),
        (Section::MetaDescription, &content.meta_description),
        (Section::Content, &content.content_markdown),
    ] {
        if value.is_empty() {
            return Err(ParseError::MissingSection(section.label()));
        }
    }

    if !content.schema_json.is_empty()
        && serde_json::from_str::<serde_json::Value>(&content.schema_json).is_err()
    {
        tracing::warn!("SCHEMA section is not valid JSON; keeping raw text");
    }

    Ok(content)
}

/// Number of whitespace-separated words in the article body, falling back to
/// the whole text when it carries no body marker.
pub fn body_word_count(raw: &str) -> usize {
    match parse(raw) {
        Ok(parsed) => count_words(&parsed.content_markdown),
        Err(_) => count_words(raw),
    }
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_alphanumeric()))
        .count()
}

fn strip_quotes(s: &str) -> &str {
    s.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '“' || c == '”')
        .trim()
}

fn clean_single_line(body: &str) -> String {
    body.lines()
        .map(strip_quotes)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn clean_inline(body: &str) -> String {
    let joined = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    strip_quotes(&joined).to_string()
}

fn unwrap_code_fence(body: &str) -> String {
    match fence_regex().captures(body).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim().to_string(),
        None => body.to_string(),
    }
}
