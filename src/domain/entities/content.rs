use serde::Serialize;

/// Sections extracted from a generator response.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct ParsedContent {
    pub meta_title: String,
    pub meta_description: String,
    pub content_markdown: String,
    pub faq_raw: String,
    pub schema_json: String,
}
