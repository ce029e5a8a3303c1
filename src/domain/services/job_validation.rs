use serde::Deserialize;
use url::Url;

use crate::domain::entities::JobInput;
use crate::domain::errors::ValidationError;

pub const TOPIC_MIN_CHARS: usize = 3;
pub const TOPIC_MAX_CHARS: usize = 140;
pub const MAX_KEYWORDS: usize = 12;
pub const KEYWORD_MAX_CHARS: usize = 60;
pub const MIN_TARGET_LENGTH: i64 = 300;
pub const MAX_TARGET_LENGTH: i64 = 3000;

/// Keywords arrive either as the comma-separated form field or as a JSON list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeywordsField {
    Text(String),
    List(Vec<String>),
}

/// Form posts send the length as text, JSON clients as a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LengthField {
    Number(i64),
    Text(String),
}

/// Unvalidated submission body for `POST /jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub keywords: Option<KeywordsField>,
    #[serde(default)]
    pub length: Option<LengthField>,
}

impl CreateJobRequest {
    /// Validate every field and collect all failures before rejecting.
    pub fn validate(&self) -> Result<JobInput, ValidationError> {
        let mut details = Vec::new();

        let url = match self.url.as_deref() {
            Some(raw) => normalize_url(raw).map_err(|e| details.push(e)).ok(),
            None => {
                details.push("url is required".to_string());
                None
            }
        };

        let topic = match self.topic.as_deref() {
            Some(raw) => validate_topic(raw).map_err(|e| details.push(e)).ok(),
            None => {
                details.push("topic is required".to_string());
                None
            }
        };

        let keywords = match &self.keywords {
            Some(KeywordsField::Text(raw)) => parse_keywords(raw).map_err(|e| details.push(e)).ok(),
            Some(KeywordsField::List(items)) => parse_keywords(&items.join(","))
                .map_err(|e| details.push(e))
                .ok(),
            None => {
                details.push("keywords are required".to_string());
                None
            }
        };

        let target_length = match &self.length {
            Some(field) => validate_length(field).map_err(|e| details.push(e)).ok(),
            None => {
                details.push("length is required".to_string());
                None
            }
        };

        match (url, topic, keywords, target_length) {
            (Some(url), Some(topic), Some(keywords), Some(target_length)) if details.is_empty() => {
                Ok(JobInput {
                    url,
                    topic,
                    keywords,
                    target_length,
                })
            }
            _ => Err(ValidationError::new(details)),
        }
    }
}

/// Adds `https://` when no scheme is given, requires https and a host, and
/// drops any fragment.
pub fn normalize_url(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("url is required".to_string());
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut parsed = Url::parse(&candidate).map_err(|e| format!("url is not valid: {}", e))?;
    if parsed.scheme() != "https" {
        return Err("url must use https".to_string());
    }
    match parsed.host_str() {
        Some(host) if host.contains('.') || host == "localhost" => {}
        _ => return Err("url must include a valid host".to_string()),
    }
    parsed.set_fragment(None);

    Ok(parsed.to_string())
}

pub fn validate_topic(raw: &str) -> Result<String, String> {
    let topic = raw.trim();
    let len = topic.chars().count();
    if len < TOPIC_MIN_CHARS {
        return Err(format!(
            "topic must be at least {} characters",
            TOPIC_MIN_CHARS
        ));
    }
    if len > TOPIC_MAX_CHARS {
        return Err(format!(
            "topic must be at most {} characters (got {})",
            TOPIC_MAX_CHARS, len
        ));
    }
    Ok(topic.to_string())
}

/// Splits on commas, trims, drops empties and case-insensitive duplicates
/// (first spelling wins), then enforces count and per-keyword length.
pub fn parse_keywords(raw: &str) -> Result<Vec<String>, String> {
    let mut keywords: Vec<String> = Vec::new();
    for part in raw.split(',') {
        let keyword = part.trim();
        if keyword.is_empty() {
            continue;
        }
        if keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword)) {
            continue;
        }
        keywords.push(keyword.to_string());
    }

    if keywords.is_empty() {
        return Err("at least one keyword is required".to_string());
    }
    if keywords.len() > MAX_KEYWORDS {
        return Err(format!(
            "too many keywords: {} provided, maximum is {}",
            keywords.len(),
            MAX_KEYWORDS
        ));
    }
    if let Some(long) = keywords
        .iter()
        .find(|k| k.chars().count() > KEYWORD_MAX_CHARS)
    {
        let preview: String = long.chars().take(20).collect();
        return Err(format!(
            "keyword '{}...' exceeds {} characters",
            preview, KEYWORD_MAX_CHARS
        ));
    }

    Ok(keywords)
}

pub fn validate_length(field: &LengthField) -> Result<u32, String> {
    let value = match field {
        LengthField::Number(n) => *n,
        LengthField::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| "length must be a whole number".to_string())?,
    };
    if !(MIN_TARGET_LENGTH..=MAX_TARGET_LENGTH).contains(&value) {
        return Err(format!(
            "length must be between {} and {} words",
            MIN_TARGET_LENGTH, MAX_TARGET_LENGTH
        ));
    }
    Ok(value as u32)
}
