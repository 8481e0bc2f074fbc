//! Search metadata (title, description, keywords) for the search index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Longest description kept from the body.
pub const MAX_DESCRIPTION_CHARS: usize = 300;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

impl SearchMetadata {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.keywords.is_none()
    }
}

fn string_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn list_field(data: &Map<String, Value>, key: &str) -> Vec<String> {
    match data.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn is_fence(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("```") || line.starts_with("~~~")
}

fn first_heading(body: &str) -> Option<String> {
    let mut in_code = false;
    for line in body.lines() {
        if is_fence(line) {
            in_code = !in_code;
            continue;
        }
        if in_code {
            continue;
        }
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            let text = trimmed.trim_start_matches('#').trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

fn first_paragraph(body: &str) -> Option<String> {
    let mut in_code = false;
    let mut paragraph: Vec<&str> = Vec::new();

    for line in body.lines() {
        if is_fence(line) {
            if !paragraph.is_empty() {
                break;
            }
            in_code = !in_code;
            continue;
        }
        if in_code {
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            if !paragraph.is_empty() {
                break;
            }
            continue;
        }
        paragraph.push(trimmed);
    }

    (!paragraph.is_empty()).then(|| truncate(&paragraph.join(" "), MAX_DESCRIPTION_CHARS))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Build search metadata, preferring frontmatter over body-derived values.
#[must_use]
pub fn extract_search_metadata(data: &Map<String, Value>, body: &str) -> SearchMetadata {
    let title = string_field(data, "title").or_else(|| first_heading(body));
    let description = string_field(data, "description").or_else(|| first_paragraph(body));

    let mut keywords: Vec<String> = Vec::new();
    for keyword in list_field(data, "keywords").into_iter().chain(list_field(data, "tags")) {
        if !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }

    SearchMetadata {
        title,
        description,
        keywords: (!keywords.is_empty()).then_some(keywords),
    }
}
