//! Frontmatter extraction.
//!
//! Frontmatter is the block between a leading `---` line and the next `---`
//! line. Each `key: value` line inside it becomes one entry; values are
//! coerced in priority order to boolean, number, quoted string, or
//! bracket-delimited array, and fall back to the raw string.

use serde_json::{Map, Number, Value};

/// Frontmatter split from the document body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    pub data: Map<String, Value>,
    pub body: String,
}

/// Split `content` into frontmatter data and body.
///
/// Content without a frontmatter block (or with an unterminated one) is
/// returned entirely as the body.
#[must_use]
pub fn extract_frontmatter(content: &str) -> Frontmatter {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut lines = content.split_inclusive('\n');
    let starts_with_fence = lines.next().is_some_and(|first| first.trim_end() == "---");
    if !starts_with_fence {
        return Frontmatter {
            data: Map::new(),
            body: content.trim().to_string(),
        };
    }

    let mut data = Map::new();
    let mut consumed = content.split_inclusive('\n').next().map_or(0, str::len);
    let mut closed = false;

    for line in lines {
        consumed += line.len();
        let trimmed = line.trim_end();
        if trimmed == "---" {
            closed = true;
            break;
        }
        if let Some((key, value)) = parse_line(trimmed) {
            data.insert(key, value);
        }
    }

    if !closed {
        return Frontmatter {
            data: Map::new(),
            body: content.trim().to_string(),
        };
    }

    Frontmatter {
        data,
        body: content[consumed..].trim().to_string(),
    }
}

/// Parse one `key: value` line; `$`-prefixed keys lose the prefix.
fn parse_line(line: &str) -> Option<(String, Value)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    let key = key.strip_prefix('$').unwrap_or(key);

    Some((key.to_string(), coerce(value.trim())))
}

/// Coerce a raw frontmatter value.
#[must_use]
pub fn coerce(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::Null;
    }

    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Some(number) = parse_number(raw) {
        return Value::Number(number);
    }

    if let Some(unquoted) = unquote(raw) {
        return Value::String(unquoted.to_string());
    }

    if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let items = split_array(inner)
            .into_iter()
            .filter(|item| !item.is_empty())
            .map(coerce)
            .collect();
        return Value::Array(items);
    }

    Value::String(raw.to_string())
}

fn parse_number(raw: &str) -> Option<Number> {
    if !raw.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.') {
        return None;
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Number::from(int));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}

fn unquote(raw: &str) -> Option<&str> {
    let quoted = raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')));
    quoted.then(|| &raw[1..raw.len() - 1])
}

/// Split array items on commas that are not inside quotes.
fn split_array(inner: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in inner.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ',') => {
                items.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(inner[start..].trim());
    items
}
