//! Relationship extraction from frontmatter references and wiki links.
//!
//! A reference is a `Type/id` string where `Type` is PascalCase. It can
//! appear as a frontmatter value (the key becomes the predicate) or as a
//! `[[Type/id]]` link in the body (predicate `references`).

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::parser::infer::{decapitalize, pluralize};

static TYPE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][A-Za-z0-9]*)/([A-Za-z0-9_.-]+)$").expect("valid regex"));

static WIKI_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([A-Z][A-Za-z0-9]*)/([A-Za-z0-9_.-]+)(?:[|#][^\]]*)?\]\]").expect("valid regex")
});

/// Predicate used for body wiki links.
pub const LINK_PREDICATE: &str = "references";

/// Known predicate → reverse predicate pairs.
const REVERSE_PREDICATES: &[(&str, &str)] = &[
    ("author", "works"),
    ("authors", "works"),
    ("parent", "children"),
    ("children", "parent"),
    ("category", "items"),
    ("categories", "items"),
    ("tag", "tagged"),
    ("tags", "tagged"),
    ("series", "entries"),
    ("related", "related"),
    ("references", "referencedBy"),
];

/// An edge from the entity being staged to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub predicate: String,
    /// Target URL: `{ns}/{Type}/{id}`.
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<String>,
}

/// Reverse predicate for `predicate`, falling back to the pluralized target type.
#[must_use]
pub fn reverse_predicate(predicate: &str, target_type: &str) -> String {
    REVERSE_PREDICATES
        .iter()
        .find(|(p, _)| *p == predicate)
        .map_or_else(|| pluralize(&decapitalize(target_type)), |(_, r)| (*r).to_string())
}

/// Collect relationships from frontmatter values and body links.
///
/// Returns `None` when nothing was found. Duplicate `(predicate, target)`
/// pairs are dropped, keeping the first occurrence.
#[must_use]
pub fn extract_relationships(
    data: &Map<String, Value>,
    body: &str,
    ns: &str,
) -> Option<Vec<Relationship>> {
    let mut seen = HashSet::new();
    let mut relationships = Vec::new();

    let mut push = |predicate: &str, target_type: &str, target_id: &str| {
        let target = format!("{ns}/{target_type}/{target_id}");
        if seen.insert((predicate.to_string(), target.clone())) {
            relationships.push(Relationship {
                predicate: predicate.to_string(),
                target,
                reverse: Some(reverse_predicate(predicate, target_type)),
            });
        }
    };

    for (key, value) in data {
        let candidates: Vec<&str> = match value {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => continue,
        };
        for candidate in candidates {
            if let Some(caps) = TYPE_REF.captures(candidate.trim()) {
                push(key, &caps[1], &caps[2]);
            }
        }
    }

    for caps in WIKI_LINK.captures_iter(body) {
        push(LINK_PREDICATE, &caps[1], &caps[2]);
    }

    (!relationships.is_empty()).then_some(relationships)
}
