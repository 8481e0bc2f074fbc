//! Entity type and id inference from file paths.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// `[Type].ext` files describe a type without a concrete instance.
static BRACKET_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]+)\]\.[^./]+$").expect("valid regex"));

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Infer an entity type from a repository path.
///
/// `[Type].mdx` yields `Type`; otherwise the parent directory is singularized
/// and capitalized (`posts/hello.mdx` → `Post`). Files at the repository
/// root fall back to their own name.
#[must_use]
pub fn infer_type(path: &str) -> String {
    let name = file_name(path);
    if let Some(caps) = BRACKET_FILE.captures(name) {
        return caps[1].to_string();
    }

    let parent = path
        .rsplit_once('/')
        .map(|(dir, _)| dir.rsplit('/').next().unwrap_or(dir))
        .filter(|dir| !dir.is_empty());

    match parent {
        Some(dir) => capitalize(&singularize(dir)),
        None => capitalize(&file_stem(name)),
    }
}

/// Infer an entity id: the file name without its extension.
///
/// Bracket-notation files have no concrete id and yield an empty string.
#[must_use]
pub fn infer_id(path: &str) -> String {
    let name = file_name(path);
    if BRACKET_FILE.is_match(name) {
        return String::new();
    }
    file_stem(name)
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Strip common English plural suffixes.
#[must_use]
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["ches", "shes", "sses", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.len() > 1 && word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Add a plural suffix; the inverse of [`singularize`] for regular nouns.
#[must_use]
pub fn pluralize(word: &str) -> String {
    let ends_consonant_y = word.ends_with('y')
        && !word
            .chars()
            .rev()
            .nth(1)
            .is_some_and(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'));

    if ends_consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

/// Uppercase the first character.
#[must_use]
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercase the first character.
#[must_use]
pub fn decapitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_from_directory() {
        assert_eq!(infer_type("posts/hello.mdx"), "Post");
        assert_eq!(infer_type("content/categories/rust.md"), "Category");
        assert_eq!(infer_type("docs/branches/main.md"), "Branch");
        assert_eq!(infer_type("glossary/boxes/a.md"), "Box");
        assert_eq!(infer_type("team/classes/x.md"), "Class");
        assert_eq!(infer_type("people/ada.md"), "People");
    }

    #[test]
    fn test_type_from_bracket_notation() {
        assert_eq!(infer_type("schema/[Product].mdx"), "Product");
        assert_eq!(infer_id("schema/[Product].mdx"), "");
    }

    #[test]
    fn test_root_file_falls_back_to_name() {
        assert_eq!(infer_type("about.mdx"), "About");
        assert_eq!(infer_id("about.mdx"), "about");
    }

    #[test]
    fn test_id_strips_only_last_extension() {
        assert_eq!(infer_id("posts/hello.mdx"), "hello");
        assert_eq!(infer_id("posts/v1.2-notes.md"), "v1.2-notes");
    }

    #[test]
    fn test_singularize_and_pluralize() {
        assert_eq!(singularize("stories"), "story");
        assert_eq!(singularize("address"), "address");
        assert_eq!(singularize("tags"), "tag");
        assert_eq!(pluralize("story"), "stories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("post"), "posts");
    }
}
