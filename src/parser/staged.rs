//! Staged change records: one file in one commit, ready to apply.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::git::{FileChange, FileStatus};
use crate::parser::frontmatter::extract_frontmatter;
use crate::parser::glob::PathFilter;
use crate::parser::hash::hash_content;
use crate::parser::infer::{infer_id, infer_type};
use crate::parser::relationships::{Relationship, extract_relationships};
use crate::parser::search::{SearchMetadata, extract_search_metadata};

/// File extensions treated as content.
pub const CONTENT_EXTENSIONS: &[&str] = &["md", "mdx", "markdown"];

/// What the database should do with a staged change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Upsert,
    Delete,
}

impl Operation {
    #[must_use]
    pub const fn from_status(status: FileStatus) -> Self {
        match status {
            FileStatus::Added | FileStatus::Copied => Self::Create,
            FileStatus::Modified => Self::Update,
            FileStatus::Renamed => Self::Upsert,
            FileStatus::Deleted => Self::Delete,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

/// The unit of work handed to the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedChange {
    pub path: String,
    #[serde(rename = "type")]
    pub thing_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    pub change: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<Relationship>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_metadata: Option<SearchMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl StagedChange {
    /// Entity URL in `ns`, or `None` when no id could be resolved.
    #[must_use]
    pub fn url(&self, ns: &str) -> Option<String> {
        self.id
            .as_deref()
            .map(|id| thing_url(ns, &self.thing_type, id))
    }

    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.operation == Operation::Delete
    }

    fn push_error(&mut self, message: impl Into<String>) {
        self.errors.get_or_insert_with(Vec::new).push(message.into());
    }
}

/// Build an entity URL: `{ns}/{Type}/{id}`.
#[must_use]
pub fn thing_url(ns: &str, thing_type: &str, id: &str) -> String {
    format!("{ns}/{thing_type}/{id}")
}

/// Options shared by every file in a run.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub ns: String,
    pub filter: PathFilter,
}

/// Whether `path` has a Markdown/MDX extension.
#[must_use]
pub fn is_content_file(path: &str) -> bool {
    path.rsplit_once('.').is_some_and(|(_, ext)| {
        CONTENT_EXTENSIONS
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    })
}

/// Resolve `(type, id)` for a file: frontmatter first, then the path.
#[must_use]
pub fn resolve_identity(path: &str, data: Option<&Map<String, Value>>) -> (String, Option<String>) {
    let field = |key: &str| {
        data.and_then(|d| d.get(key))
            .and_then(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
    };

    let thing_type = field("type")
        .or_else(|| field("$type"))
        .unwrap_or_else(|| infer_type(path));
    let id = field("id")
        .or_else(|| field("$id"))
        .or_else(|| Some(infer_id(path)).filter(|id| !id.is_empty()));
    (thing_type, id)
}

/// Turn a file change into a staged change.
///
/// Returns `None` for paths rejected by the filter and for non-content
/// files. For deletions `content` may carry the file as it was before the
/// delete; it is used only to resolve the identity, and the record carries no
/// data or content.
#[must_use]
pub fn build_staged_change(
    change: &FileChange,
    content: Option<&str>,
    options: &ParseOptions,
) -> Option<StagedChange> {
    if !is_content_file(&change.path) || !options.filter.allows(&change.path) {
        return None;
    }

    let operation = Operation::from_status(change.status);
    let frontmatter = content.map(extract_frontmatter);
    let (thing_type, id) = resolve_identity(&change.path, frontmatter.as_ref().map(|f| &f.data));

    let mut staged = StagedChange {
        path: change.path.clone(),
        thing_type,
        id,
        operation,
        data: None,
        content: None,
        hash: None,
        previous_hash: None,
        change: change.status,
        previous_path: change.previous_path.clone(),
        relationships: None,
        search_metadata: None,
        errors: None,
    };

    if operation == Operation::Delete {
        staged.previous_hash = content.map(hash_content);
    } else {
        match (content, frontmatter) {
            (Some(raw), Some(fm)) => {
                let metadata = extract_search_metadata(&fm.data, &fm.body);
                staged.relationships = extract_relationships(&fm.data, &fm.body, &options.ns);
                staged.search_metadata = (!metadata.is_empty()).then_some(metadata);
                staged.hash = Some(hash_content(raw));
                staged.data = Some(fm.data);
                staged.content = Some(fm.body);
            }
            _ => staged.push_error(format!("content unavailable for {}", change.path)),
        }
    }

    if staged.id.is_none() {
        staged.push_error(format!(
            "no id for {}: bracket-notation files need an `id` in frontmatter",
            change.path
        ));
    }

    Some(staged)
}

/// Attach the file's content before this commit, for `previous_hash`.
pub fn attach_previous(staged: &mut StagedChange, previous_content: &str) {
    staged.previous_hash = Some(hash_content(previous_content));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> ParseOptions {
        ParseOptions {
            ns: "blog.acme.local".to_string(),
            filter: PathFilter::default(),
        }
    }

    #[test]
    fn test_added_post() {
        let change = FileChange::new("posts/hello.mdx", FileStatus::Added);
        let staged =
            build_staged_change(&change, Some("---\ntitle: Hello\n---\nContent"), &options())
                .unwrap();

        assert_eq!(staged.thing_type, "Post");
        assert_eq!(staged.id.as_deref(), Some("hello"));
        assert_eq!(staged.operation, Operation::Create);
        assert_eq!(staged.data.as_ref().unwrap()["title"], json!("Hello"));
        assert_eq!(staged.content.as_deref(), Some("Content"));
        assert_eq!(
            staged.hash.as_deref(),
            Some(hash_content("---\ntitle: Hello\n---\nContent").as_str())
        );
        assert!(staged.errors.is_none());
        assert_eq!(
            staged.url("blog.acme.local").as_deref(),
            Some("blog.acme.local/Post/hello")
        );
    }

    #[test]
    fn test_frontmatter_identity_wins() {
        let change = FileChange::new("posts/hello.mdx", FileStatus::Modified);
        let staged = build_staged_change(
            &change,
            Some("---\n$type: Article\n$id: greeting\n---\nBody"),
            &options(),
        )
        .unwrap();

        assert_eq!(staged.thing_type, "Article");
        assert_eq!(staged.id.as_deref(), Some("greeting"));
        assert_eq!(staged.operation, Operation::Update);
    }

    #[test]
    fn test_delete_has_no_payload() {
        let change = FileChange::new("posts/old.md", FileStatus::Deleted);
        let staged = build_staged_change(&change, None, &options()).unwrap();

        assert_eq!(staged.operation, Operation::Delete);
        assert!(staged.data.is_none());
        assert!(staged.content.is_none());
        assert!(staged.hash.is_none());
        assert!(staged.errors.is_none());
    }

    #[test]
    fn test_rename_is_upsert() {
        let mut change = FileChange::new("posts/new.md", FileStatus::Renamed);
        change.previous_path = Some("posts/old.md".to_string());
        let staged = build_staged_change(&change, Some("Body"), &options()).unwrap();

        assert_eq!(staged.operation, Operation::Upsert);
        assert_eq!(staged.previous_path.as_deref(), Some("posts/old.md"));
        assert!(staged.data.unwrap().is_empty());
    }

    #[test]
    fn test_non_content_and_filtered_paths() {
        let opts = ParseOptions {
            ns: "ns".to_string(),
            filter: PathFilter::new(&["posts/**".to_string()], &["**/draft.*".to_string()])
                .unwrap(),
        };

        let image = FileChange::new("posts/cover.png", FileStatus::Added);
        let draft = FileChange::new("posts/draft.mdx", FileStatus::Added);
        let outside = FileChange::new("pages/about.md", FileStatus::Added);
        let kept = FileChange::new("posts/deep/nested.MD", FileStatus::Added);

        assert!(build_staged_change(&image, Some(""), &opts).is_none());
        assert!(build_staged_change(&draft, Some(""), &opts).is_none());
        assert!(build_staged_change(&outside, Some(""), &opts).is_none());
        assert!(build_staged_change(&kept, Some(""), &opts).is_some());
    }

    #[test]
    fn test_bracket_file_without_id_reports_error() {
        let change = FileChange::new("schema/[Product].mdx", FileStatus::Added);
        let staged = build_staged_change(&change, Some("Body"), &options()).unwrap();

        assert_eq!(staged.thing_type, "Product");
        assert!(staged.id.is_none());
        assert_eq!(staged.errors.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_missing_content_reports_error() {
        let change = FileChange::new("posts/a.md", FileStatus::Added);
        let staged = build_staged_change(&change, None, &options()).unwrap();
        assert!(staged.errors.unwrap()[0].contains("content unavailable"));
    }

    #[test]
    fn test_serializes_type_field() {
        let change = FileChange::new("posts/a.md", FileStatus::Added);
        let staged = build_staged_change(&change, Some("x"), &options()).unwrap();
        let value = serde_json::to_value(&staged).unwrap();

        assert_eq!(value["type"], json!("Post"));
        assert_eq!(value["operation"], json!("create"));
        assert_eq!(value["change"], json!("added"));
        assert!(value.get("previousPath").is_none());
    }
}
