//! Change parsing: raw file changes into staged change records.
//!
//! # Submodules
//!
//! - [`frontmatter`] - `---` block extraction and value coercion
//! - [`infer`] - entity type/id inference from paths
//! - [`glob`] - include/exclude globs compiled to anchored regexes
//! - [`hash`] - content hashing
//! - [`relationships`] - `Type/id` references and `[[Type/id]]` links
//! - [`search`] - title/description/keywords for the search index
//! - [`staged`] - the [`StagedChange`] builder

pub mod frontmatter;
pub mod glob;
pub mod hash;
pub mod infer;
pub mod relationships;
pub mod search;
pub mod staged;

pub use frontmatter::{Frontmatter, extract_frontmatter};
pub use glob::{Glob, PathFilter};
pub use hash::hash_content;
pub use infer::{infer_id, infer_type};
pub use relationships::{Relationship, extract_relationships};
pub use search::{SearchMetadata, extract_search_metadata};
pub use staged::{
    Operation, ParseOptions, StagedChange, attach_previous, build_staged_change, thing_url,
};
