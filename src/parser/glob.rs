//! Glob patterns compiled to anchored regular expressions.
//!
//! Only three wildcards are recognized:
//! - `**` matches any number of path segments (`**/` may match none)
//! - `*` matches any run of characters except `/`
//! - `?` matches one character except `/`
//!
//! Everything else is matched literally.

use regex::Regex;

use crate::error::{Error, Result};

/// A compiled glob.
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    /// Compile a glob pattern.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if the translated regex fails to compile.
    pub fn new(pattern: &str) -> Result<Self> {
        let source = to_regex(pattern);
        let regex = Regex::new(&source)
            .map_err(|e| Error::InvalidArgument(format!("bad glob '{pattern}': {e}")))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// Translate a glob into an anchored regex source string.
#[must_use]
pub fn to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
                i += 1;
            }
        }
    }

    out.push('$');
    out
}

/// Include/exclude filter over repository paths. Excludes win.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<Glob>,
    exclude: Vec<Glob>,
}

impl PathFilter {
    /// Compile include and exclude patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern fails to compile.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: include.iter().map(|p| Glob::new(p)).collect::<Result<_>>()?,
            exclude: exclude.iter().map(|p| Glob::new(p)).collect::<Result<_>>()?,
        })
    }

    /// `true` if `path` passes: no exclude matches, and an include matches (or none are set).
    #[must_use]
    pub fn allows(&self, path: &str) -> bool {
        if self.exclude.iter().any(|g| g.is_match(path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|g| g.is_match(path))
    }
}
