//! The doctree schema: a standard JSON format for describing library
//! documentation.
//!
//! Extractors emit documentation in this format, the search indexer consumes
//! it, and the HTTP API serves it. The wire form is camelCase JSON; unknown
//! fields are ignored on read and missing optional fields default so that
//! older persisted indexes keep decoding.

use serde::{Deserialize, Serialize};

/// Current version of the doctree schema (semver).
///
/// Persisted indexes carrying a different `schema_version` are treated as
/// stale and rebuilt or ignored.
pub const SCHEMA_VERSION: &str = "0.0.1";

/// Ordered token sequence a user might type to find something, e.g.
/// `["net", "/", "http", ".", "Client", ".", "PostForm"]`. Joining the parts
/// with no separator yields the human-readable key.
pub type SearchKey = Vec<String>;

/// The top-most data structure in the doctree schema. One `Index` exists per
/// (project, language) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Index {
    /// Version of the doctree schema in use. Set to [`SCHEMA_VERSION`].
    pub schema_version: String,

    /// Directory that was indexed (absolute path).
    pub directory: String,

    /// Creation time of the index (RFC 3339).
    pub created_at: String,

    /// Number of files indexed.
    pub num_files: usize,

    /// Number of bytes indexed.
    pub num_bytes: usize,

    /// How long indexing took.
    pub duration_seconds: f64,

    /// Language this index covers.
    pub language: Language,

    /// Library documentation.
    pub libraries: Vec<Library>,
}

/// Language name in canonical form, e.g. "Go", "Objective-C".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Language {
    /// Display title, e.g. "C++" or "Objective-C".
    pub title: String,

    /// Lowercase identifier, e.g. "cpp", "objc". Used as the on-disk file
    /// name for the language's schema blob.
    pub id: String,
}

impl Language {
    pub fn new(title: &str, id: &str) -> Self {
        Self {
            title: title.to_string(),
            id: id.to_string(),
        }
    }

    pub fn markdown() -> Self {
        Self::new("Markdown", "markdown")
    }
}

/// A code library / logical unit of code, typically distributed by a package
/// manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Library {
    /// Name of the library.
    pub name: String,

    /// Git remote URL the documentation lives in, e.g.
    /// "https://github.com/golang/go".
    pub repository: String,

    /// Unique identifier within the language's ecosystem, e.g. a PyPI
    /// package name or Cargo crate name.
    pub id: String,

    /// Version of the library.
    pub version: String,

    /// What kind of version string `version` is, e.g. "semver", "commit".
    pub version_type: String,

    /// Pages of documentation for the library.
    pub pages: Vec<Page>,
}

/// A single page of documentation, typically rendered as one page in the
/// browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Page {
    /// URL path of the page relative to the library. Resolves this page (or
    /// any of its nested subpages) uniquely; it does not have to match a
    /// filepath.
    pub path: String,

    /// Title of the page.
    pub title: String,

    /// Page content (Markdown).
    pub detail: String,

    /// Search key for the page itself.
    pub search_key: SearchKey,

    /// Sections on the page.
    pub sections: Vec<Section>,

    /// Nested subpages. May nest arbitrarily; cycles are disallowed.
    pub subpages: Vec<Page>,
}

/// A single section of documentation on a page. Sections form a tree, e.g.
/// for Go:
///
/// * Functions
///   * func SetURLVars
/// * Types
///   * type Route
///     * (r) GetName
///
/// Each bullet point above is a `Section`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Section {
    /// ID of this section, used in hyperlinks. Unique among siblings.
    pub id: String,

    /// Whether this is a grouping-only node ("Functions", "Types"), rendered
    /// but not usually addressable by ID alone.
    pub category: bool,

    /// Shortest string that can describe this section relative to its
    /// parent, e.g. `(r) GetName` for `func (r *Route) GetName`.
    pub short_label: String,

    /// Label of this section (Markdown).
    pub label: String,

    /// Section content (Markdown).
    pub detail: String,

    /// Search key for this section.
    pub search_key: SearchKey,

    /// Child sections, rendered below and indented under this one.
    pub children: Vec<Section>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> Index {
        Index {
            schema_version: SCHEMA_VERSION.to_string(),
            directory: "/home/user/project".to_string(),
            created_at: "2024-05-01T12:00:00Z".to_string(),
            num_files: 3,
            num_bytes: 1234,
            duration_seconds: 0.25,
            language: Language::markdown(),
            libraries: vec![Library {
                name: "project".to_string(),
                pages: vec![Page {
                    path: "README.md".to_string(),
                    title: "project".to_string(),
                    detail: "intro".to_string(),
                    search_key: vec!["#".into(), " ".into(), "project".into()],
                    sections: vec![Section {
                        id: "Usage".to_string(),
                        short_label: "Usage".to_string(),
                        label: "Usage".to_string(),
                        detail: "run it".to_string(),
                        search_key: vec!["Usage".into()],
                        ..Default::default()
                    }],
                    subpages: vec![Page {
                        path: "docs/advanced.md".to_string(),
                        title: "advanced".to_string(),
                        ..Default::default()
                    }],
                }],
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_round_trip() {
        let index = sample_index();
        let json = serde_json::to_string(&index).unwrap();
        let parsed: Index = serde_json::from_str(&json).unwrap();
        assert_eq!(index, parsed);
    }

    #[test]
    fn test_camel_case_wire_names() {
        let json = serde_json::to_value(sample_index()).unwrap();
        assert!(json.get("schemaVersion").is_some());
        assert!(json.get("numFiles").is_some());
        assert!(json.get("durationSeconds").is_some());
        let page = &json["libraries"][0]["pages"][0];
        assert!(page.get("searchKey").is_some());
        assert!(page.get("subpages").is_some());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{"schemaVersion":"0.0.1","someFutureField":42}"#;
        let parsed: Index = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.schema_version, SCHEMA_VERSION);
        assert!(parsed.libraries.is_empty());
    }

    #[test]
    fn test_missing_fields_default() {
        let parsed: Page = serde_json::from_str(r#"{"path":"x"}"#).unwrap();
        assert_eq!(parsed.path, "x");
        assert!(parsed.sections.is_empty());
        assert!(parsed.search_key.is_empty());
    }
}
