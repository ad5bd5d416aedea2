//! End-to-end tests: index real directories through the pipeline, then read
//! them back through the store and search paths.

use doctree::cancel::CancelToken;
use doctree::error::{Error, Result};
use doctree::extract::{Extractor, Registry};
use doctree::schema::{self, Index, Language, Library, Page, Section};
use doctree::{pipeline, search, store};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn run_index(registry: &Registry, dir: &Path, data_dir: &Path, project: &str) -> Result<()> {
    pipeline::run(&CancelToken::new(), registry, dir, data_dir, project)
}

fn do_search(data_dir: &Path, query: &str, project: Option<&str>) -> Vec<search::SearchResult> {
    search::search(
        &store::index_data_dir(data_dir),
        query,
        project,
        &CancelToken::new(),
    )
    .unwrap()
}

#[test]
fn test_empty_project() {
    let src = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let registry = Registry::with_defaults();

    run_index(&registry, src.path(), data.path(), "github.com/e/empty").unwrap();

    let index_dir = store::index_data_dir(data.path());
    assert_eq!(
        store::list_projects(&index_dir).unwrap(),
        vec!["github.com/e/empty".to_string()]
    );
    assert!(store::get_index(&index_dir, "github.com/e/empty")
        .unwrap()
        .is_empty());
    assert!(do_search(data.path(), "anything", None).is_empty());
}

#[test]
fn test_single_markdown_page() {
    let src = TempDir::new().unwrap();
    fs::write(
        src.path().join("README.md"),
        "# ziglearn\n\n## How to run the tests\n\n1. `zig run`\n",
    )
    .unwrap();
    let data = TempDir::new().unwrap();
    let registry = Registry::with_defaults();

    run_index(&registry, src.path(), data.path(), "github.com/z/learn").unwrap();

    let page = store::get_page(
        &store::index_data_dir(data.path()),
        "github.com/z/learn",
        "markdown",
        "README.md",
    )
    .unwrap();

    assert_eq!(page.title, "ziglearn");
    let section = &page.sections[0];
    assert_eq!(section.id, "How to run the tests");
    let want: Vec<String> = [
        "#", " ", "ziglearn", " ", ">", " ", "How", " ", "to", " ", "run", " ", "the", " ",
        "tests",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    assert_eq!(section.search_key, want);
}

#[test]
fn test_ranked_search() {
    let data = TempDir::new().unwrap();
    let registry = Registry::with_defaults();

    let with_tests = TempDir::new().unwrap();
    fs::write(
        with_tests.path().join("README.md"),
        "# ziglearn\n\n## How to run the tests\n\n1. `zig run`\n",
    )
    .unwrap();
    run_index(&registry, with_tests.path(), data.path(), "github.com/z/learn").unwrap();

    let without_tests = TempDir::new().unwrap();
    fs::write(
        without_tests.path().join("README.md"),
        "# ziglearn\n\nnothing else here\n",
    )
    .unwrap();
    run_index(&registry, without_tests.path(), data.path(), "github.com/z/other").unwrap();

    // Both query terms present: the hit must cover them both.
    let results = do_search(data.path(), "ziglearn tests", None);
    let both = results
        .iter()
        .find(|r| r.search_key.contains("ziglearn") && r.search_key.contains("tests"))
        .expect("no result matching both terms");

    // A document that has "ziglearn" but no "tests" scores strictly lower
    // on its single-term query.
    let other_results = do_search(data.path(), "ziglearn", Some("github.com/z/other"));
    assert!(!other_results.is_empty());
    assert!(
        both.score > other_results[0].score,
        "two-term match {} should outrank single-term match {}",
        both.score,
        other_results[0].score
    );
}

/// Extractor standing in for a compiled-language plugin: one page with one
/// function-like section.
struct PkgExtractor;

impl Extractor for PkgExtractor {
    fn language(&self) -> Language {
        Language::new("Go", "go")
    }

    fn extensions(&self) -> &[&str] {
        &["go"]
    }

    fn index(&self, _cancel: &CancelToken, _dir: &Path) -> Result<Index> {
        Ok(Index {
            schema_version: schema::SCHEMA_VERSION.to_string(),
            language: self.language(),
            num_files: 1,
            libraries: vec![Library {
                name: "pkg".to_string(),
                pages: vec![Page {
                    path: "pkg".to_string(),
                    title: "pkg".to_string(),
                    search_key: vec!["pkg".to_string()],
                    sections: vec![Section {
                        id: "DoThing".to_string(),
                        short_label: "DoThing".to_string(),
                        label: "func DoThing".to_string(),
                        search_key: vec!["pkg".to_string(), ".".to_string(), "DoThing".to_string()],
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        })
    }
}

#[test]
fn test_autocomplete_prefix() {
    let src = TempDir::new().unwrap();
    fs::write(src.path().join("thing.go"), "package pkg\n").unwrap();
    let data = TempDir::new().unwrap();

    let mut registry = Registry::new();
    registry.register(Arc::new(PkgExtractor));

    run_index(&registry, src.path(), data.path(), "github.com/x/pkg").unwrap();

    let results = do_search(data.path(), "DoTh", None);
    let hit = results
        .iter()
        .find(|r| r.id == "DoThing")
        .expect("prefix query did not reach the section");
    assert_eq!(hit.path, "pkg");
    assert_eq!(hit.search_key, "pkg.DoThing");
}

/// Extractor that emits a stale schema version: the schema blob writes
/// fine, then search indexing refuses it, which must roll the whole
/// project directory back.
struct StaleSchemaExtractor;

impl Extractor for StaleSchemaExtractor {
    fn language(&self) -> Language {
        Language::new("Stale", "stale")
    }

    fn extensions(&self) -> &[&str] {
        &["md"]
    }

    fn index(&self, _cancel: &CancelToken, _dir: &Path) -> Result<Index> {
        Ok(Index {
            schema_version: "0.0.0".to_string(),
            language: self.language(),
            ..Default::default()
        })
    }
}

#[test]
fn test_atomic_rebuild() {
    let src = TempDir::new().unwrap();
    fs::write(src.path().join("README.md"), "# doc\n\n## part\n").unwrap();
    let data = TempDir::new().unwrap();
    let project_dir = store::index_data_dir(data.path()).join(store::encode_project_name("a/b"));

    // Failure after the schema files are written: nothing may survive.
    let mut bad_registry = Registry::new();
    bad_registry.register(Arc::new(StaleSchemaExtractor));
    let err = run_index(&bad_registry, src.path(), data.path(), "a/b").unwrap_err();
    assert!(matches!(err, Error::FilterBuild(_)));
    assert!(!project_dir.exists(), "failed build left a partial project");

    // A subsequent good build commits exactly one blob per language plus
    // the filter and the version stamp.
    let registry = Registry::with_defaults();
    run_index(&registry, src.path(), data.path(), "a/b").unwrap();

    let mut entries: Vec<String> = fs::read_dir(&project_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["markdown", "search-index.sinter", "version"]);
    assert_eq!(
        fs::read_to_string(project_dir.join("version")).unwrap(),
        store::PROJECT_DIR_VERSION
    );
}

#[test]
fn test_filter_retrieval_has_no_false_negatives() {
    use doctree::filter::FilterFile;
    use doctree::search::hashing::hash;

    let src = TempDir::new().unwrap();
    fs::write(
        src.path().join("README.md"),
        "# ziglearn\n\n## How to run the tests\n\n1. `zig run`\n",
    )
    .unwrap();
    let data = TempDir::new().unwrap();
    let registry = Registry::with_defaults();
    run_index(&registry, src.path(), data.path(), "github.com/z/learn").unwrap();

    let filter_path = store::index_data_dir(data.path())
        .join(store::encode_project_name("github.com/z/learn"))
        .join("search-index.sinter");
    let filter = FilterFile::read(&filter_path).unwrap();

    // Every part of every indexed key resolves to at least one payload,
    // including the language/project prefix parts and lowercased forms.
    for part in [
        "markdown",
        "github.com/z/learn",
        "#",
        " ",
        "ziglearn",
        ">",
        "How",
        "how",
        "tests",
        "run",
    ] {
        assert!(
            !filter.query_or(&[hash(part)]).unwrap().is_empty(),
            "no payload for indexed part {part:?}"
        );
    }
}

#[test]
fn test_disjoint_project_search() {
    let data = TempDir::new().unwrap();
    let registry = Registry::with_defaults();

    for project in ["github.com/d/one", "github.com/d/two"] {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("README.md"), "# shared\n\n## topic\n").unwrap();
        run_index(&registry, src.path(), data.path(), project).unwrap();
    }

    // Project-restricted search never leaks the other project.
    let one_only = do_search(data.path(), "shared", Some("github.com/d/one"));
    assert!(!one_only.is_empty());
    assert!(one_only.iter().all(|r| r.project_name == "github.com/d/one"));

    // Unrestricted search interleaves both, sorted by score.
    let all = do_search(data.path(), "shared", None);
    assert!(all.iter().any(|r| r.project_name == "github.com/d/one"));
    assert!(all.iter().any(|r| r.project_name == "github.com/d/two"));
    for pair in all.windows(2) {
        assert!(pair[0].score >= pair[1].score, "results not sorted");
    }

    // Deterministic given a fixed filter set.
    assert_eq!(all, do_search(data.path(), "shared", None));
}

#[test]
fn test_reindex_replaces_languages() {
    // A project that had go+markdown before but only markdown now must lose
    // the go blob.
    let data = TempDir::new().unwrap();
    let index_dir = store::index_data_dir(data.path());

    let src = TempDir::new().unwrap();
    fs::write(src.path().join("README.md"), "# doc\n").unwrap();
    fs::write(src.path().join("thing.go"), "package pkg\n").unwrap();

    let mut registry = Registry::with_defaults();
    registry.register(Arc::new(PkgExtractor));
    run_index(&registry, src.path(), data.path(), "proj").unwrap();
    let indexes = store::get_index(&index_dir, "proj").unwrap();
    assert_eq!(indexes.len(), 2);

    fs::remove_file(src.path().join("thing.go")).unwrap();
    run_index(&registry, src.path(), data.path(), "proj").unwrap();
    let indexes = store::get_index(&index_dir, "proj").unwrap();
    assert_eq!(indexes.keys().collect::<Vec<_>>(), vec!["markdown"]);
}

#[test]
fn test_search_skips_stale_project_dirs() {
    let data = TempDir::new().unwrap();
    let registry = Registry::with_defaults();

    let src = TempDir::new().unwrap();
    fs::write(src.path().join("README.md"), "# findable\n").unwrap();
    run_index(&registry, src.path(), data.path(), "proj").unwrap();
    assert!(!do_search(data.path(), "findable", None).is_empty());

    // Invalidate the version stamp: the project disappears from search
    // rather than erroring.
    let project_dir = store::index_data_dir(data.path()).join("proj");
    fs::write(project_dir.join("version"), "0").unwrap();
    assert!(do_search(data.path(), "findable", None).is_empty());
}
