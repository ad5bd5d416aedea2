//! Extractor plugins: turn a directory of sources into a documentation tree.
//!
//! Extractors are registered in an explicit [`Registry`] value built at
//! process start and passed by reference into the indexing pipeline; there
//! is no global table. Each extractor sees the whole directory and is
//! responsible for its own file selection.

pub mod markdown;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::schema;
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// A language documentation extractor.
pub trait Extractor: Send + Sync {
    /// The language this extractor produces documentation for.
    fn language(&self) -> schema::Language;

    /// File extensions commonly associated with the language, lowercase and
    /// without the leading dot (`"md"`, not `".md"`). Matching against the
    /// extensions found in a directory is case-sensitive.
    fn extensions(&self) -> &[&str];

    /// Index a directory of code recursively.
    fn index(&self, cancel: &CancelToken, dir: &Path) -> Result<schema::Index>;
}

/// The set of known extractors, keyed by language ID.
#[derive(Default)]
pub struct Registry {
    by_id: BTreeMap<String, Arc<dyn Extractor>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the extractors this crate ships.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(markdown::MarkdownExtractor));
        registry
    }

    /// Register an extractor. A later registration for the same language ID
    /// replaces the earlier one.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.by_id.insert(extractor.language().id, extractor);
    }

    pub fn get(&self, language_id: &str) -> Option<&Arc<dyn Extractor>> {
        self.by_id.get(language_id)
    }

    /// All registered extractors in language-ID order.
    pub fn extractors(&self) -> impl Iterator<Item = &Arc<dyn Extractor>> {
        self.by_id.values()
    }

    /// Invert the registry to extension -> extractors.
    pub fn by_extension(&self) -> AHashMap<&str, Vec<Arc<dyn Extractor>>> {
        let mut map: AHashMap<&str, Vec<Arc<dyn Extractor>>> = AHashMap::new();
        for extractor in self.by_id.values() {
            for &ext in extractor.extensions() {
                map.entry(ext).or_default().push(Arc::clone(extractor));
            }
        }
        map
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
