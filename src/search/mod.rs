//! The documentation search subsystem.
//!
//! Indexing side: [`build`] walks every page of every language index,
//! expands its search keys into prefix/suffix fuzzy hashes and freezes them
//! into the project's `search-index.sinter` filter file.
//!
//! Query side: [`search`] tokenizes the query, OR-probes each project's
//! filter, decodes the candidate payloads and ranks every candidate key by
//! edit distance.

pub mod hashing;

mod build;
mod query;

pub use build::{build, BuildStats};
pub use query::{search, SearchResult, RANKED_LIMIT, RETURN_LIMIT, SCORE_KEEP};

use serde::{Deserialize, Serialize};

/// File name of the filter inside a project directory.
pub const FILTER_FILE_NAME: &str = "search-index.sinter";

/// Payload stored in the filter for one page: every search key on the page
/// (the page's own plus its sections'), in document order.
///
/// `ids[i]` is the section ID `search_keys[i]` points at; an empty ID means
/// the page itself. The two run in lockstep: `search_keys.len() == ids.len()`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EntryRecord {
    pub language: String,
    pub project_name: String,
    pub search_keys: Vec<Vec<String>>,
    pub ids: Vec<String>,
    pub page_path: String,
}
