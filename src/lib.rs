//! # doctree - library documentation indexer and search service
//!
//! doctree walks a source tree, extracts documentation (packages, types,
//! functions, Markdown headings) into a canonical schema, and builds a
//! compact on-disk fuzzy-search index per project that powers a ranked
//! as-you-type search API.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`schema`] - The canonical documentation tree (Index -> Library ->
//!   Page -> Section) and its JSON form
//! - [`extract`] - Extractor plugins and the registry mapping file
//!   extensions to them
//! - [`pipeline`] - Parallel extractor dispatch and the atomic per-project
//!   commit protocol
//! - [`filter`] - The approximate-membership filter file
//!   (`search-index.sinter`)
//! - [`search`] - Fuzzy key hashing, filter building, and the ranked query
//!   path
//! - [`store`] - On-disk layout, version stamps, decoded-index cache, and
//!   the auto-index registry
//! - [`server`] - The HTTP API and the auto-reindex watcher
//!
//! ## Quick start
//!
//! ```no_run
//! use doctree::cancel::CancelToken;
//! use doctree::extract::Registry;
//! use doctree::{pipeline, search, store};
//! use std::path::Path;
//!
//! let registry = Registry::with_defaults();
//! let data_dir = store::default_data_dir();
//!
//! // Index a project.
//! pipeline::run(
//!     &CancelToken::new(),
//!     &registry,
//!     Path::new("/path/to/project"),
//!     &data_dir,
//!     "github.com/example/project",
//! )
//! .unwrap();
//!
//! // Search it.
//! let results = search::search(
//!     &store::index_data_dir(&data_dir),
//!     "http client",
//!     None,
//!     &CancelToken::new(),
//! )
//! .unwrap();
//! for result in results {
//!     println!("{:.2} {} {}", result.score, result.search_key, result.path);
//! }
//! ```

pub mod cancel;
pub mod error;
pub mod extract;
pub mod filter;
pub mod pipeline;
pub mod schema;
pub mod search;
pub mod server;
pub mod store;
