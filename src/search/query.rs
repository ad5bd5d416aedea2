//! Query side of the search subsystem.

use super::hashing::{query_hashes, tokenize_query};
use super::{EntryRecord, FILTER_FILE_NAME};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::filter::FilterFile;
use crate::store;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::SystemTime;

/// Results scoring at or below this are dropped without ranking further.
pub const SCORE_KEEP: f64 = 0.5;

/// Cap on kept-but-unranked results per query; bounds decode cost.
pub const RANKED_LIMIT: usize = 10_000;

/// Cap on results returned to the caller.
pub const RETURN_LIMIT: usize = 100;

/// Scores above this count as a "good" part match for the adjacency bonus.
const MATCH_THRESHOLD: f64 = 0.75;

/// Filters held open across queries, revalidated by mtime.
const FILTER_CACHE_SIZE: usize = 64;

/// A single ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub language: String,
    pub project_name: String,
    /// The matched search key, joined into its human-readable form.
    pub search_key: String,
    /// Path of the page owning the hit.
    pub path: String,
    /// Section ID within the page; empty when the page itself matched.
    pub id: String,
    pub score: f64,
}

/// Search every valid project under `index_data_dir` (or just `project`).
///
/// Results are sorted by score descending; ties keep insertion order, so a
/// fixed filter set always returns the same ordering. Cancellation returns
/// whatever was accumulated so far without an error.
pub fn search(
    index_data_dir: &Path,
    query: &str,
    project: Option<&str>,
    cancel: &CancelToken,
) -> Result<Vec<SearchResult>> {
    let filter_files = discover_filters(index_data_dir, project)?;

    let query_tokens = tokenize_query(query);
    let hashes = query_hashes(query, &query_tokens);

    let mut out: Vec<SearchResult> = Vec::new();
    for filter_path in filter_files {
        if cancel.is_cancelled() {
            break;
        }
        let filter = open_filter(&filter_path)?;
        decode_results(
            &filter,
            &hashes,
            &query_tokens,
            RANKED_LIMIT - out.len(),
            &mut out,
        )?;
        if out.len() >= RANKED_LIMIT {
            break;
        }
    }

    // Stable sort: equal scores keep insertion order.
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out.truncate(RETURN_LIMIT);
    Ok(out)
}

/// The filter files to probe: one per valid project directory, or only the
/// requested project's.
fn discover_filters(index_data_dir: &Path, project: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = Vec::new();

    if let Some(project) = project {
        let encoded = store::validate_project_name(project)?;
        dirs.push(index_data_dir.join(encoded));
    } else {
        let entries = match std::fs::read_dir(index_data_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
    }

    Ok(dirs
        .into_iter()
        .filter(|dir| store::project_dir_valid(dir))
        .map(|dir| dir.join(FILTER_FILE_NAME))
        .collect())
}

/// Decode candidate payloads from one filter, ranking as we go. Stops once
/// `limit` results have been kept.
fn decode_results(
    filter: &FilterFile,
    hashes: &[u64],
    query_tokens: &[String],
    limit: usize,
    out: &mut Vec<SearchResult>,
) -> Result<()> {
    let mut kept = 0usize;
    for payload in filter.query_or(hashes)? {
        let record: EntryRecord = bincode::deserialize(payload)
            .map_err(|err| Error::Decode(format!("filter payload: {err}")))?;

        for (index, search_key) in record.search_keys.iter().enumerate() {
            let mut absolute_key = Vec::with_capacity(search_key.len() + 2);
            absolute_key.push(record.language.as_str());
            absolute_key.push(record.project_name.as_str());
            absolute_key.extend(search_key.iter().map(String::as_str));

            let score = match_score(query_tokens, &absolute_key);
            if score > SCORE_KEEP {
                out.push(SearchResult {
                    language: record.language.clone(),
                    project_name: record.project_name.clone(),
                    search_key: search_key.concat(),
                    path: record.page_path.clone(),
                    id: record.ids.get(index).cloned().unwrap_or_default(),
                    score,
                });
                kept += 1;
                if kept >= limit {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

/// Score a candidate key against the query tokens.
///
/// Every query token is compared with every key part by normalized edit
/// distance. Part scores are boosted by how far left in the key they sit
/// (after the `[language, project]` prefix the leftmost parts are exactly
/// the segments a user types first), and a streak of two consecutive strong
/// matches doubles the boost.
pub(crate) fn match_score(query_tokens: &[String], key: &[&str]) -> f64 {
    let mut score = 0.0;
    let mut last = 0.0;
    for query_part in query_tokens {
        let query_part = query_part.to_lowercase();
        let query_len = query_part.chars().count();

        for (i, key_part) in key.iter().enumerate() {
            let key_part = key_part.to_lowercase();
            let largest = query_len.max(key_part.chars().count());

            // In [0.0, 1.0]; 1.0 is an exact match.
            let part_score = if largest == 0 {
                1.0
            } else {
                1.0 - levenshtein(&query_part, &key_part) as f64 / largest as f64
            };

            // Matches on the left side of the key get more boost.
            let mut boost = (key.len() - i) as f64;
            if part_score > MATCH_THRESHOLD && last > MATCH_THRESHOLD {
                boost *= 2.0;
            }
            let contribution = part_score * boost;
            score += contribution;
            last = contribution;
        }
    }
    score
}

/// Edit distance over Unicode scalars, two-row dynamic programming.
fn levenshtein(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Open a filter file through the process-wide warm cache. An entry is
/// reused only while the file's mtime is unchanged.
fn open_filter(path: &Path) -> Result<Arc<FilterFile>> {
    static CACHE: OnceLock<Mutex<LruCache<PathBuf, (SystemTime, Arc<FilterFile>)>>> =
        OnceLock::new();
    let cache = CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(NonZeroUsize::new(FILTER_CACHE_SIZE).unwrap()))
    });

    let mtime = std::fs::metadata(path)?.modified()?;

    let mut cache = cache.lock().unwrap();
    if let Some((cached_mtime, filter)) = cache.get(path) {
        if *cached_mtime == mtime {
            return Ok(Arc::clone(filter));
        }
    }

    let filter = Arc::new(FilterFile::read(path)?);
    cache.put(path.to_path_buf(), (mtime, Arc::clone(&filter)));
    Ok(filter)
}
