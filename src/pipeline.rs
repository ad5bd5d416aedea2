//! The indexing pipeline: one directory in, one committed project dir out.
//!
//! A run walks the tree once to learn which file extensions exist, fans the
//! matching extractors out across threads, then performs the atomic
//! project-dir rewrite: wipe, write schema blobs, build the search filter,
//! and stamp `version` last. Failure past the schema-write step removes the
//! project directory so readers never see a half-built corpus.

use crate::cancel::CancelToken;
use crate::error::{Aggregate, Error, Result};
use crate::extract::Registry;
use crate::schema;
use crate::search;
use crate::store;
use ahash::AHashSet;
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

/// Run every applicable extractor over `dir` and commit the results for
/// `project_name` under `data_dir`.
///
/// Partial failure is tolerated: a failing extractor contributes an error to
/// the aggregate while the other extractors' output is still written and
/// searchable. A failure in the search-indexing step (or cancellation) rolls
/// the whole project directory back.
pub fn run(
    cancel: &CancelToken,
    registry: &Registry,
    dir: &Path,
    data_dir: &Path,
    project_name: &str,
) -> Result<()> {
    store::ensure_data_dir(data_dir)?;

    let (indexes, mut errs) = index_dir(cancel, registry, dir)?;
    for (language, index) in &indexes {
        println!(
            "{}: indexed {} files ({} bytes) in {:.3}s",
            language, index.num_files, index.num_bytes, index.duration_seconds
        );
    }

    let index_data_dir = store::index_data_dir(data_dir);
    let project_dir = index_data_dir.join(store::encode_project_name(project_name));

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    if let Err(err) = store::write_indexes(project_name, &index_data_dir, &indexes) {
        errs.push(err);
    }

    match search::build(project_name, &index_data_dir, &indexes) {
        Ok(stats) => {
            println!(
                "search: indexed {} filter keys ({} search keys)",
                stats.filter_keys, stats.search_keys
            );
        }
        Err(err) => {
            errs.push(err);
            remove_project_dir(&project_dir, &mut errs);
            return errs.into_result();
        }
    }

    if cancel.is_cancelled() {
        remove_project_dir(&project_dir, &mut errs);
        errs.push(Error::Cancelled);
        return errs.into_result();
    }

    // The version stamp is the commit marker; its presence makes the
    // project visible to readers.
    if let Err(err) = fs::write(
        project_dir.join(store::VERSION_FILE_NAME),
        store::PROJECT_DIR_VERSION,
    ) {
        errs.push(err.into());
        remove_project_dir(&project_dir, &mut errs);
    }

    errs.into_result()
}

fn remove_project_dir(project_dir: &Path, errs: &mut Aggregate) {
    if let Err(err) = fs::remove_dir_all(project_dir) {
        if err.kind() != std::io::ErrorKind::NotFound {
            errs.push(err.into());
        }
    }
}

/// Run the extractors whose extensions appear in `dir`, concurrently.
///
/// Returns the per-language indexes that succeeded plus the errors of those
/// that did not; completion order is non-deterministic but the result map is
/// keyed, so callers see a stable view.
pub fn index_dir(
    cancel: &CancelToken,
    registry: &Registry,
    dir: &Path,
) -> Result<(BTreeMap<String, schema::Index>, Aggregate)> {
    let extensions = scan_extensions(cancel, dir)?;

    // Invert the registry to extension -> extractors, then schedule one run
    // per extractor whose extensions intersect the tree. Keyed by language
    // ID so an extractor advertising two present extensions runs once, and
    // the selection order is deterministic.
    let by_extension = registry.by_extension();
    let mut selected = BTreeMap::new();
    for ext in &extensions {
        if let Some(extractors) = by_extension.get(ext.as_str()) {
            for extractor in extractors {
                selected.insert(extractor.language().id, extractor.clone());
            }
        }
    }
    let selected: Vec<_> = selected.into_values().collect();

    let abs_dir = dir.canonicalize()?;
    let results = Mutex::new(BTreeMap::new());
    let errs = Mutex::new(Aggregate::new());

    selected.par_iter().for_each(|extractor| {
        let language_id = extractor.language().id;
        let start = Instant::now();
        match extractor.index(cancel, dir) {
            Ok(mut index) => {
                index.duration_seconds = start.elapsed().as_secs_f64();
                index.created_at =
                    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
                index.directory = abs_dir.to_string_lossy().into_owned();
                results.lock().unwrap().insert(language_id, index);
            }
            Err(err) => {
                errs.lock().unwrap().push(err);
            }
        }
    });

    Ok((
        results.into_inner().unwrap(),
        errs.into_inner().unwrap(),
    ))
}

/// Single pass over the tree collecting the set of file extensions present.
/// No exclusion rules here: which files matter is each extractor's call.
fn scan_extensions(cancel: &CancelToken, dir: &Path) -> Result<AHashSet<String>> {
    let mut extensions = AHashSet::new();
    let walker = WalkBuilder::new(dir).standard_filters(false).build();
    for entry in walker {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let entry = entry?;
        if let Some(ext) = entry.path().extension().and_then(|ext| ext.to_str()) {
            if !extensions.contains(ext) {
                extensions.insert(ext.to_string());
            }
        }
    }
    Ok(extensions)
}
