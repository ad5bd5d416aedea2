//! Build side of the search subsystem: schema indexes in, filter file out.

use super::hashing::fuzzy_key_set;
use super::{EntryRecord, FILTER_FILE_NAME};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::schema::{self, Page};
use crate::store::encode_project_name;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Counters reported back to the caller for its progress output.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildStats {
    /// Fuzzy hashes inserted into the filter.
    pub filter_keys: usize,
    /// Search keys (pages + sections) covered.
    pub search_keys: usize,
}

/// Build the search filter for a project and write it to
/// `<index_data_dir>/<encoded project>/search-index.sinter`.
///
/// Each page becomes one filter group: the fuzzy keys of the page and all of
/// its sections, with an [`EntryRecord`] payload listing every
/// `(search_key, id)` pair so the ranker can pick the best section within a
/// hit. Subpages are folded into the owning top-level page's path.
pub fn build(
    project_name: &str,
    index_data_dir: &Path,
    indexes: &BTreeMap<String, schema::Index>,
) -> Result<BuildStats> {
    let estimated_pages: usize = indexes
        .values()
        .flat_map(|index| index.libraries.iter())
        .map(|lib| lib.pages.len())
        .sum();
    let mut filter = Filter::new(estimated_pages * 64);
    let mut stats = BuildStats::default();

    for (language, index) in indexes {
        // Refuse to build search state over a schema this crate does not
        // understand; the pipeline rolls the whole project back.
        if index.schema_version != schema::SCHEMA_VERSION {
            return Err(Error::FilterBuild(format!(
                "{language}: schema version {:?} does not match {:?}",
                index.schema_version,
                schema::SCHEMA_VERSION
            )));
        }

        for library in &index.libraries {
            for page in &library.pages {
                insert_page(&mut filter, &mut stats, language, project_name, page, &page.path)?;
                insert_subpages(&mut filter, &mut stats, language, project_name, page)?;
            }
        }
    }

    let built = filter.build()?;

    let out_dir = index_data_dir.join(encode_project_name(project_name));
    fs::create_dir_all(&out_dir)?;
    built.write(&out_dir.join(FILTER_FILE_NAME))?;

    Ok(stats)
}

fn insert_subpages(
    filter: &mut Filter,
    stats: &mut BuildStats,
    language: &str,
    project_name: &str,
    page: &Page,
) -> Result<()> {
    for subpage in &page.subpages {
        // Subpages are addressed through the page that owns them.
        insert_page(filter, stats, language, project_name, subpage, &page.path)?;
        insert_subpages(filter, stats, language, project_name, subpage)?;
    }
    Ok(())
}

/// Insert one page (or subpage) as a single filter group.
fn insert_page(
    filter: &mut Filter,
    stats: &mut BuildStats,
    language: &str,
    project_name: &str,
    page: &Page,
    page_path: &str,
) -> Result<()> {
    let mut search_keys: Vec<Vec<String>> = Vec::new();
    let mut ids: Vec<String> = Vec::new();
    walk_page(page, &mut search_keys, &mut ids);

    // Ranking happens over the absolute key; only hashing sees it here.
    let absolute_keys: Vec<Vec<String>> = search_keys
        .iter()
        .map(|key| {
            let mut absolute = Vec::with_capacity(key.len() + 2);
            absolute.push(language.to_string());
            absolute.push(project_name.to_string());
            absolute.extend(key.iter().cloned());
            absolute
        })
        .collect();

    let fuzzy_keys = fuzzy_key_set(&absolute_keys);
    stats.filter_keys += fuzzy_keys.len();
    stats.search_keys += search_keys.len();

    let record = EntryRecord {
        language: language.to_string(),
        project_name: project_name.to_string(),
        search_keys,
        ids,
        page_path: page_path.to_string(),
    };
    let payload =
        bincode::serialize(&record).map_err(|err| Error::Serialize(err.to_string()))?;

    filter.insert(fuzzy_keys, payload);
    Ok(())
}

/// Flatten a page into `(search_key, id)` pairs in document order: the page
/// itself first (empty ID), then its sections depth-first.
fn walk_page(page: &Page, keys: &mut Vec<Vec<String>>, ids: &mut Vec<String>) {
    keys.push(page.search_key.clone());
    ids.push(String::new());

    fn walk_section(section: &schema::Section, keys: &mut Vec<Vec<String>>, ids: &mut Vec<String>) {
        keys.push(section.search_key.clone());
        ids.push(section.id.clone());
        for child in &section.children {
            walk_section(child, keys, ids);
        }
    }
    for section in &page.sections {
        walk_section(section, keys, ids);
    }
}
