//! On-disk layout and read paths.
//!
//! ```text
//! <data_dir>/
//!   version                     data-dir schema version (ASCII integer)
//!   autoindex                   JSON map: abs_path -> {"name": ...}
//!   index/
//!     <encoded_project>/
//!       version                 project-dir version, written last
//!       <lang_id>               schema JSON, one file per language
//!       search-index.sinter     the search filter
//! ```
//!
//! A project directory is valid iff its `version` file is present and holds
//! the current [`PROJECT_DIR_VERSION`]. Every write sequence begins by
//! removing the directory wholesale, so readers see either the previous
//! build or the finished new one, never a half-built corpus.

use crate::error::{Error, Result};
use crate::schema::{self, Index, Page};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::SystemTime;

/// Version of the whole data directory (`<data_dir>/version`). Bump when the
/// directory structure or the autoindex format changes.
pub const DATA_DIR_VERSION: &str = "1";

/// Version of a single project directory
/// (`<data_dir>/index/<project>/version`). Bump when search indexing or the
/// schema layout changes; mismatched projects are rebuilt or ignored.
pub const PROJECT_DIR_VERSION: &str = "1";

/// Name of the version stamp files.
pub const VERSION_FILE_NAME: &str = "version";

/// Name of the auto-index registry file.
pub const AUTOINDEX_FILE_NAME: &str = "autoindex";

/// Default data directory: `~/.doctree`.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".doctree")
}

/// The `index/` tree under a data directory.
pub fn index_data_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("index")
}

/// Make a project name filesystem-safe: `/` becomes `---`.
pub fn encode_project_name(name: &str) -> String {
    name.replace('/', "---")
}

/// Inverse of [`encode_project_name`].
pub fn decode_project_name(name: &str) -> String {
    name.replace("---", "/")
}

/// Encode a caller-supplied project name, rejecting anything that could
/// escape the index directory.
pub fn validate_project_name(name: &str) -> Result<String> {
    let encoded = encode_project_name(name);
    if encoded.contains('/') || encoded.contains("..") {
        return Err(Error::InvalidProjectName(name.to_string()));
    }
    Ok(encoded)
}

/// Create the data directory and its version stamp if missing.
pub fn ensure_data_dir(data_dir: &Path) -> Result<()> {
    let version_file = data_dir.join(VERSION_FILE_NAME);
    if !version_file.exists() {
        fs::create_dir_all(data_dir)?;
        fs::write(&version_file, DATA_DIR_VERSION)?;
    }
    Ok(())
}

/// True if the project directory carries the current version stamp.
pub fn project_dir_valid(project_dir: &Path) -> bool {
    matches!(
        fs::read_to_string(project_dir.join(VERSION_FILE_NAME)),
        Ok(version) if version == PROJECT_DIR_VERSION
    )
}

/// Decoded names of all projects under the index directory.
pub fn list_projects(index_data_dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(index_data_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut projects = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.path().is_dir() {
            projects.push(decode_project_name(&entry.file_name().to_string_lossy()));
        }
    }
    projects.sort();
    Ok(projects)
}

/// Wipe and rewrite the project directory with one schema JSON per
/// language. Old language blobs never survive (a project that had python+go
/// before but only go now must lose the python index).
pub fn write_indexes(
    project_name: &str,
    index_data_dir: &Path,
    indexes: &BTreeMap<String, Index>,
) -> Result<()> {
    let out_dir = index_data_dir.join(encode_project_name(project_name));

    if out_dir.exists() {
        fs::remove_dir_all(&out_dir)?;
    }
    fs::create_dir_all(&out_dir)?;

    for (language, index) in indexes {
        let file = fs::File::create(out_dir.join(language))?;
        serde_json::to_writer(file, index)
            .map_err(|err| Error::Serialize(err.to_string()))?;
    }
    Ok(())
}

/// All language indexes for a project.
///
/// Decoded indexes are cached process-wide keyed by file path; an entry is
/// valid only while the file's mtime is unchanged. Indexes are immutable
/// once cached, so concurrent requests share one `Arc<Index>`.
pub fn get_index(index_data_dir: &Path, project_name: &str) -> Result<BTreeMap<String, Arc<Index>>> {
    let encoded = validate_project_name(project_name)?;
    let project_dir = index_data_dir.join(encoded);
    if !project_dir_valid(&project_dir) {
        return Err(Error::NotFound(format!("project {project_name:?}")));
    }

    let mut indexes = BTreeMap::new();
    for entry in fs::read_dir(&project_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.path().is_dir()
            || name == VERSION_FILE_NAME
            || name == crate::search::FILTER_FILE_NAME
        {
            continue;
        }
        if let Some(index) = read_index_cached(&entry.path())? {
            indexes.insert(name, index);
        }
    }
    Ok(indexes)
}

/// Decode a schema file through the process-wide cache. Returns None for a
/// stale `schema_version`; such files are served only after a rebuild.
fn read_index_cached(path: &Path) -> Result<Option<Arc<Index>>> {
    static CACHE: OnceLock<RwLock<HashMap<PathBuf, (SystemTime, Arc<Index>)>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    let mtime = fs::metadata(path)?.modified()?;

    {
        let cache = cache.read().unwrap();
        if let Some((cached_mtime, index)) = cache.get(path) {
            if *cached_mtime == mtime {
                return Ok(Some(Arc::clone(index)));
            }
        }
    }

    let file = fs::File::open(path)?;
    let index: Index = serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|err| Error::Decode(format!("{}: {err}", path.display())))?;
    if index.schema_version != schema::SCHEMA_VERSION {
        return Ok(None);
    }

    let index = Arc::new(index);
    cache
        .write()
        .unwrap()
        .insert(path.to_path_buf(), (mtime, Arc::clone(&index)));
    Ok(Some(index))
}

/// Resolve a page (or any nested subpage) by its URL path.
pub fn get_page(
    index_data_dir: &Path,
    project_name: &str,
    language: &str,
    page_path: &str,
) -> Result<Page> {
    let indexes = get_index(index_data_dir, project_name)?;
    let index = indexes
        .get(language)
        .ok_or_else(|| Error::NotFound(format!("language {language:?} for this project")))?;

    for library in &index.libraries {
        for page in &library.pages {
            if let Some(found) = find_page(page, page_path) {
                return Ok(found.clone());
            }
        }
    }
    Err(Error::NotFound(format!("page {page_path:?}")))
}

fn find_page<'a>(page: &'a Page, path: &str) -> Option<&'a Page> {
    if page.path == path {
        return Some(page);
    }
    page.subpages
        .iter()
        .find_map(|subpage| find_page(subpage, path))
}

/// Same shape as [`get_index`] with `Page.detail` and `Page.sections`
/// stripped recursively: the page tree without the page contents.
pub fn list_index_summary(
    index_data_dir: &Path,
    project_name: &str,
) -> Result<BTreeMap<String, Index>> {
    let indexes = get_index(index_data_dir, project_name)?;

    let mut summary = BTreeMap::new();
    for (language, index) in indexes {
        let mut index = (*index).clone();
        for library in &mut index.libraries {
            for page in &mut library.pages {
                strip_page(page);
            }
        }
        summary.insert(language, index);
    }
    Ok(summary)
}

fn strip_page(page: &mut Page) {
    page.detail = String::new();
    page.sections = Vec::new();
    for subpage in &mut page.subpages {
        strip_page(subpage);
    }
}

/// A directory registered for automatic reindexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoIndexedProject {
    /// Project name the directory is indexed under.
    pub name: String,
}

/// Registered directories: absolute path -> project.
pub type AutoIndex = BTreeMap<String, AutoIndexedProject>;

static AUTOINDEX_LOCK: Mutex<()> = Mutex::new(());

/// Read the auto-index registry. A missing file is an empty registry; the
/// parent directory is created on demand. Historical files stored an array
/// instead of a map, so both forms decode.
pub fn read_auto_index(data_dir: &Path) -> Result<AutoIndex> {
    let _guard = AUTOINDEX_LOCK.lock().unwrap();
    read_auto_index_locked(data_dir)
}

/// Rewrite the auto-index registry wholesale, always in the map form.
pub fn write_auto_index(data_dir: &Path, projects: &AutoIndex) -> Result<()> {
    let _guard = AUTOINDEX_LOCK.lock().unwrap();
    write_auto_index_locked(data_dir, projects)
}

/// Register one directory under one read-modify-write cycle.
pub fn register_auto_index(data_dir: &Path, abs_path: &str, name: &str) -> Result<()> {
    let _guard = AUTOINDEX_LOCK.lock().unwrap();
    let mut projects = read_auto_index_locked(data_dir)?;
    projects.insert(
        abs_path.to_string(),
        AutoIndexedProject {
            name: name.to_string(),
        },
    );
    write_auto_index_locked(data_dir, &projects)
}

fn read_auto_index_locked(data_dir: &Path) -> Result<AutoIndex> {
    let path = data_dir.join(AUTOINDEX_FILE_NAME);
    let data = match fs::read_to_string(&path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(data_dir)?;
            return Ok(AutoIndex::new());
        }
        Err(err) => return Err(err.into()),
    };
    if data.trim().is_empty() {
        return Ok(AutoIndex::new());
    }

    let value: serde_json::Value = serde_json::from_str(&data)
        .map_err(|err| Error::Decode(format!("{}: {err}", path.display())))?;
    match value {
        serde_json::Value::Object(_) => Ok(serde_json::from_value(value)
            .map_err(|err| Error::Decode(format!("{}: {err}", path.display())))?),
        serde_json::Value::Array(items) => {
            // Array form: [{"path": ..., "name": ...}].
            let mut projects = AutoIndex::new();
            for item in items {
                let path = item.get("path").and_then(|v| v.as_str()).unwrap_or_default();
                let name = item.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                if !path.is_empty() {
                    projects.insert(
                        path.to_string(),
                        AutoIndexedProject {
                            name: name.to_string(),
                        },
                    );
                }
            }
            Ok(projects)
        }
        _ => Err(Error::Decode(format!(
            "{}: expected a map or array",
            path.display()
        ))),
    }
}

fn write_auto_index_locked(data_dir: &Path, projects: &AutoIndex) -> Result<()> {
    fs::create_dir_all(data_dir)?;
    let file = fs::File::create(data_dir.join(AUTOINDEX_FILE_NAME))?;
    serde_json::to_writer(file, projects).map_err(|err| Error::Serialize(err.to_string()))?;
    Ok(())
}
