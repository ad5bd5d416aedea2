//! Markdown extractor: one page per `.md` file, one section per heading.

use super::Extractor;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::schema::{self, Index, Library, Page, Section};
use ignore::WalkBuilder;
use std::fs;
use std::path::Path;

pub struct MarkdownExtractor;

impl Extractor for MarkdownExtractor {
    fn language(&self) -> schema::Language {
        schema::Language::markdown()
    }

    fn extensions(&self) -> &[&str] {
        &["md"]
    }

    fn index(&self, cancel: &CancelToken, dir: &Path) -> Result<Index> {
        // Hidden files and gitignored trees are this extractor's own
        // exclusion policy; the pipeline imposes none.
        let mut sources: Vec<std::path::PathBuf> = Vec::new();
        for entry in WalkBuilder::new(dir).build() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
                if let Ok(rel) = path.strip_prefix(dir) {
                    sources.push(rel.to_path_buf());
                }
            }
        }
        sources.sort();

        let mut num_files = 0;
        let mut num_bytes = 0;
        let mut pages = Vec::with_capacity(sources.len());
        for rel_path in &sources {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let content = match fs::read_to_string(dir.join(rel_path)) {
                Ok(content) => content,
                // Unreadable or non-UTF-8 files are skipped, not fatal.
                Err(_) => continue,
            };
            num_files += 1;
            num_bytes += content.len();

            pages.push(markdown_to_page(&content, &rel_path.to_string_lossy()));
        }

        let library_name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Index {
            schema_version: schema::SCHEMA_VERSION.to_string(),
            language: self.language(),
            num_files,
            num_bytes,
            libraries: vec![Library {
                name: library_name,
                pages,
                ..Default::default()
            }],
            ..Default::default()
        })
    }
}

fn markdown_to_page(content: &str, path: &str) -> Page {
    let (matter_title, rest) = parse_frontmatter(content);

    let (primary, sections, first_header) = markdown_to_sections(rest, 1, &matter_title);

    let mut page_title = if matter_title.is_empty() {
        first_header
    } else {
        matter_title
    };
    let mut search_key = header_search_key(&page_title, "");
    if page_title.is_empty() {
        // Fall back to the file path; paths get no search key.
        page_title = path.to_string();
        search_key = Vec::new();
    }

    Page {
        path: path.to_string(),
        title: page_title,
        detail: primary,
        search_key,
        sections,
        subpages: Vec::new(),
    }
}

/// Strip a leading `---` frontmatter block and pull a title out of it.
/// Only the `name:`/`title:` keys are consumed, so a full YAML parser is
/// not warranted; `name` wins when both are present.
fn parse_frontmatter(content: &str) -> (String, &str) {
    let Some(after_open) = content.strip_prefix("---\n") else {
        return (String::new(), content);
    };
    let Some(close) = after_open.find("\n---\n") else {
        return (String::new(), content);
    };
    let matter = &after_open[..close];
    let rest = &after_open[close + "\n---\n".len()..];

    let mut title = String::new();
    let mut name = String::new();
    for line in matter.lines() {
        if let Some(value) = line.strip_prefix("name:") {
            name = unquote(value);
        } else if let Some(value) = line.strip_prefix("title:") {
            title = unquote(value);
        }
    }
    let matter_title = if name.is_empty() { title } else { name };
    (matter_title, rest)
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches(|c| c == '"' || c == '\'').to_string()
}

/// Split `content` into the text before any heading of `level` ("primary
/// content") and one section per heading, recursing into deeper levels.
/// Also reports the first top-level heading so a document like
/// `# ziglearn` can use it as the page title.
fn markdown_to_sections(
    content: &str,
    level: usize,
    page_title: &str,
) -> (String, Vec<Section>, String) {
    let section_prefix = format!("{} ", "#".repeat(level));

    // Group lines: a heading line of this level starts a new group that
    // includes the heading itself.
    let mut groups: Vec<Vec<&str>> = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    for line in content.split('\n') {
        if line.starts_with(&section_prefix) {
            if !lines.is_empty() {
                groups.push(std::mem::take(&mut lines));
            }
        }
        lines.push(line);
    }
    if !lines.is_empty() {
        groups.push(lines);
    }

    let mut title = page_title.to_string();
    let mut primary = String::new();
    let mut sections: Vec<Section> = Vec::new();
    let mut first_header = String::new();

    for group in groups {
        let name = group[0].strip_prefix(&section_prefix).unwrap_or("");

        if level == 1 && name.is_empty() {
            // Content before any heading in the document.
            let (sub_primary, sub_sections, _) =
                markdown_to_sections(&group.join("\n"), level + 1, &title);
            primary = sub_primary;
            sections.extend(sub_sections);
            continue;
        } else if name.is_empty() {
            primary = group.join("\n");
            continue;
        }

        if level == 1 && first_header.is_empty() {
            // The first top-level heading names the whole page; its body is
            // the page's own content, not a section.
            first_header = name.to_string();
            if title.is_empty() {
                title = first_header.clone();
            }
            let (sub_primary, sub_sections, _) =
                markdown_to_sections(&group[1..].join("\n"), level + 1, &title);
            primary = sub_primary;
            sections.extend(sub_sections);
            continue;
        }

        let (sub_primary, sub_sections, _) =
            markdown_to_sections(&group[1..].join("\n"), level + 1, &title);

        sections.push(Section {
            id: name.to_string(),
            category: false,
            short_label: name.to_string(),
            label: name.to_string(),
            detail: sub_primary,
            search_key: header_search_key(&title, name),
            children: sub_sections,
        });
    }

    if sections.is_empty() && level < 6 {
        // The document skips this heading level ("# a" followed by "### b").
        // Retry one level deeper until something sticks.
        let nonlinear = primary.split('\n').any(|line| line.starts_with('#'));
        if nonlinear {
            return markdown_to_sections(content, level + 1, &title);
        }
    }
    (primary, sections, first_header)
}

/// Search key of a heading: `["#", " ", <field>, " ", <field>, ...]` over
/// the whitespace-split fields of `"<page title> > <heading>"`.
fn header_search_key(page_title: &str, section: &str) -> Vec<String> {
    let name = join_names(page_title, section);
    let fields: Vec<&str> = name.split_whitespace().collect();

    let mut key = Vec::with_capacity(2 + fields.len() * 2);
    key.push("#".to_string());
    key.push(" ".to_string());
    for (i, field) in fields.iter().enumerate() {
        key.push(field.to_string());
        if i != fields.len() - 1 {
            key.push(" ".to_string());
        }
    }
    key
}

/// Join a page title and heading, truncating both so the rendered
/// `# title > heading` label stays near 60 characters.
fn join_names(page_title: &str, section: &str) -> String {
    let limit = 60 - "# ".len() - " > ".len();
    if page_title.len() + section.len() < limit {
        if !section.is_empty() {
            return format!("{page_title} > {section}");
        }
        return page_title.to_string();
    }
    let limit = limit / 2;
    let page_title = truncate_chars(page_title, limit);
    let section = truncate_chars(section, limit);
    if !section.is_empty() {
        return format!("{page_title} > {section}");
    }
    page_title.to_string()
}

/// Truncate to at most `limit` bytes, never splitting a character.
fn truncate_chars(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
