pub mod chunker;


use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

pub use chunker::{chunk_point_id, Chunk, ChunkStrategy, ChunkerConfig};

/// A parsed markdown note. Rebuilt from the file bytes on every indexing
/// pass; the file itself is the source of truth.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub path: PathBuf,
    pub title: String,
    pub content: String,
    pub frontmatter: BTreeMap<String, Value>,
    pub sections: Vec<Section>,
    pub tags: Vec<String>,
}

/// A contiguous region of a document delimited by ATX headings. The content
/// span includes the heading line itself, so that section contents tile the
/// whole body.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub level: u8,
    pub content: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub start_line: usize,
    pub end_line: usize,
}

impl Section {
    /// Section text with the heading line stripped. For a level-0 section
    /// there is no heading line and the full content is returned.
    pub fn body(&self) -> &str {
        if self.level == 0 {
            return &self.content;
        }
        match self.content.find('\n') {
            Some(pos) => &self.content[pos + 1..],
            None => "",
        }
    }
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(#{1,6})[ \t]+(.+)$").expect("valid heading regex"))
}

fn inline_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\s)#([A-Za-z][A-Za-z0-9_-]*)").expect("valid tag regex")
    })
}

/// Parse raw markdown into a `Document`: frontmatter, sections, title, tags.
pub fn parse(raw: &str) -> Document {
    let (frontmatter, body) = extract_frontmatter(raw);

    let mut doc = Document {
        content: body.to_string(),
        ..Document::default()
    };

    if let Some(fm) = frontmatter {
        if let Some(Value::String(title)) = fm.get("title") {
            doc.title = title.clone();
        }
        doc.tags = frontmatter_tags(&fm);
        doc.frontmatter = fm;
    }

    doc.sections = parse_sections(body);

    if doc.title.is_empty() {
        if let Some(first) = doc.sections.iter().find(|s| s.level > 0) {
            doc.title = first.title.clone();
        }
    }

    for tag in extract_inline_tags(body) {
        if !doc.tags.contains(&tag) {
            doc.tags.push(tag);
        }
    }

    doc
}

/// Parse a file's bytes, attaching its path.
pub fn parse_file(raw: &str, path: PathBuf) -> Document {
    let mut doc = parse(raw);
    doc.path = path;
    doc
}

/// Extract a YAML-like frontmatter fence from the start of the content.
/// Returns the parsed mapping (if present) and the remaining body.
fn extract_frontmatter(raw: &str) -> (Option<BTreeMap<String, Value>>, &str) {
    let Some(rest) = raw.strip_prefix("---\n").or_else(|| raw.strip_prefix("---\r\n")) else {
        return (None, raw);
    };

    let Some(end) = rest.find("\n---\n").or_else(|| rest.find("\n---\r\n")) else {
        return (None, raw);
    };

    let fence = &rest[..end];
    let after = &rest[end + 1..];
    let body = match after.find('\n') {
        Some(pos) => &after[pos + 1..],
        None => "",
    };

    (Some(parse_frontmatter_block(fence)), body)
}

/// Parse the fenced block. YAML is tried first; on failure the block is read
/// line-wise as `key: value` scalars with the tags special case.
fn parse_frontmatter_block(fence: &str) -> BTreeMap<String, Value> {
    if let Ok(serde_yaml::Value::Mapping(mapping)) =
        serde_yaml::from_str::<serde_yaml::Value>(fence)
    {
        let mut map = BTreeMap::new();
        for (key, value) in mapping {
            if let serde_yaml::Value::String(key) = key {
                if let Ok(json) = serde_json::to_value(&value) {
                    map.insert(key, json);
                }
            }
        }
        return map;
    }

    let mut map = BTreeMap::new();
    for line in fence.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() {
            continue;
        }

        if key == "tags" && value.starts_with('[') && value.ends_with(']') {
            let inner = &value[1..value.len() - 1];
            let tags: Vec<Value> = inner
                .split(',')
                .map(|t| Value::String(t.trim().trim_matches(['"', '\'']).to_string()))
                .filter(|t| t.as_str().is_some_and(|s| !s.is_empty()))
                .collect();
            map.insert(key.to_string(), Value::Array(tags));
        } else {
            map.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    map
}

/// Tags from frontmatter: either a list or a single string.
fn frontmatter_tags(fm: &BTreeMap<String, Value>) -> Vec<String> {
    match fm.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(tag)) if !tag.is_empty() => vec![tag.clone()],
        _ => Vec::new(),
    }
}

/// Split a body into sections at ATX headings. Text before the first heading
/// becomes a level-0 preamble section; a body with no headings yields a
/// single level-0 section spanning everything. Section contents concatenate
/// back to the body byte-for-byte.
fn parse_sections(body: &str) -> Vec<Section> {
    let mut boundaries: Vec<(usize, u8, String)> = Vec::new();
    for caps in heading_regex().captures_iter(body) {
        let whole = caps.get(0).expect("match present");
        let level = caps.get(1).expect("level group").as_str().len() as u8;
        let title = caps.get(2).expect("title group").as_str().trim().to_string();
        boundaries.push((whole.start(), level, title));
    }

    let mut sections = Vec::new();

    if boundaries.is_empty() {
        sections.push(make_section(body, String::new(), 0, 0, body.len()));
        return sections;
    }

    if boundaries[0].0 > 0 {
        sections.push(make_section(body, String::new(), 0, 0, boundaries[0].0));
    }

    for (i, (start, level, title)) in boundaries.iter().enumerate() {
        let end = boundaries
            .get(i + 1)
            .map_or(body.len(), |(next, _, _)| *next);
        sections.push(make_section(body, title.clone(), *level, *start, end));
    }

    sections
}

fn make_section(body: &str, title: String, level: u8, start: usize, end: usize) -> Section {
    let start_line = body[..start].bytes().filter(|b| *b == b'\n').count() + 1;
    let end_line = body[..end].bytes().filter(|b| *b == b'\n').count() + 1;
    Section {
        title,
        level,
        content: body[start..end].to_string(),
        start_offset: start,
        end_offset: end,
        start_line,
        end_line,
    }
}

/// Collect inline `#tag` tokens, skipping fenced code blocks.
fn extract_inline_tags(body: &str) -> Vec<String> {
    let stripped = strip_code_fences(body);
    let mut tags = Vec::new();
    for caps in inline_tag_regex().captures_iter(&stripped) {
        if let Some(tag) = caps.get(1) {
            let tag = tag.as_str().to_string();
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    tags
}

/// Replace the contents of fenced code blocks with blank lines so offsets of
/// the surrounding text are preserved for other scans.
fn strip_code_fences(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut in_fence = false;
    for line in body.split_inclusive('\n') {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.push('\n');
            continue;
        }
        if in_fence {
            out.push('\n');
        } else {
            out.push_str(line);
        }
    }
    out
}

/// Best-effort plaintext projection of markdown content: code fences, heading
/// markers, emphasis, and link syntax are removed, text is kept.
pub fn strip_markup(content: &str) -> String {
    static LINK_RE: OnceLock<Regex> = OnceLock::new();
    let link_re =
        LINK_RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid link regex"));

    let mut out = String::with_capacity(content.len());
    let mut in_fence = false;
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let line = trimmed
            .trim_start_matches('#')
            .trim_start_matches(['>', '-', '*'])
            .trim_start();
        let line = link_re.replace_all(line, "$1");
        let line: String = line
            .chars()
            .filter(|c| !matches!(c, '*' | '`' | '_'))
            .collect();

        if !line.trim().is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(line.trim());
        }
    }
    out
}
