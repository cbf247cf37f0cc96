use super::{strip_markup, Document};
use crate::config::IndexingConfig;
use uuid::Uuid;

/// The unit of retrieval: a contiguous span of a document embedded and
/// stored as a single vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Chunker-internal identifier. The stored point id is derived
    /// separately via [`chunk_point_id`].
    pub id: String,
    /// Chunk text with markup retained.
    pub content: String,
    /// Plaintext projection of the content.
    pub plain_text: String,
    pub title: String,
    pub section: String,
    pub section_path: String,
    pub tags: Vec<String>,
    pub start_offset: usize,
    pub end_offset: usize,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    Header,
    SlidingWindow,
    Hybrid,
}

impl ChunkStrategy {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "header" => Some(Self::Header),
            "sliding_window" => Some(Self::SlidingWindow),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub strategy: ChunkStrategy,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub window_size: usize,
    pub window_overlap: usize,
    pub include_title: bool,
    pub include_section_title: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Hybrid,
            min_chunk_size: 100,
            max_chunk_size: 1000,
            window_size: 500,
            window_overlap: 100,
            include_title: true,
            include_section_title: true,
        }
    }
}

impl ChunkerConfig {
    pub fn from_indexing(cfg: &IndexingConfig) -> Self {
        Self {
            strategy: ChunkStrategy::parse(&cfg.chunk_strategy).unwrap_or(ChunkStrategy::Hybrid),
            min_chunk_size: cfg.min_chunk_size,
            max_chunk_size: cfg.max_chunk_size,
            window_size: cfg.window_size,
            window_overlap: cfg.window_overlap,
            include_title: true,
            include_section_title: true,
        }
    }
}

/// Deterministic point id for a chunk: a v5 UUID over the DNS namespace of
/// `"{vault}:{relative_path}#{index}"`. Identical inputs always produce the
/// same id, which is what makes re-indexing idempotent.
pub fn chunk_point_id(vault_name: &str, relative_path: &str, chunk_index: usize) -> Uuid {
    let name = format!("{vault_name}:{relative_path}#{chunk_index}");
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes())
}

/// Split a document into chunks using the configured strategy. Chunking is a
/// pure function of the document and the parameters.
pub fn chunk_document(doc: &Document, config: &ChunkerConfig) -> Vec<Chunk> {
    match config.strategy {
        ChunkStrategy::Header => header_chunks(doc, config),
        ChunkStrategy::SlidingWindow => sliding_window_chunks(doc, config),
        ChunkStrategy::Hybrid => hybrid_chunks(doc, config),
    }
}

/// One chunk per non-empty section, with a breadcrumb of ancestor headings.
fn header_chunks(doc: &Document, config: &ChunkerConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut levels: Vec<String> = Vec::new();
    let path = doc.path.display().to_string();

    for (i, section) in doc.sections.iter().enumerate() {
        if section.level > 0 {
            let level = section.level as usize;
            levels.truncate(level - 1);
            while levels.len() < level - 1 {
                levels.push(String::new());
            }
            levels.push(section.title.clone());
        }

        let body = section.body();
        if body.trim().is_empty() {
            continue;
        }

        let section_path = breadcrumb(doc, &levels, config);

        chunks.push(Chunk {
            id: format!("{path}:{i}"),
            content: body.to_string(),
            plain_text: strip_markup(body),
            title: doc.title.clone(),
            section: section.title.clone(),
            section_path,
            tags: doc.tags.clone(),
            start_offset: section.start_offset,
            end_offset: section.end_offset,
            start_line: section.start_line,
            end_line: section.end_line,
        });
    }

    chunks
}

fn breadcrumb(doc: &Document, levels: &[String], config: &ChunkerConfig) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if config.include_title
        && !doc.title.is_empty()
        && levels.first().map(String::as_str) != Some(doc.title.as_str())
    {
        parts.push(&doc.title);
    }
    if config.include_section_title {
        parts.extend(levels.iter().filter(|l| !l.is_empty()).map(String::as_str));
    }
    parts.join(" > ")
}

/// Paragraph-accumulating window over the whole body.
fn sliding_window_chunks(doc: &Document, config: &ChunkerConfig) -> Vec<Chunk> {
    let path = doc.path.display().to_string();
    split_window(&doc.content, config)
        .into_iter()
        .enumerate()
        .map(|(i, content)| Chunk {
            id: format!("{path}:chunk_{i}"),
            plain_text: strip_markup(&content),
            content,
            title: doc.title.clone(),
            section: String::new(),
            section_path: String::new(),
            tags: doc.tags.clone(),
            start_offset: 0,
            end_offset: 0,
            start_line: 0,
            end_line: 0,
        })
        .collect()
}

/// Header chunks first; any chunk longer than `max_chunk_size` is re-split
/// with the sliding window, sub-chunks inheriting the parent's section info.
fn hybrid_chunks(doc: &Document, config: &ChunkerConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for parent in header_chunks(doc, config) {
        if parent.content.len() <= config.max_chunk_size {
            chunks.push(parent);
            continue;
        }

        for (j, content) in split_window(&parent.content, config).into_iter().enumerate() {
            chunks.push(Chunk {
                id: format!("{}:{j}", parent.id),
                plain_text: strip_markup(&content),
                content,
                title: parent.title.clone(),
                section: parent.section.clone(),
                section_path: parent.section_path.clone(),
                tags: parent.tags.clone(),
                start_offset: parent.start_offset,
                end_offset: parent.end_offset,
                start_line: parent.start_line,
                end_line: parent.end_line,
            });
        }
    }

    chunks
}

/// Accumulate double-newline-separated paragraphs into window-sized chunks.
///
/// Overlap policy: after a chunk is emitted the next buffer is seeded with
/// the final `window_overlap` bytes of it (snapped to a char boundary).
/// Emitted chunks never exceed `max_chunk_size + window_overlap` unless a
/// single paragraph is already larger than `max_chunk_size`, in which case
/// that paragraph is kept intact as its own chunk.
fn split_window(text: &str, config: &ChunkerConfig) -> Vec<String> {
    let max = config.max_chunk_size.max(1);
    let overlap = config.window_overlap.min(max.saturating_sub(1));
    let emit_threshold = max.saturating_sub(overlap);

    let mut chunks: Vec<String> = Vec::new();
    let mut buffer = String::new();
    // Whether the buffer holds anything beyond an overlap seed.
    let mut has_fresh = false;

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.len() > max {
            // Oversized paragraph: flush, then keep it intact.
            if has_fresh && !buffer.trim().is_empty() {
                chunks.push(std::mem::take(&mut buffer));
            }
            let seeded = overlap_tail(chunks.last().map(String::as_str), overlap);
            let chunk = if seeded.is_empty() {
                paragraph.to_string()
            } else {
                format!("{seeded}\n\n{paragraph}")
            };
            chunks.push(chunk);
            buffer = overlap_tail(chunks.last().map(String::as_str), overlap);
            has_fresh = false;
            continue;
        }

        let projected = if buffer.is_empty() {
            paragraph.len()
        } else {
            buffer.len() + 2 + paragraph.len()
        };

        if !buffer.is_empty()
            && projected > max
            && (buffer.len() >= emit_threshold || projected > max + overlap)
        {
            if has_fresh {
                chunks.push(buffer.clone());
            }
            buffer = overlap_tail(chunks.last().map(String::as_str), overlap);
            has_fresh = false;
        }

        if !buffer.is_empty() {
            buffer.push_str("\n\n");
        }
        buffer.push_str(paragraph);
        has_fresh = true;
    }

    if has_fresh && !buffer.trim().is_empty() {
        chunks.push(buffer);
    }

    chunks
}

/// Final `overlap` bytes of the previous chunk, snapped to a char boundary.
fn overlap_tail(previous: Option<&str>, overlap: usize) -> String {
    let Some(prev) = previous else {
        return String::new();
    };
    if overlap == 0 || prev.len() <= overlap {
        return String::new();
    }
    let mut start = prev.len() - overlap;
    while !prev.is_char_boundary(start) {
        start += 1;
    }
    prev[start..].trim_start().to_string()
}
