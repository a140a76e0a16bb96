//! Chunking pipeline: parsed symbols become enriched, embeddable chunks.
//!
//! Each symbol is rendered as a deterministic metadata header plus its
//! (possibly collapsed) body. Small neighbours merge, oversized chunks
//! split on natural boundaries, and files without a parser fall back to
//! plain line windows. Every stage produces new immutable values.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::parser::{ParsedSymbol, ParserRegistry};

/// Estimated token count: one token per four UTF-8 bytes, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Chunking knobs, taken from the project configuration.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub max_chunk_size_tokens: usize,
    pub min_chunk_size_tokens: usize,
    pub collapse_threshold_tokens: usize,
    pub merge_small_chunks: bool,
    pub include_comments: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size_tokens: 800,
            min_chunk_size_tokens: 100,
            collapse_threshold_tokens: 600,
            merge_small_chunks: true,
            include_comments: true,
        }
    }
}

/// One immutable chunk produced by the pipeline. `content` is what the
/// embedder sees; `source_code` is the raw slice kept for display.
#[derive(Debug, Clone)]
pub struct CodeChunk {
    pub content: String,
    pub line_start: usize,
    pub line_end: usize,
    pub char_start: usize,
    pub char_end: usize,
    pub language: String,
    pub symbol_name: Option<String>,
    pub symbol_kind: Option<String>,
    pub parent: Option<String>,
    pub signature: Option<String>,
    pub visibility: Option<String>,
    pub package_name: Option<String>,
    pub doc_string: Option<String>,
    pub token_count: usize,
    pub is_collapsed: bool,
    pub source_code: Option<String>,
}

pub struct Chunker {
    config: ChunkerConfig,
    registry: Arc<ParserRegistry>,
}

impl Chunker {
    pub fn new(config: ChunkerConfig, registry: Arc<ParserRegistry>) -> Self {
        Self { config, registry }
    }

    /// Chunk one file. `relative_path` is the store key and flows into the
    /// enrichment header; `source` is the file content.
    pub fn chunk_file(&self, relative_path: &str, source: &str) -> Result<Vec<CodeChunk>> {
        let path = Path::new(relative_path);
        if !self.registry.supports(path) {
            return Ok(self.line_window_chunks(source));
        }

        let parsed = self.registry.parse(path, source.as_bytes())?;
        let mut chunks: Vec<CodeChunk> = parsed
            .symbols
            .iter()
            .map(|symbol| self.enrich(relative_path, &parsed.language, &parsed.imports, symbol))
            .collect();
        chunks.sort_by_key(|c| c.line_start);

        if self.config.merge_small_chunks {
            chunks = self.merge_small(chunks);
        }
        let chunks = chunks
            .into_iter()
            .flat_map(|c| self.split_large(c))
            .collect::<Vec<_>>();
        Ok(chunks)
    }

    /// Deterministic header + body used as the embeddable text.
    fn enrich(
        &self,
        relative_path: &str,
        language: &str,
        imports: &[String],
        symbol: &ParsedSymbol,
    ) -> CodeChunk {
        let mut header = String::new();
        header.push_str(&format!("FILE: {relative_path}\n"));
        header.push_str(&format!("LANGUAGE: {language}\n"));
        if let Some(pkg) = &symbol.package_name {
            header.push_str(&format!("PACKAGE: {pkg}\n"));
        }
        if !imports.is_empty() {
            header.push_str(&format!("IMPORTS: {}\n", imports.join(", ")));
        }
        header.push_str(&format!(
            "SYMBOL: {} {}\n",
            symbol.kind.as_str(),
            symbol.qualified_name()
        ));
        if let Some(parent) = &symbol.parent {
            header.push_str(&format!("PARENT: {parent}\n"));
        }
        if let Some(sig) = &symbol.signature {
            header.push_str(&format!("SIGNATURE: {sig}\n"));
        }
        if let Some(vis) = &symbol.visibility {
            header.push_str(&format!("VISIBILITY: {vis}\n"));
        }
        if self.config.include_comments {
            if let Some(doc) = &symbol.doc {
                header.push_str(&format!("DOC:\n{doc}\n"));
            }
        }
        header.push_str("---\n");

        let body = &symbol.source_code;
        let (body_text, is_collapsed) =
            if estimate_tokens(body) > self.config.collapse_threshold_tokens {
                (collapse_body(body), true)
            } else {
                (body.clone(), false)
            };

        let content = format!("{header}{body_text}");
        let token_count = estimate_tokens(&content);

        CodeChunk {
            content,
            line_start: symbol.start_line,
            line_end: symbol.end_line,
            char_start: symbol.start_byte,
            char_end: symbol.end_byte,
            language: language.to_string(),
            symbol_name: Some(symbol.name.clone()),
            symbol_kind: Some(symbol.kind.as_str().to_string()),
            parent: symbol.parent.clone(),
            signature: symbol.signature.clone(),
            visibility: symbol.visibility.clone(),
            package_name: symbol.package_name.clone(),
            doc_string: if self.config.include_comments {
                symbol.doc.clone()
            } else {
                None
            },
            token_count,
            is_collapsed,
            source_code: Some(symbol.source_code.clone()),
        }
    }

    /// Fuse runs of adjacent small chunks sharing a parent, left to right,
    /// stopping before the token budget would be exceeded.
    fn merge_small(&self, chunks: Vec<CodeChunk>) -> Vec<CodeChunk> {
        let mut out: Vec<CodeChunk> = Vec::with_capacity(chunks.len());
        let mut run: Vec<CodeChunk> = Vec::new();

        let flush = |run: &mut Vec<CodeChunk>, out: &mut Vec<CodeChunk>| {
            if run.is_empty() {
                return;
            }
            if run.len() == 1 {
                out.push(run.pop().unwrap());
                return;
            }
            out.push(fuse(std::mem::take(run)));
        };

        for chunk in chunks {
            let small = chunk.token_count < self.config.min_chunk_size_tokens;
            let fits_run = run
                .last()
                .map(|prev: &CodeChunk| prev.parent == chunk.parent)
                .unwrap_or(true);
            let run_tokens: usize = run.iter().map(|c| c.token_count).sum();
            let would_overflow =
                run_tokens + chunk.token_count > self.config.max_chunk_size_tokens;

            if small && fits_run && !would_overflow {
                run.push(chunk);
            } else {
                flush(&mut run, &mut out);
                if small {
                    run.push(chunk);
                } else {
                    out.push(chunk);
                }
            }
        }
        flush(&mut run, &mut out);
        out
    }

    /// Split an oversized chunk on blank lines, falling back to single
    /// lines, never mid-line. Splits inherit metadata with adjusted ranges.
    fn split_large(&self, chunk: CodeChunk) -> Vec<CodeChunk> {
        if chunk.token_count <= self.config.max_chunk_size_tokens {
            return vec![chunk];
        }

        let lines: Vec<&str> = chunk.content.lines().collect();
        let mut pieces: Vec<(usize, usize)> = Vec::new(); // (line index from, to-exclusive)
        let mut start = 0usize;
        let mut tokens = 0usize;
        let mut last_blank: Option<usize> = None;

        for (i, line) in lines.iter().enumerate() {
            let line_tokens = estimate_tokens(line) + 1;
            if tokens + line_tokens > self.config.max_chunk_size_tokens && i > start {
                // Prefer the nearest blank line boundary inside the window
                let cut = match last_blank {
                    Some(b) if b > start => b,
                    _ => i,
                };
                pieces.push((start, cut));
                start = cut;
                tokens = lines[start..=i.min(lines.len() - 1)]
                    .iter()
                    .map(|l| estimate_tokens(l) + 1)
                    .sum();
                last_blank = None;
            } else {
                tokens += line_tokens;
            }
            if line.trim().is_empty() {
                last_blank = Some(i + 1);
            }
        }
        if start < lines.len() {
            pieces.push((start, lines.len()));
        }

        let total_lines = chunk.line_end.saturating_sub(chunk.line_start) + 1;
        let content_lines = lines.len().max(1);

        pieces
            .into_iter()
            .filter(|(from, to)| to > from)
            .map(|(from, to)| {
                let content = lines[from..to].join("\n");
                // Map content line offsets back onto the source range
                let line_start =
                    chunk.line_start + (from * total_lines) / content_lines;
                let line_end =
                    (chunk.line_start + ((to - 1) * total_lines) / content_lines)
                        .min(chunk.line_end);
                let token_count = estimate_tokens(&content);
                CodeChunk {
                    content,
                    line_start,
                    line_end: line_end.max(line_start),
                    token_count,
                    is_collapsed: false,
                    ..chunk.clone()
                }
            })
            .collect()
    }

    /// Fallback for unsupported file types: consecutive windows of whole
    /// lines, each at most the token budget, with no symbol metadata.
    fn line_window_chunks(&self, source: &str) -> Vec<CodeChunk> {
        let lines: Vec<&str> = source.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut tokens = 0usize;
        let mut char_start = 0usize;
        let mut char_cursor = 0usize;

        for (i, line) in lines.iter().enumerate() {
            let line_tokens = estimate_tokens(line) + 1;
            if tokens + line_tokens > self.config.max_chunk_size_tokens && i > start {
                let content = lines[start..i].join("\n");
                chunks.push(line_window_chunk(content, start, i, char_start, char_cursor));
                start = i;
                char_start = char_cursor;
                tokens = 0;
            }
            tokens += line_tokens;
            char_cursor += line.len() + 1;
        }
        if start < lines.len() {
            let content = lines[start..].join("\n");
            chunks.push(line_window_chunk(
                content,
                start,
                lines.len(),
                char_start,
                source.len(),
            ));
        }
        chunks
    }
}

fn line_window_chunk(
    content: String,
    start_index: usize,
    end_index: usize,
    char_start: usize,
    char_end: usize,
) -> CodeChunk {
    let token_count = estimate_tokens(&content);
    CodeChunk {
        content,
        line_start: start_index + 1,
        line_end: end_index,
        char_start,
        char_end,
        language: String::new(),
        symbol_name: None,
        symbol_kind: None,
        parent: None,
        signature: None,
        visibility: None,
        package_name: None,
        doc_string: None,
        token_count,
        is_collapsed: false,
        source_code: None,
    }
}

/// Replace a long body's interior with a placeholder, keeping the signature
/// line and outer delimiters for brace languages.
fn collapse_body(body: &str) -> String {
    if let (Some(open), Some(close)) = (body.find('{'), body.rfind('}')) {
        if close > open {
            let elided = body[open + 1..close].lines().count().saturating_sub(1);
            let prefix = body[..open].trim_end();
            return format!("{prefix} {{ ... /* {elided} lines elided */ ... }}");
        }
    }
    // Non-brace languages keep the first line
    let first = body.lines().next().unwrap_or("");
    let elided = body.lines().count().saturating_sub(1);
    format!("{first}\n... ({elided} lines elided)")
}

/// Merge a run of chunks into one. Line range spans the run; the kind is
/// the most common one in the run.
fn fuse(run: Vec<CodeChunk>) -> CodeChunk {
    let line_start = run.iter().map(|c| c.line_start).min().unwrap_or(1);
    let line_end = run.iter().map(|c| c.line_end).max().unwrap_or(line_start);
    let char_start = run.iter().map(|c| c.char_start).min().unwrap_or(0);
    let char_end = run.iter().map(|c| c.char_end).max().unwrap_or(0);

    let mut kind_counts: std::collections::HashMap<&str, usize> =
        std::collections::HashMap::new();
    for chunk in &run {
        if let Some(kind) = &chunk.symbol_kind {
            *kind_counts.entry(kind.as_str()).or_default() += 1;
        }
    }
    let symbol_kind = kind_counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(kind, _)| kind.to_string());

    let content = run
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let token_count = estimate_tokens(&content);
    let first = &run[0];

    CodeChunk {
        content,
        line_start,
        line_end,
        char_start,
        char_end,
        language: first.language.clone(),
        symbol_name: Some("<merged>".to_string()),
        symbol_kind,
        parent: first.parent.clone(),
        signature: None,
        visibility: None,
        package_name: first.package_name.clone(),
        doc_string: None,
        token_count,
        is_collapsed: false,
        source_code: None,
    }
}
