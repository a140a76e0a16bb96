//! Markdown structure parser.
//!
//! Headings are the backbone: each heading's range extends to the line
//! before the next heading of the same or a higher level (or EOF), which is
//! what lets the outline builder fold the document by containment. Fenced
//! code blocks and links attach to their containing heading.

use std::path::Path;

use crate::error::Result;

use super::{LanguageParser, ParseResult, ParsedSymbol, SymbolKind};

pub struct MarkdownParser;

impl LanguageParser for MarkdownParser {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["md", "markdown"]
    }

    fn parse(&self, _path: &Path, source: &[u8]) -> Result<ParseResult> {
        let text = String::from_utf8_lossy(source);
        let lines: Vec<&str> = text.lines().collect();

        let mut result = ParseResult {
            language: "md".to_string(),
            ..Default::default()
        };

        let headings = scan_headings(&lines);

        // Byte offset of the start of each line, for symbol byte ranges
        let mut line_offsets = Vec::with_capacity(lines.len() + 1);
        let mut offset = 0usize;
        for line in &lines {
            line_offsets.push(offset);
            offset += line.len() + 1;
        }
        line_offsets.push(text.len());

        let byte_range = |start_line: usize, end_line: usize| -> (usize, usize) {
            let start = line_offsets[start_line - 1];
            let end = line_offsets
                .get(end_line)
                .copied()
                .unwrap_or(text.len())
                .saturating_sub(1)
                .max(start);
            (start, end.min(text.len()))
        };

        for heading in &headings {
            let (start_byte, end_byte) = byte_range(heading.start_line, heading.end_line);
            result.symbols.push(ParsedSymbol {
                name: heading.title.clone(),
                kind: SymbolKind::Heading,
                parent: heading.parent.clone(),
                signature: Some(format!("{} {}", "#".repeat(heading.level), heading.title)),
                visibility: None,
                package_name: None,
                doc: None,
                start_line: heading.start_line,
                end_line: heading.end_line,
                start_byte,
                end_byte,
                source_code: slice_lines(&lines, heading.start_line, heading.end_line),
            });
        }

        // Fenced code blocks and links, attached to the containing heading
        let containing = |line: usize| -> Option<String> {
            headings
                .iter()
                .filter(|h| h.start_line <= line && line <= h.end_line)
                .max_by_key(|h| h.level)
                .map(|h| h.title.clone())
        };

        let mut i = 0usize;
        while i < lines.len() {
            let line_no = i + 1;
            let trimmed = lines[i].trim_start();
            if let Some(rest) = trimmed.strip_prefix("```") {
                let lang_tag = rest.trim();
                let fence_start = line_no;
                let mut j = i + 1;
                while j < lines.len() && !lines[j].trim_start().starts_with("```") {
                    j += 1;
                }
                let fence_end = (j + 1).min(lines.len());
                let name = if lang_tag.is_empty() {
                    "code".to_string()
                } else {
                    lang_tag.to_string()
                };
                let (start_byte, end_byte) = byte_range(fence_start, fence_end);
                result.symbols.push(ParsedSymbol {
                    name,
                    kind: SymbolKind::CodeBlock,
                    parent: containing(fence_start),
                    signature: None,
                    visibility: None,
                    package_name: None,
                    doc: None,
                    start_line: fence_start,
                    end_line: fence_end,
                    start_byte,
                    end_byte,
                    source_code: slice_lines(&lines, fence_start, fence_end),
                });
                i = fence_end;
                continue;
            }

            for (text_part, url) in scan_links(lines[i]) {
                let (start_byte, end_byte) = byte_range(line_no, line_no);
                result.symbols.push(ParsedSymbol {
                    name: text_part,
                    kind: SymbolKind::Link,
                    parent: containing(line_no),
                    signature: Some(url),
                    visibility: None,
                    package_name: None,
                    doc: None,
                    start_line: line_no,
                    end_line: line_no,
                    start_byte,
                    end_byte,
                    source_code: lines[i].to_string(),
                });
            }
            i += 1;
        }

        result.symbols.sort_by_key(|s| (s.start_line, usize::MAX - s.end_line));

        // Text before the first heading doubles as the file doc
        let first_heading_line = headings.first().map(|h| h.start_line).unwrap_or(usize::MAX);
        let preamble: Vec<&str> = lines
            .iter()
            .take(first_heading_line.saturating_sub(1))
            .copied()
            .filter(|l| !l.trim().is_empty())
            .collect();
        if !preamble.is_empty() {
            result.file_doc = Some(preamble.join("\n"));
        }

        Ok(result)
    }
}

struct HeadingSpan {
    title: String,
    level: usize,
    start_line: usize,
    end_line: usize,
    parent: Option<String>,
}

/// ATX headings with ranges extending to the next heading of the same or a
/// higher level, or EOF. Fenced regions are opaque so `# comments` inside
/// code blocks are not mistaken for headings.
fn scan_headings(lines: &[&str]) -> Vec<HeadingSpan> {
    let mut raw: Vec<(usize, usize, String)> = Vec::new(); // (line, level, title)
    let mut in_fence = false;
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let level = trimmed.chars().take_while(|&c| c == '#').count();
        if level >= 1 && level <= 6 {
            let after = &trimmed[level..];
            if after.starts_with(' ') || after.is_empty() {
                raw.push((i + 1, level, after.trim().trim_end_matches('#').trim().to_string()));
            }
        }
    }

    let mut spans = Vec::with_capacity(raw.len());
    for (idx, (line, level, title)) in raw.iter().enumerate() {
        let end_line = raw[idx + 1..]
            .iter()
            .find(|(_, next_level, _)| next_level <= level)
            .map(|(next_line, _, _)| next_line - 1)
            .unwrap_or(lines.len());
        // Nearest previous heading with a smaller level contains this one
        let parent = raw[..idx]
            .iter()
            .rev()
            .find(|(_, prev_level, _)| prev_level < level)
            .map(|(_, _, prev_title)| prev_title.clone());
        spans.push(HeadingSpan {
            title: title.clone(),
            level: *level,
            start_line: *line,
            end_line,
            parent,
        });
    }
    spans
}

/// Inline links `[text](url)` on one line. Images (`![...]`) are skipped.
fn scan_links(line: &str) -> Vec<(String, String)> {
    let bytes = line.as_bytes();
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'[' && (i == 0 || bytes[i - 1] != b'!') {
            if let Some(close) = line[i..].find(']').map(|p| i + p) {
                if bytes.get(close + 1) == Some(&b'(') {
                    if let Some(paren) = line[close..].find(')').map(|p| close + p) {
                        let text = line[i + 1..close].to_string();
                        let url = line[close + 2..paren].to_string();
                        if !text.is_empty() && !url.is_empty() {
                            out.push((text, url));
                        }
                        i = paren + 1;
                        continue;
                    }
                }
            }
        }
        i += 1;
    }
    out
}

fn slice_lines(lines: &[&str], start_line: usize, end_line: usize) -> String {
    lines[start_line - 1..end_line.min(lines.len())].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(src: &str) -> ParseResult {
        MarkdownParser
            .parse(Path::new("README.md"), src.as_bytes())
            .unwrap()
    }

    #[test]
    fn test_heading_ranges_extend_to_same_level() {
        let src = "# Title\n\nintro\n\n## Setup\n\nsteps\n\n## Usage\n\nmore\n";
        let result = parse(src);
        let headings: Vec<&ParsedSymbol> = result
            .symbols
            .iter()
            .filter(|s| s.kind == SymbolKind::Heading)
            .collect();
        assert_eq!(headings.len(), 3);

        let title = headings.iter().find(|h| h.name == "Title").unwrap();
        assert_eq!(title.start_line, 1);
        assert_eq!(title.end_line, 11); // EOF: no other h1

        let setup = headings.iter().find(|h| h.name == "Setup").unwrap();
        assert_eq!(setup.start_line, 5);
        assert_eq!(setup.end_line, 8); // stops before "## Usage"
        assert_eq!(setup.parent.as_deref(), Some("Title"));

        let usage = headings.iter().find(|h| h.name == "Usage").unwrap();
        assert_eq!(usage.end_line, 11);
    }

    #[test]
    fn test_two_headings_two_symbols() {
        let src = "# One\n\ntext\n\n# Two\n\ntext\n";
        let result = parse(src);
        assert_eq!(result.symbols.len(), 2);
        assert!(result.symbols.iter().all(|s| s.kind == SymbolKind::Heading));
    }

    #[test]
    fn test_code_block_attaches_to_heading() {
        let src = "# Docs\n\n```rust\nfn main() {}\n```\n";
        let result = parse(src);
        let block = result
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::CodeBlock)
            .unwrap();
        assert_eq!(block.name, "rust");
        assert_eq!(block.parent.as_deref(), Some("Docs"));
        assert_eq!(block.start_line, 3);
        assert_eq!(block.end_line, 5);
        assert!(block.source_code.contains("fn main"));
    }

    #[test]
    fn test_hash_inside_fence_is_not_a_heading() {
        let src = "# Real\n\n```sh\n# comment, not a heading\n```\n";
        let result = parse(src);
        let headings: Vec<_> = result
            .symbols
            .iter()
            .filter(|s| s.kind == SymbolKind::Heading)
            .collect();
        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].name, "Real");
    }

    #[test]
    fn test_links_extracted_with_urls() {
        let src = "# Refs\n\nSee [the docs](https://example.com/docs) and [src](./src).\n";
        let result = parse(src);
        let links: Vec<_> = result
            .symbols
            .iter()
            .filter(|s| s.kind == SymbolKind::Link)
            .collect();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].name, "the docs");
        assert_eq!(links[0].signature.as_deref(), Some("https://example.com/docs"));
        assert_eq!(links[0].parent.as_deref(), Some("Refs"));
    }

    #[test]
    fn test_preamble_becomes_file_doc() {
        let src = "A library for things.\n\n# Intro\n";
        let result = parse(src);
        assert_eq!(result.file_doc.as_deref(), Some("A library for things."));
    }
}
