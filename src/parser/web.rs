//! Markup and stylesheet parsers: HTML, CSS, and Vue single-file components.
//!
//! All tags and rules are reported, not just "semantic" ones; duplicate
//! names (every `div`) are disambiguated downstream by line-range
//! containment. Vue files produce three root section symbols and delegate
//! each section's body to the HTML/JS/CSS parsers with a line offset.

use std::path::Path;

use crate::error::Result;

use super::{treesitter, LanguageParser, ParseResult, ParsedSymbol, SymbolKind};

/// Elements that never take a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Byte offset of each line start, for mapping offsets to 1-based lines.
fn line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

fn line_of(starts: &[usize], byte: usize) -> usize {
    match starts.binary_search(&byte) {
        Ok(i) => i + 1,
        Err(i) => i,
    }
}

// === HTML ===

pub struct HtmlParser;

impl LanguageParser for HtmlParser {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["html", "htm"]
    }

    fn parse(&self, _path: &Path, source: &[u8]) -> Result<ParseResult> {
        let text = String::from_utf8_lossy(source).into_owned();
        let mut result = ParseResult {
            language: "html".to_string(),
            ..Default::default()
        };
        result.symbols = scan_html(&text);
        Ok(result)
    }
}

struct OpenTag {
    name: String,
    symbol_index: usize,
}

/// Single-pass tag scanner. Every element becomes a symbol; attributes flow
/// into the signature. Unbalanced markup closes at EOF rather than failing.
fn scan_html(text: &str) -> Vec<ParsedSymbol> {
    let starts = line_starts(text);
    let bytes = text.as_bytes();
    let mut symbols: Vec<ParsedSymbol> = Vec::new();
    let mut stack: Vec<OpenTag> = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        // Comments and doctype
        if text[i..].starts_with("<!--") {
            i = text[i..].find("-->").map(|p| i + p + 3).unwrap_or(bytes.len());
            continue;
        }
        if bytes.get(i + 1) == Some(&b'!') {
            i = text[i..].find('>').map(|p| i + p + 1).unwrap_or(bytes.len());
            continue;
        }

        let closing = bytes.get(i + 1) == Some(&b'/');
        let name_start = if closing { i + 2 } else { i + 1 };
        let name_end = text[name_start..]
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '-' && c != ':')
            .map(|p| name_start + p)
            .unwrap_or(bytes.len());
        let name = text[name_start..name_end].to_ascii_lowercase();
        if name.is_empty() {
            i += 1;
            continue;
        }

        // Scan to the tag end, respecting quoted attribute values
        let mut j = name_end;
        let mut quote: Option<u8> = None;
        while j < bytes.len() {
            match (quote, bytes[j]) {
                (Some(q), b) if b == q => quote = None,
                (None, b'"') | (None, b'\'') => quote = Some(bytes[j]),
                (None, b'>') => break,
                _ => {}
            }
            j += 1;
        }
        let tag_end = (j + 1).min(bytes.len());

        if closing {
            // Pop back to the matching open tag; interleaved tags close
            // everything above the match.
            if let Some(pos) = stack.iter().rposition(|t| t.name == name) {
                for open in stack.drain(pos..).rev() {
                    finalize_element(&mut symbols, open.symbol_index, tag_end, text, &starts);
                }
            }
            i = tag_end;
            continue;
        }

        let self_closing =
            text[name_end..j].trim_end().ends_with('/') || VOID_ELEMENTS.contains(&name.as_str());
        let attrs = text[name_end..j].trim().trim_end_matches('/').trim();
        let kind = match name.as_str() {
            "script" => SymbolKind::Script,
            "style" => SymbolKind::Style,
            _ => SymbolKind::Element,
        };
        let parent = stack.last().and_then(|t| {
            symbols.get(t.symbol_index).map(|s: &ParsedSymbol| s.name.clone())
        });
        let start_line = line_of(&starts, i);
        let symbol = ParsedSymbol {
            name: name.clone(),
            kind,
            parent,
            signature: if attrs.is_empty() {
                None
            } else {
                Some(attrs.to_string())
            },
            visibility: None,
            package_name: None,
            doc: None,
            start_line,
            end_line: start_line,
            start_byte: i,
            end_byte: tag_end,
            source_code: text[i..tag_end].to_string(),
        };
        symbols.push(symbol);

        if self_closing {
            i = tag_end;
            continue;
        }
        // Raw-text elements swallow everything to their closing tag
        if matches!(name.as_str(), "script" | "style") {
            let close = format!("</{name}");
            let content_end = text[tag_end..]
                .to_ascii_lowercase()
                .find(&close)
                .map(|p| tag_end + p)
                .unwrap_or(bytes.len());
            let after = text[content_end..]
                .find('>')
                .map(|p| content_end + p + 1)
                .unwrap_or(bytes.len());
            let idx = symbols.len() - 1;
            finalize_element(&mut symbols, idx, after, text, &starts);
            i = after;
            continue;
        }
        stack.push(OpenTag {
            name,
            symbol_index: symbols.len() - 1,
        });
        i = tag_end;
    }

    // Anything left open runs to EOF
    for open in stack.drain(..).rev() {
        finalize_element(&mut symbols, open.symbol_index, text.len(), text, &starts);
    }

    symbols.sort_by_key(|s| (s.start_line, usize::MAX - s.end_line));
    symbols
}

fn finalize_element(
    symbols: &mut [ParsedSymbol],
    index: usize,
    end_byte: usize,
    text: &str,
    starts: &[usize],
) {
    if let Some(sym) = symbols.get_mut(index) {
        sym.end_byte = end_byte;
        sym.end_line = line_of(starts, end_byte.saturating_sub(1).max(sym.start_byte));
        sym.source_code = text[sym.start_byte..end_byte].to_string();
    }
}

// === CSS ===

pub struct CssParser;

impl LanguageParser for CssParser {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["css", "scss", "less"]
    }

    fn parse(&self, _path: &Path, source: &[u8]) -> Result<ParseResult> {
        let text = String::from_utf8_lossy(source).into_owned();
        let mut result = ParseResult {
            language: "css".to_string(),
            ..Default::default()
        };
        scan_css(&text, 0, text.len(), None, &mut result);
        result
            .symbols
            .sort_by_key(|s| (s.start_line, usize::MAX - s.end_line));
        Ok(result)
    }
}

/// Scan `text[from..to]` for rules. At-rules with blocks (`@media`,
/// `@keyframes`) recurse with themselves as parent.
fn scan_css(text: &str, from: usize, to: usize, parent: Option<&str>, result: &mut ParseResult) {
    let starts = line_starts(text);
    let bytes = text.as_bytes();
    let mut i = from;
    let mut selector_start = from;

    while i < to {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = text[i..].find("*/").map(|p| i + p + 2).unwrap_or(to);
                selector_start = i;
            }
            b';' => {
                // Block-less at-rule, e.g. @import
                let stmt = text[selector_start..i].trim();
                if let Some(rest) = stmt.strip_prefix("@import") {
                    result
                        .imports
                        .push(rest.trim().trim_matches(['"', '\'']).to_string());
                }
                i += 1;
                selector_start = i;
            }
            b'{' => {
                let selector = text[selector_start..i].trim().to_string();
                let block_end = matching_brace(bytes, i, to);
                let start_byte = selector_start + text[selector_start..i]
                    .find(|c: char| !c.is_whitespace())
                    .unwrap_or(0);
                let start_line = line_of(&starts, start_byte);
                let end_line = line_of(&starts, block_end.saturating_sub(1));

                let (kind, recurse) = if selector.starts_with("@media") {
                    (SymbolKind::Media, true)
                } else if selector.starts_with("@keyframes") {
                    (SymbolKind::Keyframes, true)
                } else if selector.starts_with('@') {
                    (SymbolKind::Rule, false)
                } else {
                    (SymbolKind::Rule, false)
                };

                if !selector.is_empty() {
                    result.symbols.push(ParsedSymbol {
                        name: selector.clone(),
                        kind,
                        parent: parent.map(String::from),
                        signature: Some(selector.clone()),
                        visibility: None,
                        package_name: None,
                        doc: None,
                        start_line,
                        end_line,
                        start_byte,
                        end_byte: block_end,
                        source_code: text[start_byte..block_end].to_string(),
                    });
                    if recurse {
                        scan_css(text, i + 1, block_end.saturating_sub(1), Some(&selector), result);
                    }
                }
                i = block_end;
                selector_start = i;
            }
            _ => i += 1,
        }
    }
}

/// Index just past the brace matching `bytes[open]`.
fn matching_brace(bytes: &[u8], open: usize, to: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < to {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    to
}

// === Vue single-file components ===

pub struct VueParser;

impl LanguageParser for VueParser {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["vue"]
    }

    fn parse(&self, path: &Path, source: &[u8]) -> Result<ParseResult> {
        let text = String::from_utf8_lossy(source).into_owned();
        let mut result = ParseResult {
            language: "vue".to_string(),
            ..Default::default()
        };

        for section in ["template", "script", "style"] {
            let Some(span) = find_section(&text, section) else {
                continue;
            };
            let starts = line_starts(&text);
            let start_line = line_of(&starts, span.outer_start);
            let end_line = line_of(&starts, span.outer_end.saturating_sub(1));

            result.symbols.push(ParsedSymbol {
                name: section.to_string(),
                kind: match section {
                    "script" => SymbolKind::Script,
                    "style" => SymbolKind::Style,
                    _ => SymbolKind::Element,
                },
                parent: None,
                signature: if span.attrs.is_empty() {
                    None
                } else {
                    Some(span.attrs.clone())
                },
                visibility: None,
                package_name: None,
                doc: None,
                start_line,
                end_line,
                start_byte: span.outer_start,
                end_byte: span.outer_end,
                source_code: text[span.outer_start..span.outer_end].to_string(),
            });

            // Delegate the section body with a line offset applied to the
            // produced children. Only direct roots of the delegate parse
            // adopt the section as parent; deeper nesting keeps the
            // delegate's own hierarchy.
            let inner = &text[span.inner_start..span.inner_end];
            let line_offset = line_of(&starts, span.inner_start) - 1;
            let delegated = match section {
                "template" => HtmlParser.parse(path, inner.as_bytes())?,
                "script" => {
                    let ts = span.attrs.contains("lang=\"ts\"") || span.attrs.contains("lang='ts'");
                    let mut sub = ParseResult::default();
                    let tree_lang = if ts {
                        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
                    } else {
                        tree_sitter_javascript::LANGUAGE.into()
                    };
                    let mut parser = tree_sitter::Parser::new();
                    if parser.set_language(&tree_lang).is_ok() {
                        if let Some(tree) = parser.parse(inner.as_bytes(), None) {
                            treesitter::extract_js_like(
                                tree.root_node(),
                                inner.as_bytes(),
                                ts,
                                &mut sub,
                            );
                        }
                    }
                    sub
                }
                _ => CssParser.parse(path, inner.as_bytes())?,
            };

            result.imports.extend(delegated.imports);
            for mut sym in delegated.symbols {
                if sym.parent.is_none() {
                    sym.parent = Some(section.to_string());
                }
                sym.start_line += line_offset;
                sym.end_line += line_offset;
                sym.start_byte += span.inner_start;
                sym.end_byte = (sym.end_byte + span.inner_start).min(span.inner_end);
                result.symbols.push(sym);
            }
        }

        result
            .symbols
            .sort_by_key(|s| (s.start_line, usize::MAX - s.end_line));
        Ok(result)
    }
}

struct SectionSpan {
    outer_start: usize,
    outer_end: usize,
    inner_start: usize,
    inner_end: usize,
    attrs: String,
}

/// Locate a top-level `<section ...>...</section>` pair.
fn find_section(text: &str, section: &str) -> Option<SectionSpan> {
    let open_prefix = format!("<{section}");
    let close_tag = format!("</{section}>");
    let mut search_from = 0usize;

    loop {
        let open = text[search_from..].find(&open_prefix)? + search_from;
        // Must be a real tag boundary, not e.g. <style-loader
        let after = text.as_bytes().get(open + open_prefix.len());
        if !matches!(after, Some(b'>') | Some(b' ') | Some(b'\n') | Some(b'\t')) {
            search_from = open + open_prefix.len();
            continue;
        }
        let tag_close = text[open..].find('>')? + open;
        let inner_start = tag_close + 1;
        let inner_end = text[inner_start..].find(&close_tag)? + inner_start;
        let outer_end = inner_end + close_tag.len();
        let attrs = text[open + open_prefix.len()..tag_close].trim().to_string();
        return Some(SectionSpan {
            outer_start: open,
            outer_end,
            inner_start,
            inner_end,
            attrs,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_html_reports_all_tags() {
        let src = "<html>\n<body>\n<div class=\"box\">\n<span>hi</span>\n</div>\n<br/>\n</body>\n</html>\n";
        let result = HtmlParser.parse(Path::new("a.html"), src.as_bytes()).unwrap();
        let names: Vec<&str> = result.symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"html"));
        assert!(names.contains(&"body"));
        assert!(names.contains(&"div"));
        assert!(names.contains(&"span"));
        assert!(names.contains(&"br"));

        let div = result.symbols.iter().find(|s| s.name == "div").unwrap();
        assert_eq!(div.signature.as_deref(), Some("class=\"box\""));
        assert_eq!(div.parent.as_deref(), Some("body"));
        assert_eq!(div.start_line, 3);
        assert_eq!(div.end_line, 5);

        let span = result.symbols.iter().find(|s| s.name == "span").unwrap();
        assert_eq!(span.parent.as_deref(), Some("div"));
    }

    #[test]
    fn test_html_script_and_style_kinds() {
        let src = "<script src=\"x.js\"></script>\n<style>body { color: red; }</style>\n";
        let result = HtmlParser.parse(Path::new("a.html"), src.as_bytes()).unwrap();
        let script = result.symbols.iter().find(|s| s.name == "script").unwrap();
        assert_eq!(script.kind, SymbolKind::Script);
        let style = result.symbols.iter().find(|s| s.name == "style").unwrap();
        assert_eq!(style.kind, SymbolKind::Style);
    }

    #[test]
    fn test_css_rules_media_keyframes() {
        let src = "body { margin: 0; }\n\n@media (max-width: 600px) {\n  .nav { display: none; }\n}\n\n@keyframes spin {\n  from { transform: rotate(0); }\n}\n";
        let result = CssParser.parse(Path::new("a.css"), src.as_bytes()).unwrap();

        let body = result.symbols.iter().find(|s| s.name == "body").unwrap();
        assert_eq!(body.kind, SymbolKind::Rule);

        let media = result
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Media)
            .unwrap();
        assert!(media.name.starts_with("@media"));

        let nav = result.symbols.iter().find(|s| s.name == ".nav").unwrap();
        assert_eq!(nav.parent.as_deref(), Some(media.name.as_str()));

        let spin = result
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Keyframes)
            .unwrap();
        assert!(spin.name.contains("spin"));
    }

    #[test]
    fn test_css_import_collection() {
        let src = "@import \"base.css\";\n\na { color: blue; }\n";
        let result = CssParser.parse(Path::new("a.css"), src.as_bytes()).unwrap();
        assert_eq!(result.imports, vec!["base.css"]);
    }

    #[test]
    fn test_vue_three_sections_with_delegation() {
        let src = r#"<template>
  <div class="app">
    <span>{{ msg }}</span>
  </div>
</template>

<script>
export function setup() {
  return { msg: "hi" };
}
</script>

<style>
.app { padding: 4px; }
</style>
"#;
        let result = VueParser.parse(Path::new("App.vue"), src.as_bytes()).unwrap();
        assert_eq!(result.language, "vue");

        let template = result.symbols.iter().find(|s| s.name == "template").unwrap();
        assert_eq!(template.kind, SymbolKind::Element);
        assert_eq!(template.parent, None);

        // Direct roots of each section adopt the section as parent
        let div = result.symbols.iter().find(|s| s.name == "div").unwrap();
        assert_eq!(div.parent.as_deref(), Some("template"));
        // Deeper nesting keeps the delegate hierarchy
        let span = result.symbols.iter().find(|s| s.name == "span").unwrap();
        assert_eq!(span.parent.as_deref(), Some("div"));

        let setup = result.symbols.iter().find(|s| s.name == "setup").unwrap();
        assert_eq!(setup.kind, SymbolKind::Function);
        assert_eq!(setup.parent.as_deref(), Some("script"));
        // Line offsets map into the .vue file, not the inner script
        assert_eq!(setup.start_line, 8);

        let app_rule = result.symbols.iter().find(|s| s.name == ".app").unwrap();
        assert_eq!(app_rule.parent.as_deref(), Some("style"));
        assert_eq!(app_rule.start_line, 14);
    }
}
