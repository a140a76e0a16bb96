//! Data-format parsers: SQL scripts and JSON documents.
//!
//! SQL is chunked at statement granularity with DDL names surfaced; JSON
//! surfaces its top-level keys so configuration files become navigable.

use std::path::Path;

use crate::error::Result;

use super::{LanguageParser, ParseResult, ParsedSymbol, SymbolKind};

pub struct SqlParser;

impl LanguageParser for SqlParser {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["sql"]
    }

    fn parse(&self, _path: &Path, source: &[u8]) -> Result<ParseResult> {
        let text = String::from_utf8_lossy(source);
        let mut result = ParseResult {
            language: "sql".to_string(),
            ..Default::default()
        };

        let lines: Vec<&str> = text.lines().collect();
        for stmt in split_statements(&text) {
            let Some((kind, name)) = classify_statement(&stmt.text) else {
                continue;
            };
            let doc = super::leading_comment_block(
                &lines,
                stmt.start_line,
                |l| l.starts_with("--"),
                |l| l.trim_start_matches('-'),
            );
            result.symbols.push(ParsedSymbol {
                name,
                kind,
                parent: None,
                signature: Some(first_line(&stmt.text)),
                visibility: None,
                package_name: None,
                doc,
                start_line: stmt.start_line,
                end_line: stmt.end_line,
                start_byte: stmt.start_byte,
                end_byte: stmt.end_byte,
                source_code: stmt.text,
            });
        }
        Ok(result)
    }
}

struct Statement {
    text: String,
    start_line: usize,
    end_line: usize,
    start_byte: usize,
    end_byte: usize,
}

/// Split on `;` outside string literals and comments.
fn split_statements(text: &str) -> Vec<Statement> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut stmt_start = 0usize;
    let mut line = 1usize;
    let mut stmt_start_line = 1usize;
    let mut i = 0usize;

    let mut flush = |start: usize, end: usize, start_line: usize, end_line: usize, out: &mut Vec<Statement>| {
        let raw = &text[start..end];
        // Drop leading whitespace and `--` comment lines so the statement
        // starts at its first keyword.
        let mut offset = 0usize;
        loop {
            let rest = &raw[offset..];
            let ws = rest.len() - rest.trim_start().len();
            offset += ws;
            let rest = &raw[offset..];
            if rest.starts_with("--") {
                match rest.find('\n') {
                    Some(p) => offset += p + 1,
                    None => {
                        offset = raw.len();
                        break;
                    }
                }
            } else {
                break;
            }
        }
        let trimmed = raw[offset..].trim_end();
        if trimmed.is_empty() {
            return;
        }
        let skipped_lines = raw[..offset].matches('\n').count();
        out.push(Statement {
            text: trimmed.to_string(),
            start_line: start_line + skipped_lines,
            end_line,
            start_byte: start + offset,
            end_byte: start + offset + trimmed.len(),
        });
    };

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                line += 1;
                i += 1;
            }
            b'\'' | b'"' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\n' {
                        line += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b';' => {
                flush(stmt_start, i + 1, stmt_start_line, line, &mut out);
                i += 1;
                stmt_start = i;
                stmt_start_line = line;
            }
            _ => i += 1,
        }
    }
    flush(stmt_start, text.len(), stmt_start_line, line, &mut out);
    out
}

/// Surface DDL with a name; DML statements keep their verb as the name.
fn classify_statement(stmt: &str) -> Option<(SymbolKind, String)> {
    let upper = stmt.to_ascii_uppercase();
    let words: Vec<&str> = stmt.split_whitespace().collect();

    let name_after = |keyword_count: usize| -> Option<String> {
        words
            .get(keyword_count)
            .map(|w| w.trim_matches(['`', '"', '(', ';']).to_string())
    };

    if upper.starts_with("CREATE TABLE") || upper.starts_with("CREATE VIEW") {
        let skip = if upper.contains("IF NOT EXISTS") { 5 } else { 2 };
        return Some((SymbolKind::Struct, name_after(skip)?));
    }
    if upper.starts_with("CREATE FUNCTION")
        || upper.starts_with("CREATE PROCEDURE")
        || upper.starts_with("CREATE TRIGGER")
    {
        return Some((SymbolKind::Function, name_after(2)?));
    }
    if upper.starts_with("CREATE INDEX") || upper.starts_with("CREATE UNIQUE INDEX") {
        let skip = if upper.starts_with("CREATE UNIQUE") { 3 } else { 2 };
        return Some((SymbolKind::Variable, name_after(skip)?));
    }
    if upper.starts_with("ALTER ") || upper.starts_with("DROP ") {
        return Some((SymbolKind::Variable, name_after(2)?));
    }
    // SELECT/INSERT/UPDATE/... still become retrievable statements
    words
        .first()
        .map(|w| (SymbolKind::Variable, w.to_ascii_lowercase()))
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").trim().to_string()
}

pub struct JsonParser;

impl LanguageParser for JsonParser {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["json", "jsonc"]
    }

    fn parse(&self, _path: &Path, source: &[u8]) -> Result<ParseResult> {
        let text = String::from_utf8_lossy(source);
        let mut result = ParseResult {
            language: "json".to_string(),
            ..Default::default()
        };

        // Top-level keys of a root object; depth tracking keeps nested keys out
        let bytes = text.as_bytes();
        let mut depth = 0i32;
        let mut line = 1usize;
        let mut i = 0usize;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => {
                    line += 1;
                    i += 1;
                }
                b'{' | b'[' => {
                    depth += 1;
                    i += 1;
                }
                b'}' | b']' => {
                    depth -= 1;
                    i += 1;
                }
                b'"' => {
                    let key_start = i;
                    let key_start_line = line;
                    i += 1;
                    let mut escaped = false;
                    while i < bytes.len() {
                        match bytes[i] {
                            b'\\' if !escaped => escaped = true,
                            b'"' if !escaped => break,
                            b'\n' => {
                                line += 1;
                                escaped = false;
                            }
                            _ => escaped = false,
                        }
                        i += 1;
                    }
                    let key_end = i;
                    i += 1;
                    // A key is a string at depth 1 followed by ':'
                    if depth == 1 {
                        let mut j = i;
                        while j < bytes.len() && (bytes[j] as char).is_whitespace() {
                            j += 1;
                        }
                        if bytes.get(j) == Some(&b':') {
                            let name = text[key_start + 1..key_end].to_string();
                            let value_end = value_end_from(bytes, j + 1);
                            let end_line = line + text[i..value_end].matches('\n').count();
                            result.symbols.push(ParsedSymbol {
                                name,
                                kind: SymbolKind::Variable,
                                parent: None,
                                signature: None,
                                visibility: None,
                                package_name: None,
                                doc: None,
                                start_line: key_start_line,
                                end_line,
                                start_byte: key_start,
                                end_byte: value_end,
                                source_code: text[key_start..value_end].to_string(),
                            });
                        }
                    }
                }
                _ => i += 1,
            }
        }
        Ok(result)
    }
}

/// End byte of the JSON value starting after `from` (exclusive of the
/// trailing comma).
fn value_end_from(bytes: &[u8], from: usize) -> usize {
    let mut i = from;
    // skip whitespace
    while i < bytes.len() && (bytes[i] as char).is_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return bytes.len();
    }
    match bytes[i] {
        b'{' | b'[' => {
            let open = bytes[i];
            let close = if open == b'{' { b'}' } else { b']' };
            let mut depth = 0usize;
            let mut in_string = false;
            let mut escaped = false;
            while i < bytes.len() {
                let b = bytes[i];
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if b == b'\\' {
                        escaped = true;
                    } else if b == b'"' {
                        in_string = false;
                    }
                } else if b == b'"' {
                    in_string = true;
                } else if b == open {
                    depth += 1;
                } else if b == close {
                    depth -= 1;
                    if depth == 0 {
                        return i + 1;
                    }
                }
                i += 1;
            }
            bytes.len()
        }
        b'"' => {
            i += 1;
            let mut escaped = false;
            while i < bytes.len() {
                match bytes[i] {
                    b'\\' if !escaped => escaped = true,
                    b'"' if !escaped => return i + 1,
                    _ => escaped = false,
                }
                i += 1;
            }
            bytes.len()
        }
        _ => {
            while i < bytes.len() && !matches!(bytes[i], b',' | b'}' | b']' | b'\n') {
                i += 1;
            }
            i
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sql_create_table_and_index() {
        let src = "-- schema\nCREATE TABLE users (\n  id INTEGER PRIMARY KEY\n);\n\nCREATE INDEX idx_users_name ON users(name);\n";
        let result = SqlParser.parse(Path::new("schema.sql"), src.as_bytes()).unwrap();

        let table = result.symbols.iter().find(|s| s.name == "users").unwrap();
        assert_eq!(table.kind, SymbolKind::Struct);
        assert_eq!(table.start_line, 2);
        assert_eq!(table.end_line, 4);
        assert_eq!(table.doc.as_deref(), Some("schema"));

        let index = result
            .symbols
            .iter()
            .find(|s| s.name == "idx_users_name")
            .unwrap();
        assert_eq!(index.kind, SymbolKind::Variable);
    }

    #[test]
    fn test_sql_if_not_exists() {
        let src = "CREATE TABLE IF NOT EXISTS logs (id INTEGER);\n";
        let result = SqlParser.parse(Path::new("x.sql"), src.as_bytes()).unwrap();
        assert_eq!(result.symbols[0].name, "logs");
    }

    #[test]
    fn test_sql_semicolon_in_string_does_not_split() {
        let src = "INSERT INTO t VALUES ('a;b');\nCREATE TABLE t2 (x INTEGER);\n";
        let result = SqlParser.parse(Path::new("x.sql"), src.as_bytes()).unwrap();
        assert_eq!(result.symbols.len(), 2);
        assert!(result.symbols.iter().any(|s| s.name == "t2"));
    }

    #[test]
    fn test_json_top_level_keys() {
        let src = "{\n  \"name\": \"pkg\",\n  \"scripts\": {\n    \"build\": \"make\"\n  },\n  \"version\": \"1.0\"\n}\n";
        let result = JsonParser.parse(Path::new("package.json"), src.as_bytes()).unwrap();
        let names: Vec<&str> = result.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["name", "scripts", "version"]);

        let scripts = result.symbols.iter().find(|s| s.name == "scripts").unwrap();
        assert_eq!(scripts.start_line, 3);
        assert_eq!(scripts.end_line, 5);
        assert!(scripts.source_code.contains("build"));
    }
}
