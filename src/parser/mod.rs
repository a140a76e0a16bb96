//! Language parsing: source bytes in, structural symbols out.
//!
//! Each language implements [`LanguageParser`]; a [`ParserRegistry`] maps
//! file extensions to implementations and is immutable after startup
//! registration. Tree-sitter backs the mainstream languages; markup and data
//! formats use purpose-built scanners.

pub mod data;
pub mod markdown;
pub mod treesitter;
pub mod web;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Result, SemIndexError};

/// Kind of a parsed structural unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Interface,
    Type,
    Const,
    Variable,
    Import,
    Package,
    Module,
    Element,
    Script,
    Style,
    Heading,
    CodeBlock,
    Link,
    Rule,
    Media,
    Keyframes,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Const => "const",
            Self::Variable => "variable",
            Self::Import => "import",
            Self::Package => "package",
            Self::Module => "module",
            Self::Element => "element",
            Self::Script => "script",
            Self::Style => "style",
            Self::Heading => "heading",
            Self::CodeBlock => "code_block",
            Self::Link => "link",
            Self::Rule => "rule",
            Self::Media => "media",
            Self::Keyframes => "keyframes",
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structural unit extracted from a source file.
///
/// Line numbers are 1-based and inclusive; byte offsets index into the
/// original source. `parent` is a qualified name referring to another symbol
/// of the same parse, used as a hint by the outline builder.
#[derive(Debug, Clone)]
pub struct ParsedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub parent: Option<String>,
    pub signature: Option<String>,
    pub visibility: Option<String>,
    pub package_name: Option<String>,
    pub doc: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub source_code: String,
}

impl ParsedSymbol {
    /// Qualified name: `parent.name` when a parent is declared.
    pub fn qualified_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{parent}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Everything extracted from one file.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    /// Language tag: "go", "python", "ts", "js", "rust", "html", "css",
    /// "vue", "md", "sql", "json".
    pub language: String,
    pub symbols: Vec<ParsedSymbol>,
    pub imports: Vec<String>,
    /// Leading file-level comment block, when one exists.
    pub file_doc: Option<String>,
}

/// Capability implemented once per language.
pub trait LanguageParser: Send + Sync {
    /// Extensions claimed by this parser, without the leading dot.
    fn supported_extensions(&self) -> &'static [&'static str];

    /// Parse source bytes into symbols, imports, and file docs.
    fn parse(&self, path: &Path, source: &[u8]) -> Result<ParseResult>;
}

/// Extension-keyed registry of language parsers. Populated at startup and
/// read-only afterwards.
pub struct ParserRegistry {
    by_extension: HashMap<String, Arc<dyn LanguageParser>>,
}

impl ParserRegistry {
    /// Empty registry for callers that want full control over registration.
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Registry with every built-in language registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        let parsers: Vec<Arc<dyn LanguageParser>> = vec![
            Arc::new(treesitter::RustParser),
            Arc::new(treesitter::GoParser),
            Arc::new(treesitter::PythonParser),
            Arc::new(treesitter::JavaScriptParser),
            Arc::new(treesitter::TypeScriptParser),
            Arc::new(markdown::MarkdownParser),
            Arc::new(web::HtmlParser),
            Arc::new(web::CssParser),
            Arc::new(web::VueParser),
            Arc::new(data::SqlParser),
            Arc::new(data::JsonParser),
        ];
        for parser in parsers {
            registry
                .register(parser)
                .expect("built-in parsers claim disjoint extensions");
        }
        registry
    }

    /// Register a parser for its claimed extensions. Extensions are globally
    /// unique; a clash is a startup configuration error.
    pub fn register(&mut self, parser: Arc<dyn LanguageParser>) -> Result<()> {
        for ext in parser.supported_extensions() {
            let key = ext.to_ascii_lowercase();
            if self.by_extension.contains_key(&key) {
                return Err(SemIndexError::Other(format!(
                    "extension .{key} already registered"
                )));
            }
            self.by_extension.insert(key, parser.clone());
        }
        Ok(())
    }

    /// Look up the parser for a path by extension.
    pub fn parser_for(&self, path: &Path) -> Option<&Arc<dyn LanguageParser>> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.by_extension.get(&ext)
    }

    /// Whether any parser claims this path's extension.
    pub fn supports(&self, path: &Path) -> bool {
        self.parser_for(path).is_some()
    }

    /// Parse a file, failing with `ParserUnsupported` when no parser claims
    /// the extension. The indexer treats that error as "fall back to line
    /// windows"; the outline surface reports it.
    pub fn parse(&self, path: &Path, source: &[u8]) -> Result<ParseResult> {
        let parser = self
            .parser_for(path)
            .ok_or_else(|| SemIndexError::ParserUnsupported(path.display().to_string()))?;
        parser.parse(path, source)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Attach a contiguous run of comment lines ending at `line - 1` to a symbol.
///
/// Shared by the hand-rolled scanners; the tree-sitter implementations walk
/// sibling comment nodes instead. `lines` are the raw source lines,
/// `is_comment` decides per trimmed line, `strip` removes the marker.
pub(crate) fn leading_comment_block(
    lines: &[&str],
    line: usize,
    is_comment: fn(&str) -> bool,
    strip: fn(&str) -> &str,
) -> Option<String> {
    if line < 2 {
        return None;
    }
    let mut collected: Vec<&str> = Vec::new();
    // line is 1-based; walk upwards from the line just above the symbol
    let mut idx = line - 2;
    loop {
        let trimmed = lines.get(idx)?.trim();
        if is_comment(trimmed) {
            collected.push(strip(trimmed).trim());
        } else {
            break;
        }
        if idx == 0 {
            break;
        }
        idx -= 1;
    }
    if collected.is_empty() {
        return None;
    }
    collected.reverse();
    Some(collected.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FakeParser(&'static [&'static str]);
    impl LanguageParser for FakeParser {
        fn supported_extensions(&self) -> &'static [&'static str] {
            self.0
        }
        fn parse(&self, _path: &Path, _source: &[u8]) -> Result<ParseResult> {
            Ok(ParseResult::default())
        }
    }

    #[test]
    fn test_registry_rejects_duplicate_extensions() {
        let mut registry = ParserRegistry::empty();
        registry.register(Arc::new(FakeParser(&["zz"]))).unwrap();
        assert!(registry.register(Arc::new(FakeParser(&["zz"]))).is_err());
    }

    #[test]
    fn test_registry_dispatches_by_extension() {
        let registry = ParserRegistry::with_defaults();
        assert!(registry.supports(Path::new("a.rs")));
        assert!(registry.supports(Path::new("a.go")));
        assert!(registry.supports(Path::new("a.md")));
        assert!(registry.supports(Path::new("dir/a.VUE")));
        assert!(!registry.supports(Path::new("a.xyz")));
        assert!(!registry.supports(Path::new("Makefile")));
    }

    #[test]
    fn test_unsupported_extension_is_reported() {
        let registry = ParserRegistry::with_defaults();
        let err = registry.parse(Path::new("a.xyz"), b"hello").unwrap_err();
        assert!(matches!(err, SemIndexError::ParserUnsupported(_)));
    }

    #[test]
    fn test_qualified_name() {
        let sym = ParsedSymbol {
            name: "new".into(),
            kind: SymbolKind::Method,
            parent: Some("User".into()),
            signature: None,
            visibility: None,
            package_name: None,
            doc: None,
            start_line: 1,
            end_line: 1,
            start_byte: 0,
            end_byte: 0,
            source_code: String::new(),
        };
        assert_eq!(sym.qualified_name(), "User.new");
    }

    #[test]
    fn test_leading_comment_block() {
        let src = "fn other() {}\n\n// first\n// second\nfn target() {}\n";
        let lines: Vec<&str> = src.lines().collect();
        let doc = leading_comment_block(
            &lines,
            5,
            |l| l.starts_with("//"),
            |l| l.trim_start_matches('/'),
        );
        assert_eq!(doc.unwrap(), "first\nsecond");

        // A blank line breaks the attachment
        let doc = leading_comment_block(
            &lines,
            2,
            |l| l.starts_with("//"),
            |l| l.trim_start_matches('/'),
        );
        assert!(doc.is_none());
    }
}
