//! Tree-sitter backed language parsers: Rust, Go, Python, JavaScript,
//! TypeScript.
//!
//! Scope rules shared by all implementations: variables and constants are
//! extracted at top level only, methods carry their container as `parent`,
//! and a contiguous comment block immediately above a symbol becomes its
//! doc. A `tree_sitter::Parser` is created per parse call; parser state is
//! not `Sync` and construction is cheap.

use std::path::Path;

use tree_sitter::{Language, Node, Parser};

use crate::error::{Result, SemIndexError};

use super::{LanguageParser, ParseResult, ParsedSymbol, SymbolKind};

fn parse_tree(language: &Language, source: &[u8], tag: &str) -> Result<tree_sitter::Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(language)
        .map_err(|e| SemIndexError::Other(format!("load {tag} grammar: {e}")))?;
    parser
        .parse(source, None)
        .ok_or_else(|| SemIndexError::Other(format!("{tag} parse produced no tree")))
}

fn node_text<'a>(node: Node<'_>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// First line of a node's text, cut before the body opener. Good enough as a
/// display signature across the brace languages.
fn signature_of(node: Node<'_>, source: &[u8]) -> Option<String> {
    let text = node_text(node, source);
    let cut = text
        .find('{')
        .or_else(|| text.find('\n'))
        .unwrap_or(text.len());
    let sig = text[..cut].trim();
    if sig.is_empty() {
        None
    } else {
        Some(sig.to_string())
    }
}

fn is_comment_kind(kind: &str) -> bool {
    matches!(kind, "comment" | "line_comment" | "block_comment")
}

fn strip_comment_markers(text: &str) -> String {
    text.lines()
        .map(|line| {
            let t = line.trim();
            let t = t
                .strip_prefix("///")
                .or_else(|| t.strip_prefix("//!"))
                .or_else(|| t.strip_prefix("//"))
                .or_else(|| t.strip_prefix("#"))
                .unwrap_or(t);
            let t = t.strip_prefix("/*").unwrap_or(t);
            let t = t.strip_suffix("*/").unwrap_or(t);
            t.trim_start_matches('*').trim()
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Contiguous comment block immediately preceding `node` (no blank line
/// gap). Attribute/decorator nodes between the comments and the symbol do
/// not break the attachment.
fn doc_for(node: Node<'_>, source: &[u8]) -> Option<String> {
    let mut expected_row = node.start_position().row;
    let mut cursor = node.prev_sibling();
    let mut parts: Vec<String> = Vec::new();

    while let Some(prev) = cursor {
        let kind = prev.kind();
        if matches!(kind, "attribute_item" | "decorator") {
            expected_row = prev.start_position().row;
            cursor = prev.prev_sibling();
            continue;
        }
        if !is_comment_kind(kind) {
            break;
        }
        // no blank line between this comment and what follows it
        if expected_row.saturating_sub(prev.end_position().row) > 1 {
            break;
        }
        parts.push(node_text(prev, source).to_string());
        expected_row = prev.start_position().row;
        cursor = prev.prev_sibling();
    }

    if parts.is_empty() {
        return None;
    }
    parts.reverse();
    let doc = strip_comment_markers(&parts.join("\n"));
    if doc.is_empty() {
        None
    } else {
        Some(doc)
    }
}

/// Leading file-level comment block: comments at the very top of the file
/// that are not attached to the first symbol (a blank line separates them,
/// or nothing follows).
fn file_doc_of(root: Node<'_>, source: &[u8]) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut cursor = root.walk();
    let mut last_row: Option<usize> = None;
    let mut next_non_comment_row: Option<usize> = None;
    let mut comment_end_row = 0usize;

    for child in root.children(&mut cursor) {
        if is_comment_kind(child.kind()) {
            if let Some(last) = last_row {
                if child.start_position().row.saturating_sub(last) > 1 {
                    break;
                }
            } else if child.start_position().row > 1 {
                break;
            }
            comment_end_row = child.end_position().row;
            last_row = Some(comment_end_row);
            parts.push(node_text(child, source).to_string());
        } else {
            next_non_comment_row = Some(child.start_position().row);
            break;
        }
    }

    if parts.is_empty() {
        return None;
    }
    // If the block hugs the first symbol it belongs to that symbol, not the file
    if let Some(next) = next_non_comment_row {
        if next.saturating_sub(comment_end_row) <= 1 {
            return None;
        }
    }
    let doc = strip_comment_markers(&parts.join("\n"));
    if doc.is_empty() {
        None
    } else {
        Some(doc)
    }
}

fn make_symbol(
    node: Node<'_>,
    source: &[u8],
    name: String,
    kind: SymbolKind,
    parent: Option<String>,
) -> ParsedSymbol {
    ParsedSymbol {
        name,
        kind,
        parent,
        signature: signature_of(node, source),
        visibility: None,
        package_name: None,
        doc: doc_for(node, source),
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        source_code: node_text(node, source).to_string(),
    }
}

fn field_text(node: Node<'_>, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(n, source).to_string())
}

// === Rust ===

pub struct RustParser;

impl LanguageParser for RustParser {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn parse(&self, _path: &Path, source: &[u8]) -> Result<ParseResult> {
        let tree = parse_tree(&tree_sitter_rust::LANGUAGE.into(), source, "rust")?;
        let root = tree.root_node();
        let mut result = ParseResult {
            language: "rust".to_string(),
            ..Default::default()
        };
        extract_rust(root, source, None, &mut result);
        result.file_doc = rust_file_doc(root, source);
        Ok(result)
    }
}

fn rust_visibility(node: Node<'_>, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "visibility_modifier" {
            return Some(node_text(child, source).to_string());
        }
    }
    Some("private".to_string())
}

fn rust_file_doc(root: Node<'_>, source: &[u8]) -> Option<String> {
    // Inner doc comments (`//!`) at the top of the file
    let mut parts = Vec::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        if child.kind() == "line_comment" {
            let text = node_text(child, source);
            if text.starts_with("//!") {
                parts.push(text.to_string());
                continue;
            }
        }
        break;
    }
    if parts.is_empty() {
        return None;
    }
    Some(strip_comment_markers(&parts.join("\n")))
}

fn extract_rust(
    container: Node<'_>,
    source: &[u8],
    parent: Option<&str>,
    result: &mut ParseResult,
) {
    let mut cursor = container.walk();
    for node in container.named_children(&mut cursor) {
        match node.kind() {
            "function_item" => {
                if let Some(name) = field_text(node, "name", source) {
                    let kind = if parent.is_some() {
                        SymbolKind::Method
                    } else {
                        SymbolKind::Function
                    };
                    let mut sym =
                        make_symbol(node, source, name, kind, parent.map(String::from));
                    sym.visibility = rust_visibility(node, source);
                    result.symbols.push(sym);
                }
            }
            "struct_item" => {
                if let Some(name) = field_text(node, "name", source) {
                    let mut sym = make_symbol(node, source, name, SymbolKind::Struct, None);
                    sym.visibility = rust_visibility(node, source);
                    result.symbols.push(sym);
                }
            }
            "enum_item" | "union_item" | "type_item" => {
                if let Some(name) = field_text(node, "name", source) {
                    let mut sym = make_symbol(node, source, name, SymbolKind::Type, None);
                    sym.visibility = rust_visibility(node, source);
                    result.symbols.push(sym);
                }
            }
            "trait_item" => {
                if let Some(name) = field_text(node, "name", source) {
                    let mut sym =
                        make_symbol(node, source, name.clone(), SymbolKind::Interface, None);
                    sym.visibility = rust_visibility(node, source);
                    result.symbols.push(sym);
                    if let Some(body) = node.child_by_field_name("body") {
                        extract_rust(body, source, Some(&name), result);
                    }
                }
            }
            "impl_item" => {
                // Methods belong to the implemented type; the impl block
                // itself is not a symbol.
                let type_name = field_text(node, "type", source);
                if let Some(body) = node.child_by_field_name("body") {
                    extract_rust(body, source, type_name.as_deref(), result);
                }
            }
            "const_item" => {
                if parent.is_none() {
                    if let Some(name) = field_text(node, "name", source) {
                        let mut sym = make_symbol(node, source, name, SymbolKind::Const, None);
                        sym.visibility = rust_visibility(node, source);
                        result.symbols.push(sym);
                    }
                }
            }
            "static_item" => {
                if parent.is_none() {
                    if let Some(name) = field_text(node, "name", source) {
                        let mut sym =
                            make_symbol(node, source, name, SymbolKind::Variable, None);
                        sym.visibility = rust_visibility(node, source);
                        result.symbols.push(sym);
                    }
                }
            }
            "mod_item" => {
                if let Some(name) = field_text(node, "name", source) {
                    let mut sym =
                        make_symbol(node, source, name.clone(), SymbolKind::Module, None);
                    sym.visibility = rust_visibility(node, source);
                    result.symbols.push(sym);
                    if let Some(body) = node.child_by_field_name("body") {
                        extract_rust(body, source, Some(&name), result);
                    }
                }
            }
            "use_declaration" => {
                let text = node_text(node, source)
                    .trim_start_matches("use ")
                    .trim_end_matches(';')
                    .trim()
                    .to_string();
                if !text.is_empty() {
                    result.imports.push(text);
                }
            }
            _ => {}
        }
    }
}

// === Go ===

pub struct GoParser;

impl LanguageParser for GoParser {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn parse(&self, _path: &Path, source: &[u8]) -> Result<ParseResult> {
        let tree = parse_tree(&tree_sitter_go::LANGUAGE.into(), source, "go")?;
        let root = tree.root_node();
        let mut result = ParseResult {
            language: "go".to_string(),
            ..Default::default()
        };

        let mut package_name: Option<String> = None;
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            match node.kind() {
                "package_clause" => {
                    package_name = node
                        .named_child(0)
                        .map(|n| node_text(n, source).to_string());
                }
                "import_declaration" => collect_go_imports(node, source, &mut result.imports),
                "function_declaration" => {
                    if let Some(name) = field_text(node, "name", source) {
                        let visibility = go_visibility(&name);
                        let mut sym =
                            make_symbol(node, source, name, SymbolKind::Function, None);
                        sym.visibility = Some(visibility);
                        result.symbols.push(sym);
                    }
                }
                "method_declaration" => {
                    if let Some(name) = field_text(node, "name", source) {
                        let receiver = go_receiver_type(node, source);
                        let visibility = go_visibility(&name);
                        let mut sym =
                            make_symbol(node, source, name, SymbolKind::Method, receiver);
                        sym.visibility = Some(visibility);
                        result.symbols.push(sym);
                    }
                }
                "type_declaration" => {
                    let mut inner = node.walk();
                    for spec in node.named_children(&mut inner) {
                        if spec.kind() != "type_spec" {
                            continue;
                        }
                        let Some(name) = field_text(spec, "name", source) else {
                            continue;
                        };
                        let kind = match spec
                            .child_by_field_name("type")
                            .map(|t| t.kind())
                            .unwrap_or("")
                        {
                            "struct_type" => SymbolKind::Struct,
                            "interface_type" => SymbolKind::Interface,
                            _ => SymbolKind::Type,
                        };
                        let visibility = go_visibility(&name);
                        // The enclosing declaration carries the doc comment
                        // and the full source span.
                        let mut sym = make_symbol(node, source, name, kind, None);
                        sym.visibility = Some(visibility);
                        result.symbols.push(sym);
                    }
                }
                "const_declaration" | "var_declaration" => {
                    let kind = if node.kind() == "const_declaration" {
                        SymbolKind::Const
                    } else {
                        SymbolKind::Variable
                    };
                    let mut inner = node.walk();
                    for spec in node.named_children(&mut inner) {
                        if !matches!(spec.kind(), "const_spec" | "var_spec") {
                            continue;
                        }
                        if let Some(name) = field_text(spec, "name", source) {
                            let visibility = go_visibility(&name);
                            let mut sym = make_symbol(node, source, name, kind, None);
                            sym.visibility = Some(visibility);
                            result.symbols.push(sym);
                        }
                    }
                }
                _ => {}
            }
        }

        for sym in &mut result.symbols {
            sym.package_name = package_name.clone();
        }
        result.file_doc = file_doc_of(root, source);
        Ok(result)
    }
}

fn go_visibility(name: &str) -> String {
    if name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
        "public".to_string()
    } else {
        "private".to_string()
    }
}

fn go_receiver_type(node: Node<'_>, source: &[u8]) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    for param in receiver.named_children(&mut cursor) {
        if param.kind() == "parameter_declaration" {
            if let Some(ty) = param.child_by_field_name("type") {
                return Some(node_text(ty, source).trim_start_matches('*').to_string());
            }
        }
    }
    None
}

fn collect_go_imports(node: Node<'_>, source: &[u8], imports: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_spec" => {
                if let Some(path) = child.child_by_field_name("path") {
                    imports.push(node_text(path, source).trim_matches('"').to_string());
                }
            }
            "import_spec_list" => collect_go_imports(child, source, imports),
            _ => {}
        }
    }
}

// === Python ===

pub struct PythonParser;

impl LanguageParser for PythonParser {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn parse(&self, _path: &Path, source: &[u8]) -> Result<ParseResult> {
        let tree = parse_tree(&tree_sitter_python::LANGUAGE.into(), source, "python")?;
        let root = tree.root_node();
        let mut result = ParseResult {
            language: "python".to_string(),
            ..Default::default()
        };
        extract_python(root, source, None, &mut result);
        result.file_doc = python_docstring(root, source);
        Ok(result)
    }
}

fn python_visibility(name: &str) -> String {
    if name.starts_with('_') {
        "private".to_string()
    } else {
        "public".to_string()
    }
}

/// First statement of a block when it is a bare string literal.
fn python_docstring(body: Node<'_>, source: &[u8]) -> Option<String> {
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let inner = first.named_child(0)?;
    if inner.kind() != "string" {
        return None;
    }
    let text = node_text(inner, source);
    let text = text
        .trim_start_matches("r\"\"\"")
        .trim_start_matches("\"\"\"")
        .trim_start_matches("'''")
        .trim_end_matches("\"\"\"")
        .trim_end_matches("'''")
        .trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn extract_python(
    container: Node<'_>,
    source: &[u8],
    parent: Option<&str>,
    result: &mut ParseResult,
) {
    let mut cursor = container.walk();
    for child in container.named_children(&mut cursor) {
        // Decorators wrap the real definition
        let node = if child.kind() == "decorated_definition" {
            match child.child_by_field_name("definition") {
                Some(def) => def,
                None => continue,
            }
        } else {
            child
        };

        match node.kind() {
            "function_definition" => {
                if let Some(name) = field_text(node, "name", source) {
                    let kind = if parent.is_some() {
                        SymbolKind::Method
                    } else {
                        SymbolKind::Function
                    };
                    let visibility = python_visibility(&name);
                    let mut sym =
                        make_symbol(node, source, name, kind, parent.map(String::from));
                    sym.visibility = Some(visibility);
                    // Docstring beats a preceding `#` comment
                    if let Some(body) = node.child_by_field_name("body") {
                        if let Some(doc) = python_docstring(body, source) {
                            sym.doc = Some(doc);
                        }
                    }
                    result.symbols.push(sym);
                }
            }
            "class_definition" => {
                if let Some(name) = field_text(node, "name", source) {
                    let visibility = python_visibility(&name);
                    let mut sym =
                        make_symbol(node, source, name.clone(), SymbolKind::Class, None);
                    sym.visibility = Some(visibility);
                    if let Some(body) = node.child_by_field_name("body") {
                        if let Some(doc) = python_docstring(body, source) {
                            sym.doc = Some(doc);
                        }
                        extract_python(body, source, Some(&name), result);
                    }
                    result.symbols.push(sym);
                }
            }
            "expression_statement" if parent.is_none() => {
                // Top-level assignments only; locals never surface
                if let Some(assign) = node.named_child(0).filter(|n| n.kind() == "assignment") {
                    if let Some(left) = assign.child_by_field_name("left") {
                        if left.kind() == "identifier" {
                            let name = node_text(left, source).to_string();
                            let kind = if name.chars().all(|c| {
                                c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit()
                            }) {
                                SymbolKind::Const
                            } else {
                                SymbolKind::Variable
                            };
                            let visibility = python_visibility(&name);
                            let mut sym = make_symbol(node, source, name, kind, None);
                            sym.visibility = Some(visibility);
                            result.symbols.push(sym);
                        }
                    }
                }
            }
            "import_statement" | "import_from_statement" => {
                let text = node_text(node, source).trim().to_string();
                result.imports.push(text);
            }
            _ => {}
        }
    }
}

// === JavaScript / TypeScript ===

pub struct JavaScriptParser;

impl LanguageParser for JavaScriptParser {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["js", "jsx", "mjs", "cjs"]
    }

    fn parse(&self, _path: &Path, source: &[u8]) -> Result<ParseResult> {
        let tree = parse_tree(&tree_sitter_javascript::LANGUAGE.into(), source, "js")?;
        let mut result = ParseResult {
            language: "js".to_string(),
            ..Default::default()
        };
        extract_js_like(tree.root_node(), source, false, &mut result);
        result.file_doc = file_doc_of(tree.root_node(), source);
        Ok(result)
    }
}

pub struct TypeScriptParser;

impl LanguageParser for TypeScriptParser {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx", "mts", "cts"]
    }

    fn parse(&self, _path: &Path, source: &[u8]) -> Result<ParseResult> {
        let tree = parse_tree(
            &tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            source,
            "ts",
        )?;
        let mut result = ParseResult {
            language: "ts".to_string(),
            ..Default::default()
        };
        extract_js_like(tree.root_node(), source, true, &mut result);
        result.file_doc = file_doc_of(tree.root_node(), source);
        Ok(result)
    }
}

pub(crate) fn extract_js_like(
    root: Node<'_>,
    source: &[u8],
    type_script: bool,
    result: &mut ParseResult,
) {
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        let (node, exported) = if child.kind() == "export_statement" {
            match child.child_by_field_name("declaration") {
                Some(decl) => (decl, true),
                None => continue,
            }
        } else {
            (child, false)
        };
        js_symbol_from_node(node, child, source, exported, type_script, result);
    }
}

fn js_visibility(exported: bool) -> Option<String> {
    Some(if exported { "public" } else { "private" }.to_string())
}

/// `doc_node` is the node whose siblings carry the doc comment (the export
/// wrapper when present).
fn js_symbol_from_node(
    node: Node<'_>,
    doc_node: Node<'_>,
    source: &[u8],
    exported: bool,
    type_script: bool,
    result: &mut ParseResult,
) {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name) = field_text(node, "name", source) {
                let mut sym = make_symbol(node, source, name, SymbolKind::Function, None);
                sym.doc = doc_for(doc_node, source);
                sym.visibility = js_visibility(exported);
                result.symbols.push(sym);
            }
        }
        "class_declaration" | "abstract_class_declaration" => {
            if let Some(name) = field_text(node, "name", source) {
                let mut sym =
                    make_symbol(node, source, name.clone(), SymbolKind::Class, None);
                sym.doc = doc_for(doc_node, source);
                sym.visibility = js_visibility(exported);
                result.symbols.push(sym);
                if let Some(body) = node.child_by_field_name("body") {
                    extract_class_members(body, source, &name, result);
                }
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            let is_const = node_text(node, source).trim_start().starts_with("const");
            let mut inner = node.walk();
            for declarator in node.named_children(&mut inner) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let Some(name) = field_text(declarator, "name", source) else {
                    continue;
                };
                let value_kind = declarator
                    .child_by_field_name("value")
                    .map(|v| v.kind())
                    .unwrap_or("");
                let kind = if matches!(value_kind, "arrow_function" | "function_expression") {
                    SymbolKind::Function
                } else if is_const {
                    SymbolKind::Const
                } else {
                    SymbolKind::Variable
                };
                let mut sym = make_symbol(node, source, name, kind, None);
                sym.doc = doc_for(doc_node, source);
                sym.visibility = js_visibility(exported);
                result.symbols.push(sym);
            }
        }
        "interface_declaration" if type_script => {
            if let Some(name) = field_text(node, "name", source) {
                let mut sym = make_symbol(node, source, name, SymbolKind::Interface, None);
                sym.doc = doc_for(doc_node, source);
                sym.visibility = js_visibility(exported);
                result.symbols.push(sym);
            }
        }
        "type_alias_declaration" | "enum_declaration" if type_script => {
            if let Some(name) = field_text(node, "name", source) {
                let mut sym = make_symbol(node, source, name, SymbolKind::Type, None);
                sym.doc = doc_for(doc_node, source);
                sym.visibility = js_visibility(exported);
                result.symbols.push(sym);
            }
        }
        "import_statement" => {
            if let Some(src) = node.child_by_field_name("source") {
                result
                    .imports
                    .push(node_text(src, source).trim_matches(['"', '\'']).to_string());
            }
        }
        _ => {}
    }
}

fn extract_class_members(
    body: Node<'_>,
    source: &[u8],
    class_name: &str,
    result: &mut ParseResult,
) {
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        match member.kind() {
            "method_definition" => {
                if let Some(name) = field_text(member, "name", source) {
                    let sym = make_symbol(
                        member,
                        source,
                        name,
                        SymbolKind::Method,
                        Some(class_name.to_string()),
                    );
                    result.symbols.push(sym);
                }
            }
            "public_field_definition" | "field_definition" => {
                // Arrow-function fields behave like methods
                let is_fn = member
                    .child_by_field_name("value")
                    .map(|v| v.kind() == "arrow_function")
                    .unwrap_or(false);
                if is_fn {
                    if let Some(name) = field_text(member, "name", source) {
                        let sym = make_symbol(
                            member,
                            source,
                            name,
                            SymbolKind::Method,
                            Some(class_name.to_string()),
                        );
                        result.symbols.push(sym);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(parser: &dyn LanguageParser, name: &str, src: &str) -> ParseResult {
        parser.parse(Path::new(name), src.as_bytes()).unwrap()
    }

    #[test]
    fn test_rust_symbols_and_docs() {
        let src = r#"//! Crate-level docs.

use std::collections::HashMap;

/// Adds two numbers.
pub fn add(a: i32, b: i32) -> i32 {
    a + b
}

pub struct User {
    name: String,
}

impl User {
    pub fn new(name: String) -> Self {
        Self { name }
    }
}

const MAX: usize = 10;
"#;
        let result = parse(&RustParser, "lib.rs", src);
        assert_eq!(result.language, "rust");
        assert_eq!(result.file_doc.as_deref(), Some("Crate-level docs."));
        assert_eq!(result.imports, vec!["std::collections::HashMap"]);

        let add = result.symbols.iter().find(|s| s.name == "add").unwrap();
        assert_eq!(add.kind, SymbolKind::Function);
        assert_eq!(add.doc.as_deref(), Some("Adds two numbers."));
        assert_eq!(add.visibility.as_deref(), Some("pub"));
        assert!(add.signature.as_deref().unwrap().contains("fn add"));

        let user = result.symbols.iter().find(|s| s.name == "User").unwrap();
        assert_eq!(user.kind, SymbolKind::Struct);

        let new = result.symbols.iter().find(|s| s.name == "new").unwrap();
        assert_eq!(new.kind, SymbolKind::Method);
        assert_eq!(new.parent.as_deref(), Some("User"));

        let max = result.symbols.iter().find(|s| s.name == "MAX").unwrap();
        assert_eq!(max.kind, SymbolKind::Const);
    }

    #[test]
    fn test_go_functions_methods_and_package() {
        let src = r#"package server

import (
	"fmt"
	"net/http"
)

// Serve starts the server.
func Serve(addr string) error {
	return nil
}

func helper() {}

type Handler struct {
	name string
}

func (h *Handler) Handle(w http.ResponseWriter, r *http.Request) {
	fmt.Println(h.name)
}
"#;
        let result = parse(&GoParser, "server.go", src);
        assert_eq!(result.language, "go");
        assert_eq!(result.imports, vec!["fmt", "net/http"]);

        let serve = result.symbols.iter().find(|s| s.name == "Serve").unwrap();
        assert_eq!(serve.kind, SymbolKind::Function);
        assert_eq!(serve.visibility.as_deref(), Some("public"));
        assert_eq!(serve.package_name.as_deref(), Some("server"));
        assert_eq!(serve.doc.as_deref(), Some("Serve starts the server."));

        let helper = result.symbols.iter().find(|s| s.name == "helper").unwrap();
        assert_eq!(helper.visibility.as_deref(), Some("private"));

        let handle = result.symbols.iter().find(|s| s.name == "Handle").unwrap();
        assert_eq!(handle.kind, SymbolKind::Method);
        assert_eq!(handle.parent.as_deref(), Some("Handler"));

        let handler = result.symbols.iter().find(|s| s.name == "Handler").unwrap();
        assert_eq!(handler.kind, SymbolKind::Struct);
    }

    #[test]
    fn test_go_three_functions_yield_three_symbols() {
        // Imports and package never surface as symbol rows
        let src = "package main\n\nfunc a() {}\nfunc b() {}\nfunc c() {}\n";
        let result = parse(&GoParser, "main.go", src);
        assert_eq!(result.symbols.len(), 3);
    }

    #[test]
    fn test_python_classes_methods_docstrings() {
        let src = r#""""Module docs."""

import os

VERSION = "1.0"

def top_level(x):
    """Doubles x."""
    return x * 2

class Greeter:
    """Says hello."""

    def greet(self, name):
        return f"hi {name}"

    def _internal(self):
        pass
"#;
        let result = parse(&PythonParser, "mod.py", src);
        assert_eq!(result.language, "python");
        assert_eq!(result.file_doc.as_deref(), Some("Module docs."));
        assert_eq!(result.imports, vec!["import os"]);

        let version = result.symbols.iter().find(|s| s.name == "VERSION").unwrap();
        assert_eq!(version.kind, SymbolKind::Const);

        let top = result.symbols.iter().find(|s| s.name == "top_level").unwrap();
        assert_eq!(top.kind, SymbolKind::Function);
        assert_eq!(top.doc.as_deref(), Some("Doubles x."));

        let greet = result.symbols.iter().find(|s| s.name == "greet").unwrap();
        assert_eq!(greet.kind, SymbolKind::Method);
        assert_eq!(greet.parent.as_deref(), Some("Greeter"));

        let internal = result.symbols.iter().find(|s| s.name == "_internal").unwrap();
        assert_eq!(internal.visibility.as_deref(), Some("private"));
    }

    #[test]
    fn test_python_locals_are_not_extracted() {
        let src = "def f():\n    local_var = 1\n    return local_var\n";
        let result = parse(&PythonParser, "f.py", src);
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].name, "f");
    }

    #[test]
    fn test_javascript_symbols() {
        let src = r#"import { thing } from './thing';

// Formats a date.
export function formatDate(date) {
    return date.toISOString();
}

const validate = (email) => email.includes('@');

export class Session {
    start() {
        return 1;
    }
}
"#;
        let result = parse(&JavaScriptParser, "utils.js", src);
        assert_eq!(result.language, "js");
        assert_eq!(result.imports, vec!["./thing"]);

        let fmt = result.symbols.iter().find(|s| s.name == "formatDate").unwrap();
        assert_eq!(fmt.kind, SymbolKind::Function);
        assert_eq!(fmt.visibility.as_deref(), Some("public"));
        assert_eq!(fmt.doc.as_deref(), Some("Formats a date."));

        let validate = result.symbols.iter().find(|s| s.name == "validate").unwrap();
        assert_eq!(validate.kind, SymbolKind::Function);
        assert_eq!(validate.visibility.as_deref(), Some("private"));

        let start = result.symbols.iter().find(|s| s.name == "start").unwrap();
        assert_eq!(start.kind, SymbolKind::Method);
        assert_eq!(start.parent.as_deref(), Some("Session"));
    }

    #[test]
    fn test_typescript_interfaces_and_types() {
        let src = r#"export interface Config {
    port: number;
}

type Mode = "dev" | "prod";

export enum Level {
    Low,
    High,
}

export const DEFAULT_PORT = 8080;
"#;
        let result = parse(&TypeScriptParser, "config.ts", src);
        assert_eq!(result.language, "ts");

        let config = result.symbols.iter().find(|s| s.name == "Config").unwrap();
        assert_eq!(config.kind, SymbolKind::Interface);

        let mode = result.symbols.iter().find(|s| s.name == "Mode").unwrap();
        assert_eq!(mode.kind, SymbolKind::Type);

        let level = result.symbols.iter().find(|s| s.name == "Level").unwrap();
        assert_eq!(level.kind, SymbolKind::Type);

        let port = result.symbols.iter().find(|s| s.name == "DEFAULT_PORT").unwrap();
        assert_eq!(port.kind, SymbolKind::Const);
    }

    #[test]
    fn test_doc_attachment_requires_contiguity() {
        let src = "// dangling comment\n\nfn lonely() {}\n";
        let result = parse(&RustParser, "x.rs", src);
        let lonely = result.symbols.iter().find(|s| s.name == "lonely").unwrap();
        assert_eq!(lonely.doc, None);
    }

    #[test]
    fn test_line_ranges_are_one_based_inclusive() {
        let src = "fn first() {\n    // body\n}\n";
        let result = parse(&RustParser, "x.rs", src);
        let first = &result.symbols[0];
        assert_eq!(first.start_line, 1);
        assert_eq!(first.end_line, 3);
        assert_eq!(&src[first.start_byte..first.end_byte], first.source_code);
    }
}
