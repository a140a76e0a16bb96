//! Outline building: fold a flat symbol list into a nested forest.
//!
//! Containment by line range is the ground truth; a symbol's declared
//! `parent` name is honoured only when that candidate's range strictly
//! contains the child's range. That is what keeps duplicate names (every
//! `div` in a template) attached to the right ancestor.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::parser::ParsedSymbol;

/// One node of a per-file outline tree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineNode {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    fn from_symbol(symbol: &ParsedSymbol) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: symbol.name.clone(),
            kind: symbol.kind.as_str().to_string(),
            start_line: symbol.start_line,
            end_line: symbol.end_line,
            children: Vec::new(),
        }
    }

    /// Truncate children beyond `depth` levels (depth 1 keeps only roots).
    pub fn truncate_depth(&mut self, depth: usize) {
        if depth <= 1 {
            self.children.clear();
        } else {
            for child in &mut self.children {
                child.truncate_depth(depth - 1);
            }
        }
    }
}

pub struct OutlineBuilder;

impl OutlineBuilder {
    /// Fold symbols into a forest.
    ///
    /// Walks symbols sorted by `(start_line asc, end_line desc)` with a
    /// containment stack; the declared parent wins only under strict range
    /// containment.
    pub fn build(symbols: &[ParsedSymbol]) -> Vec<OutlineNode> {
        let mut order: Vec<&ParsedSymbol> = symbols.iter().collect();
        order.sort_by(|a, b| {
            a.start_line
                .cmp(&b.start_line)
                .then(b.end_line.cmp(&a.end_line))
        });

        struct Slot {
            node: OutlineNode,
            parent: Option<usize>,
            start_line: usize,
            end_line: usize,
        }

        let mut slots: Vec<Slot> = Vec::with_capacity(order.len());
        let mut stack: Vec<usize> = Vec::new();
        // Visited nodes by bare and qualified name, in visit order
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();

        for sym in order {
            while let Some(&top) = stack.last() {
                if slots[top].end_line < sym.start_line {
                    stack.pop();
                } else {
                    break;
                }
            }
            let mut parent = stack.last().copied();

            if let Some(declared) = &sym.parent {
                if let Some(candidates) = by_name.get(declared.as_str()) {
                    // Innermost candidate whose range strictly contains ours
                    let hit = candidates.iter().rev().find(|&&c| {
                        let cand = &slots[c];
                        cand.start_line <= sym.start_line
                            && sym.end_line <= cand.end_line
                            && (cand.start_line, cand.end_line)
                                != (sym.start_line, sym.end_line)
                    });
                    if let Some(&c) = hit {
                        parent = Some(c);
                    }
                }
            }

            let idx = slots.len();
            slots.push(Slot {
                node: OutlineNode::from_symbol(sym),
                parent,
                start_line: sym.start_line,
                end_line: sym.end_line,
            });
            by_name.entry(sym.name.clone()).or_default().push(idx);
            let qualified = sym.qualified_name();
            if qualified != sym.name {
                by_name.entry(qualified).or_default().push(idx);
            }
            stack.push(idx);
        }

        // Assemble bottom-up: visit order doubles as sibling order
        let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); slots.len()];
        let mut roots: Vec<usize> = Vec::new();
        for (i, slot) in slots.iter().enumerate() {
            match slot.parent {
                Some(p) => children_of[p].push(i),
                None => roots.push(i),
            }
        }

        fn materialize(
            index: usize,
            slots: &mut [Option<OutlineNode>],
            children_of: &[Vec<usize>],
        ) -> OutlineNode {
            let mut node = slots[index].take().expect("node taken twice");
            node.children = children_of[index]
                .iter()
                .map(|&c| materialize(c, slots, children_of))
                .collect();
            node
        }

        let mut taken: Vec<Option<OutlineNode>> =
            slots.into_iter().map(|s| Some(s.node)).collect();
        roots
            .into_iter()
            .map(|r| materialize(r, &mut taken, &children_of))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SymbolKind;
    use pretty_assertions::assert_eq;

    fn sym(
        name: &str,
        kind: SymbolKind,
        parent: Option<&str>,
        start: usize,
        end: usize,
    ) -> ParsedSymbol {
        ParsedSymbol {
            name: name.to_string(),
            kind,
            parent: parent.map(String::from),
            signature: None,
            visibility: None,
            package_name: None,
            doc: None,
            start_line: start,
            end_line: end,
            start_byte: 0,
            end_byte: 0,
            source_code: String::new(),
        }
    }

    #[test]
    fn test_containment_nesting() {
        let symbols = vec![
            sym("Outer", SymbolKind::Class, None, 1, 20),
            sym("inner", SymbolKind::Method, None, 2, 6),
            sym("later", SymbolKind::Function, None, 25, 30),
        ];
        let forest = OutlineBuilder::build(&symbols);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].name, "Outer");
        assert_eq!(forest[0].children.len(), 1);
        assert_eq!(forest[0].children[0].name, "inner");
        assert_eq!(forest[1].name, "later");
    }

    #[test]
    fn test_declared_parent_wins_when_containing() {
        let symbols = vec![
            sym("User", SymbolKind::Struct, None, 1, 30),
            sym("helper", SymbolKind::Function, None, 5, 25),
            // declared parent User contains it even though the stack top
            // would be helper
            sym("new", SymbolKind::Method, Some("User"), 10, 15),
        ];
        let forest = OutlineBuilder::build(&symbols);
        let user = &forest[0];
        assert_eq!(user.name, "User");
        let names: Vec<&str> = user.children.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"new"));
    }

    #[test]
    fn test_declared_parent_ignored_without_containment() {
        let symbols = vec![
            sym("A", SymbolKind::Class, None, 1, 5),
            // declares parent A but lies outside A's range
            sym("stray", SymbolKind::Method, Some("A"), 10, 12),
        ];
        let forest = OutlineBuilder::build(&symbols);
        assert_eq!(forest.len(), 2);
        assert!(forest.iter().any(|n| n.name == "stray"));
        assert!(forest.iter().find(|n| n.name == "A").unwrap().children.is_empty());
    }

    #[test]
    fn test_duplicate_names_resolved_by_containment() {
        // Two divs; the span declares parent "div" and must land in the
        // inner one.
        let symbols = vec![
            sym("div", SymbolKind::Element, None, 1, 10),
            sym("div", SymbolKind::Element, Some("div"), 2, 8),
            sym("span", SymbolKind::Element, Some("div"), 3, 4),
        ];
        let forest = OutlineBuilder::build(&symbols);
        assert_eq!(forest.len(), 1);
        let outer = &forest[0];
        assert_eq!(outer.children.len(), 1);
        let inner = &outer.children[0];
        assert_eq!(inner.start_line, 2);
        assert_eq!(inner.children.len(), 1);
        assert_eq!(inner.children[0].name, "span");
    }

    #[test]
    fn test_sibling_order_follows_source_order() {
        let symbols = vec![
            sym("b_second", SymbolKind::Function, None, 10, 12),
            sym("a_first", SymbolKind::Function, None, 1, 3),
            sym("c_third", SymbolKind::Function, None, 20, 22),
        ];
        let forest = OutlineBuilder::build(&symbols);
        let names: Vec<&str> = forest.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a_first", "b_second", "c_third"]);
    }

    #[test]
    fn test_truncate_depth() {
        let symbols = vec![
            sym("root", SymbolKind::Class, None, 1, 30),
            sym("mid", SymbolKind::Method, None, 2, 20),
            sym("leaf", SymbolKind::Function, None, 3, 5),
        ];
        let mut forest = OutlineBuilder::build(&symbols);
        for node in &mut forest {
            node.truncate_depth(2);
        }
        assert_eq!(forest[0].children.len(), 1);
        assert!(forest[0].children[0].children.is_empty());
    }

    #[test]
    fn test_acyclicity_every_node_reachable_once() {
        let symbols: Vec<ParsedSymbol> = (0..50)
            .map(|i| {
                sym(
                    &format!("s{i}"),
                    SymbolKind::Function,
                    None,
                    i * 2 + 1,
                    i * 2 + 2,
                )
            })
            .collect();
        let forest = OutlineBuilder::build(&symbols);

        fn count(nodes: &[OutlineNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        assert_eq!(count(&forest), 50);
    }
}
