//! Shared tree-sitter plumbing for the AST-backed extractors.
use std::collections::HashMap;
use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use super::languages::Language;
use super::symbols::Span;
use crate::error::{IndexError, Result};

/// A reusable parser bound to one grammar.
pub struct CodeParser {
    parser: Parser,
}

impl CodeParser {
    pub fn new(language: Language) -> Result<Self> {
        let grammar = language.grammar().ok_or_else(|| {
            IndexError::parse(language.as_str(), "language has no embedded grammar")
        })?;
        let mut parser = Parser::new();
        parser.set_language(&grammar)?;
        Ok(Self { parser })
    }

    /// Parse `source`, rejecting trees that contain syntax errors.
    pub fn parse_strict(&mut self, source: &[u8], path: &Path) -> Result<Tree> {
        let tree = self.parse(source, path)?;
        let root = tree.root_node();
        if root.has_error() {
            let line = first_error_line(root).unwrap_or(root.start_position().row + 1);
            return Err(IndexError::parse(
                path,
                format!("syntax error near line {line}"),
            ));
        }
        Ok(tree)
    }

    /// Parse `source`, keeping whatever tree-sitter recovered.
    pub fn parse(&mut self, source: &[u8], path: &Path) -> Result<Tree> {
        self.parser
            .parse(source, None)
            .ok_or_else(|| IndexError::parse(path, "parser returned no tree"))
    }
}

fn first_error_line(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(line) = first_error_line(child) {
                return Some(line);
            }
        }
    }
    None
}

pub fn node_text<'a>(node: Node<'_>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

pub fn field_text<'a>(node: Node<'_>, field: &str, source: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| node_text(n, source))
}

pub fn start_line(node: Node) -> usize {
    node.start_position().row + 1
}

/// Last line of `node`. A node ending at column 0 ends on the previous line.
pub fn end_line(node: Node) -> usize {
    let end = node.end_position();
    let line = if end.column == 0 && end.row > node.start_position().row {
        end.row
    } else {
        end.row + 1
    };
    line.max(start_line(node))
}

pub fn span_of(node: Node) -> Span {
    Span::new(start_line(node), end_line(node))
}

/// Span of `decl`, with the name range taken from `name` when present.
pub fn span_with_name(decl: Node, name: Option<Node>) -> Span {
    let span = span_of(decl);
    match name {
        Some(n) => span.with_name_lines(start_line(n), end_line(n)),
        None => span,
    }
}

/// Comment nodes sitting directly above `node` with no blank line between
/// them, in source order.
pub fn leading_comments<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut comments = Vec::new();
    let mut expected_end = start_line(node);
    let mut cursor = node.prev_named_sibling();
    while let Some(prev) = cursor {
        if prev.kind() != "comment" {
            break;
        }
        // A comment ending on the same line as the previous declaration is a
        // trailing comment of that declaration.
        if let Some(before) = prev.prev_named_sibling() {
            if before.kind() != "comment" && end_line(before) == start_line(prev) {
                break;
            }
        }
        if end_line(prev) + 1 != expected_end {
            break;
        }
        expected_end = start_line(prev);
        comments.push(prev);
        cursor = prev.prev_named_sibling();
    }
    comments.reverse();
    comments
}

/// Strip comment markers from `//`, `#`, `/* */` and `/** */` comments.
pub fn clean_comment(text: &str) -> String {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix("/*") {
        let inner = inner.strip_suffix("*/").unwrap_or(inner);
        let inner = inner.strip_prefix('*').unwrap_or(inner);
        return inner
            .lines()
            .map(|l| {
                let l = l.trim();
                let l = l.strip_prefix('*').unwrap_or(l);
                l.strip_prefix(' ').unwrap_or(l).trim_end()
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
    }
    text.lines()
        .map(|l| {
            let l = l.trim();
            let l = l
                .strip_prefix("//")
                .or_else(|| l.strip_prefix('#'))
                .unwrap_or(l);
            l.strip_prefix(' ').unwrap_or(l).trim_end()
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Documentation text assembled from the comments directly above `node`.
pub fn doc_comment(node: Node, source: &[u8]) -> String {
    leading_comments(node)
        .into_iter()
        .map(|c| clean_comment(node_text(c, source)))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Location of one declaration inside one file of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyRef {
    pub file: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub span: Span,
}

impl BodyRef {
    pub fn from_node(file: usize, decl: Node, name: Option<Node>) -> Self {
        Self {
            file,
            start_byte: decl.start_byte(),
            end_byte: decl.end_byte(),
            span: span_with_name(decl, name),
        }
    }

    /// The declaration's source text.
    pub fn excerpt<'a>(&self, source: &'a [u8]) -> &'a str {
        source
            .get(self.start_byte..self.end_byte)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or("")
    }
}

/// Stable declaration key → declaration location.
///
/// Built from freshly parsed trees before any documentation pass runs; code
/// excerpts and end lines are always looked up here, never through nodes
/// handed around by later passes.
#[derive(Debug, Default)]
pub struct BodyIndex {
    bodies: HashMap<String, BodyRef>,
}

impl BodyIndex {
    /// Record `key`. The first declaration under a key wins.
    pub fn insert(&mut self, key: impl Into<String>, body: BodyRef) {
        self.bodies.entry(key.into()).or_insert(body);
    }

    pub fn get(&self, key: &str) -> Option<&BodyRef> {
        self.bodies.get(key)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strict_rejects_syntax_errors() {
        let mut parser = CodeParser::new(Language::Go).expect("go grammar");
        let ok = parser.parse_strict(b"package main\n\nfunc main() {}\n", Path::new("ok.go"));
        assert!(ok.is_ok());
        let bad = parser.parse_strict(b"package main\n\nfunc main( {\n", Path::new("bad.go"));
        assert!(matches!(bad, Err(IndexError::Parse { .. })));
    }

    #[test]
    fn test_no_grammar_for_lexical_languages() {
        assert!(CodeParser::new(Language::Python).is_err());
    }

    #[test]
    fn test_clean_comment_variants() {
        assert_eq!(clean_comment("// Hello world"), "Hello world");
        assert_eq!(
            clean_comment("/**\n * Get the user.\n *\n * @return User\n */"),
            "Get the user.\n\n@return User"
        );
        assert_eq!(clean_comment("/* inline */"), "inline");
    }

    #[test]
    fn test_doc_comment_stops_at_blank_line() {
        let src = b"package p\n\n// unrelated\n\n// Run does things.\n// Twice.\nfunc Run() {}\n";
        let mut parser = CodeParser::new(Language::Go).unwrap();
        let tree = parser.parse_strict(src, Path::new("p.go")).unwrap();
        let root = tree.root_node();
        let mut cursor = root.walk();
        let func = root
            .children(&mut cursor)
            .find(|n| n.kind() == "function_declaration")
            .unwrap();
        assert_eq!(doc_comment(func, src), "Run does things.\nTwice.");
    }

    #[test]
    fn test_body_index_first_insert_wins() {
        let mut index = BodyIndex::default();
        let a = BodyRef {
            file: 0,
            start_byte: 0,
            end_byte: 4,
            span: Span::new(1, 1),
        };
        let b = BodyRef { file: 1, ..a };
        index.insert("T.Run", a);
        index.insert("T.Run", b);
        assert_eq!(index.get("T.Run").map(|r| r.file), Some(0));
        assert_eq!(index.len(), 1);
        assert_eq!(a.excerpt(b"func x"), "func");
    }
}
