//! Closed literal evaluator for PHP initializers and call arguments.
//!
//! Expressions are lowered into [`Expr`] once, while the tree is alive. The
//! fold functions then read only literal shapes; anything else folds to an
//! empty result instead of a guess.

use serde_json::Value;
use tree_sitter::Node;

use crate::indexer::code_parser::node_text;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    /// Bare name such as a global constant.
    Ident(String),
    QualifiedName(String),
    /// `Type::class`, holding `Type` as written.
    ClassRef(String),
    Closure,
    Unsupported,
}

impl Expr {
    /// Lower an expression node.
    pub fn lower(node: Node, source: &[u8]) -> Expr {
        match node.kind() {
            "string" => unquote_single(node_text(node, source))
                .map(Expr::Str)
                .unwrap_or(Expr::Unsupported),
            "encapsed_string" => {
                let mut cursor = node.walk();
                let interpolated = node
                    .named_children(&mut cursor)
                    .any(|c| !matches!(c.kind(), "string_content" | "string_value" | "escape_sequence"));
                if interpolated {
                    Expr::Unsupported
                } else {
                    unquote_double(node_text(node, source))
                        .map(Expr::Str)
                        .unwrap_or(Expr::Unsupported)
                }
            }
            "array_creation_expression" => lower_array(node, source),
            "class_constant_access_expression" => {
                let mut cursor = node.walk();
                let parts: Vec<Node> = node.named_children(&mut cursor).collect();
                match parts.as_slice() {
                    [scope, constant]
                        if node_text(*constant, source).eq_ignore_ascii_case("class")
                            && matches!(scope.kind(), "name" | "qualified_name") =>
                    {
                        Expr::ClassRef(node_text(*scope, source).to_string())
                    }
                    _ => Expr::Unsupported,
                }
            }
            "name" => Expr::Ident(node_text(node, source).to_string()),
            "qualified_name" => Expr::QualifiedName(node_text(node, source).to_string()),
            "anonymous_function" | "anonymous_function_creation_expression" | "arrow_function" => {
                Expr::Closure
            }
            "parenthesized_expression" => {
                let mut cursor = node.walk();
                let inner = node.named_children(&mut cursor).find(|c| c.kind() != "comment");
                inner
                    .map(|n| Expr::lower(n, source))
                    .unwrap_or(Expr::Unsupported)
            }
            _ => Expr::Unsupported,
        }
    }

    /// Lower every argument of an `arguments` node, in order.
    pub fn lower_arguments(arguments: Node, source: &[u8]) -> Vec<Expr> {
        let mut args = Vec::new();
        let mut cursor = arguments.walk();
        for arg in arguments.named_children(&mut cursor) {
            match arg.kind() {
                "argument" => {
                    // Named arguments (`name: value`) put the label first.
                    let mut arg_cursor = arg.walk();
                    let value = arg
                        .named_children(&mut arg_cursor)
                        .filter(|c| c.kind() != "comment")
                        .last();
                    args.push(
                        value
                            .map(|v| Expr::lower(v, source))
                            .unwrap_or(Expr::Unsupported),
                    );
                }
                "comment" => {}
                _ => args.push(Expr::Unsupported),
            }
        }
        args
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Str(s) => Some(s),
            _ => None,
        }
    }

    /// JSON view of a literal, or `None` when any part is unsupported.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Expr::Str(s) => Some(Value::String(s.clone())),
            Expr::List(items) => items
                .iter()
                .map(Expr::to_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Expr::Map(entries) => {
                let mut map = serde_json::Map::new();
                for (key, value) in entries {
                    map.insert(key.as_str()?.to_string(), value.to_json()?);
                }
                Some(Value::Object(map))
            }
            Expr::ClassRef(name) => Some(Value::String(format!("{name}::class"))),
            _ => None,
        }
    }
}

fn lower_array(node: Node, source: &[u8]) -> Expr {
    let mut list = Vec::new();
    let mut map = Vec::new();
    let mut cursor = node.walk();
    for element in node.named_children(&mut cursor) {
        match element.kind() {
            "array_element_initializer" => {}
            "comment" => continue,
            _ => return Expr::Unsupported,
        }
        let mut el_cursor = element.walk();
        let keyed = element.children(&mut el_cursor).any(|c| c.kind() == "=>");
        let mut el_cursor = element.walk();
        let parts: Vec<Node> = element
            .named_children(&mut el_cursor)
            .filter(|c| c.kind() != "comment")
            .collect();
        match (keyed, parts.as_slice()) {
            (true, [key, value]) => map.push((Expr::lower(*key, source), Expr::lower(*value, source))),
            (false, [value]) if value.kind() != "variadic_unpacking" => {
                list.push(Expr::lower(*value, source))
            }
            _ => return Expr::Unsupported,
        }
    }
    match (list.is_empty(), map.is_empty()) {
        (_, true) => Expr::List(list),
        (true, false) => Expr::Map(map),
        // Mixed keyed and positional entries.
        (false, false) => Expr::Unsupported,
    }
}

fn unquote_single(text: &str) -> Option<String> {
    let body = text
        .strip_prefix(['b', 'B'])
        .unwrap_or(text)
        .strip_prefix('\'')?
        .strip_suffix('\'')?;
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && matches!(chars.peek(), Some('\'' | '\\')) {
            out.extend(chars.next());
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn unquote_double(text: &str) -> Option<String> {
    let body = text
        .strip_prefix(['b', 'B'])
        .unwrap_or(text)
        .strip_prefix('"')?
        .strip_suffix('"')?;
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('$') => out.push('$'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Some(out)
}

/// A string literal, or `None`.
pub fn fold_string(expr: &Expr) -> Option<String> {
    expr.as_str().map(str::to_string)
}

/// A list made only of string literals. Any other element empties the
/// result.
pub fn fold_string_list(expr: &Expr) -> Vec<String> {
    let Expr::List(items) = expr else {
        return Vec::new();
    };
    items
        .iter()
        .map(fold_string)
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}

/// A map whose keys and values are all string literals, in source order.
pub fn fold_string_map(expr: &Expr) -> Vec<(String, String)> {
    let Expr::Map(entries) = expr else {
        return Vec::new();
    };
    entries
        .iter()
        .map(|(k, v)| Some((fold_string(k)?, fold_string(v)?)))
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}

/// Class token carried by a `Type::class` reference or a class-name string.
pub fn class_ref_token(expr: &Expr) -> Option<ClassToken> {
    match expr {
        Expr::ClassRef(name) => Some(ClassToken::Reference(name.clone())),
        Expr::Str(s) if !s.is_empty() => Some(ClassToken::Literal(s.clone())),
        _ => None,
    }
}

/// Unresolved class name as found in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassToken {
    /// `Type::class`; resolved through imports and the namespace.
    Reference(String),
    /// A string literal, taken as already fully qualified.
    Literal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::code_parser::CodeParser;
    use crate::indexer::languages::Language;
    use std::path::Path;

    /// Lower the right-hand side of `$x = <expr>;`.
    fn lower_rhs(expr: &str) -> Expr {
        let src = format!("<?php\n$x = {expr};\n");
        let mut parser = CodeParser::new(Language::Php).unwrap();
        let tree = parser.parse_strict(src.as_bytes(), Path::new("x.php")).unwrap();
        let root = tree.root_node();
        let mut cursor = root.walk();
        let stmt = root
            .named_children(&mut cursor)
            .find(|n| n.kind() == "expression_statement")
            .unwrap();
        let assign = stmt.named_child(0).unwrap();
        let rhs = assign.child_by_field_name("right").unwrap();
        Expr::lower(rhs, src.as_bytes())
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(lower_rhs("'users'"), Expr::Str("users".into()));
        assert_eq!(lower_rhs("'it\\'s'"), Expr::Str("it's".into()));
        assert_eq!(lower_rhs("\"plain\""), Expr::Str("plain".into()));
        assert_eq!(lower_rhs("\"hi $name\""), Expr::Unsupported);
    }

    #[test]
    fn test_arrays() {
        let list = lower_rhs("['name', 'email']");
        assert_eq!(fold_string_list(&list), vec!["name", "email"]);

        let map = lower_rhs("array('is_admin' => 'boolean', 'meta' => 'array')");
        assert_eq!(
            fold_string_map(&map),
            vec![
                ("is_admin".to_string(), "boolean".to_string()),
                ("meta".to_string(), "array".to_string())
            ]
        );
    }

    #[test]
    fn test_unsupported_forms_fold_empty() {
        assert!(fold_string_list(&lower_rhs("['name', self::EXTRA]")).is_empty());
        assert!(fold_string_list(&lower_rhs("array_merge($a, $b)")).is_empty());
        assert!(fold_string_map(&lower_rhs("['a' => 'x', 'b' => 1]")).is_empty());
        assert!(fold_string_map(&lower_rhs("['a' => 'x', 'y']")).is_empty());
        assert_eq!(fold_string(&lower_rhs("FOO")), None);
    }

    #[test]
    fn test_class_references() {
        assert_eq!(lower_rhs("Post::class"), Expr::ClassRef("Post".into()));
        assert_eq!(
            lower_rhs("\\App\\Models\\Post::class"),
            Expr::ClassRef("\\App\\Models\\Post".into())
        );
        assert_eq!(
            class_ref_token(&lower_rhs("'App\\Models\\Post'")),
            Some(ClassToken::Literal("App\\Models\\Post".into()))
        );
        assert_eq!(lower_rhs("fn () => 1"), Expr::Closure);
        assert_eq!(lower_rhs("function () { return 1; }"), Expr::Closure);
    }

    #[test]
    fn test_to_json() {
        let map = lower_rhs("['a' => ['x', 'y']]");
        assert_eq!(map.to_json(), Some(serde_json::json!({"a": ["x", "y"]})));
        assert_eq!(lower_rhs("$y").to_json(), None);
    }
}
