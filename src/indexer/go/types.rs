//! Textual rendering of Go type expressions, parameter lists and values.
use tree_sitter::Node;

use crate::indexer::code_parser::node_text;
use crate::indexer::symbols::{Param, normalize_ws};

/// Placeholder for initializers that are not simple literals.
pub const COMPLEX_VALUE: &str = "<complex>";

/// Render a type expression node to its canonical text form.
pub fn type_string(node: Node, source: &[u8]) -> String {
    match node.kind() {
        "type_identifier" | "identifier" | "field_identifier" | "package_identifier" => {
            node_text(node, source).to_string()
        }
        "pointer_type" => format!("*{}", first_named(node, source)),
        "slice_type" => format!("[]{}", field_type(node, "element", source)),
        "array_type" => {
            let len = node
                .child_by_field_name("length")
                .map(|n| normalize_ws(node_text(n, source)))
                .unwrap_or_default();
            format!("[{}]{}", len, field_type(node, "element", source))
        }
        "implicit_length_array_type" => format!("[...]{}", field_type(node, "element", source)),
        "map_type" => format!(
            "map[{}]{}",
            field_type(node, "key", source),
            field_type(node, "value", source)
        ),
        "qualified_type" => format!(
            "{}.{}",
            node.child_by_field_name("package")
                .map(|n| node_text(n, source))
                .unwrap_or(""),
            node.child_by_field_name("name")
                .map(|n| node_text(n, source))
                .unwrap_or("")
        ),
        "interface_type" => "interface{}".to_string(),
        "struct_type" => "struct{}".to_string(),
        "function_type" => {
            let params = node
                .child_by_field_name("parameters")
                .map(|p| params_string(&parameter_list(p, source)))
                .unwrap_or_default();
            let result = node
                .child_by_field_name("result")
                .map(|r| result_string(&result_types(r, source), r.kind() == "parameter_list"))
                .unwrap_or_default();
            format!("func({params}){result}")
        }
        "channel_type" => {
            let value = field_type(node, "value", source);
            let text = node_text(node, source);
            if text.starts_with("<-") {
                format!("<-chan {value}")
            } else if text.starts_with("chan<-") || text.starts_with("chan <-") {
                format!("chan<- {value}")
            } else {
                format!("chan {value}")
            }
        }
        "generic_type" => {
            let base = field_type(node, "type", source);
            let args = node
                .child_by_field_name("type_arguments")
                .map(|a| {
                    let mut cursor = a.walk();
                    a.named_children(&mut cursor)
                        .filter(|c| c.kind() != "comment")
                        .map(|c| type_string(c, source))
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            format!("{base}[{args}]")
        }
        "type_elem" => {
            let mut cursor = node.walk();
            node.named_children(&mut cursor)
                .map(|c| type_string(c, source))
                .collect::<Vec<_>>()
                .join(" | ")
        }
        "parenthesized_type" => format!("({})", first_named(node, source)),
        "negated_type" => format!("~{}", first_named(node, source)),
        _ => normalize_ws(node_text(node, source)),
    }
}

fn field_type(node: Node, field: &str, source: &[u8]) -> String {
    node.child_by_field_name(field)
        .map(|n| type_string(n, source))
        .unwrap_or_default()
}

fn first_named(node: Node, source: &[u8]) -> String {
    let mut cursor = node.walk();
    let inner = node
        .named_children(&mut cursor)
        .find(|c| c.kind() != "comment");
    inner.map(|n| type_string(n, source)).unwrap_or_default()
}

/// Expand a `parameter_list` into one [`Param`] per declared name.
pub fn parameter_list(list: Node, source: &[u8]) -> Vec<Param> {
    let mut params = Vec::new();
    let mut cursor = list.walk();
    for decl in list.named_children(&mut cursor) {
        let variadic = match decl.kind() {
            "parameter_declaration" => false,
            "variadic_parameter_declaration" => true,
            _ => continue,
        };
        let mut type_name = field_type(decl, "type", source);
        if variadic {
            type_name = format!("...{type_name}");
        }
        let mut name_cursor = decl.walk();
        let names: Vec<String> = decl
            .children_by_field_name("name", &mut name_cursor)
            .map(|n| node_text(n, source).to_string())
            .collect();
        if names.is_empty() {
            params.push(Param {
                name: String::new(),
                type_name,
                default: None,
                variadic,
            });
        } else {
            for name in names {
                params.push(Param {
                    name,
                    type_name: type_name.clone(),
                    default: None,
                    variadic,
                });
            }
        }
    }
    params
}

/// Result types of a function; `result` is either a `parameter_list` or a
/// bare type.
pub fn result_types(result: Node, source: &[u8]) -> Vec<String> {
    if result.kind() == "parameter_list" {
        parameter_list(result, source)
            .into_iter()
            .map(|p| {
                if p.name.is_empty() {
                    p.type_name
                } else {
                    format!("{} {}", p.name, p.type_name)
                }
            })
            .collect()
    } else {
        vec![type_string(result, source)]
    }
}

pub fn params_string(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| {
            if p.name.is_empty() {
                p.type_name.clone()
            } else {
                format!("{} {}", p.name, p.type_name)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render results the way they appear after a parameter list.
pub fn result_string(results: &[String], parenthesized: bool) -> String {
    match results {
        [] => String::new(),
        [single] if !parenthesized || !single.contains(' ') => format!(" {single}"),
        _ => format!(" ({})", results.join(", ")),
    }
}

/// Best-effort rendering of a constant or variable initializer.
pub fn value_string(expr: Node, source: &[u8]) -> String {
    match expr.kind() {
        "interpreted_string_literal"
        | "raw_string_literal"
        | "int_literal"
        | "float_literal"
        | "imaginary_literal"
        | "rune_literal"
        | "true"
        | "false"
        | "nil"
        | "iota"
        | "identifier" => node_text(expr, source).to_string(),
        "selector_expression" => {
            let operand = expr.child_by_field_name("operand");
            let field = expr.child_by_field_name("field");
            match (operand, field) {
                (Some(o), Some(f)) if o.kind() == "identifier" => {
                    format!("{}.{}", node_text(o, source), node_text(f, source))
                }
                _ => COMPLEX_VALUE.to_string(),
            }
        }
        "unary_expression" => {
            let op = expr
                .child_by_field_name("operator")
                .map(|o| node_text(o, source))
                .unwrap_or("");
            match expr.child_by_field_name("operand") {
                Some(operand) if matches!(op, "-" | "+" | "^" | "!") => {
                    let inner = value_string(operand, source);
                    if inner == COMPLEX_VALUE {
                        inner
                    } else {
                        format!("{op}{inner}")
                    }
                }
                _ => COMPLEX_VALUE.to_string(),
            }
        }
        "parenthesized_expression" => {
            let mut cursor = expr.walk();
            let inner = expr.named_children(&mut cursor).next();
            inner
                .map(|n| value_string(n, source))
                .unwrap_or_else(|| COMPLEX_VALUE.to_string())
        }
        _ => COMPLEX_VALUE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::code_parser::CodeParser;
    use crate::indexer::languages::Language;
    use std::path::Path;

    /// Render the type of the first type spec in `decl`.
    fn render_type(decl: &str) -> String {
        let src = format!("package p\n\n{decl}\n");
        let mut parser = CodeParser::new(Language::Go).unwrap();
        let tree = parser.parse_strict(src.as_bytes(), Path::new("p.go")).unwrap();
        let root = tree.root_node();
        let mut cursor = root.walk();
        let type_decl = root
            .children(&mut cursor)
            .find(|n| n.kind() == "type_declaration")
            .unwrap();
        let mut spec_cursor = type_decl.walk();
        let spec = type_decl
            .named_children(&mut spec_cursor)
            .find(|n| n.kind() == "type_spec")
            .unwrap();
        type_string(spec.child_by_field_name("type").unwrap(), src.as_bytes())
    }

    #[test]
    fn test_type_forms() {
        assert_eq!(render_type("type A *Node"), "*Node");
        assert_eq!(render_type("type A []string"), "[]string");
        assert_eq!(render_type("type A [4]byte"), "[4]byte");
        assert_eq!(render_type("type A map[string][]int"), "map[string][]int");
        assert_eq!(render_type("type A http.Handler"), "http.Handler");
        assert_eq!(render_type("type A map[string]interface{ Close() }"), "map[string]interface{}");
        assert_eq!(render_type("type A <-chan int"), "<-chan int");
        assert_eq!(render_type("type A func(a int, b ...string) (int, error)"), "func(a int, b ...string) (int, error)");
    }

    #[test]
    fn test_result_string() {
        assert_eq!(result_string(&[], false), "");
        assert_eq!(result_string(&["error".into()], false), " error");
        assert_eq!(result_string(&["int".into(), "error".into()], true), " (int, error)");
        assert_eq!(result_string(&["n int".into()], true), " (n int)");
    }
}
