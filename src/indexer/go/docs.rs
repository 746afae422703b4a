//! Documentation pass over a parsed Go package.
//!
//! Groups methods and constructors under their types, attaches doc comments
//! and renders declaration shapes. The result holds declaration keys, never
//! node references; bodies are looked up in the package's
//! [`BodyIndex`](crate::indexer::code_parser::BodyIndex).

use std::collections::HashMap;

use tree_sitter::Node;

use super::GoFile;
use super::types::{
    parameter_list, params_string, result_string, result_types, type_string, value_string,
};
use crate::indexer::code_parser::{doc_comment, end_line, leading_comments, node_text, start_line};
use crate::indexer::symbols::{FieldSymbol, Param, Span, TypeKind, normalize_ws};

#[derive(Debug, Clone, Default)]
pub struct DocFunc {
    pub key: String,
    pub name: String,
    /// Receiver base type (`Server` for `(s *Server)`).
    pub receiver_type: Option<String>,
    /// Receiver as written, normalised (`s *Server`).
    pub receiver: Option<String>,
    pub type_params: String,
    pub params: Vec<Param>,
    pub returns: Vec<String>,
    pub results_parenthesized: bool,
    pub doc: String,
    pub file: usize,
}

impl DocFunc {
    pub fn signature(&self) -> String {
        let recv = self
            .receiver
            .as_ref()
            .map(|r| format!("({r}) "))
            .unwrap_or_default();
        format!(
            "func {recv}{}{}({}){}",
            self.name,
            self.type_params,
            params_string(&self.params),
            result_string(&self.returns, self.results_parenthesized)
        )
    }

    /// Signature without the `func` keyword, as listed inside an interface.
    pub fn method_spec(&self) -> String {
        format!(
            "{}({}){}",
            self.name,
            params_string(&self.params),
            result_string(&self.returns, self.results_parenthesized)
        )
    }

    fn is_exported(&self) -> bool {
        is_exported(&self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocType {
    pub key: String,
    pub name: String,
    pub kind: TypeKind,
    pub type_params: String,
    pub underlying: String,
    pub fields: Vec<FieldSymbol>,
    pub interface_methods: Vec<DocFunc>,
    pub doc: String,
    pub file: usize,
    pub methods: Vec<DocFunc>,
    pub constructors: Vec<DocFunc>,
}

impl DocType {
    pub fn signature(&self) -> String {
        match self.kind {
            TypeKind::Struct => format!("type {}{} struct", self.name, self.type_params),
            TypeKind::Interface => format!("type {}{} interface", self.name, self.type_params),
            TypeKind::Alias => format!("type {}{} = {}", self.name, self.type_params, self.underlying),
            _ => format!("type {}{} {}", self.name, self.type_params, self.underlying),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocValue {
    pub key: String,
    pub name: String,
    pub type_name: String,
    pub value: String,
    pub is_const: bool,
    pub doc: String,
    pub file: usize,
}

impl DocValue {
    pub fn signature(&self) -> String {
        let keyword = if self.is_const { "const" } else { "var" };
        let mut sig = format!("{keyword} {}", self.name);
        if !self.type_name.is_empty() {
            sig.push(' ');
            sig.push_str(&self.type_name);
        }
        if !self.value.is_empty() {
            sig.push_str(" = ");
            sig.push_str(&self.value);
        }
        sig
    }
}

#[derive(Debug, Default)]
pub struct PackageDoc {
    pub name: String,
    pub doc: String,
    pub doc_file: Option<usize>,
    pub doc_span: Span,
    pub types: Vec<DocType>,
    pub funcs: Vec<DocFunc>,
    pub consts: Vec<DocValue>,
    pub vars: Vec<DocValue>,
}

/// Hands out declaration keys. A repeated name (several `init` functions,
/// `_` variables) gets a `#n` suffix so every declaration keeps its own key.
/// Both indexing phases walk declarations in the same order and agree.
#[derive(Default)]
pub struct KeyCounter {
    seen: HashMap<String, usize>,
}

impl KeyCounter {
    pub fn next(&mut self, base: String) -> String {
        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}#{count}")
        }
    }
}

pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Receiver base type name: `*List[T]` → `List`.
pub fn receiver_base(receiver_type: &str) -> String {
    receiver_type
        .trim_start_matches('*')
        .split('[')
        .next()
        .unwrap_or("")
        .to_string()
}

/// Receiver pieces of a method declaration: rendered text and base type.
pub fn receiver_of(method: Node, source: &[u8]) -> Option<(String, String)> {
    let list = method.child_by_field_name("receiver")?;
    let param = parameter_list(list, source).into_iter().next()?;
    let base = receiver_base(&param.type_name);
    let rendered = if param.name.is_empty() {
        param.type_name
    } else {
        format!("{} {}", param.name, param.type_name)
    };
    Some((rendered, base))
}

/// The spec nodes of a grouped or single declaration.
pub fn spec_nodes<'t>(decl: Node<'t>, spec_kinds: &[&str]) -> Vec<Node<'t>> {
    let mut specs = Vec::new();
    let mut cursor = decl.walk();
    for child in decl.named_children(&mut cursor) {
        if spec_kinds.contains(&child.kind()) {
            specs.push(child);
        } else if child.kind().ends_with("_spec_list") {
            specs.extend(spec_nodes(child, spec_kinds));
        }
    }
    specs
}

/// Whether `decl` holds exactly one spec written without parentheses.
pub fn is_single_spec(decl: Node, spec_kinds: &[&str]) -> bool {
    let mut cursor = decl.walk();
    let grouped = decl.children(&mut cursor).any(|c| c.kind() == "(");
    !grouped && spec_nodes(decl, spec_kinds).len() == 1
}

impl PackageDoc {
    pub fn collect(files: &[GoFile], exported_only: bool) -> Self {
        let mut doc = PackageDoc::default();
        let mut methods = Vec::new();
        let mut keys = KeyCounter::default();

        for (idx, file) in files.iter().enumerate() {
            let source = file.source.as_slice();
            let root = file.tree.root_node();
            let mut cursor = root.walk();
            for node in root.named_children(&mut cursor) {
                match node.kind() {
                    "package_clause" => {
                        if doc.name.is_empty() {
                            let mut pc = node.walk();
                            if let Some(name) = node
                                .named_children(&mut pc)
                                .find(|c| c.kind() == "package_identifier")
                            {
                                doc.name = node_text(name, source).to_string();
                            }
                        }
                        let text = doc_comment(node, source);
                        if doc.doc.is_empty() && !text.is_empty() {
                            doc.doc = text;
                            doc.doc_file = Some(idx);
                            let first = leading_comments(node)
                                .first()
                                .map(|c| start_line(*c))
                                .unwrap_or_else(|| start_line(node));
                            doc.doc_span = Span::new(first, end_line(node));
                        }
                    }
                    "function_declaration" => {
                        let Some(name) = node.child_by_field_name("name") else {
                            continue;
                        };
                        let name = node_text(name, source).to_string();
                        let key = keys.next(name.clone());
                        doc.funcs.push(func_doc(node, source, idx, key, name, None));
                    }
                    "method_declaration" => {
                        let Some(name) = node.child_by_field_name("name") else {
                            continue;
                        };
                        let name = node_text(name, source).to_string();
                        let recv = receiver_of(node, source);
                        let base = recv.as_ref().map(|(_, b)| b.clone()).unwrap_or_default();
                        let key = keys.next(format!("{base}.{name}"));
                        methods.push(func_doc(node, source, idx, key, name, recv));
                    }
                    "type_declaration" => {
                        for spec in spec_nodes(node, &["type_spec", "type_alias"]) {
                            let Some(name) = spec.child_by_field_name("name") else {
                                continue;
                            };
                            let name = node_text(name, source).to_string();
                            let key = keys.next(name.clone());
                            let mut ty = type_doc(spec, source, idx, key, name);
                            if ty.doc.is_empty() {
                                ty.doc = doc_comment(node, source);
                            }
                            doc.types.push(ty);
                        }
                    }
                    "const_declaration" | "var_declaration" => {
                        let is_const = node.kind() == "const_declaration";
                        let (spec_kind, prefix) = if is_const {
                            ("const_spec", "const")
                        } else {
                            ("var_spec", "var")
                        };
                        let decl_doc = doc_comment(node, source);
                        for spec in spec_nodes(node, &[spec_kind]) {
                            for mut value in value_docs(spec, source, idx, is_const) {
                                value.key = keys.next(format!("{prefix}:{}", value.name));
                                if value.doc.is_empty() {
                                    value.doc = decl_doc.clone();
                                }
                                if is_const {
                                    doc.consts.push(value);
                                } else {
                                    doc.vars.push(value);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        doc.attach_methods(methods);
        doc.attach_constructors();
        if exported_only {
            doc.retain_exported();
        }
        doc
    }

    fn attach_methods(&mut self, methods: Vec<DocFunc>) {
        for method in methods {
            let target = method
                .receiver_type
                .as_deref()
                .and_then(|recv| self.types.iter_mut().find(|t| t.name == recv));
            match target {
                Some(ty) => ty.methods.push(method),
                None => self.funcs.push(method),
            }
        }
    }

    /// Move plain functions returning `T` or `*T` under type `T`.
    fn attach_constructors(&mut self) {
        let mut remaining = Vec::with_capacity(self.funcs.len());
        for func in std::mem::take(&mut self.funcs) {
            let produced = if func.receiver.is_none() {
                func.returns
                    .first()
                    .map(|r| r.rsplit(' ').next().unwrap_or(r))
                    .map(receiver_base)
            } else {
                None
            };
            let target = produced.and_then(|name| self.types.iter_mut().find(|t| t.name == name));
            match target {
                Some(ty) => ty.constructors.push(func),
                None => remaining.push(func),
            }
        }
        self.funcs = remaining;
    }

    fn retain_exported(&mut self) {
        self.funcs.retain(|f| {
            f.is_exported() && f.receiver_type.as_deref().is_none_or(is_exported)
        });
        self.consts.retain(|v| is_exported(&v.name));
        self.vars.retain(|v| is_exported(&v.name));
        self.types.retain(|t| is_exported(&t.name));
        for ty in &mut self.types {
            ty.methods.retain(DocFunc::is_exported);
            ty.constructors.retain(DocFunc::is_exported);
            ty.fields.retain(|f| f.embedded || is_exported(&f.name));
        }
    }
}

fn func_doc(
    node: Node,
    source: &[u8],
    file: usize,
    key: String,
    name: String,
    receiver: Option<(String, String)>,
) -> DocFunc {
    let params = node
        .child_by_field_name("parameters")
        .map(|p| parameter_list(p, source))
        .unwrap_or_default();
    let result = node.child_by_field_name("result");
    let (returns, results_parenthesized) = match result {
        Some(r) => (result_types(r, source), r.kind() == "parameter_list"),
        None => (Vec::new(), false),
    };
    let type_params = node
        .child_by_field_name("type_parameters")
        .map(|t| normalize_ws(node_text(t, source)))
        .unwrap_or_default();
    let (receiver, receiver_type) = match receiver {
        Some((rendered, base)) => (Some(rendered), Some(base)),
        None => (None, None),
    };
    DocFunc {
        key,
        name,
        receiver_type,
        receiver,
        type_params,
        params,
        returns,
        results_parenthesized,
        doc: doc_comment(node, source),
        file,
    }
}

fn type_doc(spec: Node, source: &[u8], file: usize, key: String, name: String) -> DocType {
    let type_node = spec.child_by_field_name("type");
    let type_params = spec
        .child_by_field_name("type_parameters")
        .map(|t| normalize_ws(node_text(t, source)))
        .unwrap_or_default();
    let mut ty = DocType {
        key,
        name,
        type_params,
        doc: doc_comment(spec, source),
        file,
        ..Default::default()
    };
    let Some(type_node) = type_node else {
        ty.kind = TypeKind::Other;
        return ty;
    };
    ty.underlying = type_string(type_node, source);
    ty.kind = if spec.kind() == "type_alias" {
        TypeKind::Alias
    } else {
        match type_node.kind() {
            "struct_type" => TypeKind::Struct,
            "interface_type" => TypeKind::Interface,
            _ => TypeKind::Other,
        }
    };
    match ty.kind {
        TypeKind::Struct => ty.fields = struct_fields(type_node, source),
        TypeKind::Interface => {
            let (methods, embeds) = interface_elems(type_node, source, file);
            ty.interface_methods = methods;
            ty.fields = embeds;
        }
        _ => {}
    }
    ty
}

fn struct_fields(struct_type: Node, source: &[u8]) -> Vec<FieldSymbol> {
    let mut fields = Vec::new();
    let mut cursor = struct_type.walk();
    let Some(list) = struct_type
        .named_children(&mut cursor)
        .find(|c| c.kind() == "field_declaration_list")
    else {
        return fields;
    };
    let mut list_cursor = list.walk();
    for decl in list.named_children(&mut list_cursor) {
        if decl.kind() != "field_declaration" {
            continue;
        }
        let Some(type_node) = decl.child_by_field_name("type") else {
            continue;
        };
        let mut type_name = type_string(type_node, source);
        let tag = decl
            .child_by_field_name("tag")
            .map(|t| node_text(t, source).to_string());
        let doc = doc_comment(decl, source);
        let line = start_line(decl);
        let mut name_cursor = decl.walk();
        let names: Vec<String> = decl
            .children_by_field_name("name", &mut name_cursor)
            .map(|n| node_text(n, source).to_string())
            .collect();
        if names.is_empty() {
            if node_text(decl, source).trim_start().starts_with('*') {
                type_name = format!("*{type_name}");
            }
            let name = receiver_base(&type_name);
            let name = name.rsplit('.').next().unwrap_or(&name).to_string();
            fields.push(FieldSymbol {
                name,
                type_name,
                tag,
                doc,
                embedded: true,
                line,
            });
        } else {
            for name in names {
                fields.push(FieldSymbol {
                    name,
                    type_name: type_name.clone(),
                    tag: tag.clone(),
                    doc: doc.clone(),
                    embedded: false,
                    line,
                });
            }
        }
    }
    fields
}

fn interface_elems(
    iface: Node,
    source: &[u8],
    file: usize,
) -> (Vec<DocFunc>, Vec<FieldSymbol>) {
    let mut methods = Vec::new();
    let mut embeds = Vec::new();
    let mut cursor = iface.walk();
    for elem in iface.named_children(&mut cursor) {
        match elem.kind() {
            "method_elem" | "method_spec" => {
                let Some(name) = elem.child_by_field_name("name") else {
                    continue;
                };
                let name = node_text(name, source).to_string();
                let key = name.clone();
                methods.push(func_doc(elem, source, file, key, name, None));
            }
            "type_elem" | "constraint_elem" | "type_identifier" | "qualified_type" => {
                let type_name = type_string(elem, source);
                embeds.push(FieldSymbol {
                    name: type_name.rsplit('.').next().unwrap_or(&type_name).to_string(),
                    type_name,
                    tag: None,
                    doc: doc_comment(elem, source),
                    embedded: true,
                    line: start_line(elem),
                });
            }
            _ => {}
        }
    }
    (methods, embeds)
}

fn value_docs(spec: Node, source: &[u8], file: usize, is_const: bool) -> Vec<DocValue> {
    let type_name = spec
        .child_by_field_name("type")
        .map(|t| type_string(t, source))
        .unwrap_or_default();
    let values: Vec<String> = spec
        .child_by_field_name("value")
        .map(|list| {
            let mut cursor = list.walk();
            list.named_children(&mut cursor)
                .filter(|c| c.kind() != "comment")
                .map(|v| value_string(v, source))
                .collect()
        })
        .unwrap_or_default();
    let doc = doc_comment(spec, source);
    let mut cursor = spec.walk();
    spec.children_by_field_name("name", &mut cursor)
        .enumerate()
        .map(|(i, name)| DocValue {
            key: String::new(),
            name: node_text(name, source).to_string(),
            type_name: type_name.clone(),
            value: values.get(i).cloned().unwrap_or_default(),
            is_const,
            doc: doc.clone(),
            file,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_counter_suffixes_repeats() {
        let mut keys = KeyCounter::default();
        assert_eq!(keys.next("init".into()), "init");
        assert_eq!(keys.next("init".into()), "init#2");
        assert_eq!(keys.next("main".into()), "main");
    }

    #[test]
    fn test_receiver_base() {
        assert_eq!(receiver_base("*Server"), "Server");
        assert_eq!(receiver_base("List[T]"), "List");
        assert_eq!(receiver_base("*List[K, V]"), "List");
    }

    #[test]
    fn test_exported() {
        assert!(is_exported("Serve"));
        assert!(!is_exported("serve"));
        assert!(!is_exported("_"));
    }

    #[test]
    fn test_signatures() {
        let func = DocFunc {
            name: "Get".into(),
            receiver: Some("c *Client".into()),
            params: vec![Param {
                name: "key".into(),
                type_name: "string".into(),
                ..Default::default()
            }],
            returns: vec!["[]byte".into(), "error".into()],
            results_parenthesized: true,
            ..Default::default()
        };
        assert_eq!(func.signature(), "func (c *Client) Get(key string) ([]byte, error)");
        assert_eq!(func.method_spec(), "Get(key string) ([]byte, error)");

        let value = DocValue {
            name: "MaxSize".into(),
            type_name: "int".into(),
            value: "1024".into(),
            is_const: true,
            ..Default::default()
        };
        assert_eq!(value.signature(), "const MaxSize int = 1024");
    }
}
