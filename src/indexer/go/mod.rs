//! Go extractor: one compilation unit per package directory.
//!
//! Indexing runs in two phases. Phase 1 walks the freshly parsed trees and
//! records every declaration's location in a [`BodyIndex`]. Phase 2 runs the
//! documentation pass ([`docs::PackageDoc`]), which regroups declarations;
//! code excerpts and end lines are then looked up by key in the phase-1
//! index, so whatever the doc pass reshapes cannot skew them.

pub mod docs;
pub mod types;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use tree_sitter::Tree;

use self::docs::{DocFunc, DocType, DocValue, KeyCounter, PackageDoc, is_single_spec, receiver_of, spec_nodes};
use super::code_parser::{BodyIndex, BodyRef, CodeParser, node_text};
use super::languages::Language;
use super::symbols::{CompilationUnit, FunctionSymbol, Span, TypeKind, TypeSymbol, ValueSymbol};
use crate::error::Result;

/// One parsed file of a package.
pub struct GoFile {
    pub path: String,
    pub source: Vec<u8>,
    pub tree: Tree,
}

pub struct GoExtractor {
    parser: CodeParser,
    exported_only: bool,
}

impl GoExtractor {
    pub fn new(exported_only: bool) -> Result<Self> {
        Ok(Self {
            parser: CodeParser::new(Language::Go)?,
            exported_only,
        })
    }

    /// Extract the package made of `paths`, all inside `dir`. Files that
    /// fail to read or parse are dropped; `None` means none survived.
    pub fn extract_files(
        &mut self,
        dir: &Path,
        paths: &[PathBuf],
    ) -> Option<CompilationUnit> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let source = match fs::read(path) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Skipping unreadable Go file {}: {e}", path.display());
                    continue;
                }
            };
            match self.parser.parse_strict(&source, path) {
                Ok(tree) => files.push(GoFile {
                    path: path.to_string_lossy().replace('\\', "/"),
                    source,
                    tree,
                }),
                Err(e) => warn!("Dropping Go file from package: {e}"),
            }
        }

        if files.is_empty() {
            debug!("No parseable Go files in {}", dir.display());
            return None;
        }

        let index = build_body_index(&files);
        let doc = PackageDoc::collect(&files, self.exported_only);
        Some(assemble(dir, &files, &index, doc))
    }
}

/// Phase 1: key every top-level declaration to its location.
///
/// Keys are handed out in the same order as [`PackageDoc::collect`] does.
pub fn build_body_index(files: &[GoFile]) -> BodyIndex {
    let mut index = BodyIndex::default();
    let mut keys = KeyCounter::default();
    for (idx, file) in files.iter().enumerate() {
        let source = file.source.as_slice();
        let root = file.tree.root_node();
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            match node.kind() {
                "function_declaration" => {
                    if let Some(name) = node.child_by_field_name("name") {
                        let key = keys.next(node_text(name, source).to_string());
                        index.insert(key, BodyRef::from_node(idx, node, Some(name)));
                    }
                }
                "method_declaration" => {
                    if let Some(name) = node.child_by_field_name("name") {
                        let base = receiver_of(node, source).map(|(_, b)| b).unwrap_or_default();
                        let key = keys.next(format!("{base}.{}", node_text(name, source)));
                        index.insert(key, BodyRef::from_node(idx, node, Some(name)));
                    }
                }
                "type_declaration" => {
                    let kinds = ["type_spec", "type_alias"];
                    let single = is_single_spec(node, &kinds);
                    for spec in spec_nodes(node, &kinds) {
                        if let Some(name) = spec.child_by_field_name("name") {
                            let key = keys.next(node_text(name, source).to_string());
                            let decl = if single { node } else { spec };
                            index.insert(key, BodyRef::from_node(idx, decl, Some(name)));
                        }
                    }
                }
                "const_declaration" | "var_declaration" => {
                    let (kind, prefix) = if node.kind() == "const_declaration" {
                        ("const_spec", "const")
                    } else {
                        ("var_spec", "var")
                    };
                    let single = is_single_spec(node, &[kind]);
                    for spec in spec_nodes(node, &[kind]) {
                        let decl = if single { node } else { spec };
                        let mut name_cursor = spec.walk();
                        for name in spec.children_by_field_name("name", &mut name_cursor) {
                            let key = keys.next(format!("{prefix}:{}", node_text(name, source)));
                            index.insert(key, BodyRef::from_node(idx, decl, Some(name)));
                        }
                    }
                }
                _ => {}
            }
        }
    }
    index
}

/// Stitch the doc pass output and the body index into a symbol table.
fn assemble(dir: &Path, files: &[GoFile], index: &BodyIndex, doc: PackageDoc) -> CompilationUnit {
    let mut unit = CompilationUnit::new(Language::Go, dir.to_string_lossy().replace('\\', "/"));
    unit.package = doc.name.clone();
    if let Some(file) = doc.doc_file {
        unit.doc = doc.doc.clone();
        unit.doc_file = files[file].path.clone();
        unit.doc_span = doc.doc_span;
    }
    for file in files {
        collect_imports(file, &mut unit);
    }

    for ty in &doc.types {
        unit.types.push(type_symbol(ty, files, index));
        for ctor in &ty.constructors {
            let mut func = function_symbol(ctor, files, index);
            func.type_deps.push(ty.name.clone());
            func.constructs = Some(ty.name.clone());
            unit.functions.push(func);
        }
    }
    for func in &doc.funcs {
        unit.functions.push(function_symbol(func, files, index));
    }
    for value in &doc.consts {
        unit.constants.push(value_symbol(value, files, index));
    }
    for value in &doc.vars {
        unit.variables.push(value_symbol(value, files, index));
    }
    unit
}

fn collect_imports(file: &GoFile, unit: &mut CompilationUnit) {
    let source = file.source.as_slice();
    let root = file.tree.root_node();
    let mut cursor = root.walk();
    for decl in root.named_children(&mut cursor) {
        if decl.kind() != "import_declaration" {
            continue;
        }
        for spec in spec_nodes(decl, &["import_spec"]) {
            let Some(path) = spec.child_by_field_name("path") else {
                continue;
            };
            let target = node_text(path, source).trim_matches(['"', '`']).to_string();
            let alias = spec
                .child_by_field_name("name")
                .map(|n| node_text(n, source).to_string())
                .unwrap_or_else(|| target.rsplit('/').next().unwrap_or(&target).to_string());
            unit.imports.add(alias, target);
        }
    }
}

fn locate<'a>(key: &str, files: &'a [GoFile], index: &BodyIndex) -> (String, Span, &'a str) {
    match index.get(key) {
        Some(body) => {
            let file = &files[body.file];
            (file.path.clone(), body.span, body.excerpt(&file.source))
        }
        None => (String::new(), Span::new(1, 1), ""),
    }
}

fn function_symbol(func: &DocFunc, files: &[GoFile], index: &BodyIndex) -> FunctionSymbol {
    let (file_path, span, code) = locate(&func.key, files, index);
    let file_path = if file_path.is_empty() {
        files[func.file].path.clone()
    } else {
        file_path
    };
    FunctionSymbol {
        name: func.name.clone(),
        file_path,
        span,
        signature: func.signature(),
        doc: func.doc.clone(),
        code: code.to_string(),
        receiver: func.receiver_type.clone(),
        params: func.params.clone(),
        returns: func.returns.clone(),
        ..Default::default()
    }
}

fn type_symbol(ty: &DocType, files: &[GoFile], index: &BodyIndex) -> TypeSymbol {
    let (file_path, span, code) = locate(&ty.key, files, index);
    let methods = if ty.kind == TypeKind::Interface {
        ty.interface_methods
            .iter()
            .map(|m| FunctionSymbol {
                name: m.name.clone(),
                file_path: file_path.clone(),
                signature: m.method_spec(),
                doc: m.doc.clone(),
                params: m.params.clone(),
                returns: m.returns.clone(),
                is_abstract: true,
                ..Default::default()
            })
            .collect()
    } else {
        ty.methods
            .iter()
            .map(|m| function_symbol(m, files, index))
            .collect()
    };
    let dependencies = ty
        .fields
        .iter()
        .filter(|f| f.embedded)
        .map(|f| f.type_name.trim_start_matches('*').to_string())
        .collect();
    TypeSymbol {
        name: ty.name.clone(),
        kind: ty.kind,
        file_path: if file_path.is_empty() {
            files[ty.file].path.clone()
        } else {
            file_path
        },
        span,
        signature: ty.signature(),
        doc: ty.doc.clone(),
        code: code.to_string(),
        fields: ty.fields.clone(),
        methods,
        dependencies,
        ..Default::default()
    }
}

fn value_symbol(value: &DocValue, files: &[GoFile], index: &BodyIndex) -> ValueSymbol {
    let (file_path, span, code) = locate(&value.key, files, index);
    ValueSymbol {
        name: value.name.clone(),
        file_path: if file_path.is_empty() {
            files[value.file].path.clone()
        } else {
            file_path
        },
        span,
        signature: value.signature(),
        doc: value.doc.clone(),
        code: code.to_string(),
        type_name: value.type_name.clone(),
        value: value.value.clone(),
        is_const: value.is_const,
    }
}
