//! Flattens a [`CompilationUnit`] into chunks.
//!
//! One chunk per function, type, member, value and section, plus a `File`
//! chunk when the unit carries a package or module doc. Members name their
//! enclosing type in `parent`.

use serde_json::{Value, json};

use super::languages::Language;
use super::symbols::{
    CompilationUnit, FunctionSymbol, PropertySymbol, SectionSymbol, Span, TypeKind, TypeSymbol,
    ValueSymbol,
};
use crate::chunk::{Chunk, ChunkKind};

pub fn unit_to_chunks(unit: &CompilationUnit) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    if let Some(chunk) = file_chunk(unit) {
        chunks.push(chunk);
    }
    for func in &unit.functions {
        chunks.push(function_chunk(unit, func, ChunkKind::Function, func.constructs.clone()));
    }
    for ty in &unit.types {
        type_chunks(unit, ty, &mut chunks);
    }
    for value in &unit.constants {
        chunks.push(value_chunk(unit, value, ChunkKind::Const, None));
    }
    for value in &unit.variables {
        chunks.push(value_chunk(unit, value, ChunkKind::Var, None));
    }
    for section in &unit.sections {
        chunks.push(section_chunk(unit, section));
    }
    chunks
}

fn base_chunk(
    unit: &CompilationUnit,
    kind: ChunkKind,
    name: &str,
    file_path: &str,
    span: Span,
) -> Chunk {
    let mut chunk = Chunk::new(
        kind,
        name,
        unit.language.as_str(),
        file_path,
        span.start_line.max(1),
        span.end_line,
    )
    .with_package(unit.package.clone());
    if span.name_start > 0 {
        chunk = chunk.with_selection(span.name_start, span.name_end);
    }
    chunk
}

fn flag(chunk: &mut Chunk, key: &str, on: bool) {
    if on {
        chunk.set_meta(key, true);
    }
}

fn file_chunk(unit: &CompilationUnit) -> Option<Chunk> {
    if unit.doc.is_empty() {
        return None;
    }
    let signature = match unit.language {
        Language::Go => format!("package {}", unit.package),
        Language::Python => format!("module {}", unit.package),
        Language::Php | Language::Markdown => String::new(),
    };
    let mut chunk = base_chunk(unit, ChunkKind::File, &unit.package, &unit.doc_file, unit.doc_span)
        .with_signature(signature)
        .with_docstring(unit.doc.clone());
    chunk.set_meta("imports", json!(unit.imports.iter().collect::<Vec<_>>()));
    Some(chunk)
}

fn function_chunk(
    unit: &CompilationUnit,
    func: &FunctionSymbol,
    kind: ChunkKind,
    parent: Option<String>,
) -> Chunk {
    let mut chunk = base_chunk(unit, kind, &func.name, &func.file_path, func.span)
        .with_parent(parent)
        .with_signature(func.signature.clone())
        .with_docstring(func.doc.clone())
        .with_code(func.code.clone());

    chunk.set_meta("params", json!(func.params));
    chunk.set_meta("returns", json!(func.returns));
    chunk.set_meta("decorators", json!(func.decorators));
    if let Some(receiver) = &func.receiver {
        chunk.set_meta("receiver", receiver.clone());
    }
    if unit.language == Language::Php && kind == ChunkKind::Method {
        chunk.set_meta("visibility", func.visibility.as_str());
    }
    if let Some(ty) = &func.constructs {
        chunk.set_meta("constructor_of", ty.clone());
    }
    flag(&mut chunk, "is_static", func.is_static);
    flag(&mut chunk, "is_abstract", func.is_abstract);
    flag(&mut chunk, "is_async", func.is_async);
    flag(
        &mut chunk,
        "is_classmethod",
        func.decorators.iter().any(|d| d == "classmethod"),
    );
    chunk.set_meta("calls", json!(func.calls));
    chunk.set_meta("type_deps", json!(func.type_deps));
    chunk
}

fn type_kind_name(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::Struct => "struct",
        TypeKind::Interface => "interface",
        TypeKind::Alias => "alias",
        TypeKind::Class => "class",
        TypeKind::Trait => "trait",
        TypeKind::Enum => "enum",
        TypeKind::Other => "other",
    }
}

fn type_chunks(unit: &CompilationUnit, ty: &TypeSymbol, chunks: &mut Vec<Chunk>) {
    let kind = match ty.kind {
        TypeKind::Class => ChunkKind::Class,
        TypeKind::Interface => ChunkKind::Interface,
        TypeKind::Trait => ChunkKind::Trait,
        TypeKind::Struct | TypeKind::Alias | TypeKind::Enum | TypeKind::Other => ChunkKind::Type,
    };
    let mut chunk = base_chunk(unit, kind, &ty.name, &ty.file_path, ty.span)
        .with_signature(ty.signature.clone())
        .with_docstring(ty.doc.clone())
        .with_code(ty.code.clone());
    if !ty.namespace.is_empty() {
        chunk.package = ty.namespace.clone();
        chunk.set_meta("qualified_name", ty.qualified_name());
    }
    chunk.set_meta("type_kind", type_kind_name(ty.kind));
    chunk.set_meta("fields", json!(ty.fields));
    chunk.set_meta("bases", json!(ty.bases));
    chunk.set_meta("interfaces", json!(ty.interfaces));
    chunk.set_meta("traits", json!(ty.traits));
    chunk.set_meta("decorators", json!(ty.decorators));
    if let Some(meta) = &ty.metaclass {
        chunk.set_meta("metaclass", meta.clone());
    }
    chunk.set_meta("dependencies", json!(ty.dependencies));
    flag(&mut chunk, "is_abstract", ty.is_abstract);

    // Interface methods have no body of their own.
    if ty.kind == TypeKind::Interface && unit.language == Language::Go {
        let specs: Vec<Value> = ty
            .methods
            .iter()
            .map(|m| json!({ "name": m.name, "signature": m.signature, "doc": m.doc }))
            .collect();
        chunk.set_meta("methods", Value::Array(specs));
        chunks.push(chunk);
        return;
    }
    let names: Vec<&str> = ty.methods.iter().map(|m| m.name.as_str()).collect();
    chunk.set_meta("methods", json!(names));
    chunks.push(chunk);

    let parent = Some(ty.name.clone());
    for method in &ty.methods {
        chunks.push(function_chunk(unit, method, ChunkKind::Method, parent.clone()));
    }
    for prop in &ty.properties {
        chunks.push(property_chunk(unit, prop, parent.clone()));
    }
    for value in &ty.constants {
        let mut chunk = value_chunk(unit, value, ChunkKind::Const, parent.clone());
        flag(&mut chunk, "enum_case", value.type_name == "case" && ty.kind == TypeKind::Enum);
        chunks.push(chunk);
    }
}

fn property_chunk(unit: &CompilationUnit, prop: &PropertySymbol, parent: Option<String>) -> Chunk {
    let mut chunk = base_chunk(unit, ChunkKind::Property, &prop.name, &prop.file_path, prop.span)
        .with_parent(parent)
        .with_signature(prop.signature.clone())
        .with_docstring(prop.doc.clone())
        .with_code(prop.code.clone());
    chunk.set_meta("type", prop.type_name.clone());
    if unit.language == Language::Php {
        chunk.set_meta("visibility", prop.visibility.as_str());
    }
    flag(&mut chunk, "is_static", prop.is_static);
    flag(&mut chunk, "getter", prop.has_getter);
    flag(&mut chunk, "setter", prop.has_setter);
    flag(&mut chunk, "deleter", prop.has_deleter);
    if let Some(default) = prop.default.as_ref().and_then(|d| d.to_json()) {
        chunk.set_meta("default", default);
    }
    chunk
}

fn value_chunk(
    unit: &CompilationUnit,
    value: &ValueSymbol,
    kind: ChunkKind,
    parent: Option<String>,
) -> Chunk {
    let mut chunk = base_chunk(unit, kind, &value.name, &value.file_path, value.span)
        .with_parent(parent)
        .with_signature(value.signature.clone())
        .with_docstring(value.doc.clone())
        .with_code(value.code.clone());
    if value.type_name != "case" {
        chunk.set_meta("type", value.type_name.clone());
    }
    chunk.set_meta("value", value.value.clone());
    chunk
}

fn section_chunk(unit: &CompilationUnit, section: &SectionSymbol) -> Chunk {
    let parent = section
        .path
        .len()
        .checked_sub(2)
        .and_then(|i| section.path.get(i))
        .cloned();
    let mut chunk = base_chunk(unit, ChunkKind::Section, &section.title, &section.file_path, section.span)
        .with_parent(parent)
        .with_signature(format!("{} {}", "#".repeat(section.level), section.title))
        .with_docstring(section.summary.clone())
        .with_code(section.code.clone());
    chunk.set_meta("level", section.level);
    chunk.set_meta("path", json!(section.path));
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::markdown::MarkdownExtractor;
    use crate::indexer::php::PhpExtractor;
    use crate::indexer::python::PythonExtractor;
    use std::path::Path;

    const PHP_SRC: &str = r#"<?php
namespace App\Models;

use Illuminate\Database\Eloquent\Model;

/** A blog post. */
class Post extends Model
{
    protected $table = 'posts';
    const STATUS = 'draft';

    public function author()
    {
        return $this->belongsTo(User::class);
    }
}

enum Suit: string
{
    case Hearts = 'H';
}
"#;

    #[test]
    fn test_php_class_members() {
        let unit = PhpExtractor::new()
            .unwrap()
            .extract_source(Path::new("app/Models/Post.php"), PHP_SRC.as_bytes())
            .unwrap();
        let chunks = unit_to_chunks(&unit);
        let kinds: Vec<(ChunkKind, &str)> =
            chunks.iter().map(|c| (c.kind, c.name.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (ChunkKind::Class, "Post"),
                (ChunkKind::Method, "author"),
                (ChunkKind::Property, "table"),
                (ChunkKind::Const, "STATUS"),
                (ChunkKind::Type, "Suit"),
                (ChunkKind::Const, "Hearts"),
            ]
        );

        let post = &chunks[0];
        assert_eq!(post.package, "App\\Models");
        assert_eq!(post.docstring, "A blog post.");
        assert_eq!(post.meta("qualified_name"), Some(&json!("App\\Models\\Post")));
        assert_eq!(post.meta("bases"), Some(&json!(["Model"])));

        let author = &chunks[1];
        assert_eq!(author.parent.as_deref(), Some("Post"));
        assert_eq!(author.meta("visibility"), Some(&json!("public")));

        let table = &chunks[2];
        assert_eq!(table.meta("default"), Some(&json!("posts")));
        assert_eq!(table.meta("visibility"), Some(&json!("protected")));

        assert_eq!(chunks[4].meta("type_kind"), Some(&json!("enum")));
        assert_eq!(chunks[5].meta("enum_case"), Some(&json!(true)));
    }

    #[test]
    fn test_python_module_chunks() {
        let src = "\"\"\"Helpers.\"\"\"\nimport os\n\nclass Box:\n    @property\n    def size(self) -> int:\n        return 1\n\n    @classmethod\n    def make(cls):\n        return cls()\n\nLIMIT = 10\n";
        let unit = PythonExtractor::extract_source(Path::new("util/box.py"), src);
        let chunks = unit_to_chunks(&unit);
        let kinds: Vec<(ChunkKind, &str)> =
            chunks.iter().map(|c| (c.kind, c.name.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (ChunkKind::File, "box"),
                (ChunkKind::Class, "Box"),
                (ChunkKind::Method, "make"),
                (ChunkKind::Property, "size"),
                (ChunkKind::Const, "LIMIT"),
            ]
        );
        assert_eq!(chunks[0].signature, "module box");
        assert_eq!(
            chunks[0].meta("imports"),
            Some(&json!([{ "alias": "os", "target": "os" }]))
        );
        assert_eq!(chunks[2].meta("is_classmethod"), Some(&json!(true)));
        assert_eq!(chunks[2].selection_start, Some(10));
        assert_eq!(chunks[3].meta("getter"), Some(&json!(true)));
        assert!(chunks.iter().all(|c| c.language == "python"));
    }

    #[test]
    fn test_markdown_sections() {
        let unit = MarkdownExtractor::extract_source(
            Path::new("README.md"),
            "# Title\n\nIntro.\n\n## Part\n\nBody.\n",
        );
        let chunks = unit_to_chunks(&unit);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].kind, ChunkKind::Section);
        assert_eq!(chunks[0].parent, None);
        assert_eq!(chunks[1].parent.as_deref(), Some("Title"));
        assert_eq!(chunks[1].signature, "## Part");
        assert_eq!(chunks[1].meta("path"), Some(&json!(["Title", "Part"])));
        assert_eq!(chunks[1].docstring, "Body.");
    }

    #[test]
    fn test_lines_are_ordered() {
        let unit = PythonExtractor::extract_source(Path::new("a.py"), "def f():\n    pass\n");
        for chunk in unit_to_chunks(&unit) {
            assert!(chunk.start_line <= chunk.end_line);
            assert!(!chunk.file_path.is_empty());
        }
    }
}
