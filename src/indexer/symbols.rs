//! Per-unit symbol tables produced by the extractors.
//!
//! A [`CompilationUnit`] lives for exactly one unit (a file, or a directory
//! for package-scoped languages). Extractors fill it, [`super::convert`]
//! flattens it into chunks, and the framework passes read it. Nothing here
//! borrows from a syntax tree, so a table outlives the parse that built it.

use serde::Serialize;

use super::languages::Language;
use super::php::literal::Expr;

/// Source range of a declaration. Lines are 1-based and inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
    /// Line range of the declaration's name.
    pub name_start: usize,
    pub name_end: usize,
}

impl Span {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line: end_line.max(start_line),
            name_start: start_line,
            name_end: start_line,
        }
    }

    pub fn with_name_lines(mut self, start: usize, end: usize) -> Self {
        self.name_start = start;
        self.name_end = end.max(start);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Import {
    pub alias: String,
    pub target: String,
}

/// Alias → fully-qualified name, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ImportTable {
    entries: Vec<Import>,
}

impl ImportTable {
    pub fn add(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.entries.push(Import {
            alias: alias.into(),
            target: target.into(),
        });
    }

    /// First import whose alias equals `alias`.
    pub fn resolve(&self, alias: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|i| i.alias == alias)
            .map(|i| i.target.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Import> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub variadic: bool,
}

/// Who receives a call found in a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receiver {
    /// `$this`
    This,
    /// `Name::call()`
    Static(String),
    /// `$var->call()`
    Variable(String),
    /// `call()` with no receiver
    Bare,
    Other,
}

/// A call lowered out of a function body.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub receiver: Receiver,
    pub name: String,
    pub args: Vec<Expr>,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FunctionSymbol {
    pub name: String,
    pub file_path: String,
    pub span: Span,
    pub signature: String,
    pub doc: String,
    pub code: String,
    pub receiver: Option<String>,
    pub params: Vec<Param>,
    pub returns: Vec<String>,
    pub decorators: Vec<String>,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_async: bool,
    /// Deduplicated call names seen in the body (lexical hint).
    pub calls: Vec<String>,
    /// Capitalised type names referenced by the annotations.
    pub type_deps: Vec<String>,
    /// Calls from top-level `return`/expression statements.
    pub body_calls: Vec<CallSite>,
    /// Type this function constructs (Go `NewT` constructors).
    pub constructs: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldSymbol {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub doc: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub embedded: bool,
    pub line: usize,
}

/// Class-level property. Python properties merge their accessors into one
/// record; PHP properties carry the lowered initializer.
#[derive(Debug, Clone, Default)]
pub struct PropertySymbol {
    pub name: String,
    pub file_path: String,
    pub span: Span,
    pub signature: String,
    pub doc: String,
    pub code: String,
    pub type_name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub has_getter: bool,
    pub has_setter: bool,
    pub has_deleter: bool,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, Default)]
pub struct ValueSymbol {
    pub name: String,
    pub file_path: String,
    pub span: Span,
    pub signature: String,
    pub doc: String,
    pub code: String,
    pub type_name: String,
    pub value: String,
    pub is_const: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeKind {
    #[default]
    Struct,
    Interface,
    Alias,
    Class,
    Trait,
    Enum,
    Other,
}

#[derive(Debug, Clone, Default)]
pub struct TypeSymbol {
    pub name: String,
    pub kind: TypeKind,
    pub file_path: String,
    pub span: Span,
    pub signature: String,
    pub doc: String,
    pub code: String,
    /// Namespace the type was declared in (PHP).
    pub namespace: String,
    pub bases: Vec<String>,
    pub interfaces: Vec<String>,
    pub traits: Vec<String>,
    pub decorators: Vec<String>,
    pub metaclass: Option<String>,
    pub fields: Vec<FieldSymbol>,
    pub methods: Vec<FunctionSymbol>,
    pub properties: Vec<PropertySymbol>,
    pub constants: Vec<ValueSymbol>,
    pub dependencies: Vec<String>,
    pub is_abstract: bool,
}

impl TypeSymbol {
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}\\{}", self.namespace, self.name)
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertySymbol> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Documentation-only section (Markdown headings, module docstrings).
#[derive(Debug, Clone, Default)]
pub struct SectionSymbol {
    pub title: String,
    pub level: usize,
    pub path: Vec<String>,
    pub file_path: String,
    pub span: Span,
    pub summary: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub language: Language,
    /// File path, or directory path for package-scoped languages.
    pub path: String,
    pub package: String,
    pub doc: String,
    /// File that carries `doc`.
    pub doc_file: String,
    pub doc_span: Span,
    pub imports: ImportTable,
    pub functions: Vec<FunctionSymbol>,
    pub types: Vec<TypeSymbol>,
    pub constants: Vec<ValueSymbol>,
    pub variables: Vec<ValueSymbol>,
    pub sections: Vec<SectionSymbol>,
}

impl CompilationUnit {
    pub fn new(language: Language, path: impl Into<String>) -> Self {
        Self {
            language,
            path: path.into(),
            package: String::new(),
            doc: String::new(),
            doc_file: String::new(),
            doc_span: Span::default(),
            imports: ImportTable::default(),
            functions: Vec::new(),
            types: Vec::new(),
            constants: Vec::new(),
            variables: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
            && self.types.is_empty()
            && self.constants.is_empty()
            && self.variables.is_empty()
            && self.sections.is_empty()
            && self.doc.is_empty()
    }
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Push `item` unless it is already present, keeping first-seen order.
pub fn push_unique(list: &mut Vec<String>, item: impl Into<String>) {
    let item = item.into();
    if !item.is_empty() && !list.contains(&item) {
        list.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_table_first_match_wins() {
        let mut imports = ImportTable::default();
        imports.add("Target", "A\\B\\Target");
        imports.add("Target", "C\\Target");
        assert_eq!(imports.resolve("Target"), Some("A\\B\\Target"));
        assert_eq!(imports.resolve("Missing"), None);
        assert_eq!(imports.len(), 2);
    }

    #[test]
    fn test_qualified_name() {
        let ty = TypeSymbol {
            name: "User".into(),
            namespace: "App\\Models".into(),
            ..Default::default()
        };
        assert_eq!(ty.qualified_name(), "App\\Models\\User");
    }

    #[test]
    fn test_push_unique_and_normalize() {
        let mut list = vec!["a".to_string()];
        push_unique(&mut list, "a");
        push_unique(&mut list, "b");
        push_unique(&mut list, "");
        assert_eq!(list, vec!["a", "b"]);
        assert_eq!(normalize_ws("func  (a int,\n\tb int)"), "func (a int, b int)");
    }
}
