//! Chunk model: the canonical output record of the indexer.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of symbol a chunk describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Method,
    Type,
    Interface,
    Const,
    Var,
    Class,
    Property,
    Trait,
    Route,
    File,
    Section,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Method => "method",
            ChunkKind::Type => "type",
            ChunkKind::Interface => "interface",
            ChunkKind::Const => "const",
            ChunkKind::Var => "var",
            ChunkKind::Class => "class",
            ChunkKind::Property => "property",
            ChunkKind::Trait => "trait",
            ChunkKind::Route => "route",
            ChunkKind::File => "file",
            ChunkKind::Section => "section",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One indexable symbol.
///
/// Lines are 1-based and inclusive. `selection_start`/`selection_end` narrow
/// the range down to the symbol's name for editor navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub name: String,
    pub package: String,
    pub language: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_end: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub signature: String,
    pub docstring: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl Chunk {
    pub fn new(
        kind: ChunkKind,
        name: impl Into<String>,
        language: &str,
        file_path: impl Into<String>,
        start_line: usize,
        end_line: usize,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            package: String::new(),
            language: language.to_string(),
            file_path: file_path.into(),
            start_line,
            end_line: end_line.max(start_line),
            selection_start: None,
            selection_end: None,
            parent: None,
            signature: String::new(),
            docstring: String::new(),
            code: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn with_selection(mut self, start: usize, end: usize) -> Self {
        self.selection_start = Some(start);
        self.selection_end = Some(end.max(start));
        self
    }

    pub fn with_parent(mut self, parent: Option<String>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = docstring.into();
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    /// Insert a metadata entry, skipping values that carry no information
    /// (`null`, empty strings, empty arrays, empty objects).
    pub fn set_meta(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let empty = match &value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        };
        if !empty {
            self.metadata.insert(key.to_string(), value);
        }
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Text handed to the embedding pipeline: signature, docstring and code.
    pub fn embedding_text(&self) -> String {
        [&self.signature, &self.docstring, &self.code]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
