//! Eloquent model enrichment.
//!
//! Runs after extraction over the PHP units of one run. Detects model
//! classes, folds their declarative properties, and reads relations out of
//! the lowered method bodies. Results are new [`ModelDescriptor`] values;
//! the unit tables are only read.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use super::literal::{ClassToken, class_ref_token, fold_string, fold_string_list, fold_string_map};
use crate::chunk::Chunk;
use crate::indexer::symbols::{
    CompilationUnit, FunctionSymbol, ImportTable, Receiver, TypeKind, TypeSymbol, Visibility,
};

/// Relation builder methods recognised on `$this`.
pub const RELATION_KINDS: &[&str] = &[
    "hasOne",
    "hasMany",
    "belongsTo",
    "belongsToMany",
    "hasManyThrough",
    "morphTo",
    "morphMany",
    "morphToMany",
    "morphedByMany",
];

/// Short base-class names that mark a model.
pub const MODEL_BASES: &[&str] = &["Model", "Authenticatable", "Pivot", "MorphPivot"];

/// Any base resolved under this namespace marks a model.
pub const ELOQUENT_NAMESPACE: &str = "Illuminate\\Database\\Eloquent\\";

const MAX_CHAIN_DEPTH: usize = 16;

const STRING_PROPS: &[&str] = &["table", "primaryKey", "connection"];
const LIST_PROPS: &[&str] = &[
    "fillable", "guarded", "hidden", "visible", "appends", "with", "dates", "touches",
];
const MAP_PROPS: &[&str] = &["casts", "attributes"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationDescriptor {
    pub name: String,
    pub relation_kind: String,
    /// Fully-qualified related class, empty when the target is not a literal.
    pub related_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelDescriptor {
    /// Fully-qualified class name.
    pub class: String,
    #[serde(skip)]
    pub file_path: String,
    #[serde(skip)]
    pub start_line: usize,
    /// Folded string properties (`table`, `primaryKey`, `connection`).
    pub strings: BTreeMap<String, String>,
    /// Folded list properties (`fillable`, `hidden`, ...).
    pub lists: BTreeMap<String, Vec<String>>,
    /// Folded map properties (`casts`, `attributes`).
    pub maps: BTreeMap<String, BTreeMap<String, String>>,
    pub relations: Vec<RelationDescriptor>,
    pub scopes: Vec<String>,
    pub accessors: Vec<String>,
    pub mutators: Vec<String>,
}

impl ModelDescriptor {
    /// Class name without its namespace.
    pub fn short_name(&self) -> &str {
        self.class.rsplit('\\').next().unwrap_or(&self.class)
    }

    /// Whether this descriptor belongs on `chunk`.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        chunk.file_path == self.file_path
            && chunk.start_line == self.start_line
            && chunk.name == self.short_name()
    }

    /// Merge the descriptor into a class chunk's metadata.
    pub fn apply(&self, chunk: &mut Chunk) {
        let mut orm = serde_json::Map::new();
        orm.insert("framework".into(), json!("eloquent"));
        for (key, value) in &self.strings {
            orm.insert(key.clone(), json!(value));
        }
        for (key, value) in &self.lists {
            orm.insert(key.clone(), json!(value));
        }
        for (key, value) in &self.maps {
            orm.insert(key.clone(), json!(value));
        }
        for (key, value) in [
            ("scopes", &self.scopes),
            ("accessors", &self.accessors),
            ("mutators", &self.mutators),
        ] {
            if !value.is_empty() {
                orm.insert(key.into(), json!(value));
            }
        }
        chunk.set_meta("orm", Value::Object(orm));
        chunk.set_meta("relations", json!(self.relations));
    }
}

struct ClassEntry<'u> {
    unit: &'u CompilationUnit,
    ty: &'u TypeSymbol,
}

/// Class graph of one run, keyed by fully-qualified name.
pub struct EloquentEnricher<'u> {
    classes: HashMap<String, ClassEntry<'u>>,
    order: Vec<String>,
}

impl<'u> EloquentEnricher<'u> {
    pub fn new(units: &'u [CompilationUnit]) -> Self {
        let mut classes = HashMap::new();
        let mut order = Vec::new();
        for unit in units {
            for ty in unit.types.iter().filter(|t| t.kind == TypeKind::Class) {
                let name = ty.qualified_name();
                if !classes.contains_key(&name) {
                    order.push(name.clone());
                    classes.insert(name, ClassEntry { unit, ty });
                }
            }
        }
        Self { classes, order }
    }

    /// Descriptors for every detected model, in discovery order.
    pub fn models(&self) -> Vec<ModelDescriptor> {
        let models: Vec<ModelDescriptor> = self
            .order
            .iter()
            .filter_map(|name| self.classes.get(name))
            .filter(|entry| self.is_model(entry.unit, entry.ty))
            .map(|entry| describe(entry.unit, entry.ty))
            .collect();
        debug!("Detected {} Eloquent models", models.len());
        models
    }

    /// Namespace marker, or an inheritance chain reaching a model base.
    pub fn is_model(&self, unit: &CompilationUnit, ty: &TypeSymbol) -> bool {
        if ty.namespace == "App\\Models" || ty.namespace.ends_with("\\Models") {
            return true;
        }
        let mut seen = HashSet::new();
        self.chain_reaches_model(unit, ty, 0, &mut seen)
    }

    fn chain_reaches_model(
        &self,
        unit: &CompilationUnit,
        ty: &TypeSymbol,
        depth: usize,
        seen: &mut HashSet<String>,
    ) -> bool {
        if depth >= MAX_CHAIN_DEPTH || !seen.insert(ty.qualified_name()) {
            return false;
        }
        ty.bases.iter().any(|base| {
            let resolved = resolve_class(
                &ClassToken::Reference(base.clone()),
                &unit.imports,
                &ty.namespace,
            );
            if resolved.starts_with(ELOQUENT_NAMESPACE) {
                return true;
            }
            if let Some(parent) = self.classes.get(&resolved) {
                return self.chain_reaches_model(parent.unit, parent.ty, depth + 1, seen);
            }
            let short = base.rsplit('\\').next().unwrap_or(base);
            MODEL_BASES.contains(&short)
        })
    }
}

/// Resolve a class token found in `namespace`.
///
/// The base rules, in order: a token matching an import alias becomes that
/// import's target; anything else is qualified with `namespace`. The first
/// matching alias wins when several imports share it.
///
/// Two PHP name forms are handled before and between those rules and go
/// beyond them:
/// - a fully qualified token (leading `\`) or a string literal is taken
///   as absolute and returned without its leading `\`;
/// - a qualified token `Alias\Rest` whose first segment is an import alias
///   expands to `<target>\Rest`.
pub fn resolve_class(token: &ClassToken, imports: &ImportTable, namespace: &str) -> String {
    let raw = match token {
        ClassToken::Literal(s) => return s.trim_start_matches('\\').to_string(),
        ClassToken::Reference(r) => r.as_str(),
    };
    if let Some(absolute) = raw.strip_prefix('\\') {
        return absolute.to_string();
    }
    if let Some(target) = imports.resolve(raw) {
        return target.to_string();
    }
    if let Some((head, rest)) = raw.split_once('\\') {
        if let Some(target) = imports.resolve(head) {
            return format!("{target}\\{rest}");
        }
    }
    if namespace.is_empty() {
        raw.to_string()
    } else {
        format!("{namespace}\\{raw}")
    }
}

fn describe(unit: &CompilationUnit, ty: &TypeSymbol) -> ModelDescriptor {
    let mut model = ModelDescriptor {
        class: ty.qualified_name(),
        file_path: ty.file_path.clone(),
        start_line: ty.span.start_line,
        ..Default::default()
    };

    for prop in &ty.properties {
        let Some(default) = &prop.default else {
            continue;
        };
        let name = prop.name.as_str();
        if STRING_PROPS.contains(&name) {
            if let Some(value) = fold_string(default) {
                model.strings.insert(name.to_string(), value);
            }
        } else if LIST_PROPS.contains(&name) {
            let values = fold_string_list(default);
            if !values.is_empty() {
                model.lists.insert(name.to_string(), values);
            }
        } else if MAP_PROPS.contains(&name) {
            let entries: BTreeMap<String, String> = fold_string_map(default).into_iter().collect();
            if !entries.is_empty() {
                model.maps.insert(name.to_string(), entries);
            }
        }
    }

    for method in &ty.methods {
        if let Some(relation) = relation_of(method, unit, &ty.namespace) {
            model.relations.push(relation);
        }
        if method.visibility != Visibility::Public {
            continue;
        }
        if let Some(scope) = method.name.strip_prefix("scope").filter(|s| starts_upper(s)) {
            model.scopes.push(lower_first(scope));
        } else if let Some(attr) = attribute_name(&method.name, "get") {
            model.accessors.push(attr);
        } else if let Some(attr) = attribute_name(&method.name, "set") {
            model.mutators.push(attr);
        }
    }
    model
}

/// First `$this-><relation>(...)` call among the method's statements.
fn relation_of(
    method: &FunctionSymbol,
    unit: &CompilationUnit,
    namespace: &str,
) -> Option<RelationDescriptor> {
    let call = method
        .body_calls
        .iter()
        .find(|c| c.receiver == Receiver::This && RELATION_KINDS.contains(&c.name.as_str()))?;
    let related_type = if call.name == "morphTo" {
        String::new()
    } else {
        call.args
            .first()
            .and_then(class_ref_token)
            .map(|token| resolve_class(&token, &unit.imports, namespace))
            .unwrap_or_default()
    };
    let key_args = if call.name == "morphTo" { &[][..] } else { call.args.get(1..).unwrap_or(&[]) };
    let mut keys = key_args.iter().map(fold_string);
    Some(RelationDescriptor {
        name: method.name.clone(),
        relation_kind: call.name.clone(),
        related_type,
        foreign_key: keys.next().flatten(),
        local_key: keys.next().flatten(),
    })
}

/// `getFirstNameAttribute` → `first_name`.
fn attribute_name(method: &str, prefix: &str) -> Option<String> {
    let inner = method.strip_prefix(prefix)?.strip_suffix("Attribute")?;
    starts_upper(inner).then(|| snake_case(inner))
}

fn starts_upper(s: &str) -> bool {
    s.chars().next().is_some_and(char::is_uppercase)
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let chars: Vec<char> = s.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && !chars[i - 1].is_uppercase() && chars[i - 1] != '_';
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if prev_lower || (prev_upper && next_lower) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
