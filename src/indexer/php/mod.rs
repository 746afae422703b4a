//! PHP extractor: one compilation unit per file.
//!
//! Collects namespaces, `use` imports, classes, interfaces, traits, enums,
//! top-level functions and constants. Method bodies are lowered into
//! [`CallSite`] summaries so the Eloquent pass never needs the tree.

pub mod eloquent;
pub mod literal;
pub mod routes;

use std::fs;
use std::path::Path;

use tree_sitter::Node;

use self::literal::Expr;
use super::code_parser::{
    CodeParser, clean_comment, field_text, leading_comments, node_text, span_with_name,
};
use super::languages::Language;
use super::symbols::{
    CallSite, CompilationUnit, FunctionSymbol, Param, PropertySymbol, Receiver, TypeKind,
    TypeSymbol, ValueSymbol, Visibility, normalize_ws, push_unique,
};
use crate::error::{IndexError, Result};

pub struct PhpExtractor {
    parser: CodeParser,
}

impl PhpExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            parser: CodeParser::new(Language::Php)?,
        })
    }

    pub fn extract_file(&mut self, path: &Path) -> Result<CompilationUnit> {
        let source = fs::read(path).map_err(|e| IndexError::io(path, e))?;
        self.extract_source(path, &source)
    }

    /// Parse `source` as the file at `path`. Syntax errors fail the unit.
    pub fn extract_source(&mut self, path: &Path, source: &[u8]) -> Result<CompilationUnit> {
        let tree = self.parser.parse_strict(source, path)?;
        let file_path = path.to_string_lossy().replace('\\', "/");
        let mut walker = UnitWalker {
            source,
            file_path: &file_path,
            namespace: String::new(),
            unit: CompilationUnit::new(Language::Php, file_path.clone()),
        };
        walker.statements(tree.root_node());
        Ok(walker.unit)
    }
}

struct UnitWalker<'a> {
    source: &'a [u8],
    file_path: &'a str,
    namespace: String,
    unit: CompilationUnit,
}

impl UnitWalker<'_> {
    fn statements(&mut self, parent: Node) {
        let mut cursor = parent.walk();
        for node in parent.named_children(&mut cursor) {
            match node.kind() {
                "namespace_definition" => self.namespace(node),
                "namespace_use_declaration" => self.imports(node),
                "class_declaration" => self.type_decl(node, TypeKind::Class),
                "interface_declaration" => self.type_decl(node, TypeKind::Interface),
                "trait_declaration" => self.type_decl(node, TypeKind::Trait),
                "enum_declaration" => self.type_decl(node, TypeKind::Enum),
                "function_definition" => {
                    let func = self.function(node);
                    self.unit.functions.push(func);
                }
                "const_declaration" => {
                    let consts = self.constants(node);
                    self.unit.constants.extend(consts);
                }
                _ => {}
            }
        }
    }

    fn namespace(&mut self, node: Node) {
        let name = field_text(node, "name", self.source).unwrap_or("").to_string();
        if self.unit.package.is_empty() {
            self.unit.package = name.clone();
        }
        match node.child_by_field_name("body") {
            Some(body) => {
                let outer = std::mem::replace(&mut self.namespace, name);
                self.statements(body);
                self.namespace = outer;
            }
            None => self.namespace = name,
        }
    }

    /// `use A\B;`, `use A\B as C;` and `use A\{B, C as D};`. Function and
    /// constant imports are ignored.
    fn imports(&mut self, node: Node) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        if children
            .iter()
            .any(|c| matches!(c.kind(), "function" | "const"))
        {
            return;
        }
        let prefix = children
            .iter()
            .find(|c| c.kind() == "namespace_name")
            .map(|n| node_text(*n, self.source).trim_start_matches('\\').to_string());
        for child in &children {
            match child.kind() {
                "namespace_use_clause" => self.import_clause(*child, prefix.as_deref()),
                "namespace_use_group" => {
                    let mut group_cursor = child.walk();
                    for clause in child.named_children(&mut group_cursor) {
                        if matches!(clause.kind(), "namespace_use_clause" | "namespace_use_group_clause") {
                            self.import_clause(clause, prefix.as_deref());
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn import_clause(&mut self, clause: Node, prefix: Option<&str>) {
        let text = normalize_ws(node_text(clause, self.source));
        let text = text
            .strip_prefix("function ")
            .or_else(|| text.strip_prefix("const "))
            .unwrap_or(&text);
        let (target, alias) = match text.split_once(" as ").or_else(|| text.split_once(" AS ")) {
            Some((target, alias)) => (target.trim(), Some(alias.trim())),
            None => (text.trim(), None),
        };
        let target = target.trim_start_matches('\\');
        let target = match prefix {
            Some(prefix) => format!("{prefix}\\{target}"),
            None => target.to_string(),
        };
        let alias = alias
            .map(str::to_string)
            .unwrap_or_else(|| target.rsplit('\\').next().unwrap_or(&target).to_string());
        self.unit.imports.add(alias, target);
    }

    fn type_decl(&mut self, node: Node, kind: TypeKind) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let mut ty = TypeSymbol {
            name: node_text(name, self.source).to_string(),
            kind,
            file_path: self.file_path.to_string(),
            span: span_with_name(node, Some(name)),
            signature: header_text(node, self.source),
            doc: docblock(node, self.source),
            code: node_text(node, self.source).to_string(),
            namespace: self.namespace.clone(),
            ..Default::default()
        };

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "base_clause" => ty.bases.extend(names_in(child, self.source)),
                "class_interface_clause" => ty.interfaces.extend(names_in(child, self.source)),
                "abstract_modifier" => ty.is_abstract = true,
                _ => {}
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.members(body, &mut ty);
        }
        for dep in ty.bases.iter().chain(&ty.interfaces).chain(&ty.traits) {
            push_unique(&mut ty.dependencies, dep.clone());
        }
        self.unit.types.push(ty);
    }

    fn members(&mut self, body: Node, ty: &mut TypeSymbol) {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            match member.kind() {
                "method_declaration" => {
                    let method = self.function(member);
                    ty.methods.push(method);
                }
                "property_declaration" => ty.properties.extend(self.properties(member)),
                "const_declaration" => ty.constants.extend(self.constants(member)),
                "use_declaration" => ty.traits.extend(names_in(member, self.source)),
                "enum_case" => {
                    if let Some(case) = self.enum_case(member) {
                        ty.constants.push(case);
                    }
                }
                _ => {}
            }
        }
    }

    fn function(&self, node: Node) -> FunctionSymbol {
        let name = node.child_by_field_name("name");
        let mut func = FunctionSymbol {
            name: name.map(|n| node_text(n, self.source).to_string()).unwrap_or_default(),
            file_path: self.file_path.to_string(),
            span: span_with_name(node, name),
            signature: header_text(node, self.source),
            doc: docblock(node, self.source),
            code: node_text(node, self.source).to_string(),
            ..Default::default()
        };
        if let Some(params) = node.child_by_field_name("parameters") {
            func.params = parameters(params, self.source);
        }
        if let Some(ret) = node.child_by_field_name("return_type") {
            func.returns.push(normalize_ws(node_text(ret, self.source)));
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "visibility_modifier" => func.visibility = visibility(child, self.source),
                "static_modifier" => func.is_static = true,
                "abstract_modifier" => func.is_abstract = true,
                _ => {}
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            func.body_calls = body_calls(body, self.source);
            collect_call_names(body, self.source, &mut func.calls);
        }
        for ty in func.params.iter().map(|p| &p.type_name).chain(&func.returns) {
            for part in ty.split(['|', '&', '?', '(', ')']) {
                let part = part.trim().trim_start_matches('\\');
                if part.chars().next().is_some_and(char::is_uppercase) {
                    push_unique(&mut func.type_deps, part);
                }
            }
        }
        func
    }

    fn properties(&self, decl: Node) -> Vec<PropertySymbol> {
        let mut visibility_mod = Visibility::Public;
        let mut is_static = false;
        let type_name = field_text(decl, "type", self.source)
            .map(normalize_ws)
            .unwrap_or_default();
        let mut elements = Vec::new();
        let mut cursor = decl.walk();
        for child in decl.named_children(&mut cursor) {
            match child.kind() {
                "visibility_modifier" => visibility_mod = visibility(child, self.source),
                "static_modifier" => is_static = true,
                "property_element" => elements.push(child),
                _ => {}
            }
        }
        let doc = docblock(decl, self.source);
        let code = node_text(decl, self.source).to_string();
        elements
            .into_iter()
            .filter_map(|element| {
                let mut el_cursor = element.walk();
                let var = element
                    .named_children(&mut el_cursor)
                    .find(|c| c.kind() == "variable_name")?;
                let name = node_text(var, self.source).trim_start_matches('$').to_string();
                let default = property_default(element).map(|v| Expr::lower(v, self.source));
                let mut signature = visibility_mod.as_str().to_string();
                if is_static {
                    signature.push_str(" static");
                }
                if !type_name.is_empty() {
                    signature.push(' ');
                    signature.push_str(&type_name);
                }
                signature.push_str(&format!(" ${name}"));
                Some(PropertySymbol {
                    name,
                    file_path: self.file_path.to_string(),
                    span: span_with_name(decl, Some(var)),
                    signature,
                    doc: doc.clone(),
                    code: code.clone(),
                    type_name: type_name.clone(),
                    visibility: visibility_mod,
                    is_static,
                    default,
                    ..Default::default()
                })
            })
            .collect()
    }

    fn constants(&self, decl: Node) -> Vec<ValueSymbol> {
        let doc = docblock(decl, self.source);
        let mut cursor = decl.walk();
        decl.named_children(&mut cursor)
            .filter(|c| c.kind() == "const_element")
            .filter_map(|element| {
                let mut el_cursor = element.walk();
                let parts: Vec<Node> = element.named_children(&mut el_cursor).collect();
                let name = parts.first()?;
                let name_text = node_text(*name, self.source).to_string();
                let value = parts
                    .get(1)
                    .map(|v| normalize_ws(node_text(*v, self.source)))
                    .unwrap_or_default();
                Some(ValueSymbol {
                    signature: format!("const {name_text} = {value}"),
                    name: name_text,
                    file_path: self.file_path.to_string(),
                    span: span_with_name(decl, Some(*name)),
                    doc: doc.clone(),
                    code: node_text(decl, self.source).to_string(),
                    value,
                    is_const: true,
                    ..Default::default()
                })
            })
            .collect()
    }

    fn enum_case(&self, node: Node) -> Option<ValueSymbol> {
        let name = node.child_by_field_name("name")?;
        let value = field_text(node, "value", self.source)
            .map(normalize_ws)
            .unwrap_or_default();
        let name_text = node_text(name, self.source).to_string();
        let signature = if value.is_empty() {
            format!("case {name_text}")
        } else {
            format!("case {name_text} = {value}")
        };
        Some(ValueSymbol {
            name: name_text,
            file_path: self.file_path.to_string(),
            span: span_with_name(node, Some(name)),
            signature,
            doc: docblock(node, self.source),
            code: node_text(node, self.source).to_string(),
            type_name: "case".to_string(),
            value,
            is_const: true,
        })
    }
}

/// Declaration text up to its body, without attributes.
fn header_text(node: Node, source: &[u8]) -> String {
    let mut cursor = node.walk();
    let start = node
        .children(&mut cursor)
        .find(|c| !matches!(c.kind(), "attribute_list" | "comment"))
        .map(|c| c.start_byte())
        .unwrap_or(node.start_byte());
    let end = node
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or(node.end_byte());
    let header = source
        .get(start..end)
        .and_then(|b| std::str::from_utf8(b).ok())
        .unwrap_or("");
    normalize_ws(header.trim_end().trim_end_matches(';'))
}

/// The `/** ... */` comment directly above `node`.
fn docblock(node: Node, source: &[u8]) -> String {
    leading_comments(node)
        .last()
        .map(|c| node_text(*c, source))
        .filter(|text| text.starts_with("/**"))
        .map(clean_comment)
        .unwrap_or_default()
}

fn names_in(node: Node, source: &[u8]) -> Vec<String> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| matches!(c.kind(), "name" | "qualified_name"))
        .map(|c| node_text(c, source).to_string())
        .collect()
}

fn visibility(node: Node, source: &[u8]) -> Visibility {
    match node_text(node, source).to_ascii_lowercase().as_str() {
        "private" => Visibility::Private,
        "protected" => Visibility::Protected,
        _ => Visibility::Public,
    }
}

fn property_default(element: Node) -> Option<Node> {
    if let Some(value) = element.child_by_field_name("default_value") {
        return Some(value);
    }
    let mut cursor = element.walk();
    let init = element
        .named_children(&mut cursor)
        .find(|c| c.kind() == "property_initializer")?;
    let mut init_cursor = init.walk();
    init.named_children(&mut init_cursor).find(|c| c.kind() != "comment")
}

fn parameters(list: Node, source: &[u8]) -> Vec<Param> {
    let mut params = Vec::new();
    let mut cursor = list.walk();
    for param in list.named_children(&mut cursor) {
        let variadic = match param.kind() {
            "simple_parameter" | "property_promotion_parameter" => false,
            "variadic_parameter" => true,
            _ => continue,
        };
        params.push(Param {
            name: field_text(param, "name", source).unwrap_or("").to_string(),
            type_name: field_text(param, "type", source)
                .map(normalize_ws)
                .unwrap_or_default(),
            default: field_text(param, "default_value", source).map(normalize_ws),
            variadic,
        });
    }
    params
}

fn is_call(kind: &str) -> bool {
    matches!(
        kind,
        "member_call_expression"
            | "nullsafe_member_call_expression"
            | "scoped_call_expression"
            | "function_call_expression"
    )
}

/// Calls made by the top-level `return` and expression statements of a
/// body. A chain like `$this->hasMany(X::class)->latest()` is unwrapped to
/// its innermost call.
pub fn body_calls(body: Node, source: &[u8]) -> Vec<CallSite> {
    let mut calls = Vec::new();
    let mut cursor = body.walk();
    for stmt in body.named_children(&mut cursor) {
        if !matches!(stmt.kind(), "return_statement" | "expression_statement") {
            continue;
        }
        let mut stmt_cursor = stmt.walk();
        let Some(expr) = stmt.named_children(&mut stmt_cursor).find(|c| c.kind() != "comment")
        else {
            continue;
        };
        if is_call(expr.kind()) {
            if let Some(call) = call_site(innermost_call(expr), source) {
                calls.push(call);
            }
        }
    }
    calls
}

/// Walk down the receiver side of a call chain to its first call.
pub fn innermost_call(mut node: Node) -> Node {
    loop {
        let inner = match node.kind() {
            "member_call_expression" | "nullsafe_member_call_expression" => {
                node.child_by_field_name("object")
            }
            _ => None,
        };
        match inner {
            Some(inner) if is_call(inner.kind()) => node = inner,
            _ => return node,
        }
    }
}

/// Lower one call node into a [`CallSite`].
pub fn call_site(node: Node, source: &[u8]) -> Option<CallSite> {
    let (receiver, name) = match node.kind() {
        "member_call_expression" | "nullsafe_member_call_expression" => {
            let object = node.child_by_field_name("object")?;
            let receiver = if object.kind() == "variable_name" {
                match node_text(object, source) {
                    "$this" => Receiver::This,
                    var => Receiver::Variable(var.trim_start_matches('$').to_string()),
                }
            } else {
                Receiver::Other
            };
            (receiver, node.child_by_field_name("name")?)
        }
        "scoped_call_expression" => {
            let scope = node.child_by_field_name("scope")?;
            (
                Receiver::Static(node_text(scope, source).to_string()),
                node.child_by_field_name("name")?,
            )
        }
        "function_call_expression" => {
            let function = node.child_by_field_name("function")?;
            if !matches!(function.kind(), "name" | "qualified_name") {
                return None;
            }
            (Receiver::Bare, function)
        }
        _ => return None,
    };
    if !matches!(name.kind(), "name" | "qualified_name") {
        return None;
    }
    let args = node
        .child_by_field_name("arguments")
        .map(|a| Expr::lower_arguments(a, source))
        .unwrap_or_default();
    Some(CallSite {
        receiver,
        name: node_text(name, source).to_string(),
        args,
        line: node.start_position().row + 1,
    })
}

fn collect_call_names(node: Node, source: &[u8], out: &mut Vec<String>) {
    if is_call(node.kind()) {
        let name = match node.kind() {
            "function_call_expression" => node.child_by_field_name("function"),
            _ => node.child_by_field_name("name"),
        };
        if let Some(name) = name.filter(|n| matches!(n.kind(), "name" | "qualified_name")) {
            push_unique(out, node_text(name, source));
        }
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_call_names(child, source, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_PHP: &str = r#"<?php

namespace App\Models;

use Illuminate\Database\Eloquent\Model;
use Illuminate\Database\Eloquent\Relations\{HasMany, BelongsTo as Owner};
use App\Support\Traits\HasUuid;

/**
 * A registered user.
 */
class User extends Model implements \JsonSerializable
{
    use HasUuid, Notifiable;

    const STATUS_ACTIVE = 'active';

    /** Mass assignable. */
    protected $fillable = ['name', 'email'];

    private static ?string $cache = null;

    /**
     * Posts written by the user.
     */
    public function posts(): HasMany
    {
        return $this->hasMany(Post::class, 'author_id')->latest();
    }

    public static function findByEmail(string $email, int ...$ids): ?self
    {
        $query = static::query();
        return static::where('email', $email)->first();
    }

    abstract protected function secret(): string;
}
"#;

    fn extract(src: &str) -> CompilationUnit {
        let mut extractor = PhpExtractor::new().unwrap();
        extractor
            .extract_source(Path::new("app/Models/User.php"), src.as_bytes())
            .unwrap()
    }

    #[test]
    fn test_namespace_and_imports() {
        let unit = extract(USER_PHP);
        assert_eq!(unit.package, "App\\Models");
        assert_eq!(
            unit.imports.resolve("Model"),
            Some("Illuminate\\Database\\Eloquent\\Model")
        );
        assert_eq!(
            unit.imports.resolve("HasMany"),
            Some("Illuminate\\Database\\Eloquent\\Relations\\HasMany")
        );
        assert_eq!(
            unit.imports.resolve("Owner"),
            Some("Illuminate\\Database\\Eloquent\\Relations\\BelongsTo")
        );
        assert_eq!(unit.imports.resolve("HasUuid"), Some("App\\Support\\Traits\\HasUuid"));
    }

    #[test]
    fn test_class_shape() {
        let unit = extract(USER_PHP);
        let user = &unit.types[0];
        assert_eq!(user.name, "User");
        assert_eq!(user.kind, TypeKind::Class);
        assert_eq!(user.qualified_name(), "App\\Models\\User");
        assert_eq!(user.doc, "A registered user.");
        assert_eq!(user.signature, "class User extends Model implements \\JsonSerializable");
        assert_eq!(user.bases, vec!["Model"]);
        assert_eq!(user.interfaces, vec!["\\JsonSerializable"]);
        assert_eq!(user.traits, vec!["HasUuid", "Notifiable"]);
        assert_eq!(user.span.start_line, 12);
        assert_eq!(user.span.name_start, 12);
        assert_eq!(user.constants[0].name, "STATUS_ACTIVE");
        assert_eq!(user.constants[0].value, "'active'");
    }

    #[test]
    fn test_properties_keep_lowered_defaults() {
        let unit = extract(USER_PHP);
        let user = &unit.types[0];
        let fillable = user.property("fillable").unwrap();
        assert_eq!(fillable.visibility, Visibility::Protected);
        assert_eq!(fillable.doc, "Mass assignable.");
        assert_eq!(
            literal::fold_string_list(fillable.default.as_ref().unwrap()),
            vec!["name", "email"]
        );
        let cache = user.property("cache").unwrap();
        assert!(cache.is_static);
        assert_eq!(cache.type_name, "?string");
        assert_eq!(cache.signature, "private static ?string $cache");
    }

    #[test]
    fn test_methods_and_body_calls() {
        let unit = extract(USER_PHP);
        let user = &unit.types[0];
        let posts = user.methods.iter().find(|m| m.name == "posts").unwrap();
        assert_eq!(posts.signature, "public function posts(): HasMany");
        assert_eq!(posts.doc, "Posts written by the user.");
        assert_eq!(posts.returns, vec!["HasMany"]);
        assert_eq!(posts.body_calls.len(), 1);
        let call = &posts.body_calls[0];
        assert_eq!(call.receiver, Receiver::This);
        assert_eq!(call.name, "hasMany");
        assert_eq!(call.args[0], Expr::ClassRef("Post".into()));
        assert_eq!(call.args[1], Expr::Str("author_id".into()));
        assert!(posts.calls.contains(&"latest".to_string()));

        let find = user.methods.iter().find(|m| m.name == "findByEmail").unwrap();
        assert!(find.is_static);
        assert_eq!(find.params.len(), 2);
        assert_eq!(find.params[0].name, "$email");
        assert_eq!(find.params[0].type_name, "string");
        assert!(find.params[1].variadic);
        // The assignment is not a call statement.
        assert_eq!(find.body_calls.len(), 1);
        assert_eq!(find.body_calls[0].receiver, Receiver::Static("static".into()));
        assert_eq!(find.body_calls[0].name, "where");

        let secret = user.methods.iter().find(|m| m.name == "secret").unwrap();
        assert!(secret.is_abstract);
        assert_eq!(secret.visibility, Visibility::Protected);
        assert!(secret.code.ends_with(';'));
    }

    #[test]
    fn test_braced_namespaces_and_functions() {
        let src = r#"<?php
namespace First {
    interface Shape { public function area(): float; }
}
namespace Second {
    trait Loggable {}
    enum Suit: string {
        case Hearts = 'H';
        case Spades = 'S';
    }
    function helper($x = 1) { return strtoupper($x); }
    const VERSION = '1.0';
}
"#;
        let unit = extract(src);
        assert_eq!(unit.package, "First");
        assert_eq!(unit.types[0].namespace, "First");
        assert_eq!(unit.types[0].kind, TypeKind::Interface);
        assert_eq!(unit.types[1].qualified_name(), "Second\\Loggable");
        let suit = &unit.types[2];
        assert_eq!(suit.kind, TypeKind::Enum);
        assert_eq!(suit.constants.len(), 2);
        assert_eq!(suit.constants[0].signature, "case Hearts = 'H'");
        assert_eq!(unit.functions[0].name, "helper");
        assert_eq!(unit.functions[0].params[0].default.as_deref(), Some("1"));
        assert_eq!(unit.functions[0].body_calls[0].receiver, Receiver::Bare);
        assert_eq!(unit.constants[0].name, "VERSION");
    }

    #[test]
    fn test_syntax_error_fails_unit() {
        let mut extractor = PhpExtractor::new().unwrap();
        let err = extractor
            .extract_source(Path::new("broken.php"), b"<?php class { function (")
            .unwrap_err();
        assert!(matches!(err, IndexError::Parse { .. }));
    }
}
